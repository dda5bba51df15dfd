use serde::{Deserialize, Serialize};

/// A single FASTA entry as read from one of the run's sequence sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub id: String,
    pub description: Option<String>,
    pub sequence: Vec<u8>,
    /// Index of the source this record was read from
    pub source: usize,
}

impl SequenceRecord {
    pub fn new(id: String, sequence: Vec<u8>) -> Self {
        Self {
            id,
            description: None,
            sequence,
            source: 0,
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_source(mut self, source: usize) -> Self {
        self.source = source;
        self
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn header(&self) -> String {
        match &self.description {
            Some(desc) if !desc.is_empty() => format!(">{} {}", self.id, desc),
            _ => format!(">{}", self.id),
        }
    }
}
