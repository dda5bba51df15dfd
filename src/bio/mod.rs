pub mod fasta;
pub mod hits;
pub mod sequence;

pub use hits::{HitRecord, RecordError};
pub use sequence::SequenceRecord;
