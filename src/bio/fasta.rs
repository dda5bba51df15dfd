use crate::bio::sequence::SequenceRecord;
use indexmap::IndexMap;
use memmap2::Mmap;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till},
    character::complete::{line_ending, not_line_ending},
    combinator::{map, opt},
    sequence::preceded,
    IResult,
};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Parse a FASTA header line
fn parse_header(input: &[u8]) -> IResult<&[u8], (&str, Option<&str>)> {
    let (input, _) = tag(b">")(input)?;
    let (input, id) = map(
        take_till(|c: u8| c == b' ' || c == b'\t' || c == b'\n' || c == b'\r'),
        |s| std::str::from_utf8(s).unwrap_or(""),
    )(input)?;
    let (input, description) = opt(preceded(
        alt((tag(b" "), tag(b"\t"))),
        map(not_line_ending, |s| std::str::from_utf8(s).unwrap_or("")),
    ))(input)?;
    let (input, _) = opt(line_ending)(input)?;
    Ok((input, (id, description)))
}

/// Parse one record's bytes (header plus payload lines).
///
/// Payload bytes are kept as written apart from line breaks and whitespace.
pub fn parse_record(input: &[u8], source: usize) -> Result<SequenceRecord, String> {
    let (rest, (id, description)) =
        parse_header(input).map_err(|_| "record does not start with a '>' header".to_string())?;
    if id.is_empty() {
        return Err("empty sequence identifier".to_string());
    }

    let sequence: Vec<u8> = rest
        .iter()
        .copied()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if sequence.contains(&b'>') {
        return Err(format!("stray '>' inside payload of '{}'", id));
    }

    let mut record = SequenceRecord::new(id.to_string(), sequence).with_source(source);
    if let Some(desc) = description.map(str::trim).filter(|d| !d.is_empty()) {
        record = record.with_description(desc.to_string());
    }
    Ok(record)
}

/// Byte span of one record in a FASTA file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSpan {
    pub offset: u64,
    pub len: u64,
}

/// Identifier → span index of a FASTA file, in file order
#[derive(Debug, Clone, Default)]
pub struct FastaIndex {
    pub path: PathBuf,
    pub records: IndexMap<String, RecordSpan>,
    pub duplicates: usize,
}

impl FastaIndex {
    pub fn get(&self, id: &str) -> Option<RecordSpan> {
        self.records.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Index every record start in a FASTA file without parsing payloads.
///
/// Identifiers are expected to be unique per file; a repeated identifier
/// keeps its first record and is counted in `duplicates`.
pub fn index_fasta<P: AsRef<Path>>(path: P) -> std::io::Result<FastaIndex> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut index = FastaIndex {
        path: path.to_path_buf(),
        ..Default::default()
    };
    if file.metadata()?.len() == 0 {
        return Ok(index);
    }
    let mmap = unsafe { Mmap::map(&file)? };

    let starts: Vec<usize> = (0..mmap.len())
        .filter(|&pos| mmap[pos] == b'>' && (pos == 0 || mmap[pos - 1] == b'\n'))
        .collect();

    if starts.first().is_some_and(|&first| first > 0)
        && mmap[..starts[0]].iter().any(|c| !c.is_ascii_whitespace())
    {
        warn!("Ignoring text before the first header in {:?}", path);
    }

    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(mmap.len());
        let id_end = mmap[start + 1..end]
            .iter()
            .position(|c| c.is_ascii_whitespace())
            .map_or(end, |p| start + 1 + p);
        let id = String::from_utf8_lossy(&mmap[start + 1..id_end]).into_owned();

        if index.records.contains_key(&id) {
            warn!("Duplicate sequence identifier '{}' in {:?}; keeping the first", id, path);
            index.duplicates += 1;
            continue;
        }
        index.records.insert(
            id,
            RecordSpan {
                offset: start as u64,
                len: (end - start) as u64,
            },
        );
    }

    Ok(index)
}

/// Read the raw bytes of one indexed record
pub fn read_record(file: &mut File, span: RecordSpan) -> std::io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(span.offset))?;
    let mut bytes = vec![0u8; span.len as usize];
    file.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Write one record, payload wrapped at 80 columns
pub fn write_record<W: Write>(writer: &mut W, record: &SequenceRecord) -> std::io::Result<()> {
    writeln!(writer, "{}", record.header())?;
    for chunk in record.sequence.chunks(80) {
        writer.write_all(chunk)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}
