use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A contiguous slice of the identifier space handled by one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkChunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl WorkChunk {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Split `total` identifiers into near-equal contiguous chunks.
///
/// Without a hint there is one chunk per worker; with a chunk-size hint the
/// count is `ceil(total / hint)`. All chunks have the same size except the
/// last, which absorbs the remainder. When there are fewer identifiers than
/// chunks, every identifier gets its own chunk.
///
/// The remainder can reach `count - 1`, so with few identifiers per chunk the
/// last chunk may be several times larger than the rest (15 identifiers on 8
/// workers give seven chunks of 1 and one of 8). Pass a chunk-size hint to
/// bound that imbalance.
pub fn plan_chunks(total: usize, workers: usize, chunk_hint: Option<usize>) -> Vec<WorkChunk> {
    if total == 0 {
        return Vec::new();
    }

    let count = match chunk_hint {
        Some(hint) if hint > 0 => total.div_ceil(hint),
        _ => workers.max(1),
    }
    .clamp(1, total);

    let size = total / count;
    (0..count)
        .map(|index| {
            let start = index * size;
            let end = if index + 1 == count { total } else { start + size };
            WorkChunk { index, start, end }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_even_split() {
        let chunks = plan_chunks(12, 4, None);
        let ranges: Vec<_> = chunks.iter().map(|c| c.range()).collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..9, 9..12]);
    }

    #[test]
    fn test_last_chunk_absorbs_remainder() {
        let chunks = plan_chunks(10, 4, None);
        let sizes: Vec<_> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![2, 2, 2, 4]);
    }

    #[test]
    fn test_fewer_records_than_workers() {
        let chunks = plan_chunks(3, 8, None);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn test_empty_input() {
        assert!(plan_chunks(0, 4, None).is_empty());
        assert!(plan_chunks(0, 4, Some(10)).is_empty());
    }

    #[test]
    fn test_small_chunks_leave_large_remainder() {
        let sizes: Vec<_> = plan_chunks(15, 8, None).iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![1, 1, 1, 1, 1, 1, 1, 8]);

        let sizes: Vec<_> = plan_chunks(15, 8, Some(4)).iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 6]);
    }

    #[test]
    fn test_chunk_hint() {
        let chunks = plan_chunks(1000, 2, Some(300));
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[3].range(), 750..1000);
    }

    proptest! {
        #[test]
        fn chunks_cover_input_without_overlap(
            total in 0usize..5000,
            workers in 1usize..64,
            hint in proptest::option::of(1usize..800),
        ) {
            let chunks = plan_chunks(total, workers, hint);

            let mut next = 0;
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert_eq!(chunk.start, next);
                prop_assert!(!chunk.is_empty());
                next = chunk.end;
            }
            prop_assert_eq!(next, total);

            if hint.is_none() {
                prop_assert!(chunks.len() <= workers);
            }
            if let Some(first) = chunks.first() {
                let last = chunks.last().unwrap();
                prop_assert!(chunks[..chunks.len() - 1].iter().all(|c| c.len() == first.len()));
                prop_assert!(last.len() >= first.len());
            }
        }
    }
}
