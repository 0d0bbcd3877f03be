//! Per-topic artifact index and the forward-only nearest-time search used to
//! correlate one exported stream against another.

use crate::time::CaptureTime;
use serde::Serialize;
use std::path::PathBuf;

/// One successfully written artifact.
///
/// `local_index` is the topic's message counter at dispatch time. It counts
/// every dispatched message, including ones later dropped, so a topic's
/// records can skip values but never repeat one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexRecord {
    pub path: PathBuf,
    pub capture_time: CaptureTime,
    pub local_index: u64,
}

pub trait Timestamped {
    fn capture_time(&self) -> CaptureTime;
}

impl Timestamped for IndexRecord {
    fn capture_time(&self) -> CaptureTime {
        self.capture_time
    }
}

impl Timestamped for CaptureTime {
    fn capture_time(&self) -> CaptureTime {
        *self
    }
}

/// Search cursor over one reference sequence sorted by capture time.
///
/// Queries must arrive in non-decreasing time order; the cursor never moves
/// backwards, so a full sweep over `n` references costs `O(n)` overall.
///
/// The scan stops at the first element that does not improve on the best
/// distance so far. That is only exact when the distance curve is unimodal
/// from the cursor onwards. Duplicate capture times, out-of-order references
/// or a cursor already past the true minimum can all yield a local rather
/// than global nearest match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NearestCursor {
    pos: usize,
}

impl NearestCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(pos: usize) -> Self {
        Self { pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Index of the reference closest to `query`, scanning forward from the
    /// cursor. Returns `None` when the cursor is already past the end.
    pub fn find_nearest<T: Timestamped>(&mut self, refs: &[T], query: CaptureTime) -> Option<usize> {
        let mut best = self.pos;
        let mut best_diff = u64::MAX;
        let mut found = false;

        for (i, item) in refs.iter().enumerate().skip(self.pos) {
            let diff = item.capture_time().abs_diff(&query);
            if !found || diff < best_diff {
                best = i;
                best_diff = diff;
                found = true;
            } else {
                break;
            }
        }

        if !found {
            return None;
        }
        self.pos = best;
        Some(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(values: &[i64]) -> Vec<CaptureTime> {
        values.iter().map(|&v| CaptureTime::from_nanos(v)).collect()
    }

    #[test]
    fn test_walks_forward_and_keeps_cursor() {
        let refs = ns(&[100, 200, 205, 400]);
        let mut cursor = NearestCursor::new();

        assert_eq!(cursor.find_nearest(&refs, CaptureTime::from_nanos(203)), Some(2));
        assert_eq!(cursor.position(), 2);

        // distance 1 at index 2, then 194 at index 3: stop immediately
        assert_eq!(cursor.find_nearest(&refs, CaptureTime::from_nanos(206)), Some(2));
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_query_before_first_reference() {
        let refs = ns(&[100, 200, 300]);
        let mut cursor = NearestCursor::new();
        assert_eq!(cursor.find_nearest(&refs, CaptureTime::from_nanos(0)), Some(0));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_query_after_last_reference() {
        let refs = ns(&[100, 200, 300]);
        let mut cursor = NearestCursor::new();
        assert_eq!(cursor.find_nearest(&refs, CaptureTime::from_nanos(10_000)), Some(2));
        // further queries stay pinned to the tail
        assert_eq!(cursor.find_nearest(&refs, CaptureTime::from_nanos(20_000)), Some(2));
    }

    #[test]
    fn test_matches_exhaustive_search_on_even_grid() {
        let refs: Vec<CaptureTime> = (0..50).map(|i| CaptureTime::from_nanos(i * 10)).collect();
        let mut cursor = NearestCursor::new();
        for q in (0..500).step_by(7) {
            let query = CaptureTime::from_nanos(q);
            let got = cursor.find_nearest(&refs, query).unwrap();
            let best = refs
                .iter()
                .map(|t| t.abs_diff(&query))
                .min()
                .unwrap();
            assert_eq!(refs[got].abs_diff(&query), best, "query {q}");
        }
    }

    #[test]
    fn test_cursor_never_regresses() {
        let refs = ns(&[0, 10, 20, 30, 40, 50]);
        let mut cursor = NearestCursor::new();
        let mut last = 0;
        for q in [1, 9, 12, 26, 26, 49, 60] {
            let got = cursor.find_nearest(&refs, CaptureTime::from_nanos(q)).unwrap();
            assert!(got >= last);

            // a fresh search from zero finds no earlier index for a unimodal grid
            let fresh = NearestCursor::new().find_nearest(&refs, CaptureTime::from_nanos(q)).unwrap();
            assert!(got <= fresh);
            last = got;
        }
    }

    #[test]
    fn test_gap_in_references_still_resolves() {
        // local index 5 was dropped: the time grid has a hole between 40 and 60
        let refs = ns(&[0, 10, 20, 30, 40, 60, 70]);
        let mut cursor = NearestCursor::new();
        assert_eq!(cursor.find_nearest(&refs, CaptureTime::from_nanos(49)), Some(4));
        assert_eq!(cursor.find_nearest(&refs, CaptureTime::from_nanos(52)), Some(5));
        assert_eq!(cursor.find_nearest(&refs, CaptureTime::from_nanos(68)), Some(6));
    }

    #[test]
    fn test_plateau_stops_at_first_equal_distance() {
        // equal distances do not count as an improvement
        let refs = ns(&[10, 30, 50]);
        let mut cursor = NearestCursor::new();
        assert_eq!(cursor.find_nearest(&refs, CaptureTime::from_nanos(20)), Some(0));
    }

    #[test]
    fn test_empty_or_exhausted_reference() {
        let empty: Vec<CaptureTime> = Vec::new();
        assert_eq!(NearestCursor::new().find_nearest(&empty, CaptureTime::from_nanos(1)), None);

        let refs = ns(&[1, 2]);
        let mut cursor = NearestCursor::at(5);
        assert_eq!(cursor.find_nearest(&refs, CaptureTime::from_nanos(1)), None);
        assert_eq!(cursor.position(), 5);
    }

    #[test]
    fn test_works_on_index_records() {
        let records: Vec<IndexRecord> = [(0, 100), (1, 200), (3, 400)]
            .iter()
            .map(|&(idx, t)| IndexRecord {
                path: PathBuf::from(format!("{t}.png")),
                capture_time: CaptureTime::from_nanos(t),
                local_index: idx,
            })
            .collect();
        let mut cursor = NearestCursor::new();
        let hit = cursor.find_nearest(&records, CaptureTime::from_nanos(390)).unwrap();
        assert_eq!(records[hit].local_index, 3);
    }
}
