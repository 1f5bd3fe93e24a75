use std::collections::HashMap;

use crate::data::Row;
use crate::types::SourceId;

/// How unevenly rows are spread across the sources of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceSkew {
    /// Number of distinct sources.
    pub sources: usize,
    /// Rows in the smallest source.
    pub min: usize,
    /// Rows in the largest source.
    pub max: usize,
    /// Fraction of all rows held by the largest source.
    pub max_share: f64,
}

/// Count rows per `source`.
pub fn source_row_counts(rows: &[Row]) -> HashMap<SourceId, usize> {
    let mut counts = HashMap::new();
    for row in rows {
        *counts.entry(row.common().source.clone()).or_insert(0) += 1;
    }
    counts
}

/// Summarise per-source counts; `None` when there are no sources.
pub fn source_skew(counts: &HashMap<SourceId, usize>) -> Option<SourceSkew> {
    let min = *counts.values().min()?;
    let max = *counts.values().max()?;
    let total: usize = counts.values().sum();
    let max_share = if total == 0 {
        0.0
    } else {
        max as f64 / total as f64
    };
    Some(SourceSkew {
        sources: counts.len(),
        min,
        max,
        max_share,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_counts_have_no_skew() {
        assert!(source_skew(&HashMap::new()).is_none());
    }

    #[test]
    fn skew_reports_extremes_and_largest_share() {
        let mut counts = HashMap::new();
        counts.insert("CP_Quack-echo-2020-08-23".to_string(), 6);
        counts.insert("CP_Quack-echo-2020-08-24".to_string(), 2);
        let skew = source_skew(&counts).unwrap();
        assert_eq!(skew.sources, 2);
        assert_eq!(skew.min, 2);
        assert_eq!(skew.max, 6);
        assert!((skew.max_share - 0.75).abs() < 1e-9);
    }

    #[test]
    fn empty_sources_have_no_share() {
        let counts: HashMap<SourceId, usize> = [("a".to_string(), 0)].into_iter().collect();
        let skew = source_skew(&counts).unwrap();
        assert_eq!(skew.max_share, 0.0);
    }
}
