use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerScore {
    pub ticker: String,
    pub score: f64,
    pub signals: HashMap<String, f64>,
    pub rank: u32,
}

impl TickerScore {
    pub fn new(
        ticker: impl Into<String>,
        score: f64,
        signals: HashMap<String, f64>,
        rank: u32,
    ) -> Result<Self, ValidationError> {
        if rank < 1 {
            return Err(ValidationError::new("rank", "must be >= 1".to_string()));
        }
        if !score.is_finite() {
            return Err(ValidationError::new("score", "must be finite".to_string()));
        }
        Ok(Self {
            ticker: ticker.into(),
            score,
            signals,
            rank,
        })
    }
}

/// Re-sorts by score descending and re-assigns ranks `1..=n` with no gaps.
/// Used after the catalyst adjustment pass in the scan pipeline.
pub fn resort_and_rerank(mut scores: Vec<TickerScore>) -> Vec<TickerScore> {
    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    for (idx, ts) in scores.iter_mut().enumerate() {
        ts.rank = (idx + 1) as u32;
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_have_no_gaps_after_rerank() {
        let scores = vec![
            TickerScore::new("A", 10.0, HashMap::new(), 1).unwrap(),
            TickerScore::new("B", 50.0, HashMap::new(), 1).unwrap(),
            TickerScore::new("C", 30.0, HashMap::new(), 1).unwrap(),
        ];
        let reranked = resort_and_rerank(scores);
        let ranks: Vec<u32> = reranked.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert_eq!(reranked[0].ticker, "B");
        assert_eq!(reranked[2].ticker, "A");
    }

    #[test]
    fn rejects_rank_below_one() {
        assert!(TickerScore::new("A", 1.0, HashMap::new(), 0).is_err());
    }
}
