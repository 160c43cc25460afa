use serde::Serialize;
use std::path::PathBuf;

/// One image's position in a method's ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    /// 1-based, contiguous and unique within one method
    pub rank: usize,
    pub score: f64,
    pub source: PathBuf,
}

/// Rank scored images by descending score.
///
/// `scored` must be in discovery order: equal scores keep that order, so the
/// first-discovered image takes the better rank.
pub fn rank(scored: &[(PathBuf, f64)]) -> Vec<RankedEntry> {
    let mut order: Vec<usize> = (0..scored.len()).collect();
    // Stable sort, so ties stay in discovery order
    order.sort_by(|&a, &b| scored[b].1.total_cmp(&scored[a].1));

    order
        .into_iter()
        .enumerate()
        .map(|(position, index)| RankedEntry {
            rank: position + 1,
            score: scored[index].1,
            source: scored[index].0.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(items: &[(&str, f64)]) -> Vec<(PathBuf, f64)> {
        items.iter().map(|(p, s)| (PathBuf::from(p), *s)).collect()
    }

    #[test]
    fn test_rank_descending() {
        let ranked = rank(&scored(&[("a.jpg", 0.0), ("b.jpg", 50.0), ("c.jpg", 200.0)]));
        let order: Vec<&str> = ranked.iter().map(|e| e.source.to_str().unwrap()).collect();
        assert_eq!(order, vec!["c.jpg", "b.jpg", "a.jpg"]);
        assert_eq!(ranked[0].score, 200.0);
    }

    #[test]
    fn test_ranks_are_contiguous() {
        let input = scored(&[
            ("1", 3.0),
            ("2", 3.0),
            ("3", 0.0),
            ("4", 7.5),
            ("5", 0.0),
            ("6", 1e9),
        ]);
        let ranked = rank(&input);
        let ranks: Vec<usize> = ranked.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_ties_keep_discovery_order() {
        let ranked = rank(&scored(&[("x.png", 0.0), ("y.png", 0.0)]));
        assert_eq!(ranked[0].source, PathBuf::from("x.png"));
        assert_eq!(ranked[1].source, PathBuf::from("y.png"));

        // Same input, same answer
        assert_eq!(ranked, rank(&scored(&[("x.png", 0.0), ("y.png", 0.0)])));
    }

    #[test]
    fn test_ties_among_other_scores() {
        let ranked = rank(&scored(&[
            ("a", 5.0),
            ("b", 9.0),
            ("c", 5.0),
            ("d", 5.0),
        ]));
        let order: Vec<&str> = ranked.iter().map(|e| e.source.to_str().unwrap()).collect();
        assert_eq!(order, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(rank(&[]).is_empty());
    }
}
