// src/signal/pairs.rs

use crate::config::ConfigError;
use crate::types::LaneId;

/// Lanes grouped into pairs that are granted green together.
/// Every lane belongs to exactly one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanePairs {
    pairs: Vec<[LaneId; 2]>,
    /// lane id -> index into `pairs`
    pair_of_lane: Vec<usize>,
}

impl LanePairs {
    pub fn new(pairs: Vec<[LaneId; 2]>, lane_count: usize) -> Result<Self, ConfigError> {
        if pairs.is_empty() {
            return Err(ConfigError::Pairing("no lane pairs configured".to_string()));
        }

        let mut pair_of_lane: Vec<Option<usize>> = vec![None; lane_count];
        for (idx, pair) in pairs.iter().enumerate() {
            if pair[0] == pair[1] {
                return Err(ConfigError::Pairing(format!(
                    "pair {} repeats lane {}",
                    idx, pair[0]
                )));
            }
            for &lane in pair {
                let slot = pair_of_lane.get_mut(lane).ok_or_else(|| {
                    ConfigError::Pairing(format!(
                        "lane {} in pair {} does not exist ({} lanes configured)",
                        lane, idx, lane_count
                    ))
                })?;
                if let Some(other) = slot {
                    return Err(ConfigError::Pairing(format!(
                        "lane {} appears in pairs {} and {}",
                        lane, other, idx
                    )));
                }
                *slot = Some(idx);
            }
        }

        let pair_of_lane = pair_of_lane
            .into_iter()
            .enumerate()
            .map(|(lane, slot)| {
                slot.ok_or_else(|| ConfigError::Pairing(format!("lane {} is not in any pair", lane)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            pairs,
            pair_of_lane,
        })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn lane_count(&self) -> usize {
        self.pair_of_lane.len()
    }

    pub fn pair(&self, index: usize) -> [LaneId; 2] {
        self.pairs[index]
    }

    pub fn pair_of(&self, lane: LaneId) -> Option<usize> {
        self.pair_of_lane.get(lane).copied()
    }

    pub fn contains(&self, pair_index: usize, lane: LaneId) -> bool {
        self.pair_of(lane) == Some(pair_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_intersection() {
        let pairs = LanePairs::new(vec![[0, 2], [1, 3]], 4).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs.lane_count(), 4);
        assert_eq!(pairs.pair_of(0), Some(0));
        assert_eq!(pairs.pair_of(2), Some(0));
        assert_eq!(pairs.pair_of(1), Some(1));
        assert_eq!(pairs.pair_of(3), Some(1));
        assert_eq!(pairs.pair_of(4), None);
        assert!(pairs.contains(1, 3));
        assert!(!pairs.contains(0, 3));
        assert_eq!(pairs.pair(1), [1, 3]);
    }

    #[test]
    fn test_rejects_duplicate_lane() {
        assert!(matches!(
            LanePairs::new(vec![[0, 1], [1, 2]], 4),
            Err(ConfigError::Pairing(_))
        ));
        assert!(LanePairs::new(vec![[0, 0], [1, 2]], 3).is_err());
    }

    #[test]
    fn test_rejects_uncovered_lane() {
        assert!(LanePairs::new(vec![[0, 2]], 4).is_err());
    }

    #[test]
    fn test_rejects_unknown_lane() {
        assert!(LanePairs::new(vec![[0, 2], [1, 7]], 4).is_err());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(LanePairs::new(Vec::new(), 0).is_err());
    }
}
