use serde::{Deserialize, Serialize};
use std::fmt;

/// Robot/camera position a set of photos was taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId(pub u32);

/// Projector placement used while capturing structured-light patterns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectorId(pub u32);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ProjectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Ordered (left, right) pair of positions.
///
/// `left < right` by convention only; nothing relies on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StereoPair {
    pub left: PositionId,
    pub right: PositionId,
}

impl StereoPair {
    pub fn new(left: u32, right: u32) -> Self {
        Self {
            left: PositionId(left),
            right: PositionId(right),
        }
    }

    #[inline]
    pub fn position(&self, side: Side) -> PositionId {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    /// Consecutive pairs of a sorted, de-duplicated position list.
    pub fn adjacent(positions: &[PositionId]) -> Vec<StereoPair> {
        let mut sorted = positions.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted
            .windows(2)
            .map(|w| StereoPair {
                left: w[0],
                right: w[1],
            })
            .collect()
    }
}

impl fmt::Display for StereoPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.left, self.right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_pairs_sort_and_dedup() {
        let pairs = StereoPair::adjacent(&[PositionId(3), PositionId(1), PositionId(2), PositionId(1)]);
        assert_eq!(pairs, vec![StereoPair::new(1, 2), StereoPair::new(2, 3)]);
        assert!(StereoPair::adjacent(&[PositionId(0)]).is_empty());
    }
}
