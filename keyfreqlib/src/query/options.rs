//! Options controlling how ranked lists are built.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Sort order of a ranked list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Order {
    /// Highest count first
    #[default]
    Descending,
    /// Lowest count first
    Ascending,
    /// Keep the table's iteration order
    Unsorted,
}

impl FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "desc" | "descending" => Ok(Order::Descending),
            "asc" | "ascending" => Ok(Order::Ascending),
            "none" | "unsorted" => Ok(Order::Unsorted),
            _ => Err(format!("Unknown order: {}", s)),
        }
    }
}

/// Count filter applied to entries (never to the total).
///
/// Built from a signed number: positive keeps counts strictly above it,
/// negative keeps counts strictly below its magnitude, zero keeps everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Threshold {
    #[default]
    All,
    /// Keep entries with count > n
    Above(u64),
    /// Keep entries with count < n
    Below(u64),
}

impl Threshold {
    pub fn accepts(&self, count: u64) -> bool {
        match *self {
            Threshold::All => true,
            Threshold::Above(n) => count > n,
            Threshold::Below(n) => count < n,
        }
    }
}

impl From<i64> for Threshold {
    fn from(value: i64) -> Self {
        match value {
            0 => Threshold::All,
            n if n > 0 => Threshold::Above(n.unsigned_abs()),
            n => Threshold::Below(n.unsigned_abs()),
        }
    }
}

impl From<Option<i64>> for Threshold {
    fn from(value: Option<i64>) -> Self {
        value.map(Threshold::from).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_default() {
        assert_eq!(Order::default(), Order::Descending);
    }

    #[test]
    fn test_order_from_str() {
        assert_eq!(Order::from_str("desc").unwrap(), Order::Descending);
        assert_eq!(Order::from_str("Ascending").unwrap(), Order::Ascending);
        assert_eq!(Order::from_str("none").unwrap(), Order::Unsorted);
        assert!(Order::from_str("sideways").is_err());
    }

    #[test]
    fn test_threshold_from_signed() {
        assert_eq!(Threshold::from(0i64), Threshold::All);
        assert_eq!(Threshold::from(3i64), Threshold::Above(3));
        assert_eq!(Threshold::from(-5i64), Threshold::Below(5));
        assert_eq!(Threshold::from(None::<i64>), Threshold::All);
        assert_eq!(Threshold::from(Some(-1i64)), Threshold::Below(1));
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(Threshold::All.accepts(0));
        assert!(Threshold::Above(3).accepts(4));
        assert!(!Threshold::Above(3).accepts(3));
        assert!(Threshold::Below(5).accepts(4));
        assert!(!Threshold::Below(5).accepts(5));
    }
}
