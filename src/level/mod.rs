use serde::{Serialize, Serializer};
use std::fmt;

/// A compression level or named strategy passed to the test tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Numeric(u32),
    Strategy(char),
}

impl Level {
    /// Label used for report rows and corpus lookups ("6", "R", ...).
    pub fn label(&self) -> String {
        self.to_string()
    }

    /// Command line flag selecting this level on the test tool.
    pub fn flag(&self) -> String {
        format!("-{}", self)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Numeric(n) => write!(f, "{}", n),
            Level::Strategy(c) => write!(f, "{}", c),
        }
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

/// Builds the ordered level list: the numeric range, then each strategy
/// character in the order given.
pub fn level_sequence(min: u32, max: u32, strategies: &str) -> Vec<Level> {
    (min..=max)
        .map(Level::Numeric)
        .chain(strategies.chars().map(Level::Strategy))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_range_comes_before_strategies() {
        let levels = level_sequence(1, 3, "hR");
        assert_eq!(
            levels,
            vec![
                Level::Numeric(1),
                Level::Numeric(2),
                Level::Numeric(3),
                Level::Strategy('h'),
                Level::Strategy('R'),
            ]
        );
    }

    #[test]
    fn flags_and_labels() {
        assert_eq!(Level::Numeric(9).flag(), "-9");
        assert_eq!(Level::Strategy('F').flag(), "-F");
        assert_eq!(Level::Numeric(0).label(), "0");
    }
}
