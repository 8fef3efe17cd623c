//! Operator precedence tiers, lowest precedence first.

/// Ordered precedence tiers consumed by the parser.
///
/// The parser descends from tier `0` to `size() - 1`, building
/// left-associative binary nodes at each tier; unary and primary forms sit
/// above the last tier.
#[derive(Debug, Clone)]
pub struct PriorityTable {
    tiers: Vec<&'static [&'static str]>,
}

const TIERS: &[&[&str]] = &[
    &["&", "|", "^"],
    &["==", "!=", ">", "<", ">=", "<="],
    &["+", "-"],
    &["*", "/"],
    &["<<", ">>"],
    &["||"],
    &["&&"],
    &["!"],
];

impl PriorityTable {
    pub fn new() -> Self {
        PriorityTable {
            tiers: TIERS.to_vec(),
        }
    }

    pub fn size(&self) -> usize {
        self.tiers.len()
    }

    /// Operators of tier `level`. Panics if `level >= size()`.
    pub fn get(&self, level: usize) -> &[&'static str] {
        self.tiers[level]
    }

    /// Tier of a binary operator, if any.
    pub fn level_of(&self, op: &str) -> Option<usize> {
        self.tiers.iter().position(|tier| tier.contains(&op))
    }
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self::new()
    }
}
