//! Chain function registry: categories and the legal-transition table for
//! pipelines such as `filter(>0).window(5).avg().meet(>10)`.
//!
//! A registry is immutable once built. Extra function names are added with
//! [`ChainRegistryBuilder`] before any compilation starts.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;

/// Category of a chain function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChainCategory {
    /// Buffer producers (`filter`).
    Start,
    /// Buffer shapers (`limit`, `take`, `window`).
    Limit,
    /// Reducers to a scalar (`sum`, `avg`, ...).
    Calc,
    /// Final predicates (`meet`).
    End,
}

impl fmt::Display for ChainCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChainCategory::Start => "start",
            ChainCategory::Limit => "limit",
            ChainCategory::Calc => "calc",
            ChainCategory::End => "end",
        };
        write!(f, "{s}")
    }
}

/// Why a chain was rejected. Rendered into parse errors by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainViolation {
    Undefined(String),
    NotFirst(String),
    NotLast(String),
    IllegalSuccessor { prev: String, next: String },
    LimitWithWindow,
}

impl fmt::Display for ChainViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainViolation::Undefined(name) => write!(f, "{name} operator is not defined"),
            ChainViolation::NotFirst(name) => write!(f, "{name} cannot be the first operator"),
            ChainViolation::NotLast(name) => write!(f, "{name} cannot be the last operator"),
            ChainViolation::IllegalSuccessor { prev, next } => {
                write!(f, "'{prev}' operator cannot be followed by '{next}' operator")
            }
            ChainViolation::LimitWithWindow => {
                write!(f, "limit and window cannot be used together")
            }
        }
    }
}

/// Categorized chain function names plus the derived call tree.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    start: BTreeSet<String>,
    limit: BTreeSet<String>,
    calc: BTreeSet<String>,
    end: BTreeSet<String>,
    call_tree: HashMap<String, BTreeSet<String>>,
}

impl ChainRegistry {
    pub fn builder() -> ChainRegistryBuilder {
        ChainRegistryBuilder::default()
    }

    /// Category of `name`, if registered.
    pub fn category(&self, name: &str) -> Option<ChainCategory> {
        if self.start.contains(name) {
            Some(ChainCategory::Start)
        } else if self.limit.contains(name) {
            Some(ChainCategory::Limit)
        } else if self.calc.contains(name) {
            Some(ChainCategory::Calc)
        } else if self.end.contains(name) {
            Some(ChainCategory::End)
        } else {
            None
        }
    }

    pub fn is_chain_function(&self, name: &str) -> bool {
        self.category(name).is_some()
    }

    pub fn names(&self, category: ChainCategory) -> impl Iterator<Item = &str> {
        let set = match category {
            ChainCategory::Start => &self.start,
            ChainCategory::Limit => &self.limit,
            ChainCategory::Calc => &self.calc,
            ChainCategory::End => &self.end,
        };
        set.iter().map(String::as_str)
    }

    /// Legal successors of `name`.
    pub fn successors(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.call_tree.get(name)
    }

    /// Name of the implicit head inserted before chains that do not begin
    /// with a start function.
    pub fn default_start(&self) -> Option<&str> {
        if self.start.contains("filter") {
            Some("filter")
        } else {
            self.start.iter().next().map(String::as_str)
        }
    }

    pub fn check_first(&self, name: &str) -> Result<(), ChainViolation> {
        match self.category(name) {
            None => Err(ChainViolation::Undefined(name.to_string())),
            Some(ChainCategory::Start) => Ok(()),
            Some(_) => Err(ChainViolation::NotFirst(name.to_string())),
        }
    }

    pub fn check_transition(&self, prev: &str, next: &str) -> Result<(), ChainViolation> {
        if self.category(next).is_none() {
            return Err(ChainViolation::Undefined(next.to_string()));
        }
        if prev == "take" && next == "limit" || prev == "window" && next == "limit" {
            return Err(ChainViolation::IllegalSuccessor {
                prev: prev.to_string(),
                next: next.to_string(),
            });
        }
        match self.successors(prev) {
            Some(succ) if succ.contains(next) => Ok(()),
            _ => Err(ChainViolation::IllegalSuccessor {
                prev: prev.to_string(),
                next: next.to_string(),
            }),
        }
    }

    pub fn check_last(&self, name: &str) -> Result<(), ChainViolation> {
        match self.category(name) {
            Some(ChainCategory::End) => Ok(()),
            Some(_) => Err(ChainViolation::NotLast(name.to_string())),
            None => Err(ChainViolation::Undefined(name.to_string())),
        }
    }

    /// Validate a whole pipeline, left to right.
    pub fn validate<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ChainViolation> {
        let names: Vec<&str> = names.into_iter().collect();
        let Some(first) = names.first() else {
            return Ok(());
        };
        self.check_first(first)?;
        for pair in names.windows(2) {
            self.check_transition(pair[0], pair[1])?;
        }
        if names.contains(&"limit") && names.contains(&"window") {
            return Err(ChainViolation::LimitWithWindow);
        }
        if let Some(last) = names.last() {
            self.check_last(last)?;
        }
        Ok(())
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        ChainRegistryBuilder::default().build()
    }
}

/// Collects function names per category, then derives the call tree.
#[derive(Debug, Clone)]
pub struct ChainRegistryBuilder {
    start: BTreeSet<String>,
    limit: BTreeSet<String>,
    calc: BTreeSet<String>,
    end: BTreeSet<String>,
}

impl Default for ChainRegistryBuilder {
    /// Starts from the built-in function names.
    fn default() -> Self {
        let set = |names: &[&str]| names.iter().map(|s| s.to_string()).collect();
        ChainRegistryBuilder {
            start: set(&["filter"]),
            limit: set(&["limit", "take", "window"]),
            calc: set(&["sum", "hitRate", "count", "avg", "stddev"]),
            end: set(&["meet"]),
        }
    }
}

impl ChainRegistryBuilder {
    /// A builder with no names at all.
    pub fn empty() -> Self {
        ChainRegistryBuilder {
            start: BTreeSet::new(),
            limit: BTreeSet::new(),
            calc: BTreeSet::new(),
            end: BTreeSet::new(),
        }
    }

    pub fn add_start_func(mut self, name: impl Into<String>) -> Self {
        self.start.insert(name.into());
        self
    }

    pub fn add_limit_func(mut self, name: impl Into<String>) -> Self {
        self.limit.insert(name.into());
        self
    }

    pub fn add_calc_func(mut self, name: impl Into<String>) -> Self {
        self.calc.insert(name.into());
        self
    }

    pub fn add_end_func(mut self, name: impl Into<String>) -> Self {
        self.end.insert(name.into());
        self
    }

    pub fn build(self) -> ChainRegistry {
        let mut call_tree: HashMap<String, BTreeSet<String>> = HashMap::new();
        let limit_or_calc: BTreeSet<String> = self.limit.union(&self.calc).cloned().collect();
        for name in &self.start {
            call_tree.insert(name.clone(), limit_or_calc.clone());
        }
        for name in &self.limit {
            call_tree.insert(name.clone(), limit_or_calc.clone());
        }
        for name in &self.calc {
            call_tree.insert(name.clone(), self.end.clone());
        }
        for name in &self.end {
            call_tree.insert(name.clone(), BTreeSet::new());
        }
        ChainRegistry {
            start: self.start,
            limit: self.limit,
            calc: self.calc,
            end: self.end,
            call_tree,
        }
    }
}
