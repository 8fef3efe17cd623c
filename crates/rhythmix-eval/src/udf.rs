//! User-defined predicates and calculators.
//!
//! Three capability contracts:
//! - [`FilterUdf`]: `event -> bool`, usable wherever an event predicate is
//!   expected (`filter(positiveFilter())`, `count(tempFilter(), 3)`)
//! - [`MeetUdf`]: `number -> bool`, usable inside `meet(...)`
//! - [`CalculatorUdf`]: `events -> number`, usable as a chain calc link
//!   (`filter().window(5).maxcalc().meet(>3)`)
//!
//! Implementations are registered explicitly on a [`UdfRegistry`]. Built-ins
//! are ordinary implementations of the same traits. None of them may panic:
//! input that is not a number yields `false`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::event::Event;
use crate::script;
use crate::translate::FUNCTIONS;

// =============================================================================
// Contracts
// =============================================================================

pub trait FilterUdf: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, event: &Event) -> bool;
}

pub trait MeetUdf: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, value: f64) -> bool;
}

pub trait CalculatorUdf: Send + Sync {
    fn name(&self) -> &str;
    fn calculate(&self, events: &[Event]) -> f64;
}

/// Which contract a registered name satisfies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdfKind {
    Filter,
    Meet,
    Calculator,
}

impl fmt::Display for UdfKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UdfKind::Filter => "filter",
            UdfKind::Meet => "meet",
            UdfKind::Calculator => "calculator",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Name → implementation mapping consulted by the translator (lookup) and the
/// script evaluator (invocation). Names are unique across all three kinds.
#[derive(Default, Clone)]
pub struct UdfRegistry {
    filters: HashMap<String, Arc<dyn FilterUdf>>,
    meets: HashMap<String, Arc<dyn MeetUdf>>,
    calculators: HashMap<String, Arc<dyn CalculatorUdf>>,
}

impl fmt::Debug for UdfRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("UdfRegistry").field("names", &names).finish()
    }
}

impl UdfRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in predicate and calculator.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register_filter(PositiveFilter);
        reg.register_filter(NumericFilter);
        reg.register_filter(TemperatureFilter::default());
        reg.register_meet(PositiveMeet);
        reg.register_meet(EvenMeet);
        reg.register_meet(ThresholdMeet::default());
        reg.register_meet(RangeMeet::default());
        reg.register_calculator(MaxCalculator);
        reg.register_calculator(MinCalculator);
        reg
    }

    fn accept(&self, name: &str, kind: UdfKind) -> bool {
        if name.trim().is_empty() {
            log::warn!("rejected {kind} UDF with an empty name");
            return false;
        }
        if !is_identifier(name) {
            log::warn!("rejected {kind} UDF '{name}': not a valid identifier");
            return false;
        }
        if script::is_reserved(name) || FUNCTIONS.contains(&name) {
            log::warn!("rejected {kind} UDF '{name}': name is reserved");
            return false;
        }
        if let Some(existing) = self.kind_of(name) {
            log::warn!("rejected {kind} UDF '{name}': name already registered as a {existing} UDF");
            return false;
        }
        true
    }

    /// Returns `false` (and logs a warning) for names that are empty, already
    /// registered, not plain identifiers, or owned by the language itself
    /// (`count`, `len`, `nil`, ...).
    pub fn register_filter(&mut self, udf: impl FilterUdf + 'static) -> bool {
        let name = udf.name().to_string();
        if !self.accept(&name, UdfKind::Filter) {
            return false;
        }
        self.filters.insert(name, Arc::new(udf));
        true
    }

    pub fn register_meet(&mut self, udf: impl MeetUdf + 'static) -> bool {
        let name = udf.name().to_string();
        if !self.accept(&name, UdfKind::Meet) {
            return false;
        }
        self.meets.insert(name, Arc::new(udf));
        true
    }

    pub fn register_calculator(&mut self, udf: impl CalculatorUdf + 'static) -> bool {
        let name = udf.name().to_string();
        if !self.accept(&name, UdfKind::Calculator) {
            return false;
        }
        self.calculators.insert(name, Arc::new(udf));
        true
    }

    pub fn kind_of(&self, name: &str) -> Option<UdfKind> {
        if self.filters.contains_key(name) {
            Some(UdfKind::Filter)
        } else if self.meets.contains_key(name) {
            Some(UdfKind::Meet)
        } else if self.calculators.contains_key(name) {
            Some(UdfKind::Calculator)
        } else {
            None
        }
    }

    pub fn filter(&self, name: &str) -> Option<&Arc<dyn FilterUdf>> {
        self.filters.get(name)
    }

    pub fn meet(&self, name: &str) -> Option<&Arc<dyn MeetUdf>> {
        self.meets.get(name)
    }

    pub fn calculator(&self, name: &str) -> Option<&Arc<dyn CalculatorUdf>> {
        self.calculators.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters
            .keys()
            .chain(self.meets.keys())
            .chain(self.calculators.keys())
            .map(String::as_str)
    }

    /// Names of calculator UDFs, to be added as chain calc functions.
    pub fn calculator_names(&self) -> impl Iterator<Item = &str> {
        self.calculators.keys().map(String::as_str)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// =============================================================================
// Built-in filters
// =============================================================================

/// Value is a number greater than zero.
#[derive(Debug, Clone, Copy)]
pub struct PositiveFilter;

impl FilterUdf for PositiveFilter {
    fn name(&self) -> &str {
        "positiveFilter"
    }

    fn apply(&self, event: &Event) -> bool {
        event.numeric_value().is_some_and(|v| v > 0.0)
    }
}

/// Value parses as a number.
#[derive(Debug, Clone, Copy)]
pub struct NumericFilter;

impl FilterUdf for NumericFilter {
    fn name(&self) -> &str {
        "numericFilter"
    }

    fn apply(&self, event: &Event) -> bool {
        event.numeric_value().is_some()
    }
}

/// Plausible temperature reading: `min <= value <= max`.
#[derive(Debug, Clone, Copy)]
pub struct TemperatureFilter {
    pub min: f64,
    pub max: f64,
}

impl Default for TemperatureFilter {
    fn default() -> Self {
        TemperatureFilter {
            min: -50.0,
            max: 100.0,
        }
    }
}

impl FilterUdf for TemperatureFilter {
    fn name(&self) -> &str {
        "tempFilter"
    }

    fn apply(&self, event: &Event) -> bool {
        event
            .numeric_value()
            .is_some_and(|v| v >= self.min && v <= self.max)
    }
}

// =============================================================================
// Built-in meets
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct PositiveMeet;

impl MeetUdf for PositiveMeet {
    fn name(&self) -> &str {
        "positiveMeet"
    }

    fn apply(&self, value: f64) -> bool {
        value > 0.0
    }
}

/// Integral and even.
#[derive(Debug, Clone, Copy)]
pub struct EvenMeet;

impl MeetUdf for EvenMeet {
    fn name(&self) -> &str {
        "evenMeet"
    }

    fn apply(&self, value: f64) -> bool {
        value.is_finite() && value.fract() == 0.0 && (value % 2.0) == 0.0
    }
}

/// `value >= threshold`.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdMeet {
    pub threshold: f64,
}

impl Default for ThresholdMeet {
    fn default() -> Self {
        ThresholdMeet { threshold: 10.0 }
    }
}

impl MeetUdf for ThresholdMeet {
    fn name(&self) -> &str {
        "thresholdMeet"
    }

    fn apply(&self, value: f64) -> bool {
        value >= self.threshold
    }
}

/// `min <= value <= max`, both bounds inclusive.
#[derive(Debug, Clone, Copy)]
pub struct RangeMeet {
    pub min: f64,
    pub max: f64,
}

impl Default for RangeMeet {
    fn default() -> Self {
        RangeMeet {
            min: 5.0,
            max: 50.0,
        }
    }
}

impl MeetUdf for RangeMeet {
    fn name(&self) -> &str {
        "rangeMeet"
    }

    fn apply(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

// =============================================================================
// Built-in calculators
// =============================================================================

/// Largest numeric value, `0` when there is none.
#[derive(Debug, Clone, Copy)]
pub struct MaxCalculator;

impl CalculatorUdf for MaxCalculator {
    fn name(&self) -> &str {
        "maxcalc"
    }

    fn calculate(&self, events: &[Event]) -> f64 {
        events
            .iter()
            .filter_map(Event::numeric_value)
            .reduce(f64::max)
            .unwrap_or(0.0)
    }
}

/// Smallest numeric value, `0` when there is none.
#[derive(Debug, Clone, Copy)]
pub struct MinCalculator;

impl CalculatorUdf for MinCalculator {
    fn name(&self) -> &str {
        "mincalc"
    }

    fn calculate(&self, events: &[Event]) -> f64 {
        events
            .iter()
            .filter_map(Event::numeric_value)
            .reduce(f64::min)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl FilterUdf for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn apply(&self, _event: &Event) -> bool {
            true
        }
    }

    #[test]
    fn test_builtins_registered() {
        let reg = UdfRegistry::with_builtins();
        assert_eq!(reg.kind_of("positiveFilter"), Some(UdfKind::Filter));
        assert_eq!(reg.kind_of("rangeMeet"), Some(UdfKind::Meet));
        assert_eq!(reg.kind_of("maxcalc"), Some(UdfKind::Calculator));
        assert_eq!(reg.kind_of("nope"), None);
    }

    #[test]
    fn test_duplicate_and_empty_names_rejected() {
        let mut reg = UdfRegistry::with_builtins();
        assert!(!reg.register_filter(Named("positiveFilter")));
        assert!(!reg.register_filter(Named("rangeMeet")));
        assert!(!reg.register_filter(Named("  ")));
        assert!(reg.register_filter(Named("alwaysFilter")));
        assert_eq!(reg.kind_of("alwaysFilter"), Some(UdfKind::Filter));
    }

    #[test]
    fn test_reserved_names_rejected() {
        let mut reg = UdfRegistry::new();
        for name in ["len", "first", "sum", "sqrt", "hit_rate", "if", "nil", "true", "count", "hitRate"] {
            assert!(!reg.register_filter(Named(name)), "{name}");
        }
        for name in ["my-filter", "9lives", "a$1", "a b"] {
            assert!(!reg.register_filter(Named(name)), "{name}");
        }
        assert!(reg.register_filter(Named("lenient_filter")));
        assert_eq!(reg.names().count(), 1);
    }

    #[test]
    fn test_filters_never_accept_garbage() {
        let bad = Event::at(0, "n/a");
        let reg = UdfRegistry::with_builtins();
        for name in ["positiveFilter", "numericFilter", "tempFilter"] {
            assert!(!reg.filter(name).unwrap().apply(&bad), "{name}");
        }
    }

    #[test]
    fn test_temperature_bounds_inclusive() {
        let f = TemperatureFilter::default();
        assert!(f.apply(&Event::at(0, -50)));
        assert!(f.apply(&Event::at(0, 100)));
        assert!(!f.apply(&Event::at(0, 100.5)));
    }

    #[test]
    fn test_range_meet_bounds_inclusive() {
        let m = RangeMeet::default();
        assert!(m.apply(5.0));
        assert!(m.apply(50.0));
        assert!(!m.apply(4.999));
        assert!(!m.apply(50.001));
        assert!(!m.apply(f64::NAN));
    }

    #[test]
    fn test_even_and_threshold() {
        assert!(EvenMeet.apply(4.0));
        assert!(!EvenMeet.apply(3.0));
        assert!(!EvenMeet.apply(2.5));
        assert!(!EvenMeet.apply(f64::INFINITY));
        assert!(ThresholdMeet::default().apply(10.0));
        assert!(!ThresholdMeet::default().apply(9.99));
        assert!(!PositiveMeet.apply(0.0));
    }

    #[test]
    fn test_calculators() {
        let events = vec![Event::at(0, 3), Event::at(1, "x"), Event::at(2, -1), Event::at(3, 8)];
        assert_eq!(MaxCalculator.calculate(&events), 8.0);
        assert_eq!(MinCalculator.calculate(&events), -1.0);
        assert_eq!(MaxCalculator.calculate(&[]), 0.0);
    }
}
