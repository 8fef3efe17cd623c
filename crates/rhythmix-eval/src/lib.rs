//! # rhythmix-eval
//!
//! Compiler and runtime for Rhythmix conditions.
//!
//! This crate consumes the AST produced by [`rhythmix_parser`], translates it
//! into a small step program over hidden state, and evaluates that program
//! once per event.
//!
//! ## Architecture
//!
//! - **Translator** ([`translate`]): type checks, then emits per-function
//!   state updates (`count`, `delay`, `keep`, `slope`, arrows, chains) and a
//!   pure result expression. Hidden variables get collision-free names from a
//!   shared [`NameCounter`].
//! - **Environment** ([`env`]): ordered bindings plus the snapshot a match
//!   resets to. Time-windowed chain buffers carry over across resets.
//! - **Script evaluator** ([`script`]): pest grammar and Pratt parser for the
//!   step language, behind the [`Evaluator`] trait.
//! - **UDFs** ([`udf`]): filter, meet and calculator predicates registered
//!   explicitly on a [`UdfRegistry`].
//!
//! ## Quick Start
//!
//! ```rust
//! use rhythmix_eval::{Event, compile};
//!
//! let mut exec = compile("count!(>4, 3)").unwrap();
//! let values = [11, 11, 1, 11, 11, 11];
//! let results: Vec<bool> = values
//!     .iter()
//!     .enumerate()
//!     .map(|(i, v)| exec.execute(&Event::at(i as i64 * 100, v)).unwrap())
//!     .collect();
//! assert_eq!(results, [false, false, false, false, false, true]);
//! ```
//!
//! ## Chains and bindings
//!
//! ```rust
//! use rhythmix_eval::{Event, Value, compile_with};
//!
//! let mut exec = compile_with(
//!     "filter(>0).window(3).avg().meet(>threshold)",
//!     [("threshold", Value::Int(10))],
//! )
//! .unwrap();
//! assert!(!exec.execute(&Event::at(0, 20)).unwrap());
//! assert!(!exec.execute(&Event::at(1, 20)).unwrap());
//! assert!(exec.execute(&Event::at(2, 20)).unwrap());
//! ```

pub mod env;
pub mod error;
pub mod event;
pub mod naming;
pub mod runtime;
pub mod script;
pub mod translate;
pub mod udf;
pub mod value;

// Re-export the most commonly used types and functions at crate root
pub use env::Environment;
pub use error::{EvalError, Result};
pub use event::Event;
pub use naming::NameCounter;
pub use runtime::{CompilationResult, CompileOptions, CompiledProgram, Compiler, Executor};
pub use script::{Evaluator, ScriptEvaluator};
pub use udf::{
    CalculatorUdf, EvenMeet, FilterUdf, MaxCalculator, MeetUdf, MinCalculator, NumericFilter,
    PositiveFilter, PositiveMeet, RangeMeet, TemperatureFilter, ThresholdMeet, UdfKind,
    UdfRegistry,
};
pub use value::Value;

/// Compile `source` with the built-in functions and UDFs, ready to execute.
pub fn compile(source: &str) -> Result<Executor> {
    Compiler::new().executor(source)
}

/// [`compile`] with extra variable bindings.
pub fn compile_with<K, I>(source: &str, bindings: I) -> Result<Executor>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    Compiler::new().executor_with(source, bindings)
}
