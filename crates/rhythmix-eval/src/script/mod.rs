//! The step language compiled conditions are emitted in, and its evaluator.
//!
//! The translator produces a program string; an [`Evaluator`] runs it once per
//! event against the condition's [`Environment`]. Parsed programs are cached
//! by source text so repeated evaluation never re-parses.

mod interpreter;
mod parse;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::debug;

use crate::env::Environment;
use crate::error::Result;
use crate::udf::UdfRegistry;
use crate::value::Value;

pub use parse::{BinaryOp, Expr, Program, Stmt, parse_program, quote};

/// Whether `name` is a step-language keyword or built-in helper.
pub(crate) fn is_reserved(name: &str) -> bool {
    parse::KEYWORDS.contains(&name) || interpreter::HELPERS.contains(&name)
}

/// Runs compiled program text against an environment.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, code: &str, env: &mut Environment) -> Result<Value>;
}

/// Default [`Evaluator`]: pest-parsed, tree-walking, with a parse cache.
#[derive(Debug, Default)]
pub struct ScriptEvaluator {
    udfs: Arc<UdfRegistry>,
    cache: RwLock<HashMap<String, Arc<Program>>>,
}

impl ScriptEvaluator {
    pub fn new(udfs: Arc<UdfRegistry>) -> Self {
        ScriptEvaluator {
            udfs,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn udfs(&self) -> &UdfRegistry {
        &self.udfs
    }

    /// Parse `code`, reusing a cached program when one exists.
    pub fn program(&self, code: &str) -> Result<Arc<Program>> {
        if let Ok(cache) = self.cache.read()
            && let Some(program) = cache.get(code)
        {
            return Ok(Arc::clone(program));
        }
        let program = Arc::new(parse_program(code)?);
        debug!("cached step program ({} statements)", program.stmts.len());
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(code.to_string(), Arc::clone(&program));
        }
        Ok(program)
    }

    pub fn cached(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}

impl Evaluator for ScriptEvaluator {
    fn evaluate(&self, code: &str, env: &mut Environment) -> Result<Value> {
        let program = self.program(code)?;
        interpreter::run(&program, env, &self.udfs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    #[test]
    fn test_programs_are_cached() {
        let evaluator = ScriptEvaluator::new(Arc::new(UdfRegistry::with_builtins()));
        let mut env = Environment::new();
        env.set("event", Value::Event(Event::at(0, "7")));
        for _ in 0..3 {
            let v = evaluator.evaluate("(event.value > 4)", &mut env).unwrap();
            assert_eq!(v, Value::Bool(true));
        }
        assert_eq!(evaluator.cached(), 1);
    }

    #[test]
    fn test_evaluator_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ScriptEvaluator>();
    }

    #[test]
    fn test_parse_errors_surface() {
        let evaluator = ScriptEvaluator::default();
        let err = evaluator.evaluate("(", &mut Environment::new()).unwrap_err();
        assert!(matches!(err, crate::error::EvalError::Script(_)));
    }
}
