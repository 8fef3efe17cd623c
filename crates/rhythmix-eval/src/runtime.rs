//! Compilation entry point and the per-condition executor.
//!
//! A [`Compiler`] is built once (chain registry, UDFs, options) and shared;
//! each [`Compiler::compile`] call produces a [`CompiledProgram`] holding the
//! program text and its initial [`Environment`]. An [`Executor`] owns one
//! compiled condition and feeds it events.

use std::fmt;
use std::sync::Arc;

use log::{debug, trace};
use rhythmix_parser::{ChainRegistry, ChainRegistryBuilder, parse_source};

use crate::env::Environment;
use crate::error::{EvalError, Result};
use crate::event::Event;
use crate::naming::NameCounter;
use crate::script::{Evaluator, ScriptEvaluator, parse_program};
use crate::translate::translate;
use crate::udf::UdfRegistry;
use crate::value::Value;

// =============================================================================
// Options
// =============================================================================

/// Compilation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Separator between a hidden variable's base name and its counter.
    pub split_symbol: char,
    /// Name the current event is bound to in compiled programs.
    pub event_binding: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            split_symbol: '$',
            event_binding: "event".to_string(),
        }
    }
}

// =============================================================================
// Compiled output
// =============================================================================

/// Program text plus the environment it starts from.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    pub code: String,
    pub environment: Environment,
    pub event_binding: String,
}

/// Outcome of [`Compiler::compile_detailed`].
#[derive(Debug, Clone)]
pub struct CompilationResult {
    pub success: bool,
    pub program: Option<CompiledProgram>,
    pub error: Option<EvalError>,
    /// The error rendered against the source, with a caret marker.
    pub formatted: Option<String>,
}

// =============================================================================
// Compiler
// =============================================================================

pub struct Compiler {
    chains: ChainRegistry,
    udfs: Arc<UdfRegistry>,
    names: Arc<NameCounter>,
    options: CompileOptions,
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("udfs", &self.udfs)
            .field("options", &self.options)
            .finish()
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// A compiler with the built-in chain functions and UDFs.
    pub fn new() -> Self {
        Self::with_udfs(UdfRegistry::with_builtins())
    }

    /// Calculator UDFs in `udfs` become chain calc functions.
    pub fn with_udfs(udfs: UdfRegistry) -> Self {
        Self::build(ChainRegistryBuilder::default(), udfs, CompileOptions::default())
    }

    pub fn build(
        chains: ChainRegistryBuilder,
        udfs: UdfRegistry,
        options: CompileOptions,
    ) -> Self {
        let chains = udfs
            .calculator_names()
            .fold(chains, |b, name| b.add_calc_func(name))
            .build();
        Compiler {
            chains,
            udfs: Arc::new(udfs),
            names: Arc::new(NameCounter::new(options.split_symbol)),
            options,
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    pub fn udfs(&self) -> &Arc<UdfRegistry> {
        &self.udfs
    }

    pub fn names(&self) -> &NameCounter {
        &self.names
    }

    pub fn compile(&self, source: &str) -> Result<CompiledProgram> {
        self.compile_with(source, std::iter::empty::<(String, Value)>())
    }

    /// Compile with extra bindings visible to the condition as variables.
    pub fn compile_with<K, I>(&self, source: &str, bindings: I) -> Result<CompiledProgram>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let ast = parse_source(source, &self.chains)?;

        let mut environment = Environment::new();
        environment.set(self.options.event_binding.clone(), Value::Nil);
        for (name, value) in bindings {
            environment.set(name, value);
        }

        let code = translate(
            &ast,
            &mut environment,
            &self.udfs,
            &self.names,
            &self.options.event_binding,
        )?;
        // a program the step parser rejects would fail on every event
        parse_program(&code)?;
        environment.snapshot();
        debug!("compiled '{source}' with {} bindings", environment.len());

        Ok(CompiledProgram {
            code,
            environment,
            event_binding: self.options.event_binding.clone(),
        })
    }

    /// Like [`compile`](Self::compile), but never fails: errors are captured
    /// together with a caret-annotated rendering of the source.
    pub fn compile_detailed(&self, source: &str) -> CompilationResult {
        match self.compile(source) {
            Ok(program) => CompilationResult {
                success: true,
                program: Some(program),
                error: None,
                formatted: None,
            },
            Err(e) => CompilationResult {
                success: false,
                program: None,
                formatted: Some(e.render(source)),
                error: Some(e),
            },
        }
    }

    /// Compile `source` and wrap it in an [`Executor`] using the script
    /// evaluator.
    pub fn executor(&self, source: &str) -> Result<Executor> {
        let program = self.compile(source)?;
        Ok(Executor::new(program, self.evaluator()))
    }

    pub fn executor_with<K, I>(&self, source: &str, bindings: I) -> Result<Executor>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let program = self.compile_with(source, bindings)?;
        Ok(Executor::new(program, self.evaluator()))
    }

    fn evaluator(&self) -> Box<dyn Evaluator> {
        Box::new(ScriptEvaluator::new(Arc::clone(&self.udfs)))
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Runs one compiled condition over a stream of events.
///
/// State lives in the executor's own environment; a `true` result restores
/// the compiled snapshot (carry-over bindings excepted).
pub struct Executor {
    code: String,
    environment: Environment,
    event_binding: String,
    evaluator: Box<dyn Evaluator>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("code", &self.code)
            .field("environment", &self.environment)
            .finish()
    }
}

impl Executor {
    pub fn new(program: CompiledProgram, evaluator: Box<dyn Evaluator>) -> Self {
        Executor {
            code: program.code,
            environment: program.environment,
            event_binding: program.event_binding,
            evaluator,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    fn step(&mut self, event: &Event) -> Result<bool> {
        self.environment
            .set(self.event_binding.clone(), Value::Event(event.clone()));
        let result = self.evaluator.evaluate(&self.code, &mut self.environment)?;
        trace!("event {}@{} -> {result}", event.value, event.ts);
        Ok(result.is_truthy())
    }

    /// Feed one event. Resets the state after a match.
    pub fn execute(&mut self, event: &Event) -> Result<bool> {
        let matched = self.step(event)?;
        if matched {
            self.reset();
        }
        Ok(matched)
    }

    /// Feed events in order; the last event's result decides. State is reset
    /// once, at the end, after a match.
    pub fn execute_batch(&mut self, events: &[Event]) -> Result<bool> {
        let mut matched = false;
        for event in events {
            matched = self.step(event)?;
        }
        if matched {
            self.reset();
        }
        Ok(matched)
    }

    /// Restore the compiled state, keeping carry-over bindings.
    pub fn reset(&mut self) {
        debug!("resetting condition state");
        self.environment.reset();
    }
}
