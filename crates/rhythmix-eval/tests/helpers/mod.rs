#![allow(dead_code)]

use rhythmix_eval::{Compiler, Event, Executor, Value, compile, compile_with};
use serde_json::Value as Json;

pub fn exec(source: &str) -> Executor {
    compile(source).unwrap_or_else(|e| panic!("failed to compile '{source}': {e}"))
}

pub fn exec_with(source: &str, bindings: &[(&str, Value)]) -> Executor {
    compile_with(source, bindings.iter().cloned())
        .unwrap_or_else(|e| panic!("failed to compile '{source}': {e}"))
}

/// Events spaced `step` milliseconds apart, starting at 0.
pub fn series<V: ToString>(values: &[V], step: i64) -> Vec<Event> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| Event::at(i as i64 * step, v.to_string()))
        .collect()
}

/// Feed each event separately, collecting every result.
pub fn run(executor: &mut Executor, events: &[Event]) -> Vec<bool> {
    events
        .iter()
        .map(|e| executor.execute(e).unwrap())
        .collect()
}

pub fn run_values<V: ToString>(source: &str, values: &[V]) -> Vec<bool> {
    run(&mut exec(source), &series(values, 100))
}

pub fn event_json(json: Json) -> Event {
    Event::from_json(&json).unwrap()
}

pub fn compile_err(source: &str) -> rhythmix_eval::EvalError {
    Compiler::new()
        .compile(source)
        .err()
        .unwrap_or_else(|| panic!("expected '{source}' to fail"))
}
