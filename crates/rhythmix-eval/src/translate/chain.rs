//! Chain pipelines: `filter(...).limit|take|window(...).<calc>().meet(...)`.
//!
//! The links fold over one hidden buffer. Shapers applied directly to the
//! buffer trim it in place; after a `take` the pipeline continues on a
//! separate view so the buffer itself is never sliced away.
//!
//! A chain without any `limit`, `window` or `take` would grow its buffer
//! until the next match. When its calculation is built in, it keeps running
//! aggregates instead and holds no events at all.

use rhythmix_parser::AstNode;

use super::{Fragment, Subject, Translator, block, types};
use crate::error::{EvalError, Result};
use crate::udf::UdfKind;
use crate::value::Value;

struct ChainState {
    buffer: String,
    /// Binding the next link reads from: the buffer or the latest view.
    current: String,
    steps: Vec<String>,
    ready: Vec<String>,
    result: Option<String>,
    meet: Option<String>,
}

impl ChainState {
    fn on_buffer(&self) -> bool {
        self.current == self.buffer
    }
}

/// Calculations that fold one event at a time.
const RUNNING_CALCS: &[&str] = &["sum", "count", "avg", "stddev", "hitRate"];

/// Hidden accumulators of an unbounded chain.
#[derive(Default)]
struct Running {
    /// Name and initial value text, for clearing on a strict filter miss.
    vars: Vec<(String, String)>,
    update: Vec<String>,
    finish: Vec<String>,
}

impl Translator<'_> {
    pub(super) fn chain(&mut self, node: &AstNode) -> Result<Fragment> {
        if let Some(fragment) = self.running_chain(node)? {
            return Ok(fragment);
        }
        let buffer = self.declare("chainBuffer", Value::List(Vec::new()));
        let mut state = ChainState {
            current: buffer.clone(),
            buffer,
            steps: Vec::new(),
            ready: Vec::new(),
            result: None,
            meet: None,
        };

        for link in node.links() {
            match link.label.as_str() {
                "filter" => self.filter_link(link, &mut state)?,
                "limit" => self.limit_link(link, &mut state)?,
                "window" => self.window_link(link, &mut state)?,
                "take" => self.take_link(link, &mut state)?,
                "meet" => self.meet_link(link, &mut state)?,
                _ => self.calc_link(link, &mut state)?,
            }
        }

        let Some(meet) = state.meet else {
            return Err(EvalError::translation("chain must end with meet", &node.lexeme));
        };
        let expr = state
            .ready
            .into_iter()
            .fold(meet, |acc, ready| format!("({ready} && {acc})"));
        Ok(Fragment {
            steps: state.steps,
            expr,
        })
    }

    /// `filter(...).<calc>().meet(...)` with a built-in calculation.
    fn running_chain(&mut self, node: &AstNode) -> Result<Option<Fragment>> {
        let [filter, calc, meet] = node.links() else {
            return Ok(None);
        };
        if filter.label != "filter"
            || meet.label != "meet"
            || !RUNNING_CALCS.contains(&calc.label.as_str())
        {
            return Ok(None);
        }
        self.arity(filter, &[0, 1])?;
        self.arity(calc, if calc.label == "hitRate" { &[1] } else { &[0] })?;
        self.arity(meet, &[1])?;

        let mut steps = Vec::new();
        let pred = match filter.args().first() {
            Some(pred) => {
                let pred = self.node(pred, &Subject::Event)?;
                steps.extend(pred.steps);
                Some(pred.expr)
            }
            None => None,
        };

        let result = self.declare("chainResult", Value::Nil);
        let acc = self.running(calc, &result)?;
        match pred {
            Some(pred) => {
                let mut step = format!("if {pred} {}", block(&acc.update));
                if filter.strict {
                    let clear: Vec<String> = acc
                        .vars
                        .iter()
                        .map(|(name, initial)| format!("{name} = {initial}"))
                        .collect();
                    step.push_str(&format!(" else {}", block(&clear)));
                }
                steps.push(step);
            }
            None => steps.extend(acc.update),
        }
        steps.extend(acc.finish);

        let Some(test) = meet.args().first() else {
            return Err(EvalError::translation("meet expects a predicate", &meet.lexeme));
        };
        let test = self.node(test, &Subject::Scalar(result))?;
        steps.extend(test.steps);
        Ok(Some(Fragment {
            steps,
            expr: test.expr,
        }))
    }

    fn accumulator(&mut self, acc: &mut Running, base: &str, initial: Value) -> String {
        let text = match &initial {
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{f:?}"),
            _ => "nil".to_string(),
        };
        let name = self.declare(base, initial);
        acc.vars.push((name.clone(), text));
        name
    }

    /// Per-event updates of `calc` plus the statements that publish its
    /// current value into `result`.
    fn running(&mut self, calc: &AstNode, result: &str) -> Result<Running> {
        let mut acc = Running::default();
        let value = format!("num({}.value)", self.event);
        match calc.label.as_str() {
            "count" => {
                let n = self.accumulator(&mut acc, "chainSize", Value::Int(0));
                acc.update.push(format!("{n} = ({n} + 1)"));
                acc.finish.push(format!("{result} = {n}"));
            }
            "sum" => {
                let x = self.accumulator(&mut acc, "chainSample", Value::Nil);
                let sum = self.accumulator(&mut acc, "chainSum", Value::Float(0.0));
                acc.update.push(format!("{x} = {value}"));
                acc.update
                    .push(format!("if !is_nil({x}) {{ {sum} = ({sum} + {x}) }}"));
                acc.finish.push(format!("{result} = {sum}"));
            }
            "avg" => {
                let x = self.accumulator(&mut acc, "chainSample", Value::Nil);
                let sum = self.accumulator(&mut acc, "chainSum", Value::Float(0.0));
                let k = self.accumulator(&mut acc, "chainCount", Value::Int(0));
                acc.update.push(format!("{x} = {value}"));
                acc.update.push(format!(
                    "if !is_nil({x}) {{ {sum} = ({sum} + {x}); {k} = ({k} + 1) }}"
                ));
                acc.finish.push(format!(
                    "if ({k} > 0) {{ {result} = ({sum} / {k}) }} else {{ {result} = 0.0 }}"
                ));
            }
            "stddev" => {
                // Welford: running mean and sum of squared deviations
                let x = self.accumulator(&mut acc, "chainSample", Value::Nil);
                let k = self.accumulator(&mut acc, "chainCount", Value::Int(0));
                let mean = self.accumulator(&mut acc, "chainMean", Value::Float(0.0));
                let m2 = self.accumulator(&mut acc, "chainM2", Value::Float(0.0));
                let d = self.accumulator(&mut acc, "chainDelta", Value::Float(0.0));
                acc.update.push(format!("{x} = {value}"));
                acc.update.push(format!(
                    "if !is_nil({x}) {{ {k} = ({k} + 1); {d} = ({x} - {mean}); {mean} = ({mean} + ({d} / {k})); {m2} = ({m2} + ({d} * ({x} - {mean}))) }}"
                ));
                acc.finish.push(format!(
                    "if ({k} > 1) {{ {result} = sqrt(({m2} / {k})) }} else {{ {result} = 0.0 }}"
                ));
            }
            _ => {
                let Some(pred) = calc.args().first() else {
                    return Err(EvalError::translation("hitRate expects a predicate", &calc.lexeme));
                };
                let pred_frag = self.node(pred, &Subject::Event)?;
                if !pred_frag.steps.is_empty() {
                    return Err(EvalError::translation(
                        "hitRate predicate must be stateless",
                        &pred.lexeme,
                    ));
                }
                let n = self.accumulator(&mut acc, "chainSize", Value::Int(0));
                let hits = self.accumulator(&mut acc, "chainHits", Value::Float(0.0));
                acc.update.push(format!("{n} = ({n} + 1)"));
                acc.update
                    .push(format!("if {} {{ {hits} = ({hits} + 1) }}", pred_frag.expr));
                acc.finish.push(format!(
                    "if ({n} > 0) {{ {result} = ({hits} / {n}) }} else {{ {result} = 0.0 }}"
                ));
            }
        }
        Ok(acc)
    }

    fn filter_link(&mut self, link: &AstNode, state: &mut ChainState) -> Result<()> {
        self.arity(link, &[0, 1])?;
        let b = &state.buffer;
        let push = format!("{b} = push({b}, {})", self.event);
        let Some(pred) = link.args().first() else {
            state.steps.push(push);
            return Ok(());
        };
        let pred = self.node(pred, &Subject::Event)?;
        state.steps.extend(pred.steps);
        let mut step = format!("if {} {{ {push} }}", pred.expr);
        if link.strict {
            step.push_str(&format!(" else {{ {b} = [] }}"));
        }
        state.steps.push(step);
        Ok(())
    }

    /// Positive integer or duration parameter of `limit`/`window`.
    fn bound(&self, link: &AstNode) -> Result<Bound> {
        let arg = &link.args()[0];
        let bound = if types::is_duration(arg) {
            Bound::Millis(types::duration_arg(&link.label, arg)?)
        } else {
            Bound::Count(types::int_arg(&link.label, arg, &*self.env)?)
        };
        let positive = match bound {
            Bound::Count(n) | Bound::Millis(n) => n > 0,
        };
        if !positive {
            return Err(EvalError::translation(
                format!("{} parameter must be greater than 0", link.label),
                &arg.lexeme,
            ));
        }
        Ok(bound)
    }

    /// Target for a shaper: the buffer itself, or a fresh view.
    fn shaped(&mut self, state: &mut ChainState) -> String {
        if state.on_buffer() {
            state.buffer.clone()
        } else {
            let view = self.declare("chainView", Value::List(Vec::new()));
            state.current = view.clone();
            view
        }
    }

    fn limit_link(&mut self, link: &AstNode, state: &mut ChainState) -> Result<()> {
        self.arity(link, &[1])?;
        let bound = self.bound(link)?;
        let src = state.current.clone();
        let dst = self.shaped(state);
        match bound {
            Bound::Count(n) => state.steps.push(format!("{dst} = last({src}, {n})")),
            Bound::Millis(ms) => {
                state
                    .steps
                    .push(format!("{dst} = since({src}, ({} - {ms}))", self.ts()));
                self.time_bounded(&dst, state);
            }
        }
        Ok(())
    }

    fn window_link(&mut self, link: &AstNode, state: &mut ChainState) -> Result<()> {
        self.arity(link, &[1])?;
        let bound = self.bound(link)?;
        let src = state.current.clone();
        let dst = self.shaped(state);
        let ready = self.declare("windowReady", Value::Bool(false));
        match bound {
            Bound::Count(n) => {
                state.steps.push(format!("{dst} = last({src}, {n})"));
                state.steps.push(format!("{ready} = (len({dst}) >= {n})"));
            }
            Bound::Millis(ms) => {
                let ts = self.ts();
                state.steps.push(format!(
                    "{ready} = ((len({src}) > 0) && (first({src}).ts <= ({ts} - {ms})))"
                ));
                state.steps.push(format!("{dst} = since({src}, ({ts} - {ms}))"));
                self.time_bounded(&dst, state);
            }
        }
        state.ready.push(ready);
        Ok(())
    }

    fn time_bounded(&mut self, target: &str, state: &ChainState) {
        if target == state.buffer {
            self.env.mark_carry_over(target);
        }
    }

    /// `take(a[, b])`: python-style slice into a view.
    fn take_link(&mut self, link: &AstNode, state: &mut ChainState) -> Result<()> {
        self.arity(link, &[1, 2])?;
        let args = link.args();
        let start = types::int_arg("take", &args[0], self.env)?;
        let end = match args.get(1) {
            Some(arg) => types::int_arg("take", arg, self.env)?.to_string(),
            None => "nil".to_string(),
        };
        let view = self.declare("chainView", Value::List(Vec::new()));
        state
            .steps
            .push(format!("{view} = slice({}, {start}, {end})", state.current));
        state.current = view;
        Ok(())
    }

    fn calc_link(&mut self, link: &AstNode, state: &mut ChainState) -> Result<()> {
        let src = state.current.clone();
        let value = match link.label.as_str() {
            "sum" | "avg" | "stddev" => {
                self.arity(link, &[0])?;
                format!("{}({src})", link.label)
            }
            "count" => {
                self.arity(link, &[0])?;
                format!("len({src})")
            }
            "hitRate" => {
                self.arity(link, &[1])?;
                let pred = self.node(&link.args()[0], &Subject::Event)?;
                if !pred.steps.is_empty() {
                    return Err(EvalError::translation(
                        "hitRate predicate must be stateless",
                        &link.args()[0].lexeme,
                    ));
                }
                format!("hit_rate({src}, |{}| {})", self.event, pred.expr)
            }
            name if self.udfs.kind_of(name) == Some(UdfKind::Calculator) => {
                self.arity(link, &[0])?;
                format!("{name}({src})")
            }
            name => {
                return Err(EvalError::translation(
                    format!("unknown chain function '{name}'"),
                    &link.lexeme,
                ));
            }
        };
        let result = self.declare("chainResult", Value::Nil);
        state.steps.push(format!("{result} = {value}"));
        state.result = Some(result);
        Ok(())
    }

    fn meet_link(&mut self, link: &AstNode, state: &mut ChainState) -> Result<()> {
        self.arity(link, &[1])?;
        let Some(result) = state.result.clone() else {
            return Err(EvalError::translation(
                "meet must follow a calculation",
                &link.lexeme,
            ));
        };
        let pred = self.node(&link.args()[0], &Subject::Scalar(result))?;
        state.steps.extend(pred.steps);
        state.meet = Some(pred.expr);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Count(i64),
    Millis(i64),
}
