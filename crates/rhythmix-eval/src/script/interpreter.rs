//! Tree-walking interpreter for parsed step programs.
//!
//! Statements write straight into the [`Environment`]; the result expression
//! only reads. Lambda parameters shadow environment bindings.

use std::cmp::Ordering;

use log::trace;

use crate::env::Environment;
use crate::error::{EvalError, Result};
use crate::event::Event;
use crate::udf::{UdfKind, UdfRegistry};
use crate::value::Value;

use super::parse::{BinaryOp, Expr, Program, Stmt};

/// Functions the interpreter answers itself; UDFs may not shadow them.
pub(crate) const HELPERS: &[&str] = &[
    "hit_rate", "num", "is_nil", "sqrt", "len", "first", "push", "last", "since", "slice", "sum",
    "avg", "stddev",
];

/// Run `program` against `env`, returning the value of its result expression.
pub fn run(program: &Program, env: &mut Environment, udfs: &UdfRegistry) -> Result<Value> {
    let mut interp = Interpreter {
        env,
        udfs,
        locals: Vec::new(),
    };
    interp.exec_all(&program.stmts)?;
    interp.eval(&program.result)
}

struct Interpreter<'a> {
    env: &'a mut Environment,
    udfs: &'a UdfRegistry,
    locals: Vec<(String, Value)>,
}

impl Interpreter<'_> {
    fn exec_all(&mut self, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Assign(name, expr) => {
                if self.update_in_place(name, expr)? {
                    return Ok(());
                }
                let value = self.eval(expr)?;
                trace!("{name} = {value}");
                self.env.set(name.clone(), value);
                Ok(())
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.is_truthy() {
                    self.exec_all(then)
                } else {
                    self.exec_all(otherwise)
                }
            }
        }
    }

    /// `b = push(b, x)`, `b = last(b, n)` and `b = since(b, t)` edit the
    /// list where it is stored. Returns `false` when `expr` is not one of
    /// those forms.
    fn update_in_place(&mut self, name: &str, expr: &Expr) -> Result<bool> {
        let Expr::Call(func, args) = expr else {
            return Ok(false);
        };
        let (Some(Expr::Var(target)), Some(arg), None) = (args.first(), args.get(1), args.get(2))
        else {
            return Ok(false);
        };
        if target != name
            || !matches!(func.as_str(), "push" | "last" | "since")
            || self.locals.iter().any(|(n, _)| n == name)
            || !matches!(self.env.get(name), Some(Value::List(_)))
        {
            return Ok(false);
        }
        let arg = self.eval(arg)?;
        let Some(Value::List(items)) = self.env.get_mut(name) else {
            return Ok(false);
        };
        match func.as_str() {
            "push" => items.push(arg),
            "last" => {
                let n = arg.as_i64().unwrap_or(0).max(0) as usize;
                let skip = items.len().saturating_sub(n);
                items.drain(..skip);
            }
            _ => {
                let cutoff = arg.as_f64().unwrap_or(f64::NEG_INFINITY);
                items.retain(|v| timestamp_of(v).is_some_and(|ts| ts as f64 >= cutoff));
            }
        }
        trace!("{name} = {func}(..) in place, {} item(s)", items.len());
        Ok(true)
    }

    fn binding(&self, name: &str) -> Option<&Value> {
        match self.locals.iter().rev().find(|(n, _)| n == name) {
            Some((_, v)) => Some(v),
            None => self.env.get(name),
        }
    }

    fn lookup(&self, name: &str) -> Result<Value> {
        self.binding(name)
            .cloned()
            .ok_or_else(|| EvalError::Runtime(format!("undefined variable '{name}'")))
    }

    /// Apply `f` to the list `expr` evaluates to. Variables are borrowed,
    /// not copied; anything that is not a list reads as empty.
    fn with_list<R>(&mut self, expr: Option<&Expr>, f: impl FnOnce(&[Value]) -> R) -> Result<R> {
        if let Some(Expr::Var(name)) = expr {
            if let Some(v) = self.binding(name) {
                return Ok(f(v.as_list().unwrap_or(&[])));
            }
        }
        let owned = match expr {
            Some(e) => self.eval(e)?,
            None => Value::Nil,
        };
        Ok(f(owned.as_list().unwrap_or(&[])))
    }

    fn arg(&mut self, args: &[Expr], i: usize) -> Result<Value> {
        match args.get(i) {
            Some(e) => self.eval(e),
            None => Ok(Value::Nil),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Lit(v) => Ok(v.clone()),
            Expr::Var(name) => self.lookup(name),
            Expr::Field(target, field) => Ok(match self.eval(target)? {
                Value::Event(e) => e.field(field),
                _ => Value::Nil,
            }),
            Expr::List(items) => Ok(Value::List(
                items.iter().map(|e| self.eval(e)).collect::<Result<_>>()?,
            )),
            Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner)?.is_truthy())),
            Expr::Neg(inner) => Ok(self.eval(inner)?.neg()),
            Expr::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs),
            Expr::Call(name, args) => self.call(name, args),
            Expr::Lambda(..) => Err(EvalError::Runtime(
                "lambda is only valid as a call argument".into(),
            )),
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Value> {
        match op {
            BinaryOp::And => {
                if !self.eval(lhs)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(rhs)?.is_truthy()))
            }
            BinaryOp::Or => {
                if self.eval(lhs)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(rhs)?.is_truthy()))
            }
            _ => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                Ok(match op {
                    BinaryOp::Eq => Value::Bool(l.loose_eq(&r)),
                    BinaryOp::Ne => Value::Bool(!l.loose_eq(&r)),
                    BinaryOp::Lt => Value::Bool(l.numeric_cmp(&r) == Some(Ordering::Less)),
                    BinaryOp::Le => Value::Bool(matches!(
                        l.numeric_cmp(&r),
                        Some(Ordering::Less | Ordering::Equal)
                    )),
                    BinaryOp::Gt => Value::Bool(l.numeric_cmp(&r) == Some(Ordering::Greater)),
                    BinaryOp::Ge => Value::Bool(matches!(
                        l.numeric_cmp(&r),
                        Some(Ordering::Greater | Ordering::Equal)
                    )),
                    BinaryOp::Arith(a) => l.arith(a, &r),
                    BinaryOp::Bit(b) => l.bitwise(b, &r),
                    BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
                })
            }
        }
    }

    fn call(&mut self, name: &str, args: &[Expr]) -> Result<Value> {
        let list = args.first();
        match name {
            // the lambda argument is not evaluated eagerly
            "hit_rate" => self.hit_rate(args),
            "num" => Ok(self.arg(args, 0)?.as_f64().map(Value::Float).unwrap_or(Value::Nil)),
            "is_nil" => Ok(Value::Bool(self.arg(args, 0)?.is_nil())),
            "sqrt" => Ok(match self.arg(args, 0)?.as_f64() {
                Some(v) if v >= 0.0 => Value::Float(v.sqrt()),
                _ => Value::Nil,
            }),
            "len" => self.with_list(list, |items| Value::Int(items.len() as i64)),
            "first" => self.with_list(list, |items| items.first().cloned().unwrap_or_default()),
            "push" => {
                let item = self.arg(args, 1)?;
                let mut items = self.with_list(list, <[Value]>::to_vec)?;
                items.push(item);
                Ok(Value::List(items))
            }
            "last" => {
                let n = self.arg(args, 1)?.as_i64().unwrap_or(0).max(0) as usize;
                self.with_list(list, |items| {
                    let skip = items.len().saturating_sub(n);
                    Value::List(items[skip..].to_vec())
                })
            }
            "since" => {
                let cutoff = self.arg(args, 1)?.as_f64().unwrap_or(f64::NEG_INFINITY);
                self.with_list(list, |items| {
                    Value::List(
                        items
                            .iter()
                            .filter(|v| timestamp_of(v).is_some_and(|ts| ts as f64 >= cutoff))
                            .cloned()
                            .collect(),
                    )
                })
            }
            "slice" => {
                let start = self.arg(args, 1)?.as_i64();
                let end = self.arg(args, 2)?.as_i64();
                self.with_list(list, |items| Value::List(slice(items, start, end).to_vec()))
            }
            "sum" => self.with_list(list, |items| Value::Float(numbers(items).iter().sum())),
            "avg" => self.with_list(list, |items| Value::Float(mean(&numbers(items)))),
            "stddev" => {
                self.with_list(list, |items| Value::Float(population_stddev(&numbers(items))))
            }
            _ => {
                let values = args.iter().map(|e| self.eval(e)).collect::<Result<Vec<_>>>()?;
                self.call_udf(name, &values)
            }
        }
    }

    fn call_udf(&self, name: &str, values: &[Value]) -> Result<Value> {
        let arg = values.first().cloned().unwrap_or_default();
        match self.udfs.kind_of(name) {
            Some(UdfKind::Filter) => {
                let hit = match (self.udfs.filter(name), arg.as_event()) {
                    (Some(udf), Some(event)) => udf.apply(event),
                    _ => false,
                };
                Ok(Value::Bool(hit))
            }
            Some(UdfKind::Meet) => {
                let hit = match (self.udfs.meet(name), arg.as_f64()) {
                    (Some(udf), Some(v)) => udf.apply(v),
                    _ => false,
                };
                Ok(Value::Bool(hit))
            }
            Some(UdfKind::Calculator) => {
                let events: Vec<Event> = arg
                    .as_list()
                    .unwrap_or(&[])
                    .iter()
                    .filter_map(Value::as_event)
                    .cloned()
                    .collect();
                let v = self
                    .udfs
                    .calculator(name)
                    .map(|udf| udf.calculate(&events))
                    .unwrap_or(0.0);
                Ok(if v.is_finite() { Value::Float(v) } else { Value::Nil })
            }
            None => Err(EvalError::Runtime(format!("unknown function '{name}'"))),
        }
    }

    fn hit_rate(&mut self, args: &[Expr]) -> Result<Value> {
        let items = self.with_list(args.first(), <[Value]>::to_vec)?;
        let Some(Expr::Lambda(param, body)) = args.get(1) else {
            return Err(EvalError::Runtime("hit_rate expects a lambda".into()));
        };
        if items.is_empty() {
            return Ok(Value::Float(0.0));
        }
        let mut hits = 0usize;
        for item in &items {
            self.locals.push((param.clone(), item.clone()));
            let outcome = self.eval(body);
            self.locals.pop();
            if outcome?.is_truthy() {
                hits += 1;
            }
        }
        Ok(Value::Float(hits as f64 / items.len() as f64))
    }
}

fn timestamp_of(v: &Value) -> Option<i64> {
    match v {
        Value::Event(e) => Some(e.ts),
        _ => None,
    }
}

/// Numeric readings of a buffer; non-numeric entries are skipped.
fn numbers(items: &[Value]) -> Vec<f64> {
    items.iter().filter_map(Value::as_f64).collect()
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

fn population_stddev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

/// Python-style slice; negative indices count from the end, `None` end means
/// the end of the list.
fn slice(items: &[Value], start: Option<i64>, end: Option<i64>) -> &[Value] {
    let len = items.len() as i64;
    let clamp = |i: i64| -> usize {
        let i = if i < 0 { len + i } else { i };
        i.clamp(0, len) as usize
    };
    let s = clamp(start.unwrap_or(0));
    let e = end.map(clamp).unwrap_or(items.len());
    if s >= e { &[] } else { &items[s..e] }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse::parse_program;

    fn eval_with(code: &str, env: &mut Environment) -> Result<Value> {
        let program = parse_program(code)?;
        run(&program, env, &UdfRegistry::with_builtins())
    }

    fn eval(code: &str) -> Value {
        eval_with(code, &mut Environment::new()).unwrap()
    }

    fn events(values: &[(i64, &str)]) -> Value {
        Value::List(
            values
                .iter()
                .map(|(ts, v)| Value::Event(Event::at(*ts, *v)))
                .collect(),
        )
    }

    #[test]
    fn test_statements_update_env() {
        let mut env = Environment::new();
        env.set("c$0", Value::Int(0));
        env.set("event", Value::Event(Event::at(1, "11")));
        let code = "if (event.value > 4) { c$0 = (c$0 + 1) } else { c$0 = 0 }; (c$0 >= 1)";
        assert_eq!(eval_with(code, &mut env).unwrap(), Value::Bool(true));
        assert_eq!(env.get("c$0"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_short_circuit() {
        // the right-hand side would be a runtime error if evaluated
        assert_eq!(eval("false && missing"), Value::Bool(false));
        assert_eq!(eval("true || missing"), Value::Bool(true));
    }

    #[test]
    fn test_undefined_variable_is_runtime_error() {
        let err = eval_with("missing", &mut Environment::new()).unwrap_err();
        assert!(matches!(err, EvalError::Runtime(m) if m.contains("missing")));
    }

    #[test]
    fn test_unknown_function_is_runtime_error() {
        let err = eval_with("nope(1)", &mut Environment::new()).unwrap_err();
        assert!(matches!(err, EvalError::Runtime(m) if m.contains("nope")));
    }

    #[test]
    fn test_comparisons_with_non_numbers_are_false() {
        assert_eq!(eval("\"abc\" > 4"), Value::Bool(false));
        assert_eq!(eval("\"abc\" <= 4"), Value::Bool(false));
        assert_eq!(eval("\"5\" == 5"), Value::Bool(true));
        assert_eq!(eval("nil < 1"), Value::Bool(false));
    }

    #[test]
    fn test_list_builtins() {
        let mut env = Environment::new();
        env.set("b", events(&[(0, "1"), (100, "2"), (200, "3"), (300, "4")]));
        assert_eq!(eval_with("len(b)", &mut env).unwrap(), Value::Int(4));
        assert_eq!(eval_with("len(last(b, 2))", &mut env).unwrap(), Value::Int(2));
        assert_eq!(eval_with("first(since(b, 150)).ts", &mut env).unwrap(), Value::Int(200));
        assert_eq!(eval_with("sum(b)", &mut env).unwrap(), Value::Float(10.0));
        assert_eq!(eval_with("avg(slice(b, -2, nil))", &mut env).unwrap(), Value::Float(3.5));
        assert_eq!(eval_with("len(push(b, 5))", &mut env).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_slice_python_semantics() {
        let items: Vec<Value> = (0..5).map(Value::Int).collect();
        assert_eq!(slice(&items, Some(1), Some(3)), &items[1..3]);
        assert_eq!(slice(&items, Some(-3), Some(-1)), &items[2..4]);
        assert_eq!(slice(&items, Some(-10), None), &items[..]);
        assert!(slice(&items, Some(4), Some(2)).is_empty());
    }

    #[test]
    fn test_aggregates_on_empty_buffers() {
        assert_eq!(eval("avg([])"), Value::Float(0.0));
        assert_eq!(eval("stddev([1])"), Value::Float(0.0));
        assert_eq!(eval("hit_rate([], |e| true)"), Value::Float(0.0));
    }

    #[test]
    fn test_population_stddev() {
        let v = eval("stddev([2, 4, 4, 4, 5, 5, 7, 9])");
        assert_eq!(v, Value::Float(2.0));
    }

    #[test]
    fn test_hit_rate_lambda_shadows_env() {
        let mut env = Environment::new();
        env.set("event", Value::Event(Event::at(0, "100")));
        env.set("b", events(&[(0, "1"), (1, "5"), (2, "6"), (3, "2")]));
        let v = eval_with("hit_rate(b, |event| (event.value > 4))", &mut env).unwrap();
        assert_eq!(v, Value::Float(0.5));
    }

    #[test]
    fn test_udf_dispatch() {
        let mut env = Environment::new();
        env.set("event", Value::Event(Event::at(0, "abc")));
        env.set("b", events(&[(0, "3"), (1, "9"), (2, "x")]));
        assert_eq!(eval_with("positiveFilter(event)", &mut env).unwrap(), Value::Bool(false));
        assert_eq!(eval_with("thresholdMeet(12)", &mut env).unwrap(), Value::Bool(true));
        assert_eq!(eval_with("thresholdMeet(nil)", &mut env).unwrap(), Value::Bool(false));
        assert_eq!(eval_with("maxcalc(b)", &mut env).unwrap(), Value::Float(9.0));
    }

    #[test]
    fn test_buffer_updates_in_place() {
        let mut env = Environment::new();
        env.set("b", events(&[(0, "1"), (100, "2")]));
        env.set("event", Value::Event(Event::at(200, "3")));
        let v = eval_with("b = push(b, event); b = since(b, 100); len(b)", &mut env).unwrap();
        assert_eq!(v, Value::Int(2));
        let v = eval_with("b = last(b, 1); first(b).ts", &mut env).unwrap();
        assert_eq!(v, Value::Int(200));
        assert_eq!(env.get("b").and_then(Value::as_list).map(<[Value]>::len), Some(1));
    }

    #[test]
    fn test_push_onto_non_list_starts_a_list() {
        let mut env = Environment::new();
        env.set("b", Value::Nil);
        assert_eq!(eval_with("b = push(b, 1); len(b)", &mut env).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_sqrt() {
        assert_eq!(eval("sqrt(16)"), Value::Float(4.0));
        assert_eq!(eval("sqrt(-1)"), Value::Nil);
        assert_eq!(eval("sqrt(nil)"), Value::Nil);
    }

    #[test]
    fn test_helpers_listed() {
        let mut env = Environment::new();
        env.set("b", events(&[(0, "1")]));
        for name in HELPERS.iter().filter(|n| **n != "hit_rate") {
            let code = format!("{name}(b, 1, 2)");
            assert!(eval_with(&code, &mut env).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_lambda_outside_call() {
        assert!(eval_with("|x| x", &mut Environment::new()).is_err());
    }
}
