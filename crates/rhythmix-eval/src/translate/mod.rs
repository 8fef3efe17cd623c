//! AST → step program translation.
//!
//! Every node becomes a [`Fragment`]: state-update statements that run on
//! every event, in source order, plus a side-effect-free expression reading
//! the result. Stateful functions allocate hidden bindings in the
//! [`Environment`] through the shared [`NameCounter`]. Emitted expressions are
//! fully parenthesized so the step language's own precedence never matters.

mod chain;
mod functions;
pub mod types;

use log::debug;
use rhythmix_parser::{AstNode, NodeKind, TokenKind};

use crate::env::Environment;
use crate::error::{EvalError, Result};
use crate::naming::NameCounter;
use crate::script::quote;
use crate::udf::{UdfKind, UdfRegistry};
use crate::value::Value;

/// Function names the translator handles itself.
pub(crate) const FUNCTIONS: &[&str] = &[
    "count", "delay", "keep", "slope", "filter", "limit", "window", "take", "sum", "avg",
    "stddev", "hitRate", "meet",
];

/// Statements plus a pure result expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub steps: Vec<String>,
    pub expr: String,
}

impl Fragment {
    pub fn pure(expr: impl Into<String>) -> Self {
        Fragment {
            steps: Vec::new(),
            expr: expr.into(),
        }
    }

    /// Render as a complete program.
    pub fn program(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            out.push_str(step);
            out.push_str("; ");
        }
        out.push_str(&self.expr);
        out
    }
}

/// Render statements as a block body.
pub(crate) fn block(steps: &[String]) -> String {
    if steps.is_empty() {
        "{ }".to_string()
    } else {
        format!("{{ {} }}", steps.join("; "))
    }
}

/// Numeric literal in the step language's number syntax. Integers that do
/// not fit an `i64` fall back to floats.
fn number(node: &AstNode) -> Result<String> {
    if node.lexeme.kind == TokenKind::Integer {
        if let Ok(i) = node.label.parse::<i64>() {
            return Ok(i.to_string());
        }
    }
    match node.label.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(format!("{v:?}")),
        _ => Err(EvalError::translation(
            format!("invalid number '{}'", node.label),
            &node.lexeme,
        )),
    }
}

/// What a bare comparison such as `>4` is tested against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// The current event's value.
    Event,
    /// A computed scalar held in a hidden binding (chain result, slope rate).
    Scalar(String),
}

/// Translate a parsed condition into step-program text.
///
/// Hidden state is declared in `env`; the caller snapshots it afterwards.
pub fn translate(
    ast: &AstNode,
    env: &mut Environment,
    udfs: &UdfRegistry,
    names: &NameCounter,
    event: &str,
) -> Result<String> {
    types::check(ast, env, udfs)?;
    let mut translator = Translator {
        env,
        udfs,
        names,
        event,
    };
    let fragment = translator.node(ast, &Subject::Event)?;
    let code = fragment.program();
    debug!("translated '{ast}' into: {code}");
    Ok(code)
}

pub(crate) struct Translator<'a> {
    env: &'a mut Environment,
    udfs: &'a UdfRegistry,
    names: &'a NameCounter,
    event: &'a str,
}

impl Translator<'_> {
    /// Allocate a hidden binding with its initial value.
    fn declare(&mut self, base: &str, initial: Value) -> String {
        let name = self.names.fresh(base);
        self.env.set(name.clone(), initial);
        name
    }

    fn subject(&self, subject: &Subject) -> String {
        match subject {
            Subject::Event => format!("{}.value", self.event),
            Subject::Scalar(var) => var.clone(),
        }
    }

    fn ts(&self) -> String {
        format!("{}.ts", self.event)
    }

    pub(crate) fn node(&mut self, node: &AstNode, subject: &Subject) -> Result<Fragment> {
        match node.kind {
            NodeKind::Literal => self.literal(node).map(Fragment::pure),
            NodeKind::Variable => self.variable(node, subject),
            NodeKind::Compare => {
                let Some(operand) = node.children.first() else {
                    return Err(EvalError::translation("comparison without operand", &node.lexeme));
                };
                let mut frag = self.node(operand, subject)?;
                frag.expr = format!("({} {} {})", self.subject(subject), node.label, frag.expr);
                Ok(frag)
            }
            NodeKind::Range => self.range(node, subject),
            NodeKind::UnaryOp => {
                let Some(operand) = node.children.first() else {
                    return Err(EvalError::translation("missing operand", &node.lexeme));
                };
                let mut frag = self.node(operand, subject)?;
                frag.expr = format!("({}{})", node.label, frag.expr);
                Ok(frag)
            }
            NodeKind::BinaryOp => {
                let (Some(l), Some(r)) = (node.children.first(), node.children.get(1)) else {
                    return Err(EvalError::translation("missing operand", &node.lexeme));
                };
                let left = self.node(l, subject)?;
                let right = self.node(r, subject)?;
                let mut steps = left.steps;
                steps.extend(right.steps);
                Ok(Fragment {
                    steps,
                    expr: format!("({} {} {})", left.expr, node.label, right.expr),
                })
            }
            NodeKind::Arrow => self.arrow(node, subject),
            NodeKind::FunctionCall if node.is_chain() => self.chain(node),
            NodeKind::FunctionCall => self.call(node, subject),
            NodeKind::ChainLink | NodeKind::ArgList => Err(EvalError::translation(
                format!("'{}' is not valid here", node.label),
                &node.lexeme,
            )),
        }
    }

    fn literal(&self, node: &AstNode) -> Result<String> {
        match node.lexeme.kind {
            TokenKind::Integer | TokenKind::Float => number(node),
            TokenKind::Str => Ok(quote(&node.label)),
            TokenKind::Duration => Ok(types::duration_arg("duration", node)?.to_string()),
            _ => Err(EvalError::translation(
                format!("unexpected literal '{}'", node.label),
                &node.lexeme,
            )),
        }
    }

    fn variable(&mut self, node: &AstNode, subject: &Subject) -> Result<Fragment> {
        if self.env.contains(&node.label) {
            return Ok(Fragment::pure(node.label.clone()));
        }
        if self.udfs.kind_of(&node.label).is_some() {
            return self.udf(node, subject);
        }
        Err(EvalError::translation(
            format!("Undefined variable: {}", node.label),
            &node.lexeme,
        ))
    }

    /// `[a,b)` and friends: bounds checked against the subject.
    fn range(&mut self, node: &AstNode, subject: &Subject) -> Result<Fragment> {
        let (Some(lo), Some(hi)) = (node.children.first(), node.children.get(1)) else {
            return Err(EvalError::translation("malformed range", &node.lexeme));
        };
        let lower_op = if node.label.starts_with('[') { ">=" } else { ">" };
        let upper_op = if node.label.ends_with(']') { "<=" } else { "<" };
        let lo = self.node(lo, subject)?;
        let hi = self.node(hi, subject)?;
        let s = self.subject(subject);
        let mut steps = lo.steps;
        steps.extend(hi.steps);
        Ok(Fragment {
            steps,
            expr: format!("(({s} {lower_op} {}) && ({s} {upper_op} {}))", lo.expr, hi.expr),
        })
    }

    /// `{a}->{b}->...`: only the active stage sees the event. The event that
    /// completes a stage is not offered to the next one.
    fn arrow(&mut self, node: &AstNode, subject: &Subject) -> Result<Fragment> {
        let stage = self.declare("arrowStage", Value::Int(0));
        let mut branches = Vec::with_capacity(node.children.len());
        for (i, child) in node.children.iter().enumerate() {
            let frag = self.node(child, subject)?;
            let mut body = frag.steps;
            body.push(format!("if {} {{ {stage} = {} }}", frag.expr, i + 1));
            branches.push(format!("if ({stage} == {i}) {}", block(&body)));
        }
        let stages = node.children.len();
        let mut steps = Vec::new();
        if !branches.is_empty() {
            steps.push(branches.join(" else "));
        }
        Ok(Fragment {
            steps,
            expr: format!("({stage} >= {stages})"),
        })
    }

    fn call(&mut self, node: &AstNode, subject: &Subject) -> Result<Fragment> {
        match node.label.as_str() {
            "count" => self.count(node, subject),
            "delay" => self.delay(node),
            "keep" => self.keep(node, subject),
            "slope" => self.slope(node),
            _ if self.udfs.kind_of(&node.label).is_some() => {
                if !node.args().is_empty() {
                    return Err(EvalError::translation(
                        format!("UDF '{}' takes no arguments", node.label),
                        &node.lexeme,
                    ));
                }
                self.udf(node, subject)
            }
            _ => Err(EvalError::translation(
                format!("unknown function '{}'", node.label),
                &node.lexeme,
            )),
        }
    }

    /// A predicate UDF applied to the subject.
    fn udf(&mut self, node: &AstNode, subject: &Subject) -> Result<Fragment> {
        let name = &node.label;
        match (self.udfs.kind_of(name), subject) {
            (Some(UdfKind::Filter), Subject::Event) => Ok(Fragment::pure(format!("{name}({})", self.event))),
            (Some(UdfKind::Filter), Subject::Scalar(_)) => Err(EvalError::translation(
                format!("filter UDF '{name}' can only be applied to events"),
                &node.lexeme,
            )),
            (Some(UdfKind::Meet), _) => Ok(Fragment::pure(format!("{name}({})", self.subject(subject)))),
            (Some(UdfKind::Calculator), _) => Err(EvalError::translation(
                format!("calculator UDF '{name}' can only be used inside a chain"),
                &node.lexeme,
            )),
            (None, _) => Err(EvalError::translation(
                format!("unknown function '{name}'"),
                &node.lexeme,
            )),
        }
    }

    fn arity(&self, node: &AstNode, expected: &[usize]) -> Result<()> {
        let got = node.args().len();
        if expected.contains(&got) {
            return Ok(());
        }
        let want = expected
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(" or ");
        Err(EvalError::translation(
            format!("{} expects {want} argument(s), got {got}", node.label),
            &node.lexeme,
        ))
    }
}
