//! Static type checks and constant folding over the condition AST.
//!
//! Types are only known for literals and for variables bound before
//! compilation; everything else is [`LiteralType::Any`] and passes.

use rhythmix_parser::{AstNode, Duration, DurationError, NodeKind, TokenKind};

use crate::env::Environment;
use crate::error::{EvalError, Result};
use crate::udf::UdfRegistry;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralType {
    Integer,
    Float,
    Duration,
    Str,
    Bool,
    Any,
}

impl LiteralType {
    fn is_numeric(self) -> bool {
        matches!(self, LiteralType::Integer | LiteralType::Float | LiteralType::Duration)
    }

    fn of_value(v: &Value) -> Self {
        match v {
            Value::Int(_) => LiteralType::Integer,
            Value::Float(_) => LiteralType::Float,
            Value::Str(_) => LiteralType::Str,
            Value::Bool(_) => LiteralType::Bool,
            _ => LiteralType::Any,
        }
    }
}

const ARITH_OPS: &[&str] = &["+", "-", "*", "/"];
const BIT_OPS: &[&str] = &["&", "|", "^", "<<", ">>"];
const LOGIC_OPS: &[&str] = &["&&", "||"];

/// Infer the type of `node`, rejecting operator/operand combinations that can
/// never evaluate. Recurses into every child, including call arguments.
pub fn check(node: &AstNode, env: &Environment, udfs: &UdfRegistry) -> Result<LiteralType> {
    match node.kind {
        NodeKind::Literal => Ok(match node.lexeme.kind {
            TokenKind::Integer => LiteralType::Integer,
            TokenKind::Float => LiteralType::Float,
            TokenKind::Duration => LiteralType::Duration,
            TokenKind::Str => LiteralType::Str,
            _ => LiteralType::Any,
        }),
        NodeKind::Variable => Ok(match env.get(&node.label) {
            Some(v) => LiteralType::of_value(v),
            None if udfs.kind_of(&node.label).is_some() => LiteralType::Bool,
            None => LiteralType::Any,
        }),
        NodeKind::UnaryOp => {
            let operand = match node.children.first() {
                Some(child) => check(child, env, udfs)?,
                None => LiteralType::Any,
            };
            match node.label.as_str() {
                "!" if matches!(operand, LiteralType::Bool | LiteralType::Any) => Ok(LiteralType::Bool),
                "!" => Err(EvalError::type_inference(
                    format!("operator '!' cannot be applied to {}", describe(operand)),
                    &node.lexeme,
                )),
                "-" if operand.is_numeric() || operand == LiteralType::Any => Ok(operand),
                _ => Err(EvalError::type_inference(
                    format!("operator '{}' cannot be applied to {}", node.label, describe(operand)),
                    &node.lexeme,
                )),
            }
        }
        NodeKind::BinaryOp => {
            let (Some(l), Some(r)) = (node.children.first(), node.children.get(1)) else {
                return Ok(LiteralType::Any);
            };
            let (lt, rt) = (check(l, env, udfs)?, check(r, env, udfs)?);
            binary(node, lt, rt)
        }
        // compares, ranges, arrows, calls and chains all yield booleans
        _ => {
            for child in &node.children {
                check(child, env, udfs)?;
            }
            Ok(LiteralType::Bool)
        }
    }
}

fn binary(node: &AstNode, lt: LiteralType, rt: LiteralType) -> Result<LiteralType> {
    use LiteralType::*;

    let op = node.label.as_str();
    let reject = |bad: LiteralType| {
        Err(EvalError::type_inference(
            format!("operator '{op}' cannot be applied to {}", describe(bad)),
            &node.lexeme,
        ))
    };
    let offending = |bad: &[LiteralType]| [lt, rt].into_iter().find(|t| bad.contains(t));

    if ARITH_OPS.contains(&op) {
        if let Some(bad) = offending(&[Str, Bool]) {
            return reject(bad);
        }
        return Ok(match (lt, rt) {
            (Any, _) | (_, Any) => Any,
            (Float, _) | (_, Float) => Float,
            _ => Integer,
        });
    }
    if BIT_OPS.contains(&op) {
        if let Some(bad) = offending(&[Float, Str, Bool]) {
            return reject(bad);
        }
        return Ok(if lt == Any || rt == Any { Any } else { Integer });
    }
    if LOGIC_OPS.contains(&op) {
        if let Some(bad) = offending(&[Integer, Float, Duration, Str]) {
            return reject(bad);
        }
        return Ok(Bool);
    }
    // comparisons
    let mixed = (lt == Str && rt.is_numeric()) || (rt == Str && lt.is_numeric());
    if mixed {
        return Err(EvalError::type_inference(
            format!("cannot compare a string with a number using '{op}'"),
            &node.lexeme,
        ));
    }
    Ok(Bool)
}

fn describe(t: LiteralType) -> &'static str {
    match t {
        LiteralType::Integer => "an integer",
        LiteralType::Float => "a float",
        LiteralType::Duration => "a duration",
        LiteralType::Str => "a string",
        LiteralType::Bool => "a boolean",
        LiteralType::Any => "a value",
    }
}

// =============================================================================
// Constant arguments
// =============================================================================

/// Fold an integer-valued argument: literals, variables bound to integers,
/// negation and arithmetic over those.
pub fn fold_int(node: &AstNode, env: &Environment) -> Option<i64> {
    match node.kind {
        NodeKind::Literal if node.lexeme.kind == TokenKind::Integer => node.label.parse().ok(),
        NodeKind::Variable => match env.get(&node.label)? {
            Value::Int(i) => Some(*i),
            _ => None,
        },
        NodeKind::UnaryOp if node.label == "-" => fold_int(node.children.first()?, env)?.checked_neg(),
        NodeKind::BinaryOp => {
            let l = fold_int(node.children.first()?, env)?;
            let r = fold_int(node.children.get(1)?, env)?;
            match node.label.as_str() {
                "+" => l.checked_add(r),
                "-" => l.checked_sub(r),
                "*" => l.checked_mul(r),
                "/" if r != 0 => Some(l / r),
                _ => None,
            }
        }
        _ => None,
    }
}

/// An integer constant argument of `func`.
pub fn int_arg(func: &str, node: &AstNode, env: &Environment) -> Result<i64> {
    if let Some(i) = fold_int(node, env) {
        return Ok(i);
    }
    let found = match node.literal_kind() {
        Some(TokenKind::Duration) => "a duration",
        Some(TokenKind::Float) => "a float",
        Some(TokenKind::Str) => "a string",
        _ => "a non-constant expression",
    };
    Err(EvalError::translation(
        format!("{func} expects an integer constant, found {found}"),
        &node.lexeme,
    ))
}

/// A duration literal argument of `func`, in milliseconds.
pub fn duration_arg(func: &str, node: &AstNode) -> Result<i64> {
    if node.literal_kind() != Some(TokenKind::Duration) {
        return Err(EvalError::translation(
            format!("{func} expects a duration such as 100ms, found '{node}'"),
            &node.lexeme,
        ));
    }
    match Duration::parse(&node.label) {
        Ok(d) => Ok(d.millis),
        Err(DurationError::UnsupportedUnit { unit, .. }) => Err(EvalError::translation(
            format!("unsupported time unit '{unit}'"),
            &node.lexeme,
        )),
        Err(e) => Err(EvalError::translation(e.to_string(), &node.lexeme)),
    }
}

/// Whether `node` is a duration literal.
pub fn is_duration(node: &AstNode) -> bool {
    node.literal_kind() == Some(TokenKind::Duration)
}
