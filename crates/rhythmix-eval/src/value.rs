//! Runtime values stored in the [`Environment`](crate::env::Environment).
//!
//! Operations are type-agnostic the way sensor data needs them to be:
//! numeric strings compare and compute as numbers, and an operand that cannot
//! be read as a number makes an ordering comparison `false` (arithmetic
//! yields [`Value::Nil`]) instead of raising.

use std::cmp::Ordering;
use std::fmt;

use crate::event::Event;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Ordered sequence, used for chain buffers.
    List(Vec<Value>),
    Event(Event),
}

impl Value {
    /// Numeric view of the value. Strings are parsed; events use their value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            Value::Event(e) => e.numeric_value(),
            _ => None,
        }
    }

    /// Integer view; floats qualify only when integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            other => other
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64),
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Value::Event(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Boolean interpretation of a program result.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Event(_) => "event",
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`: numeric only.
    pub fn numeric_cmp(&self, other: &Value) -> Option<Ordering> {
        let (a, b) = (self.as_f64()?, other.as_f64()?);
        a.partial_cmp(&b)
    }

    /// Equality for `==`/`!=`: numeric when both sides read as numbers,
    /// structural otherwise.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => match (self, other) {
                (Value::Str(a), Value::Str(b)) => a == b,
                (Value::Bool(a), Value::Bool(b)) => a == b,
                (Value::Nil, Value::Nil) => true,
                (Value::List(a), Value::List(b)) => {
                    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
                }
                (Value::Event(a), Value::Event(b)) => a == b,
                _ => false,
            },
        }
    }

    /// `+ - * /`. Integer results stay integers unless the division
    /// is inexact; anything non-numeric gives `Nil`.
    pub fn arith(&self, op: ArithOp, other: &Value) -> Value {
        if let (Value::Int(a), Value::Int(b)) = (self, other) {
            let (a, b) = (*a, *b);
            let result = match op {
                ArithOp::Add => a.checked_add(b),
                ArithOp::Sub => a.checked_sub(b),
                ArithOp::Mul => a.checked_mul(b),
                ArithOp::Div if b != 0 && a % b == 0 => Some(a / b),
                _ => None,
            };
            if let Some(v) = result {
                return Value::Int(v);
            }
        }
        if let (ArithOp::Add, Value::Str(a), Value::Str(b)) = (op, self, other)
            && (a.trim().parse::<f64>().is_err() || b.trim().parse::<f64>().is_err())
        {
            return Value::Str(format!("{a}{b}"));
        }
        let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) else {
            return Value::Nil;
        };
        let v = match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
        };
        if v.is_finite() { Value::Float(v) } else { Value::Nil }
    }

    /// `& | ^ << >>` on integers; `Nil` otherwise.
    pub fn bitwise(&self, op: BitOp, other: &Value) -> Value {
        let (Some(a), Some(b)) = (self.as_i64(), other.as_i64()) else {
            return Value::Nil;
        };
        let v = match op {
            BitOp::And => Some(a & b),
            BitOp::Or => Some(a | b),
            BitOp::Xor => Some(a ^ b),
            BitOp::Shl => u32::try_from(b).ok().and_then(|s| a.checked_shl(s)),
            BitOp::Shr => u32::try_from(b).ok().and_then(|s| a.checked_shr(s)),
        };
        v.map(Value::Int).unwrap_or(Value::Nil)
    }

    /// Numeric negation; `Nil` for non-numbers.
    pub fn neg(&self) -> Value {
        match self {
            Value::Int(i) => i.checked_neg().map(Value::Int).unwrap_or(Value::Nil),
            other => other.as_f64().map(|f| Value::Float(-f)).unwrap_or(Value::Nil),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Event(e) => write!(f, "{}@{}", e.value, e.ts),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Event> for Value {
    fn from(e: Event) -> Self {
        Value::Event(e)
    }
}

/// JSON bindings: objects with a `ts` field become events, arrays become lists.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Nil),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            obj @ serde_json::Value::Object(_) => match Event::from_json(&obj) {
                Ok(e) => Value::Event(e),
                Err(_) => Value::Str(obj.to_string()),
            },
        }
    }
}
