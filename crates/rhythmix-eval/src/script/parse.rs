//! Step-language parser: pest grammar + Pratt parser → [`Program`].

use pest::Parser;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;

use crate::error::{EvalError, Result};
use crate::value::{ArithOp, BitOp, Value};

// ---------------------------------------------------------------------------
// Pest parser (generated from script.pest grammar)
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[grammar = "src/script/script.pest"]
struct StepParser;

/// Words the grammar will not read as identifiers.
pub(crate) const KEYWORDS: &[&str] = &["if", "else", "true", "false", "nil"];

// ---------------------------------------------------------------------------
// Program AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
    pub result: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign(String, Expr),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Arith(ArithOp),
    Bit(BitOp),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Value),
    Var(String),
    Field(Box<Expr>, String),
    Call(String, Vec<Expr>),
    /// `|param| body`, only meaningful as a call argument.
    Lambda(String, Box<Expr>),
    List(Vec<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a step-language program.
pub fn parse_program(code: &str) -> Result<Program> {
    let mut pairs = StepParser::parse(Rule::program, code)
        .map_err(|e| EvalError::Script(e.to_string()))?;

    let pratt = pratt();
    let Some(program) = pairs.next() else {
        return Err(EvalError::Script("empty program".into()));
    };

    let mut stmts = Vec::new();
    let mut result = None;
    for pair in program.into_inner() {
        match pair.as_rule() {
            Rule::assign | Rule::if_stmt => stmts.push(parse_stmt(pair, &pratt)),
            Rule::expr => result = Some(parse_expr(pair, &pratt)),
            _ => {} // EOI
        }
    }
    let result = result.ok_or_else(|| EvalError::Script("program has no result expression".into()))?;
    Ok(Program { stmts, result })
}

fn pratt() -> PrattParser<Rule> {
    PrattParser::new()
        .op(Op::infix(Rule::or_op, Assoc::Left))
        .op(Op::infix(Rule::and_op, Assoc::Left))
        .op(Op::infix(Rule::bit_or_op, Assoc::Left))
        .op(Op::infix(Rule::bit_xor_op, Assoc::Left))
        .op(Op::infix(Rule::bit_and_op, Assoc::Left))
        .op(Op::infix(Rule::eq_op, Assoc::Left) | Op::infix(Rule::ne_op, Assoc::Left))
        .op(Op::infix(Rule::lt_op, Assoc::Left)
            | Op::infix(Rule::le_op, Assoc::Left)
            | Op::infix(Rule::gt_op, Assoc::Left)
            | Op::infix(Rule::ge_op, Assoc::Left))
        .op(Op::infix(Rule::shl_op, Assoc::Left) | Op::infix(Rule::shr_op, Assoc::Left))
        .op(Op::infix(Rule::add_op, Assoc::Left) | Op::infix(Rule::sub_op, Assoc::Left))
        .op(Op::infix(Rule::mul_op, Assoc::Left) | Op::infix(Rule::div_op, Assoc::Left))
        .op(Op::prefix(Rule::neg_op) | Op::prefix(Rule::not_op))
        .op(Op::postfix(Rule::field))
}

// ---------------------------------------------------------------------------
// Internal parsing helpers
// ---------------------------------------------------------------------------

fn parse_stmt(pair: Pair<'_, Rule>, pratt: &PrattParser<Rule>) -> Stmt {
    match pair.as_rule() {
        Rule::assign => {
            let mut inner = pair.into_inner();
            let (Some(name), Some(value)) = (inner.next(), inner.next()) else {
                unreachable!("assign = ident ~ expr");
            };
            Stmt::Assign(name.as_str().to_string(), parse_expr(value, pratt))
        }
        Rule::if_stmt => {
            let mut inner = pair.into_inner();
            let (Some(cond), Some(then)) = (inner.next(), inner.next()) else {
                unreachable!("if_stmt = expr ~ block");
            };
            let otherwise = match inner.next() {
                Some(p) if p.as_rule() == Rule::block => parse_block(p, pratt),
                Some(p) => vec![parse_stmt(p, pratt)],
                None => Vec::new(),
            };
            Stmt::If {
                cond: parse_expr(cond, pratt),
                then: parse_block(then, pratt),
                otherwise,
            }
        }
        other => unreachable!("unexpected statement rule: {other:?}"),
    }
}

fn parse_block(pair: Pair<'_, Rule>, pratt: &PrattParser<Rule>) -> Vec<Stmt> {
    pair.into_inner().map(|p| parse_stmt(p, pratt)).collect()
}

fn parse_expr(pair: Pair<'_, Rule>, pratt: &PrattParser<Rule>) -> Expr {
    pratt
        .map_primary(|primary| parse_primary(primary, pratt))
        .map_prefix(|op, rhs| match op.as_rule() {
            Rule::neg_op => Expr::Neg(Box::new(rhs)),
            Rule::not_op => Expr::Not(Box::new(rhs)),
            other => unreachable!("unexpected prefix rule: {other:?}"),
        })
        .map_postfix(|lhs, op| match op.as_rule() {
            Rule::field => {
                let name = op.into_inner().as_str().to_string();
                Expr::Field(Box::new(lhs), name)
            }
            other => unreachable!("unexpected postfix rule: {other:?}"),
        })
        .map_infix(|lhs, op, rhs| {
            let op = match op.as_rule() {
                Rule::or_op => BinaryOp::Or,
                Rule::and_op => BinaryOp::And,
                Rule::eq_op => BinaryOp::Eq,
                Rule::ne_op => BinaryOp::Ne,
                Rule::lt_op => BinaryOp::Lt,
                Rule::le_op => BinaryOp::Le,
                Rule::gt_op => BinaryOp::Gt,
                Rule::ge_op => BinaryOp::Ge,
                Rule::add_op => BinaryOp::Arith(ArithOp::Add),
                Rule::sub_op => BinaryOp::Arith(ArithOp::Sub),
                Rule::mul_op => BinaryOp::Arith(ArithOp::Mul),
                Rule::div_op => BinaryOp::Arith(ArithOp::Div),
                Rule::bit_and_op => BinaryOp::Bit(BitOp::And),
                Rule::bit_or_op => BinaryOp::Bit(BitOp::Or),
                Rule::bit_xor_op => BinaryOp::Bit(BitOp::Xor),
                Rule::shl_op => BinaryOp::Bit(BitOp::Shl),
                Rule::shr_op => BinaryOp::Bit(BitOp::Shr),
                other => unreachable!("unexpected infix rule: {other:?}"),
            };
            Expr::Binary(op, Box::new(lhs), Box::new(rhs))
        })
        .parse(pair.into_inner())
}

fn parse_primary(pair: Pair<'_, Rule>, pratt: &PrattParser<Rule>) -> Expr {
    match pair.as_rule() {
        Rule::int => {
            let s = pair.as_str();
            match s.parse::<i64>() {
                Ok(i) => Expr::Lit(Value::Int(i)),
                Err(_) => Expr::Lit(s.parse::<f64>().map(Value::Float).unwrap_or(Value::Nil)),
            }
        }
        Rule::float => Expr::Lit(pair.as_str().parse::<f64>().map(Value::Float).unwrap_or(Value::Nil)),
        Rule::string => {
            let raw = pair.into_inner().as_str();
            Expr::Lit(Value::Str(unescape(raw)))
        }
        Rule::boolean => Expr::Lit(Value::Bool(pair.as_str() == "true")),
        Rule::nil => Expr::Lit(Value::Nil),
        Rule::ident => Expr::Var(pair.as_str().to_string()),
        Rule::expr => parse_expr(pair, pratt),
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = inner.next().map(|p| p.as_str().to_string()).unwrap_or_default();
            let args = inner.map(|p| parse_expr(p, pratt)).collect();
            Expr::Call(name, args)
        }
        Rule::lambda => {
            let mut inner = pair.into_inner();
            let (Some(param), Some(body)) = (inner.next(), inner.next()) else {
                unreachable!("lambda = ident ~ expr");
            };
            Expr::Lambda(param.as_str().to_string(), Box::new(parse_expr(body, pratt)))
        }
        Rule::list => Expr::List(pair.into_inner().map(|p| parse_expr(p, pratt)).collect()),
        other => unreachable!("unexpected primary rule: {other:?}"),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Quote `s` as a step-language string literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(s: &str) -> Box<Expr> {
        Box::new(Expr::Var(s.into()))
    }

    fn int(i: i64) -> Box<Expr> {
        Box::new(Expr::Lit(Value::Int(i)))
    }

    #[test]
    fn test_result_only() {
        let p = parse_program("(count$0 >= 3)").unwrap();
        assert!(p.stmts.is_empty());
        assert_eq!(p.result, Expr::Binary(BinaryOp::Ge, var("count$0"), int(3)));
    }

    #[test]
    fn test_if_else_and_assign() {
        let p = parse_program(
            "if (event.value > 4) { c$1 = (c$1 + 1) } else { c$1 = 0 }; (c$1 >= 3)",
        )
        .unwrap();
        assert_eq!(p.stmts.len(), 1);
        let Stmt::If { cond, then, otherwise } = &p.stmts[0] else {
            panic!("expected if");
        };
        assert_eq!(
            *cond,
            Expr::Binary(
                BinaryOp::Gt,
                Box::new(Expr::Field(var("event"), "value".into())),
                int(4)
            )
        );
        assert_eq!(then.len(), 1);
        assert_eq!(otherwise, &vec![Stmt::Assign("c$1".into(), Expr::Lit(Value::Int(0)))]);
    }

    #[test]
    fn test_else_if_chain() {
        let p = parse_program("if (a == 0) { a = 1 } else if (a == 1) { a = 2 }; a").unwrap();
        let Stmt::If { otherwise, .. } = &p.stmts[0] else {
            panic!("expected if");
        };
        assert!(matches!(otherwise.as_slice(), [Stmt::If { .. }]));
    }

    #[test]
    fn test_precedence() {
        let p = parse_program("1 + 2 * 3 == 7 && !false").unwrap();
        let Expr::Binary(BinaryOp::And, lhs, rhs) = p.result else {
            panic!("expected &&");
        };
        assert!(matches!(*lhs, Expr::Binary(BinaryOp::Eq, _, _)));
        assert!(matches!(*rhs, Expr::Not(_)));
    }

    #[test]
    fn test_calls_lists_lambdas() {
        let p = parse_program("hit_rate(push([], event), |event| (event.value > 4))").unwrap();
        let Expr::Call(name, args) = p.result else {
            panic!("expected call");
        };
        assert_eq!(name, "hit_rate");
        assert!(matches!(&args[0], Expr::Call(n, _) if n == "push"));
        assert!(matches!(&args[1], Expr::Lambda(param, _) if param == "event"));
    }

    #[test]
    fn test_field_on_call_result() {
        let p = parse_program("first(b$2).ts").unwrap();
        assert!(matches!(p.result, Expr::Field(_, ref f) if f == "ts"));
    }

    #[test]
    fn test_strings_round_trip_through_quote() {
        let src = format!("{} == x", quote("a \"q\" \\ b"));
        let p = parse_program(&src).unwrap();
        let Expr::Binary(_, lhs, _) = p.result else {
            panic!("expected ==");
        };
        assert_eq!(*lhs, Expr::Lit(Value::Str("a \"q\" \\ b".into())));
    }

    #[test]
    fn test_float_forms() {
        for (code, want) in [("0.5", 0.5), ("1e-8", 1e-8), ("1e20", 1e20), ("2.5E+3", 2500.0)] {
            let p = parse_program(code).unwrap();
            assert_eq!(p.result, Expr::Lit(Value::Float(want)), "{code}");
        }
        assert!(parse_program(".5").is_err());
    }

    #[test]
    fn test_keywords_are_not_identifiers() {
        let p = parse_program("nil").unwrap();
        assert_eq!(p.result, Expr::Lit(Value::Nil));
        let p = parse_program("iffy").unwrap();
        assert_eq!(p.result, Expr::Var("iffy".into()));
        assert!(parse_program("if = 1; if").is_err());
    }

    #[test]
    fn test_malformed_program() {
        let err = parse_program("x = ; 1").unwrap_err();
        assert!(matches!(err, EvalError::Script(_)));
    }
}
