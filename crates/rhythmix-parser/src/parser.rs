//! Precedence-climbing parser: token sequence → [`AstNode`].
//!
//! Handles:
//! - Binary operators over the [`PriorityTable`] tiers (left-associative)
//! - Unary `!` and `-`
//! - Unary comparisons against the implicit subject (`>4`, `!=0`)
//! - Ranges (`[1,5)`), arrow sequences (`{>1}->{<1}`), mut shorthand (`<1,2,3>`)
//! - Function calls with the strict modifier (`count!(>4,3)`)
//! - Chain pipelines (`filter(>0).window(5).avg().meet(>10)`), validated
//!   link by link against the [`ChainRegistry`]

use crate::ast::{AstNode, CHAIN_LABEL, NodeKind};
use crate::chain::{ChainCategory, ChainRegistry, ChainViolation};
use crate::error::{Result, RhythmixParserError};
use crate::lexer::Lexer;
use crate::priority::PriorityTable;
use crate::token::{Token, TokenKind};

const COMPARE_OPS: &[&str] = &[">", "<", ">=", "<=", "==", "!="];

// =============================================================================
// Public API
// =============================================================================

/// Parse a token sequence (as produced by the lexer) into an AST.
pub fn parse(tokens: Vec<Token>, chains: &ChainRegistry) -> Result<AstNode> {
    Parser::new(tokens, chains).parse()
}

/// Lex and parse `source` in one step.
///
/// ```rust
/// use rhythmix_parser::{ChainRegistry, parse_source};
///
/// let ast = parse_source("count!(>4, 3)", &ChainRegistry::default()).unwrap();
/// assert_eq!(ast.to_string(), "(count! (> 4) 3)");
/// ```
pub fn parse_source(source: &str, chains: &ChainRegistry) -> Result<AstNode> {
    let tokens = Lexer::new().analyse(source)?;
    parse(tokens, chains)
}

// =============================================================================
// Parser
// =============================================================================

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    chains: &'a ChainRegistry,
    table: PriorityTable,
}

impl<'a> Parser<'a> {
    pub fn new(mut tokens: Vec<Token>, chains: &'a ChainRegistry) -> Self {
        if !tokens.last().is_some_and(Token::is_eof) {
            let end = tokens.last().map(|t| t.position + t.text.len()).unwrap_or(0);
            tokens.push(Token::new(TokenKind::Eof, "", end));
        }
        Parser {
            tokens,
            pos: 0,
            chains,
            table: PriorityTable::new(),
        }
    }

    pub fn parse(mut self) -> Result<AstNode> {
        if self.peek().is_eof() {
            return Err(RhythmixParserError::parse_at("empty expression", self.peek()));
        }
        let node = self.expr(0)?;
        let tok = self.peek();
        if !tok.is_eof() {
            return Err(RhythmixParserError::parse_at(
                format!("unexpected token {tok}"),
                tok,
            ));
        }
        Ok(node)
    }

    // -------------------------------------------------------------------------
    // Token helpers
    // -------------------------------------------------------------------------

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if !tok.is_eof() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, op: &str) -> bool {
        if self.peek().is_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, op: &str, context: &str) -> Result<Token> {
        if self.peek().is_op(op) {
            return Ok(self.advance());
        }
        let tok = self.peek();
        Err(RhythmixParserError::parse_at(
            format!("expected '{op}' {context}, found {tok}"),
            tok,
        ))
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn expr(&mut self, level: usize) -> Result<AstNode> {
        if level + 1 >= self.table.size() {
            return self.unary();
        }
        let mut left = self.expr(level + 1)?;
        loop {
            let tok = self.peek();
            if tok.kind != TokenKind::Operator || !self.table.get(level).contains(&tok.text.as_str())
            {
                break;
            }
            let op = self.advance();
            let right = self.expr(level + 1)?;
            left = AstNode::binary(op, left, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<AstNode> {
        if self.peek().is_op("!") || self.peek().is_op("-") {
            let op = self.advance();
            let operand = self.unary()?;
            return Ok(AstNode::unary(op, operand));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<AstNode> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Integer | TokenKind::Float | TokenKind::Duration | TokenKind::Str => {
                Ok(AstNode::literal(self.advance()))
            }
            TokenKind::Identifier => self.identifier(),
            TokenKind::Operator => match tok.text.as_str() {
                "(" | "[" => self.paren_or_range(),
                "{" => self.arrow(),
                "<" if self.looks_like_mut() => self.mut_sequence(),
                op if COMPARE_OPS.contains(&op) => {
                    let op = self.advance();
                    let operand = self.unary()?;
                    Ok(AstNode::new(NodeKind::Compare, op.text.clone(), op)
                        .with_children(vec![operand]))
                }
                _ => Err(RhythmixParserError::parse_at(
                    format!("unexpected token {tok}"),
                    &tok,
                )),
            },
            TokenKind::Eof => Err(RhythmixParserError::parse_at(
                "unexpected end of input",
                &tok,
            )),
        }
    }

    /// `( expr )`, or a range `(a,b)`, `[a,b]`, `(a,b]`, `[a,b)`.
    fn paren_or_range(&mut self) -> Result<AstNode> {
        let open = self.advance();
        let first = self.expr(0)?;

        if !self.peek().is_op(",") {
            if open.text == "[" {
                let tok = self.peek();
                return Err(RhythmixParserError::parse_at(
                    format!("malformed range: expected ',' after lower bound, found {tok}"),
                    tok,
                ));
            }
            self.expect(")", "to close '('")?;
            return Ok(first);
        }

        self.advance();
        let second = self.expr(0)?;
        let close = self.peek().clone();
        if !(close.is_op(")") || close.is_op("]")) {
            return Err(RhythmixParserError::parse_at(
                format!("malformed range: expected ')' or ']', found {close}"),
                &close,
            ));
        }
        self.advance();
        let label = format!("{}{}", open.text, close.text);
        Ok(AstNode::new(NodeKind::Range, label, open).with_children(vec![first, second]))
    }

    /// `{a}->{b}->...`
    fn arrow(&mut self) -> Result<AstNode> {
        let start = self.peek().clone();
        let mut stages = Vec::new();
        loop {
            self.expect("{", "to open an arrow stage")?;
            stages.push(self.expr(0)?);
            self.expect("}", "to close an arrow stage")?;
            if !self.eat("->") {
                break;
            }
        }
        Ok(AstNode::new(NodeKind::Arrow, "->", start).with_children(stages))
    }

    /// `<v1,v2,...>` is a value-sequence shorthand.
    fn looks_like_mut(&self) -> bool {
        let mut offset = 1;
        loop {
            if !self.peek_at(offset).is_value() {
                return false;
            }
            let sep = self.peek_at(offset + 1);
            if sep.is_op(">") {
                return true;
            }
            if !sep.is_op(",") {
                return false;
            }
            offset += 2;
        }
    }

    /// `<1,2,3>` desugars to `{==1}->{==2}->{==3}`.
    fn mut_sequence(&mut self) -> Result<AstNode> {
        let open = self.advance();
        let mut stages = Vec::new();
        loop {
            let value = self.advance();
            let eq = Token::new(TokenKind::Operator, "==", value.position).at(value.line, value.column);
            stages.push(
                AstNode::new(NodeKind::Compare, "==", eq).with_children(vec![AstNode::literal(value)]),
            );
            if self.eat(">") {
                break;
            }
            self.expect(",", "between sequence values")?;
        }
        Ok(AstNode::new(NodeKind::Arrow, "->", open).with_children(stages))
    }

    fn identifier(&mut self) -> Result<AstNode> {
        let name = self.advance();
        let strict = self.peek().is_op("!") && self.peek_at(1).is_op("(");
        if strict {
            self.advance();
        }
        if !self.peek().is_op("(") {
            return Ok(AstNode::new(NodeKind::Variable, name.text.clone(), name));
        }

        let args = self.arguments(&name.text)?;
        let chained = self.peek().is_op(".") && self.peek_at(1).kind == TokenKind::Identifier;
        let chain_only = name.text != "count" && self.chains.is_chain_function(&name.text);

        if chained || chain_only {
            let head = AstNode::call(NodeKind::ChainLink, name, strict, args);
            return self.chain(head);
        }
        Ok(AstNode::call(NodeKind::FunctionCall, name, strict, args))
    }

    fn arguments(&mut self, fname: &str) -> Result<Vec<AstNode>> {
        self.expect("(", &format!("after '{fname}'"))?;
        let mut args = Vec::new();
        if self.eat(")") {
            return Ok(args);
        }
        loop {
            args.push(self.expr(0)?);
            if self.eat(")") {
                return Ok(args);
            }
            if !self.eat(",") {
                let tok = self.peek();
                return Err(RhythmixParserError::parse_at(
                    format!("expected ',' or ')' in arguments of '{fname}', found {tok}"),
                    tok,
                ));
            }
        }
    }

    /// Collect `.link(...)` segments after `head` and validate every step.
    fn chain(&mut self, head: AstNode) -> Result<AstNode> {
        let anchor = head.lexeme.clone();
        let mut links = Vec::new();

        match self.chains.category(&head.label) {
            Some(ChainCategory::Start) => {}
            Some(ChainCategory::Limit | ChainCategory::Calc) => {
                let Some(start) = self.chains.default_start() else {
                    return Err(violation(ChainViolation::NotFirst(head.label.clone()), &anchor));
                };
                let implicit = Token::new(TokenKind::Identifier, start, anchor.position)
                    .at(anchor.line, anchor.column);
                links.push(AstNode::call(NodeKind::ChainLink, implicit, false, Vec::new()));
            }
            Some(ChainCategory::End) => {
                return Err(violation(ChainViolation::NotFirst(head.label.clone()), &anchor));
            }
            None => {
                return Err(violation(ChainViolation::Undefined(head.label.clone()), &anchor));
            }
        }
        if let Some(prev) = links.last() {
            self.chains
                .check_transition(&prev.label, &head.label)
                .map_err(|v| violation(v, &anchor))?;
        }
        links.push(head);

        while self.peek().is_op(".") && self.peek_at(1).kind == TokenKind::Identifier {
            self.advance();
            let name = self.advance();
            let strict = self.eat_strict_marker();
            let prev = links.last().map(|l| l.label.clone()).unwrap_or_default();
            self.chains
                .check_transition(&prev, &name.text)
                .map_err(|v| violation(v, &name))?;
            let args = self.arguments(&name.text)?;
            links.push(AstNode::call(NodeKind::ChainLink, name, strict, args));
        }

        let has = |n: &str| links.iter().any(|l| l.label == n);
        if has("limit") && has("window") {
            return Err(violation(ChainViolation::LimitWithWindow, &anchor));
        }
        if let Some(last) = links.last() {
            self.chains
                .check_last(&last.label)
                .map_err(|v| violation(v, &last.lexeme))?;
        }

        let chain_tok = Token::new(TokenKind::Identifier, CHAIN_LABEL, anchor.position)
            .at(anchor.line, anchor.column);
        Ok(AstNode::call(NodeKind::FunctionCall, chain_tok, false, links))
    }

    fn eat_strict_marker(&mut self) -> bool {
        if self.peek().is_op("!") && self.peek_at(1).is_op("(") {
            self.advance();
            true
        } else {
            false
        }
    }
}

fn violation(v: ChainViolation, at: &Token) -> RhythmixParserError {
    RhythmixParserError::parse_at(v.to_string(), at)
}
