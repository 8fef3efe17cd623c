//! Hand-written lexer for Rhythmix source text.
//!
//! Produces a flat token sequence terminated by a single [`TokenKind::Eof`]
//! token. Multi-character operators are matched longest first, numbers
//! absorb a trailing unit suffix (`100ms`), and a `+`/`-` glued to a
//! number is treated as its sign when the previous token cannot end an
//! operand (`count(>4,-3)` but `a-3`).

use crate::error::{Result, RhythmixParserError};
use crate::token::{Token, TokenKind};

/// Two-character operators, matched before single characters.
const DOUBLE_OPS: &[&str] = &["==", "!=", ">=", "<=", "&&", "||", "<<", ">>", "->"];

const SINGLE_OPS: &str = "+-*/><=!&|^()[]{},.";

/// Time unit suffixes a number may carry.
const UNITS: &[&str] = &["ms", "s", "m", "h", "d"];

/// Stateless lexer. Every [`Lexer::analyse`] call owns its input.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lexer;

impl Lexer {
    pub fn new() -> Self {
        Lexer
    }

    /// Tokenize `source`.
    pub fn analyse(&self, source: &str) -> Result<Vec<Token>> {
        Cursor::new(source).run()
    }
}

/// Convenience wrapper around [`Lexer::analyse`].
pub fn analyse(source: &str) -> Result<Vec<Token>> {
    Lexer.analyse(source)
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    line_start: usize,
    tokens: Vec<Token>,
}

impl Cursor {
    fn new(source: &str) -> Self {
        Cursor {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            line_start: 0,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        Some(c)
    }

    fn column_of(&self, position: usize) -> usize {
        position.saturating_sub(self.line_start)
    }

    fn error_at(&self, ch: char, position: usize) -> RhythmixParserError {
        RhythmixParserError::Lexical {
            ch,
            position,
            line: self.line,
            column: self.column_of(position),
        }
    }

    fn push(&mut self, kind: TokenKind, text: String, start: usize, line: usize, column: usize) {
        self.tokens
            .push(Token::new(kind, text, start).at(line, column));
    }

    fn run(mut self) -> Result<Vec<Token>> {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
                continue;
            }
            if c == '/' && self.peek_at(1) == Some('/') {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
                continue;
            }
            if c == '/' && self.peek_at(1) == Some('*') {
                self.skip_block_comment()?;
                continue;
            }

            let start = self.pos;
            let (line, column) = (self.line, self.column_of(start));

            if c.is_ascii_digit()
                || (c == '.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()))
            {
                let (kind, text) = self.number(String::new())?;
                self.push(kind, text, start, line, column);
            } else if (c == '+' || c == '-')
                && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())
                && self.sign_allowed()
            {
                self.bump();
                let sign = if c == '-' { "-" } else { "" };
                let (kind, text) = self.number(sign.to_string())?;
                self.push(kind, text, start, line, column);
            } else if is_ident_start(c) {
                let mut text = String::new();
                while let Some(c) = self.peek().filter(|c| is_ident_part(*c)) {
                    text.push(c);
                    self.bump();
                }
                self.push(TokenKind::Identifier, text, start, line, column);
            } else if c == '"' || c == '\'' {
                let text = self.string(c)?;
                self.push(TokenKind::Str, text, start, line, column);
            } else if let Some(op) = self.operator() {
                self.push(TokenKind::Operator, op, start, line, column);
            } else {
                return Err(self.error_at(c, start));
            }
        }

        let end = self.pos;
        let column = self.column_of(end);
        self.push(TokenKind::Eof, String::new(), end, self.line, column);
        Ok(self.tokens)
    }

    /// A sign belongs to the number unless the previous token ends an operand.
    fn sign_allowed(&self) -> bool {
        match self.tokens.last() {
            None => true,
            Some(t) => match t.kind {
                TokenKind::Operator => !matches!(t.text.as_str(), ")" | "]" | "}"),
                _ => false,
            },
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        let start = self.pos;
        self.bump();
        self.bump();
        loop {
            match self.bump() {
                Some('*') if self.peek() == Some('/') => {
                    self.bump();
                    return Ok(());
                }
                Some(_) => {}
                None => return Err(self.error_at('/', start)),
            }
        }
    }

    /// Digits, an optional fraction, then an optional unit suffix. A suffix
    /// outside [`UNITS`] is an error at the suffix.
    fn number(&mut self, mut text: String) -> Result<(TokenKind, String)> {
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else if c == '.'
                && !is_float
                && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())
            {
                is_float = true;
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }

        if self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            let (start, line, column) = (self.pos, self.line, self.column_of(self.pos));
            let mut unit = String::new();
            while let Some(c) = self.peek().filter(|c| is_ident_part(*c)) {
                unit.push(c);
                self.bump();
            }
            if !UNITS.contains(&unit.as_str()) {
                return Err(RhythmixParserError::UnknownUnit {
                    unit,
                    position: start,
                    line,
                    column,
                });
            }
            text.push_str(&unit);
            return Ok((TokenKind::Duration, text));
        }

        let kind = if is_float {
            TokenKind::Float
        } else {
            TokenKind::Integer
        };
        Ok((kind, text))
    }

    fn string(&mut self, quote: char) -> Result<String> {
        let start = self.pos;
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(text),
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(c) => text.push(c),
                    None => return Err(self.error_at(quote, start)),
                },
                Some(c) => text.push(c),
                None => return Err(self.error_at(quote, start)),
            }
        }
    }

    fn operator(&mut self) -> Option<String> {
        let c = self.peek()?;
        if let Some(next) = self.peek_at(1) {
            let pair: String = [c, next].iter().collect();
            if DOUBLE_OPS.contains(&pair.as_str()) {
                self.bump();
                self.bump();
                return Some(pair);
            }
        }
        if SINGLE_OPS.contains(c) {
            self.bump();
            return Some(c.to_string());
        }
        None
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}
