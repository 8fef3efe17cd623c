//! AST for Rhythmix expressions.
//!
//! Every node keeps the token it was built from so later stages can report
//! errors at the right position. The tree is strictly owned top-down.

use std::fmt;

use serde::Serialize;

use crate::token::{Token, TokenKind};

// =============================================================================
// Node kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeKind {
    /// Number, duration or string literal.
    Literal,
    /// Reference to an environment binding.
    Variable,
    /// Two children: left and right operand.
    BinaryOp,
    /// One child.
    UnaryOp,
    /// `name[!](args)`. Exactly one [`NodeKind::ArgList`] child.
    FunctionCall,
    /// One segment of a chain. Exactly one [`NodeKind::ArgList`] child.
    ChainLink,
    /// Ordered arguments of a call or the links of a chain.
    ArgList,
    /// Unary comparison against the implicit subject: `>4`, `==1`.
    Compare,
    /// Interval test against the implicit subject: `[1,5)`.
    Range,
    /// Staged sequence `{a}->{b}->...`; children are the stages in order.
    Arrow,
}

/// Label of the node holding a whole chain pipeline.
pub const CHAIN_LABEL: &str = "chain";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AstNode {
    pub label: String,
    pub lexeme: Token,
    pub children: Vec<AstNode>,
    pub kind: NodeKind,
    /// `name!(...)`: reset-on-violation variant of a function.
    pub strict: bool,
}

impl AstNode {
    pub fn new(kind: NodeKind, label: impl Into<String>, lexeme: Token) -> Self {
        AstNode {
            label: label.into(),
            lexeme,
            children: Vec::new(),
            kind,
            strict: false,
        }
    }

    pub fn with_children(mut self, children: Vec<AstNode>) -> Self {
        self.children = children;
        self
    }

    pub fn literal(token: Token) -> Self {
        AstNode::new(NodeKind::Literal, token.text.clone(), token)
    }

    pub fn binary(op: Token, left: AstNode, right: AstNode) -> Self {
        AstNode::new(NodeKind::BinaryOp, op.text.clone(), op).with_children(vec![left, right])
    }

    pub fn unary(op: Token, operand: AstNode) -> Self {
        AstNode::new(NodeKind::UnaryOp, op.text.clone(), op).with_children(vec![operand])
    }

    /// A call or chain link with its arguments wrapped in an [`NodeKind::ArgList`].
    pub fn call(kind: NodeKind, name: Token, strict: bool, args: Vec<AstNode>) -> Self {
        let list = AstNode::new(NodeKind::ArgList, "args", name.clone()).with_children(args);
        let mut node = AstNode::new(kind, name.text.clone(), name).with_children(vec![list]);
        node.strict = strict;
        node
    }

    /// Arguments of a [`NodeKind::FunctionCall`] or [`NodeKind::ChainLink`].
    pub fn args(&self) -> &[AstNode] {
        match self.kind {
            NodeKind::FunctionCall | NodeKind::ChainLink => self
                .children
                .first()
                .map(|list| list.children.as_slice())
                .unwrap_or(&[]),
            _ => &[],
        }
    }

    pub fn is_chain(&self) -> bool {
        self.kind == NodeKind::FunctionCall && self.label == CHAIN_LABEL
    }

    /// Links of a chain node, in source order.
    pub fn links(&self) -> &[AstNode] {
        if self.is_chain() { self.args() } else { &[] }
    }

    /// Literal token kind, for literal nodes.
    pub fn literal_kind(&self) -> Option<TokenKind> {
        (self.kind == NodeKind::Literal).then_some(self.lexeme.kind)
    }
}

/// Compact s-expression rendering, used by tests and debug logging.
impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NodeKind::Literal => match self.lexeme.kind {
                TokenKind::Str => write!(f, "\"{}\"", self.label),
                _ => write!(f, "{}", self.label),
            },
            NodeKind::Variable => write!(f, "{}", self.label),
            NodeKind::ArgList => {
                for (i, child) in self.children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{child}")?;
                }
                Ok(())
            }
            NodeKind::FunctionCall | NodeKind::ChainLink => {
                let bang = if self.strict { "!" } else { "" };
                write!(f, "({}{bang}", self.label)?;
                for arg in self.args() {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
            _ => {
                write!(f, "({}", self.label)?;
                for child in &self.children {
                    write!(f, " {child}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(kind: TokenKind, text: &str) -> Token {
        Token::new(kind, text, 0)
    }

    #[test]
    fn test_call_wraps_args() {
        let node = AstNode::call(
            NodeKind::FunctionCall,
            tok(TokenKind::Identifier, "count"),
            true,
            vec![
                AstNode::literal(tok(TokenKind::Integer, "4")),
                AstNode::literal(tok(TokenKind::Integer, "3")),
            ],
        );
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].kind, NodeKind::ArgList);
        assert_eq!(node.args().len(), 2);
        assert_eq!(node.to_string(), "(count! 4 3)");
    }

    #[test]
    fn test_display_binary() {
        let node = AstNode::binary(
            tok(TokenKind::Operator, "+"),
            AstNode::literal(tok(TokenKind::Integer, "1")),
            AstNode::literal(tok(TokenKind::Str, "a")),
        );
        assert_eq!(node.to_string(), "(+ 1 \"a\")");
        assert!(node.args().is_empty());
    }
}
