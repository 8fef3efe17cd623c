//! # rhythmix-parser
//!
//! Front end for the Rhythmix condition language: stateful matching
//! expressions over timestamped sensor events such as `count!(>4,3)`,
//! `slope(>4,50ms)` or `filter(>0).window(5).avg().meet(>10)`.
//!
//! ## Architecture
//!
//! - **Lexer** ([`lexer`]): hand-written, longest-match operators, numbers that
//!   absorb a unit suffix (`100ms`), comments skipped
//! - **Priority table** ([`priority`]): eight precedence tiers, lowest first
//! - **Parser** ([`parser`]): precedence climbing plus unary compares, ranges,
//!   arrow sequences and function calls with the strict `!` modifier
//! - **Chain registry** ([`chain`]): start/limit/calc/end categories and the
//!   call tree that every `a().b().c()` pipeline is checked against
//!
//! ## Quick Start
//!
//! ```rust
//! use rhythmix_parser::{ChainRegistry, NodeKind, parse_source};
//!
//! let chains = ChainRegistry::default();
//! let ast = parse_source("filter(>0).window(5).avg().meet(>10)", &chains).unwrap();
//! assert!(ast.is_chain());
//! assert_eq!(ast.links().len(), 4);
//!
//! let err = parse_source("filter(>0).sum().avg().meet(>1)", &chains).unwrap_err();
//! assert_eq!(err.detail(), "'sum' operator cannot be followed by 'avg' operator");
//!
//! let call = parse_source("count!(>4, 3)", &chains).unwrap();
//! assert_eq!(call.kind, NodeKind::FunctionCall);
//! assert!(call.strict);
//! ```

pub mod ast;
pub mod chain;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod priority;
pub mod token;
pub mod value;

// Re-export the most commonly used types and functions at crate root
pub use ast::{AstNode, CHAIN_LABEL, NodeKind};
pub use chain::{ChainCategory, ChainRegistry, ChainRegistryBuilder, ChainViolation};
pub use error::{Result, RhythmixParserError, format_error};
pub use lexer::{Lexer, analyse};
pub use parser::{Parser, parse, parse_source};
pub use priority::PriorityTable;
pub use token::{Token, TokenKind};
pub use value::{Duration, DurationError, TimeUnit};
