//! Path-query language: AST and parser.

pub mod ast;
pub mod parser;

pub use ast::Ast;
pub use parser::parse;
