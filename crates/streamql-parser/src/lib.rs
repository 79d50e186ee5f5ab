//! Query AST for streamql statements.
//!
//! The tree produced by parsing is immutable and carries no behavior beyond
//! structural equality, string rendering, and visitor dispatch; semantic
//! analysis resolves it against the catalog and emits the logical plan the
//! engine compiles.

pub mod ast;

pub use ast::{
    AstVisitor, NamedSubquery, ParseError, QualifiedName, Query, Relation, SelectItem,
};

pub type Result<T> = std::result::Result<T, ParseError>;
