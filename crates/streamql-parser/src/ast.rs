//! AST node definitions.
//!
//! Nodes are created once during parsing and shared by reference afterwards;
//! a sub-query referenced twice is the same `Arc<Query>`. Column-name lists
//! on a named sub-query are not validated against the sub-query's output here
//! (cardinality is an analysis-time check).

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Identifier must not be empty")]
    EmptyIdentifier,
}

// ---------------------------------------------------------------------------
// QualifiedName
// ---------------------------------------------------------------------------

/// A possibly dot-qualified identifier, normalized to uppercase parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    parts: Vec<String>,
}

impl QualifiedName {
    pub fn of(name: &str) -> Result<Self, ParseError> {
        let parts: Vec<String> = name
            .split('.')
            .map(|p| p.trim().to_ascii_uppercase())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            return Err(ParseError::EmptyIdentifier);
        }
        Ok(Self { parts })
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// The first qualifying part; used as the binding name of sub-queries.
    pub fn head(&self) -> &str {
        &self.parts[0]
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts.join("."))
    }
}

// ---------------------------------------------------------------------------
// Query nodes
// ---------------------------------------------------------------------------

/// One item of a select list: a column reference with an optional alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectItem {
    /// `*`
    All,
    /// `column [AS alias]`
    Column {
        name: QualifiedName,
        alias: Option<String>,
    },
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectItem::All => write!(f, "*"),
            SelectItem::Column { name, alias } => match alias {
                Some(a) => write!(f, "{name} AS {a}"),
                None => write!(f, "{name}"),
            },
        }
    }
}

/// The FROM side of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// A named stream or table in the catalog.
    Source(QualifiedName),
    /// A reference to a named sub-query bound earlier in the statement.
    SubqueryRef(String),
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::Source(name) => write!(f, "{name}"),
            Relation::SubqueryRef(name) => write!(f, "{name}"),
        }
    }
}

/// A query tree: select list, source relation, optional filter text.
///
/// The predicate is kept in source form at this layer; analysis turns it into
/// a typed expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub select: Vec<SelectItem>,
    pub from: Relation,
    pub predicate: Option<String>,
}

impl Query {
    pub fn new(select: Vec<SelectItem>, from: Relation, predicate: Option<String>) -> Self {
        Self {
            select,
            from,
            predicate,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self.select.iter().map(|i| i.to_string()).collect();
        write!(f, "SELECT {} FROM {}", items.join(", "), self.from)?;
        if let Some(pred) = &self.predicate {
            write!(f, " WHERE {pred}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NamedSubquery
// ---------------------------------------------------------------------------

/// A named sub-query binding: a name, an owned nested query, and an optional
/// explicit column-name list.
///
/// The name is normalized to the first qualifying part of the identifier.
/// The same binding is shared by reference wherever it is referenced.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSubquery {
    name: String,
    query: Arc<Query>,
    column_names: Option<Vec<String>>,
}

impl NamedSubquery {
    pub fn new(
        name: &str,
        query: Arc<Query>,
        column_names: Option<Vec<String>>,
    ) -> Result<Self, ParseError> {
        let name = QualifiedName::of(name)?.head().to_string();
        Ok(Self {
            name,
            query,
            column_names,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    pub fn column_names(&self) -> Option<&[String]> {
        self.column_names.as_deref()
    }
}

impl fmt::Display for NamedSubquery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} AS ({})", self.name, self.query)?;
        if let Some(cols) = &self.column_names {
            write!(f, " ({})", cols.join(", "))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Visitor
// ---------------------------------------------------------------------------

/// Visitor over AST nodes. Per-node methods default to [`Self::visit_node`],
/// so a visitor only overrides what it cares about.
pub trait AstVisitor<R: Default, C> {
    fn visit_node(&mut self, _context: &mut C) -> R {
        R::default()
    }

    fn visit_query(&mut self, _query: &Query, context: &mut C) -> R {
        self.visit_node(context)
    }

    fn visit_named_subquery(&mut self, subquery: &NamedSubquery, context: &mut C) -> R {
        let _ = self.visit_query(subquery.query(), context);
        self.visit_node(context)
    }

    fn visit_select_item(&mut self, _item: &SelectItem, context: &mut C) -> R {
        self.visit_node(context)
    }

    fn visit_relation(&mut self, _relation: &Relation, context: &mut C) -> R {
        self.visit_node(context)
    }
}

impl Query {
    pub fn accept<R: Default, C, V: AstVisitor<R, C>>(&self, visitor: &mut V, context: &mut C) -> R {
        visitor.visit_query(self, context)
    }
}

impl NamedSubquery {
    pub fn accept<R: Default, C, V: AstVisitor<R, C>>(&self, visitor: &mut V, context: &mut C) -> R {
        visitor.visit_named_subquery(self, context)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
