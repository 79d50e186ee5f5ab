//! Row-level expressions: column references, literals, comparisons and
//! arithmetic, evaluated against a schema-ordered row.
//!
//! Null is absorbing for comparison and arithmetic. `AND` and `OR`
//! follow three-valued logic: a false conjunct or a true disjunct decides
//! the result even when the other side is null. A predicate that
//! evaluates to null drops the row the same way `false` does.

use std::fmt;

use streamql_core::{Row, Schema, SqlType, Value};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Expression
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Reference to a schema field by name, case-insensitive.
    Column(String),
    Literal(Value),
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
}

impl Expression {
    pub fn column(name: impl Into<String>) -> Self {
        Expression::Column(name.into())
    }

    pub fn literal(value: Value) -> Self {
        Expression::Literal(value)
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Evaluate against a row laid out in `schema` order.
    pub fn eval(&self, schema: &Schema, row: &Row) -> Result<Value> {
        match self {
            Expression::Column(name) => {
                let index = schema
                    .index_of(name)
                    .ok_or_else(|| Error::UnknownField(name.clone()))?;
                Ok(row.get(index).cloned().unwrap_or(Value::Null))
            }
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Binary { op, left, right } => {
                let lhs = left.eval(schema, row)?;
                let rhs = right.eval(schema, row)?;
                if lhs.is_null() || rhs.is_null() {
                    return Ok(Value::Null);
                }
                if op.is_comparison() {
                    compare(*op, &lhs, &rhs)
                } else {
                    arithmetic(*op, &lhs, &rhs)
                }
            }
            // Three-valued logic: a false conjunct or true disjunct decides
            // the result even when the other side is null.
            Expression::And(left, right) => {
                let lhs = left.eval(schema, row)?.as_bool();
                let rhs = right.eval(schema, row)?.as_bool();
                Ok(match (lhs, rhs) {
                    (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
                    (Some(true), Some(true)) => Value::Boolean(true),
                    _ => Value::Null,
                })
            }
            Expression::Or(left, right) => {
                let lhs = left.eval(schema, row)?.as_bool();
                let rhs = right.eval(schema, row)?.as_bool();
                Ok(match (lhs, rhs) {
                    (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
                    (Some(false), Some(false)) => Value::Boolean(false),
                    _ => Value::Null,
                })
            }
            Expression::Not(inner) => match inner.eval(schema, row)?.as_bool() {
                Some(b) => Ok(Value::Boolean(!b)),
                None => Ok(Value::Null),
            },
        }
    }

    /// Result type of this expression against `schema`.
    pub fn infer_type(&self, schema: &Schema) -> Result<SqlType> {
        match self {
            Expression::Column(name) => schema
                .field(name)
                .map(|(_, f)| f.sql_type.clone())
                .ok_or_else(|| Error::UnknownField(name.clone())),
            Expression::Literal(value) => value
                .sql_type()
                .ok_or_else(|| Error::Type(format!("Cannot infer type of literal: {value}"))),
            Expression::Binary { op, left, right } => {
                if op.is_comparison() {
                    return Ok(SqlType::Boolean);
                }
                let lhs = left.infer_type(schema)?;
                let rhs = right.infer_type(schema)?;
                if lhs == SqlType::Double || rhs == SqlType::Double {
                    Ok(SqlType::Double)
                } else {
                    Ok(SqlType::Bigint)
                }
            }
            Expression::And(_, _) | Expression::Or(_, _) | Expression::Not(_) => {
                Ok(SqlType::Boolean)
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Column(name) => f.write_str(name),
            Expression::Literal(value) => write!(f, "{value}"),
            Expression::Binary { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            Expression::And(left, right) => write!(f, "({left} AND {right})"),
            Expression::Or(left, right) => write!(f, "({left} OR {right})"),
            Expression::Not(inner) => write!(f, "(NOT {inner})"),
        }
    }
}

fn integral(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(v) | Value::Bigint(v) => Some(*v),
        _ => None,
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    // Integral operands compare exactly; mixed numeric comparison widens;
    // everything else compares structurally or lexically for strings.
    let ordering = match (integral(lhs), integral(rhs)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => match (lhs, rhs) {
                (Value::Varchar(a), Value::Varchar(b)) => Some(a.cmp(b)),
                (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
                _ => {
                    return match op {
                        BinaryOp::Eq => Ok(Value::Boolean(lhs == rhs)),
                        BinaryOp::NotEq => Ok(Value::Boolean(lhs != rhs)),
                        _ => Err(Error::Type(format!(
                            "Cannot compare {lhs} with {rhs} using {}",
                            op.symbol()
                        ))),
                    };
                }
            },
        },
    };
    let Some(ordering) = ordering else {
        return Ok(Value::Null);
    };
    let result = match op {
        BinaryOp::Eq => ordering.is_eq(),
        BinaryOp::NotEq => !ordering.is_eq(),
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::LtEq => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::GtEq => ordering.is_ge(),
        _ => unreachable!("comparison op"),
    };
    Ok(Value::Boolean(result))
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    // Integral operands stay in i64 so values past 2^53 survive exactly.
    // Division always widens to double.
    if op != BinaryOp::Div {
        if let (Some(a), Some(b)) = (integral(lhs), integral(rhs)) {
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                _ => unreachable!("arithmetic op"),
            };
            return result.map(Value::Bigint).ok_or_else(|| {
                Error::Type(format!("Integer overflow evaluating {a} {} {b}", op.symbol()))
            });
        }
    }
    let (a, b) = match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(Error::Type(format!(
                "Arithmetic requires numeric operands, got {lhs} and {rhs}"
            )));
        }
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        _ => unreachable!("arithmetic op"),
    };
    Ok(Value::Double(result))
}

// ---------------------------------------------------------------------------
// Select / aggregate expressions
// ---------------------------------------------------------------------------

/// One projected output column.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectExpression {
    pub expression: Expression,
    pub alias: String,
}

impl SelectExpression {
    pub fn new(expression: Expression, alias: impl Into<String>) -> Self {
        Self {
            expression,
            alias: alias.into(),
        }
    }

    /// Shorthand for projecting a column under its own name.
    pub fn passthrough(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            expression: Expression::Column(name.clone()),
            alias: name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Count => write!(f, "COUNT"),
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Min => write!(f, "MIN"),
            AggregateFunction::Max => write!(f, "MAX"),
        }
    }
}

/// One aggregated output column, e.g. `SUM(ORDERUNITS) AS TOTAL`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpression {
    pub function: AggregateFunction,
    /// `None` means `COUNT(*)`.
    pub argument: Option<Expression>,
    pub alias: String,
}

impl AggregateExpression {
    pub fn new(
        function: AggregateFunction,
        argument: Option<Expression>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            function,
            argument,
            alias: alias.into(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use streamql_core::Field;

    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("COL0", SqlType::Bigint),
            Field::new("COL1", SqlType::Varchar),
            Field::new("COL2", SqlType::Double),
        ])
        .unwrap()
    }

    fn row() -> Row {
        vec![
            Value::Bigint(10),
            Value::Varchar("frank".into()),
            Value::Double(2.5),
        ]
    }

    #[test]
    fn test_column_lookup_is_case_insensitive() {
        let expr = Expression::column("col1");
        assert_eq!(
            expr.eval(&schema(), &row()).unwrap(),
            Value::Varchar("frank".into())
        );
    }

    #[test]
    fn test_unknown_column_errors() {
        let expr = Expression::column("MISSING");
        assert!(matches!(
            expr.eval(&schema(), &row()),
            Err(Error::UnknownField(_))
        ));
    }

    #[test]
    fn test_numeric_comparison_widens() {
        // BIGINT 10 > DOUBLE literal 2.5
        let expr = Expression::binary(
            BinaryOp::Gt,
            Expression::column("COL0"),
            Expression::literal(Value::Double(2.5)),
        );
        assert_eq!(expr.eval(&schema(), &row()).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_null_operand_yields_null() {
        let expr = Expression::binary(
            BinaryOp::Eq,
            Expression::column("COL0"),
            Expression::literal(Value::Null),
        );
        assert_eq!(expr.eval(&schema(), &row()).unwrap(), Value::Null);
    }

    #[test]
    fn test_or_with_null_operand_is_true_when_other_side_true() {
        // (COL0 > 100) OR (COL1 = 'frank') must keep a row with a null
        // COL1 when the first disjunct already holds.
        let expr = Expression::Or(
            Box::new(Expression::binary(
                BinaryOp::Gt,
                Expression::column("COL0"),
                Expression::literal(Value::Bigint(100)),
            )),
            Box::new(Expression::binary(
                BinaryOp::Eq,
                Expression::column("COL1"),
                Expression::literal(Value::Varchar("frank".into())),
            )),
        );
        let row = vec![Value::Bigint(200), Value::Null, Value::Double(2.5)];
        assert_eq!(expr.eval(&schema(), &row).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_and_with_null_operand_is_false_when_other_side_false() {
        let expr = Expression::And(
            Box::new(Expression::binary(
                BinaryOp::Gt,
                Expression::column("COL0"),
                Expression::literal(Value::Bigint(100)),
            )),
            Box::new(Expression::binary(
                BinaryOp::Eq,
                Expression::column("COL1"),
                Expression::literal(Value::Varchar("frank".into())),
            )),
        );
        let row = vec![Value::Bigint(10), Value::Null, Value::Double(2.5)];
        assert_eq!(expr.eval(&schema(), &row).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn test_undecided_connectives_stay_null() {
        let null_cmp = Expression::binary(
            BinaryOp::Eq,
            Expression::column("COL1"),
            Expression::literal(Value::Varchar("frank".into())),
        );
        let truth = Expression::literal(Value::Boolean(true));
        let row = vec![Value::Bigint(10), Value::Null, Value::Double(2.5)];

        let and = Expression::And(Box::new(truth.clone()), Box::new(null_cmp.clone()));
        assert_eq!(and.eval(&schema(), &row).unwrap(), Value::Null);

        let or = Expression::Or(Box::new(null_cmp.clone()), Box::new(null_cmp));
        assert_eq!(or.eval(&schema(), &row).unwrap(), Value::Null);
    }

    #[test]
    fn test_arithmetic_type_follows_operands() {
        let sum = Expression::binary(
            BinaryOp::Add,
            Expression::column("COL0"),
            Expression::literal(Value::Bigint(5)),
        );
        assert_eq!(sum.eval(&schema(), &row()).unwrap(), Value::Bigint(15));
        assert_eq!(sum.infer_type(&schema()).unwrap(), SqlType::Bigint);

        let mixed = Expression::binary(
            BinaryOp::Mul,
            Expression::column("COL0"),
            Expression::column("COL2"),
        );
        assert_eq!(mixed.eval(&schema(), &row()).unwrap(), Value::Double(25.0));
        assert_eq!(mixed.infer_type(&schema()).unwrap(), SqlType::Double);
    }

    #[test]
    fn test_bigint_arithmetic_is_exact_past_double_precision() {
        // 2^53 + 1 has no f64 representation; i64 arithmetic keeps it.
        let base = (1i64 << 53) + 1;
        let sum = Expression::binary(
            BinaryOp::Add,
            Expression::literal(Value::Bigint(base)),
            Expression::literal(Value::Bigint(1)),
        );
        assert_eq!(sum.eval(&schema(), &row()).unwrap(), Value::Bigint(base + 1));

        let neq = Expression::binary(
            BinaryOp::Eq,
            Expression::literal(Value::Bigint(base)),
            Expression::literal(Value::Bigint(base - 1)),
        );
        assert_eq!(neq.eval(&schema(), &row()).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn test_bigint_arithmetic_overflow_errors() {
        let expr = Expression::binary(
            BinaryOp::Add,
            Expression::literal(Value::Bigint(i64::MAX)),
            Expression::literal(Value::Bigint(1)),
        );
        assert!(matches!(expr.eval(&schema(), &row()), Err(Error::Type(_))));
    }

    #[test]
    fn test_comparison_infers_boolean() {
        let expr = Expression::binary(
            BinaryOp::Lt,
            Expression::column("COL2"),
            Expression::literal(Value::Double(3.0)),
        );
        assert_eq!(expr.infer_type(&schema()).unwrap(), SqlType::Boolean);
    }

    #[test]
    fn test_rendering() {
        let expr = Expression::And(
            Box::new(Expression::binary(
                BinaryOp::Gt,
                Expression::column("COL0"),
                Expression::literal(Value::Bigint(100)),
            )),
            Box::new(Expression::binary(
                BinaryOp::Eq,
                Expression::column("COL1"),
                Expression::literal(Value::Varchar("frank".into())),
            )),
        );
        assert_eq!(expr.to_string(), "((COL0 > 100) AND (COL1 = frank))");
    }
}
