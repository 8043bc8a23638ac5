//! Row predicates for filtered table queries.
//!
//! A [`Predicate`] is a tree of column comparisons joined by `AND`/`OR`.
//! Predicates are built programmatically with [`Predicate::eq`] and friends,
//! or parsed from text:
//!
//! ```text
//! expr    := term ( OR term )*
//! term    := factor ( AND factor )*
//! factor  := '(' expr ')' | column op literal
//! op      := = | == | != | <> | < | <= | > | >=
//! literal := integer | float | 'text' | "text" | true | false
//! ```
//!
//! Text is parsed with `sqlparser` and the resulting SQL expression is
//! converted into a [`Predicate`]; anything beyond comparisons joined by
//! `AND`/`OR` is rejected. Keywords are case-insensitive and `AND` binds
//! tighter than `OR`. Chains of the same connective are kept flat, so a long
//! `A = 1 AND B = 2 AND ...` does not deepen the tree.
//!
//! Before evaluation a predicate is bound to a [`Schema`], which resolves
//! column names and checks literal types once instead of per row.

use crate::buffer::Buffer;
use crate::schema::Schema;
use crate::types::ElementType;
use crate::{Error, Result};
use sqlparser::ast as sql_ast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;
use sqlparser::tokenizer::Token;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Deepest nesting of parentheses and connectives accepted when parsing or
/// binding a predicate.
pub const MAX_NESTING: usize = 32;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Applies the operator to an ordering; unordered values (NaN) only
    /// satisfy `!=`.
    fn holds(self, ordering: Option<Ordering>) -> bool {
        match ordering {
            None => self == CompareOp::Ne,
            Some(ord) => match self {
                CompareOp::Eq => ord == Ordering::Equal,
                CompareOp::Ne => ord != Ordering::Equal,
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Le => ord != Ordering::Greater,
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::Ge => ord != Ordering::Less,
            },
        }
    }
}

/// A literal value on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i128),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Literal {
    /// Element type used when reporting type mismatches.
    fn element_type(&self) -> ElementType {
        match self {
            Literal::Int(_) => ElementType::I64,
            Literal::Float(_) => ElementType::F64,
            Literal::Str(_) => ElementType::Str,
            Literal::Bool(_) => ElementType::U8,
        }
    }

    fn as_int(&self) -> Option<i128> {
        match self {
            Literal::Int(i) => Some(*i),
            Literal::Bool(b) => Some(i128::from(*b)),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_float(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Float(f) => Some(*f),
            Literal::Bool(b) => Some(f64::from(u8::from(*b))),
            Literal::Str(_) => None,
        }
    }
}

macro_rules! literal_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Literal {
            fn from(value: $t) -> Self {
                Literal::Int(i128::from(value))
            }
        })*
    };
}

literal_from_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl From<f32> for Literal {
    fn from(value: f32) -> Self {
        Literal::Float(f64::from(value))
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Str(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Str(value)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x:?}"),
            Literal::Str(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Boolean expression over column values.
///
/// `And`/`Or` hold their operands in order; an empty `And` matches every row
/// and an empty `Or` matches none.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row.
    All,
    Compare {
        column: String,
        op: CompareOp,
        value: Literal,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Literal>) -> Self {
        Predicate::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(column, CompareOp::Ne, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn le(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(column, CompareOp::Le, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn ge(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(column, CompareOp::Ge, value)
    }

    /// Conjunction; nested conjunctions are spliced into one operand list.
    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        let mut terms = match self {
            Predicate::And(terms) => terms,
            first => vec![first],
        };
        match other {
            Predicate::And(more) => terms.extend(more),
            last => terms.push(last),
        }
        Predicate::And(terms)
    }

    /// Disjunction; nested disjunctions are spliced into one operand list.
    #[must_use]
    pub fn or(self, other: Predicate) -> Self {
        let mut terms = match self {
            Predicate::Or(terms) => terms,
            first => vec![first],
        };
        match other {
            Predicate::Or(more) => terms.extend(more),
            last => terms.push(last),
        }
        Predicate::Or(terms)
    }

    /// Parses predicate text; blank text yields [`Predicate::All`].
    ///
    /// # Errors
    /// Returns `ParseError` for malformed text, for SQL constructs other than
    /// comparisons joined by `AND`/`OR`, for numbers outside the `f64` range
    /// and for nesting deeper than [`MAX_NESTING`].
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Predicate::All);
        }
        let dialect = GenericDialect {};
        let mut parser = SqlParser::new(&dialect)
            .with_recursion_limit(MAX_NESTING)
            .try_with_sql(text)?;
        let expr = parser.parse_expr()?;
        let next = parser.peek_token().token;
        if next != Token::EOF {
            return Err(Error::ParseError(format!(
                "unexpected '{next}' after the predicate"
            )));
        }
        Predicate::from_sql_ast(expr)
    }

    /// Converts a parsed SQL expression.
    fn from_sql_ast(expr: sql_ast::Expr) -> Result<Self> {
        match expr {
            sql_ast::Expr::Nested(inner) => Predicate::from_sql_ast(*inner),
            chain @ sql_ast::Expr::BinaryOp {
                op: sql_ast::BinaryOperator::And,
                ..
            } => Ok(Predicate::And(operands(chain, &sql_ast::BinaryOperator::And)?)),
            chain @ sql_ast::Expr::BinaryOp {
                op: sql_ast::BinaryOperator::Or,
                ..
            } => Ok(Predicate::Or(operands(chain, &sql_ast::BinaryOperator::Or)?)),
            sql_ast::Expr::BinaryOp { left, op, right } => Ok(Predicate::Compare {
                op: compare_op(&op)?,
                column: column_name(*left)?,
                value: literal(*right)?,
            }),
            // how `Predicate::All` and an empty `Or` display
            sql_ast::Expr::Value(sql_ast::Value::Boolean(true)) => Ok(Predicate::All),
            sql_ast::Expr::Value(sql_ast::Value::Boolean(false)) => Ok(Predicate::Or(Vec::new())),
            other => Err(Error::ParseError(format!(
                "expected a column comparison, found '{other}'"
            ))),
        }
    }

    /// Column names referenced, in order of appearance.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_columns(&mut names);
        names
    }

    fn collect_columns<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Predicate::All => {}
            Predicate::Compare { column, .. } => {
                if !names.contains(&column.as_str()) {
                    names.push(column);
                }
            }
            Predicate::And(terms) | Predicate::Or(terms) => {
                for term in terms {
                    term.collect_columns(names);
                }
            }
        }
    }

    /// Resolves column names and checks literal types against `schema`.
    ///
    /// # Errors
    /// Returns `UnknownColumn` for names absent from the schema,
    /// `TypeMismatch` for multi-element columns or incompatible literals and
    /// `ParseError` for predicates nested deeper than [`MAX_NESTING`].
    pub fn bind(&self, schema: &Schema) -> Result<BoundPredicate> {
        Ok(BoundPredicate {
            root: self.bind_node(schema, 0)?,
        })
    }

    fn bind_node(&self, schema: &Schema, depth: usize) -> Result<BoundNode> {
        if depth > MAX_NESTING {
            return Err(Error::ParseError(format!(
                "predicate nests deeper than {MAX_NESTING} levels"
            )));
        }
        let node = match self {
            Predicate::All => BoundNode::All,
            Predicate::Compare { column, op, value } => {
                let index = schema
                    .index_of(column)
                    .ok_or_else(|| Error::UnknownColumn(column.clone()))?;
                let declared = &schema.columns()[index];
                let compatible = declared.element_count == 1
                    && match declared.element_type {
                        ElementType::Str => matches!(value, Literal::Str(_)),
                        ElementType::ComplexI16 | ElementType::ComplexF32 => false,
                        ElementType::Char => match value {
                            Literal::Str(s) => s.len() == 1,
                            other => other.as_int().is_some(),
                        },
                        _ => !matches!(value, Literal::Str(_)),
                    };
                if !compatible {
                    return Err(Error::TypeMismatch {
                        name: column.clone(),
                        expected: declared.element_type,
                        found: value.element_type(),
                    });
                }
                BoundNode::Compare {
                    index,
                    op: *op,
                    value: value.clone(),
                }
            }
            Predicate::And(terms) => BoundNode::And(bind_terms(terms, schema, depth)?),
            Predicate::Or(terms) => BoundNode::Or(bind_terms(terms, schema, depth)?),
        };
        Ok(node)
    }
}

fn bind_terms(terms: &[Predicate], schema: &Schema, depth: usize) -> Result<Vec<BoundNode>> {
    terms
        .iter()
        .map(|t| t.bind_node(schema, depth + 1))
        .collect()
}

/// Operands of a chain of `op`, looking through parentheses. Walks the chain
/// with an explicit stack so its length does not grow the call stack.
fn operands(chain: sql_ast::Expr, op: &sql_ast::BinaryOperator) -> Result<Vec<Predicate>> {
    let mut pending = vec![chain];
    let mut flat = Vec::new();
    while let Some(expr) = pending.pop() {
        match expr {
            sql_ast::Expr::BinaryOp {
                left,
                op: inner,
                right,
            } if inner == *op => {
                pending.push(*right);
                pending.push(*left);
            }
            sql_ast::Expr::Nested(inner) => pending.push(*inner),
            other => flat.push(other),
        }
    }
    flat.into_iter().map(Predicate::from_sql_ast).collect()
}

fn compare_op(op: &sql_ast::BinaryOperator) -> Result<CompareOp> {
    match op {
        sql_ast::BinaryOperator::Eq => Ok(CompareOp::Eq),
        sql_ast::BinaryOperator::NotEq => Ok(CompareOp::Ne),
        sql_ast::BinaryOperator::Lt => Ok(CompareOp::Lt),
        sql_ast::BinaryOperator::LtEq => Ok(CompareOp::Le),
        sql_ast::BinaryOperator::Gt => Ok(CompareOp::Gt),
        sql_ast::BinaryOperator::GtEq => Ok(CompareOp::Ge),
        other => Err(Error::ParseError(format!("unsupported operator '{other}'"))),
    }
}

fn column_name(expr: sql_ast::Expr) -> Result<String> {
    match expr {
        sql_ast::Expr::Identifier(ident) => Ok(ident.value),
        sql_ast::Expr::CompoundIdentifier(idents) => Ok(idents
            .into_iter()
            .map(|i| i.value)
            .collect::<Vec<_>>()
            .join(".")),
        other => Err(Error::ParseError(format!(
            "expected a column name, found '{other}'"
        ))),
    }
}

fn literal(expr: sql_ast::Expr) -> Result<Literal> {
    match expr {
        sql_ast::Expr::Value(value) => literal_value(value),
        // SQL reads "x" as a quoted identifier; on the value side it is text
        sql_ast::Expr::Identifier(sql_ast::Ident {
            value,
            quote_style: Some('"'),
            ..
        }) => Ok(Literal::Str(value)),
        sql_ast::Expr::UnaryOp {
            op: sql_ast::UnaryOperator::Minus,
            expr,
        } => match literal(*expr)? {
            Literal::Int(i) => Ok(Literal::Int(-i)),
            Literal::Float(f) => Ok(Literal::Float(-f)),
            other => Err(Error::ParseError(format!("cannot negate {other}"))),
        },
        sql_ast::Expr::UnaryOp {
            op: sql_ast::UnaryOperator::Plus,
            expr,
        } => match literal(*expr)? {
            number @ (Literal::Int(_) | Literal::Float(_)) => Ok(number),
            other => Err(Error::ParseError(format!("unary '+' applied to {other}"))),
        },
        other => Err(Error::ParseError(format!(
            "expected a literal value, found '{other}'"
        ))),
    }
}

fn literal_value(value: sql_ast::Value) -> Result<Literal> {
    match value {
        sql_ast::Value::Number(text, _) => number(&text),
        sql_ast::Value::SingleQuotedString(s) | sql_ast::Value::DoubleQuotedString(s) => {
            Ok(Literal::Str(s))
        }
        sql_ast::Value::Boolean(b) => Ok(Literal::Bool(b)),
        other => Err(Error::ParseError(format!("unsupported literal {other}"))),
    }
}

fn number(text: &str) -> Result<Literal> {
    if let Ok(i) = text.parse::<i128>() {
        return Ok(Literal::Int(i));
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => Ok(Literal::Float(f)),
        _ => Err(Error::ParseError(format!("number {text} is out of range"))),
    }
}

impl FromStr for Predicate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Renders text that [`Predicate::parse`] reads back as an equal predicate,
/// as long as every float literal is finite. NaN and infinities have no
/// literal syntax.
impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::All => f.write_str("true"),
            Predicate::Compare { column, op, value } => {
                write!(f, "{column} {} {value}", op.symbol())
            }
            Predicate::And(terms) => fmt_chain(f, terms, " AND "),
            Predicate::Or(terms) => fmt_chain(f, terms, " OR "),
        }
    }
}

fn fmt_chain(f: &mut fmt::Formatter<'_>, terms: &[Predicate], separator: &str) -> fmt::Result {
    if terms.is_empty() {
        // an empty AND matches every row, an empty OR none
        return f.write_str(if separator == " AND " { "true" } else { "false" });
    }
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        if matches!(term, Predicate::And(_) | Predicate::Or(_)) {
            write!(f, "({term})")?;
        } else {
            write!(f, "{term}")?;
        }
    }
    Ok(())
}

/// A predicate resolved against one schema.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundPredicate {
    root: BoundNode,
}

#[derive(Debug, Clone, PartialEq)]
enum BoundNode {
    All,
    Compare {
        index: usize,
        op: CompareOp,
        value: Literal,
    },
    And(Vec<BoundNode>),
    Or(Vec<BoundNode>),
}

impl BoundPredicate {
    /// Evaluates the predicate for `row`, given one flat buffer per schema
    /// column. Sub-expressions short-circuit.
    #[must_use]
    pub fn matches(&self, columns: &[Buffer], row: usize) -> bool {
        eval(&self.root, columns, row)
    }
}

fn eval(node: &BoundNode, columns: &[Buffer], row: usize) -> bool {
    match node {
        BoundNode::All => true,
        BoundNode::Compare { index, op, value } => {
            op.holds(compare_cell(&columns[*index], row, value))
        }
        BoundNode::And(terms) => terms.iter().all(|t| eval(t, columns, row)),
        BoundNode::Or(terms) => terms.iter().any(|t| eval(t, columns, row)),
    }
}

fn cmp_int(cell: i128, value: &Literal) -> Option<Ordering> {
    match value {
        Literal::Float(f) => {
            #[allow(clippy::cast_precision_loss)]
            let cell = cell as f64;
            cell.partial_cmp(f)
        }
        other => other.as_int().map(|v| cell.cmp(&v)),
    }
}

fn cmp_float(cell: f64, value: &Literal) -> Option<Ordering> {
    value.as_float().and_then(|v| cell.partial_cmp(&v))
}

fn compare_cell(column: &Buffer, row: usize, value: &Literal) -> Option<Ordering> {
    match column {
        Buffer::Char(v) => match value {
            Literal::Str(s) => s.as_bytes().first().map(|b| v[row].0.cmp(b)),
            other => cmp_int(i128::from(v[row].0), other),
        },
        Buffer::I8(v) => cmp_int(i128::from(v[row]), value),
        Buffer::I16(v) => cmp_int(i128::from(v[row]), value),
        Buffer::I32(v) => cmp_int(i128::from(v[row]), value),
        Buffer::I64(v) => cmp_int(i128::from(v[row]), value),
        Buffer::U8(v) => cmp_int(i128::from(v[row]), value),
        Buffer::U16(v) => cmp_int(i128::from(v[row]), value),
        Buffer::U32(v) => cmp_int(i128::from(v[row]), value),
        Buffer::U64(v) => cmp_int(i128::from(v[row]), value),
        Buffer::F32(v) => cmp_float(f64::from(v[row]), value),
        Buffer::F64(v) => cmp_float(v[row], value),
        Buffer::Str(v) => match value {
            Literal::Str(s) => Some(v[row].as_str().cmp(s.as_str())),
            _ => None,
        },
        Buffer::ComplexI16(_) | Buffer::ComplexF32(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn schema() -> Schema {
        Schema::from_columns([
            Column::new("ANTENNA1", ElementType::I32),
            Column::new("ANTENNA2", ElementType::I32),
            Column::new("TIME", ElementType::F64),
            Column::new("NAME", ElementType::Str),
            Column::array("UVW", ElementType::F64, 3),
            Column::new("DATA", ElementType::ComplexF32),
        ])
        .unwrap()
    }

    #[test]
    fn test_parse_conjunction() {
        let p = Predicate::parse("ANTENNA1 = 1 AND ANTENNA2 = 0").unwrap();
        assert_eq!(p, Predicate::eq("ANTENNA1", 1).and(Predicate::eq("ANTENNA2", 0)));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let p = Predicate::parse("A = 1 or B = 2 and C = 3").unwrap();
        let expected = Predicate::eq("A", 1).or(Predicate::eq("B", 2).and(Predicate::eq("C", 3)));
        assert_eq!(p, expected);

        let grouped = Predicate::parse("(A = 1 OR B = 2) AND C = 3").unwrap();
        let expected = Predicate::eq("A", 1)
            .or(Predicate::eq("B", 2))
            .and(Predicate::eq("C", 3));
        assert_eq!(grouped, expected);
    }

    #[test]
    fn test_literals() {
        let p = Predicate::parse("NAME = 'it''s' AND TIME >= -1.5e3 AND X <> 7").unwrap();
        assert_eq!(p.columns(), vec!["NAME", "TIME", "X"]);
        let expected = Predicate::eq("NAME", "it's")
            .and(Predicate::ge("TIME", -1500.0))
            .and(Predicate::ne("X", 7));
        assert_eq!(p, expected);
    }

    #[test]
    fn test_blank_is_all() {
        assert_eq!(Predicate::parse("   ").unwrap(), Predicate::All);
    }

    #[test]
    fn test_parse_errors() {
        for text in [
            "ANTENNA1 =",
            "ANTENNA1 1",
            "= 1",
            "A = 1 AND",
            "(A = 1",
            "A = 'open",
            "A = 1 B",
            "A = B",
            "1 = A",
            "A + 1",
            "A = 1 || B = 2",
            "NOT A = 1",
            "A = -'x'",
            "A = 1e999",
        ] {
            assert!(
                matches!(Predicate::parse(text), Err(Error::ParseError(_))),
                "expected parse error for {text:?}"
            );
        }
    }

    #[test]
    fn test_operator_spellings() {
        for (text, op) in [
            ("A = 1", CompareOp::Eq),
            ("A == 1", CompareOp::Eq),
            ("A != 1", CompareOp::Ne),
            ("A <> 1", CompareOp::Ne),
            ("A < 1", CompareOp::Lt),
            ("A <= 1", CompareOp::Le),
            ("A > 1", CompareOp::Gt),
            ("A >= 1", CompareOp::Ge),
        ] {
            assert_eq!(Predicate::parse(text).unwrap(), Predicate::compare("A", op, 1), "{text}");
        }
        let quoted = Predicate::parse(r#"NAME = "CS001" and FLAG = TRUE"#).unwrap();
        assert_eq!(
            quoted,
            Predicate::eq("NAME", "CS001").and(Predicate::eq("FLAG", true))
        );
    }

    #[test]
    fn test_deep_parentheses_rejected() {
        let depth = 100_000;
        let text = format!("{}A = 1{}", "(".repeat(depth), ")".repeat(depth));
        assert!(matches!(Predicate::parse(&text), Err(Error::ParseError(_))));

        let shallow = format!("{}A = 1{}", "(".repeat(4), ")".repeat(4));
        assert_eq!(Predicate::parse(&shallow).unwrap(), Predicate::eq("A", 1));
    }

    #[test]
    fn test_long_chain_stays_flat() {
        let terms = 10_000;
        let text = vec!["ANTENNA1 = 1"; terms].join(" AND ");
        let p = Predicate::parse(&text).unwrap();
        let Predicate::And(ref operands) = p else {
            panic!("expected a conjunction, got {p:?}");
        };
        assert_eq!(operands.len(), terms);

        let bound = p.bind(&schema()).unwrap();
        let columns = vec![
            Buffer::I32(vec![1, 0]),
            Buffer::I32(vec![0, 0]),
            Buffer::F64(vec![0.0, 0.0]),
            Buffer::Str(vec!["a".into(), "b".into()]),
            Buffer::F64(vec![0.0; 6]),
            Buffer::zeros(ElementType::ComplexF32, 2),
        ];
        assert!(bound.matches(&columns, 0));
        assert!(!bound.matches(&columns, 1));
    }

    #[test]
    fn test_programmatic_nesting_limit() {
        let mut p = Predicate::eq("ANTENNA1", 1);
        for i in 0..MAX_NESTING {
            // alternate connectives so nothing is spliced
            p = if i % 2 == 0 {
                p.or(Predicate::eq("ANTENNA2", 0))
            } else {
                p.and(Predicate::eq("ANTENNA2", 0))
            };
        }
        assert!(p.bind(&schema()).is_ok());

        let deep = (0..=MAX_NESTING).fold(Predicate::eq("ANTENNA1", 1), |p, _| {
            Predicate::And(vec![p])
        });
        assert!(matches!(deep.bind(&schema()), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_non_finite_literals_do_not_reparse() {
        let p = Predicate::eq("TIME", f64::NAN);
        assert!(matches!(Predicate::parse(&p.to_string()), Err(Error::ParseError(_))));
        let p = Predicate::lt("TIME", f64::INFINITY);
        assert!(Predicate::parse(&p.to_string()).is_err());
    }

    #[test]
    fn test_display_reparses() {
        let p = Predicate::eq("A", 1)
            .or(Predicate::eq("B", "x"))
            .and(Predicate::lt("C", 2.5));
        let reparsed = Predicate::parse(&p.to_string()).unwrap();
        assert_eq!(reparsed, p);
    }

    #[test]
    fn test_bind_errors() {
        let schema = schema();
        assert!(matches!(
            Predicate::eq("MISSING", 1).bind(&schema),
            Err(Error::UnknownColumn(_))
        ));
        assert!(matches!(
            Predicate::eq("UVW", 1.0).bind(&schema),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            Predicate::eq("ANTENNA1", "one").bind(&schema),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            Predicate::eq("NAME", 3).bind(&schema),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            Predicate::eq("DATA", 0.0).bind(&schema),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_evaluation() {
        let schema = schema();
        let columns = vec![
            Buffer::I32(vec![0, 0, 1, 1, 2]),
            Buffer::I32(vec![1, 2, 0, 3, 0]),
            Buffer::F64(vec![0.5, 1.5, f64::NAN, 3.5, 4.5]),
            Buffer::Str(vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()]),
            Buffer::F64(vec![0.0; 15]),
            Buffer::zeros(ElementType::ComplexF32, 5),
        ];
        let hits = |p: &str| -> Vec<usize> {
            let bound = Predicate::parse(p).unwrap().bind(&schema).unwrap();
            (0..5).filter(|&r| bound.matches(&columns, r)).collect()
        };
        assert_eq!(hits("ANTENNA1 = 1 AND ANTENNA2 = 0"), vec![2]);
        assert_eq!(hits("ANTENNA1 = 9"), Vec::<usize>::new());
        assert_eq!(hits("ANTENNA1 = 0 OR ANTENNA2 = 0"), vec![0, 1, 2, 4]);
        assert_eq!(hits("TIME > 1"), vec![1, 3, 4]);
        assert_eq!(hits("TIME != 1.5"), vec![0, 2, 3, 4]);
        assert_eq!(hits("NAME >= 'c'"), vec![2, 3, 4]);
        assert_eq!(hits("ANTENNA2 = 0.0"), vec![2, 4]);
    }
}
