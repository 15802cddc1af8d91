#![forbid(unsafe_code)]

//! Compiled execution plan.
//!
//! A [`Plan`] is plain data: the ordered join chain derived from traversal
//! edges, a predicate tree over qualified physical columns, the projected
//! fields, pagination, and the dry-run flag. It is built fresh per query and
//! consumed by exactly one executor invocation.

use serde::Serialize;
use smallvec::SmallVec;

use crate::domain::{Domain, EdgeDef, FieldDef};
use crate::query::Action;

/// A physical column qualified by its table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct QualifiedColumn {
    pub table: &'static str,
    pub column: &'static str,
}

impl QualifiedColumn {
    /// Renders as `table.column`.
    pub fn sql(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

/// One join step contributed by a traversal edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinStep {
    /// The edge that produced this step.
    pub edge: EdgeDef,
}

impl JoinStep {
    /// The joined (right-hand) domain.
    pub fn target(&self) -> Domain {
        self.edge.to
    }
}

/// SQL comparison operators the predicate tree lowers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum SqlOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
}

impl SqlOp {
    /// SQL token for the operator.
    pub fn sql(self) -> &'static str {
        match self {
            SqlOp::Eq => "=",
            SqlOp::Ne => "<>",
            SqlOp::Lt => "<",
            SqlOp::Lte => "<=",
            SqlOp::Gt => ">",
            SqlOp::Gte => ">=",
            SqlOp::Like => "LIKE",
            SqlOp::NotLike => "NOT LIKE",
        }
    }
}

/// Positional parameter value bound into the rendered SQL.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum SqlParam {
    Text(String),
    Int(i64),
}

impl rusqlite::types::ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        match self {
            SqlParam::Text(text) => Ok(rusqlite::types::ToSqlOutput::from(text.as_str())),
            SqlParam::Int(n) => Ok(rusqlite::types::ToSqlOutput::from(*n)),
        }
    }
}

/// Predicate tree over physical columns, preserving the criteria's And/Or
/// structure.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Cmp {
        column: QualifiedColumn,
        op: SqlOp,
        param: SqlParam,
        /// LIKE comparisons escape literal wildcard characters.
        escaped_like: bool,
    },
    IsNull {
        column: QualifiedColumn,
    },
    IsNotNull {
        column: QualifiedColumn,
    },
    /// Always-true leaf (e.g. an item-type "any" comparison).
    True,
}

/// A projected field with the alias it appears under in result rows.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectedField {
    /// Domain the field belongs to.
    pub domain: Domain,
    /// Resolved field definition.
    pub field: FieldDef,
    /// Row key: the bare field name for leaf-domain fields, `domain.field`
    /// otherwise.
    pub alias: String,
}

impl ProjectedField {
    /// The physical column backing this field.
    pub fn column(&self) -> QualifiedColumn {
        QualifiedColumn {
            table: self.domain.table(),
            column: self.field.column,
        }
    }
}

/// The compiled plan.
#[derive(Clone, Debug)]
pub struct Plan {
    /// Action the plan was compiled from.
    pub action: Action,
    /// Root domain (the FROM table).
    pub root: Domain,
    /// Join steps in the deterministic order they were declared.
    pub joins: SmallVec<[JoinStep; 4]>,
    /// WHERE predicate, absent for unfiltered queries.
    pub predicate: Option<Predicate>,
    /// Projected fields in output order.
    pub projection: Vec<ProjectedField>,
    /// Identity columns of every joined table, giving a stable total order
    /// for streaming windows.
    pub order_by: Vec<QualifiedColumn>,
    /// Row cap, when given.
    pub limit: Option<u64>,
    /// Row offset.
    pub offset: u64,
    /// Count-only execution: the executor must not materialize row data.
    pub dry_run: bool,
}

impl Plan {
    /// Domains touched by the plan, root first.
    pub fn domains(&self) -> Vec<Domain> {
        let mut out = vec![self.root];
        out.extend(self.joins.iter().map(JoinStep::target));
        out
    }
}
