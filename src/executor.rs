#![forbid(unsafe_code)]

//! Plan execution against the SQLite store.
//!
//! Rendering is deterministic: the same plan always produces the same SQL
//! text and parameter list. The total is taken by an exact COUNT over the
//! same joins and predicate before any rows are fetched, so `total` reflects
//! the full match set irrespective of limit and offset. A dry run stops
//! there and returns an empty, already-exhausted result.

use tracing::debug;

use crate::config::EngineOptions;
use crate::error::{ExecutionError, Result};
use crate::plan::{Plan, Predicate, SqlParam};
use crate::populate::populate_row;
use crate::result::{EagerResult, LazyCursor, LazyResult, Row};
use crate::store::SqliteStore;

/// Executes compiled plans over a shared store handle.
pub struct Executor {
    store: SqliteStore,
    options: EngineOptions,
}

impl Executor {
    pub fn new(store: SqliteStore, options: EngineOptions) -> Self {
        Self { store, options }
    }

    /// Runs the plan to completion and materializes every row.
    pub fn execute_eager(&self, plan: &Plan) -> Result<EagerResult> {
        let total = self.count(plan)?;
        if plan.dry_run {
            return Ok(EagerResult::new(Vec::new(), plan.offset, total, plan.limit));
        }

        let (select, params) = render_select(plan);
        let sql = format!(
            "{} LIMIT {} OFFSET {}",
            select,
            plan.limit.map_or(-1, |n| n as i64),
            plan.offset
        );
        debug!(%sql, "executing eager select");

        let conn_handle = self.store.connection();
        let conn = conn_handle.lock();
        let mut stmt = conn.prepare(&sql).map_err(ExecutionError::Storage)?;
        let mut raw_rows = stmt
            .query(rusqlite::params_from_iter(params.iter()))
            .map_err(ExecutionError::Storage)?;
        let mut rows: Vec<Row> = Vec::new();
        while let Some(raw) = raw_rows.next().map_err(ExecutionError::Storage)? {
            rows.push(populate_row(raw, &plan.projection, self.options.date_format)?);
        }
        Ok(EagerResult::new(rows, plan.offset, total, plan.limit))
    }

    /// Runs the plan as a streaming result; rows are fetched in windows as
    /// the consumer advances.
    pub fn execute_lazy(&self, plan: &Plan) -> Result<LazyResult> {
        let total = self.count(plan)?;
        if plan.dry_run {
            return Ok(LazyResult::new(None, plan.offset, total, plan.limit));
        }

        let (sql, params) = render_select(plan);
        debug!(%sql, fetch_size = self.options.fetch_size, "opening lazy cursor");
        let cursor = LazyCursor {
            conn: self.store.connection(),
            sql,
            params,
            projection: plan.projection.clone(),
            date_format: self.options.date_format,
            fetch_size: self.options.fetch_size,
            next_offset: plan.offset,
            remaining: plan.limit,
        };
        Ok(LazyResult::new(Some(cursor), plan.offset, total, plan.limit))
    }

    fn count(&self, plan: &Plan) -> Result<u64> {
        let (sql, params) = render_count(plan);
        debug!(%sql, "executing count");
        let conn_handle = self.store.connection();
        let conn = conn_handle.lock();
        let total: i64 = conn
            .query_row(&sql, rusqlite::params_from_iter(params.iter()), |row| {
                row.get(0)
            })
            .map_err(ExecutionError::Storage)?;
        Ok(total.max(0) as u64)
    }
}

/// Renders the ordered SELECT for the plan, without LIMIT/OFFSET. Streaming
/// results append their own window clause per fetch.
pub(crate) fn render_select(plan: &Plan) -> (String, Vec<SqlParam>) {
    let mut sql = String::from("SELECT ");
    for (i, projected) in plan.projection.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&projected.column().sql());
    }
    render_from(plan, &mut sql);
    let mut params = Vec::new();
    render_where(plan, &mut sql, &mut params);
    sql.push_str(" ORDER BY ");
    for (i, column) in plan.order_by.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&column.sql());
    }
    (sql, params)
}

/// Renders the exact COUNT over the same joins and predicate.
pub(crate) fn render_count(plan: &Plan) -> (String, Vec<SqlParam>) {
    let mut sql = String::from("SELECT COUNT(*)");
    render_from(plan, &mut sql);
    let mut params = Vec::new();
    render_where(plan, &mut sql, &mut params);
    (sql, params)
}

fn render_from(plan: &Plan, sql: &mut String) {
    sql.push_str(" FROM ");
    sql.push_str(plan.root.table());
    for join in &plan.joins {
        let edge = &join.edge;
        sql.push_str(" JOIN ");
        sql.push_str(edge.to.table());
        sql.push_str(" ON ");
        sql.push_str(edge.from.table());
        sql.push('.');
        sql.push_str(edge.from_column);
        sql.push_str(" = ");
        sql.push_str(edge.to.table());
        sql.push('.');
        sql.push_str(edge.to_column);
    }
}

fn render_where(plan: &Plan, sql: &mut String, params: &mut Vec<SqlParam>) {
    if let Some(predicate) = &plan.predicate {
        sql.push_str(" WHERE ");
        render_predicate(predicate, sql, params);
    }
}

fn render_predicate(predicate: &Predicate, sql: &mut String, params: &mut Vec<SqlParam>) {
    match predicate {
        Predicate::And(children) | Predicate::Or(children) if children.is_empty() => {
            sql.push('1');
        }
        Predicate::And(children) => {
            render_group(children, " AND ", sql, params);
        }
        Predicate::Or(children) => {
            render_group(children, " OR ", sql, params);
        }
        Predicate::Cmp {
            column,
            op,
            param,
            escaped_like,
        } => {
            sql.push_str(&column.sql());
            sql.push(' ');
            sql.push_str(op.sql());
            sql.push_str(" ?");
            params.push(param.clone());
            if *escaped_like {
                sql.push_str(" ESCAPE '\\'");
            }
        }
        Predicate::IsNull { column } => {
            sql.push_str(&column.sql());
            sql.push_str(" IS NULL");
        }
        Predicate::IsNotNull { column } => {
            sql.push_str(&column.sql());
            sql.push_str(" IS NOT NULL");
        }
        Predicate::True => sql.push('1'),
    }
}

fn render_group(
    children: &[Predicate],
    separator: &str,
    sql: &mut String,
    params: &mut Vec<SqlParam>,
) {
    sql.push('(');
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            sql.push_str(separator);
        }
        render_predicate(child, sql, params);
    }
    sql.push(')');
}
