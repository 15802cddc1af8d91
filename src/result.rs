#![forbid(unsafe_code)]

//! The externally consumed result contract.
//!
//! Both result variants expose `start` (the echoed offset), `total` (count
//! of all matching records irrespective of the limit), and `limited` (the
//! effective cap, if any). The eager variant owns its rows; the lazy variant
//! is a closeable cursor converting rows on demand.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

use crate::criteria::ItemTypeValue;
use crate::error::{ExecutionError, Result};
use crate::plan::{ProjectedField, SqlParam};
use crate::populate::{populate_row, DateFormat};

/// Typed field value in a result row.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// Absent value (null column or zero date sentinel).
    Null,
    /// String field.
    Str(String),
    /// Integer field.
    Int(i64),
    /// Long-integer field.
    Long(i64),
    /// Date field under the date-object policy.
    #[serde(serialize_with = "serialize_datetime")]
    Date(OffsetDateTime),
    /// Item type field.
    ItemType(ItemTypeValue),
}

fn serialize_datetime<S: Serializer>(dt: &OffsetDateTime, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match dt.format(&Rfc3339) {
        Ok(text) => serializer.serialize_str(&text),
        Err(_) => Err(serde::ser::Error::custom("datetime out of RFC 3339 range")),
    }
}

/// A single output row: field alias to typed value.
pub type Row = BTreeMap<String, Value>;

/// Fully materialized result set.
#[derive(Debug, Default)]
pub struct EagerResult {
    rows: Vec<Row>,
    start: u64,
    total: u64,
    limited: Option<u64>,
}

impl EagerResult {
    pub(crate) fn new(rows: Vec<Row>, start: u64, total: u64, limited: Option<u64>) -> Self {
        Self {
            rows,
            start,
            total,
            limited,
        }
    }

    /// Offset echoed back from the query.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Count of all matching records irrespective of the limit.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// The effective row cap, if one was applied.
    pub fn limited(&self) -> Option<u64> {
        self.limited
    }

    /// Materialized rows in plan order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of materialized rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows were materialized.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates the materialized rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }
}

impl IntoIterator for EagerResult {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a EagerResult {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

pub(crate) struct LazyCursor {
    pub(crate) conn: Arc<Mutex<Connection>>,
    /// Ordered SELECT without LIMIT/OFFSET; windows are appended per fetch.
    pub(crate) sql: String,
    pub(crate) params: Vec<SqlParam>,
    pub(crate) projection: Vec<ProjectedField>,
    pub(crate) date_format: DateFormat,
    pub(crate) fetch_size: usize,
    /// Absolute offset of the next window (starts at the plan's offset).
    pub(crate) next_offset: u64,
    /// Rows left under the plan's limit, `None` when uncapped.
    pub(crate) remaining: Option<u64>,
}

/// Streaming, cursor-backed result.
///
/// Rows are converted on demand as the consumer advances; the shared
/// connection handle is held until [`LazyResult::close`] (or drop, or
/// exhaustion) releases it. Closing early is the cancellation primitive and
/// is safe before the first row. Iteration after close or exhaustion yields
/// nothing; the result is not restartable.
pub struct LazyResult {
    cursor: Option<LazyCursor>,
    buffer: VecDeque<Row>,
    exhausted: bool,
    start: u64,
    total: u64,
    limited: Option<u64>,
}

impl LazyResult {
    pub(crate) fn new(cursor: Option<LazyCursor>, start: u64, total: u64, limited: Option<u64>) -> Self {
        let exhausted = cursor.is_none();
        Self {
            cursor,
            buffer: VecDeque::new(),
            exhausted,
            start,
            total,
            limited,
        }
    }

    /// Offset echoed back from the query.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Best-effort exact count of all matching records, taken by a COUNT
    /// query when the result was created. Rows inserted afterwards are not
    /// reflected.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// The effective row cap, if one was applied.
    pub fn limited(&self) -> Option<u64> {
        self.limited
    }

    /// Releases the underlying connection handle. Idempotent; safe to call
    /// before the first row was read.
    pub fn close(&mut self) {
        if self.cursor.take().is_some() {
            debug!("lazy result closed");
        }
        self.buffer.clear();
        self.exhausted = true;
    }

    /// True once the cursor has been closed or exhausted.
    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    fn fetch_window(&mut self) -> Result<()> {
        let Some(cursor) = self.cursor.as_mut() else {
            self.exhausted = true;
            return Ok(());
        };
        let window = match cursor.remaining {
            Some(0) => {
                self.exhausted = true;
                return Ok(());
            }
            Some(remaining) => (cursor.fetch_size as u64).min(remaining),
            None => cursor.fetch_size as u64,
        };
        let sql = format!("{} LIMIT {} OFFSET {}", cursor.sql, window, cursor.next_offset);
        let fetched = {
            let conn = cursor.conn.lock();
            let mut stmt = conn.prepare(&sql).map_err(ExecutionError::Storage)?;
            let mut rows = stmt
                .query(rusqlite::params_from_iter(cursor.params.iter()))
                .map_err(ExecutionError::Storage)?;
            let mut fetched = 0u64;
            while let Some(raw) = rows.next().map_err(ExecutionError::Storage)? {
                let row = populate_row(raw, &cursor.projection, cursor.date_format)?;
                self.buffer.push_back(row);
                fetched += 1;
            }
            fetched
        };
        cursor.next_offset += fetched;
        if let Some(remaining) = cursor.remaining.as_mut() {
            *remaining -= fetched.min(*remaining);
        }
        if fetched < window {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Iterator for LazyResult {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Some(Ok(row));
            }
            if self.exhausted {
                // Exhaustion releases the handle like an explicit close.
                self.cursor = None;
                return None;
            }
            if let Err(err) = self.fetch_window() {
                self.close();
                return Some(Err(err));
            }
        }
    }
}

impl Drop for LazyResult {
    fn drop(&mut self) {
        self.close();
    }
}
