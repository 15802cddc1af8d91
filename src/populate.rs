#![forbid(unsafe_code)]

//! Typed row population.
//!
//! Raw column values are converted into [`Value`]s by matching exhaustively
//! on the field's [`FieldKind`]; adding a kind is a compile-time
//! exhaustiveness check. Date rendering is an injected policy so the same
//! populator serves both "render as ISO string" and "render as date object"
//! consumers.

use rusqlite::types::ValueRef;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::criteria::ItemTypeValue;
use crate::domain::FieldKind;
use crate::error::PopulationError;
use crate::plan::ProjectedField;
use crate::result::{Row, Value};

/// Date rendering policy selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// RFC 3339 string (`2024-01-01T00:00:00Z`).
    Iso8601,
    /// A calendar value ([`Value::Date`]).
    DateObject,
}

/// Converts one raw result row into a typed field map. Columns are read in
/// projection order; every conversion failure is a [`PopulationError`] and
/// fails the query rather than producing a corrupt row.
pub fn populate_row(
    raw: &rusqlite::Row<'_>,
    projection: &[ProjectedField],
    date_format: DateFormat,
) -> Result<Row, PopulationError> {
    let mut row = Row::new();
    for (index, projected) in projection.iter().enumerate() {
        let cell = raw
            .get_ref(index)
            .map_err(|_| mismatch(projected, "a missing column"))?;
        let value = populate_value(projected, cell, date_format)?;
        row.insert(projected.alias.clone(), value);
    }
    Ok(row)
}

fn populate_value(
    projected: &ProjectedField,
    cell: ValueRef<'_>,
    date_format: DateFormat,
) -> Result<Value, PopulationError> {
    if matches!(cell, ValueRef::Null) {
        return Ok(Value::Null);
    }
    match projected.field.kind {
        FieldKind::String => match cell {
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|s| Value::Str(s.to_owned()))
                .map_err(|_| mismatch(projected, "non-UTF-8 text")),
            other => Err(mismatch(projected, storage_class(other))),
        },
        FieldKind::Integer => match cell {
            ValueRef::Integer(n) => Ok(Value::Int(n)),
            other => Err(mismatch(projected, storage_class(other))),
        },
        FieldKind::LongInt => match cell {
            ValueRef::Integer(n) => Ok(Value::Long(n)),
            other => Err(mismatch(projected, storage_class(other))),
        },
        FieldKind::Date => match cell {
            ValueRef::Integer(millis) => populate_date(projected, millis, date_format),
            other => Err(mismatch(projected, storage_class(other))),
        },
        FieldKind::ItemType => match cell {
            ValueRef::Integer(ordinal) => match ItemTypeValue::from_ordinal(ordinal) {
                Some(item_type) => Ok(Value::ItemType(item_type)),
                None => Err(PopulationError::UnknownItemType {
                    column: projected.column().sql(),
                    ordinal,
                }),
            },
            other => Err(mismatch(projected, storage_class(other))),
        },
    }
}

fn populate_date(
    projected: &ProjectedField,
    millis: i64,
    date_format: DateFormat,
) -> Result<Value, PopulationError> {
    // Zero is the "absent" sentinel, not epoch-1970.
    if millis == 0 {
        return Ok(Value::Null);
    }
    let out_of_range = || PopulationError::DateOutOfRange {
        column: projected.column().sql(),
        millis,
    };
    let datetime = OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|_| out_of_range())?;
    match date_format {
        DateFormat::Iso8601 => datetime
            .format(&Rfc3339)
            .map(Value::Str)
            .map_err(|_| out_of_range()),
        DateFormat::DateObject => Ok(Value::Date(datetime)),
    }
}

fn mismatch(projected: &ProjectedField, found: &'static str) -> PopulationError {
    PopulationError::TypeMismatch {
        column: projected.column().sql(),
        expected: projected.field.kind.name(),
        found,
    }
}

fn storage_class(cell: ValueRef<'_>) -> &'static str {
    match cell {
        ValueRef::Null => "null",
        ValueRef::Integer(_) => "integer",
        ValueRef::Real(_) => "real",
        ValueRef::Text(_) => "text",
        ValueRef::Blob(_) => "blob",
    }
}
