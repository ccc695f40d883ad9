//! Decoding MySQL result sets into polars frames.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::{Column, DataFrame, DataType, NamedFrom, Series, TimeUnit};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlColumn, MySqlRow};
use sqlx::{Column as _, Decode, MySql, Row, Type, TypeInfo};
use tracing::warn;

use crate::source::SourceError;

const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// How a database column maps onto a frame column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    UnsignedInt,
    Bool,
    Float,
    Double,
    Decimal,
    Timestamp,
    Date,
    Text,
}

impl ColumnKind {
    pub fn from_type_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        let kind = match upper.as_str() {
            "BOOLEAN" => ColumnKind::Bool,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => ColumnKind::Int,
            "FLOAT" => ColumnKind::Float,
            "DOUBLE" => ColumnKind::Double,
            "DECIMAL" => ColumnKind::Decimal,
            "DATETIME" | "TIMESTAMP" => ColumnKind::Timestamp,
            "DATE" => ColumnKind::Date,
            "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
                ColumnKind::Text
            }
            other if other.ends_with("INT UNSIGNED") => ColumnKind::UnsignedInt,
            _ => return None,
        };
        Some(kind)
    }

    fn buffer(self, capacity: usize) -> ColumnBuffer {
        match self {
            ColumnKind::Int | ColumnKind::UnsignedInt | ColumnKind::Bool => {
                ColumnBuffer::Int(Vec::with_capacity(capacity))
            }
            ColumnKind::Float | ColumnKind::Double | ColumnKind::Decimal => {
                ColumnBuffer::Float(Vec::with_capacity(capacity))
            }
            ColumnKind::Timestamp => ColumnBuffer::Timestamp(Vec::with_capacity(capacity)),
            ColumnKind::Date => ColumnBuffer::Date(Vec::with_capacity(capacity)),
            ColumnKind::Text => ColumnBuffer::Text(Vec::with_capacity(capacity)),
        }
    }
}

/// Column values collected row by row before conversion into a series.
#[derive(Debug)]
pub(crate) enum ColumnBuffer {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    /// Microseconds since the epoch.
    Timestamp(Vec<Option<i64>>),
    /// Days since the epoch.
    Date(Vec<Option<i32>>),
    Text(Vec<Option<String>>),
}

impl ColumnBuffer {
    pub(crate) fn into_column(self, name: &str) -> Result<Column, SourceError> {
        let series = match self {
            ColumnBuffer::Int(values) => Series::new(name.into(), values),
            ColumnBuffer::Float(values) => Series::new(name.into(), values),
            ColumnBuffer::Timestamp(values) => Series::new(name.into(), values)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?,
            ColumnBuffer::Date(values) => Series::new(name.into(), values).cast(&DataType::Date)?,
            ColumnBuffer::Text(values) => Series::new(name.into(), values),
        };
        Ok(series.into())
    }
}

/// Build a frame from a statement's column metadata and its fetched rows.
///
/// Column order follows the statement, so an empty result still yields the
/// full header.
pub fn rows_to_frame(columns: &[MySqlColumn], rows: &[MySqlRow]) -> Result<DataFrame, SourceError> {
    let names = unique_names(columns.iter().map(|column| column.name()));

    let mut kinds = Vec::with_capacity(columns.len());
    for (column, name) in columns.iter().zip(&names) {
        let type_name = column.type_info().name();
        let kind = ColumnKind::from_type_name(type_name).ok_or_else(|| SourceError::Decode {
            column: name.clone(),
            message: format!("unsupported column type {type_name}"),
        })?;
        kinds.push(kind);
    }

    let mut buffers: Vec<ColumnBuffer> = kinds.iter().map(|kind| kind.buffer(rows.len())).collect();

    for row in rows {
        for (index, (kind, buffer)) in kinds.iter().zip(buffers.iter_mut()).enumerate() {
            push_value(*kind, buffer, row, index, &names[index])?;
        }
    }

    let frame_columns = buffers
        .into_iter()
        .zip(&names)
        .map(|(buffer, name)| buffer.into_column(name))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DataFrame::new(frame_columns)?)
}

fn push_value(
    kind: ColumnKind,
    buffer: &mut ColumnBuffer,
    row: &MySqlRow,
    index: usize,
    name: &str,
) -> Result<(), SourceError> {
    match (kind, buffer) {
        (ColumnKind::Int, ColumnBuffer::Int(values)) => values.push(get::<i64>(row, index, name)?),
        (ColumnKind::Bool, ColumnBuffer::Int(values)) => {
            values.push(get::<bool>(row, index, name)?.map(i64::from))
        }
        (ColumnKind::UnsignedInt, ColumnBuffer::Int(values)) => {
            let value = match get::<u64>(row, index, name)? {
                Some(raw) => Some(i64::try_from(raw).map_err(|_| SourceError::Decode {
                    column: name.to_string(),
                    message: format!("unsigned value {raw} exceeds the signed 64-bit range"),
                })?),
                None => None,
            };
            values.push(value);
        }
        (ColumnKind::Float, ColumnBuffer::Float(values)) => {
            values.push(get::<f32>(row, index, name)?.map(widen_f32))
        }
        (ColumnKind::Double, ColumnBuffer::Float(values)) => values.push(get::<f64>(row, index, name)?),
        (ColumnKind::Decimal, ColumnBuffer::Float(values)) => {
            values.push(get::<Decimal>(row, index, name)?.and_then(|value| value.to_f64()))
        }
        (ColumnKind::Timestamp, ColumnBuffer::Timestamp(values)) => values.push(
            get::<NaiveDateTime>(row, index, name)?.map(|value| value.and_utc().timestamp_micros()),
        ),
        (ColumnKind::Date, ColumnBuffer::Date(values)) => values.push(
            get::<NaiveDate>(row, index, name)?
                .map(|value| value.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE),
        ),
        (ColumnKind::Text, ColumnBuffer::Text(values)) => values.push(get::<String>(row, index, name)?),
        (kind, _) => {
            return Err(SourceError::Decode {
                column: name.to_string(),
                message: format!("buffer does not match column kind {kind:?}"),
            })
        }
    }
    Ok(())
}

/// Widen through the shortest decimal form so `101.1f32` stays `101.1`
/// instead of picking up binary-expansion digits.
pub(crate) fn widen_f32(value: f32) -> f64 {
    value.to_string().parse().unwrap_or(f64::from(value))
}

fn get<'r, T>(row: &'r MySqlRow, index: usize, name: &str) -> Result<Option<T>, SourceError>
where
    T: Decode<'r, MySql> + Type<MySql>,
{
    row.try_get::<Option<T>, _>(index).map_err(|err| SourceError::Decode {
        column: name.to_string(),
        message: err.to_string(),
    })
}

/// Frames need unique column names; repeated names get a numeric suffix.
pub fn unique_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let names: Vec<&str> = names.into_iter().collect();
    let mut taken: HashSet<String> = HashSet::with_capacity(names.len());
    let mut unique = Vec::with_capacity(names.len());

    for name in names {
        let mut candidate = name.to_string();
        let mut suffix = 2;
        while taken.contains(&candidate) {
            candidate = format!("{name}_{suffix}");
            suffix += 1;
        }
        if candidate != name {
            warn!(column = name, renamed = %candidate, "Duplicate result column renamed");
        }
        taken.insert(candidate.clone());
        unique.push(candidate);
    }
    unique
}
