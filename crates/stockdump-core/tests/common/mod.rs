#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use polars::prelude::*;
use stockdump_core::catalog::Catalog;
use stockdump_core::query::{build_join_query, TableColumns};
use stockdump_core::source::{SourceError, TableSource};

/// In-memory stand-in for the database: known table schemas plus canned
/// results keyed by statement text.
#[derive(Default)]
pub struct MemorySource {
    pub schemas: HashMap<String, Vec<String>>,
    pub results: HashMap<String, DataFrame>,
    pub fail_statements_containing: Option<String>,
    pub probe_fails: bool,
    pub close_fails: bool,
    pub closes: Arc<AtomicUsize>,
    pub executed: Vec<String>,
}

impl MemorySource {
    pub fn close_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }
}

fn failure(message: &str) -> SourceError {
    SourceError::Database(sqlx::Error::Protocol(message.to_string()))
}

#[async_trait]
impl TableSource for MemorySource {
    async fn probe(&mut self) -> Result<(), SourceError> {
        if self.probe_fails {
            return Err(failure("server has gone away"));
        }
        Ok(())
    }

    async fn table_columns(&mut self, table: &str) -> Result<Vec<String>, SourceError> {
        Ok(self.schemas.get(table).cloned().unwrap_or_default())
    }

    async fn fetch(&mut self, sql: &str) -> Result<DataFrame, SourceError> {
        self.executed.push(sql.to_string());
        if let Some(needle) = &self.fail_statements_containing {
            if sql.contains(needle.as_str()) {
                return Err(failure("lock wait timeout exceeded"));
            }
        }
        self.results
            .get(sql)
            .cloned()
            .ok_or_else(|| failure(&format!("unexpected statement: {sql}")))
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.close_fails {
            return Err(failure("close failed"));
        }
        Ok(())
    }
}

pub fn timestamps(name: &str, values: &[&str]) -> Column {
    let micros: Vec<i64> = values
        .iter()
        .map(|value| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .expect("fixture timestamp")
                .and_utc()
                .timestamp_micros()
        })
        .collect();
    Series::new(name.into(), micros)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
        .expect("cast to datetime")
        .into()
}

pub fn floats(name: &str, values: &[f64]) -> Column {
    Series::new(name.into(), values.to_vec()).into()
}

const T1: &str = "2024-01-02 09:30:00";
const T2: &str = "2024-01-02 09:31:00";
const T3: &str = "2024-01-02 09:32:00";

/// A source holding the five market tables. The oscillator table is missing
/// the third timestamp, so the join keeps two of three rows.
pub fn market_source() -> MemorySource {
    let catalog = Catalog::default();
    let mut source = MemorySource::default();

    let schema = |columns: &[&str]| columns.iter().map(|c| c.to_string()).collect::<Vec<_>>();
    source.schemas.insert("datetime_dimension".into(), schema(&["datetime", "day_of_week"]));
    source.schemas.insert("price_ohlc".into(), schema(&["datetime", "open", "close"]));
    source.schemas.insert("volume_metrics".into(), schema(&["x", "datetime"]));
    source.schemas.insert("moving_averages".into(), schema(&["datetime", "y"]));
    source.schemas.insert("oscillators".into(), schema(&["datetime", "z"]));

    let all = [T1, T2, T3];
    let tables = [
        (
            "datetime_dimension",
            DataFrame::new(vec![
                timestamps("datetime", &all),
                Series::new("day_of_week".into(), vec!["Tue", "Tue", "Tue"]).into(),
            ]),
        ),
        (
            "price_ohlc",
            DataFrame::new(vec![
                timestamps("datetime", &all),
                floats("open", &[101.25, 101.5, 101.75]),
                floats("close", &[101.5, 101.75, 102.0]),
            ]),
        ),
        (
            "volume_metrics",
            DataFrame::new(vec![
                Series::new("x".into(), vec![Some(1200i64), None, Some(900)]).into(),
                timestamps("datetime", &all),
            ]),
        ),
        (
            "moving_averages",
            DataFrame::new(vec![timestamps("datetime", &all), floats("y", &[100.0, 100.5, 101.0])]),
        ),
        (
            "oscillators",
            DataFrame::new(vec![timestamps("datetime", &[T1, T2]), floats("z", &[55.5, 61.0])]),
        ),
    ];
    for (table, frame) in tables {
        source
            .results
            .insert(format!("SELECT * FROM {table}"), frame.expect("fixture frame"));
    }

    let described: Vec<TableColumns> = catalog
        .joined_tables()
        .iter()
        .map(|entry| TableColumns {
            entry: entry.clone(),
            columns: source.schemas[&entry.physical]
                .iter()
                .filter(|column| column.as_str() != "datetime")
                .cloned()
                .collect(),
        })
        .collect();
    let query = build_join_query("datetime", catalog.anchor(), &described).expect("join query");

    let joined = DataFrame::new(vec![
        timestamps("datetime", &[T1, T2]),
        Series::new("day_of_week".into(), vec!["Tue", "Tue"]).into(),
        floats("open", &[101.25, 101.5]),
        floats("close", &[101.5, 101.75]),
        Series::new("x".into(), vec![Some(1200i64), None]).into(),
        floats("y", &[100.0, 100.5]),
        floats("z", &[55.5, 61.0]),
    ])
    .expect("joined fixture");
    source.results.insert(query.sql().to_string(), joined);

    source
}
