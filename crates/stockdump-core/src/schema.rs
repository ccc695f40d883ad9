use tracing::debug;

use crate::catalog::Catalog;
use crate::error::{ExportError, Result};
use crate::query::TableColumns;
use crate::source::TableSource;

/// Columns of `table` in native order, minus `join_key`.
///
/// Fails when the table is missing or does not carry the join key at all.
pub async fn columns_of<S>(source: &mut S, table: &str, join_key: &str) -> Result<Vec<String>>
where
    S: TableSource + ?Sized,
{
    let columns = source
        .table_columns(table)
        .await
        .map_err(|err| ExportError::Schema {
            table: table.to_string(),
            message: err.to_string(),
        })?;

    if columns.is_empty() {
        return Err(ExportError::Schema {
            table: table.to_string(),
            message: "table does not exist".into(),
        });
    }
    if !columns.iter().any(|column| column == join_key) {
        return Err(ExportError::Schema {
            table: table.to_string(),
            message: format!("missing join column '{join_key}'"),
        });
    }

    let columns: Vec<String> = columns.into_iter().filter(|column| column != join_key).collect();
    debug!(table, columns = columns.len(), "Introspected table");
    Ok(columns)
}

/// Introspect every table the join touches. The anchor is checked for
/// existence and the join key; only the other tables' columns are returned.
pub async fn describe_join<S>(source: &mut S, catalog: &Catalog) -> Result<Vec<TableColumns>>
where
    S: TableSource + ?Sized,
{
    let join_key = catalog.join_key();
    columns_of(source, &catalog.anchor().physical, join_key).await?;

    let mut described = Vec::with_capacity(catalog.joined_tables().len());
    for entry in catalog.joined_tables() {
        let columns = columns_of(source, &entry.physical, join_key).await?;
        described.push(TableColumns {
            entry: entry.clone(),
            columns,
        });
    }
    Ok(described)
}
