use crate::catalog::is_plain_identifier;
use crate::config::TableEntry;
use crate::error::{ExportError, Result};

/// A catalog table together with its non-key columns in native order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumns {
    pub entry: TableEntry,
    pub columns: Vec<String>,
}

/// The composed statement for the joined dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinQuery {
    select: String,
    sql: String,
}

impl JoinQuery {
    pub fn select_clause(&self) -> &str {
        &self.select
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// Compose the statement that inner-joins every table in `others` onto `anchor`
/// by equality on `join_key`.
///
/// The anchor contributes its whole row; each other table contributes its
/// non-key columns in the order given. A table with no columns still joins so
/// that it keeps filtering rows.
pub fn build_join_query(
    join_key: &str,
    anchor: &TableEntry,
    others: &[TableColumns],
) -> Result<JoinQuery> {
    check_identifier("join key", join_key)?;
    check_table(anchor)?;
    for table in others {
        check_table(&table.entry)?;
    }

    let mut parts = vec![format!("{}.*", anchor.alias)];
    for table in others {
        parts.extend(
            table
                .columns
                .iter()
                .map(|column| format!("{}.{}", table.entry.alias, quote_column(column))),
        );
    }
    let select = parts.join(", ");

    let mut sql = format!("SELECT {select}\nFROM {} {}\n", anchor.physical, anchor.alias);
    for table in others {
        let alias = &table.entry.alias;
        sql.push_str(&format!(
            "INNER JOIN {} {alias} ON {}.{join_key} = {alias}.{join_key}\n",
            table.entry.physical, anchor.alias
        ));
    }
    sql.push_str(&format!("ORDER BY {}.{join_key}", anchor.alias));

    Ok(JoinQuery { select, sql })
}

/// Column names come from live schema, so anything beyond a plain identifier
/// is back-tick quoted.
pub fn quote_column(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

fn check_table(entry: &TableEntry) -> Result<()> {
    check_identifier("table", &entry.physical)?;
    check_identifier("alias", &entry.alias)
}

fn check_identifier(what: &str, value: &str) -> Result<()> {
    if is_plain_identifier(value) {
        Ok(())
    } else {
        Err(ExportError::Config(format!("{what} '{value}' is not a plain identifier")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_column_names_are_quoted() {
        assert_eq!(quote_column("close"), "close");
        assert_eq!(quote_column("rsi 14"), "`rsi 14`");
        assert_eq!(quote_column("a`b"), "`a``b`");
    }
}
