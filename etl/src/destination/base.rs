use std::future::Future;

use tracing::{debug, info};

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::schema::sql::quote_string;

/// Rows returned by a warehouse statement.
///
/// Values are untyped strings, `None` is SQL `NULL`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> QueryResult {
        Self { columns, rows }
    }

    /// Position of `column`, compared case-insensitively.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|name| name.eq_ignore_ascii_case(column))
    }

    /// Value of `column` in the row at `row`.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)?.as_deref()
    }

    /// First column of the first row.
    pub fn scalar(&self) -> Option<&str> {
        self.rows.first()?.first()?.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A SQL endpoint of the analytical warehouse.
///
/// Implementations must be cheap to clone: the snapshot progress poller runs its queries on a
/// clone while the load runs on the original.
pub trait Warehouse {
    /// Returns the name of the warehouse.
    fn name() -> &'static str;

    /// Executes one statement and returns its rows.
    fn execute(&self, sql: &str) -> impl Future<Output = EtlResult<QueryResult>> + Send;
}

/// Executes `statements` in order and returns how many were applied.
///
/// The batch is not atomic. When a statement fails the error names it together with the number of
/// statements already applied; nothing is rolled back.
pub async fn apply_statements<W, S>(warehouse: &W, statements: &[S]) -> EtlResult<usize>
where
    W: Warehouse + Sync,
    S: AsRef<str>,
{
    for (applied, statement) in statements.iter().enumerate() {
        let statement = statement.as_ref();
        debug!(statement, "applying statement");

        if let Err(err) = warehouse.execute(statement).await {
            return Err(etl_error!(
                ErrorKind::DestinationQueryFailed,
                "Statement batch was partially applied",
                format!(
                    "applied {applied} of {} statements, failed statement: {statement}",
                    statements.len()
                ),
                source: err
            ));
        }
    }

    if !statements.is_empty() {
        info!(statements = statements.len(), "applied statement batch");
    }

    Ok(statements.len())
}

/// Returns the column names of `table` in the current schema, in ordinal order.
///
/// An empty list means the table does not exist.
pub async fn target_column_names<W>(warehouse: &W, table: &str) -> EtlResult<Vec<String>>
where
    W: Warehouse + Sync,
{
    let sql = format!(
        "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_SCHEMA = CURRENT_SCHEMA() AND UPPER(TABLE_NAME) = UPPER({}) \
         ORDER BY ORDINAL_POSITION",
        quote_string(table)
    );

    let result = warehouse.execute(&sql).await?;
    result
        .rows
        .iter()
        .map(|row| {
            row.first().cloned().flatten().ok_or_else(|| {
                etl_error!(
                    ErrorKind::InvalidData,
                    "Column listing returned an empty column name",
                    format!("table `{table}`")
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_result_lookups_ignore_case() {
        let result = QueryResult::new(
            vec!["file".to_owned(), "ROWS_LOADED".to_owned()],
            vec![vec![Some("a.csv".to_owned()), Some("10".to_owned())], vec![None, None]],
        );

        assert_eq!(result.get(0, "rows_loaded"), Some("10"));
        assert_eq!(result.get(1, "file"), None);
        assert_eq!(result.get(2, "file"), None);
        assert_eq!(result.get(0, "status"), None);
        assert_eq!(result.scalar(), Some("a.csv"));
    }
}
