use sqlx::{MySqlPool, Row};
use tracing::debug;

use crate::error::TidbError;
use crate::types::{ColumnDescriptor, TableName};

/// Returns the current TSO of the cluster.
///
/// The TSO is the consistency point that separates the snapshot from the change stream.
pub async fn current_consistency_point(pool: &MySqlPool) -> Result<u64, TidbError> {
    let raw: String = sqlx::query_scalar("SELECT CAST(@@tidb_current_ts AS CHAR)")
        .fetch_one(pool)
        .await?;

    parse_consistency_point(&raw)
}

fn parse_consistency_point(raw: &str) -> Result<u64, TidbError> {
    match raw.trim().parse::<u64>() {
        Ok(point) if point > 0 => Ok(point),
        _ => Err(TidbError::InvalidConsistencyPoint(raw.to_owned())),
    }
}

/// Reads the columns of `table` as they were at `consistency_point`.
///
/// The query runs on a single connection with `tidb_snapshot` set, so the column set matches
/// the data captured by a snapshot taken at the same point.
pub async fn table_columns_at(
    pool: &MySqlPool,
    table: &TableName,
    consistency_point: u64,
) -> Result<Vec<ColumnDescriptor>, TidbError> {
    let mut connection = pool.acquire().await?;

    sqlx::query("SET SESSION tidb_snapshot = ?")
        .bind(consistency_point.to_string())
        .execute(&mut *connection)
        .await?;

    let rows = sqlx::query(
        r#"
        SELECT
            CAST(COLUMN_NAME AS CHAR) AS column_name,
            CAST(DATA_TYPE AS CHAR) AS data_type,
            CAST(COLUMN_TYPE AS CHAR) AS column_type,
            CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS char_length,
            CAST(NUMERIC_PRECISION AS SIGNED) AS numeric_precision,
            CAST(NUMERIC_SCALE AS SIGNED) AS numeric_scale,
            CAST(DATETIME_PRECISION AS SIGNED) AS datetime_precision,
            CAST(IS_NULLABLE AS CHAR) AS is_nullable,
            CAST(COLUMN_DEFAULT AS CHAR) AS column_default,
            CAST(COLUMN_KEY AS CHAR) AS column_key
        FROM information_schema.columns
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
        "#,
    )
    .bind(&table.schema)
    .bind(&table.name)
    .fetch_all(&mut *connection)
    .await;

    // The session goes back to the pool, so the snapshot is cleared even if the query failed.
    sqlx::query("SET SESSION tidb_snapshot = ''")
        .execute(&mut *connection)
        .await?;

    let mut columns = Vec::new();
    for row in rows? {
        let data_type: String = row.try_get("data_type")?;
        let column_type: String = row.try_get("column_type")?;
        let data_type = if column_type.to_lowercase().contains("unsigned") {
            format!("{data_type} unsigned")
        } else {
            data_type
        };

        let mut column = ColumnDescriptor::new(
            row.try_get::<String, _>("column_name")?,
            data_type,
            row.try_get::<String, _>("is_nullable")?.eq_ignore_ascii_case("YES"),
            row.try_get::<Option<String>, _>("column_key")?.as_deref() == Some("PRI"),
        );
        column.precision = column_precision(
            &column.data_type,
            row.try_get("char_length")?,
            row.try_get("numeric_precision")?,
            row.try_get("datetime_precision")?,
        );
        column.scale = if is_decimal(&column.data_type) {
            to_u32(row.try_get("numeric_scale")?)
        } else {
            None
        };
        column.default = row.try_get("column_default")?;

        columns.push(column);
    }

    if columns.is_empty() {
        return Err(TidbError::TableNotFound(table.clone()));
    }

    debug!(table = %table, columns = columns.len(), consistency_point, "read source columns");

    Ok(columns)
}

fn is_decimal(data_type: &str) -> bool {
    data_type.starts_with("decimal") || data_type.starts_with("numeric")
}

/// Picks the precision in the same way the change-capture service reports it.
fn column_precision(
    data_type: &str,
    char_length: Option<i64>,
    numeric_precision: Option<i64>,
    datetime_precision: Option<i64>,
) -> Option<u32> {
    let base = data_type.split_whitespace().next().unwrap_or_default();
    match base {
        "decimal" | "numeric" => to_u32(numeric_precision),
        "datetime" | "timestamp" | "time" => to_u32(datetime_precision).filter(|fsp| *fsp > 0),
        "char" | "varchar" | "binary" | "varbinary" | "bit" => to_u32(char_length),
        _ => None,
    }
}

fn to_u32(value: Option<i64>) -> Option<u32> {
    value.and_then(|value| u32::try_from(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_point_must_be_a_positive_integer() {
        assert_eq!(parse_consistency_point("443669148978511873").unwrap(), 443669148978511873);
        assert!(parse_consistency_point("0").is_err());
        assert!(parse_consistency_point("abc").is_err());
    }

    #[test]
    fn precision_follows_the_type_family() {
        assert_eq!(column_precision("varchar", Some(255), None, None), Some(255));
        assert_eq!(column_precision("decimal", None, Some(10), None), Some(10));
        assert_eq!(column_precision("datetime", None, None, Some(3)), Some(3));
        assert_eq!(column_precision("datetime", None, None, Some(0)), None);
        assert_eq!(column_precision("int unsigned", None, Some(10), None), None);
    }
}
