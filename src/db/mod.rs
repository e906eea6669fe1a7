// mcp-bridge -- db
//! Relational read path: generic row reads and schema introspection over a
//! MySQL pool. Rows come back as JSON objects so callers can marshal them
//! into whatever shape they need.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use utoipa::ToSchema;

/// One row keyed by column name.
pub type JsonRow = Map<String, Value>;

/// Rows returned by [`SqlStore::query_rows`].
pub const ROW_LIMIT: u32 = 100;

/// One column as reported by `DESCRIBE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ColumnDescriptor {
    #[serde(rename = "Field")]
    pub field: String,
    #[serde(rename = "Type")]
    pub column_type: String,
    #[serde(rename = "Null")]
    pub null: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Default")]
    pub default: Option<String>,
    #[serde(rename = "Extra")]
    pub extra: String,
}

#[derive(Clone)]
pub struct SqlStore {
    pool: MySqlPool,
}

impl SqlStore {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = MySqlPoolOptions::new()
            .max_connections(25)
            .acquire_timeout(Duration::from_secs(5))
            .max_lifetime(Duration::from_secs(300))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }

    /// First [`ROW_LIMIT`] rows of `table`.
    pub async fn query_rows(&self, table: &str) -> Result<Vec<JsonRow>, sqlx::Error> {
        let sql = format!("SELECT * FROM {} LIMIT {}", quote_identifier(table), ROW_LIMIT);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    pub async fn query_row_by_id(&self, table: &str, id: i64) -> Result<Option<JsonRow>, sqlx::Error> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", quote_identifier(table));
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_json))
    }

    pub async fn row_count(&self, table: &str) -> Result<i64, sqlx::Error> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        sqlx::query_scalar::<_, i64>(&sql).fetch_one(&self.pool).await
    }

    /// Column descriptors of `table` in the current database, in table order.
    /// Empty when the table does not exist.
    pub async fn describe_schema(&self, table: &str) -> Result<Vec<ColumnDescriptor>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_KEY, COLUMN_DEFAULT, EXTRA \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
             ORDER BY ORDINAL_POSITION",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ColumnDescriptor, sqlx::Error> {
                Ok(ColumnDescriptor {
                    field: text_column(row, 0)?.unwrap_or_default(),
                    column_type: text_column(row, 1)?.unwrap_or_default(),
                    null: text_column(row, 2)?.unwrap_or_default(),
                    key: text_column(row, 3)?.unwrap_or_default(),
                    default: text_column(row, 4)?,
                    extra: text_column(row, 5)?.unwrap_or_default(),
                })
            })
            .collect()
    }
}

/// information_schema reports some columns as binary strings depending on
/// the server version; decode without the strict type check.
fn text_column(row: &MySqlRow, idx: usize) -> Result<Option<String>, sqlx::Error> {
    row.try_get_unchecked::<Option<String>, _>(idx)
}

/// Quote a table name with backticks, doubling any embedded backtick.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

// ── Row marshaling ──────────────────────────────────────────────────────────

pub fn row_to_json(row: &MySqlRow) -> JsonRow {
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), column_value(row, col.ordinal())))
        .collect()
}

fn column_value(row: &MySqlRow, idx: usize) -> Value {
    let type_name = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_ascii_uppercase(),
        Err(_) => return Value::Null,
    };

    match type_name.as_str() {
        "BOOLEAN" => decoded::<bool>(row, idx, Value::Bool),
        t if t.contains("UNSIGNED") => decoded::<u64>(row, idx, Value::from),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            decoded::<i64>(row, idx, Value::from)
        }
        "FLOAT" => decoded::<f32>(row, idx, |v| float_json(f64::from(v))),
        "DOUBLE" => decoded::<f64>(row, idx, float_json),
        "DECIMAL" => decoded::<String>(row, idx, |s| decimal_json(&s)),
        "DATETIME" | "TIMESTAMP" => decoded::<chrono::NaiveDateTime>(row, idx, |v| {
            Value::String(v.format("%Y-%m-%d %H:%M:%S").to_string())
        }),
        "DATE" => decoded::<chrono::NaiveDate>(row, idx, |v| Value::String(v.to_string())),
        "TIME" => decoded::<chrono::NaiveTime>(row, idx, |v| Value::String(v.to_string())),
        "JSON" => decoded::<String>(row, idx, |s| {
            serde_json::from_str(&s).unwrap_or(Value::String(s))
        }),
        _ => match row.try_get_unchecked::<String, _>(idx) {
            Ok(s) => Value::String(s),
            Err(_) => decoded::<Vec<u8>>(row, idx, |b| {
                Value::String(String::from_utf8_lossy(&b).into_owned())
            }),
        },
    }
}

fn decoded<'r, T>(row: &'r MySqlRow, idx: usize, to_json: impl FnOnce(T) -> Value) -> Value
where
    T: sqlx::Decode<'r, sqlx::MySql>,
{
    match row.try_get_unchecked::<T, _>(idx) {
        Ok(v) => to_json(v),
        Err(e) => {
            tracing::debug!("db: column {} not decodable: {}", idx, e);
            Value::Null
        }
    }
}

fn float_json(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

/// DECIMAL arrives as text; expose it as a JSON number when it fits.
pub fn decimal_json(text: &str) -> Value {
    let trimmed = text.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => float_json(f),
        _ => Value::String(text.to_string()),
    }
}
