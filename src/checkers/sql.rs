use serde_json::{Map, Number, Value};
use sqlx::any::{AnyRow, install_default_drivers};
use sqlx::{AnyConnection, Column, Connection, Row};
use tokio::time::timeout;
use tracing::debug;

use super::{ProbeError, effective_timeout};
use crate::models::{DataRow, ResponseExpectation, ServiceNode};

/// MySQL and PostgreSQL probes through the `sqlx` Any driver.
#[derive(Debug, Clone, Copy)]
pub struct SqlChecker;

impl Default for SqlChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    MySql,
    Postgres,
}

impl Flavor {
    fn from_protocol(protocol: &str) -> Option<Self> {
        match protocol.to_ascii_lowercase().as_str() {
            "mysql" => Some(Flavor::MySql),
            "postgresql" | "postgres" => Some(Flavor::Postgres),
            _ => None,
        }
    }

    fn scheme(self) -> &'static str {
        match self {
            Flavor::MySql => "mysql",
            Flavor::Postgres => "postgres",
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Flavor::MySql => 3306,
            Flavor::Postgres => 5432,
        }
    }

    fn default_user(self) -> &'static str {
        match self {
            Flavor::MySql => "root",
            Flavor::Postgres => "postgres",
        }
    }

    fn default_database(self) -> &'static str {
        match self {
            Flavor::MySql => "mysql",
            Flavor::Postgres => "postgres",
        }
    }
}

impl SqlChecker {
    pub fn new() -> Self {
        install_default_drivers();
        SqlChecker
    }

    pub(crate) async fn probe(&self, node: &ServiceNode) -> Result<(), ProbeError> {
        let flavor = Flavor::from_protocol(&node.protocol).ok_or_else(|| {
            ProbeError::Mismatch(format!("Unsupported SQL protocol: {}", node.protocol))
        })?;
        let url = connection_url(node, flavor);
        timeout(effective_timeout(node), connect_and_query(node, &url))
            .await
            .map_err(|_| ProbeError::ConnectTimeout)?
    }
}

async fn connect_and_query(node: &ServiceNode, url: &str) -> Result<(), ProbeError> {
    let mut conn = AnyConnection::connect(url).await?;
    let result = match node.query.as_deref().filter(|q| !q.trim().is_empty()) {
        Some(query) => match sqlx::query(query).fetch_all(&mut conn).await {
            Ok(rows) => {
                let columns = rows.first().map_or(0, |r| r.columns().len());
                let data: Vec<DataRow> = rows.iter().map(row_to_data).collect();
                verify_result(&data, columns, node.response.as_ref())
            }
            Err(e) => Err(e.into()),
        },
        None => Ok(()),
    };
    if let Err(e) = conn.close().await {
        debug!(service = %node.id, error = %e, "Failed to close SQL connection cleanly");
    }
    result
}

/// `<scheme>://<user>:<password>@<host>:<port>/<database>` with credentials
/// percent-encoded.
fn connection_url(node: &ServiceNode, flavor: Flavor) -> String {
    let user = node
        .username
        .as_deref()
        .filter(|u| !u.is_empty())
        .unwrap_or(flavor.default_user());
    let password = node.password.as_deref().unwrap_or("");
    let database = node
        .database
        .as_deref()
        .filter(|d| !d.is_empty())
        .unwrap_or(flavor.default_database());
    let port = if node.port == 0 {
        flavor.default_port()
    } else {
        node.port
    };
    format!(
        "{}://{}:{}@{}:{}/{}",
        flavor.scheme(),
        urlencoding::encode(user),
        urlencoding::encode(password),
        node.host,
        port,
        urlencoding::encode(database)
    )
}

fn row_to_data(row: &AnyRow) -> DataRow {
    let mut data = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        data.insert(column.name().to_string(), column_value(row, i));
    }
    data
}

fn column_value(row: &AnyRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.and_then(Number::from_f64).map_or(Value::Null, Value::Number);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map_or(Value::Null, Value::String);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map_or(Value::Null, Value::Bool);
    }
    Value::Null
}

/// Checks row count, column count and row data against the expectation.
pub fn verify_result(
    data: &[DataRow],
    columns: usize,
    expect: Option<&ResponseExpectation>,
) -> Result<(), ProbeError> {
    let Some(expect) = expect else {
        return Ok(());
    };
    if let Some(rows) = expect.rows {
        if rows != data.len() as i64 {
            return Err(ProbeError::Mismatch(format!(
                "Expected {rows} rows, got {}",
                data.len()
            )));
        }
    }
    if let Some(expected_columns) = expect.columns {
        if expected_columns != columns as i64 {
            return Err(ProbeError::Mismatch(format!(
                "Expected {expected_columns} columns, got {columns}"
            )));
        }
    }
    if let Some(expected) = &expect.data {
        if !matches_data(data, expected) {
            return Err(ProbeError::Mismatch(
                "Result data does not match expected rows".to_string(),
            ));
        }
    }
    Ok(())
}

/// Rows are compared by position; every expected key must be present in the
/// actual row with a loosely equal value. Extra actual columns are fine.
pub fn matches_data(actual: &[DataRow], expected: &[DataRow]) -> bool {
    actual.len() == expected.len()
        && actual.iter().zip(expected).all(|(row, wanted)| {
            wanted
                .iter()
                .all(|(key, value)| row.get(key).is_some_and(|got| loosely_equal(got, value)))
        })
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => text_form(a) == text_form(b),
    }
}

fn text_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
