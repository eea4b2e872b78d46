use std::path::PathBuf;

use async_trait::async_trait;
use dbadmin_core::connection_manager::{BackendError, ConnectionBackend};
use dbadmin_core::profiles::{ConnectionProfile, PasswordSource, TlsMode, PASSWORD_ENV};
use dbadmin_core::schema::{ColumnKey, ColumnSchema, FieldValue, Row, TableSchema};
use dbadmin_core::session::{Mutation, TableBackend};
use dbadmin_core::sql_generator::{
    select_all_sql, show_columns_sql, show_tables_sql, SqlGenerationError,
};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, Params, SslOpts, Value};

#[derive(Debug, Clone, Default)]
pub struct MysqlConnectionBackend;

#[async_trait]
impl ConnectionBackend for MysqlConnectionBackend {
    type Connection = MysqlConnection;

    async fn connect(&self, profile: &ConnectionProfile) -> Result<Self::Connection, BackendError> {
        let conn = Conn::new(opts_from_profile(profile))
            .await
            .map_err(to_backend_error)?;
        Ok(MysqlConnection { conn })
    }

    async fn ping(&self, connection: &mut Self::Connection) -> Result<(), BackendError> {
        connection.conn.ping().await.map_err(to_backend_error)
    }

    async fn disconnect(&self, connection: Self::Connection) -> Result<(), BackendError> {
        connection
            .conn
            .disconnect()
            .await
            .map_err(to_backend_error)
    }
}

/// The one live MySQL connection. Every statement auto-commits.
#[derive(Debug)]
pub struct MysqlConnection {
    conn: Conn,
}

#[async_trait]
impl TableBackend for MysqlConnection {
    async fn list_tables(&mut self) -> Result<Vec<String>, BackendError> {
        self.conn
            .query_map(show_tables_sql(), |table: String| table)
            .await
            .map_err(to_backend_error)
    }

    async fn describe_table(&mut self, table: &str) -> Result<TableSchema, BackendError> {
        let sql = show_columns_sql(table).map_err(to_generation_error)?;
        let columns = self
            .conn
            .query_map(
                sql,
                |(name, data_type, nullable, key, default_value, extra): (
                    String,
                    String,
                    String,
                    String,
                    Option<String>,
                    String,
                )| ColumnSchema {
                    name,
                    data_type,
                    nullable: nullable.eq_ignore_ascii_case("YES"),
                    key: ColumnKey::from_show_columns(&key),
                    default_value,
                    extra,
                },
            )
            .await
            .map_err(to_backend_error)?;

        Ok(TableSchema::new(table, columns))
    }

    async fn fetch_rows(&mut self, table: &str) -> Result<Vec<Row>, BackendError> {
        let sql = select_all_sql(table).map_err(to_generation_error)?;
        let rows: Vec<mysql_async::Row> = self.conn.query(sql).await.map_err(to_backend_error)?;
        tracing::debug!(table, rows = rows.len(), "fetched rows");
        Ok(rows.into_iter().map(row_from_mysql).collect())
    }

    async fn execute(&mut self, mutation: &Mutation) -> Result<u64, BackendError> {
        let params = mutation
            .statement
            .params
            .iter()
            .map(field_to_mysql_value)
            .collect::<Vec<_>>();
        tracing::debug!(sql = %mutation.statement.sql, params = params.len(), "executing");

        self.conn
            .exec_drop(mutation.statement.sql.as_str(), Params::Positional(params))
            .await
            .map_err(to_backend_error)?;
        Ok(self.conn.affected_rows())
    }
}

fn opts_from_profile(profile: &ConnectionProfile) -> OptsBuilder {
    let mut builder = OptsBuilder::default()
        .ip_or_hostname(profile.host.clone())
        .tcp_port(profile.port)
        .user(Some(profile.user.clone()));

    if let Some(password) = resolve_password(profile) {
        builder = builder.pass(Some(password));
    }

    if let Some(database) = non_empty(profile.database.as_deref()) {
        builder = builder.db_name(Some(database.to_string()));
    }

    if let Some(ssl_opts) = ssl_opts_from_profile(profile) {
        builder = builder.ssl_opts(ssl_opts);
    }

    builder
}

fn resolve_password(profile: &ConnectionProfile) -> Option<String> {
    let env_password = std::env::var(PASSWORD_ENV).ok().filter(|pw| !pw.is_empty());

    match profile.password_source {
        PasswordSource::EnvVar => env_password,
        PasswordSource::Keyring => {
            if let Some(password) = load_keyring_password(profile) {
                return Some(password);
            }

            let password = env_password?;
            store_keyring_password(profile, &password);
            Some(password)
        }
    }
}

fn ssl_opts_from_profile(profile: &ConnectionProfile) -> Option<SslOpts> {
    let ca_cert_path = non_empty(profile.tls_ca_cert_path.as_deref());
    let wants_tls = match profile.tls_mode {
        TlsMode::Disabled => false,
        TlsMode::Prefer => ca_cert_path.is_some(),
        TlsMode::Require => true,
    };
    if !wants_tls {
        return None;
    }

    let mut ssl_opts = SslOpts::default();
    if let Some(path) = ca_cert_path {
        ssl_opts = ssl_opts.with_root_certs(vec![PathBuf::from(path).into()]);
    }
    Some(ssl_opts)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn load_keyring_password(profile: &ConnectionProfile) -> Option<String> {
    keyring_entry(profile)?
        .get_password()
        .ok()
        .filter(|pw| !pw.is_empty())
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn load_keyring_password(_profile: &ConnectionProfile) -> Option<String> {
    None
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn store_keyring_password(profile: &ConnectionProfile, password: &str) {
    if let Some(entry) = keyring_entry(profile) {
        if let Err(error) = entry.set_password(password) {
            tracing::warn!(profile = %profile.name, %error, "could not store password in keyring");
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn store_keyring_password(_profile: &ConnectionProfile, _password: &str) {}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn keyring_entry(profile: &ConnectionProfile) -> Option<keyring::Entry> {
    let service = non_empty(profile.keyring_service.as_deref()).unwrap_or("dbadmin");
    let account = non_empty(profile.keyring_account.as_deref()).unwrap_or(profile.name.as_str());
    keyring::Entry::new(service, account).ok()
}

fn row_from_mysql(row: mysql_async::Row) -> Row {
    Row::new(row.unwrap().into_iter().map(mysql_value_to_field).collect())
}

fn mysql_value_to_field(value: Value) -> FieldValue {
    match value {
        Value::NULL => FieldValue::Null,
        Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => FieldValue::Text(text),
            Err(error) => FieldValue::Bytes(error.into_bytes()),
        },
        Value::Int(value) => FieldValue::Text(value.to_string()),
        Value::UInt(value) => FieldValue::Text(value.to_string()),
        Value::Float(value) => FieldValue::Text(value.to_string()),
        Value::Double(value) => FieldValue::Text(value.to_string()),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let mut text = format!("{year:04}-{month:02}-{day:02}");
            if (hour, minute, second, micros) != (0, 0, 0, 0) {
                text.push_str(&format!(" {hour:02}:{minute:02}:{second:02}"));
            }
            if micros != 0 {
                text.push_str(&format!(".{micros:06}"));
            }
            FieldValue::Text(text)
        }
        Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(hours);
            let mut text = format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}");
            if micros != 0 {
                text.push_str(&format!(".{micros:06}"));
            }
            FieldValue::Text(text)
        }
    }
}

fn field_to_mysql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::NULL,
        FieldValue::Text(text) => Value::Bytes(text.clone().into_bytes()),
        FieldValue::Bytes(bytes) => Value::Bytes(bytes.clone()),
    }
}

fn to_backend_error(error: mysql_async::Error) -> BackendError {
    BackendError::new(error.to_string())
}

fn to_generation_error(error: SqlGenerationError) -> BackendError {
    BackendError::new(error.to_string())
}
