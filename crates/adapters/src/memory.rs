//! In-process database used by `--demo` and by front-end tests. Mirrors the
//! MySQL behaviour the admin panel depends on: table order, duplicate primary
//! keys, and `LIMIT 1` on first-column keys.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dbadmin_core::connection_manager::{BackendError, ConnectionBackend};
use dbadmin_core::profiles::ConnectionProfile;
use dbadmin_core::schema::{ColumnSchema, FieldValue, KeySource, Row, RowKey, TableSchema};
use dbadmin_core::session::{Change, Mutation, TableBackend};

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    rows: Vec<Row>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    name: String,
    tables: BTreeMap<String, MemoryTable>,
    fail_next: Option<String>,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Small cinema schema: `movies` and `customers` keyed by id, `showtimes`
    /// without a primary key.
    #[must_use]
    pub fn movie_theatre() -> Self {
        let mut database = Self::new("movie_theatre");
        database.create_table(TableSchema::new(
            "movies",
            vec![
                ColumnSchema::new("id", "int").primary(),
                ColumnSchema::new("title", "varchar(255)").not_null(),
                ColumnSchema::new("year", "int"),
            ],
        ));
        database.insert_rows(
            "movies",
            [
                ["1", "Inception", "2010"],
                ["2", "Memento", "2000"],
                ["3", "Interstellar", "2014"],
            ],
        );

        database.create_table(TableSchema::new(
            "customers",
            vec![
                ColumnSchema::new("customer_id", "int").primary(),
                ColumnSchema::new("name", "varchar(64)").not_null(),
                ColumnSchema::new("email", "varchar(128)"),
            ],
        ));
        database.insert_rows(
            "customers",
            [
                ["10", "Ada", "ada@example.com"],
                ["11", "Grace", "grace@example.com"],
            ],
        );

        database.create_table(TableSchema::new(
            "showtimes",
            vec![
                ColumnSchema::new("movie_id", "int"),
                ColumnSchema::new("starts_at", "datetime"),
            ],
        ));
        database.insert_rows(
            "showtimes",
            [["1", "2026-10-19 19:30:00"], ["1", "2026-10-19 22:00:00"]],
        );
        database
    }

    pub fn create_table(&mut self, schema: TableSchema) {
        self.tables.insert(
            schema.name.clone(),
            MemoryTable {
                schema,
                rows: Vec::new(),
            },
        );
    }

    pub fn insert_rows<const N: usize>(
        &mut self,
        table: &str,
        rows: impl IntoIterator<Item = [&'static str; N]>,
    ) {
        if let Some(table) = self.tables.get_mut(table) {
            table.rows.extend(
                rows.into_iter()
                    .map(|row| Row::new(row.into_iter().map(FieldValue::from).collect())),
            );
        }
    }

    /// Makes the next statement of any kind fail with `message`.
    pub fn fail_next(&mut self, message: impl Into<String>) {
        self.fail_next = Some(message.into());
    }

    #[must_use]
    pub fn rows(&self, table: &str) -> Option<&[Row]> {
        self.tables.get(table).map(|table| table.rows.as_slice())
    }

    fn take_failure(&mut self) -> Result<(), BackendError> {
        match self.fail_next.take() {
            Some(message) => Err(BackendError::new(message)),
            None => Ok(()),
        }
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut MemoryTable, BackendError> {
        let database = self.name.clone();
        self.tables
            .get_mut(table)
            .ok_or_else(|| BackendError::new(format!("Table '{database}.{table}' doesn't exist")))
    }
}

impl MemoryTable {
    fn position(&self, column: &str) -> Result<usize, BackendError> {
        self.schema
            .columns
            .iter()
            .position(|candidate| candidate.name == column)
            .ok_or_else(|| BackendError::new(format!("Unknown column '{column}' in 'where clause'")))
    }

    fn matching(&self, key: &RowKey) -> Result<Vec<usize>, BackendError> {
        let positions = key
            .parts
            .iter()
            .map(|part| Ok((self.position(&part.column)?, &part.value)))
            .collect::<Result<Vec<_>, BackendError>>()?;

        let mut matches = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                positions
                    .iter()
                    .all(|(index, value)| row.get(*index) == Some(*value))
            })
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        if key.source == KeySource::FirstColumn {
            matches.truncate(1);
        }
        Ok(matches)
    }

    fn check_row(&self, values: &[FieldValue], skip: Option<usize>) -> Result<(), BackendError> {
        if values.len() != self.schema.columns.len() {
            return Err(BackendError::new(
                "Column count doesn't match value count at row 1",
            ));
        }
        for (column, value) in self.schema.columns.iter().zip(values) {
            if value.is_null() && !column.nullable {
                return Err(BackendError::new(format!(
                    "Column '{}' cannot be null",
                    column.name
                )));
            }
        }

        let (key_indexes, source) = self.schema.key_columns();
        if source != KeySource::PrimaryKey {
            return Ok(());
        }
        let duplicate = self.rows.iter().enumerate().any(|(index, row)| {
            Some(index) != skip
                && key_indexes
                    .iter()
                    .all(|key_index| row.get(*key_index) == values.get(*key_index))
        });
        if duplicate {
            let shown = key_indexes
                .iter()
                .map(|index| values[*index].to_string())
                .collect::<Vec<_>>()
                .join("-");
            return Err(BackendError::new(format!(
                "Duplicate entry '{shown}' for key 'PRIMARY'"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TableBackend for MemoryDatabase {
    async fn list_tables(&mut self) -> Result<Vec<String>, BackendError> {
        self.take_failure()?;
        Ok(self.tables.keys().cloned().collect())
    }

    async fn describe_table(&mut self, table: &str) -> Result<TableSchema, BackendError> {
        self.take_failure()?;
        Ok(self.table_mut(table)?.schema.clone())
    }

    async fn fetch_rows(&mut self, table: &str) -> Result<Vec<Row>, BackendError> {
        self.take_failure()?;
        Ok(self.table_mut(table)?.rows.clone())
    }

    async fn execute(&mut self, mutation: &Mutation) -> Result<u64, BackendError> {
        self.take_failure()?;
        let table = self.table_mut(&mutation.table)?;

        match &mutation.change {
            Change::Insert { values } => {
                table.check_row(values, None)?;
                table.rows.push(Row::new(values.clone()));
                Ok(1)
            }
            Change::Update { key, values } => {
                let matches = table.matching(key)?;
                let mut changed = 0;
                for index in matches {
                    table.check_row(values, Some(index))?;
                    if table.rows[index].values != *values {
                        table.rows[index] = Row::new(values.clone());
                        changed += 1;
                    }
                }
                Ok(changed)
            }
            Change::Delete { key } => {
                let matches = table.matching(key)?;
                for index in matches.iter().rev() {
                    table.rows.remove(*index);
                }
                Ok(matches.len() as u64)
            }
        }
    }
}

/// Hands out a copy of the seed database on every connect.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    seed: MemoryDatabase,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(seed: MemoryDatabase) -> Self {
        Self { seed }
    }
}

#[async_trait]
impl ConnectionBackend for MemoryBackend {
    type Connection = MemoryDatabase;

    async fn connect(&self, profile: &ConnectionProfile) -> Result<Self::Connection, BackendError> {
        if let Some(database) = &profile.database {
            if !self.seed.name.is_empty() && *database != self.seed.name {
                return Err(BackendError::new(format!("Unknown database '{database}'")));
            }
        }
        Ok(self.seed.clone())
    }

    async fn ping(&self, _connection: &mut Self::Connection) -> Result<(), BackendError> {
        Ok(())
    }

    async fn disconnect(&self, _connection: Self::Connection) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use dbadmin_core::connection_manager::ConnectionManager;
    use dbadmin_core::profiles::ConnectionProfile;
    use dbadmin_core::schema::{FieldValue, Row};
    use dbadmin_core::session::{AdminError, AdminSession};

    use super::{MemoryBackend, MemoryDatabase};

    async fn demo_session() -> AdminSession<MemoryBackend> {
        let mut manager = ConnectionManager::new(MemoryBackend::new(MemoryDatabase::movie_theatre()));
        manager
            .connect(ConnectionProfile::local_default())
            .await
            .expect("connect should succeed");
        let mut session = AdminSession::new(manager);
        session.load_tables().await.expect("load tables");
        session
    }

    fn row(values: &[&str]) -> Row {
        Row::new(values.iter().map(|value| FieldValue::text(*value)).collect())
    }

    #[tokio::test]
    async fn lists_tables_in_name_order() {
        let session = demo_session().await;
        assert_eq!(session.tables(), ["customers", "movies", "showtimes"]);
    }

    #[tokio::test]
    async fn connecting_to_another_database_fails() {
        let mut manager = ConnectionManager::new(MemoryBackend::new(MemoryDatabase::movie_theatre()));
        let mut profile = ConnectionProfile::local_default();
        profile.database = Some("payroll".to_string());

        let err = manager.connect(profile).await.expect_err("should fail");
        assert_eq!(err.to_string(), "connection failed: Unknown database 'payroll'");
    }

    #[tokio::test]
    async fn duplicate_primary_key_is_rejected_without_changes() {
        let mut session = demo_session().await;
        session.select_table("movies").await.expect("select movies");

        let mut form = session.begin_insert().expect("insert form");
        form.set_text("id", "1");
        form.set_text("title", "Tenet");
        let err = session.apply(form.submit()).await.expect_err("duplicate");
        assert!(matches!(err, AdminError::Backend(_)));
        assert_eq!(err.to_string(), "Duplicate entry '1' for key 'PRIMARY'");
        assert_eq!(session.grid().len(), 3);
    }

    #[tokio::test]
    async fn first_column_delete_removes_a_single_row() {
        let mut session = demo_session().await;
        session.select_table("showtimes").await.expect("select showtimes");
        assert!(session.status_line().contains("no primary key"));

        let request = session.request_delete().expect("delete request");
        assert_eq!(request.prompt(), "Delete row where movie_id=1?");
        let affected = session
            .confirm_delete(&request.token)
            .await
            .expect("delete");
        assert_eq!(affected, 1);
        assert_eq!(session.grid().rows(), [row(&["1", "2026-10-19 22:00:00"])]);
    }

    #[tokio::test]
    async fn not_null_columns_reject_null() {
        let mut session = demo_session().await;
        session.select_table("movies").await.expect("select movies");

        let mut form = session.begin_insert().expect("insert form");
        form.set_text("id", "4");
        form.focus_next();
        form.toggle_null();
        let err = session.apply(form.submit()).await.expect_err("null title");
        assert_eq!(err.to_string(), "Column 'title' cannot be null");
    }

    #[tokio::test]
    async fn injected_failure_surfaces_once() {
        let mut database = MemoryDatabase::movie_theatre();
        database.fail_next("Lost connection to MySQL server during query");
        let mut manager = ConnectionManager::new(MemoryBackend::new(database));
        manager
            .connect(ConnectionProfile::local_default())
            .await
            .expect("connect should succeed");
        let mut session = AdminSession::new(manager);

        assert!(session.load_tables().await.is_err());
        assert!(session.tables().is_empty());
        assert_eq!(session.load_tables().await.expect("second attempt"), 3);
    }
}
