use async_trait::async_trait;
use thiserror::Error;

use crate::audit_trail::{
    unix_timestamp_millis, AuditOperation, AuditOutcome, AuditRecord, FileAuditTrail,
};
use crate::confirmation::{ConfirmationError, ConfirmationToken, DeleteGuard, DeleteRequest};
use crate::connection_manager::{
    BackendError, ConnectionBackend, ConnectionManager, ConnectionManagerError, ConnectionStatus,
};
use crate::grid::RowGrid;
use crate::row_editor::{RowEdit, RowForm};
use crate::schema::{FieldValue, KeySource, Row, RowKey, RowKeyError, TableSchema};
use crate::sql_generator::{
    delete_statement, insert_statement, update_statement, SqlGenerationError, Statement,
};

/// A data change with both its structured form and the generated statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub table: String,
    pub change: Change,
    pub statement: Statement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Insert { values: Vec<FieldValue> },
    Update { key: RowKey, values: Vec<FieldValue> },
    Delete { key: RowKey },
}

impl Change {
    fn operation(&self) -> AuditOperation {
        match self {
            Self::Insert { .. } => AuditOperation::Insert,
            Self::Update { .. } => AuditOperation::Update,
            Self::Delete { .. } => AuditOperation::Delete,
        }
    }
}

/// The statements the admin panel issues, run on the one open connection.
#[async_trait]
pub trait TableBackend: Send {
    async fn list_tables(&mut self) -> Result<Vec<String>, BackendError>;
    async fn describe_table(&mut self, table: &str) -> Result<TableSchema, BackendError>;
    async fn fetch_rows(&mut self, table: &str) -> Result<Vec<Row>, BackendError>;
    /// Runs one auto-committed statement and returns the affected row count.
    async fn execute(&mut self, mutation: &Mutation) -> Result<u64, BackendError>;
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Connection(#[from] ConnectionManagerError),
    #[error("{0}")]
    Backend(#[source] BackendError),
    #[error("table `{0}` is not in the table list")]
    UnknownTable(String),
    #[error("no table selected")]
    NoTableSelected,
    #[error("no row selected")]
    NoRowSelected,
    #[error("profile `{0}` is read-only")]
    ReadOnly(String),
    #[error("form was opened for `{form_table}` but `{current}` is selected")]
    StaleForm { form_table: String, current: String },
    #[error(transparent)]
    Sql(#[from] SqlGenerationError),
    #[error(transparent)]
    RowKey(#[from] RowKeyError),
    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
    /// The statement went through; only the grid refresh afterwards failed.
    #[error("{affected} row(s) changed, but reloading the rows failed: {source}")]
    ReloadAfterChange {
        affected: u64,
        #[source]
        source: Box<AdminError>,
    },
}

const FIRST_COLUMN_KEY_WARNING: &str = "no primary key, rows are matched on the first column";

fn counted<N>(count: N, noun: &str) -> String
where
    N: std::fmt::Display + PartialEq + From<u8>,
{
    if count == N::from(1) {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Controller behind every UI event: table list, selected table, grid, and
/// the insert/update/delete flows. A failed call leaves all state unchanged.
pub struct AdminSession<B>
where
    B: ConnectionBackend,
    B::Connection: TableBackend,
{
    manager: ConnectionManager<B>,
    tables: Vec<String>,
    current: Option<TableSchema>,
    grid: RowGrid,
    deletes: DeleteGuard,
    audit: Option<FileAuditTrail>,
    status_line: String,
}

impl<B> AdminSession<B>
where
    B: ConnectionBackend,
    B::Connection: TableBackend,
{
    #[must_use]
    pub fn new(manager: ConnectionManager<B>) -> Self {
        Self {
            manager,
            tables: Vec::new(),
            current: None,
            grid: RowGrid::default(),
            deletes: DeleteGuard::new(),
            audit: None,
            status_line: "Ready".to_string(),
        }
    }

    #[must_use]
    pub fn with_audit_trail(mut self, audit: FileAuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    #[must_use]
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    #[must_use]
    pub fn current_table(&self) -> Option<&TableSchema> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn grid(&self) -> &RowGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut RowGrid {
        &mut self.grid
    }

    #[must_use]
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.manager
            .active_profile()
            .is_some_and(|profile| profile.read_only)
    }

    /// `SHOW TABLES`, then selects the first table.
    pub async fn load_tables(&mut self) -> Result<usize, AdminError> {
        let tables = self
            .manager
            .connection_mut()?
            .list_tables()
            .await
            .map_err(AdminError::Backend)?;
        tracing::debug!(count = tables.len(), "loaded table list");

        let next = tables.first().cloned();
        let previous = std::mem::replace(&mut self.tables, tables);

        match next {
            Some(name) => {
                if let Err(error) = self.select_table(&name).await {
                    self.tables = previous;
                    return Err(error);
                }
            }
            None => {
                self.current = None;
                self.grid.reset(Vec::new());
                self.deletes.clear();
            }
        }

        let count = self.tables.len();
        self.set_status(format!("Loaded {}.", counted(count, "table")));
        Ok(count)
    }

    /// `SHOW COLUMNS` and `SELECT *` for `name`; only introspected names are
    /// accepted since they get interpolated into SQL.
    pub async fn select_table(&mut self, name: &str) -> Result<(), AdminError> {
        if !self.tables.iter().any(|table| table == name) {
            return Err(AdminError::UnknownTable(name.to_string()));
        }

        let connection = self.manager.connection_mut()?;
        let schema = connection
            .describe_table(name)
            .await
            .map_err(AdminError::Backend)?;
        let rows = connection
            .fetch_rows(name)
            .await
            .map_err(AdminError::Backend)?;

        self.grid.reset(schema.column_names());
        self.grid.replace_rows(rows);
        self.deletes.clear();

        let status = format!(
            "Table: {} ({}, {})",
            schema.name,
            counted(schema.columns.len(), "column"),
            counted(self.grid.len(), "row")
        );
        tracing::info!(table = %schema.name, rows = self.grid.len(), "table selected");
        self.current = Some(schema);
        self.set_status(status);
        Ok(())
    }

    pub async fn reload_rows(&mut self) -> Result<usize, AdminError> {
        let table = self
            .current
            .as_ref()
            .map(|table| table.name.clone())
            .ok_or(AdminError::NoTableSelected)?;

        let rows = self
            .manager
            .connection_mut()?
            .fetch_rows(&table)
            .await
            .map_err(AdminError::Backend)?;
        self.grid.replace_rows(rows);

        let count = self.grid.len();
        self.set_status(format!("Loaded {}.", counted(count, "row")));
        Ok(count)
    }

    pub fn begin_insert(&self) -> Result<RowForm, AdminError> {
        let table = self.current.as_ref().ok_or(AdminError::NoTableSelected)?;
        self.ensure_writable()?;
        Ok(RowForm::for_insert(table))
    }

    pub fn begin_update(&self) -> Result<RowForm, AdminError> {
        let table = self.current.as_ref().ok_or(AdminError::NoTableSelected)?;
        let row = self.grid.selected().ok_or(AdminError::NoRowSelected)?;
        self.ensure_writable()?;
        Ok(RowForm::for_update(table, row)?)
    }

    /// Runs the INSERT or UPDATE produced by a submitted form, then reloads.
    pub async fn apply(&mut self, edit: RowEdit) -> Result<u64, AdminError> {
        let table = self.current.as_ref().ok_or(AdminError::NoTableSelected)?;
        let form_table = match &edit {
            RowEdit::Insert { table, .. } => table,
            RowEdit::Update { key, .. } => &key.table,
        };
        if *form_table != table.name {
            return Err(AdminError::StaleForm {
                form_table: form_table.clone(),
                current: table.name.clone(),
            });
        }

        let mutation = match edit {
            RowEdit::Insert { values, .. } => Mutation {
                table: table.name.clone(),
                statement: insert_statement(table, &values)?,
                change: Change::Insert { values },
            },
            RowEdit::Update { key, values } => Mutation {
                table: table.name.clone(),
                statement: update_statement(table, &key, &values)?,
                change: Change::Update { key, values },
            },
        };

        self.run_mutation(mutation).await
    }

    pub fn request_delete(&mut self) -> Result<DeleteRequest, AdminError> {
        let table = self.current.as_ref().ok_or(AdminError::NoTableSelected)?;
        let row = self.grid.selected().ok_or(AdminError::NoRowSelected)?;
        self.ensure_writable()?;
        let key = table.row_key(row)?;
        Ok(self.deletes.request(key))
    }

    pub fn cancel_delete(&mut self, token: &ConfirmationToken) {
        if self.deletes.cancel(token) {
            self.set_status("Delete cancelled.".to_string());
        }
    }

    pub async fn confirm_delete(&mut self, token: &ConfirmationToken) -> Result<u64, AdminError> {
        let current = self.current.as_ref().map(|table| table.name.as_str());
        let key = self.deletes.confirm(token, current)?;
        let table = self.current.as_ref().ok_or(AdminError::NoTableSelected)?;

        let mutation = Mutation {
            table: table.name.clone(),
            statement: delete_statement(table, &key)?,
            change: Change::Delete { key },
        };
        self.run_mutation(mutation).await
    }

    pub async fn shutdown(&mut self) -> Result<(), AdminError> {
        self.manager.disconnect().await?;
        Ok(())
    }

    async fn run_mutation(&mut self, mutation: Mutation) -> Result<u64, AdminError> {
        let operation = mutation.change.operation();
        if let Err(error) = self.ensure_writable() {
            self.record(&mutation, AuditOutcome::Blocked, None, Some(error.to_string()));
            return Err(error);
        }

        let result = self.manager.connection_mut()?.execute(&mutation).await;
        let affected = match result {
            Ok(affected) => affected,
            Err(error) => {
                tracing::warn!(table = %mutation.table, ?operation, %error, "statement failed");
                self.record(&mutation, AuditOutcome::Failed, None, Some(error.to_string()));
                return Err(AdminError::Backend(error));
            }
        };
        tracing::info!(table = %mutation.table, ?operation, affected, "statement executed");
        self.record(&mutation, AuditOutcome::Succeeded, Some(affected), None);

        let verb = match operation {
            AuditOperation::Insert => "Inserted",
            AuditOperation::Update => "Updated",
            AuditOperation::Delete => "Deleted",
        };
        let changed = format!("{verb} {} in {}", counted(affected, "row"), mutation.table);
        if let Err(error) = self.reload_rows().await {
            self.set_status(format!("{changed}; reload failed."));
            return Err(AdminError::ReloadAfterChange {
                affected,
                source: Box::new(error),
            });
        }
        self.set_status(format!(
            "{changed}; {} loaded.",
            counted(self.grid.len(), "row")
        ));
        Ok(affected)
    }

    /// Every status message keeps the first-column key warning visible while
    /// such a table is selected.
    fn set_status(&mut self, message: String) {
        let first_column_key = self
            .current
            .as_ref()
            .is_some_and(|table| table.key_source() == KeySource::FirstColumn);
        self.status_line = if first_column_key {
            format!("{message} | {FIRST_COLUMN_KEY_WARNING}")
        } else {
            message
        };
    }

    fn ensure_writable(&self) -> Result<(), AdminError> {
        match self.manager.active_profile() {
            Some(profile) if profile.read_only => Err(AdminError::ReadOnly(profile.name.clone())),
            _ => Ok(()),
        }
    }

    fn record(
        &self,
        mutation: &Mutation,
        outcome: AuditOutcome,
        affected_rows: Option<u64>,
        error: Option<String>,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };
        let profile = self.manager.active_profile();
        let record = AuditRecord {
            timestamp_unix_ms: unix_timestamp_millis(),
            profile_name: profile.map(|profile| profile.name.clone()),
            database: profile.and_then(|profile| profile.database.clone()),
            table: mutation.table.clone(),
            operation: mutation.change.operation(),
            sql: mutation.statement.sql.clone(),
            param_count: mutation.statement.params.len(),
            outcome,
            affected_rows,
            error,
        };
        if let Err(error) = audit.append(&record) {
            tracing::warn!(path = %audit.path().display(), %error, "audit append failed");
        }
    }
}
