use thiserror::Error;

use crate::schema::{FieldValue, KeySource, RowKey, TableSchema};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SqlGenerationError {
    #[error("table name cannot be empty")]
    EmptyTableName,
    #[error("table `{0}` has no columns")]
    NoColumns(String),
    #[error("expected {expected} values for `{table}`, got {actual}")]
    ValueCountMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },
    #[error("row key belongs to `{key_table}`, not `{table}`")]
    KeyTableMismatch { table: String, key_table: String },
    #[error("row key has no columns")]
    EmptyKey,
}

/// SQL text with positional `?` placeholders and the values bound to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<FieldValue>,
}

impl Statement {
    #[must_use]
    pub fn new(sql: impl Into<String>, params: Vec<FieldValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

#[must_use]
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

#[must_use]
pub fn show_tables_sql() -> &'static str {
    "SHOW TABLES"
}

pub fn show_columns_sql(table: &str) -> Result<String, SqlGenerationError> {
    non_empty_table(table)?;
    Ok(format!("SHOW COLUMNS FROM {}", quote_identifier(table)))
}

pub fn select_all_sql(table: &str) -> Result<String, SqlGenerationError> {
    non_empty_table(table)?;
    Ok(format!("SELECT * FROM {}", quote_identifier(table)))
}

pub fn insert_statement(
    table: &TableSchema,
    values: &[FieldValue],
) -> Result<Statement, SqlGenerationError> {
    check_values(table, values)?;

    let columns = table
        .columns
        .iter()
        .map(|column| quote_identifier(&column.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; values.len()].join(", ");

    Ok(Statement::new(
        format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders})",
            quote_identifier(&table.name)
        ),
        values.to_vec(),
    ))
}

pub fn update_statement(
    table: &TableSchema,
    key: &RowKey,
    values: &[FieldValue],
) -> Result<Statement, SqlGenerationError> {
    check_values(table, values)?;
    check_key(table, key)?;

    let assignments = table
        .columns
        .iter()
        .map(|column| format!("{}=?", quote_identifier(&column.name)))
        .collect::<Vec<_>>()
        .join(", ");

    let mut params = values.to_vec();
    params.extend(key.parts.iter().map(|part| part.value.clone()));

    Ok(Statement::new(
        format!(
            "UPDATE {} SET {assignments} WHERE {}{}",
            quote_identifier(&table.name),
            where_clause(key),
            limit_clause(key)
        ),
        params,
    ))
}

pub fn delete_statement(table: &TableSchema, key: &RowKey) -> Result<Statement, SqlGenerationError> {
    check_key(table, key)?;

    Ok(Statement::new(
        format!(
            "DELETE FROM {} WHERE {}{}",
            quote_identifier(&table.name),
            where_clause(key),
            limit_clause(key)
        ),
        key.parts.iter().map(|part| part.value.clone()).collect(),
    ))
}

fn where_clause(key: &RowKey) -> String {
    key.parts
        .iter()
        .map(|part| format!("{}=?", quote_identifier(&part.column)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

// Without key metadata the first column may repeat; touch one row at most.
fn limit_clause(key: &RowKey) -> &'static str {
    match key.source {
        KeySource::PrimaryKey => "",
        KeySource::FirstColumn => " LIMIT 1",
    }
}

fn non_empty_table(table: &str) -> Result<(), SqlGenerationError> {
    if table.trim().is_empty() {
        return Err(SqlGenerationError::EmptyTableName);
    }
    Ok(())
}

fn check_values(table: &TableSchema, values: &[FieldValue]) -> Result<(), SqlGenerationError> {
    non_empty_table(&table.name)?;
    if table.columns.is_empty() {
        return Err(SqlGenerationError::NoColumns(table.name.clone()));
    }
    if values.len() != table.columns.len() {
        return Err(SqlGenerationError::ValueCountMismatch {
            table: table.name.clone(),
            expected: table.columns.len(),
            actual: values.len(),
        });
    }
    Ok(())
}

fn check_key(table: &TableSchema, key: &RowKey) -> Result<(), SqlGenerationError> {
    non_empty_table(&table.name)?;
    if key.table != table.name {
        return Err(SqlGenerationError::KeyTableMismatch {
            table: table.name.clone(),
            key_table: key.table.clone(),
        });
    }
    if key.parts.is_empty() {
        return Err(SqlGenerationError::EmptyKey);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        delete_statement, insert_statement, quote_identifier, select_all_sql, show_columns_sql,
        show_tables_sql, update_statement, SqlGenerationError,
    };
    use crate::schema::{ColumnSchema, FieldValue, Row, TableSchema};

    fn movies() -> TableSchema {
        TableSchema::new(
            "movies",
            vec![
                ColumnSchema::new("id", "int").primary(),
                ColumnSchema::new("title", "varchar(255)"),
                ColumnSchema::new("year", "int"),
            ],
        )
    }

    fn inception() -> Vec<FieldValue> {
        vec!["1".into(), "Inception".into(), "2010".into()]
    }

    #[test]
    fn quotes_identifiers_with_backticks() {
        assert_eq!(quote_identifier("movies"), "`movies`");
        assert_eq!(quote_identifier("odd`name"), "`odd``name`");
    }

    #[test]
    fn generates_introspection_and_select_statements() {
        assert_eq!(show_tables_sql(), "SHOW TABLES");
        assert_eq!(
            show_columns_sql("movies").expect("valid table"),
            "SHOW COLUMNS FROM `movies`"
        );
        assert_eq!(
            select_all_sql("movies").expect("valid table"),
            "SELECT * FROM `movies`"
        );
        assert_eq!(
            select_all_sql("  ").expect_err("blank table"),
            SqlGenerationError::EmptyTableName
        );
    }

    #[test]
    fn insert_binds_one_placeholder_per_column() {
        let statement = insert_statement(&movies(), &inception()).expect("insert sql");
        assert_eq!(
            statement.sql,
            "INSERT INTO `movies` (`id`, `title`, `year`) VALUES (?, ?, ?)"
        );
        assert_eq!(statement.params, inception());
        assert_eq!(statement.sql.matches('?').count(), statement.params.len());
    }

    #[test]
    fn insert_rejects_value_count_mismatch() {
        let err = insert_statement(&movies(), &["1".into()]).expect_err("should fail");
        assert_eq!(
            err,
            SqlGenerationError::ValueCountMismatch {
                table: "movies".to_string(),
                expected: 3,
                actual: 1,
            }
        );
    }

    #[test]
    fn update_sets_every_column_and_keys_on_original_value() {
        let table = movies();
        let key = table
            .row_key(&Row::new(inception()))
            .expect("key should resolve");
        let values = vec!["1".into(), "Inception 2".into(), FieldValue::Null];

        let statement = update_statement(&table, &key, &values).expect("update sql");
        assert_eq!(
            statement.sql,
            "UPDATE `movies` SET `id`=?, `title`=?, `year`=? WHERE `id`=?"
        );
        assert_eq!(
            statement.params,
            vec![
                "1".into(),
                "Inception 2".into(),
                FieldValue::Null,
                "1".into()
            ]
        );
        assert_eq!(statement.sql.matches('?').count(), statement.params.len());
    }

    #[test]
    fn delete_keys_on_primary_key_value() {
        let table = movies();
        let key = table
            .row_key(&Row::new(inception()))
            .expect("key should resolve");

        let statement = delete_statement(&table, &key).expect("delete sql");
        assert_eq!(statement.sql, "DELETE FROM `movies` WHERE `id`=?");
        assert_eq!(statement.params, vec![FieldValue::text("1")]);
    }

    #[test]
    fn first_column_fallback_limits_mutations_to_one_row() {
        let table = TableSchema::new(
            "log",
            vec![
                ColumnSchema::new("message", "text"),
                ColumnSchema::new("level", "varchar(8)"),
            ],
        );
        let key = table
            .row_key(&Row::new(vec!["boot".into(), "info".into()]))
            .expect("key should resolve");

        let delete = delete_statement(&table, &key).expect("delete sql");
        assert_eq!(delete.sql, "DELETE FROM `log` WHERE `message`=? LIMIT 1");

        let update =
            update_statement(&table, &key, &["boot".into(), "warn".into()]).expect("update sql");
        assert_eq!(
            update.sql,
            "UPDATE `log` SET `message`=?, `level`=? WHERE `message`=? LIMIT 1"
        );
    }

    #[test]
    fn keys_from_another_table_are_rejected() {
        let table = movies();
        let mut key = table
            .row_key(&Row::new(inception()))
            .expect("key should resolve");
        key.table = "actors".to_string();

        let err = delete_statement(&table, &key).expect_err("should fail");
        assert!(matches!(err, SqlGenerationError::KeyTableMismatch { .. }));
    }
}
