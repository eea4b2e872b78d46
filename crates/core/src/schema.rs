use std::fmt;

use thiserror::Error;

/// A single cell or bound parameter. `SHOW COLUMNS` and `SELECT *` results are
/// converted into this shape by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Null,
    Text(String),
    /// Binary data that is not valid UTF-8; bound back byte for byte.
    Bytes(Vec<u8>),
}

impl FieldValue {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Text(value) => f.write_str(value),
            Self::Bytes(bytes) => {
                f.write_str("0x")?;
                bytes.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub values: Vec<FieldValue>,
}

impl Row {
    #[must_use]
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index)
    }
}

/// Index membership as reported by the `Key` column of `SHOW COLUMNS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnKey {
    Primary,
    Unique,
    Multiple,
    #[default]
    None,
}

impl ColumnKey {
    #[must_use]
    pub fn from_show_columns(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PRI" => Self::Primary,
            "UNI" => Self::Unique,
            "MUL" => Self::Multiple,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub key: ColumnKey,
    pub default_value: Option<String>,
    pub extra: String,
}

impl ColumnSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            key: ColumnKey::None,
            default_value: None,
            extra: String::new(),
        }
    }

    #[must_use]
    pub fn primary(mut self) -> Self {
        self.key = ColumnKey::Primary;
        self.nullable = false;
        self
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    #[must_use]
    pub fn is_auto_increment(&self) -> bool {
        self.extra.to_ascii_lowercase().contains("auto_increment")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    PrimaryKey,
    /// The table has no primary key; the first column stands in for one.
    FirstColumn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    /// Positions of the columns identifying a row, and whether they come from
    /// real key metadata.
    #[must_use]
    pub fn key_columns(&self) -> (Vec<usize>, KeySource) {
        let primary = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.key == ColumnKey::Primary)
            .map(|(index, _)| index)
            .collect::<Vec<_>>();

        if primary.is_empty() {
            let fallback = if self.columns.is_empty() {
                Vec::new()
            } else {
                vec![0]
            };
            (fallback, KeySource::FirstColumn)
        } else {
            (primary, KeySource::PrimaryKey)
        }
    }

    #[must_use]
    pub fn key_source(&self) -> KeySource {
        self.key_columns().1
    }

    pub fn row_key(&self, row: &Row) -> Result<RowKey, RowKeyError> {
        let (indexes, source) = self.key_columns();
        if indexes.is_empty() {
            return Err(RowKeyError::NoColumns {
                table: self.name.clone(),
            });
        }

        let mut parts = Vec::with_capacity(indexes.len());
        for index in indexes {
            let column = &self.columns[index];
            let value = row.get(index).ok_or_else(|| RowKeyError::ShortRow {
                expected: self.columns.len(),
                actual: row.values.len(),
            })?;
            if value.is_null() {
                return Err(RowKeyError::NullKeyValue {
                    column: column.name.clone(),
                });
            }
            parts.push(KeyPart {
                column: column.name.clone(),
                value: value.clone(),
            });
        }

        Ok(RowKey {
            table: self.name.clone(),
            parts,
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPart {
    pub column: String,
    pub value: FieldValue,
}

/// Identifies one row for UPDATE and DELETE. Captured before any edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKey {
    pub table: String,
    pub parts: Vec<KeyPart>,
    pub source: KeySource,
}

impl RowKey {
    #[must_use]
    pub fn describe(&self) -> String {
        self.parts
            .iter()
            .map(|part| format!("{}={}", part.column, part.value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowKeyError {
    #[error("table `{table}` has no columns")]
    NoColumns { table: String },
    #[error("row has {actual} values but table has {expected} columns")]
    ShortRow { expected: usize, actual: usize },
    #[error("key column `{column}` is NULL and cannot identify a row")]
    NullKeyValue { column: String },
}
