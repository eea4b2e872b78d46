//! Insert/edit forms generated from a table's column list.

use crate::schema::{FieldValue, Row, RowKey, RowKeyError, TableSchema};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub column: String,
    pub data_type: String,
    pub nullable: bool,
    pub text: String,
    pub is_null: bool,
    /// Raw value of a binary cell, kept until the field is edited. `text`
    /// holds its hex rendering meanwhile.
    pub binary: Option<Vec<u8>>,
}

impl FormField {
    #[must_use]
    pub fn value(&self) -> FieldValue {
        if let Some(bytes) = &self.binary {
            FieldValue::Bytes(bytes.clone())
        } else if self.is_null {
            FieldValue::Null
        } else {
            FieldValue::Text(self.text.clone())
        }
    }

    /// The first keystroke on a binary cell replaces it instead of appending
    /// to its hex rendering.
    fn start_editing(&mut self) {
        if self.binary.take().is_some() {
            self.text.clear();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Insert,
    Update { key: RowKey },
}

/// The submitted result of a [`RowForm`], ready for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowEdit {
    Insert {
        table: String,
        values: Vec<FieldValue>,
    },
    Update {
        key: RowKey,
        values: Vec<FieldValue>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowForm {
    table: String,
    mode: FormMode,
    fields: Vec<FormField>,
    focused: usize,
}

impl RowForm {
    #[must_use]
    pub fn for_insert(table: &TableSchema) -> Self {
        let fields = table
            .columns
            .iter()
            .map(|column| FormField {
                column: column.name.clone(),
                data_type: column.data_type.clone(),
                nullable: column.nullable,
                text: String::new(),
                is_null: false,
                binary: None,
            })
            .collect();

        Self {
            table: table.name.clone(),
            mode: FormMode::Insert,
            fields,
            focused: 0,
        }
    }

    /// Pre-fills every input from `row` and captures its key before any edit.
    pub fn for_update(table: &TableSchema, row: &Row) -> Result<Self, RowKeyError> {
        let key = table.row_key(row)?;
        let fields = table
            .columns
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let value = row.get(index).cloned().unwrap_or(FieldValue::Null);
                let (text, binary) = match &value {
                    FieldValue::Null => (String::new(), None),
                    FieldValue::Text(text) => (text.clone(), None),
                    FieldValue::Bytes(bytes) => (value.to_string(), Some(bytes.clone())),
                };
                FormField {
                    column: column.name.clone(),
                    data_type: column.data_type.clone(),
                    nullable: column.nullable,
                    text,
                    is_null: value.is_null(),
                    binary,
                }
            })
            .collect();

        Ok(Self {
            table: table.name.clone(),
            mode: FormMode::Update { key },
            fields,
            focused: 0,
        })
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    #[must_use]
    pub fn title(&self) -> String {
        match &self.mode {
            FormMode::Insert => format!("Add row to {}", self.table),
            FormMode::Update { key } => format!("Edit {} ({})", self.table, key.describe()),
        }
    }

    #[must_use]
    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    #[must_use]
    pub fn focused(&self) -> usize {
        self.focused
    }

    pub fn focus_next(&mut self) {
        if !self.fields.is_empty() {
            self.focused = (self.focused + 1) % self.fields.len();
        }
    }

    pub fn focus_previous(&mut self) {
        if !self.fields.is_empty() {
            self.focused = self
                .focused
                .checked_sub(1)
                .unwrap_or(self.fields.len() - 1);
        }
    }

    /// Typing into a NULL field turns it back into text.
    pub fn push_char(&mut self, ch: char) {
        if let Some(field) = self.fields.get_mut(self.focused) {
            field.start_editing();
            field.is_null = false;
            field.text.push(ch);
        }
    }

    pub fn pop_char(&mut self) {
        if let Some(field) = self.fields.get_mut(self.focused) {
            field.start_editing();
            field.text.pop();
        }
    }

    pub fn toggle_null(&mut self) {
        if let Some(field) = self.fields.get_mut(self.focused) {
            field.start_editing();
            field.is_null = !field.is_null;
        }
    }

    pub fn set_text(&mut self, column: &str, text: impl Into<String>) -> bool {
        let Some(field) = self.fields.iter_mut().find(|field| field.column == column) else {
            return false;
        };
        field.text = text.into();
        field.is_null = false;
        field.binary = None;
        true
    }

    #[must_use]
    pub fn values(&self) -> Vec<FieldValue> {
        self.fields.iter().map(FormField::value).collect()
    }

    #[must_use]
    pub fn submit(&self) -> RowEdit {
        match &self.mode {
            FormMode::Insert => RowEdit::Insert {
                table: self.table.clone(),
                values: self.values(),
            },
            FormMode::Update { key } => RowEdit::Update {
                key: key.clone(),
                values: self.values(),
            },
        }
    }
}
