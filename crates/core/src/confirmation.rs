use std::collections::HashMap;

use thiserror::Error;

use crate::schema::RowKey;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfirmationToken(String);

impl ConfirmationToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What the user is asked before a row is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub token: ConfirmationToken,
    pub key: RowKey,
}

impl DeleteRequest {
    #[must_use]
    pub fn prompt(&self) -> String {
        format!("Delete row where {}?", self.key.describe())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfirmationError {
    #[error("confirmation is invalid or was already used")]
    InvalidToken,
    #[error("confirmation was issued for table `{issued_for}`, but `{current}` is selected")]
    TableChanged { issued_for: String, current: String },
}

/// Deletes only run after the token handed out by [`DeleteGuard::request`]
/// comes back. Tokens are single use.
#[derive(Debug, Default)]
pub struct DeleteGuard {
    nonce: u64,
    pending: HashMap<ConfirmationToken, RowKey>,
}

impl DeleteGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, key: RowKey) -> DeleteRequest {
        self.nonce = self.nonce.saturating_add(1);
        let token = ConfirmationToken(format!("delete-{}-{}", self.nonce, key.table));
        self.pending.insert(token.clone(), key.clone());
        DeleteRequest { token, key }
    }

    pub fn cancel(&mut self, token: &ConfirmationToken) -> bool {
        self.pending.remove(token).is_some()
    }

    pub fn confirm(
        &mut self,
        token: &ConfirmationToken,
        current_table: Option<&str>,
    ) -> Result<RowKey, ConfirmationError> {
        let key = self
            .pending
            .remove(token)
            .ok_or(ConfirmationError::InvalidToken)?;

        match current_table {
            Some(current) if current == key.table => Ok(key),
            other => Err(ConfirmationError::TableChanged {
                issued_for: key.table,
                current: other.unwrap_or("none").to_string(),
            }),
        }
    }

    /// Drops every outstanding request, e.g. after the table selection changed.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
