use crate::schema::Row;

/// Everything currently shown for the selected table. Holds every row of the
/// last `SELECT *`; only the cursor and the rendered window are bounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowGrid {
    headers: Vec<String>,
    rows: Vec<Row>,
    cursor: usize,
}

impl RowGrid {
    #[must_use]
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
            cursor: 0,
        }
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Swaps in a fresh result set, keeping the cursor on the same position
    /// when it still exists.
    pub fn replace_rows(&mut self, rows: Vec<Row>) {
        self.rows = rows;
        self.cursor = self.cursor.min(self.rows.len().saturating_sub(1));
    }

    pub fn reset(&mut self, headers: Vec<String>) {
        self.headers = headers;
        self.rows.clear();
        self.cursor = 0;
    }

    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        (!self.rows.is_empty()).then_some(self.cursor)
    }

    #[must_use]
    pub fn selected(&self) -> Option<&Row> {
        self.rows.get(self.cursor)
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_down(&mut self) {
        if !self.rows.is_empty() {
            self.cursor = (self.cursor + 1).min(self.rows.len() - 1);
        }
    }

    pub fn move_to_first(&mut self) {
        self.cursor = 0;
    }

    pub fn move_to_last(&mut self) {
        self.cursor = self.rows.len().saturating_sub(1);
    }

    /// Start of a `height`-row window that keeps the cursor visible.
    #[must_use]
    pub fn window_start(&self, height: usize) -> usize {
        if height == 0 || self.rows.len() <= height {
            return 0;
        }
        let centered = self.cursor.saturating_sub(height / 2);
        centered.min(self.rows.len() - height)
    }

    #[must_use]
    pub fn visible_rows(&self, start: usize, limit: usize) -> &[Row] {
        if limit == 0 || start >= self.rows.len() {
            return &[];
        }
        let end = (start + limit).min(self.rows.len());
        &self.rows[start..end]
    }
}
