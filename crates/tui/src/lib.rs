use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use dbadmin_core::confirmation::{ConfirmationToken, DeleteRequest};
use dbadmin_core::connection_manager::ConnectionBackend;
use dbadmin_core::row_editor::{RowEdit, RowForm};
use dbadmin_core::schema::KeySource;
use dbadmin_core::session::{AdminError, AdminSession, TableBackend};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row as TableRow, Table,
    TableState, Wrap,
};
use ratatui::{Frame, Terminal};
use thiserror::Error;
use tokio::runtime::Runtime;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const TABLE_LIST_WIDTH: u16 = 28;
const GRID_COLUMN_MIN_WIDTH: u16 = 10;

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pane {
    Tables,
    Grid,
}

impl Pane {
    fn next(self) -> Self {
        match self {
            Self::Tables => Self::Grid,
            Self::Grid => Self::Tables,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Modal {
    Form(RowForm),
    ConfirmDelete(DeleteRequest),
    /// Error or warning; a form whose submit failed comes back on dismiss.
    Notice {
        title: String,
        message: String,
        resume: Option<RowForm>,
    },
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Browse,
    Form,
    Confirm,
    Notice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectionKey {
    Up,
    Down,
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Msg {
    Quit,
    ToggleHelp,
    NextPane,
    Navigate(DirectionKey),
    Activate,
    RefreshTables,
    ReloadRows,
    AddRow,
    EditRow,
    DeleteRow,
    Input(char),
    Backspace,
    NextField,
    PreviousField,
    ToggleNull,
    Submit,
    Confirm,
    Cancel,
}

/// Database work requested by a UI event. Executed synchronously, one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    LoadTables,
    SelectTable(String),
    ReloadRows,
    Apply(RowForm),
    ConfirmDelete(ConfirmationToken),
}

struct TuiApp<B>
where
    B: ConnectionBackend,
    B::Connection: TableBackend,
{
    session: AdminSession<B>,
    pane: Pane,
    table_cursor: usize,
    modal: Option<Modal>,
    should_quit: bool,
}

impl<B> TuiApp<B>
where
    B: ConnectionBackend,
    B::Connection: TableBackend,
{
    fn new(session: AdminSession<B>) -> Self {
        Self {
            session,
            pane: Pane::Tables,
            table_cursor: 0,
            modal: None,
            should_quit: false,
        }
    }

    fn input_mode(&self) -> InputMode {
        match &self.modal {
            None => InputMode::Browse,
            Some(Modal::Form(_)) => InputMode::Form,
            Some(Modal::ConfirmDelete(_)) => InputMode::Confirm,
            Some(Modal::Notice { .. } | Modal::Help) => InputMode::Notice,
        }
    }

    fn handle(&mut self, msg: Msg) -> Option<Command> {
        match self.modal.take() {
            None => self.handle_browse(msg),
            Some(Modal::Form(form)) => self.handle_form(form, msg),
            Some(Modal::ConfirmDelete(request)) => self.handle_confirm(request, msg),
            Some(modal @ (Modal::Notice { .. } | Modal::Help)) => {
                self.handle_notice(modal, msg);
                None
            }
        }
    }

    fn handle_browse(&mut self, msg: Msg) -> Option<Command> {
        match msg {
            Msg::Quit => self.should_quit = true,
            Msg::ToggleHelp => self.modal = Some(Modal::Help),
            Msg::NextPane => self.pane = self.pane.next(),
            Msg::Navigate(direction) => return self.navigate(direction),
            Msg::Activate => match self.pane {
                Pane::Tables => self.pane = Pane::Grid,
                Pane::Grid => self.open_update_form(),
            },
            Msg::RefreshTables => return Some(Command::LoadTables),
            Msg::ReloadRows => return Some(Command::ReloadRows),
            Msg::AddRow => match self.session.begin_insert() {
                Ok(form) => self.modal = Some(Modal::Form(form)),
                Err(error) => self.show_error(&error, None),
            },
            Msg::EditRow => self.open_update_form(),
            Msg::DeleteRow => match self.session.request_delete() {
                Ok(request) => self.modal = Some(Modal::ConfirmDelete(request)),
                Err(error) => self.show_error(&error, None),
            },
            _ => {}
        }
        None
    }

    fn handle_form(&mut self, mut form: RowForm, msg: Msg) -> Option<Command> {
        match msg {
            Msg::Input(ch) => form.push_char(ch),
            Msg::Backspace => form.pop_char(),
            Msg::NextField => form.focus_next(),
            Msg::PreviousField => form.focus_previous(),
            Msg::ToggleNull => form.toggle_null(),
            Msg::Submit => return Some(Command::Apply(form)),
            Msg::Cancel => return None,
            _ => {}
        }
        self.modal = Some(Modal::Form(form));
        None
    }

    fn handle_confirm(&mut self, request: DeleteRequest, msg: Msg) -> Option<Command> {
        match msg {
            Msg::Confirm => Some(Command::ConfirmDelete(request.token)),
            Msg::Cancel => {
                self.session.cancel_delete(&request.token);
                None
            }
            _ => {
                self.modal = Some(Modal::ConfirmDelete(request));
                None
            }
        }
    }

    fn handle_notice(&mut self, modal: Modal, msg: Msg) {
        match (msg, modal) {
            (Msg::Quit, _) => self.should_quit = true,
            (Msg::Submit | Msg::Cancel, Modal::Notice { resume, .. }) => {
                self.modal = resume.map(Modal::Form);
            }
            (Msg::Submit | Msg::Cancel | Msg::ToggleHelp, Modal::Help) => {}
            (_, modal) => self.modal = Some(modal),
        }
    }

    fn navigate(&mut self, direction: DirectionKey) -> Option<Command> {
        match self.pane {
            Pane::Tables => {
                let tables = self.session.tables();
                if tables.is_empty() {
                    return None;
                }
                let last = tables.len() - 1;
                let next = match direction {
                    DirectionKey::Up => self.table_cursor.saturating_sub(1),
                    DirectionKey::Down => (self.table_cursor + 1).min(last),
                    DirectionKey::First => 0,
                    DirectionKey::Last => last,
                };
                if next == self.table_cursor {
                    return None;
                }
                self.table_cursor = next;
                tables.get(next).cloned().map(Command::SelectTable)
            }
            Pane::Grid => {
                let grid = self.session.grid_mut();
                match direction {
                    DirectionKey::Up => grid.move_up(),
                    DirectionKey::Down => grid.move_down(),
                    DirectionKey::First => grid.move_to_first(),
                    DirectionKey::Last => grid.move_to_last(),
                }
                None
            }
        }
    }

    fn open_update_form(&mut self) {
        match self.session.begin_update() {
            Ok(form) => self.modal = Some(Modal::Form(form)),
            Err(error) => self.show_error(&error, None),
        }
    }

    async fn execute(&mut self, command: Command) {
        let result = match command {
            Command::LoadTables => self.session.load_tables().await.map(drop),
            Command::SelectTable(name) => self.session.select_table(&name).await,
            Command::ReloadRows => self.session.reload_rows().await.map(drop),
            Command::Apply(form) => {
                let edit: RowEdit = form.submit();
                if let Err(error) = self.session.apply(edit).await {
                    self.apply_failed(&error, form);
                }
                Ok(())
            }
            Command::ConfirmDelete(token) => self.session.confirm_delete(&token).await.map(drop),
        };

        if let Err(error) = result {
            self.show_error(&error, None);
        }
        self.sync_table_cursor();
    }

    /// The form only comes back when the statement itself was rejected; once a
    /// change went through, submitting again would repeat it.
    fn apply_failed(&mut self, error: &AdminError, form: RowForm) {
        let resume = match error {
            AdminError::ReloadAfterChange { .. } => None,
            _ => Some(form),
        };
        self.show_error(error, resume);
    }

    fn sync_table_cursor(&mut self) {
        let current = self.session.current_table().map(|table| table.name.as_str());
        self.table_cursor = current
            .and_then(|name| self.session.tables().iter().position(|table| table == name))
            .unwrap_or(0);
    }

    fn show_error(&mut self, error: &AdminError, resume: Option<RowForm>) {
        tracing::warn!(%error, "action failed");
        let title = match error {
            AdminError::NoRowSelected => "Select row",
            AdminError::NoTableSelected => "Select table",
            AdminError::ReadOnly(_) => "Read-only",
            _ => "Error",
        };
        let message = match error {
            AdminError::NoRowSelected => "Please select a row first.".to_string(),
            other => other.to_string(),
        };
        self.modal = Some(Modal::Notice {
            title: title.to_string(),
            message,
            resume,
        });
    }
}

/// Runs the admin panel until the user quits and hands the session back so
/// the caller can close the connection.
pub fn run<B>(runtime: &Runtime, session: AdminSession<B>) -> Result<AdminSession<B>, TuiError>
where
    B: ConnectionBackend,
    B::Connection: TableBackend,
{
    let mut terminal = setup_terminal()?;
    let mut app = TuiApp::new(session);
    let run_result = run_loop(&mut terminal, runtime, &mut app);
    let restore_result = restore_terminal(&mut terminal);

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(app.session)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop<B>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    runtime: &Runtime,
    app: &mut TuiApp<B>,
) -> Result<(), TuiError>
where
    B: ConnectionBackend,
    B::Connection: TableBackend,
{
    runtime.block_on(app.execute(Command::LoadTables));

    loop {
        terminal.draw(|frame| render(frame, app))?;

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(message) = map_key_event(key, app.input_mode()) {
                        if let Some(command) = app.handle(message) {
                            // The UI blocks for the round trip.
                            terminal.draw(|frame| render_busy(frame, app))?;
                            runtime.block_on(app.execute(command));
                        }
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn render_busy<B>(frame: &mut Frame<'_>, app: &TuiApp<B>)
where
    B: ConnectionBackend,
    B::Connection: TableBackend,
{
    render(frame, app);
    let area = Rect {
        y: frame.area().bottom().saturating_sub(2),
        height: 1,
        x: frame.area().x + 1,
        width: frame.area().width.saturating_sub(2),
    };
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new("Status: working...").style(Style::default().fg(Color::Yellow)),
        area,
    );
}

fn render<B>(frame: &mut Frame<'_>, app: &TuiApp<B>)
where
    B: ConnectionBackend,
    B::Connection: TableBackend,
{
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(4),
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(TABLE_LIST_WIDTH), Constraint::Min(20)])
        .split(chunks[1]);
    render_table_list(frame, app, body[0]);
    render_grid(frame, app, body[1]);
    render_footer(frame, app, chunks[2]);

    match &app.modal {
        Some(Modal::Form(form)) => render_form(frame, form),
        Some(Modal::ConfirmDelete(request)) => render_confirm(frame, request),
        Some(Modal::Notice { title, message, .. }) => render_notice(frame, title, message),
        Some(Modal::Help) => render_help_popup(frame),
        None => {}
    }
}

fn render_header<B>(frame: &mut Frame<'_>, app: &TuiApp<B>, area: Rect)
where
    B: ConnectionBackend,
    B::Connection: TableBackend,
{
    let status = app.session.connection_status();
    let latency = status
        .last_latency
        .map_or_else(|| "-".to_string(), |latency| format!("{}ms", latency.as_millis()));

    let mut spans = vec![
        Span::styled(
            format!(" Profile: {} ", status.profile_name.as_deref().unwrap_or("-")),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::raw(format!("DB: {}", status.database.as_deref().unwrap_or("-"))),
        Span::raw(" | "),
        Span::raw(format!("Latency: {latency}")),
    ];
    if app.session.is_read_only() {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled("READ-ONLY", Style::default().fg(Color::Red)));
    }

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Database Admin Panel"),
    );
    frame.render_widget(header, area);
}

fn pane_block(title: String, focused: bool) -> Block<'static> {
    let style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(title)
}

fn render_table_list<B>(frame: &mut Frame<'_>, app: &TuiApp<B>, area: Rect)
where
    B: ConnectionBackend,
    B::Connection: TableBackend,
{
    let tables = app.session.tables();
    let items = tables
        .iter()
        .map(|table| ListItem::new(table.as_str()))
        .collect::<Vec<_>>();
    let list = List::new(items)
        .block(pane_block(
            format!("Tables ({})", tables.len()),
            app.pane == Pane::Tables,
        ))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if !tables.is_empty() {
        state.select(Some(app.table_cursor));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_grid<B>(frame: &mut Frame<'_>, app: &TuiApp<B>, area: Rect)
where
    B: ConnectionBackend,
    B::Connection: TableBackend,
{
    let grid = app.session.grid();
    let title = match app.session.current_table() {
        Some(table) if table.key_source() == KeySource::FirstColumn => format!(
            "{} ({} rows, no primary key: first column used as key)",
            table.name,
            grid.len()
        ),
        Some(table) => format!("{} ({} rows)", table.name, grid.len()),
        None => "No table selected".to_string(),
    };
    let block = pane_block(title, app.pane == Pane::Grid);

    if grid.headers().is_empty() {
        frame.render_widget(Paragraph::new("").block(block), area);
        return;
    }

    let height = usize::from(area.height.saturating_sub(3));
    let start = grid.window_start(height);
    let rows = grid
        .visible_rows(start, height)
        .iter()
        .map(|row| TableRow::new(row.values.iter().map(|value| Cell::from(value.to_string()))));
    let header = TableRow::new(grid.headers().iter().map(|name| Cell::from(name.as_str()))).style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    );
    let widths = vec![Constraint::Min(GRID_COLUMN_MIN_WIDTH); grid.headers().len()];

    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = TableState::default();
    if let Some(cursor) = grid.cursor() {
        state.select(Some(cursor - start));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_footer<B>(frame: &mut Frame<'_>, app: &TuiApp<B>, area: Rect)
where
    B: ConnectionBackend,
    B::Connection: TableBackend,
{
    let footer = Paragraph::new(vec![
        Line::from("r: refresh tables | R: reload rows | a: add | e/Enter: edit | d: delete | Tab: pane | ?: help | q: quit"),
        Line::from(format!("Status: {}", app.session.status_line())),
    ])
    .block(Block::default().borders(Borders::ALL).title("Actions"));
    frame.render_widget(footer, area);
}

fn render_form(frame: &mut Frame<'_>, form: &RowForm) {
    let area = centered_rect(60, 70, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from("Tab/arrows: field | Ctrl+N: toggle NULL | Enter: save | Esc: cancel"),
        Line::from(""),
    ];
    for (index, field) in form.fields().iter().enumerate() {
        let focused = index == form.focused();
        let marker = if focused { ">" } else { " " };
        let value = if field.is_null {
            "<NULL>".to_string()
        } else if field.binary.is_some() {
            format!("{} (binary, kept unless retyped)", field.text)
        } else if focused {
            format!("{}_", field.text)
        } else {
            field.text.clone()
        };
        let style = if focused {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::styled(format!("{marker} {}", field.column), style),
            Span::styled(
                format!(" ({}) ", field.data_type),
                Style::default().fg(Color::DarkGray),
            ),
            Span::raw(value),
        ]));
    }

    let form_view = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(form.title()))
        .wrap(Wrap { trim: false });
    frame.render_widget(form_view, area);
}

fn render_confirm(frame: &mut Frame<'_>, request: &DeleteRequest) {
    let area = centered_rect(50, 25, frame.area());
    frame.render_widget(Clear, area);
    let confirm = Paragraph::new(vec![
        Line::from(request.prompt()),
        Line::from(""),
        Line::from("y/Enter: delete | n/Esc: cancel"),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title("Confirm Delete"),
    )
    .wrap(Wrap { trim: true });
    frame.render_widget(confirm, area);
}

fn render_notice(frame: &mut Frame<'_>, title: &str, message: &str) {
    let area = centered_rect(60, 30, frame.area());
    frame.render_widget(Clear, area);
    let notice = Paragraph::new(vec![
        Line::from(message.to_string()),
        Line::from(""),
        Line::from("Enter/Esc: dismiss"),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title(title.to_string()),
    )
    .wrap(Wrap { trim: true });
    frame.render_widget(notice, area);
}

fn render_help_popup(frame: &mut Frame<'_>) {
    let area = centered_rect(70, 60, frame.area());
    frame.render_widget(Clear, area);
    let help = Paragraph::new(vec![
        Line::from("Keymap"),
        Line::from("q: quit"),
        Line::from("?: toggle help"),
        Line::from("Tab: switch between table list and rows"),
        Line::from("Arrows or j/k, g/G: move (in table list this selects the table)"),
        Line::from("r: refresh table list"),
        Line::from("R: reload rows of the selected table"),
        Line::from("a: add row | e or Enter: edit row | d: delete row"),
        Line::from("In forms: Tab/arrows move, Ctrl+N toggles NULL, Enter saves, Esc cancels"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    frame.render_widget(help, area);
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

fn map_key_event(key: KeyEvent, mode: InputMode) -> Option<Msg> {
    match mode {
        InputMode::Browse => map_browse_key(key),
        InputMode::Form => map_form_key(key),
        InputMode::Confirm => match key.code {
            KeyCode::Char('y' | 'Y') | KeyCode::Enter => Some(Msg::Confirm),
            KeyCode::Char('n' | 'N') | KeyCode::Esc => Some(Msg::Cancel),
            _ => None,
        },
        InputMode::Notice => match key.code {
            KeyCode::Enter => Some(Msg::Submit),
            KeyCode::Esc => Some(Msg::Cancel),
            KeyCode::Char('?') => Some(Msg::ToggleHelp),
            KeyCode::Char('q') => Some(Msg::Quit),
            _ => None,
        },
    }
}

fn map_browse_key(key: KeyEvent) -> Option<Msg> {
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) | (_, KeyCode::Char('q')) => Some(Msg::Quit),
        (_, KeyCode::Char('?')) => Some(Msg::ToggleHelp),
        (_, KeyCode::Tab) => Some(Msg::NextPane),
        (_, KeyCode::Enter) => Some(Msg::Activate),
        (_, KeyCode::Char('r')) => Some(Msg::RefreshTables),
        (_, KeyCode::Char('R') | KeyCode::F(5)) => Some(Msg::ReloadRows),
        (_, KeyCode::Char('a')) => Some(Msg::AddRow),
        (_, KeyCode::Char('e')) => Some(Msg::EditRow),
        (_, KeyCode::Char('d') | KeyCode::Delete) => Some(Msg::DeleteRow),
        (_, KeyCode::Up | KeyCode::Char('k')) => Some(Msg::Navigate(DirectionKey::Up)),
        (_, KeyCode::Down | KeyCode::Char('j')) => Some(Msg::Navigate(DirectionKey::Down)),
        (_, KeyCode::Home | KeyCode::Char('g')) => Some(Msg::Navigate(DirectionKey::First)),
        (_, KeyCode::End | KeyCode::Char('G')) => Some(Msg::Navigate(DirectionKey::Last)),
        _ => None,
    }
}

fn map_form_key(key: KeyEvent) -> Option<Msg> {
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('n')) => Some(Msg::ToggleNull),
        (_, KeyCode::Esc) => Some(Msg::Cancel),
        (_, KeyCode::Enter) => Some(Msg::Submit),
        (_, KeyCode::Tab | KeyCode::Down) => Some(Msg::NextField),
        (_, KeyCode::BackTab | KeyCode::Up) => Some(Msg::PreviousField),
        (_, KeyCode::Backspace) => Some(Msg::Backspace),
        (modifiers, KeyCode::Char(ch)) if !modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Msg::Input(ch))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use dbadmin_adapters::memory::{MemoryBackend, MemoryDatabase};
    use dbadmin_core::connection_manager::ConnectionManager;
    use dbadmin_core::profiles::ConnectionProfile;
    use dbadmin_core::schema::{FieldValue, Row};
    use dbadmin_core::session::{AdminError, AdminSession};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    use super::{map_key_event, render, Command, InputMode, Modal, Msg, Pane, TuiApp};

    async fn demo_app(profile: ConnectionProfile) -> TuiApp<MemoryBackend> {
        let mut manager =
            ConnectionManager::new(MemoryBackend::new(MemoryDatabase::movie_theatre()));
        manager.connect(profile).await.expect("connect should succeed");
        let mut app = TuiApp::new(AdminSession::new(manager));
        app.execute(Command::LoadTables).await;
        app
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    async fn send(app: &mut TuiApp<MemoryBackend>, msg: Msg) {
        if let Some(command) = app.handle(msg) {
            app.execute(command).await;
        }
    }

    async fn type_text(app: &mut TuiApp<MemoryBackend>, text: &str) {
        for ch in text.chars() {
            send(app, Msg::Input(ch)).await;
        }
    }

    async fn select_movies(app: &mut TuiApp<MemoryBackend>) {
        send(app, Msg::Navigate(super::DirectionKey::Down)).await;
        assert_eq!(
            app.session.current_table().map(|table| table.name.as_str()),
            Some("movies")
        );
        send(app, Msg::NextPane).await;
    }

    fn draw(app: &TuiApp<MemoryBackend>) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).expect("test terminal");
        terminal
            .draw(|frame| render(frame, app))
            .expect("draw should succeed");

        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    fn ids(app: &TuiApp<MemoryBackend>) -> Vec<String> {
        app.session
            .grid()
            .rows()
            .iter()
            .map(|row| row.values[0].to_string())
            .collect()
    }

    #[test]
    fn pane_cycles_between_tables_and_grid() {
        assert_eq!(Pane::Tables.next(), Pane::Grid);
        assert_eq!(Pane::Grid.next(), Pane::Tables);
    }

    #[test]
    fn browse_keymap_covers_crud_actions() {
        assert_eq!(
            map_key_event(key(KeyCode::Char('q')), InputMode::Browse),
            Some(Msg::Quit)
        );
        assert_eq!(
            map_key_event(key(KeyCode::Char('a')), InputMode::Browse),
            Some(Msg::AddRow)
        );
        assert_eq!(
            map_key_event(key(KeyCode::Char('e')), InputMode::Browse),
            Some(Msg::EditRow)
        );
        assert_eq!(
            map_key_event(key(KeyCode::Char('d')), InputMode::Browse),
            Some(Msg::DeleteRow)
        );
        assert_eq!(
            map_key_event(key(KeyCode::Char('r')), InputMode::Browse),
            Some(Msg::RefreshTables)
        );
    }

    #[test]
    fn form_keymap_treats_letters_as_input() {
        assert_eq!(
            map_key_event(key(KeyCode::Char('q')), InputMode::Form),
            Some(Msg::Input('q'))
        );
        assert_eq!(
            map_key_event(
                KeyEvent::new(KeyCode::Char('n'), KeyModifiers::CONTROL),
                InputMode::Form
            ),
            Some(Msg::ToggleNull)
        );
        assert_eq!(
            map_key_event(key(KeyCode::Esc), InputMode::Form),
            Some(Msg::Cancel)
        );
        assert_eq!(
            map_key_event(key(KeyCode::Char('y')), InputMode::Confirm),
            Some(Msg::Confirm)
        );
    }

    #[tokio::test]
    async fn startup_selects_first_table() {
        let app = demo_app(ConnectionProfile::local_default()).await;
        assert_eq!(app.table_cursor, 0);
        assert_eq!(
            app.session.current_table().map(|table| table.name.as_str()),
            Some("customers")
        );
        assert_eq!(app.session.grid().len(), 2);
    }

    #[tokio::test]
    async fn add_edit_delete_through_key_messages() {
        let mut app = demo_app(ConnectionProfile::local_default()).await;
        select_movies(&mut app).await;

        send(&mut app, Msg::AddRow).await;
        assert!(matches!(app.modal, Some(Modal::Form(_))));
        type_text(&mut app, "4").await;
        send(&mut app, Msg::NextField).await;
        type_text(&mut app, "Tenet").await;
        send(&mut app, Msg::NextField).await;
        type_text(&mut app, "2020").await;
        send(&mut app, Msg::Submit).await;
        assert!(app.modal.is_none());
        assert!(app
            .session
            .grid()
            .rows()
            .contains(&Row::new(vec!["4".into(), "Tenet".into(), "2020".into()])));

        send(&mut app, Msg::Navigate(super::DirectionKey::Last)).await;
        send(&mut app, Msg::Activate).await;
        send(&mut app, Msg::NextField).await;
        type_text(&mut app, " (IMAX)").await;
        send(&mut app, Msg::Submit).await;
        assert!(app.session.grid().rows().contains(&Row::new(vec![
            "4".into(),
            "Tenet (IMAX)".into(),
            "2020".into()
        ])));

        send(&mut app, Msg::DeleteRow).await;
        let Some(Modal::ConfirmDelete(request)) = &app.modal else {
            panic!("expected delete confirmation");
        };
        assert_eq!(request.prompt(), "Delete row where id=4?");
        send(&mut app, Msg::Confirm).await;
        assert!(app.modal.is_none());
        assert_eq!(ids(&app), ["1", "2", "3"]);
    }

    #[tokio::test]
    async fn cancelled_delete_keeps_rows() {
        let mut app = demo_app(ConnectionProfile::local_default()).await;
        select_movies(&mut app).await;

        send(&mut app, Msg::DeleteRow).await;
        send(&mut app, Msg::Cancel).await;
        assert!(app.modal.is_none());
        assert_eq!(ids(&app), ["1", "2", "3"]);
        assert_eq!(app.session.status_line(), "Delete cancelled.");
    }

    #[tokio::test]
    async fn failed_insert_reports_error_and_reopens_form() {
        let mut app = demo_app(ConnectionProfile::local_default()).await;
        select_movies(&mut app).await;

        send(&mut app, Msg::AddRow).await;
        type_text(&mut app, "1").await;
        send(&mut app, Msg::NextField).await;
        type_text(&mut app, "Duplicate").await;
        send(&mut app, Msg::Submit).await;

        let Some(Modal::Notice { title, message, resume }) = &app.modal else {
            panic!("expected error notice");
        };
        assert_eq!(title, "Error");
        assert_eq!(message, "Duplicate entry '1' for key 'PRIMARY'");
        assert!(resume.is_some());
        assert_eq!(app.session.grid().len(), 3);

        send(&mut app, Msg::Cancel).await;
        let Some(Modal::Form(form)) = &app.modal else {
            panic!("expected form to come back");
        };
        assert_eq!(form.fields()[1].value(), FieldValue::text("Duplicate"));
    }

    #[tokio::test]
    async fn edit_on_empty_table_asks_for_selection() {
        let mut app = demo_app(ConnectionProfile::local_default()).await;
        select_movies(&mut app).await;
        for _ in 0..3 {
            send(&mut app, Msg::DeleteRow).await;
            send(&mut app, Msg::Confirm).await;
        }
        assert!(app.session.grid().is_empty());

        send(&mut app, Msg::EditRow).await;
        let Some(Modal::Notice { title, .. }) = &app.modal else {
            panic!("expected warning notice");
        };
        assert_eq!(title, "Select row");
        send(&mut app, Msg::Submit).await;
        assert!(app.modal.is_none());
    }

    #[tokio::test]
    async fn read_only_profile_refuses_add() {
        let mut profile = ConnectionProfile::local_default();
        profile.read_only = true;
        let mut app = demo_app(profile).await;

        send(&mut app, Msg::AddRow).await;
        let Some(Modal::Notice { title, .. }) = &app.modal else {
            panic!("expected read-only notice");
        };
        assert_eq!(title, "Read-only");
    }

    #[tokio::test]
    async fn renders_tables_grid_and_status() {
        let mut app = demo_app(ConnectionProfile::local_default()).await;
        select_movies(&mut app).await;

        let screen = draw(&app);
        assert!(screen.contains("customers"));
        assert!(screen.contains("Interstellar"));
        assert!(screen.contains("Table: movies (3 columns, 3 rows)"));
    }

    #[tokio::test]
    async fn table_without_primary_key_is_flagged_on_screen() {
        let mut app = demo_app(ConnectionProfile::local_default()).await;
        send(&mut app, Msg::Navigate(super::DirectionKey::Last)).await;
        assert_eq!(
            app.session.current_table().map(|table| table.name.as_str()),
            Some("showtimes")
        );

        let screen = draw(&app);
        assert!(screen.contains("no primary key: first column used as key"));
        assert!(screen.contains("rows are matched on the first column"));
    }

    #[tokio::test]
    async fn form_is_not_reopened_once_the_change_went_through() {
        let mut app = demo_app(ConnectionProfile::local_default()).await;
        let form = app.session.begin_insert().expect("insert form");
        let error = AdminError::ReloadAfterChange {
            affected: 1,
            source: Box::new(AdminError::NoTableSelected),
        };

        app.apply_failed(&error, form);
        let Some(Modal::Notice { message, resume, .. }) = &app.modal else {
            panic!("expected error notice");
        };
        assert!(message.starts_with("1 row(s) changed"));
        assert!(resume.is_none());

        send(&mut app, Msg::Submit).await;
        assert!(app.modal.is_none());
    }
}
