//! Ratatui-based terminal UI.
//!
//! The TUI drives the same session pipeline as `alps fit`:
//!
//! - a catalog panel (sample or personal) to choose and confirm a dataset
//! - a parameter panel bound to the compute form, with a submit action
//! - two export panels (data, image) that only act when a result exists
//! - a chart of the current result, one Plotters panel per figure panel

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
};

use crate::app::pipeline::{Session, new_form};
use crate::cli::TuiArgs;
use crate::cli::picker::entry_name;
use crate::domain::{ArtifactKind, CatalogKind, DatasetHandle, FitMethod};
use crate::error::AppError;
use crate::fit::PsplineEngine;
use crate::form::{ComputeForm, ExportControls, ParameterSet};

mod plotters_chart;

use plotters_chart::PanelChart;

/// Start the TUI on an open session.
pub fn run(session: &mut Session, args: TuiArgs) -> Result<(), AppError> {
    let mut app = App::new(session, args.method);
    if !args.upload.files.is_empty() {
        app.upload(&args.upload.files);
    }

    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(5, format!("Failed to initialize terminal: {e}")))?;

    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(5, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(5, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

/// Which panel receives keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Catalog,
    Params,
    DataExport,
    ImageExport,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Catalog => Focus::Params,
            Focus::Params => Focus::DataExport,
            Focus::DataExport => Focus::ImageExport,
            Focus::ImageExport => Focus::Catalog,
        }
    }

    fn prev(self) -> Self {
        match self {
            Focus::Catalog => Focus::ImageExport,
            Focus::Params => Focus::Catalog,
            Focus::DataExport => Focus::Params,
            Focus::ImageExport => Focus::DataExport,
        }
    }

    fn is_export(self) -> bool {
        matches!(self, Focus::DataExport | Focus::ImageExport)
    }
}

struct App<'s> {
    session: &'s mut Session,
    /// Filled by the selector's dataset-changed notification.
    loaded: Rc<RefCell<Option<Arc<DatasetHandle>>>>,
    /// Parameters edited before any dataset is loaded.
    draft: ParameterSet,
    form: Option<ComputeForm<PsplineEngine>>,
    focus: Focus,
    catalog_idx: usize,
    param_idx: usize,
    data_export: ExportControls,
    image_export: ExportControls,
    status: String,
}

impl<'s> App<'s> {
    fn new(session: &'s mut Session, method: FitMethod) -> Self {
        let loaded = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&loaded);
        session
            .selector
            .subscribe(move |dataset: &Arc<DatasetHandle>| *sink.borrow_mut() = Some(Arc::clone(dataset)));
        session.selector.show_catalog(CatalogKind::Sample);

        Self {
            session,
            loaded,
            draft: ParameterSet::preset(method),
            form: None,
            focus: Focus::Catalog,
            catalog_idx: 0,
            param_idx: 0,
            data_export: ExportControls::new(ArtifactKind::Data),
            image_export: ExportControls::new(ArtifactKind::Image),
            status: "s/p: sample/personal catalog  Enter: load".to_string(),
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(5, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(5, format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::new(5, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Apply one key press. Returns `true` to quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Tab => {
                self.focus = self.focus.next();
                return false;
            }
            KeyCode::BackTab => {
                self.focus = self.focus.prev();
                return false;
            }
            _ => {}
        }

        if self.focus.is_export() {
            self.handle_export_key(code);
            return false;
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('s') => self.show_catalog(CatalogKind::Sample),
            KeyCode::Char('p') => self.show_catalog(CatalogKind::Personal),
            KeyCode::Char('m') => self.cycle_method(),
            KeyCode::Char('r') => self.submit(),
            KeyCode::Up => self.move_cursor(-1),
            KeyCode::Down => self.move_cursor(1),
            KeyCode::Left if self.focus == Focus::Params => self.adjust_field(-1),
            KeyCode::Right if self.focus == Focus::Params => self.adjust_field(1),
            KeyCode::Enter => match self.focus {
                Focus::Catalog => self.confirm(),
                _ => self.submit(),
            },
            _ => {}
        }
        false
    }

    fn handle_export_key(&mut self, code: KeyCode) {
        let controls = match self.focus {
            Focus::ImageExport => &mut self.image_export,
            _ => &mut self.data_export,
        };
        match code {
            KeyCode::Esc => self.focus = Focus::Params,
            KeyCode::Backspace => {
                controls.filename.pop();
            }
            KeyCode::Left | KeyCode::Right => controls.cycle_format(),
            KeyCode::Enter => self.export(),
            KeyCode::Char(c) if !c.is_control() => controls.filename.push(c),
            _ => {}
        }
    }

    fn show_catalog(&mut self, kind: CatalogKind) {
        let n = self.session.selector.show_catalog(kind).len();
        self.catalog_idx = 0;
        self.focus = Focus::Catalog;
        if n > 0 {
            self.session.selector.select(Some(0));
        }
        self.status = format!("{} catalog: {n} file(s)", kind.display_name());
    }

    fn move_cursor(&mut self, delta: i32) {
        match self.focus {
            Focus::Catalog => {
                let n = self.session.selector.catalog().len();
                if n == 0 {
                    return;
                }
                self.catalog_idx = step_index(self.catalog_idx, delta, n);
                self.session.selector.select(Some(self.catalog_idx));
            }
            Focus::Params => {
                let n = self.params().controls().len();
                self.param_idx = step_index(self.param_idx, delta, n);
            }
            _ => {}
        }
    }

    fn confirm(&mut self) {
        if !self.session.selector.confirm_enabled() {
            self.status = "Choose a file first.".to_string();
            return;
        }
        match self.session.selector.confirm() {
            Ok(dataset) => {
                self.status = format!(
                    "Loaded {} ({} rows). r: run fit",
                    dataset.file_name(),
                    dataset.payload.n_rows()
                );
                self.take_loaded();
            }
            Err(e) => self.status = format!("Load failed: {}", e.report()),
        }
    }

    /// Rebuild the form when the selector announced a new dataset.
    ///
    /// Current parameter values carry over; the previous result does not.
    fn take_loaded(&mut self) {
        let Some(dataset) = self.loaded.borrow_mut().take() else {
            return;
        };
        let params = self.params().clone();
        self.form = Some(new_form(dataset, params));
    }

    fn params(&self) -> &ParameterSet {
        self.form.as_ref().map(|f| f.params()).unwrap_or(&self.draft)
    }

    fn cycle_method(&mut self) {
        let method = self.params().method().next();
        let params = ParameterSet::preset(method);
        self.param_idx = 0;
        match self.form.as_mut() {
            Some(form) => {
                let dataset = self.session.selector.dataset().cloned();
                if let Some(dataset) = dataset {
                    *form = new_form(dataset, params);
                }
            }
            None => self.draft = params,
        }
        self.status = format!("method: {}", method.display_name());
    }

    fn adjust_field(&mut self, delta: i32) {
        let Some(key) = self.params().controls().get(self.param_idx).map(|c| c.key) else {
            return;
        };
        let outcome = match self.form.as_mut() {
            Some(form) => form.adjust_param(key, delta),
            None => self.draft.adjust(key, delta),
        };
        self.status = match outcome {
            Ok(value) => format!("{}: {}", key.label(), fmt_value(key.is_integer(), value)),
            Err(e) => e.to_string(),
        };
    }

    fn submit(&mut self) {
        let Some(form) = self.form.as_mut() else {
            self.status = "Load a dataset before running a fit.".to_string();
            return;
        };
        self.status = match form.submit() {
            Ok(result) => format!("Fit done: {}", result.artifact_data.names().join(", ")),
            Err(e) => e.report(),
        };
    }

    fn export(&mut self) {
        let controls = match self.focus {
            Focus::ImageExport => &self.image_export,
            _ => &self.data_export,
        };
        let Some(result) = self
            .form
            .as_ref()
            .filter(|f| f.export_enabled(controls))
            .and_then(|f| f.result())
        else {
            self.status = "Export needs a current fit result and a file name.".to_string();
            return;
        };

        self.status = match self.session.exporter.export(result, &controls.filename, controls.format) {
            Ok(path) => format!("Exported {}", path.display()),
            Err(e) => e.report(),
        };
    }

    fn upload(&mut self, files: &[std::path::PathBuf]) {
        let report = self.session.selector.upload_paths(files);
        self.status = format!("Uploaded {} file(s), rejected {}", report.stored.len(), report.rejected.len());
        if let Some((name, err)) = report.rejected.first() {
            self.status.push_str(&format!(" ({name}: {err})"));
        }
        if !report.stored.is_empty() {
            let status = std::mem::take(&mut self.status);
            self.show_catalog(CatalogKind::Personal);
            self.status = status;
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let dataset = self
            .session
            .selector
            .dataset()
            .map(|d| format!("{} ({} rows)", d.file_name(), d.payload.n_rows()))
            .unwrap_or_else(|| "-".to_string());
        let result = match &self.form {
            Some(f) if f.has_current_result() => "current",
            Some(f) if f.last_error().is_some() => "failed",
            _ => "-",
        };

        let line = Line::from(vec![
            Span::styled("alps", Style::default().fg(Color::Cyan)),
            Span::styled(
                format!(
                    "  dataset: {dataset} | method: {} | result: {result}",
                    self.params().method().display_name()
                ),
                Style::default().fg(Color::Gray),
            ),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(40), Constraint::Min(0)])
            .split(area);

        let n_controls = self.params().controls().len() as u16;
        let side = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(4),
                Constraint::Length(n_controls + 2),
                Constraint::Length(3),
                Constraint::Length(3),
            ])
            .split(columns[0]);

        self.draw_catalog(frame, side[0]);
        self.draw_params(frame, side[1]);
        self.draw_export(frame, side[2], Focus::DataExport, &self.data_export, "Export data");
        self.draw_export(frame, side[3], Focus::ImageExport, &self.image_export, "Export image");
        self.draw_chart(frame, columns[1]);
    }

    fn draw_catalog(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let selector = &self.session.selector;
        let loaded = selector.dataset().map(|d| d.source_path.as_path());
        let items: Vec<ListItem> = selector
            .catalog()
            .iter()
            .map(|path| {
                let mark = if Some(path.as_path()) == loaded { "* " } else { "  " };
                ListItem::new(format!("{mark}{}", entry_name(path)))
            })
            .collect();
        let title = match selector.catalog_kind() {
            Some(kind) => format!("{} catalog", kind.display_name()),
            None => "Catalog".to_string(),
        };

        let list = List::new(items)
            .block(focused_block(title, self.focus == Focus::Catalog))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");
        let mut state = ListState::default();
        state.select(selector.chosen().and(Some(self.catalog_idx)));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_params(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let params = self.params();
        let items: Vec<ListItem> = params
            .controls()
            .iter()
            .map(|c| {
                ListItem::new(format!(
                    "{:<24}{:>10}",
                    c.key.label(),
                    fmt_value(c.key.is_integer(), c.value)
                ))
            })
            .collect();

        let list = List::new(items)
            .block(focused_block(
                format!("{} parameters", params.method().display_name()),
                self.focus == Focus::Params,
            ))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");
        let mut state = ListState::default();
        if self.focus == Focus::Params {
            state.select(Some(self.param_idx));
        }
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_export(
        &self,
        frame: &mut ratatui::Frame<'_>,
        area: Rect,
        focus: Focus,
        controls: &ExportControls,
        title: &str,
    ) {
        let enabled = self.form.as_ref().is_some_and(|f| f.export_enabled(controls));
        let style = if enabled {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let cursor = if self.focus == focus { "_" } else { "" };
        let line = Line::from(vec![
            Span::raw(format!("{}{cursor}", controls.filename)),
            Span::styled(format!("  .{}", controls.format.extension()), style),
        ]);
        let p = Paragraph::new(line).block(focused_block(title.to_string(), self.focus == focus));
        frame.render_widget(p, area);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let Some(result) = self.form.as_ref().and_then(|f| f.result()) else {
            let block = Block::default().title("Result").borders(Borders::ALL);
            let inner = block.inner(area);
            frame.render_widget(block, area);
            let msg = match self.form.as_ref().and_then(|f| f.last_error()) {
                Some(err) => Paragraph::new(format!("Fit failed: {err}")).style(Style::default().fg(Color::Red)),
                None => Paragraph::new("No result yet.").style(Style::default().fg(Color::Yellow)),
            };
            frame.render_widget(msg, inner);
            return;
        };

        let panels = &result.renderable.panels;
        let constraints: Vec<Constraint> = panels.iter().map(|_| Constraint::Ratio(1, panels.len() as u32)).collect();
        let areas = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(constraints)
            .split(area);

        for (panel, rect) in panels.iter().zip(areas.iter()) {
            let block = Block::default().title(panel.title.as_str()).borders(Borders::ALL);
            let inner = block.inner(*rect);
            frame.render_widget(block, *rect);
            frame.render_widget(Clear, inner);
            frame.render_widget(PanelChart { panel }, inner);
        }
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = if self.focus.is_export() {
            "type name  ←/→ format  Enter export  Esc back  Tab next"
        } else {
            "Tab panel  ↑/↓ select  ←/→ adjust  Enter load/run  s/p catalog  m method  r run  q quit"
        };
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(Text::from(line)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

fn focused_block(title: String, focused: bool) -> Block<'static> {
    let style = if focused {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Block::default().title(title).borders(Borders::ALL).border_style(style)
}

fn step_index(current: usize, delta: i32, len: usize) -> usize {
    if delta < 0 {
        current.saturating_sub(1)
    } else {
        (current + 1).min(len.saturating_sub(1))
    }
}

fn fmt_value(integer: bool, value: f64) -> String {
    if integer { format!("{}", value as i64) } else { format!("{value:.2}") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SampleConfig, write_sample};
    use crate::io::DatasetResolver;
    use crate::session::{SessionConfig, SessionStorage};
    use tempfile::tempdir;

    fn type_text(app: &mut App<'_>, text: &str) {
        for c in text.chars() {
            app.handle_key(KeyCode::Char(c));
        }
    }

    #[test]
    fn load_fit_and_export_through_keys() {
        let tmp = tempdir().unwrap();
        write_sample(tmp.path(), "sample.csv", &SampleConfig::default(), &DatasetResolver::default()).unwrap();
        let storage = SessionStorage::new(SessionConfig::local(tmp.path()));
        let mut session = Session::open(&storage).unwrap();
        let results = session.paths.results_dir.clone();
        let mut app = App::new(&mut session, FitMethod::Gcv);

        app.handle_key(KeyCode::Char('s'));
        app.handle_key(KeyCode::Enter);
        assert!(app.form.is_some(), "status: {}", app.status);

        app.handle_key(KeyCode::Tab);
        app.handle_key(KeyCode::Tab);
        assert_eq!(app.focus, Focus::DataExport);
        type_text(&mut app, "out");
        app.handle_key(KeyCode::Enter);
        assert!(app.status.starts_with("Export needs"));
        assert_eq!(std::fs::read_dir(&results).unwrap().count(), 0);

        app.handle_key(KeyCode::Esc);
        app.handle_key(KeyCode::Char('r'));
        assert!(app.status.starts_with("Fit done"), "status: {}", app.status);

        app.handle_key(KeyCode::Tab);
        app.handle_key(KeyCode::Enter);
        assert!(results.join("out.csv").is_file(), "status: {}", app.status);
    }

    #[test]
    fn quit_keys_are_text_inside_export_fields() {
        let tmp = tempdir().unwrap();
        let storage = SessionStorage::new(SessionConfig::local(tmp.path()));
        let mut session = Session::open(&storage).unwrap();
        let mut app = App::new(&mut session, FitMethod::Reml);

        app.focus = Focus::ImageExport;
        assert!(!app.handle_key(KeyCode::Char('q')));
        assert_eq!(app.image_export.filename, "q");
        app.handle_key(KeyCode::Right);
        assert_eq!(app.image_export.format.extension(), "svg");

        app.handle_key(KeyCode::Esc);
        assert!(app.handle_key(KeyCode::Char('q')));
    }

    #[test]
    fn draft_parameters_carry_into_the_form() {
        let tmp = tempdir().unwrap();
        write_sample(tmp.path(), "sample.csv", &SampleConfig::default(), &DatasetResolver::default()).unwrap();
        let storage = SessionStorage::new(SessionConfig::local(tmp.path()));
        let mut session = Session::open(&storage).unwrap();
        let mut app = App::new(&mut session, FitMethod::Gcv);

        app.focus = Focus::Params;
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::Right);
        assert_eq!(app.draft.value(crate::form::ParamKey::Count), Some(210.0));

        app.handle_key(KeyCode::Char('s'));
        app.handle_key(KeyCode::Enter);
        let form = app.form.as_ref().unwrap();
        assert_eq!(form.params().value(crate::form::ParamKey::Count), Some(210.0));
        assert!(!form.has_current_result());
    }
}
