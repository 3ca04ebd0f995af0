//! App — owns the controllers, routes keys to the focused pane and turns
//! controller state changes into redraws and toasts.
//!
//! Controllers publish through `watch` channels; the main loop selects on
//! them directly next to terminal input, so nothing is polled.  One-shot
//! requests (start, auth, verify, library) run on spawned tasks and report
//! back through `AppMessage`.

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    Frame, Terminal,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vibe_client::{
    ApiClient, SearchController, SearchOutcome, StageController, StageError, StageState,
};
use vibe_proto::protocol::{ChannelStatus, LibraryStats, Stage, StartResponse, VerifyReport};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    components::{auth_panel::AuthPanel, search_panel::SearchPanel, stage_panel::StagePanel},
    focus::FocusRing,
    widgets::{
        status_bar::{draw_header, draw_keys_bar, InputMode},
        toast::{Severity, ToastManager},
    },
};

/// Results of background work, sent back to the main loop.
#[derive(Debug)]
pub enum AppMessage {
    Event(Event),
    Started(Stage, StartResponse),
    StartFailed(Stage, Severity, String),
    Health(bool),
    AuthStatus(bool),
    AuthUrl(Result<String, String>),
    AuthExchanged(Result<(), String>),
    Library(LibraryStats),
    Verified(Result<VerifyReport, String>),
}

const PANES: [ComponentId; 5] = [
    ComponentId::Auth,
    ComponentId::Sync,
    ComponentId::Download,
    ComponentId::Embed,
    ComponentId::Search,
];

pub struct App {
    api: ApiClient,
    sync: StageController,
    download: StageController,
    embed: StageController,
    search: SearchController,
    /// OAuth code from the command line, exchanged once at startup.
    startup_code: Option<String>,

    state: AppState,
    focus: FocusRing,
    auth_panel: AuthPanel,
    sync_panel: StagePanel,
    download_panel: StagePanel,
    embed_panel: StagePanel,
    search_panel: SearchPanel,
    toast: ToastManager,
    /// Run epoch whose end was last toasted, per stage.
    announced: HashMap<Stage, u64>,

    tx: Option<mpsc::Sender<AppMessage>>,
    should_quit: bool,
}

fn completion_message(stage: Stage) -> &'static str {
    match stage {
        Stage::Sync => "Sync complete! Playlist updated.",
        Stage::Download => "Download complete!",
        Stage::Embed => "Embeddings generated!",
    }
}

fn failure_message(stage: Stage) -> &'static str {
    match stage {
        Stage::Sync => "Error syncing playlist",
        Stage::Download => "Error downloading songs",
        Stage::Embed => "Error generating embeddings",
    }
}

/// Toast for a start call that did not start anything.
fn start_failure(stage: Stage, err: StageError) -> (Severity, String) {
    match err {
        StageError::Rejected(message) => (Severity::Warning, message),
        StageError::AlreadyRunning(_) | StageError::InvalidInput(_) => {
            (Severity::Warning, err.to_string())
        }
        StageError::WrongStage { .. } => (Severity::Error, err.to_string()),
        StageError::Api(e) => (
            Severity::Error,
            format!("{} failed to start: {}", stage, e.user_message()),
        ),
    }
}

impl App {
    pub fn new(
        api: ApiClient,
        sync: StageController,
        download: StageController,
        embed: StageController,
        search: SearchController,
        startup_code: Option<String>,
    ) -> Self {
        let state = AppState {
            api_base: api.base().to_string(),
            ..AppState::default()
        };
        Self {
            api,
            sync,
            download,
            embed,
            search,
            startup_code,
            state,
            focus: FocusRing::new(&PANES),
            auth_panel: AuthPanel::new(),
            sync_panel: StagePanel::new(Stage::Sync, '2'),
            download_panel: StagePanel::new(Stage::Download, '3'),
            embed_panel: StagePanel::new(Stage::Embed, '4'),
            search_panel: SearchPanel::new(),
            toast: ToastManager::new(),
            announced: HashMap::new(),
            tx: None,
            should_quit: false,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        debug!("run(): enabling raw mode");
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        debug!("run(): terminal created, size={:?}", terminal.size());

        let result = self.event_loop(&mut terminal).await;

        // ── Teardown ──────────────────────────────────────────────────────────
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> anyhow::Result<()> {
        let (tx, mut rx) = mpsc::channel::<AppMessage>(256);
        self.tx = Some(tx.clone());

        // ── Background task: keyboard events ──────────────────────────────────
        let event_tx = tx.clone();
        tokio::task::spawn_blocking(move || loop {
            match event::read() {
                Ok(ev) => {
                    if event_tx.blocking_send(AppMessage::Event(ev)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });

        // ── Startup requests ──────────────────────────────────────────────────
        self.check_health();
        match self.startup_code.take() {
            Some(code) => self.dispatch(Action::SubmitAuthCode(code)),
            None => self.dispatch(Action::RefreshAuth),
        }
        self.dispatch(Action::RefreshLibrary);

        let mut sync_rx = self.sync.subscribe();
        let mut download_rx = self.download.subscribe();
        let mut embed_rx = self.embed.subscribe();
        let mut search_rx = self.search.subscribe();

        // Toast expiry + spinner animation.
        let mut toast_tick = tokio::time::interval(Duration::from_millis(100));
        toast_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // ── Main loop ─────────────────────────────────────────────────────────
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal.draw(|f| self.draw(f))?;
            }
            needs_redraw = false;

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(msg) = rx.recv() => {
                    needs_redraw = self.handle_message(msg);
                    // Drain whatever queued up behind it before drawing.
                    while let Ok(msg) = rx.try_recv() {
                        needs_redraw |= self.handle_message(msg);
                    }
                }

                Ok(()) = sync_rx.changed() => {
                    let st = sync_rx.borrow_and_update().clone();
                    self.on_stage_state(Stage::Sync, st);
                    needs_redraw = true;
                }

                Ok(()) = download_rx.changed() => {
                    let st = download_rx.borrow_and_update().clone();
                    self.on_stage_state(Stage::Download, st);
                    needs_redraw = true;
                }

                Ok(()) = embed_rx.changed() => {
                    let st = embed_rx.borrow_and_update().clone();
                    self.on_stage_state(Stage::Embed, st);
                    needs_redraw = true;
                }

                Ok(()) = search_rx.changed() => {
                    self.state.search = search_rx.borrow_and_update().clone();
                    needs_redraw = true;
                }

                _ = toast_tick.tick() => {
                    needs_redraw = self.toast.tick();
                }
            }
        }

        info!("UI loop finished");
        Ok(())
    }

    fn controller(&self, stage: Stage) -> &StageController {
        match stage {
            Stage::Sync => &self.sync,
            Stage::Download => &self.download,
            Stage::Embed => &self.embed,
        }
    }

    fn component_mut(&mut self, id: ComponentId) -> &mut dyn Component {
        match id {
            ComponentId::Auth => &mut self.auth_panel,
            ComponentId::Sync => &mut self.sync_panel,
            ComponentId::Download => &mut self.download_panel,
            ComponentId::Embed => &mut self.embed_panel,
            ComponentId::Search => &mut self.search_panel,
        }
    }

    /// Store a stage's new state; toast once per finished run.
    fn on_stage_state(&mut self, stage: Stage, st: StageState) {
        *self.state.stage_mut(stage) = st;
        let now = self.state.stage(stage);
        // Level-triggered: a whole run may arrive as one observation.
        let Some(epoch) = now.run_epoch else {
            return;
        };
        if now.running || !now.status.is_terminal() || self.announced.get(&stage) == Some(&epoch) {
            return;
        }
        self.announced.insert(stage, epoch);
        let detail = now.message.clone().unwrap_or_default();
        match now.status {
            ChannelStatus::Complete => {
                info!("{} finished", stage);
                self.toast.success(completion_message(stage));
                self.dispatch(Action::RefreshLibrary);
            }
            _ => {
                self.toast
                    .error(format!("{}: {}", failure_message(stage), detail));
            }
        }
    }

    fn handle_message(&mut self, msg: AppMessage) -> bool {
        match msg {
            AppMessage::Event(Event::Key(key)) => {
                for action in self.handle_key(key) {
                    self.dispatch(action);
                }
                self.state.input_mode = if self.editing() {
                    InputMode::Input
                } else {
                    InputMode::Normal
                };
                true
            }
            AppMessage::Event(Event::Resize(..)) => true,
            AppMessage::Event(_) => false,
            AppMessage::Started(stage, response) => {
                let message = match response.total {
                    Some(total) => format!("{} started: {} songs", stage, total),
                    None => format!("{} started", stage),
                };
                self.toast.info(message);
                true
            }
            AppMessage::StartFailed(_, severity, message) => {
                self.toast.push(message, severity);
                true
            }
            AppMessage::Health(up) => {
                self.state.server_up = Some(up);
                if !up {
                    self.toast
                        .error(format!("API not reachable at {}", self.state.api_base));
                }
                true
            }
            AppMessage::AuthStatus(authenticated) => {
                self.state.auth.authenticated = Some(authenticated);
                true
            }
            AppMessage::AuthUrl(Ok(url)) => {
                self.state.auth.url = Some(url);
                self.toast.info("Open the login link, then paste the code (i)");
                true
            }
            AppMessage::AuthUrl(Err(e)) => {
                self.toast.error(format!("Could not get login link: {}", e));
                true
            }
            AppMessage::AuthExchanged(result) => {
                self.state.auth.exchanging = false;
                match result {
                    Ok(()) => {
                        self.state.auth.authenticated = Some(true);
                        self.state.auth.url = None;
                        self.toast
                            .resolve_spinner("Connected to Spotify", Severity::Success);
                    }
                    Err(e) => {
                        self.toast
                            .resolve_spinner(format!("Authorization failed: {}", e), Severity::Error);
                        // The exchange may have failed because the code was
                        // already used; the real status decides.
                        self.dispatch(Action::RefreshAuth);
                    }
                }
                true
            }
            AppMessage::Library(stats) => {
                self.state.library = Some(stats);
                true
            }
            AppMessage::Verified(Ok(report)) => {
                self.toast.resolve_spinner(
                    format!(
                        "Verified files: {} marked done, {} marked pending",
                        report.fixed.marked_done, report.fixed.marked_pending
                    ),
                    Severity::Success,
                );
                self.dispatch(Action::RefreshLibrary);
                true
            }
            AppMessage::Verified(Err(e)) => {
                self.toast
                    .resolve_spinner(format!("Verify failed: {}", e), Severity::Error);
                true
            }
        }
    }

    fn editing(&self) -> bool {
        self.auth_panel.is_editing()
            || self.sync_panel.is_editing()
            || self.download_panel.is_editing()
            || self.embed_panel.is_editing()
            || self.search_panel.is_editing()
    }

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }
        if key.code == KeyCode::Char('c') && key.modifiers == KeyModifiers::CONTROL {
            return vec![Action::Quit];
        }

        let Some(focused) = self.focus.current() else {
            return vec![];
        };

        // A text field owns every other key until it is submitted or closed.
        if self.editing() {
            let state = self.state.clone();
            return self.component_mut(focused).handle_key(key, &state);
        }

        match key.code {
            KeyCode::Char('q') => return vec![Action::Quit],
            KeyCode::Tab => return vec![Action::FocusNext],
            KeyCode::BackTab => return vec![Action::FocusPrev],
            KeyCode::Char(c @ '1'..='5') => {
                let pos = c as usize - '1' as usize;
                return vec![Action::FocusPane(PANES[pos])];
            }
            _ => {}
        }

        let state = self.state.clone();
        self.component_mut(focused).handle_key(key, &state)
    }

    fn spawn_task<F>(&self, task: F)
    where
        F: std::future::Future<Output = Option<AppMessage>> + Send + 'static,
    {
        let Some(tx) = self.tx.clone() else {
            warn!("Background task requested before the UI loop started");
            return;
        };
        tokio::spawn(async move {
            if let Some(msg) = task.await {
                let _ = tx.send(msg).await;
            }
        });
    }

    fn check_health(&self) {
        let api = self.api.clone();
        self.spawn_task(async move {
            let up = match api.health().await {
                Ok(health) => {
                    debug!("API health: {}", health.status);
                    true
                }
                Err(e) => {
                    warn!("Health check failed: {}", e);
                    false
                }
            };
            Some(AppMessage::Health(up))
        });
    }

    fn dispatch(&mut self, action: Action) {
        debug!("dispatch {:?}", action);
        match action {
            Action::FocusNext => self.focus.step(1),
            Action::FocusPrev => self.focus.step(-1),
            Action::FocusPane(id) => self.focus.set(id),

            Action::Start(request) => {
                let stage = request.stage();
                let controller = self.controller(stage).clone();
                self.spawn_task(async move {
                    Some(match controller.start(request).await {
                        Ok(response) => AppMessage::Started(stage, response),
                        Err(e) => {
                            let (severity, message) = start_failure(stage, e);
                            AppMessage::StartFailed(stage, severity, message)
                        }
                    })
                });
            }
            Action::Reset(stage) => {
                self.controller(stage).reset();
                self.toast.info(format!("{} reset", stage));
            }
            Action::VerifyDownloads => {
                self.toast.spinner("Verifying downloaded files…");
                let api = self.api.clone();
                self.spawn_task(async move {
                    let result = api.verify_downloads().await.map_err(|e| e.user_message());
                    Some(AppMessage::Verified(result))
                });
            }

            Action::Search(query) => {
                let search = self.search.clone();
                self.spawn_task(async move {
                    if let SearchOutcome::Applied { count } = search.search(&query).await {
                        debug!("Search {:?} returned {} results", query, count);
                    }
                    None
                });
            }
            Action::ClearSearch => self.search.clear(),

            Action::FetchAuthUrl => {
                let api = self.api.clone();
                self.spawn_task(async move {
                    Some(AppMessage::AuthUrl(
                        api.auth_url().await.map_err(|e| e.user_message()),
                    ))
                });
            }
            Action::RefreshAuth => {
                let api = self.api.clone();
                self.spawn_task(async move { Some(AppMessage::AuthStatus(api.auth_status().await)) });
            }
            Action::SubmitAuthCode(code) => {
                self.state.auth.exchanging = true;
                self.toast.spinner("Exchanging authorization code…");
                let api = self.api.clone();
                self.spawn_task(async move {
                    Some(AppMessage::AuthExchanged(
                        api.auth_callback(&code).await.map_err(|e| e.user_message()),
                    ))
                });
            }

            Action::RefreshLibrary => {
                let api = self.api.clone();
                self.spawn_task(async move {
                    match api.library().await {
                        Ok(library) => Some(AppMessage::Library(library.stats)),
                        Err(e) => {
                            warn!("Library fetch failed: {}", e);
                            None
                        }
                    }
                });
            }
            Action::Notice(message) => self.toast.warning(message),
            Action::Quit => self.should_quit = true,
        }
    }

    // ── Drawing ───────────────────────────────────────────────────────────────

    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        draw_header(frame, rows[0], &self.state);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(rows[1]);
        self.draw_left(frame, columns[0]);

        let focused = self.focus.is_focused(ComponentId::Search);
        self.search_panel
            .draw(frame, columns[1], focused, &self.state);

        draw_keys_bar(frame, rows[2], self.state.input_mode, self.focus.current());
        self.toast.draw(frame, rows[1]);
    }

    fn draw_left(&mut self, frame: &mut Frame, area: Rect) {
        let constraints = [
            Constraint::Min(self.auth_panel.min_height()),
            Constraint::Length(self.sync_panel.min_height()),
            Constraint::Length(self.download_panel.min_height()),
            Constraint::Length(self.embed_panel.min_height()),
        ];
        let panes = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        let components: [&mut dyn Component; 4] = [
            &mut self.auth_panel,
            &mut self.sync_panel,
            &mut self.download_panel,
            &mut self.embed_panel,
        ];
        for (component, pane) in components.into_iter().zip(panes.iter()) {
            let focused = self.focus.is_focused(component.id());
            component.draw(frame, *pane, focused, &self.state);
        }
    }
}
