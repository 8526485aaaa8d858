use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent::{Agent, AgentCatalog, Platform};
use crate::chat::{ChatSession, ChatTransport};
use crate::config::Config;
use crate::download::{DownloadProgress, Downloader};
use crate::lifecycle::{run_agent_command, InstallOutcome, InstallPhase, Installer, Launcher};
use crate::scroll::ChatScroll;
use crate::store::StateStore;
use crate::workspace::{load_editable_fields, save_editable_fields, ConfigField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Hub,
    Detail,
    Workspace,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Which workspace pane has keyboard focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspacePane {
    Agents,
    Config,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,

    // Hub state
    pub search_input: String,
    pub categories: Vec<String>,
    pub category_idx: usize, // 0 = All
    pub filtered: Vec<usize>,
    pub hub_state: ListState,

    // Detail state
    pub detail_id: Option<String>,
    pub install_phase: InstallPhase,
    pub download_progress: Option<DownloadProgress>,
    pub install_task: Option<JoinHandle<anyhow::Result<InstallOutcome>>>,
    pub progress_rx: Option<mpsc::UnboundedReceiver<DownloadProgress>>,

    // Workspace state
    pub workspace_id: Option<String>,
    pub installed_ids: Vec<String>,
    pub installed_state: ListState,
    pub executing: Option<String>, // command key currently running
    pub command_task: Option<(String, String, JoinHandle<anyhow::Result<()>>)>,
    pub refresh_task: Option<(String, JoinHandle<anyhow::Result<std::path::PathBuf>>)>,
    pub confirm_uninstall: bool,
    pub workspace_focus: WorkspacePane,
    pub config_fields: Vec<ConfigField>,
    pub config_state: ListState,
    pub editing_field: Option<usize>,
    pub field_input: String,
    pub field_cursor: usize,

    // Chat state
    pub chat_id: Option<String>,
    pub chat: ChatSession,
    pub chat_scroll: ChatScroll,
    pub chat_input: String,
    pub chat_cursor: usize,
    pub chat_area_width: u16,
    pub chat_area_height: u16,

    // Panel areas for mouse hit-testing (updated during render)
    pub list_area: Option<Rect>,
    pub content_area: Option<Rect>,

    // Collaborators (injected, never re-queried as globals mid-flow)
    pub catalog: AgentCatalog,
    pub store: Arc<StateStore>,
    pub downloader: Arc<dyn Downloader>,
    pub transport: Arc<dyn ChatTransport>,
    pub launcher: Option<Arc<dyn Launcher>>,
    pub config: Config,
    pub platform: Option<Platform>,
    pub agents_dir: std::path::PathBuf,

    // Status line and spinner
    pub status: Option<String>,
    pub animation_frame: u8,
}

/// User-facing message for a recoverable failure; falls back to a generic
/// connectivity message when the error carries no text.
pub fn user_error(prefix: &str, err: &anyhow::Error) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        format!("{prefix}: connection problem, please try again")
    } else {
        format!("{prefix}: {message}")
    }
}

impl App {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: AgentCatalog,
        store: Arc<StateStore>,
        downloader: Arc<dyn Downloader>,
        transport: Arc<dyn ChatTransport>,
        launcher: Option<Arc<dyn Launcher>>,
        config: Config,
        platform: Option<Platform>,
        agents_dir: std::path::PathBuf,
    ) -> Self {
        let categories = catalog.categories();
        let filtered: Vec<usize> = (0..catalog.agents().len()).collect();
        let installed_ids = store.installed_ids();

        let mut hub_state = ListState::default();
        if !filtered.is_empty() {
            hub_state.select(Some(0));
        }

        Self {
            should_quit: false,
            screen: Screen::Hub,
            input_mode: InputMode::Normal,

            search_input: String::new(),
            categories,
            category_idx: 0,
            filtered,
            hub_state,

            detail_id: None,
            install_phase: InstallPhase::Idle,
            download_progress: None,
            install_task: None,
            progress_rx: None,

            workspace_id: None,
            installed_ids,
            installed_state: ListState::default(),
            executing: None,
            command_task: None,
            refresh_task: None,
            confirm_uninstall: false,
            workspace_focus: WorkspacePane::Agents,
            config_fields: Vec::new(),
            config_state: ListState::default(),
            editing_field: None,
            field_input: String::new(),
            field_cursor: 0,

            chat_id: None,
            chat: ChatSession::new(),
            chat_scroll: ChatScroll::new(),
            chat_input: String::new(),
            chat_cursor: 0,
            chat_area_width: 0,
            chat_area_height: 0,

            list_area: None,
            content_area: None,

            catalog,
            store,
            downloader,
            transport,
            launcher,
            config,
            platform,
            agents_dir,

            status: None,
            animation_frame: 0,
        }
    }

    // --- Hub -------------------------------------------------------------

    pub fn current_category(&self) -> Option<&str> {
        if self.category_idx == 0 {
            None
        } else {
            self.categories.get(self.category_idx - 1).map(String::as_str)
        }
    }

    pub fn refresh_filter(&mut self) {
        self.filtered = self
            .catalog
            .filter(&self.search_input, self.current_category());
        let selected = self.hub_state.selected().unwrap_or(0);
        if self.filtered.is_empty() {
            self.hub_state.select(None);
        } else {
            self.hub_state.select(Some(selected.min(self.filtered.len() - 1)));
        }
    }

    pub fn cycle_category(&mut self) {
        self.category_idx = (self.category_idx + 1) % (self.categories.len() + 1);
        self.refresh_filter();
    }

    pub fn hub_nav_down(&mut self) {
        let len = self.filtered.len();
        if len > 0 {
            let i = self.hub_state.selected().unwrap_or(0);
            self.hub_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn hub_nav_up(&mut self) {
        let i = self.hub_state.selected().unwrap_or(0);
        self.hub_state.select(Some(i.saturating_sub(1)));
    }

    pub fn selected_hub_agent(&self) -> Option<&Agent> {
        self.hub_state
            .selected()
            .and_then(|i| self.filtered.get(i))
            .and_then(|&idx| self.catalog.agents().get(idx))
    }

    // --- Detail ----------------------------------------------------------

    pub fn open_detail(&mut self, agent_id: String) {
        self.install_phase = if self.store.is_installed(&agent_id) {
            InstallPhase::Installed
        } else {
            InstallPhase::Idle
        };
        self.download_progress = None;
        self.detail_id = Some(agent_id);
        self.status = None;
        self.screen = Screen::Detail;
    }

    pub fn detail_agent(&self) -> Option<&Agent> {
        self.detail_id.as_deref().and_then(|id| self.catalog.get(id))
    }

    fn installer(&self) -> Installer {
        Installer::new(
            self.store.clone(),
            self.downloader.clone(),
            self.launcher.clone(),
            self.platform,
        )
    }

    /// Kick off the install sequence for the detail agent. Inert when no
    /// build matches the detected platform, mirroring the disabled control.
    pub fn start_install(&mut self) {
        if self.install_phase != InstallPhase::Idle || self.install_task.is_some() {
            return;
        }
        let Some(agent) = self.detail_agent().cloned() else {
            return;
        };
        if !agent.installable_on(self.platform) {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.progress_rx = Some(rx);
        self.download_progress = None;
        self.install_phase = InstallPhase::Installing;
        self.status = None;

        let installer = self.installer();
        self.install_task = Some(tokio::spawn(async move { installer.install(agent, tx).await }));
    }

    pub fn uninstall(&mut self, agent_id: &str) {
        self.install_phase = InstallPhase::Uninstalling;
        match self.installer().uninstall(agent_id) {
            Ok(()) => {
                self.install_phase = InstallPhase::Idle;
                self.refresh_installed();
                if self.workspace_id.as_deref() == Some(agent_id) {
                    self.workspace_id = None;
                    self.config_fields.clear();
                }
            }
            Err(err) => {
                self.install_phase = InstallPhase::Installed;
                self.status = Some(user_error("Failed to uninstall", &err));
            }
        }
        self.confirm_uninstall = false;
    }

    // --- Workspace -------------------------------------------------------

    pub fn refresh_installed(&mut self) {
        self.installed_ids = self.store.installed_ids();
        if self.installed_ids.is_empty() {
            self.installed_state.select(None);
        } else {
            let i = self.installed_state.selected().unwrap_or(0);
            self.installed_state
                .select(Some(i.min(self.installed_ids.len() - 1)));
        }
    }

    pub fn open_workspace(&mut self, agent_id: Option<String>) {
        self.refresh_installed();
        let target = agent_id.or_else(|| self.installed_ids.first().cloned());
        if let Some(id) = &target {
            if let Some(pos) = self.installed_ids.iter().position(|i| i == id) {
                self.installed_state.select(Some(pos));
            }
        }
        self.workspace_id = target;
        self.load_configuration();
        self.confirm_uninstall = false;
        self.screen = Screen::Workspace;
    }

    pub fn workspace_agent(&self) -> Option<&Agent> {
        self.workspace_id.as_deref().and_then(|id| self.catalog.get(id))
    }

    pub fn workspace_nav(&mut self, down: bool) {
        let len = self.installed_ids.len();
        if len == 0 {
            return;
        }
        let i = self.installed_state.selected().unwrap_or(0);
        let next = if down { (i + 1).min(len - 1) } else { i.saturating_sub(1) };
        self.installed_state.select(Some(next));
        self.workspace_id = self.installed_ids.get(next).cloned();
        self.confirm_uninstall = false;
        self.load_configuration();
    }

    pub fn load_configuration(&mut self) {
        self.config_fields.clear();
        self.config_state.select(None);
        self.editing_field = None;
        let Some(id) = self.workspace_id.as_deref() else {
            return;
        };
        match load_editable_fields(&self.agents_dir, id) {
            Ok(Some(fields)) => {
                self.config_fields = fields;
                if !self.config_fields.is_empty() {
                    self.config_state.select(Some(0));
                }
            }
            Ok(None) => {}
            Err(err) => {
                self.status = Some(user_error("Failed to load configuration", &err));
            }
        }
    }

    pub fn config_nav(&mut self, down: bool) {
        let len = self.config_fields.len();
        if len == 0 {
            return;
        }
        let i = self.config_state.selected().unwrap_or(0);
        let next = if down { (i + 1).min(len - 1) } else { i.saturating_sub(1) };
        self.config_state.select(Some(next));
    }

    pub fn begin_field_edit(&mut self) {
        let Some(i) = self.config_state.selected() else {
            return;
        };
        if let Some(field) = self.config_fields.get(i) {
            self.field_input = field.value.clone();
            self.field_cursor = self.field_input.chars().count();
            self.editing_field = Some(i);
            self.input_mode = InputMode::Editing;
        }
    }

    /// Commit the edited value and write data.json immediately.
    pub fn commit_field_edit(&mut self) {
        if let Some(i) = self.editing_field.take() {
            if let Some(field) = self.config_fields.get_mut(i) {
                field.value = std::mem::take(&mut self.field_input);
            }
            if let Some(id) = self.workspace_id.as_deref() {
                if let Err(err) = save_editable_fields(&self.agents_dir, id, &self.config_fields) {
                    self.status = Some(user_error("Failed to save configuration", &err));
                } else {
                    self.status = Some("Configuration saved".to_string());
                }
            }
        }
        self.input_mode = InputMode::Normal;
    }

    pub fn cancel_field_edit(&mut self) {
        self.editing_field = None;
        self.field_input.clear();
        self.field_cursor = 0;
        self.input_mode = InputMode::Normal;
    }

    /// Run one manifest command for the workspace agent. One action at a
    /// time per agent; the flag is released when the task joins.
    pub fn run_command(&mut self, key: &str) {
        if self.executing.is_some() {
            return;
        }
        let Some(agent) = self.workspace_agent().cloned() else {
            return;
        };
        if !agent.commands.contains_key(key) {
            return;
        }

        self.executing = Some(key.to_string());
        self.status = None;
        let store = self.store.clone();
        let key_owned = key.to_string();
        let agent_id = agent.id.clone();
        let task = tokio::spawn(async move { run_agent_command(&store, &agent, &key_owned).await });
        self.command_task = Some((agent_id, key.to_string(), task));
    }

    /// Re-fetch the workspace agent's data.json from its endpoint and
    /// reload the editable configuration. Inert when the agent declares no
    /// data endpoint; the UI hides the control in that case.
    pub fn refresh_agent_data(&mut self) {
        if self.executing.is_some() || self.refresh_task.is_some() {
            return;
        }
        let Some(agent) = self.workspace_agent().cloned() else {
            return;
        };
        let Some(endpoint) = agent.data_endpoint.clone() else {
            return;
        };

        self.status = None;
        let downloader = self.downloader.clone();
        let agent_id = agent.id.clone();
        let task =
            tokio::spawn(async move { downloader.fetch_agent_data(&agent_id, &endpoint).await });
        self.refresh_task = Some((agent.id, task));
    }

    // --- Chat ------------------------------------------------------------

    pub fn open_chat(&mut self, agent_id: Option<String>) {
        let target = agent_id
            .or_else(|| self.config.default_agent.clone())
            .or_else(|| self.installed_ids.first().cloned());
        if self.chat_id != target {
            self.chat.clear();
            self.chat_scroll = ChatScroll::new();
        }
        self.chat_id = target;
        self.screen = Screen::Chat;
        self.input_mode = InputMode::Editing;
    }

    pub fn chat_agent(&self) -> Option<&Agent> {
        self.chat_id.as_deref().and_then(|id| self.catalog.get(id))
    }

    fn chat_endpoint(&self) -> Option<String> {
        self.chat_agent()
            .and_then(|a| a.chat_endpoint.clone())
            .or_else(|| self.config.chat_endpoint.clone())
    }

    pub fn submit_chat(&mut self) {
        if self.chat_input.is_empty() || self.chat.busy() {
            return;
        }
        let Some(endpoint) = self.chat_endpoint() else {
            self.status = Some("No chat endpoint configured for this agent".to_string());
            return;
        };

        let text = std::mem::take(&mut self.chat_input);
        self.chat_cursor = 0;
        self.chat.send(text, self.transport.clone(), endpoint);
        // A just-sent user message always re-anchors the transcript
        self.chat_scroll.note_messages(&self.chat.messages);
    }

    // --- Tick ------------------------------------------------------------

    /// Runs on the fixed 100ms tick: spinner frame, progress updates,
    /// task completion, and the streaming scroll cadence.
    pub async fn on_tick(&mut self) {
        if self.chat.is_loading
            || self.executing.is_some()
            || self.install_task.is_some()
            || self.refresh_task.is_some()
        {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }

        self.poll_progress();
        self.poll_install().await;
        self.poll_command().await;
        self.poll_refresh().await;
        self.poll_chat();
    }

    /// Progress updates are applied in arrival order; last write wins.
    fn poll_progress(&mut self) {
        if let Some(rx) = self.progress_rx.as_mut() {
            while let Ok(progress) = rx.try_recv() {
                self.download_progress = Some(progress);
            }
        }
    }

    async fn poll_install(&mut self) {
        let finished = self
            .install_task
            .as_ref()
            .map(|t| t.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }
        let Some(task) = self.install_task.take() else {
            return;
        };

        // Apply any progress still queued, then clear it with the task.
        self.poll_progress();
        let result = task.await;
        self.download_progress = None;
        self.progress_rx = None;

        match result {
            Ok(Ok(InstallOutcome::Installed { agent_id, warnings })) => {
                self.install_phase = InstallPhase::Installed;
                if !warnings.is_empty() {
                    self.status = Some(warnings.join(" / "));
                }
                self.refresh_installed();
                // Navigate to the workspace scoped to this agent, once
                self.open_workspace(Some(agent_id));
            }
            Ok(Ok(InstallOutcome::Skipped)) => {
                self.install_phase = InstallPhase::Idle;
            }
            Ok(Err(err)) => {
                // State reverts to the last known-good value
                self.install_phase = InstallPhase::Idle;
                self.status = Some(user_error("Install failed", &err));
            }
            Err(err) => {
                self.install_phase = InstallPhase::Idle;
                self.status = Some(format!("Install task failed: {err}"));
            }
        }
    }

    async fn poll_command(&mut self) {
        let finished = self
            .command_task
            .as_ref()
            .map(|(_, _, t)| t.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }
        let Some((agent_id, key, task)) = self.command_task.take() else {
            return;
        };

        match task.await {
            Ok(Ok(())) => {
                if key == "setup" {
                    self.status = Some(format!("{agent_id} initialized"));
                }
            }
            Ok(Err(err)) => {
                self.status = Some(user_error(&format!("Failed to execute {key}"), &err));
            }
            Err(err) => {
                self.status = Some(format!("Failed to execute {key}: {err}"));
            }
        }
        // Released on every path, success or failure
        self.executing = None;
    }

    async fn poll_refresh(&mut self) {
        let finished = self
            .refresh_task
            .as_ref()
            .map(|(_, t)| t.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }
        let Some((agent_id, task)) = self.refresh_task.take() else {
            return;
        };

        match task.await {
            Ok(Ok(_)) => {
                self.status = Some(format!("Refreshed agent data for {agent_id}"));
                if self.workspace_id.as_deref() == Some(agent_id.as_str()) {
                    self.load_configuration();
                }
            }
            Ok(Err(err)) => {
                self.status = Some(user_error("Failed to refresh agent data", &err));
            }
            Err(err) => {
                self.status = Some(format!("Failed to refresh agent data: {err}"));
            }
        }
    }

    fn poll_chat(&mut self) {
        let finalized = self.chat.drain_stream();
        // Keep the growth counter current; assistant appends never force
        self.chat_scroll.note_messages(&self.chat.messages);
        if finalized {
            self.chat_scroll.settle();
        }
        // busy() covers the thinking window before the first chunk, so a
        // just-sent message stays anchored while the transcript reflows
        self.chat_scroll.on_tick(self.chat.busy());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::StreamEvent;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct NullDownloader;

    #[async_trait]
    impl Downloader for NullDownloader {
        async fn download_build(
            &self,
            _agent_id: &str,
            _url: &str,
            _platform: Platform,
            on_progress: crate::download::ProgressFn<'_>,
        ) -> Result<PathBuf> {
            on_progress(DownloadProgress::new(50, 100));
            on_progress(DownloadProgress::new(100, 100));
            Ok(PathBuf::from("/tmp/null-build"))
        }

        async fn fetch_agent_data(&self, _agent_id: &str, _endpoint: &str) -> Result<PathBuf> {
            Ok(PathBuf::from("/tmp/null-data.json"))
        }
    }

    struct NullTransport;

    #[async_trait]
    impl crate::chat::ChatTransport for NullTransport {
        async fn stream_reply(
            &self,
            _endpoint: &str,
            _prompt: &str,
            tx: mpsc::UnboundedSender<StreamEvent>,
        ) -> Result<()> {
            let _ = tx.send(StreamEvent::Delta("ok".to_string()));
            Ok(())
        }
    }

    fn test_app(dir: &tempfile::TempDir) -> App {
        let catalog = AgentCatalog::from_json(
            r#"[
                {
                    "id": "A",
                    "name": "Agent A",
                    "author": "acme",
                    "builds": [{"platform": "mac-arm64", "url": "https://example.com/a"}],
                    "data_endpoint": "https://example.com/a/data.json",
                    "chat_endpoint": "http://localhost:9/api/generate"
                },
                {"id": "B", "name": "Agent B", "author": "acme"}
            ]"#,
        )
        .unwrap();
        let store = Arc::new(StateStore::open(dir.path().join("installed.json")).unwrap());
        App::new(
            catalog,
            store,
            Arc::new(NullDownloader),
            Arc::new(NullTransport),
            None,
            Config::new(),
            Some(Platform::MacArm64),
            dir.path().join("agents"),
        )
    }

    async fn drive_install_to_completion(app: &mut App) {
        for _ in 0..100 {
            app.on_tick().await;
            if app.install_task.is_none() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("install task never finished");
    }

    #[tokio::test]
    async fn test_install_navigates_to_workspace_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&dir);
        app.open_detail("A".to_string());
        app.start_install();
        assert_eq!(app.install_phase, InstallPhase::Installing);

        drive_install_to_completion(&mut app).await;

        assert_eq!(app.install_phase, InstallPhase::Installed);
        assert_eq!(app.download_progress, None);
        assert_eq!(app.screen, Screen::Workspace);
        assert_eq!(app.workspace_id.as_deref(), Some("A"));
        assert!(app.store.is_installed("A"));

        // Further ticks must not navigate or change phase again
        app.screen = Screen::Hub;
        app.on_tick().await;
        assert_eq!(app.screen, Screen::Hub);
    }

    #[tokio::test]
    async fn test_install_without_matching_build_is_inert() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&dir);
        app.open_detail("B".to_string());
        app.start_install();
        // No builds: the action never leaves Idle and spawns nothing
        assert_eq!(app.install_phase, InstallPhase::Idle);
        assert!(app.install_task.is_none());
        assert!(!app.store.is_installed("B"));
    }

    #[tokio::test]
    async fn test_uninstall_of_not_installed_agent_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&dir);
        app.uninstall("A");
        assert_eq!(app.install_phase, InstallPhase::Idle);
        assert!(!app.store.is_installed("A"));
    }

    #[tokio::test]
    async fn test_refresh_agent_data_reloads_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&dir);
        app.store.mark_installed("A").unwrap();
        app.open_workspace(Some("A".to_string()));
        assert!(app.config_fields.is_empty());

        // data.json lands on disk after the workspace was opened
        let agent_dir = app.agents_dir.join("A");
        std::fs::create_dir_all(&agent_dir).unwrap();
        std::fs::write(
            agent_dir.join("data.json"),
            r#"{"editable": {"api_key": {"value": "k"}}}"#,
        )
        .unwrap();

        app.refresh_agent_data();
        assert!(app.refresh_task.is_some());
        for _ in 0..100 {
            app.on_tick().await;
            if app.refresh_task.is_none() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(app.refresh_task.is_none());
        assert_eq!(app.config_fields.len(), 1);
        assert_eq!(app.config_fields[0].key, "api_key");
        assert!(app.status.as_deref().unwrap_or("").contains("Refreshed"));
    }

    #[tokio::test]
    async fn test_refresh_without_data_endpoint_is_inert() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&dir);
        app.store.mark_installed("B").unwrap();
        app.open_workspace(Some("B".to_string()));
        app.refresh_agent_data();
        assert!(app.refresh_task.is_none());
        assert_eq!(app.status, None);
    }

    #[tokio::test]
    async fn test_submit_chat_without_endpoint_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&dir);
        app.open_chat(Some("B".to_string()));
        app.chat_input = "hello".to_string();
        app.submit_chat();
        assert!(app.status.is_some());
        assert!(app.chat.messages.is_empty());
    }

    #[tokio::test]
    async fn test_submit_chat_appends_user_message() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&dir);
        app.open_chat(Some("A".to_string()));
        app.chat_input = "hello".to_string();
        app.submit_chat();
        assert_eq!(app.chat.messages.len(), 1);
        assert!(app.chat.is_loading);
        assert!(app.chat_input.is_empty());
    }

    #[tokio::test]
    async fn test_switching_chat_agent_clears_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&dir);
        app.open_chat(Some("A".to_string()));
        app.chat_input = "hello".to_string();
        app.submit_chat();
        app.open_chat(Some("B".to_string()));
        assert!(app.chat.messages.is_empty());
        assert!(!app.chat.is_loading);
    }
}
