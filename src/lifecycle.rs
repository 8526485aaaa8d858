use crate::agent::{Agent, Platform};
use crate::download::{DownloadProgress, Downloader};
use crate::store::StateStore;
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Install state machine for the agent shown on the detail screen.
/// Single source of truth; no optimistic flag to revert by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Idle,
    Installing,
    Installed,
    Uninstalling,
}

/// Result of one install attempt. `Skipped` covers the silent no-op paths:
/// undetectable platform or no matching build.
#[derive(Debug)]
pub enum InstallOutcome {
    Skipped,
    Installed {
        agent_id: String,
        warnings: Vec<String>,
    },
}

/// Best-effort hook fired right after an agent lands on disk. Errors are
/// logged and must never abort the installed transition.
pub trait Launcher: Send + Sync {
    fn start_on_install(&self, agent: &Agent, binary: Option<&Path>) -> Result<()>;
}

/// Spawns the freshly downloaded binary, detached.
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn start_on_install(&self, agent: &Agent, binary: Option<&Path>) -> Result<()> {
        let binary = binary.ok_or_else(|| anyhow!("no binary downloaded for {}", agent.id))?;
        std::process::Command::new(binary)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;
        Ok(())
    }
}

/// Drives one agent through the install sequence. Collaborators are
/// injected; the controller returns an outcome instead of re-reading
/// global state mid-flow.
pub struct Installer {
    store: Arc<StateStore>,
    downloader: Arc<dyn Downloader>,
    launcher: Option<Arc<dyn Launcher>>,
    platform: Option<Platform>,
}

impl Installer {
    pub fn new(
        store: Arc<StateStore>,
        downloader: Arc<dyn Downloader>,
        launcher: Option<Arc<dyn Launcher>>,
        platform: Option<Platform>,
    ) -> Self {
        Self {
            store,
            downloader,
            launcher,
            platform,
        }
    }

    /// Install sequence. Steps run strictly in order; download and data
    /// fetch failures are non-fatal and reported as warnings, a state-store
    /// failure aborts and leaves the agent uninstalled.
    pub async fn install(
        &self,
        agent: Agent,
        progress: mpsc::UnboundedSender<DownloadProgress>,
    ) -> Result<InstallOutcome> {
        let Some(platform) = self.platform else {
            return Ok(InstallOutcome::Skipped);
        };
        let Some(build) = agent.build_for(platform).cloned() else {
            return Ok(InstallOutcome::Skipped);
        };

        let mut warnings = Vec::new();
        let mut binary: Option<PathBuf> = None;

        let on_progress = move |p: DownloadProgress| {
            // Receiver may be gone if the view unmounted; the transfer
            // itself is not cancelled.
            let _ = progress.send(p);
        };
        match self
            .downloader
            .download_build(&agent.id, &build.url, platform, &on_progress)
            .await
        {
            Ok(path) => binary = Some(path),
            Err(err) => {
                tracing::warn!(agent = %agent.id, error = %err, "build download failed");
                warnings.push(format!("Failed to download build file: {err}"));
            }
        }

        if let Some(endpoint) = &agent.data_endpoint {
            if let Err(err) = self.downloader.fetch_agent_data(&agent.id, endpoint).await {
                tracing::warn!(agent = %agent.id, error = %err, "data.json download failed");
                warnings.push(format!("Failed to download data.json: {err}"));
            }
        }

        self.store.mark_installed(&agent.id)?;

        if let Some(launcher) = &self.launcher {
            if let Err(err) = launcher.start_on_install(&agent, binary.as_deref()) {
                tracing::warn!(agent = %agent.id, error = %err, "failed to start agent on install");
            }
        }

        Ok(InstallOutcome::Installed {
            agent_id: agent.id,
            warnings,
        })
    }

    /// Safe no-op when the agent is not installed.
    pub fn uninstall(&self, agent_id: &str) -> Result<()> {
        if !self.store.is_installed(agent_id) {
            return Ok(());
        }
        self.store.mark_uninstalled(agent_id)
    }
}

/// Execute one manifest command ("setup", "agent", "run") as a subprocess.
/// On success of the setup action the configured flag flips; failure leaves
/// state unchanged and bubbles the command's stderr up to the status line.
pub async fn run_agent_command(store: &StateStore, agent: &Agent, key: &str) -> Result<()> {
    let Some(command) = agent.commands.get(key) else {
        return Err(anyhow!("Agent {} declares no '{}' command", agent.id, key));
    };

    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.trim();
        return Err(anyhow!(
            "{}",
            if detail.is_empty() {
                format!("exited with {}", output.status)
            } else {
                detail.to_string()
            }
        ));
    }

    if key == "setup" {
        store.mark_configured(&agent.id, true)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::ProgressFn;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockDownloader {
        /// (downloaded, total) pairs replayed through the progress callback.
        ticks: Vec<(u64, u64)>,
        fail_build: bool,
        fail_data: bool,
        data_fetches: Mutex<Vec<String>>,
    }

    impl MockDownloader {
        fn ok(ticks: Vec<(u64, u64)>) -> Self {
            Self {
                ticks,
                fail_build: false,
                fail_data: false,
                data_fetches: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Downloader for MockDownloader {
        async fn download_build(
            &self,
            _agent_id: &str,
            _url: &str,
            _platform: Platform,
            on_progress: ProgressFn<'_>,
        ) -> Result<PathBuf> {
            if self.fail_build {
                return Err(anyhow!("connection reset"));
            }
            for (downloaded, total) in &self.ticks {
                on_progress(DownloadProgress::new(*downloaded, *total));
            }
            Ok(PathBuf::from("/tmp/mock-build"))
        }

        async fn fetch_agent_data(&self, agent_id: &str, _endpoint: &str) -> Result<PathBuf> {
            if self.fail_data {
                return Err(anyhow!("404 Not Found"));
            }
            self.data_fetches.lock().unwrap().push(agent_id.to_string());
            Ok(PathBuf::from("/tmp/mock-data.json"))
        }
    }

    fn agent_with_build(platform: &str) -> Agent {
        serde_json::from_str(&format!(
            r#"{{
                "id": "A",
                "name": "Agent A",
                "author": "acme",
                "builds": [{{"platform": "{platform}", "url": "https://example.com/a"}}],
                "data_endpoint": "https://example.com/a/data.json"
            }}"#
        ))
        .unwrap()
    }

    fn agent_without_builds() -> Agent {
        serde_json::from_str(
            r#"{"id": "B", "name": "Agent B", "author": "acme"}"#,
        )
        .unwrap()
    }

    fn temp_store() -> (tempfile::TempDir, Arc<StateStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path().join("installed.json")).unwrap());
        (dir, store)
    }

    #[tokio::test]
    async fn test_install_with_no_builds_is_a_skip() {
        let (_dir, store) = temp_store();
        let installer = Installer::new(
            store.clone(),
            Arc::new(MockDownloader::ok(vec![])),
            None,
            Some(Platform::MacArm64),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = installer.install(agent_without_builds(), tx).await.unwrap();
        assert!(matches!(outcome, InstallOutcome::Skipped));
        assert!(!store.is_installed("B"));
    }

    #[tokio::test]
    async fn test_install_without_detected_platform_is_a_skip() {
        let (_dir, store) = temp_store();
        let installer = Installer::new(
            store.clone(),
            Arc::new(MockDownloader::ok(vec![])),
            None,
            None,
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = installer
            .install(agent_with_build("mac-arm64"), tx)
            .await
            .unwrap();
        assert!(matches!(outcome, InstallOutcome::Skipped));
        assert!(!store.is_installed("A"));
    }

    #[tokio::test]
    async fn test_successful_install_marks_installed_and_reports_progress() {
        let (_dir, store) = temp_store();
        let installer = Installer::new(
            store.clone(),
            Arc::new(MockDownloader::ok(vec![(50, 100), (100, 100)])),
            None,
            Some(Platform::MacArm64),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = installer
            .install(agent_with_build("mac-arm64"), tx)
            .await
            .unwrap();

        match outcome {
            InstallOutcome::Installed { agent_id, warnings } => {
                assert_eq!(agent_id, "A");
                assert!(warnings.is_empty());
            }
            other => panic!("expected Installed, got {other:?}"),
        }
        assert!(store.is_installed("A"));
        assert!(!store.state("A").configured);

        let mut seen = Vec::new();
        while let Ok(p) = rx.try_recv() {
            seen.push((p.downloaded, p.total, p.percentage));
        }
        assert_eq!(seen, vec![(50, 100, 50), (100, 100, 100)]);
    }

    #[tokio::test]
    async fn test_build_with_wrong_platform_is_a_skip() {
        let (_dir, store) = temp_store();
        let installer = Installer::new(
            store.clone(),
            Arc::new(MockDownloader::ok(vec![])),
            None,
            Some(Platform::LinuxX64),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = installer
            .install(agent_with_build("mac-arm64"), tx)
            .await
            .unwrap();
        assert!(matches!(outcome, InstallOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_download_failure_is_nonfatal() {
        let (_dir, store) = temp_store();
        let downloader = MockDownloader {
            fail_build: true,
            ..MockDownloader::ok(vec![])
        };
        let installer = Installer::new(
            store.clone(),
            Arc::new(downloader),
            None,
            Some(Platform::MacArm64),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = installer
            .install(agent_with_build("mac-arm64"), tx)
            .await
            .unwrap();

        match outcome {
            InstallOutcome::Installed { warnings, .. } => {
                assert_eq!(warnings.len(), 1);
                assert!(warnings[0].contains("build file"));
            }
            other => panic!("expected Installed, got {other:?}"),
        }
        assert!(store.is_installed("A"));
    }

    #[tokio::test]
    async fn test_data_fetch_failure_still_installs() {
        let (_dir, store) = temp_store();
        let downloader = MockDownloader {
            fail_data: true,
            ..MockDownloader::ok(vec![(100, 100)])
        };
        let installer = Installer::new(
            store.clone(),
            Arc::new(downloader),
            None,
            Some(Platform::MacArm64),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = installer
            .install(agent_with_build("mac-arm64"), tx)
            .await
            .unwrap();

        match outcome {
            InstallOutcome::Installed { warnings, .. } => {
                assert_eq!(warnings.len(), 1);
                assert!(warnings[0].contains("data.json"));
            }
            other => panic!("expected Installed, got {other:?}"),
        }
        assert!(store.is_installed("A"));
    }

    #[tokio::test]
    async fn test_launcher_failure_never_blocks_install() {
        struct FailingLauncher;
        impl Launcher for FailingLauncher {
            fn start_on_install(&self, _agent: &Agent, _binary: Option<&Path>) -> Result<()> {
                Err(anyhow!("exec format error"))
            }
        }

        let (_dir, store) = temp_store();
        let installer = Installer::new(
            store.clone(),
            Arc::new(MockDownloader::ok(vec![(100, 100)])),
            Some(Arc::new(FailingLauncher)),
            Some(Platform::MacArm64),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = installer
            .install(agent_with_build("mac-arm64"), tx)
            .await
            .unwrap();
        assert!(matches!(outcome, InstallOutcome::Installed { .. }));
        assert!(store.is_installed("A"));
    }

    #[tokio::test]
    async fn test_uninstall_flips_flag_and_is_idempotent() {
        let (_dir, store) = temp_store();
        let installer = Installer::new(
            store.clone(),
            Arc::new(MockDownloader::ok(vec![])),
            None,
            Some(Platform::MacArm64),
        );
        store.mark_installed("A").unwrap();
        installer.uninstall("A").unwrap();
        assert!(!store.is_installed("A"));
        // Second uninstall is a safe no-op
        installer.uninstall("A").unwrap();
        assert!(!store.is_installed("A"));
    }

    #[tokio::test]
    async fn test_setup_command_flips_configured() {
        let (_dir, store) = temp_store();
        let agent: Agent = serde_json::from_str(
            r#"{
                "id": "A", "name": "Agent A", "author": "acme",
                "commands": {"setup": "true", "run": "false"}
            }"#,
        )
        .unwrap();
        store.mark_installed("A").unwrap();

        run_agent_command(&store, &agent, "setup").await.unwrap();
        assert!(store.state("A").configured);
    }

    #[tokio::test]
    async fn test_failed_command_leaves_state_unchanged() {
        let (_dir, store) = temp_store();
        let agent: Agent = serde_json::from_str(
            r#"{
                "id": "A", "name": "Agent A", "author": "acme",
                "commands": {"setup": "exit 3"}
            }"#,
        )
        .unwrap();
        store.mark_installed("A").unwrap();

        let err = run_agent_command(&store, &agent, "setup").await.unwrap_err();
        assert!(err.to_string().contains("exit"));
        assert!(!store.state("A").configured);
    }

    #[tokio::test]
    async fn test_missing_command_key_is_an_error() {
        let (_dir, store) = temp_store();
        let agent = agent_without_builds();
        assert!(run_agent_command(&store, &agent, "setup").await.is_err());
    }
}
