use crate::agent::Platform;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Live progress of one in-flight transfer. Replaced on every tick;
/// last write wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: u64,
    pub percentage: u8,
}

impl DownloadProgress {
    pub fn new(downloaded: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((downloaded.saturating_mul(100)) / total).min(100) as u8
        };
        Self {
            downloaded,
            total,
            percentage,
        }
    }
}

pub type ProgressFn<'a> = &'a (dyn Fn(DownloadProgress) + Send + Sync);

/// Transfer seam for the install flow. The lifecycle controller only sees
/// this trait; tests inject a scripted impl.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Stream-download the build artifact for one agent. Progress callbacks
    /// arrive with non-decreasing byte counts. Returns the on-disk path.
    async fn download_build(
        &self,
        agent_id: &str,
        url: &str,
        platform: Platform,
        on_progress: ProgressFn<'_>,
    ) -> Result<PathBuf>;

    /// Fetch the agent's data file and persist it next to the build.
    async fn fetch_agent_data(&self, agent_id: &str, endpoint: &str) -> Result<PathBuf>;
}

/// Real downloader writing under the agents directory
/// (`~/.local/share/agenthub/agents/<id>/` on Linux).
pub struct HttpDownloader {
    client: Client,
    agents_dir: PathBuf,
}

impl HttpDownloader {
    pub fn new(agents_dir: PathBuf) -> Self {
        Self {
            client: Client::new(),
            agents_dir,
        }
    }

    pub fn default_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;
        Ok(data_dir.join("agenthub").join("agents"))
    }

    fn agent_dir(&self, agent_id: &str) -> PathBuf {
        self.agents_dir.join(agent_id)
    }
}

fn file_name_from_url(url: &str, fallback: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download_build(
        &self,
        agent_id: &str,
        url: &str,
        platform: Platform,
        on_progress: ProgressFn<'_>,
    ) -> Result<PathBuf> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "Build download failed with status: {}",
                response.status()
            ));
        }

        let total = response.content_length().unwrap_or(0);
        let dir = self.agent_dir(agent_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(file_name_from_url(url, "build.bin"));

        let mut file = tokio::fs::File::create(&path).await?;
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        on_progress(DownloadProgress::new(0, total));
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            on_progress(DownloadProgress::new(downloaded, total));
        }
        file.flush().await?;

        mark_executable(&path).await?;
        tracing::info!(agent = agent_id, platform = platform.label(), bytes = downloaded, "build downloaded");
        Ok(path)
    }

    async fn fetch_agent_data(&self, agent_id: &str, endpoint: &str) -> Result<PathBuf> {
        let response = self.client.get(endpoint).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "Agent data request failed with status: {}",
                response.status()
            ));
        }
        // Round-trip through serde_json so a malformed payload fails here,
        // not later when the agent reads it.
        let data: serde_json::Value = response.json().await?;

        let dir = self.agent_dir(agent_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join("data.json");
        tokio::fs::write(&path, serde_json::to_string_pretty(&data)?).await?;
        Ok(path)
    }
}

#[cfg(unix)]
async fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o755);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}
