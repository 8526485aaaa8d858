use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Persisted per-agent flags. An absent entry means the agent was never
/// installed; entries are flipped, never deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationState {
    pub installed: bool,
    pub configured: bool,
}

/// Install-state store backed by a JSON file. All lifecycle mutations go
/// through here; reads elsewhere are snapshot reads.
pub struct StateStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, InstallationState>>,
}

impl StateStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("agenthub").join("installed.json"))
    }

    pub fn state(&self, agent_id: &str) -> InstallationState {
        self.entries
            .lock()
            .map(|map| map.get(agent_id).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn is_installed(&self, agent_id: &str) -> bool {
        self.state(agent_id).installed
    }

    pub fn installed_ids(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|map| {
                map.iter()
                    .filter(|(_, s)| s.installed)
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mark an agent installed. A fresh install always starts unconfigured;
    /// setup flips the flag afterwards.
    pub fn mark_installed(&self, agent_id: &str) -> Result<()> {
        self.update(agent_id, |state| {
            state.installed = true;
            state.configured = false;
        })
    }

    /// Idempotent: uninstalling an agent that is not installed is a no-op.
    pub fn mark_uninstalled(&self, agent_id: &str) -> Result<()> {
        self.update(agent_id, |state| {
            state.installed = false;
            state.configured = false;
        })
    }

    pub fn mark_configured(&self, agent_id: &str, configured: bool) -> Result<()> {
        self.update(agent_id, |state| state.configured = configured)
    }

    fn update(&self, agent_id: &str, f: impl FnOnce(&mut InstallationState)) -> Result<()> {
        let snapshot = {
            let mut map = self
                .entries
                .lock()
                .map_err(|_| anyhow!("Install-state store lock poisoned"))?;
            f(map.entry(agent_id.to_string()).or_default());
            map.clone()
        };
        self.persist(&snapshot)
    }

    fn persist(&self, entries: &BTreeMap<String, InstallationState>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("installed.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_absent_entry_defaults_to_not_installed() {
        let (_dir, store) = temp_store();
        let state = store.state("ghost");
        assert!(!state.installed);
        assert!(!state.configured);
    }

    #[test]
    fn test_install_then_configure_then_uninstall() {
        let (_dir, store) = temp_store();
        store.mark_installed("echo").unwrap();
        assert!(store.is_installed("echo"));
        assert!(!store.state("echo").configured);

        store.mark_configured("echo", true).unwrap();
        assert!(store.state("echo").configured);

        store.mark_uninstalled("echo").unwrap();
        assert!(!store.is_installed("echo"));
        assert!(!store.state("echo").configured);
    }

    #[test]
    fn test_reinstall_resets_configured_flag() {
        let (_dir, store) = temp_store();
        store.mark_installed("echo").unwrap();
        store.mark_configured("echo", true).unwrap();
        store.mark_installed("echo").unwrap();
        assert!(!store.state("echo").configured);
    }

    #[test]
    fn test_uninstall_when_not_installed_is_noop() {
        let (_dir, store) = temp_store();
        let before = store.state("echo");
        store.mark_uninstalled("echo").unwrap();
        assert_eq!(store.state("echo"), before);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("installed.json");
        {
            let store = StateStore::open(path.clone()).unwrap();
            store.mark_installed("echo").unwrap();
            store.mark_installed("scribe").unwrap();
            store.mark_uninstalled("scribe").unwrap();
        }
        let store = StateStore::open(path).unwrap();
        assert!(store.is_installed("echo"));
        assert!(!store.is_installed("scribe"));
        assert_eq!(store.installed_ids(), vec!["echo".to_string()]);
    }
}
