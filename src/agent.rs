use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Platforms an agent build can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    MacArm64,
    MacX64,
    LinuxArm64,
    LinuxX64,
    WindowsX64,
}

impl Platform {
    /// Detect the platform of the running process. Pure and synchronous;
    /// returns None on combinations no agent publishes builds for.
    pub fn detect() -> Option<Platform> {
        match (std::env::consts::OS, std::env::consts::ARCH) {
            ("macos", "aarch64") => Some(Platform::MacArm64),
            ("macos", "x86_64") => Some(Platform::MacX64),
            ("linux", "aarch64") => Some(Platform::LinuxArm64),
            ("linux", "x86_64") => Some(Platform::LinuxX64),
            ("windows", "x86_64") => Some(Platform::WindowsX64),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Platform::MacArm64 => "macOS (Apple Silicon)",
            Platform::MacX64 => "macOS (Intel)",
            Platform::LinuxArm64 => "Linux (arm64)",
            Platform::LinuxX64 => "Linux (x64)",
            Platform::WindowsX64 => "Windows (x64)",
        }
    }
}

/// A per-platform downloadable artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub platform: Platform,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// An installable agent as published in the registry. Read-only here;
/// install state lives in the local state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub builds: Vec<Build>,
    #[serde(default)]
    pub data_endpoint: Option<String>,
    #[serde(default)]
    pub chat_endpoint: Option<String>,
    /// Shell commands declared by the agent manifest, keyed by action
    /// name ("setup", "agent", "run").
    #[serde(default)]
    pub commands: BTreeMap<String, String>,
}

impl Agent {
    pub fn build_for(&self, platform: Platform) -> Option<&Build> {
        self.builds.iter().find(|b| b.platform == platform)
    }

    /// Whether the install control should be enabled at all.
    pub fn installable_on(&self, platform: Option<Platform>) -> bool {
        platform.map(|p| self.build_for(p).is_some()).unwrap_or(false)
    }
}

const BUILTIN_CATALOG: &str = include_str!("builtin_agents.json");

pub struct AgentCatalog {
    agents: Vec<Agent>,
}

impl AgentCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        let agents: Vec<Agent> = serde_json::from_str(json)?;
        Ok(Self { agents })
    }

    /// The catalog bundled with the binary, used when the registry is
    /// unreachable.
    pub fn builtin() -> Self {
        // The bundled catalog is validated by tests; a parse failure here
        // would be a packaging bug, so fall back to empty rather than die.
        Self::from_json(BUILTIN_CATALOG).unwrap_or_else(|_| Self { agents: Vec::new() })
    }

    pub async fn fetch(client: &Client, url: &str) -> Result<Self> {
        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("Registry request failed with status: {}", response.status()));
        }
        let agents: Vec<Agent> = response.json().await?;
        Ok(Self { agents })
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Distinct category names in catalog order.
    pub fn categories(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for agent in &self.agents {
            if let Some(cat) = &agent.category {
                if !seen.iter().any(|c| c == cat) {
                    seen.push(cat.clone());
                }
            }
        }
        seen
    }

    /// Indices of agents matching the search text and category filter.
    pub fn filter(&self, query: &str, category: Option<&str>) -> Vec<usize> {
        let needle = query.to_lowercase();
        self.agents
            .iter()
            .enumerate()
            .filter(|(_, a)| {
                if let Some(cat) = category {
                    if a.category.as_deref() != Some(cat) {
                        return false;
                    }
                }
                if needle.is_empty() {
                    return true;
                }
                a.name.to_lowercase().contains(&needle)
                    || a.author.to_lowercase().contains(&needle)
                    || a.description.to_lowercase().contains(&needle)
            })
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> AgentCatalog {
        AgentCatalog::from_json(
            r#"[
                {
                    "id": "echo",
                    "name": "Echo Agent",
                    "author": "acme",
                    "description": "Repeats what you say",
                    "category": "utilities",
                    "builds": [
                        {"platform": "mac-arm64", "url": "https://example.com/echo-mac"},
                        {"platform": "linux-x64", "url": "https://example.com/echo-linux"}
                    ]
                },
                {
                    "id": "scribe",
                    "name": "Scribe",
                    "author": "inkwell",
                    "category": "writing",
                    "builds": []
                }
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_build_for_matching_platform() {
        let catalog = sample_catalog();
        let echo = catalog.get("echo").unwrap();
        assert!(echo.build_for(Platform::MacArm64).is_some());
        assert!(echo.build_for(Platform::WindowsX64).is_none());
    }

    #[test]
    fn test_installable_requires_platform_and_build() {
        let catalog = sample_catalog();
        let echo = catalog.get("echo").unwrap();
        let scribe = catalog.get("scribe").unwrap();
        assert!(echo.installable_on(Some(Platform::LinuxX64)));
        assert!(!echo.installable_on(None));
        assert!(!scribe.installable_on(Some(Platform::LinuxX64)));
    }

    #[test]
    fn test_filter_by_text_and_category() {
        let catalog = sample_catalog();
        assert_eq!(catalog.filter("", None).len(), 2);
        assert_eq!(catalog.filter("repeats", None), vec![0]);
        assert_eq!(catalog.filter("", Some("writing")), vec![1]);
        assert!(catalog.filter("nothing-matches", None).is_empty());
    }

    #[test]
    fn test_categories_are_deduped_in_order() {
        let catalog = sample_catalog();
        assert_eq!(catalog.categories(), vec!["utilities", "writing"]);
    }

    #[test]
    fn test_builtin_catalog_parses() {
        let catalog = AgentCatalog::builtin();
        assert!(!catalog.agents().is_empty());
    }
}
