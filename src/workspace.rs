use anyhow::{anyhow, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// One editable entry from the agent's data.json `editable` map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigField {
    pub key: String,
    pub value: String,
}

fn data_json_path(agents_dir: &Path, agent_id: &str) -> PathBuf {
    agents_dir.join(agent_id).join("data.json")
}

fn field_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Load the editable configuration fields for an installed agent.
/// Returns None when the agent ships no data.json or declares nothing
/// editable.
pub fn load_editable_fields(agents_dir: &Path, agent_id: &str) -> Result<Option<Vec<ConfigField>>> {
    let path = data_json_path(agents_dir, agent_id);
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path)?;
    let data: Value = serde_json::from_str(&content)?;
    let Some(editable) = data.get("editable").and_then(Value::as_object) else {
        return Ok(None);
    };

    let fields = editable
        .iter()
        .map(|(key, entry)| {
            // Entries are {"value": ...}; bare values are tolerated
            let value = entry.get("value").unwrap_or(entry);
            ConfigField {
                key: key.clone(),
                value: field_value_to_string(value),
            }
        })
        .collect();
    Ok(Some(fields))
}

/// Write the edited values back into data.json, preserving everything else
/// in the file. Strings that parse as JSON keep their original type.
pub fn save_editable_fields(
    agents_dir: &Path,
    agent_id: &str,
    fields: &[ConfigField],
) -> Result<()> {
    let path = data_json_path(agents_dir, agent_id);
    let content = fs::read_to_string(&path)?;
    let mut data: Value = serde_json::from_str(&content)?;

    let editable = data
        .get_mut("editable")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| anyhow!("data.json for {} has no editable section", agent_id))?;

    for field in fields {
        let new_value = serde_json::from_str::<Value>(&field.value)
            .ok()
            .filter(|v| !v.is_string())
            .unwrap_or(Value::String(field.value.clone()));
        match editable.get_mut(&field.key) {
            Some(Value::Object(entry)) => {
                entry.insert("value".to_string(), new_value);
            }
            Some(entry) => *entry = new_value,
            None => {
                editable.insert(field.key.clone(), new_value);
            }
        }
    }

    fs::write(&path, serde_json::to_string_pretty(&data)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA_JSON: &str = r#"{
        "version": 2,
        "editable": {
            "api_key": {"value": "abc123", "label": "API key"},
            "max_tokens": {"value": 2048}
        }
    }"#;

    fn write_agent(dir: &Path, agent_id: &str, content: &str) {
        let agent_dir = dir.join(agent_id);
        fs::create_dir_all(&agent_dir).unwrap();
        fs::write(agent_dir.join("data.json"), content).unwrap();
    }

    #[test]
    fn test_load_fields_stringifies_values() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "forge", DATA_JSON);

        let fields = load_editable_fields(dir.path(), "forge").unwrap().unwrap();
        assert_eq!(fields.len(), 2);
        assert!(fields.contains(&ConfigField {
            key: "api_key".to_string(),
            value: "abc123".to_string(),
        }));
        assert!(fields.contains(&ConfigField {
            key: "max_tokens".to_string(),
            value: "2048".to_string(),
        }));
    }

    #[test]
    fn test_missing_data_json_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_editable_fields(dir.path(), "ghost").unwrap().is_none());
    }

    #[test]
    fn test_no_editable_section_is_none() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "forge", r#"{"version": 2}"#);
        assert!(load_editable_fields(dir.path(), "forge").unwrap().is_none());
    }

    #[test]
    fn test_save_round_trips_and_preserves_rest() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "forge", DATA_JSON);

        let fields = vec![
            ConfigField {
                key: "api_key".to_string(),
                value: "new-key".to_string(),
            },
            ConfigField {
                key: "max_tokens".to_string(),
                value: "4096".to_string(),
            },
        ];
        save_editable_fields(dir.path(), "forge", &fields).unwrap();

        let content = fs::read_to_string(dir.path().join("forge/data.json")).unwrap();
        let data: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(data["version"], 2);
        assert_eq!(data["editable"]["api_key"]["value"], "new-key");
        assert_eq!(data["editable"]["api_key"]["label"], "API key");
        // Numeric-looking input keeps its numeric type
        assert_eq!(data["editable"]["max_tokens"]["value"], 4096);

        let reloaded = load_editable_fields(dir.path(), "forge").unwrap().unwrap();
        assert!(reloaded.contains(&ConfigField {
            key: "api_key".to_string(),
            value: "new-key".to_string(),
        }));
    }
}
