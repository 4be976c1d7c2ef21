use crate::config::{self, SchoolConfig};
use crate::model::{ClassRecord, Student};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const WORKSPACE_FILE: &str = "workspace.json";
pub const WORKSPACE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceData {
    pub version: u32,
    #[serde(default)]
    pub classes: Vec<ClassRecord>,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl Default for WorkspaceData {
    fn default() -> Self {
        Self {
            version: WORKSPACE_VERSION,
            classes: Vec::new(),
            students: Vec::new(),
            settings: BTreeMap::new(),
        }
    }
}

/// Whole-document store: everything lives in memory and every mutation is
/// followed by `commit`, which rewrites `workspace.json`. `committed` mirrors
/// the last document that reached disk.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    pub data: WorkspaceData,
    committed: WorkspaceData,
}

pub fn workspace_file(workspace: &Path) -> PathBuf {
    workspace.join(WORKSPACE_FILE)
}

pub fn parse_workspace_bytes(bytes: &[u8]) -> anyhow::Result<WorkspaceData> {
    let text = std::str::from_utf8(bytes).context("workspace.json is not UTF-8")?;
    parse_workspace(text)
}

pub fn parse_workspace(text: &str) -> anyhow::Result<WorkspaceData> {
    let data: WorkspaceData =
        serde_json::from_str(text).context("workspace.json is invalid JSON")?;
    if data.version > WORKSPACE_VERSION {
        return Err(anyhow!(
            "workspace version {} is newer than supported version {}",
            data.version,
            WORKSPACE_VERSION
        ));
    }
    Ok(data)
}

impl Store {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(workspace).with_context(|| {
            format!("failed to create workspace {}", workspace.to_string_lossy())
        })?;
        let path = workspace_file(workspace);
        let data = if path.is_file() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
            parse_workspace(&text)?
        } else {
            debug!(path = %path.display(), "no workspace document yet, starting empty");
            WorkspaceData::default()
        };
        Ok(Self {
            path,
            committed: data.clone(),
            data,
        })
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let text =
            serde_json::to_string_pretty(&self.data).context("failed to serialize workspace")?;
        let tmp = self.path.with_extension("json.saving");
        std::fs::write(&tmp, text)
            .with_context(|| format!("failed to write {}", tmp.to_string_lossy()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to move workspace into {}", self.path.to_string_lossy()))?;
        Ok(())
    }

    /// Saves pending edits. On a failed write the in-memory document goes
    /// back to the last committed state.
    pub fn commit(&mut self) -> anyhow::Result<()> {
        match self.save() {
            Ok(()) => {
                self.committed = self.data.clone();
                Ok(())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %format!("{e:#}"), "save failed, edits rolled back");
                self.data = self.committed.clone();
                Err(e)
            }
        }
    }

    pub fn class(&self, class_id: &str) -> Option<&ClassRecord> {
        self.data.classes.iter().find(|c| c.id == class_id)
    }

    pub fn class_mut(&mut self, class_id: &str) -> Option<&mut ClassRecord> {
        self.data.classes.iter_mut().find(|c| c.id == class_id)
    }

    pub fn student(&self, student_id: &str) -> Option<&Student> {
        self.data.students.iter().find(|s| s.id == student_id)
    }

    pub fn student_mut(&mut self, student_id: &str) -> Option<&mut Student> {
        self.data.students.iter_mut().find(|s| s.id == student_id)
    }

    /// Students of a class in display (`sort_order`) order.
    pub fn class_students(&self, class_id: &str) -> Vec<Student> {
        let mut students: Vec<Student> = self
            .data
            .students
            .iter()
            .filter(|s| s.class_id == class_id)
            .cloned()
            .collect();
        students.sort_by_key(|s| s.sort_order);
        students
    }

    pub fn next_sort_order(&self, class_id: &str) -> i64 {
        self.data
            .students
            .iter()
            .filter(|s| s.class_id == class_id)
            .map(|s| s.sort_order + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn settings_get_json(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.settings.get(key)
    }

    pub fn settings_set_json(&mut self, key: &str, value: serde_json::Value) {
        self.data.settings.insert(key.to_string(), value);
    }

    pub fn settings_remove(&mut self, key: &str) {
        self.data.settings.remove(key);
    }

    pub fn school_config(&self) -> SchoolConfig {
        let Some(raw) = self.settings_get_json(config::SETTINGS_KEY) else {
            return SchoolConfig::default();
        };
        let cfg = match serde_json::from_value::<SchoolConfig>(raw.clone()) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(error = %e, "stored school config is unreadable, using defaults");
                return SchoolConfig::default();
            }
        };
        match cfg.validated() {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(error = %e, "stored school config is invalid, using defaults");
                SchoolConfig::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn student(id: &str, class_id: &str, sort_order: i64) -> Student {
        Student {
            id: id.to_string(),
            class_id: class_id.to_string(),
            last_name: "Diallo".to_string(),
            first_name: id.to_string(),
            sort_order,
            grades: Vec::new(),
            bonuses: BTreeMap::new(),
            updated_at: None,
        }
    }

    #[test]
    fn save_then_reopen_keeps_records() {
        let ws = temp_dir("bulletind-store");
        let mut store = Store::open(&ws).expect("open store");
        store.data.classes.push(ClassRecord {
            id: "c1".into(),
            name: "5ème B".into(),
        });
        store.data.students.push(student("s2", "c1", 1));
        store.data.students.push(student("s1", "c1", 0));
        store.save().expect("save");

        let reopened = Store::open(&ws).expect("reopen");
        assert_eq!(reopened.class("c1").map(|c| c.name.as_str()), Some("5ème B"));
        let ids: Vec<String> = reopened.class_students("c1").into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(reopened.next_sort_order("c1"), 2);
        assert_eq!(reopened.next_sort_order("other"), 0);

        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn newer_version_is_rejected() {
        let text = r#"{"version":99,"classes":[],"students":[],"settings":{}}"#;
        assert!(parse_workspace(text).is_err());
    }

    #[test]
    fn unreadable_config_falls_back_to_defaults() {
        let ws = temp_dir("bulletind-store-cfg");
        let mut store = Store::open(&ws).expect("open store");
        store.settings_set_json(config::SETTINGS_KEY, serde_json::json!({ "subjects": 7 }));
        assert_eq!(store.school_config(), SchoolConfig::default());
        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn stored_config_is_normalised_on_load() {
        let ws = temp_dir("bulletind-store-cfg-dupes");
        let mut store = Store::open(&ws).expect("open store");
        store.settings_set_json(
            config::SETTINGS_KEY,
            serde_json::json!({ "subjects": ["SVT", " SVT", "Anglais"] }),
        );
        assert_eq!(
            store.school_config().subjects,
            vec!["SVT".to_string(), "Anglais".to_string()]
        );

        store.settings_set_json(
            config::SETTINGS_KEY,
            serde_json::json!({ "subjectWeights": { "SVT": 0 } }),
        );
        assert_eq!(store.school_config(), SchoolConfig::default());
        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn failed_commit_rolls_back_edits() {
        let ws = temp_dir("bulletind-store-rollback");
        let mut store = Store::open(&ws).expect("open store");
        store.data.classes.push(ClassRecord {
            id: "c1".into(),
            name: "CM2".into(),
        });
        store.commit().expect("first commit");

        std::fs::remove_dir_all(&ws).expect("remove workspace dir");
        store.data.classes.push(ClassRecord {
            id: "c2".into(),
            name: "Fantôme".into(),
        });
        assert!(store.commit().is_err());
        let ids: Vec<&str> = store.data.classes.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1"]);
    }

    #[test]
    fn non_workspace_json_is_rejected() {
        assert!(parse_workspace_bytes(br#"{"foo":1}"#).is_err());
        assert!(parse_workspace_bytes(&[0xff, 0xfe]).is_err());
        assert!(parse_workspace_bytes(br#"{"version":1}"#).is_ok());
    }
}
