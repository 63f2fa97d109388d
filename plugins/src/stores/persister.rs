use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use taskweave_core::hooks::StatePersister;
use taskweave_core::model::WorkflowSnapshot;

/// One pretty-printed JSON file per workflow id under `dir`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never sees a half-written snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileStatePersister {
    dir: PathBuf,
}

impl JsonFileStatePersister {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, workflow_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(workflow_id)))
    }
}

/// Keeps ids usable as file names.
fn file_stem(workflow_id: &str) -> String {
    workflow_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl StatePersister for JsonFileStatePersister {
    async fn save(&self, workflow_id: &str, snapshot: &WorkflowSnapshot) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create snapshot dir: {}", self.dir.display()))?;

        let path = self.path_for(workflow_id);
        let tmp = path.with_extension("json.tmp");
        let json = snapshot.to_json()?;
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write snapshot: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move snapshot into place: {}", path.display()))?;

        tracing::debug!(
            target: "taskweave.persist",
            workflow_id,
            status = %snapshot.status,
            path = %path.display(),
            "snapshot saved"
        );
        Ok(())
    }

    async fn load(&self, workflow_id: &str) -> Result<Option<WorkflowSnapshot>> {
        let path = self.path_for(workflow_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read snapshot: {}", path.display()))
            }
        };
        WorkflowSnapshot::from_json(&raw).map(Some)
    }
}

/// Latest snapshot per workflow id, kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryStatePersister {
    snapshots: Mutex<HashMap<String, WorkflowSnapshot>>,
}

impl InMemoryStatePersister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StatePersister for InMemoryStatePersister {
    async fn save(&self, workflow_id: &str, snapshot: &WorkflowSnapshot) -> Result<()> {
        self.snapshots
            .lock()
            .map_err(|_| anyhow!("snapshot store lock poisoned"))?
            .insert(workflow_id.to_string(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, workflow_id: &str) -> Result<Option<WorkflowSnapshot>> {
        Ok(self
            .snapshots
            .lock()
            .map_err(|_| anyhow!("snapshot store lock poisoned"))?
            .get(workflow_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use taskweave_core::model::WorkflowState;

    fn snapshot(workflow_id: &str) -> WorkflowSnapshot {
        WorkflowState::new(workflow_id, ["a", "b"]).snapshot()
    }

    #[tokio::test]
    async fn test_json_file_roundtrip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let persister = JsonFileStatePersister::new(dir.path().join("snapshots"));

        assert_eq!(persister.load("wf-1").await.unwrap(), None);

        let first = snapshot("wf-1");
        persister.save("wf-1", &first).await.unwrap();
        let mut second = snapshot("wf-1");
        second.progress = 0.5;
        persister.save("wf-1", &second).await.unwrap();

        let loaded = persister.load("wf-1").await.unwrap().unwrap();
        assert_eq!(loaded, second);
        assert!(!persister.path_for("wf-1").with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_json_file_sanitizes_ids() {
        let dir = tempfile::tempdir().unwrap();
        let persister = JsonFileStatePersister::new(dir.path());
        persister.save("team/etl run", &snapshot("team/etl run")).await.unwrap();

        assert_eq!(
            persister.path_for("team/etl run"),
            dir.path().join("team_etl_run.json")
        );
        assert!(persister.load("team/etl run").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_json_file_rejects_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let persister = JsonFileStatePersister::new(dir.path());
        std::fs::write(persister.path_for("wf"), "{not json").unwrap();

        let err = persister.load("wf").await.unwrap_err();
        assert!(err.to_string().contains("Failed to deserialize workflow snapshot"));
    }

    #[tokio::test]
    async fn test_in_memory_keeps_latest() {
        let persister = InMemoryStatePersister::new();
        assert!(persister.is_empty());

        persister.save("wf", &snapshot("wf")).await.unwrap();
        let mut later = snapshot("wf");
        later.progress = 1.0;
        persister.save("wf", &later).await.unwrap();

        assert_eq!(persister.len(), 1);
        assert_eq!(persister.load("wf").await.unwrap().unwrap().progress, 1.0);
        assert_eq!(persister.load("other").await.unwrap(), None);
    }
}
