use crate::error::CheckpointError;
use crate::research::{ResearchQuestion, SubagentResult, TaskGraph};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const RUNS_DIR: &str = "runs";
const CHECKPOINT_VERSION: u32 = 1;

/// On-disk snapshot of a run, enough to resume it without re-decomposing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub version: u32,
    pub question: ResearchQuestion,
    pub graph: TaskGraph,
    #[serde(default)]
    pub completed: BTreeMap<String, SubagentResult>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(question: ResearchQuestion, graph: TaskGraph) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            question,
            graph,
            completed: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// `<state_dir>/runs/<runId>.json`
    pub fn path_for(state_dir: &Path, run_id: &str) -> PathBuf {
        state_dir.join(RUNS_DIR).join(format!("{}.json", run_id))
    }

    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let content = fs::read_to_string(path).map_err(|e| CheckpointError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save under `state_dir`, replacing any previous snapshot of this run
    pub fn save(&self, state_dir: &Path) -> Result<PathBuf, CheckpointError> {
        let path = Self::path_for(state_dir, &self.graph.run_id);
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), CheckpointError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write then rename so an interrupted save never leaves a torn file
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Record a finished task; results for tasks outside the graph are ignored
    pub fn record_result(&mut self, result: SubagentResult) -> bool {
        if self.graph.task(&result.task_id).is_none() {
            return false;
        }
        self.completed.insert(result.task_id.clone(), result);
        self.updated_at = Utc::now();
        true
    }

    pub fn remaining(&self) -> usize {
        self.graph
            .tasks
            .iter()
            .filter(|t| !self.completed.contains_key(&t.id))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::decomposer::fallback_graph;
    use crate::research::executor::fallback_result;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let graph = fallback_graph("Q");
        let mut checkpoint = Checkpoint::new(
            ResearchQuestion::new("Q").with_context(Some("ctx".to_string())),
            graph.clone(),
        );
        assert!(checkpoint.record_result(fallback_result(&graph.tasks[0], "Q")));

        let path = checkpoint.save(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("runs").join(format!("{}.json", graph.run_id)));

        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded.graph, checkpoint.graph);
        assert_eq!(loaded.question, checkpoint.question);
        assert_eq!(loaded.completed.len(), 1);
        assert!(loaded.completed["T1"].fallback);
        assert_eq!(loaded.remaining(), 4);
    }

    #[test]
    fn test_save_overwrites_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let graph = fallback_graph("Q");
        let mut checkpoint = Checkpoint::new(ResearchQuestion::new("Q"), graph.clone());
        checkpoint.save(dir.path()).unwrap();

        for task in &graph.tasks {
            checkpoint.record_result(fallback_result(task, "Q"));
        }
        let path = checkpoint.save(dir.path()).unwrap();

        assert_eq!(Checkpoint::load(&path).unwrap().remaining(), 0);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_unknown_task_ignored() {
        let graph = fallback_graph("Q");
        let mut checkpoint = Checkpoint::new(ResearchQuestion::new("Q"), graph);
        let mut stray = fallback_result(&crate::research::graph::task("T99", &[]), "Q");
        stray.task_id = "T99".to_string();

        assert!(!checkpoint.record_result(stray));
        assert!(checkpoint.completed.is_empty());
    }

    #[test]
    fn test_load_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Checkpoint::load(&dir.path().join("missing.json")),
            Err(CheckpointError::Read { .. })
        ));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{not json").unwrap();
        assert!(matches!(
            Checkpoint::load(&bad),
            Err(CheckpointError::Malformed(_))
        ));
    }
}
