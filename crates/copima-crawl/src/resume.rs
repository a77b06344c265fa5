//! Resume state: per-phase completion flags, per-connection cursors,
//! processed-id sets, and a failure ledger, persisted atomically so a
//! cancelled crawl can pick up where it left off.
//!
//! The failure ledger is additive data on top of spec.md's resume-state
//! shape (§4.6.1): a re-run or a human reading the file can see exactly
//! what was skipped and why, not just what succeeded. `#[serde(default)]`
//! keeps an older resume file without this field loadable.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::phase::Phase;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub phase: String,
    pub entity_id: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// A group or project discovered by the areas phase, carried forward so
/// the resources/repository phases can iterate it on a resumed run without
/// re-walking the areas tree (additive data in the same spirit as the
/// failure ledger below — §4.6.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DiscoveredEntity {
    pub kind: String,
    pub id: String,
    pub full_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseProgress {
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub cursors: HashMap<String, String>,
    #[serde(default)]
    pub completed_ids: HashSet<String>,
    #[serde(default)]
    pub failures: Vec<FailureRecord>,
    #[serde(default)]
    pub discovered: Vec<DiscoveredEntity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeDocument {
    #[serde(default)]
    pub phases: HashMap<String, PhaseProgress>,
}

/// Guards the in-memory resume document and knows how to persist it.
/// Cursor-level resume wins over id-level resume for the same connection
/// (spec §4.6 tie-break) — callers consult `cursor()` first and only fall
/// back to `completed_ids()` when it's `None`.
pub struct ResumeState {
    path: PathBuf,
    doc: Mutex<ResumeDocument>,
}

impl ResumeState {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = common::atomic::read_json_lenient(&path).await?.unwrap_or_default();
        Ok(Self { path, doc: Mutex::new(doc) })
    }

    pub async fn is_phase_completed(&self, phase: Phase) -> bool {
        self.doc.lock().await.phases.get(phase.as_str()).is_some_and(|p| p.completed)
    }

    pub async fn completed_ids(&self, phase: Phase) -> HashSet<String> {
        self.doc.lock().await.phases.get(phase.as_str()).map(|p| p.completed_ids.clone()).unwrap_or_default()
    }

    pub async fn cursor(&self, phase: Phase, connection_key: &str) -> Option<String> {
        self.doc
            .lock()
            .await
            .phases
            .get(phase.as_str())
            .and_then(|p| p.cursors.get(connection_key).cloned())
    }

    pub async fn record_cursor(&self, phase: Phase, connection_key: &str, cursor: Option<String>) {
        let mut doc = self.doc.lock().await;
        let progress = doc.phases.entry(phase.as_str().to_string()).or_default();
        match cursor {
            Some(c) => {
                progress.cursors.insert(connection_key.to_string(), c);
            }
            None => {
                progress.cursors.remove(connection_key);
            }
        }
    }

    pub async fn record_completed_id(&self, phase: Phase, id: impl Into<String>) {
        let mut doc = self.doc.lock().await;
        doc.phases.entry(phase.as_str().to_string()).or_default().completed_ids.insert(id.into());
    }

    pub async fn record_failure(&self, phase: Phase, entity_id: impl Into<String>, message: impl Into<String>, occurred_at: DateTime<Utc>) {
        let mut doc = self.doc.lock().await;
        let phase_name = phase.as_str().to_string();
        doc.phases.entry(phase_name.clone()).or_default().failures.push(FailureRecord {
            phase: phase_name,
            entity_id: entity_id.into(),
            message: message.into(),
            occurred_at,
        });
    }

    pub async fn mark_phase_completed(&self, phase: Phase) {
        self.doc.lock().await.phases.entry(phase.as_str().to_string()).or_default().completed = true;
    }

    pub async fn record_discovered(&self, phase: Phase, entity: DiscoveredEntity) {
        let mut doc = self.doc.lock().await;
        let discovered = &mut doc.phases.entry(phase.as_str().to_string()).or_default().discovered;
        if !discovered.contains(&entity) {
            discovered.push(entity);
        }
    }

    pub async fn discovered(&self, phase: Phase) -> Vec<DiscoveredEntity> {
        self.doc.lock().await.phases.get(phase.as_str()).map(|p| p.discovered.clone()).unwrap_or_default()
    }

    pub async fn flush(&self) -> Result<()> {
        let doc = self.doc.lock().await;
        common::atomic::write_atomic_json(&self.path, &*doc).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_as_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let state = ResumeState::load(dir.path().join("resume.json")).await.unwrap();
        assert!(!state.is_phase_completed(Phase::Areas).await);
        assert!(state.completed_ids(Phase::Areas).await.is_empty());
    }

    #[tokio::test]
    async fn cursor_and_completed_ids_round_trip_through_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.json");
        let state = ResumeState::load(&path).await.unwrap();

        state.record_cursor(Phase::Resources, "projects", Some("cursor-2".into())).await;
        state.record_completed_id(Phase::Resources, "gid://Project/1").await;
        state.flush().await.unwrap();

        let reloaded = ResumeState::load(&path).await.unwrap();
        assert_eq!(reloaded.cursor(Phase::Resources, "projects").await, Some("cursor-2".to_string()));
        assert!(reloaded.completed_ids(Phase::Resources).await.contains("gid://Project/1"));
    }

    #[tokio::test]
    async fn failures_persist_alongside_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.json");
        let state = ResumeState::load(&path).await.unwrap();

        state.record_failure(Phase::Resources, "gid://Project/2", "connectivity error", Utc::now()).await;
        state.flush().await.unwrap();

        let reloaded = ResumeState::load(&path).await.unwrap();
        let doc = reloaded.doc.lock().await;
        let failures = &doc.phases.get("resources").unwrap().failures;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].entity_id, "gid://Project/2");
    }

    #[tokio::test]
    async fn mark_completed_is_observed_by_is_phase_completed() {
        let dir = tempfile::tempdir().unwrap();
        let state = ResumeState::load(dir.path().join("resume.json")).await.unwrap();
        state.mark_phase_completed(Phase::Users).await;
        assert!(state.is_phase_completed(Phase::Users).await);
        assert!(!state.is_phase_completed(Phase::Areas).await);
    }

    #[tokio::test]
    async fn discovered_entities_dedupe_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.json");
        let state = ResumeState::load(&path).await.unwrap();

        let entity = DiscoveredEntity { kind: "group".into(), id: "gid://Group/1".into(), full_path: "org".into() };
        state.record_discovered(Phase::Areas, entity.clone()).await;
        state.record_discovered(Phase::Areas, entity.clone()).await;
        state.flush().await.unwrap();

        let reloaded = ResumeState::load(&path).await.unwrap();
        assert_eq!(reloaded.discovered(Phase::Areas).await, vec![entity]);
    }

    #[tokio::test]
    async fn corrupt_resume_file_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let state = ResumeState::load(&path).await.unwrap();
        assert!(!state.is_phase_completed(Phase::Areas).await);
        assert!(path.with_extension("bak").exists());
    }
}
