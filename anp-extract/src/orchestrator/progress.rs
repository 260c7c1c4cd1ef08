//! Avancement persistant d'une campagne d'extraction
//!
//! Trois ensembles d'identifiants (`completed`, `failed`, `skipped`),
//! réécrits en entier après chaque région. Un seul processus doit écrire
//! dans un fichier donné: aucun verrou n'est pris.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sink::write_atomic;

/// État d'une région dans la campagne
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    NotStarted,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

/// Contenu du fichier d'avancement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub completed: BTreeSet<String>,
    #[serde(default)]
    pub failed: BTreeSet<String>,
    #[serde(default)]
    pub skipped: BTreeSet<String>,
}

impl Progress {
    pub fn state(&self, id: &str) -> RegionState {
        if self.completed.contains(id) {
            RegionState::Completed
        } else if self.failed.contains(id) {
            RegionState::Failed
        } else if self.skipped.contains(id) {
            RegionState::Skipped
        } else {
            RegionState::NotStarted
        }
    }

    /// Place la région dans un seul ensemble (ou aucun)
    pub fn set(&mut self, id: &str, state: RegionState) {
        self.completed.remove(id);
        self.failed.remove(id);
        self.skipped.remove(id);
        let target = match state {
            RegionState::Completed => &mut self.completed,
            RegionState::Failed => &mut self.failed,
            RegionState::Skipped => &mut self.skipped,
            RegionState::NotStarted | RegionState::InProgress => return,
        };
        target.insert(id.to_string());
    }
}

/// Fichier d'avancement et région en cours
pub struct ProgressStore {
    path: PathBuf,
    progress: Progress,
    in_flight: Option<String>,
}

impl ProgressStore {
    /// Lit le fichier s'il existe, sinon part d'un avancement vide
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let progress = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read progress file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse progress file {}", path.display()))?
        } else {
            Progress::default()
        };

        Ok(Self {
            path,
            progress,
            in_flight: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn state(&self, id: &str) -> RegionState {
        if self.in_flight.as_deref() == Some(id) {
            return RegionState::InProgress;
        }
        self.progress.state(id)
    }

    /// Marque la région en cours (non persisté)
    pub fn begin(&mut self, id: &str) {
        self.in_flight = Some(id.to_string());
    }

    /// Enregistre l'issue de la région et réécrit le fichier
    pub fn finish(&mut self, id: &str, state: RegionState) -> Result<()> {
        if self.in_flight.as_deref() == Some(id) {
            self.in_flight = None;
        }
        self.progress.set(id, state);
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.progress)?;
        write_atomic(&self.path, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_are_exclusive() {
        let mut progress = Progress::default();
        progress.set("calakmul", RegionState::Failed);
        assert_eq!(progress.state("calakmul"), RegionState::Failed);
        progress.set("calakmul", RegionState::Completed);
        assert_eq!(progress.state("calakmul"), RegionState::Completed);
        assert!(progress.failed.is_empty());
        assert_eq!(progress.state("other"), RegionState::NotStarted);
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");

        let mut store = ProgressStore::open(&path).unwrap();
        store.begin("b");
        assert_eq!(store.state("b"), RegionState::InProgress);
        store.finish("b", RegionState::Completed).unwrap();
        store.begin("a");
        store.finish("a", RegionState::Skipped).unwrap();

        let reloaded = ProgressStore::open(&path).unwrap();
        assert_eq!(reloaded.state("b"), RegionState::Completed);
        assert_eq!(reloaded.state("a"), RegionState::Skipped);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["completed"], serde_json::json!(["b"]));
        assert_eq!(raw["failed"], serde_json::json!([]));
    }

    #[test]
    fn test_in_flight_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let mut store = ProgressStore::open(&path).unwrap();
        store.begin("crashed");
        store.save().unwrap();

        let reloaded = ProgressStore::open(&path).unwrap();
        assert_eq!(reloaded.state("crashed"), RegionState::NotStarted);
    }
}
