//! Persistance des résultats par région
//!
//! Le fichier `<id>_data.json` de chaque région reçoit, sous
//! `datasets.<clé>`, l'objet `{source, extracted_at, data}`. Les autres
//! clés du fichier sont conservées telles quelles.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Résultat stocké pour un jeu de données
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDataset {
    pub source: String,
    pub extracted_at: DateTime<Utc>,
    pub data: Value,
}

/// Destination des résultats d'extraction
pub trait ResultSink {
    /// Dernier résultat stocké pour (région, jeu)
    fn load(&self, region_id: &str, dataset: &str) -> Result<Option<Value>>;

    fn store(&self, region_id: &str, dataset: &str, source: &str, data: &Value) -> Result<()>;
}

/// Sink sur les fichiers JSON du répertoire de données
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, region_id: &str) -> PathBuf {
        self.dir.join(format!("{}_data.json", region_id))
    }

    fn read_document(&self, path: &Path) -> Result<Map<String, Value>> {
        if !path.exists() {
            return Ok(Map::new());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        match serde_json::from_str::<Value>(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?
        {
            Value::Object(map) => Ok(map),
            _ => anyhow::bail!("{} is not a JSON object", path.display()),
        }
    }
}

impl ResultSink for JsonFileSink {
    fn load(&self, region_id: &str, dataset: &str) -> Result<Option<Value>> {
        let document = self.read_document(&self.path_for(region_id))?;
        let Some(entry) = document.get("datasets").and_then(|d| d.get(dataset)) else {
            return Ok(None);
        };

        // Entrée enveloppée, ou résultat brut des fichiers plus anciens
        match serde_json::from_value::<StoredDataset>(entry.clone()) {
            Ok(stored) => Ok(Some(stored.data)),
            Err(_) => Ok(Some(entry.clone())),
        }
    }

    fn store(&self, region_id: &str, dataset: &str, source: &str, data: &Value) -> Result<()> {
        let path = self.path_for(region_id);
        let mut document = self.read_document(&path)?;

        let stored = StoredDataset {
            source: source.to_string(),
            extracted_at: Utc::now(),
            data: data.clone(),
        };
        let datasets = document
            .entry("datasets")
            .or_insert_with(|| Value::Object(Map::new()));
        if !datasets.is_object() {
            *datasets = Value::Object(Map::new());
        }
        if let Value::Object(map) = datasets {
            map.insert(dataset.to_string(), serde_json::to_value(&stored)?);
        }

        let content = serde_json::to_string_pretty(&Value::Object(document))?;
        write_atomic(&path, &content)
    }
}

/// Écrit dans un fichier temporaire voisin puis renomme
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
