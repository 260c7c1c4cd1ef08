//! Rapport de campagne d'extraction
//!
//! Collecte l'issue de chaque région (réussie, ignorée, en échec, déjà
//! faite) et les échecs absorbés, puis les affiche ou les sauvegarde en JSON.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::error::ErrorTally;

/// Statut global de la campagne
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchStatus {
    /// Aucune région en échec
    Success,
    /// Des régions réussies et d'autres en échec
    PartialSuccess,
    /// Uniquement des échecs
    Failed,
}

/// Région associée à un motif
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionNote {
    pub region: String,
    pub reason: String,
}

/// Rapport complet d'une passe
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Clé du jeu de données
    pub dataset: String,
    /// Numéro de tentative (1 = passe normale)
    pub attempt: u32,
    pub duration_secs: f64,
    pub status: BatchStatus,

    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub already_completed: usize,
    /// Réussies mais sans donnée exploitable
    pub without_data: usize,

    pub failed_regions: Vec<RegionNote>,
    pub skipped_regions: Vec<RegionNote>,
    /// Issues non persistées: l'avancement sur disque peut être en retard
    pub progress_not_saved: Vec<RegionNote>,
    /// Échecs absorbés, toutes régions confondues
    pub errors: ErrorTally,
}

impl BatchReport {
    pub fn new(dataset: &str, attempt: u32) -> Self {
        Self {
            dataset: dataset.to_string(),
            attempt,
            duration_secs: 0.0,
            status: BatchStatus::Success,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            already_completed: 0,
            without_data: 0,
            failed_regions: Vec::new(),
            skipped_regions: Vec::new(),
            progress_not_saved: Vec::new(),
            errors: ErrorTally::default(),
        }
    }

    /// Enregistre une région extraite avec succès
    pub fn record_success(&mut self, data_available: bool, errors: &ErrorTally) {
        self.succeeded += 1;
        if !data_available {
            self.without_data += 1;
        }
        self.errors.merge(errors);
    }

    pub fn record_skip(&mut self, region: &str, reason: &str) {
        self.skipped += 1;
        self.skipped_regions.push(RegionNote {
            region: region.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn record_failure(&mut self, region: &str, reason: &str) {
        self.failed += 1;
        self.failed_regions.push(RegionNote {
            region: region.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn record_progress_failure(&mut self, region: &str, reason: &str) {
        self.progress_not_saved.push(RegionNote {
            region: region.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Région déjà terminée lors d'une exécution précédente
    pub fn record_already_completed(&mut self) {
        self.already_completed += 1;
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        self.status = if self.failed == 0 {
            BatchStatus::Success
        } else if self.succeeded > 0 || self.skipped > 0 || self.already_completed > 0 {
            BatchStatus::PartialSuccess
        } else {
            BatchStatus::Failed
        };
    }

    /// Identifiants en échec, à repasser avec `retry`
    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed_regions.iter().map(|n| n.region.as_str()).collect()
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("EXTRACTION REPORT - {} (attempt {})", self.dataset, self.attempt);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Regions: {} succeeded, {} skipped, {} failed, {} already completed",
            self.succeeded, self.skipped, self.failed, self.already_completed
        );
        if self.without_data > 0 {
            println!("  {} succeeded without usable data", self.without_data);
        }

        if self.errors.total() > 0 {
            println!("\n--- ABSORBED FAILURES ---");
            println!("  malformed input: {}", self.errors.malformed_input);
            println!("  no data available: {}", self.errors.no_data_available);
            println!("  transient backend errors: {}", self.errors.transient_backend_error);
            println!("  partial fields missing: {}", self.errors.partial_field_missing);
        }

        if !self.progress_not_saved.is_empty() {
            println!("\n--- PROGRESS NOT SAVED ({}) ---", self.progress_not_saved.len());
            for note in &self.progress_not_saved {
                println!("  [{}] {}", note.region, note.reason);
            }
            println!("  Progress file may be stale: these regions can be reprocessed on resume");
        }

        if !self.skipped_regions.is_empty() {
            println!("\n--- SKIPPED ({}) ---", self.skipped_regions.len());
            for note in self.skipped_regions.iter().take(10) {
                println!("  [{}] {}", note.region, note.reason);
            }
            if self.skipped_regions.len() > 10 {
                println!("  ... and {} more", self.skipped_regions.len() - 10);
            }
        }

        if !self.failed_regions.is_empty() {
            println!("\n--- FAILED ({}) ---", self.failed_regions.len());
            for note in &self.failed_regions {
                println!("  [{}] {}", note.region, note.reason);
            }
            println!("\nRun `anp-extract retry {}` to retry failed regions", self.dataset);
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{}: {} succeeded, {} skipped, {} failed",
            self.dataset, self.succeeded, self.skipped, self.failed
        );
        if !self.progress_not_saved.is_empty() {
            summary.push_str(&format!(", {} progress writes failed", self.progress_not_saved.len()));
        }
        summary
    }
}
