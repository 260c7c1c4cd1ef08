//! Orchestration des extractions sur une collection de régions
//!
//! Traitement séquentiel, dans l'ordre lexicographique des identifiants:
//! 1. région déjà `completed` → non retraitée (sauf `force`)
//! 2. résultat déjà stocké satisfaisant le prédicat du jeu → `skipped`
//! 3. extraction sous délai maximal → `completed` ou `failed`, persisté
//!    immédiatement
//! 4. pause minimale avant la région suivante (quota du backend)
//!
//! Une passe de reprise ne reprend que les régions `failed`, avec un délai
//! multiplié à chaque tentative.

pub mod progress;

use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use zonal::RegionGeometry;

use crate::backend::AnalyticsBackend;
use crate::config::{BatchConfig, ExtractConfig};
use crate::datasets::{self, DatasetKind};
use crate::error::{ErrorTally, FailureKind};
use crate::reducer::ZonalReducer;
use crate::registry::RegionEntry;
use crate::report::BatchReport;
use crate::sink::ResultSink;

pub use progress::{Progress, ProgressStore, RegionState};

/// Options d'une campagne
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Ignore l'avancement et les résultats existants
    pub force: bool,
    /// Conserve tout résultat existant, même incomplet
    pub skip_existing: bool,
    pub rate_limit: Duration,
    pub region_timeout: Duration,
    pub retry_multiplier: u32,
}

impl BatchOptions {
    pub fn from_config(batch: &BatchConfig) -> Self {
        Self {
            force: false,
            skip_existing: false,
            rate_limit: batch.rate_limit(),
            region_timeout: batch.region_timeout(),
            retry_multiplier: batch.retry_timeout_multiplier,
        }
    }
}

/// Délai de la tentative `attempt` (1 = passe normale)
pub fn timeout_for_attempt(base: Duration, attempt: u32, multiplier: u32) -> Duration {
    let factor = multiplier.max(1).saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
}

/// Issue du traitement d'une région
#[derive(Debug, Clone, PartialEq)]
pub enum RegionOutcome {
    Completed {
        data_available: bool,
        errors: ErrorTally,
    },
    Skipped(String),
    Failed(String),
}

/// Pilote une campagne pour un jeu de données
pub struct Orchestrator<'a, B, S> {
    reducer: &'a ZonalReducer<B>,
    sink: &'a S,
    config: &'a ExtractConfig,
    dataset: DatasetKind,
    options: BatchOptions,
    progress: ProgressStore,
}

impl<'a, B: AnalyticsBackend, S: ResultSink> Orchestrator<'a, B, S> {
    pub fn new(
        reducer: &'a ZonalReducer<B>,
        sink: &'a S,
        config: &'a ExtractConfig,
        dataset: DatasetKind,
        progress: ProgressStore,
        options: BatchOptions,
    ) -> Self {
        Self {
            reducer,
            sink,
            config,
            dataset,
            options,
            progress,
        }
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    /// Passe normale sur les régions fournies
    pub async fn run(&mut self, regions: &[RegionEntry]) -> BatchReport {
        self.run_pass(regions, 1).await
    }

    /// Reprend uniquement les régions en échec, avec un délai allongé
    pub async fn retry_failed(&mut self, regions: &[RegionEntry]) -> BatchReport {
        let failed: Vec<RegionEntry> = regions
            .iter()
            .filter(|r| self.progress.state(&r.id) == RegionState::Failed)
            .cloned()
            .collect();
        info!(dataset = %self.dataset, count = failed.len(), "Retrying failed regions");
        self.run_pass(&failed, 2).await
    }

    async fn run_pass(&mut self, regions: &[RegionEntry], attempt: u32) -> BatchReport {
        let started = Instant::now();
        let mut report = BatchReport::new(self.dataset.key(), attempt);

        let mut ordered: Vec<&RegionEntry> = regions.iter().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));
        let total = ordered.len();

        let timeout = timeout_for_attempt(self.options.region_timeout, attempt, self.options.retry_multiplier);
        info!(
            dataset = %self.dataset,
            regions = total,
            attempt,
            timeout_secs = timeout.as_secs_f64(),
            "Starting extraction pass"
        );

        let mut backend_used = false;
        for (index, entry) in ordered.into_iter().enumerate() {
            let position = format!("[{}/{}]", index + 1, total);

            if !self.options.force && self.progress.state(&entry.id) == RegionState::Completed {
                report.record_already_completed();
                continue;
            }

            if let Some(reason) = self.skip_reason(entry) {
                println!("{} {}: SKIPPED ({})", position, entry.id, reason);
                self.persist(&entry.id, RegionState::Skipped, &mut report);
                report.record_skip(&entry.id, &reason);
                continue;
            }

            let geometry = match entry.geometry() {
                Ok(geometry) => geometry,
                Err(e) => {
                    warn!(region = %entry.id, error = %e, "Malformed region geometry");
                    println!("{} {}: SKIPPED ({})", position, entry.id, e);
                    report.errors.record(FailureKind::MalformedInput, e.to_string());
                    self.persist(&entry.id, RegionState::Skipped, &mut report);
                    report.record_skip(&entry.id, &e.to_string());
                    continue;
                }
            };

            if backend_used && !self.options.rate_limit.is_zero() {
                tokio::time::sleep(self.options.rate_limit).await;
            }
            backend_used = true;

            self.progress.begin(&entry.id);
            let region_started = Instant::now();
            let outcome = self.extract_region(&geometry, timeout).await;
            let elapsed = region_started.elapsed();

            match outcome {
                RegionOutcome::Completed {
                    data_available,
                    errors,
                } => {
                    info!(
                        region = %entry.id,
                        elapsed_ms = elapsed.as_millis() as u64,
                        data_available,
                        absorbed = errors.total(),
                        "Region completed"
                    );
                    println!("{} {}: SUCCESS ({:.1}s)", position, entry.id, elapsed.as_secs_f64());
                    self.persist(&entry.id, RegionState::Completed, &mut report);
                    report.record_success(data_available, &errors);
                }
                RegionOutcome::Skipped(reason) => {
                    warn!(region = %entry.id, reason = %reason, "Region skipped");
                    println!("{} {}: SKIPPED ({})", position, entry.id, reason);
                    report.errors.record(FailureKind::MalformedInput, reason.clone());
                    self.persist(&entry.id, RegionState::Skipped, &mut report);
                    report.record_skip(&entry.id, &reason);
                }
                RegionOutcome::Failed(reason) => {
                    warn!(region = %entry.id, reason = %reason, "Region failed");
                    println!("{} {}: FAILED ({})", position, entry.id, reason);
                    self.persist(&entry.id, RegionState::Failed, &mut report);
                    report.record_failure(&entry.id, &reason);
                }
            }
        }

        report.set_duration(started.elapsed());
        report.finalize();
        info!(summary = %report.summary(), "Extraction pass finished");
        report
    }

    /// Motif pour ne pas appeler le backend, d'après le résultat stocké
    fn skip_reason(&self, entry: &RegionEntry) -> Option<String> {
        if self.options.force {
            return None;
        }
        match self.sink.load(&entry.id, self.dataset.key()) {
            Ok(Some(stored)) if self.dataset.is_present(&stored, self.config) => {
                Some("already extracted".to_string())
            }
            Ok(Some(_)) if self.options.skip_existing => Some("existing result kept".to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(region = %entry.id, error = %e, "Could not read existing result");
                None
            }
        }
    }

    async fn extract_region(&self, geometry: &RegionGeometry, timeout: Duration) -> RegionOutcome {
        let extraction = datasets::extract(self.dataset, self.reducer, geometry, self.config);
        let output = match tokio::time::timeout(timeout, extraction).await {
            Err(_) => return RegionOutcome::Failed(format!("timed out after {:.0}s", timeout.as_secs_f64())),
            Ok(Err(e)) if e.is_skip() => return RegionOutcome::Skipped(e.to_string()),
            Ok(Err(e)) => return RegionOutcome::Failed(e.to_string()),
            Ok(Ok(output)) => output,
        };

        if !self.dataset.is_complete(&output.data, self.config) {
            return RegionOutcome::Failed("result lacks the expected scenario/period data".to_string());
        }

        let source = self.dataset.source_tag(self.config);
        if let Err(e) = self
            .sink
            .store(geometry.id(), self.dataset.key(), &source, &output.data)
        {
            return RegionOutcome::Failed(format!("failed to store result: {:#}", e));
        }

        RegionOutcome::Completed {
            data_available: output.data_available,
            errors: output.errors,
        }
    }

    /// Un échec d'écriture n'arrête pas la passe mais figure au rapport
    fn persist(&mut self, id: &str, state: RegionState, report: &mut BatchReport) {
        if let Err(e) = self.progress.finish(id, state) {
            error!(region = %id, error = %e, "Failed to persist progress");
            report.record_progress_failure(id, &format!("{:#}", e));
        }
    }
}
