//! Définition et implémentation des commandes CLI
//!
//! - `extract`: campagne d'extraction d'un jeu de données
//! - `retry`: reprise des régions en échec
//! - `status`: avancement persistant
//! - `sample`: grille d'échantillonnage d'une région (sans backend)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::info;

use anp_extract::registry::select;
use anp_extract::{
    BackendConfig, BatchOptions, DatasetKind, DirectoryRegistry, ExtractConfig, HttpBackend,
    JsonFileSink, Orchestrator, ProgressStore, RegionRegistry, ZonalReducer,
};

/// Options communes à toutes les commandes
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding `<id>_data.json` region files
    #[arg(long, default_value = "anp_data", global = true)]
    pub data_dir: PathBuf,

    /// Config preset name (ssr/quick) or path to a JSON config
    #[arg(long, default_value = "ssr", global = true)]
    pub config: String,

    /// Progress file (défaut : <data-dir>/<dataset>_progress.json)
    #[arg(long, global = true)]
    pub progress: Option<PathBuf>,

    /// Analytics backend URL (défaut : env ANALYTICS_URL)
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    /// Backend request timeout in seconds (défaut : env ANALYTICS_TIMEOUT_SECS / 120)
    #[arg(long, global = true)]
    pub backend_timeout: Option<u64>,
}

impl GlobalArgs {
    fn progress_path(&self, dataset: DatasetKind) -> PathBuf {
        self.progress
            .clone()
            .unwrap_or_else(|| self.data_dir.join(format!("{}_progress.json", dataset.key())))
    }

    fn backend_config(&self) -> BackendConfig {
        let mut config = BackendConfig::from_env();
        if let Some(url) = &self.backend_url {
            config.url = url.clone();
        }
        if let Some(secs) = self.backend_timeout {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract a dataset for every region (or those matching FILTER)
    Extract {
        /// Dataset to extract
        #[arg(value_enum)]
        dataset: DatasetKind,

        /// Only regions whose id contains this text (spaces match underscores)
        filter: Option<String>,

        /// Test with the first N regions only
        #[arg(long, value_name = "N")]
        test: Option<usize>,

        /// Re-extract even completed regions and existing results
        #[arg(long)]
        force: bool,

        /// Keep any existing result, even incomplete
        #[arg(long)]
        skip_existing: bool,

        /// Save the batch report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Retry regions left failed by a previous run (longer timeout)
    Retry {
        #[arg(value_enum)]
        dataset: DatasetKind,

        /// Save the batch report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show persisted progress for a dataset
    Status {
        #[arg(value_enum)]
        dataset: DatasetKind,
    },

    /// Print the deterministic sample grid of a region
    Sample {
        /// Region id
        region: String,

        /// Grid step in degrees (défaut : config timeseries resolution)
        #[arg(long)]
        resolution: Option<f64>,
    },
}

/// Exécute la commande extract
pub async fn cmd_extract(
    global: &GlobalArgs,
    dataset: DatasetKind,
    filter: Option<&str>,
    test: Option<usize>,
    force: bool,
    skip_existing: bool,
    report_path: Option<&Path>,
) -> Result<()> {
    let config = ExtractConfig::resolve(&global.config)?;
    let registry = DirectoryRegistry::new(&global.data_dir);
    let regions = select(registry.regions()?, filter, test);
    if regions.is_empty() {
        anyhow::bail!("No regions found in {}", registry.dir().display());
    }

    let backend = HttpBackend::new(global.backend_config())?;
    let progress_path = global.progress_path(dataset);

    println!("=== Extract {} ===", dataset);
    println!("Data dir: {}", global.data_dir.display());
    println!("Regions: {}", regions.len());
    println!("Config: {}", global.config);
    println!("Backend: {}", backend.config().url);
    println!("Progress: {}", progress_path.display());
    println!("Force: {}", force);
    println!("Skip existing: {}", skip_existing);

    let reducer = ZonalReducer::new(backend);
    let sink = JsonFileSink::new(&global.data_dir);
    let progress = ProgressStore::open(&progress_path)?;
    let mut options = BatchOptions::from_config(&config.batch);
    options.force = force;
    options.skip_existing = skip_existing;

    let mut orchestrator = Orchestrator::new(&reducer, &sink, &config, dataset, progress, options);
    let report = orchestrator.run(&regions).await;

    report.display();
    if let Some(path) = report_path {
        report
            .save_to_file(path)
            .with_context(|| format!("Failed to save report to {}", path.display()))?;
        info!(path = %path.display(), "Report saved");
    }
    Ok(())
}

/// Exécute la commande retry
pub async fn cmd_retry(global: &GlobalArgs, dataset: DatasetKind, report_path: Option<&Path>) -> Result<()> {
    let config = ExtractConfig::resolve(&global.config)?;
    let progress_path = global.progress_path(dataset);
    let progress = ProgressStore::open(&progress_path)?;

    if progress.progress().failed.is_empty() {
        println!("No failed regions to retry for {}", dataset);
        return Ok(());
    }

    let regions = DirectoryRegistry::new(&global.data_dir).regions()?;
    println!("=== Retry {} ===", dataset);
    println!("Failed regions: {}", progress.progress().failed.len());

    let reducer = ZonalReducer::new(HttpBackend::new(global.backend_config())?);
    let sink = JsonFileSink::new(&global.data_dir);
    let options = BatchOptions::from_config(&config.batch);

    let mut orchestrator = Orchestrator::new(&reducer, &sink, &config, dataset, progress, options);
    let report = orchestrator.retry_failed(&regions).await;

    report.display();
    if let Some(path) = report_path {
        report.save_to_file(path)?;
    }
    Ok(())
}

/// Exécute la commande status
pub fn cmd_status(global: &GlobalArgs, dataset: DatasetKind) -> Result<()> {
    let store = ProgressStore::open(global.progress_path(dataset))?;
    let progress = store.progress();

    println!("=== Status {} ===", dataset);
    println!("Progress: {}", store.path().display());
    println!("Completed: {}", progress.completed.len());
    println!("Skipped: {}", progress.skipped.len());
    println!("Failed: {}", progress.failed.len());
    for id in &progress.failed {
        println!("  - {}", id);
    }
    Ok(())
}

/// Exécute la commande sample
pub fn cmd_sample(global: &GlobalArgs, region_id: &str, resolution: Option<f64>) -> Result<()> {
    let config = ExtractConfig::resolve(&global.config)?;
    let entry = DirectoryRegistry::new(&global.data_dir)
        .find(region_id)?
        .with_context(|| format!("Region not found: {}", region_id))?;

    let geometry = entry.geometry()?;
    let resolution = resolution.unwrap_or(config.timeseries.resolution_deg);
    let grid = zonal::sample_grid(&geometry, resolution)?;

    println!("=== Sample grid {} ===", entry.name);
    println!("Resolution: {}°", grid.resolution);
    println!(
        "Bbox: [{}, {}, {}, {}]",
        grid.bbox[0], grid.bbox[1], grid.bbox[2], grid.bbox[3]
    );
    println!("Boundary filter: {}", grid.filtered);
    println!("Points: {}", grid.len());
    println!("Fingerprint: {}", grid.fingerprint);
    for [lon, lat] in grid.points.iter().take(10) {
        println!("  {:.4}, {:.4}", lon, lat);
    }
    if grid.len() > 10 {
        println!("  ... and {} more", grid.len() - 10);
    }
    Ok(())
}
