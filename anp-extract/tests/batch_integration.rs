//! Tests d'intégration: campagnes complètes sur un répertoire temporaire
//!
//! Le backend est simulé en mémoire, sauf pour les tests `http_*` qui
//! passent par un serveur wiremock.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use anp_extract::backend::{
    AnalyticsBackend, ClassSum, FeatureRequest, GroupedSumRequest, RawReply, ReduceRequest,
    SampleRequest,
};
use anp_extract::registry::select;
use anp_extract::reducer::ReducerSpec;
use anp_extract::{
    BackendConfig, BackendError, BatchOptions, BatchStatus, ClimateBuilder, DataSource,
    DatasetKind, DirectoryRegistry, ExtractConfig, HttpBackend, JsonFileSink, Orchestrator,
    ProgressStore, RegionRegistry, RegionState, ResultSink, UnitConversion, ZonalReducer,
};
use zonal::{RegionGeometry, Statistic};

/// Backend qui répond à toute réduction, avec un délai réglable
#[derive(Default)]
struct MockBackend {
    calls: AtomicUsize,
    delay_ms: AtomicU64,
}

impl MockBackend {
    fn with_delay(ms: u64) -> Self {
        let backend = Self::default();
        backend.delay_ms.store(ms, Ordering::SeqCst);
        backend
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn value_for(request: &ReduceRequest) -> f64 {
        let warming = match request.source.scenario.as_deref() {
            Some("ssp245") => 1.5,
            Some("ssp585") => 3.0,
            _ => 0.0,
        };
        match request.source.band.as_str() {
            "tas" | "tasmax" | "tasmin" => 298.15 + warming,
            "pr" => 3.0e-5,
            "mrso" => 850.0,
            "mrro" => 1.0e-5,
            "agbd" => 100.0,
            "area" => 1.0e9,
            _ => 1.0,
        }
    }
}

#[async_trait]
impl AnalyticsBackend for MockBackend {
    async fn reduce_region(&self, request: &ReduceRequest) -> Result<RawReply, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let value = Self::value_for(request);
        let mut reply = Map::new();
        for stat in &request.reducers {
            let v = match stat {
                Statistic::Count => json!(42),
                Statistic::StdDev => json!(1.2),
                _ => json!(value),
            };
            reply.insert(format!("{}_{}", request.source.band, stat.backend_name()), v);
        }
        Ok(reply)
    }

    async fn sample_points(&self, request: &SampleRequest) -> Result<Vec<Value>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![json!(300.0); request.points.len()])
    }

    async fn intersecting_features(&self, _: &FeatureRequest) -> Result<Vec<Map<String, Value>>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn grouped_sum(&self, _: &GroupedSumRequest) -> Result<Vec<ClassSum>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

fn write_region(dir: &std::path::Path, id: &str, bounds: Value) {
    let data = json!({
        "metadata": { "name": id.replace('_', " ") },
        "geometry": { "bounds": bounds }
    });
    std::fs::write(dir.join(format!("{}_data.json", id)), data.to_string()).unwrap();
}

fn square(x: f64, y: f64) -> Value {
    json!([[x, y], [x + 1.0, y], [x + 1.0, y + 1.0], [x, y + 1.0], [x, y]])
}

fn fast_options(config: &ExtractConfig) -> BatchOptions {
    let mut options = BatchOptions::from_config(&config.batch);
    options.rate_limit = Duration::ZERO;
    options
}

/// 6 bandes pour la référence + 6 par cellule (preset quick: une cellule)
const QUICK_CALLS_PER_REGION: usize = 12;

#[tokio::test]
async fn test_resume_after_interruption() {
    let dir = tempfile::tempdir().unwrap();
    for (i, id) in ["anp_a", "anp_b", "anp_c", "anp_d", "anp_e"].iter().enumerate() {
        write_region(dir.path(), id, square(-90.0 + i as f64, 18.0));
    }
    let config = ExtractConfig::from_preset("quick").unwrap();
    let registry = DirectoryRegistry::new(dir.path());
    let sink = JsonFileSink::new(dir.path());
    let progress_path = dir.path().join("climate_progress.json");

    // Première exécution interrompue après trois régions
    {
        let reducer = ZonalReducer::new(MockBackend::default());
        let progress = ProgressStore::open(&progress_path).unwrap();
        let mut orchestrator = Orchestrator::new(
            &reducer,
            &sink,
            &config,
            DatasetKind::Climate,
            progress,
            fast_options(&config),
        );
        let first_three = select(registry.regions().unwrap(), None, Some(3));
        let report = orchestrator.run(&first_three).await;
        assert_eq!(report.succeeded, 3);
        assert_eq!(reducer.backend().calls(), 3 * QUICK_CALLS_PER_REGION);
    }

    // Reprise sur la collection complète
    let reducer = ZonalReducer::new(MockBackend::default());
    let progress = ProgressStore::open(&progress_path).unwrap();
    assert_eq!(progress.state("anp_c"), RegionState::Completed);
    assert_eq!(progress.state("anp_d"), RegionState::NotStarted);

    let mut orchestrator = Orchestrator::new(
        &reducer,
        &sink,
        &config,
        DatasetKind::Climate,
        progress,
        fast_options(&config),
    );
    let report = orchestrator.run(&registry.regions().unwrap()).await;

    assert_eq!(report.already_completed, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.status, BatchStatus::Success);
    assert_eq!(reducer.backend().calls(), 2 * QUICK_CALLS_PER_REGION);

    let stored = sink.load("anp_e", "climate_projections").unwrap().unwrap();
    assert!(DatasetKind::Climate.is_present(&stored, &config));
    assert_eq!(orchestrator.progress().progress().completed.len(), 5);
}

#[tokio::test]
async fn test_timeout_then_retry() {
    let dir = tempfile::tempdir().unwrap();
    write_region(dir.path(), "calakmul", square(-90.0, 18.0));
    let config = ExtractConfig::from_preset("quick").unwrap();
    let registry = DirectoryRegistry::new(dir.path());
    let sink = JsonFileSink::new(dir.path());
    let regions = registry.regions().unwrap();

    let reducer = ZonalReducer::new(MockBackend::with_delay(500));
    let mut options = fast_options(&config);
    options.region_timeout = Duration::from_millis(50);
    let progress = ProgressStore::open(dir.path().join("progress.json")).unwrap();
    let mut orchestrator = Orchestrator::new(&reducer, &sink, &config, DatasetKind::Biomass, progress, options);

    let report = orchestrator.run(&regions).await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.status, BatchStatus::Failed);
    assert!(report.failed_regions[0].reason.contains("timed out"));
    assert_eq!(orchestrator.progress().state("calakmul"), RegionState::Failed);
    assert!(sink.load("calakmul", "gedi_biomass").unwrap().is_none());

    // Le backend redevient rapide: la reprise aboutit
    reducer.backend().delay_ms.store(0, Ordering::SeqCst);
    let report = orchestrator.retry_failed(&regions).await;
    assert_eq!(report.attempt, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(orchestrator.progress().state("calakmul"), RegionState::Completed);

    let stored = sink.load("calakmul", "gedi_biomass").unwrap().unwrap();
    assert_eq!(stored["data_available"], true);
    assert_eq!(stored["agbd_mean_mg_ha"], 100.0);
}

#[tokio::test]
async fn test_retry_uses_longer_timeout() {
    let dir = tempfile::tempdir().unwrap();
    write_region(dir.path(), "calakmul", square(-90.0, 18.0));
    let config = ExtractConfig::from_preset("quick").unwrap();
    let sink = JsonFileSink::new(dir.path());
    let regions = DirectoryRegistry::new(dir.path()).regions().unwrap();

    // Deux requêtes de 300 ms: au-delà de 400 ms, en deçà de 800 ms
    let reducer = ZonalReducer::new(MockBackend::with_delay(300));
    let mut options = fast_options(&config);
    options.region_timeout = Duration::from_millis(400);
    options.retry_multiplier = 2;
    let progress = ProgressStore::open(dir.path().join("progress.json")).unwrap();
    let mut orchestrator = Orchestrator::new(&reducer, &sink, &config, DatasetKind::Biomass, progress, options);

    let report = orchestrator.run(&regions).await;
    assert_eq!(report.failed, 1);
    assert_eq!(orchestrator.progress().state("calakmul"), RegionState::Failed);

    // Même backend, même délai: seul le délai maximal change
    let report = orchestrator.retry_failed(&regions).await;
    assert_eq!(report.attempt, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(orchestrator.progress().state("calakmul"), RegionState::Completed);
    assert!(sink.load("calakmul", "gedi_biomass").unwrap().is_some());
}

#[tokio::test]
async fn test_region_still_failing_after_retry_stays_failed() {
    let dir = tempfile::tempdir().unwrap();
    write_region(dir.path(), "calakmul", square(-90.0, 18.0));
    write_region(dir.path(), "sian_kaan", square(-88.0, 19.0));
    let config = ExtractConfig::from_preset("quick").unwrap();
    let sink = JsonFileSink::new(dir.path());
    let regions = DirectoryRegistry::new(dir.path()).regions().unwrap();

    let reducer = ZonalReducer::new(MockBackend::with_delay(1000));
    let mut options = fast_options(&config);
    options.region_timeout = Duration::from_millis(50);
    let progress_path = dir.path().join("progress.json");
    let progress = ProgressStore::open(&progress_path).unwrap();
    let mut orchestrator = Orchestrator::new(&reducer, &sink, &config, DatasetKind::Biomass, progress, options);

    let report = orchestrator.run(&regions).await;
    assert_eq!(report.failed, 2);

    let report = orchestrator.retry_failed(&regions).await;
    assert_eq!(report.attempt, 2);
    assert_eq!(report.status, BatchStatus::Failed);
    assert_eq!(report.failed_ids(), ["calakmul", "sian_kaan"]);
    assert!(report.failed_regions[0].reason.contains("timed out"));

    // Toujours en échec sur disque, prêtes pour une nouvelle reprise
    let reloaded = ProgressStore::open(&progress_path).unwrap();
    assert_eq!(reloaded.state("calakmul"), RegionState::Failed);
    assert_eq!(reloaded.state("sian_kaan"), RegionState::Failed);
    assert_eq!(reloaded.progress().failed.len(), 2);
}

#[tokio::test]
async fn test_unsaved_progress_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_region(dir.path(), "calakmul", square(-90.0, 18.0));
    let config = ExtractConfig::from_preset("quick").unwrap();
    let sink = JsonFileSink::new(dir.path());
    let regions = DirectoryRegistry::new(dir.path()).regions().unwrap();

    // Répertoire absent: chaque écriture d'avancement échoue
    let progress = ProgressStore::open(dir.path().join("missing").join("progress.json")).unwrap();
    let reducer = ZonalReducer::new(MockBackend::default());
    let mut orchestrator = Orchestrator::new(
        &reducer,
        &sink,
        &config,
        DatasetKind::Biomass,
        progress,
        fast_options(&config),
    );
    let report = orchestrator.run(&regions).await;

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.progress_not_saved.len(), 1);
    assert_eq!(report.progress_not_saved[0].region, "calakmul");
    assert!(report.summary().contains("1 progress writes failed"));
}

#[tokio::test]
async fn test_existing_results_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_region(dir.path(), "sian_kaan", square(-88.0, 19.0));
    write_region(dir.path(), "el_vizcaino", square(-114.0, 27.0));
    write_region(dir.path(), "montes_azules", square(-91.0, 16.0));
    let config = ExtractConfig::from_preset("quick").unwrap();
    let sink = JsonFileSink::new(dir.path());
    let regions = DirectoryRegistry::new(dir.path()).regions().unwrap();

    // Résultat complet, résultat sans donnée
    sink.store("sian_kaan", "gedi_biomass", "test", &json!({ "data_available": true }))
        .unwrap();
    sink.store("el_vizcaino", "gedi_biomass", "test", &json!({ "data_available": false }))
        .unwrap();

    let reducer = ZonalReducer::new(MockBackend::default());
    let progress = ProgressStore::open(dir.path().join("p1.json")).unwrap();
    let mut orchestrator = Orchestrator::new(
        &reducer,
        &sink,
        &config,
        DatasetKind::Biomass,
        progress,
        fast_options(&config),
    );
    let report = orchestrator.run(&regions).await;

    // Seul le résultat complet évite l'appel au backend
    assert_eq!(report.skipped, 1);
    assert_eq!(report.skipped_regions[0].region, "sian_kaan");
    assert_eq!(report.succeeded, 2);
    assert_eq!(orchestrator.progress().state("sian_kaan"), RegionState::Skipped);

    // --skip-existing conserve aussi les résultats incomplets
    sink.store("el_vizcaino", "gedi_biomass", "test", &json!({ "data_available": false }))
        .unwrap();
    let reducer = ZonalReducer::new(MockBackend::default());
    let mut options = fast_options(&config);
    options.skip_existing = true;
    let progress = ProgressStore::open(dir.path().join("p2.json")).unwrap();
    let mut orchestrator = Orchestrator::new(&reducer, &sink, &config, DatasetKind::Biomass, progress, options);
    let report = orchestrator.run(&regions).await;
    assert_eq!(report.skipped, 3);
    assert_eq!(reducer.backend().calls(), 0);

    // --force réextrait tout
    let reducer = ZonalReducer::new(MockBackend::default());
    let mut options = fast_options(&config);
    options.force = true;
    let progress = ProgressStore::open(dir.path().join("p2.json")).unwrap();
    let mut orchestrator = Orchestrator::new(&reducer, &sink, &config, DatasetKind::Biomass, progress, options);
    let report = orchestrator.run(&regions).await;
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.skipped, 0);
}

#[tokio::test]
async fn test_malformed_region_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_region(dir.path(), "degenerate", json!([[-90.0, 18.0], [-89.0, 18.0], [-90.0, 18.0]]));
    write_region(dir.path(), "valid", square(-90.0, 18.0));
    std::fs::write(dir.path().join("broken_data.json"), "{ not json").unwrap();

    let config = ExtractConfig::from_preset("quick").unwrap();
    let sink = JsonFileSink::new(dir.path());
    let regions = DirectoryRegistry::new(dir.path()).regions().unwrap();
    assert_eq!(regions.len(), 3);

    let reducer = ZonalReducer::new(MockBackend::default());
    let progress = ProgressStore::open(dir.path().join("progress.json")).unwrap();
    let mut orchestrator = Orchestrator::new(
        &reducer,
        &sink,
        &config,
        DatasetKind::Biomass,
        progress,
        fast_options(&config),
    );
    let report = orchestrator.run(&regions).await;

    assert_eq!(report.skipped, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.errors.malformed_input, 2);
    assert_eq!(orchestrator.progress().state("degenerate"), RegionState::Skipped);
    assert_eq!(orchestrator.progress().state("broken"), RegionState::Skipped);
    // agbd + surface pour la seule région valide
    assert_eq!(reducer.backend().calls(), 2);
}

#[tokio::test]
async fn test_every_cell_shares_one_baseline() {
    let config = ExtractConfig::from_preset("ssr").unwrap();
    let region = RegionGeometry::from_rings(
        "calakmul",
        Some(&[[-90.0, 18.0], [-89.0, 18.0], [-89.0, 19.0], [-90.0, 19.0], [-90.0, 18.0]]),
        None,
    )
    .unwrap();
    let reducer = ZonalReducer::new(MockBackend::default());

    let dataset = ClimateBuilder::new(&reducer, &config.climate, &region)
        .run()
        .await
        .unwrap();

    // 6 bandes × (1 référence + 2 scénarios × 3 périodes)
    assert_eq!(reducer.backend().calls(), 6 * 7);
    for scenario in &config.climate.scenarios {
        for period in &config.climate.periods {
            let cell = dataset.cell(&scenario.id, &period.id).unwrap();
            assert!(Arc::ptr_eq(cell.baseline(), &dataset.reference));
        }
    }

    let mid = dataset.cell("ssp585", "2041-2070").unwrap();
    assert_eq!(mid.changes.temperature_change_c, Some(3.0));
    assert_eq!(dataset.errors.total(), 0);
}

// --- Backend HTTP ---

mod http {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer, token: Option<&str>) -> HttpBackend {
        HttpBackend::new(BackendConfig {
            url: server.uri(),
            token: token.map(str::to_string),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn unit_region() -> RegionGeometry {
        RegionGeometry::from_rings(
            "x",
            Some(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn http_reduce_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reduce"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": { "tas_mean": 300.15, "tas_max": -9999.0 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reducer = ZonalReducer::new(backend(&server, Some("s3cret")));
        let source = DataSource::new("NASA/GDDP-CMIP6", "tas").with_scenario("historical");
        let spec = ReducerSpec::new(&[Statistic::Mean, Statistic::Max], UnitConversion::KelvinToCelsius);

        let reduction = reducer
            .reduce(unit_region().bounds(), &source, &spec, 27830.0)
            .await
            .unwrap();

        let mean = reduction.stats.mean.unwrap();
        assert!((mean - 27.0).abs() < 1e-9);
        // Sentinelle: pas de donnée
        assert_eq!(reduction.stats.max, None);
        assert!(reduction.missing.is_empty());
    }

    #[tokio::test]
    async fn http_invalid_geometry_is_region_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reduce"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({ "error": "Invalid geometry: self-intersection" })),
            )
            .mount(&server)
            .await;

        let reducer = ZonalReducer::new(backend(&server, None));
        let source = DataSource::new("NASA/GDDP-CMIP6", "tas");
        let spec = ReducerSpec::new(&[Statistic::Mean], UnitConversion::Identity);

        let err = reducer
            .reduce(unit_region().bounds(), &source, &spec, 1000.0)
            .await
            .unwrap_err();
        assert!(err.is_region_fatal());
        assert!(matches!(err, BackendError::InvalidGeometry(m) if m.contains("self-intersection")));
    }

    #[tokio::test]
    async fn http_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/features"))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend overloaded"))
            .mount(&server)
            .await;

        let reducer = ZonalReducer::new(backend(&server, None));
        let err = reducer
            .unit_features("WRI/Aqueduct", unit_region().bounds(), "area_km2")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BackendError::Status {
                status: 503,
                message: "backend overloaded".into()
            }
        );
        assert!(!err.is_region_fatal());
    }
}
