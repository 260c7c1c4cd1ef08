//! Backend scripté pour les tests unitaires des extracteurs

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use zonal::RegionGeometry;

use crate::backend::{
    AnalyticsBackend, ClassSum, FeatureRequest, GroupedSumRequest, RawReply, ReduceRequest,
    SampleRequest,
};
use crate::error::BackendError;

/// Réponses fixées à l'avance, par bande / collection
#[derive(Default)]
pub struct ScriptedBackend {
    pub reduce: HashMap<String, Result<Value, BackendError>>,
    pub features: Option<Result<Vec<Value>, BackendError>>,
    pub groups: Option<Result<Vec<ClassSum>, BackendError>>,
    /// Valeur par point selon l'année de la source; absente ⇒ erreur transport
    pub samples: HashMap<String, Value>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn reply(mut self, band: &str, reply: Value) -> Self {
        self.reduce.insert(band.to_string(), Ok(reply));
        self
    }

    pub fn fail(mut self, band: &str, err: BackendError) -> Self {
        self.reduce.insert(band.to_string(), Err(err));
        self
    }

    pub fn with_features(mut self, features: Vec<Value>) -> Self {
        self.features = Some(Ok(features));
        self
    }

    pub fn with_groups(mut self, groups: &[(i64, f64)]) -> Self {
        self.groups = Some(Ok(groups
            .iter()
            .map(|&(class, sum)| ClassSum { class, sum })
            .collect()));
        self
    }

    pub fn with_sample(mut self, year: i32, value: Value) -> Self {
        self.samples.insert(year.to_string(), value);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn log(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl AnalyticsBackend for ScriptedBackend {
    async fn reduce_region(&self, request: &ReduceRequest) -> Result<RawReply, BackendError> {
        self.log(format!("reduce:{}", request.source.band));
        match self.reduce.get(&request.source.band) {
            Some(Ok(Value::Object(map))) => Ok(map.clone()),
            Some(Ok(_)) | None => Ok(Map::new()),
            Some(Err(e)) => Err(e.clone()),
        }
    }

    async fn sample_points(&self, request: &SampleRequest) -> Result<Vec<Value>, BackendError> {
        let year = request
            .source
            .start
            .as_deref()
            .and_then(|s| s.get(..4))
            .unwrap_or_default()
            .to_string();
        self.log(format!("sample:{}", year));
        match self.samples.get(&year) {
            Some(value) => Ok(vec![value.clone(); request.points.len()]),
            None => Err(BackendError::Transport(format!("no sample scripted for {}", year))),
        }
    }

    async fn intersecting_features(
        &self,
        request: &FeatureRequest,
    ) -> Result<Vec<Map<String, Value>>, BackendError> {
        self.log(format!("features:{}", request.collection));
        match &self.features {
            Some(Ok(features)) => Ok(features
                .iter()
                .filter_map(|f| f.as_object().cloned())
                .collect()),
            Some(Err(e)) => Err(e.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn grouped_sum(&self, request: &GroupedSumRequest) -> Result<Vec<ClassSum>, BackendError> {
        self.log(format!("grouped:{}", request.group_by.band));
        match &self.groups {
            Some(Ok(groups)) => Ok(groups.clone()),
            Some(Err(e)) => Err(e.clone()),
            None => Ok(Vec::new()),
        }
    }
}

pub fn unit_square() -> RegionGeometry {
    let ring = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
    RegionGeometry::from_rings("square", Some(&ring), Some(&ring)).unwrap()
}
