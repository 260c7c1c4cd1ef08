//! Registre des régions
//!
//! Chaque région est un fichier `<id>_data.json` du répertoire de données
//! (`metadata.name`, `geometry.bounds`), accompagné éventuellement d'une
//! frontière fine `<id>_boundary.geojson`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use geojson::GeoJson;
use serde_json::Value;
use tracing::{debug, warn};
use zonal::{RegionGeometry, ZonalError};

const DATA_SUFFIX: &str = "_data.json";
const BOUNDARY_SUFFIX: &str = "_boundary.geojson";

/// Région à traiter
#[derive(Debug, Clone, PartialEq)]
pub struct RegionEntry {
    pub id: String,
    pub name: String,
    pub data_file: PathBuf,
    /// Anneau d'emprise [lon, lat]
    pub bounds: Option<Vec<[f64; 2]>>,
    /// Anneau extérieur de la frontière fine
    pub boundary: Option<Vec<[f64; 2]>>,
    /// Fichier de données illisible
    pub load_error: Option<String>,
}

impl RegionEntry {
    /// Géométrie validée de la région
    pub fn geometry(&self) -> Result<RegionGeometry, ZonalError> {
        if let Some(reason) = &self.load_error {
            return Err(ZonalError::malformed(&self.id, reason.clone()));
        }
        RegionGeometry::from_rings(&self.id, self.bounds.as_deref(), self.boundary.as_deref())
    }
}

/// Source ordonnée des régions
pub trait RegionRegistry {
    fn regions(&self) -> Result<Vec<RegionEntry>>;
}

/// Registre lu depuis un répertoire de fichiers JSON
pub struct DirectoryRegistry {
    dir: PathBuf,
}

impl DirectoryRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Une seule région, par identifiant exact
    pub fn find(&self, id: &str) -> Result<Option<RegionEntry>> {
        Ok(self.regions()?.into_iter().find(|r| r.id == id))
    }

    fn load_entry(&self, path: &Path) -> Option<RegionEntry> {
        let file_name = path.file_name()?.to_str()?;
        let id = file_name.strip_suffix(DATA_SUFFIX)?.to_string();

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str::<Value>(&s).map_err(|e| e.to_string()));

        let data = match parsed {
            Ok(data) => data,
            Err(e) => {
                warn!(region = %id, error = %e, "Unreadable region file");
                return Some(RegionEntry {
                    name: id.clone(),
                    id,
                    data_file: path.to_path_buf(),
                    bounds: None,
                    boundary: None,
                    load_error: Some(format!("unreadable data file: {}", e)),
                });
            }
        };

        let name = data["metadata"]["name"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| id.clone());
        let bounds = parse_ring(&data["geometry"]["bounds"]);

        let boundary_path = self.dir.join(format!("{}{}", id, BOUNDARY_SUFFIX));
        let boundary = if boundary_path.exists() {
            match read_boundary(&boundary_path) {
                Ok(ring) => ring,
                Err(e) => {
                    warn!(region = %id, error = %e, "Boundary unusable, falling back to bounds");
                    None
                }
            }
        } else {
            None
        };

        Some(RegionEntry {
            id,
            name,
            data_file: path.to_path_buf(),
            bounds,
            boundary,
            load_error: None,
        })
    }
}

impl RegionRegistry for DirectoryRegistry {
    fn regions(&self) -> Result<Vec<RegionEntry>> {
        let pattern = format!(
            "{}/*{}",
            glob::Pattern::escape(&self.dir.to_string_lossy()),
            DATA_SUFFIX
        );
        let mut paths: Vec<PathBuf> = glob::glob(&pattern)
            .context("Invalid data directory pattern")?
            .filter_map(|entry| entry.ok())
            .collect();
        paths.sort();

        let regions: Vec<RegionEntry> = paths.iter().filter_map(|p| self.load_entry(p)).collect();
        debug!(dir = %self.dir.display(), count = regions.len(), "Regions listed");
        Ok(regions)
    }
}

/// Filtre par nom (sous-chaîne de l'identifiant) puis limite aux N premières
pub fn select(regions: Vec<RegionEntry>, filter: Option<&str>, limit: Option<usize>) -> Vec<RegionEntry> {
    let needle = filter.map(|f| f.trim().to_lowercase().replace(' ', "_"));
    regions
        .into_iter()
        .filter(|r| match &needle {
            Some(n) => r.id.to_lowercase().contains(n.as_str()),
            None => true,
        })
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Anneau `[[lon, lat], ...]`, ou premier anneau de `[[[lon, lat], ...]]`
fn parse_ring(value: &Value) -> Option<Vec<[f64; 2]>> {
    let items = value.as_array()?;
    let ring = match items.first()?.as_array()?.first() {
        Some(Value::Array(_)) => items.first()?.as_array()?,
        _ => items,
    };
    ring.iter()
        .map(|p| {
            let p = p.as_array()?;
            Some([p.first()?.as_f64()?, p.get(1)?.as_f64()?])
        })
        .collect()
}

/// Anneau extérieur du premier polygone de la frontière
fn read_boundary(path: &Path) -> Result<Option<Vec<[f64; 2]>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let geojson: GeoJson = content
        .parse()
        .with_context(|| format!("Invalid GeoJSON in {}", path.display()))?;

    let geometry = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features.into_iter().find_map(|f| f.geometry),
        GeoJson::Feature(f) => f.geometry,
        GeoJson::Geometry(g) => Some(g),
    };

    let exterior = match geometry.map(|g| g.value) {
        Some(geojson::Value::Polygon(rings)) => rings.into_iter().next(),
        Some(geojson::Value::MultiPolygon(polygons)) => polygons
            .into_iter()
            .filter_map(|rings| rings.into_iter().next())
            .max_by_key(|ring| ring.len()),
        _ => None,
    };

    Ok(exterior.map(|ring| {
        ring.iter()
            .filter(|p| p.len() >= 2)
            .map(|p| [p[0], p[1]])
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_region(dir: &Path, id: &str, name: &str, bounds: Value) {
        let data = json!({ "metadata": { "name": name }, "geometry": { "bounds": bounds } });
        std::fs::write(dir.join(format!("{}_data.json", id)), data.to_string()).unwrap();
    }

    #[test]
    fn test_lists_regions_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let square = json!([[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]);
        write_region(dir.path(), "sian_kaan", "Sian Ka'an", square.clone());
        write_region(dir.path(), "calakmul", "Calakmul", json!([square]));
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let regions = DirectoryRegistry::new(dir.path()).regions().unwrap();
        let ids: Vec<_> = regions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["calakmul", "sian_kaan"]);
        assert_eq!(regions[1].name, "Sian Ka'an");
        assert_eq!(regions[0].bounds.as_ref().unwrap().len(), 5);
        assert!(regions[0].geometry().is_ok());
    }

    #[test]
    fn test_boundary_file() {
        let dir = tempfile::tempdir().unwrap();
        write_region(dir.path(), "celestun", "Ría Celestún", json!([[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]]));
        let boundary = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": { "type": "Polygon", "coordinates": [[[0.5, 0.5], [1.5, 0.5], [1.0, 1.5], [0.5, 0.5]]] }
            }]
        });
        std::fs::write(dir.path().join("celestun_boundary.geojson"), boundary.to_string()).unwrap();

        let region = DirectoryRegistry::new(dir.path()).find("celestun").unwrap().unwrap();
        assert_eq!(region.boundary.as_ref().unwrap()[2], [1.0, 1.5]);
        let geometry = region.geometry().unwrap();
        assert!(geometry.boundary().is_some());
    }

    #[test]
    fn test_unreadable_and_missing_geometry_are_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken_data.json"), "{ not json").unwrap();
        write_region(dir.path(), "empty", "Empty", Value::Null);

        let regions = DirectoryRegistry::new(dir.path()).regions().unwrap();
        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|r| r.geometry().is_err()));
        assert!(regions[0].load_error.is_some());
    }

    #[test]
    fn test_select_filter_and_limit() {
        let entry = |id: &str| RegionEntry {
            id: id.to_string(),
            name: id.to_string(),
            data_file: PathBuf::new(),
            bounds: None,
            boundary: None,
            load_error: None,
        };
        let regions = vec![entry("calakmul"), entry("sian_kaan"), entry("sierra_gorda")];

        let picked = select(regions.clone(), Some("Sian Kaan"), None);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "sian_kaan");

        let picked = select(regions, None, Some(2));
        assert_eq!(picked.len(), 2);
    }
}
