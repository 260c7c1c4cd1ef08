//! Types de données pour le crate zonal

use geo::{BoundingRect, Centroid, Coord, LineString, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::ZonalError;

/// Géométrie d'une région (aire protégée)
///
/// Construite une seule fois par région puis partagée en lecture seule
/// par toutes les extractions de cette région.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionGeometry {
    id: String,
    bounds: Polygon,
    boundary: Option<Polygon>,
    bbox: Rect,
    centroid: Point,
}

impl RegionGeometry {
    /// Construit la géométrie depuis l'anneau d'emprise et la frontière optionnelle.
    ///
    /// L'anneau d'emprise est celui envoyé au backend pour les réductions ;
    /// la frontière fine sert uniquement au filtrage des points d'échantillonnage.
    /// Si l'emprise est absente, elle est dérivée de la boîte englobante de la frontière.
    pub fn from_rings(
        id: &str,
        bounds: Option<&[[f64; 2]]>,
        boundary: Option<&[[f64; 2]]>,
    ) -> Result<Self, ZonalError> {
        let boundary = boundary
            .map(|ring| ring_from_points(id, "boundary", ring))
            .transpose()?
            .map(|ring| Polygon::new(ring, vec![]));

        let bounds = match (bounds, &boundary) {
            (Some(ring), _) => Polygon::new(ring_from_points(id, "bounds", ring)?, vec![]),
            (None, Some(poly)) => poly
                .bounding_rect()
                .map(|r| r.to_polygon())
                .ok_or_else(|| ZonalError::malformed(id, "boundary has no extent"))?,
            (None, None) => return Err(ZonalError::malformed(id, "no bounds nor boundary")),
        };

        let reference = boundary.as_ref().unwrap_or(&bounds);
        let bbox = reference
            .bounding_rect()
            .ok_or_else(|| ZonalError::malformed(id, "empty geometry"))?;
        let centroid = reference
            .centroid()
            .ok_or_else(|| ZonalError::malformed(id, "centroid undefined"))?;

        Ok(Self {
            id: id.to_string(),
            bounds,
            boundary,
            bbox,
            centroid,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Polygone d'emprise envoyé au backend
    pub fn bounds(&self) -> &Polygon {
        &self.bounds
    }

    /// Frontière fine, si elle a été fournie
    pub fn boundary(&self) -> Option<&Polygon> {
        self.boundary.as_ref()
    }

    pub fn bbox(&self) -> Rect {
        self.bbox
    }

    pub fn centroid(&self) -> Point {
        self.centroid
    }
}

/// Valide un anneau brut [lon, lat] et le convertit en LineString
fn ring_from_points(id: &str, what: &str, points: &[[f64; 2]]) -> Result<LineString, ZonalError> {
    if points.iter().flatten().any(|v| !v.is_finite()) {
        return Err(ZonalError::malformed(
            id,
            format!("{} contains non-finite coordinates", what),
        ));
    }

    let coords: Vec<Coord> = points.iter().map(|&[x, y]| Coord { x, y }).collect();
    if distinct_vertices(&coords) < 3 {
        return Err(ZonalError::malformed(
            id,
            format!("{} has fewer than 3 distinct vertices", what),
        ));
    }

    Ok(LineString::new(coords))
}

/// Nombre de sommets distincts (le point de fermeture n'est pas compté)
pub(crate) fn distinct_vertices(coords: &[Coord]) -> usize {
    let mut seen: Vec<Coord> = Vec::with_capacity(coords.len());
    for c in coords {
        if !seen.contains(c) {
            seen.push(*c);
        }
    }
    seen.len()
}

/// Statistique de réduction zonale
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Statistic {
    Mean,
    Min,
    Max,
    StdDev,
    Sum,
    Count,
}

impl Statistic {
    /// Nom utilisé par le backend (suffixe des clés `<bande>_<stat>`)
    pub fn backend_name(self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::StdDev => "stdDev",
            Statistic::Sum => "sum",
            Statistic::Count => "count",
        }
    }
}

/// Résultat d'une réduction zonale: un champ optionnel par statistique.
///
/// `None` signifie "pas de donnée" (pixel absent, sentinelle, statistique
/// non retournée) et ne vaut jamais zéro.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ZonalStats {
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(rename = "stdDev")]
    pub std_dev: Option<f64>,
    pub sum: Option<f64>,
    pub count: Option<f64>,
}

impl ZonalStats {
    pub fn get(&self, stat: Statistic) -> Option<f64> {
        match stat {
            Statistic::Mean => self.mean,
            Statistic::Min => self.min,
            Statistic::Max => self.max,
            Statistic::StdDev => self.std_dev,
            Statistic::Sum => self.sum,
            Statistic::Count => self.count,
        }
    }

    pub fn set(&mut self, stat: Statistic, value: Option<f64>) {
        let slot = match stat {
            Statistic::Mean => &mut self.mean,
            Statistic::Min => &mut self.min,
            Statistic::Max => &mut self.max,
            Statistic::StdDev => &mut self.std_dev,
            Statistic::Sum => &mut self.sum,
            Statistic::Count => &mut self.count,
        };
        *slot = value;
    }

    /// Aucune statistique disponible
    pub fn is_empty(&self) -> bool {
        [
            self.mean,
            self.min,
            self.max,
            self.std_dev,
            self.sum,
            self.count,
        ]
        .iter()
        .all(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: [[f64; 2]; 5] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]];

    #[test]
    fn test_region_from_bounds() {
        let region = RegionGeometry::from_rings("test", Some(&SQUARE), None).unwrap();
        assert_eq!(region.id(), "test");
        assert!(region.boundary().is_none());
        assert_eq!(region.bbox().min(), Coord { x: 0.0, y: 0.0 });
        assert_eq!(region.bbox().max(), Coord { x: 1.0, y: 1.0 });
        assert!((region.centroid().x() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_region_bounds_derived_from_boundary() {
        let tri = [[0.0, 0.0], [2.0, 0.0], [0.0, 2.0]];
        let region = RegionGeometry::from_rings("tri", None, Some(&tri)).unwrap();
        assert!(region.boundary().is_some());
        let bbox = region.bounds().bounding_rect().unwrap();
        assert_eq!(bbox.max(), Coord { x: 2.0, y: 2.0 });
    }

    #[test]
    fn test_degenerate_ring_is_malformed() {
        let line = [[0.0, 0.0], [1.0, 1.0], [0.0, 0.0]];
        let err = RegionGeometry::from_rings("bad", Some(&line), None).unwrap_err();
        assert!(matches!(err, ZonalError::MalformedInput { .. }));
    }

    #[test]
    fn test_missing_geometry_is_malformed() {
        let err = RegionGeometry::from_rings("none", None, None).unwrap_err();
        assert!(matches!(err, ZonalError::MalformedInput { .. }));
    }

    #[test]
    fn test_non_finite_is_malformed() {
        let ring = [[0.0, 0.0], [f64::NAN, 0.0], [1.0, 1.0], [0.0, 1.0]];
        assert!(RegionGeometry::from_rings("nan", Some(&ring), None).is_err());
    }

    #[test]
    fn test_zonal_stats_get_set() {
        let mut stats = ZonalStats::default();
        assert!(stats.is_empty());
        stats.set(Statistic::StdDev, Some(1.5));
        assert_eq!(stats.get(Statistic::StdDev), Some(1.5));
        assert_eq!(stats.get(Statistic::Mean), None);
        assert!(!stats.is_empty());
    }
}
