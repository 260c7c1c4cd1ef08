//! Échantillonnage d'une région sur une grille régulière
//!
//! La grille couvre la boîte englobante de l'emprise, élargie d'un pas de
//! résolution de chaque côté. Une cellule est retenue si l'un de ses cinq
//! points de sonde (centre + quatre coins) est dans la frontière: les cellules
//! à cheval sur le bord ne sont pas perdues, ce qui évite de sous-échantillonner
//! les régions fines. Sans frontière, toute la grille de l'emprise est gardée.
//!
//! Le résultat est une fonction pure de (géométrie, résolution): mêmes entrées,
//! mêmes points, même ordre (latitude croissante, puis longitude croissante).

use blake3::Hasher;
use geo::{BoundingRect, Coord, LineString};
use serde::Serialize;

use crate::types::{distinct_vertices, RegionGeometry};
use crate::ZonalError;

/// Nombre maximal de cellules candidates pour une grille
pub const MAX_GRID_CELLS: usize = 2_000_000;

/// Précision d'arrondi des coordonnées générées (évite le bruit flottant)
const COORD_SCALE: f64 = 1e10;

/// Ensemble ordonné de points [lon, lat]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplePointSet {
    /// Pas de grille en degrés
    pub resolution: f64,
    /// Emprise élargie [min_lon, min_lat, max_lon, max_lat]
    pub bbox: [f64; 4],
    /// Filtrage par la frontière appliqué
    pub filtered: bool,
    /// Points retenus
    pub points: Vec<[f64; 2]>,
    /// Empreinte stable de (anneau, résolution)
    pub fingerprint: String,
}

impl SamplePointSet {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Génère la grille d'échantillonnage d'une région
pub fn sample_grid(region: &RegionGeometry, resolution: f64) -> Result<SamplePointSet, ZonalError> {
    let extent = region.bounds().bounding_rect().unwrap_or_else(|| region.bbox());
    sample_ring(
        region.id(),
        [extent.min().x, extent.min().y, extent.max().x, extent.max().y],
        region.boundary().map(|p| p.exterior()),
        resolution,
    )
}

/// Génère la grille pour une emprise et un anneau de filtrage optionnel
pub fn sample_ring(
    region_id: &str,
    extent: [f64; 4],
    ring: Option<&LineString>,
    resolution: f64,
) -> Result<SamplePointSet, ZonalError> {
    if !resolution.is_finite() || resolution <= 0.0 {
        return Err(ZonalError::InvalidResolution(resolution));
    }
    if extent.iter().any(|v| !v.is_finite()) {
        return Err(ZonalError::malformed(region_id, "extent contains non-finite values"));
    }
    if let Some(ring) = ring {
        if distinct_vertices(&ring.0) < 3 {
            return Err(ZonalError::malformed(
                region_id,
                "boundary has fewer than 3 distinct vertices",
            ));
        }
    }

    let min_lon = extent[0] - resolution;
    let min_lat = extent[1] - resolution;
    let max_lon = extent[2] + resolution;
    let max_lat = extent[3] + resolution;

    let n_lon = steps(min_lon, max_lon, resolution);
    let n_lat = steps(min_lat, max_lat, resolution);
    let cells = n_lon.saturating_mul(n_lat);
    if cells > MAX_GRID_CELLS {
        return Err(ZonalError::GridTooLarge {
            cells,
            max: MAX_GRID_CELLS,
        });
    }

    let mut points = Vec::new();
    for j in 0..n_lat {
        let lat = round_coord(min_lat + j as f64 * resolution);
        for i in 0..n_lon {
            let lon = round_coord(min_lon + i as f64 * resolution);
            let keep = match ring {
                Some(ring) => cell_touches_ring(Coord { x: lon, y: lat }, resolution, &ring.0),
                None => true,
            };
            if keep {
                points.push([lon, lat]);
            }
        }
    }

    tracing::debug!(
        region = region_id,
        candidates = cells,
        retained = points.len(),
        resolution,
        "Sample grid built"
    );

    Ok(SamplePointSet {
        resolution,
        bbox: [min_lon, min_lat, max_lon, max_lat],
        filtered: ring.is_some(),
        points,
        fingerprint: fingerprint(extent, ring, resolution),
    })
}

/// Nombre de positions de grille dans [min, max] (bornes incluses)
fn steps(min: f64, max: f64, resolution: f64) -> usize {
    ((max - min) / resolution + 1e-9).floor() as usize + 1
}

fn round_coord(v: f64) -> f64 {
    (v * COORD_SCALE).round() / COORD_SCALE
}

/// Test point-dans-polygone par lancer de rayon (règle pair-impair)
pub fn point_in_ring(point: Coord, ring: &[Coord]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (ring[i], ring[j]);
        if (pi.y > point.y) != (pj.y > point.y)
            && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Une cellule touche l'anneau si son centre ou l'un de ses coins est dedans
pub fn cell_touches_ring(center: Coord, resolution: f64, ring: &[Coord]) -> bool {
    let half = resolution / 2.0;
    let probes = [
        Coord { x: center.x - half, y: center.y - half },
        Coord { x: center.x + half, y: center.y - half },
        Coord { x: center.x + half, y: center.y + half },
        Coord { x: center.x - half, y: center.y + half },
        center,
    ];
    probes.iter().any(|&p| point_in_ring(p, ring))
}

/// Empreinte hexadécimale stable de la requête d'échantillonnage
///
/// L'anneau est normalisé pour commencer au sommet lexicographiquement le
/// plus petit: un même polygone décrit depuis un autre sommet donne la même
/// empreinte.
fn fingerprint(extent: [f64; 4], ring: Option<&LineString>, resolution: f64) -> String {
    let mut hasher = Hasher::new();
    hasher.update(b"GRID");
    hasher.update(&quantize(resolution).to_le_bytes());
    for v in extent {
        hasher.update(&quantize(v).to_le_bytes());
    }
    match ring {
        Some(ring) => {
            hasher.update(b"RING");
            hash_ring_normalized(&mut hasher, ring);
        }
        None => {
            hasher.update(b"BBOX");
        }
    }
    hex::encode(hasher.finalize().as_bytes())
}

fn hash_ring_normalized(hasher: &mut Hasher, ring: &LineString) {
    let len = if ring.0.len() > 1 && ring.0.first() == ring.0.last() {
        ring.0.len() - 1
    } else {
        ring.0.len()
    };
    if len == 0 {
        return;
    }

    let min_idx = (0..len)
        .min_by(|&a, &b| {
            let (ca, cb) = (&ring.0[a], &ring.0[b]);
            ca.x.partial_cmp(&cb.x)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ca.y.partial_cmp(&cb.y).unwrap_or(std::cmp::Ordering::Equal))
        })
        .unwrap_or(0);

    for i in 0..len {
        let c = ring.0[(min_idx + i) % len];
        hasher.update(&quantize(c.x).to_le_bytes());
        hasher.update(&quantize(c.y).to_le_bytes());
    }
}

/// Arrondi à 6 décimales (~10 cm)
fn quantize(v: f64) -> i64 {
    (v * 1_000_000.0).round() as i64
}
