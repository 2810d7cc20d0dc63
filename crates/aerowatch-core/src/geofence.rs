//! Geofence containment engine.
//!
//! The geofence is the union of all configured boundaries plus a global
//! altitude band. A position is inside when it satisfies the altitude band
//! (if it carries an altitude) and lies within at least one boundary.

use serde::{Deserialize, Serialize};

use crate::error::GeofenceError;
use crate::models::Position;
use crate::spatial::{
    closest_point_on_ring, degrees_to_meters, meters_to_degrees, ring_contains, PlanarPoint,
    BOUNDARY_EPSILON_DEG,
};

/// Halvings tried when an inward nudge leaves a polygon region.
const NUDGE_ATTEMPTS: usize = 8;

/// Altitude band applied on top of boundary containment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AltitudeLimits {
    pub min_m: f64,
    pub max_m: f64,
}

impl Default for AltitudeLimits {
    fn default() -> Self {
        Self {
            min_m: 2.0,
            max_m: 30.0,
        }
    }
}

impl AltitudeLimits {
    pub fn contains(&self, altitude_m: f64) -> bool {
        altitude_m >= self.min_m && altitude_m <= self.max_m
    }

    pub fn clamp(&self, altitude_m: f64) -> f64 {
        altitude_m.clamp(self.min_m, self.max_m)
    }
}

/// Boundary definition as it appears in configuration or API requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoundaryConfig {
    Circle {
        #[serde(default)]
        name: Option<String>,
        center: Position,
        #[serde(alias = "radius")]
        radius_m: f64,
        /// Outward margin added to the radius
        #[serde(default, alias = "buffer")]
        buffer_m: f64,
    },
    Polygon {
        #[serde(default)]
        name: Option<String>,
        #[serde(alias = "vertices")]
        coordinates: Vec<Position>,
        /// Outward margin around the ring
        #[serde(default, alias = "buffer")]
        buffer_m: f64,
    },
}

impl BoundaryConfig {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Circle { name, .. } | Self::Polygon { name, .. } => name.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeofenceConfig {
    pub min_altitude_m: f64,
    pub max_altitude_m: f64,
    /// Distance a corrected point is moved inside the winning boundary
    pub buffer_distance_m: f64,
    pub boundaries: Vec<BoundaryConfig>,
    /// Center of the fallback circle used when no boundaries are configured
    pub default_center: Option<Position>,
    pub default_radius_m: f64,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        let limits = AltitudeLimits::default();
        Self {
            min_altitude_m: limits.min_m,
            max_altitude_m: limits.max_m,
            buffer_distance_m: 5.0,
            boundaries: Vec::new(),
            default_center: None,
            default_radius_m: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryKind {
    Circle,
    Polygon,
}

/// Public description of a configured boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryInfo {
    pub name: String,
    pub kind: BoundaryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertices: Option<Vec<Position>>,
    pub buffer_m: f64,
}

#[derive(Debug, Clone)]
enum Shape {
    Circle {
        center: PlanarPoint,
        radius_m: f64,
        /// Radius plus buffer, in degrees
        reach_deg: f64,
    },
    Polygon {
        ring: Vec<PlanarPoint>,
        buffer_deg: f64,
    },
}

#[derive(Debug, Clone)]
struct Boundary {
    name: String,
    shape: Shape,
    buffer_m: f64,
}

impl Boundary {
    fn from_config(config: &BoundaryConfig, name: String) -> Result<Self, GeofenceError> {
        match config {
            BoundaryConfig::Circle {
                center,
                radius_m,
                buffer_m,
                ..
            } => {
                if !radius_m.is_finite() || *radius_m <= 0.0 {
                    return Err(GeofenceError::InvalidRadius {
                        name,
                        radius_m: *radius_m,
                    });
                }
                validate_buffer(&name, *buffer_m)?;
                Ok(Self {
                    shape: Shape::Circle {
                        center: PlanarPoint::new(center.latitude, center.longitude),
                        radius_m: *radius_m,
                        reach_deg: meters_to_degrees(radius_m + buffer_m),
                    },
                    buffer_m: *buffer_m,
                    name,
                })
            }
            BoundaryConfig::Polygon {
                coordinates,
                buffer_m,
                ..
            } => {
                validate_buffer(&name, *buffer_m)?;
                let mut ring: Vec<PlanarPoint> = coordinates
                    .iter()
                    .map(|p| PlanarPoint::new(p.latitude, p.longitude))
                    .collect();
                ring.dedup();

                // Close the ring (first == last)
                if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
                    if first != last {
                        ring.push(first);
                    }
                }

                let vertices = ring.len().saturating_sub(1);
                if vertices < 3 {
                    return Err(GeofenceError::DegeneratePolygon { name, vertices });
                }

                Ok(Self {
                    shape: Shape::Polygon {
                        ring,
                        buffer_deg: meters_to_degrees(*buffer_m),
                    },
                    buffer_m: *buffer_m,
                    name,
                })
            }
        }
    }

    fn contains(&self, point: &PlanarPoint) -> bool {
        match &self.shape {
            Shape::Circle {
                center, reach_deg, ..
            } => center.distance_to(point) <= reach_deg + BOUNDARY_EPSILON_DEG,
            Shape::Polygon { ring, buffer_deg } => {
                ring_contains(ring, point)
                    || closest_point_on_ring(point, ring)
                        .map(|(_, dist)| dist <= buffer_deg + BOUNDARY_EPSILON_DEG)
                        .unwrap_or(false)
            }
        }
    }

    /// Closest point on the (buffered) boundary and its distance in degrees.
    fn closest_point(&self, point: &PlanarPoint) -> Option<(PlanarPoint, f64)> {
        match &self.shape {
            Shape::Circle {
                center, reach_deg, ..
            } => {
                let dist = center.distance_to(point);
                let on_edge = if dist <= f64::EPSILON {
                    PlanarPoint::new(center.lat + reach_deg, center.lon)
                } else {
                    center.step_toward(point, *reach_deg)
                };
                Some((on_edge, (dist - reach_deg).abs()))
            }
            Shape::Polygon { ring, buffer_deg } => {
                let (on_ring, dist) = closest_point_on_ring(point, ring)?;
                if *buffer_deg <= 0.0 {
                    return Some((on_ring, dist));
                }
                let on_edge = on_ring.step_toward(point, *buffer_deg);
                Some((on_edge, (dist - buffer_deg).max(0.0)))
            }
        }
    }

    /// Move a boundary point further inside the region by `nudge_deg`.
    fn nudge_inward(&self, from: &PlanarPoint, on_edge: PlanarPoint, nudge_deg: f64) -> PlanarPoint {
        if nudge_deg <= 0.0 {
            return on_edge;
        }

        match &self.shape {
            Shape::Circle {
                center, reach_deg, ..
            } => {
                // Never overshoot the center
                if *reach_deg > nudge_deg {
                    on_edge.step_toward(center, nudge_deg)
                } else {
                    on_edge
                }
            }
            Shape::Polygon { .. } => {
                let approach = from.distance_to(&on_edge);
                if approach <= f64::EPSILON {
                    return on_edge;
                }
                let (dir_lat, dir_lon) = (
                    (on_edge.lat - from.lat) / approach,
                    (on_edge.lon - from.lon) / approach,
                );

                let mut step = nudge_deg;
                for _ in 0..NUDGE_ATTEMPTS {
                    let candidate =
                        PlanarPoint::new(on_edge.lat + dir_lat * step, on_edge.lon + dir_lon * step);
                    if self.contains(&candidate) {
                        return candidate;
                    }
                    step /= 2.0;
                }
                on_edge
            }
        }
    }

    fn info(&self) -> BoundaryInfo {
        match &self.shape {
            Shape::Circle {
                center, radius_m, ..
            } => BoundaryInfo {
                name: self.name.clone(),
                kind: BoundaryKind::Circle,
                center: Some(Position::new(center.lat, center.lon)),
                radius_m: Some(*radius_m),
                vertices: None,
                buffer_m: self.buffer_m,
            },
            Shape::Polygon { ring, .. } => BoundaryInfo {
                name: self.name.clone(),
                kind: BoundaryKind::Polygon,
                center: None,
                radius_m: None,
                vertices: Some(ring.iter().map(|p| Position::new(p.lat, p.lon)).collect()),
                buffer_m: self.buffer_m,
            },
        }
    }
}

fn validate_buffer(name: &str, buffer_m: f64) -> Result<(), GeofenceError> {
    if !buffer_m.is_finite() || buffer_m < 0.0 {
        return Err(GeofenceError::InvalidBuffer {
            name: name.to_string(),
            buffer_m,
        });
    }
    Ok(())
}

fn planar(pos: &Position) -> PlanarPoint {
    PlanarPoint::new(pos.latitude, pos.longitude)
}

/// Union-of-boundaries geofence with altitude limits.
#[derive(Debug, Clone)]
pub struct GeofenceEngine {
    limits: AltitudeLimits,
    buffer_distance_m: f64,
    boundaries: Vec<Boundary>,
}

impl GeofenceEngine {
    /// Build the engine from configuration.
    ///
    /// When no boundaries are configured and a default center is set, a
    /// circular boundary named `default` is created around it.
    pub fn new(config: &GeofenceConfig) -> Result<Self, GeofenceError> {
        if config.min_altitude_m >= config.max_altitude_m {
            return Err(GeofenceError::InvalidAltitudeLimits {
                min_m: config.min_altitude_m,
                max_m: config.max_altitude_m,
            });
        }

        let mut engine = Self {
            limits: AltitudeLimits {
                min_m: config.min_altitude_m,
                max_m: config.max_altitude_m,
            },
            buffer_distance_m: config.buffer_distance_m.max(0.0),
            boundaries: Vec::with_capacity(config.boundaries.len()),
        };

        for boundary in &config.boundaries {
            engine.add_boundary(boundary)?;
        }

        if engine.boundaries.is_empty() {
            if let Some(center) = config.default_center {
                engine.add_boundary(&BoundaryConfig::Circle {
                    name: Some("default".to_string()),
                    center,
                    radius_m: config.default_radius_m,
                    buffer_m: 0.0,
                })?;
            }
        }

        Ok(engine)
    }

    pub fn limits(&self) -> AltitudeLimits {
        self.limits
    }

    pub fn boundary_count(&self) -> usize {
        self.boundaries.len()
    }

    pub fn clamp_altitude(&self, altitude_m: f64) -> f64 {
        self.limits.clamp(altitude_m)
    }

    /// Fail-closed containment check.
    pub fn is_inside(&self, pos: &Position) -> bool {
        if let Some(altitude) = pos.altitude {
            if !self.limits.contains(altitude) {
                return false;
            }
        }
        self.contains_horizontal(pos)
    }

    /// Containment against the boundaries only, ignoring altitude.
    pub fn contains_horizontal(&self, pos: &Position) -> bool {
        let point = planar(pos);
        self.boundaries.iter().any(|b| b.contains(&point))
    }

    /// Names of the boundaries containing `pos` (altitude ignored).
    pub fn containing_boundaries(&self, pos: &Position) -> Vec<&str> {
        let point = planar(pos);
        self.boundaries
            .iter()
            .filter(|b| b.contains(&point))
            .map(|b| b.name.as_str())
            .collect()
    }

    /// Closest position satisfying the geofence.
    ///
    /// Horizontally inside positions are returned as-is; otherwise the point
    /// is projected onto the nearest boundary and nudged inward by the
    /// configured buffer distance. A present altitude is clamped to the limits.
    pub fn nearest_safe_point(&self, pos: &Position) -> Position {
        let altitude = pos.altitude.map(|alt| self.limits.clamp(alt));

        if self.contains_horizontal(pos) {
            return Position { altitude, ..*pos };
        }

        let point = planar(pos);
        let Some((boundary, on_edge, _)) = self.nearest_boundary(&point) else {
            // No boundaries at all
            return Position { altitude, ..*pos };
        };

        let safe = boundary.nudge_inward(&point, on_edge, meters_to_degrees(self.buffer_distance_m));
        Position {
            latitude: safe.lat,
            longitude: safe.lon,
            altitude,
        }
    }

    /// Distance in meters from `pos` to the geofence (0 when inside).
    ///
    /// An empty geofence admits nothing and has no edge to measure to, so
    /// every position is infinitely far outside.
    pub fn breach_distance(&self, pos: &Position) -> f64 {
        if self.contains_horizontal(pos) {
            return 0.0;
        }
        self.nearest_boundary(&planar(pos))
            .map(|(_, _, dist)| degrees_to_meters(dist))
            .unwrap_or(f64::INFINITY)
    }

    /// Add a boundary; names must be unique.
    pub fn add_boundary(&mut self, config: &BoundaryConfig) -> Result<BoundaryInfo, GeofenceError> {
        let name = match config.name() {
            Some(name) => {
                if self.boundaries.iter().any(|b| b.name == name) {
                    return Err(GeofenceError::DuplicateBoundary(name.to_string()));
                }
                name.to_string()
            }
            None => self.generated_name(),
        };

        let boundary = Boundary::from_config(config, name)?;
        let info = boundary.info();
        self.boundaries.push(boundary);
        Ok(info)
    }

    pub fn remove_boundary(&mut self, name: &str) -> bool {
        let before = self.boundaries.len();
        self.boundaries.retain(|b| b.name != name);
        self.boundaries.len() != before
    }

    pub fn list_boundaries(&self) -> Vec<BoundaryInfo> {
        self.boundaries.iter().map(Boundary::info).collect()
    }

    /// Boundary with the globally closest edge point; first one wins ties.
    fn nearest_boundary(&self, point: &PlanarPoint) -> Option<(&Boundary, PlanarPoint, f64)> {
        let mut best: Option<(&Boundary, PlanarPoint, f64)> = None;
        for boundary in &self.boundaries {
            let Some((on_edge, dist)) = boundary.closest_point(point) else {
                continue;
            };
            let replace = best
                .as_ref()
                .map(|(_, _, best_dist)| dist < *best_dist)
                .unwrap_or(true);
            if replace {
                best = Some((boundary, on_edge, dist));
            }
        }
        best
    }

    fn generated_name(&self) -> String {
        let mut index = self.boundaries.len();
        loop {
            let candidate = format!("boundary_{}", index);
            if !self.boundaries.iter().any(|b| b.name == candidate) {
                return candidate;
            }
            index += 1;
        }
    }
}
