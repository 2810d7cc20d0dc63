//! Planar spatial math used by the geofence engine.
//!
//! Geometry is evaluated in raw degree space with `lat` as the y axis and
//! `lon` as the x axis. Conversion to meters uses a single flat-earth factor
//! (no latitude-dependent longitude scaling), so east-west distances are
//! overestimated away from the equator.

/// Approximate meters per degree used for every degree/meter conversion.
pub const METERS_PER_DEGREE: f64 = 111_111.0;

/// Tolerance (degrees, roughly 0.1 mm) for points lying on a boundary.
pub const BOUNDARY_EPSILON_DEG: f64 = 1e-9;

/// A point in degree space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarPoint {
    pub lat: f64,
    pub lon: f64,
}

impl PlanarPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn distance_to(&self, other: &PlanarPoint) -> f64 {
        let dlat = other.lat - self.lat;
        let dlon = other.lon - self.lon;
        (dlat * dlat + dlon * dlon).sqrt()
    }

    /// Move `distance_deg` from `self` in the direction of `toward`.
    ///
    /// Returns `self` when the two points coincide.
    pub fn step_toward(&self, toward: &PlanarPoint, distance_deg: f64) -> PlanarPoint {
        let length = self.distance_to(toward);
        if length <= f64::EPSILON {
            return *self;
        }
        let ratio = distance_deg / length;
        PlanarPoint {
            lat: self.lat + (toward.lat - self.lat) * ratio,
            lon: self.lon + (toward.lon - self.lon) * ratio,
        }
    }
}

pub fn meters_to_degrees(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE
}

pub fn degrees_to_meters(degrees: f64) -> f64 {
    degrees * METERS_PER_DEGREE
}

/// Closest point to `point` on the segment `start..end`.
pub fn closest_point_on_segment(
    point: &PlanarPoint,
    start: &PlanarPoint,
    end: &PlanarPoint,
) -> PlanarPoint {
    let sx = end.lon - start.lon;
    let sy = end.lat - start.lat;
    let seg_len_sq = sx * sx + sy * sy;

    if seg_len_sq <= f64::EPSILON * f64::EPSILON {
        // Segment is essentially a point
        return *start;
    }

    // Project point onto segment line: t = ((P-A) · (B-A)) / |B-A|²
    let px = point.lon - start.lon;
    let py = point.lat - start.lat;
    let t = ((px * sx + py * sy) / seg_len_sq).clamp(0.0, 1.0);

    PlanarPoint {
        lat: start.lat + t * sy,
        lon: start.lon + t * sx,
    }
}

/// Closest point to `point` on a closed ring, with its distance.
///
/// Returns `None` for rings with fewer than two vertices.
pub fn closest_point_on_ring(point: &PlanarPoint, ring: &[PlanarPoint]) -> Option<(PlanarPoint, f64)> {
    ring.windows(2)
        .map(|edge| {
            let candidate = closest_point_on_segment(point, &edge[0], &edge[1]);
            (candidate, point.distance_to(&candidate))
        })
        .fold(None, |best, current| match best {
            Some((_, best_dist)) if best_dist <= current.1 => best,
            _ => Some(current),
        })
}

/// Ray-casting point-in-polygon test over a closed ring.
pub fn ring_contains(ring: &[PlanarPoint], point: &PlanarPoint) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let yi = ring[i].lat;
        let xi = ring[i].lon;
        let yj = ring[j].lat;
        let xj = ring[j].lon;

        if ((yi > point.lat) != (yj > point.lat))
            && (point.lon < (xj - xi) * (point.lat - yi) / (yj - yi) + xi)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}
