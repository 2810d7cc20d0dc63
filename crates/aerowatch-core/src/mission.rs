//! Mission catalog and geofence-validated mission preparation.

use std::collections::BTreeMap;

use crate::error::MissionError;
use crate::geofence::GeofenceEngine;
use crate::models::{Mission, MissionDefinition, Position};

/// Owns the mission catalog and the currently uploaded mission.
#[derive(Debug, Clone)]
pub struct MissionPlanner {
    catalog: BTreeMap<String, MissionDefinition>,
    current: Option<Mission>,
    default_altitude_m: f64,
}

impl MissionPlanner {
    pub fn new(catalog: BTreeMap<String, MissionDefinition>, default_altitude_m: f64) -> Self {
        Self {
            catalog,
            current: None,
            default_altitude_m,
        }
    }

    /// Build a mission from the catalog with every waypoint inside the geofence.
    ///
    /// Missing altitudes take the default altitude, altitudes are clamped to
    /// the geofence limits and out-of-bounds waypoints are replaced by their
    /// nearest safe point. Waypoint order is preserved.
    pub fn prepare(&self, mission_id: &str, geofence: &GeofenceEngine) -> Result<Mission, MissionError> {
        let definition = self
            .catalog
            .get(mission_id)
            .ok_or_else(|| MissionError::NotFound(mission_id.to_string()))?;

        if definition.waypoints.is_empty() {
            return Err(MissionError::Empty(mission_id.to_string()));
        }

        let mut corrected = Vec::new();
        let waypoints: Vec<Position> = definition
            .waypoints
            .iter()
            .enumerate()
            .map(|(index, waypoint)| {
                let altitude = geofence.clamp_altitude(waypoint.altitude.unwrap_or(self.default_altitude_m));
                let candidate = waypoint.with_altitude(altitude);
                if geofence.is_inside(&candidate) {
                    candidate
                } else {
                    corrected.push(index);
                    geofence.nearest_safe_point(&candidate)
                }
            })
            .collect();

        Ok(Mission {
            id: mission_id.to_string(),
            name: definition.name.clone(),
            waypoints,
            corrected,
            current_waypoint: 0,
        })
    }

    /// Install an uploaded mission, replacing any previous one.
    pub fn activate(&mut self, mut mission: Mission) -> &Mission {
        mission.current_waypoint = 0;
        self.current.insert(mission)
    }

    pub fn current(&self) -> Option<&Mission> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) -> Option<Mission> {
        self.current.take()
    }

    /// Apply link-reported progress. Returns true when the index changed.
    pub fn record_progress(&mut self, waypoint_index: usize) -> bool {
        match self.current.as_mut() {
            Some(mission) if mission.current_waypoint != waypoint_index => {
                mission.current_waypoint = waypoint_index;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geofence::{BoundaryConfig, GeofenceConfig};

    fn geofence() -> GeofenceEngine {
        GeofenceEngine::new(&GeofenceConfig {
            boundaries: vec![BoundaryConfig::Circle {
                name: Some("Main Area".to_string()),
                center: Position::new(37.7749, -122.4194),
                radius_m: 100.0,
                buffer_m: 0.0,
            }],
            ..GeofenceConfig::default()
        })
        .unwrap()
    }

    fn planner() -> MissionPlanner {
        let mut catalog = BTreeMap::new();
        catalog.insert(
            "survey".to_string(),
            MissionDefinition {
                name: "Survey".to_string(),
                waypoints: vec![
                    Position::new(37.7749, -122.4194).with_altitude(10.0),
                    Position::new(37.7800, -122.4194).with_altitude(15.0),
                    Position::new(37.7745, -122.4190),
                ],
            },
        );
        catalog.insert(
            "empty".to_string(),
            MissionDefinition {
                name: "Empty".to_string(),
                waypoints: Vec::new(),
            },
        );
        MissionPlanner::new(catalog, 10.0)
    }

    #[test]
    fn out_of_bounds_waypoint_is_replaced_in_place() {
        let fence = geofence();
        let mission = planner().prepare("survey", &fence).unwrap();

        assert_eq!(mission.waypoints.len(), 3);
        assert_eq!(mission.corrected, vec![1]);
        assert!(mission.waypoints.iter().all(|wp| fence.is_inside(wp)));

        // Untouched waypoints keep their position and order
        assert_eq!(mission.waypoints[0], Position::new(37.7749, -122.4194).with_altitude(10.0));
        assert_eq!(mission.waypoints[2], Position::new(37.7745, -122.4190).with_altitude(10.0));
        assert_eq!(mission.waypoints[1].altitude, Some(15.0));
        assert_eq!(mission.current_waypoint, 0);
    }

    #[test]
    fn unknown_and_empty_missions_are_rejected() {
        let fence = geofence();
        let planner = planner();
        assert_eq!(
            planner.prepare("patrol", &fence),
            Err(MissionError::NotFound("patrol".to_string()))
        );
        assert_eq!(
            planner.prepare("empty", &fence),
            Err(MissionError::Empty("empty".to_string()))
        );
    }

    #[test]
    fn activation_replaces_and_tracks_progress() {
        let fence = geofence();
        let mut planner = planner();

        let first = planner.prepare("survey", &fence).unwrap();
        planner.activate(first);
        assert!(planner.record_progress(2));
        assert!(!planner.record_progress(2));

        let second = planner.prepare("survey", &fence).unwrap();
        planner.activate(second);
        assert_eq!(planner.current().map(|m| m.current_waypoint), Some(0));

        assert!(planner.clear().is_some());
        assert!(!planner.record_progress(1));
    }
}
