//! Periodic safety monitor.
//!
//! Runs for the lifetime of one vehicle connection. Each tick reads telemetry
//! and enforces battery and geofence policy through the vehicle handle, so
//! corrective actions queue behind any in-flight control command.

use tokio::sync::broadcast;
use tokio::time::{interval, sleep, MissedTickBehavior};

use aerowatch_core::{Alert, BatteryAction, BatteryGuard, Downlink, Severity, VehicleState};

use crate::error::ControlError;
use crate::vehicle::VehicleHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorTick {
    Continue,
    /// The vehicle was disconnected; the monitor has nothing left to watch
    Detached,
}

pub struct SafetyMonitor {
    vehicle: VehicleHandle,
    battery: BatteryGuard,
}

impl SafetyMonitor {
    pub fn new(vehicle: VehicleHandle) -> Self {
        let battery = BatteryGuard::new(vehicle.safety().battery);
        Self { vehicle, battery }
    }

    /// One monitoring pass. The vehicle lock is held for the whole pass.
    pub async fn tick(&mut self) -> Result<MonitorTick, ControlError> {
        let mut vehicle = self.vehicle.lock().await;
        match vehicle.state() {
            VehicleState::Disconnected => return Ok(MonitorTick::Detached),
            // The coordinator owns recovery from a faulted link
            VehicleState::Error => return Ok(MonitorTick::Continue),
            _ => {}
        }

        let telemetry = vehicle
            .poll_telemetry()
            .await
            .map_err(|err| ControlError::MonitorTick(err.to_string()))?;

        vehicle.reconcile(&telemetry);
        if vehicle.state() == VehicleState::Connected {
            self.battery.landed();
        }

        match self.battery.assess(telemetry.battery.level_pct) {
            BatteryAction::CriticalReturn { first } => {
                let level = telemetry.battery.level_pct.unwrap_or_default();
                if first {
                    tracing::warn!("Critical battery level: {:.1}%", level);
                    self.vehicle.publish(Downlink::Alert(Alert::new(
                        "battery_critical",
                        Severity::Critical,
                        Some(telemetry.position),
                        format!("Battery at {:.1}%, returning home", level),
                    )));
                }
                match vehicle.state() {
                    VehicleState::Flying => match vehicle.return_to_home().await {
                        Ok(_) => self.battery.confirm_return(),
                        Err(ControlError::CommandRejected(reason)) => {
                            tracing::info!("Battery return rejected: {}", reason);
                        }
                        Err(err) => return Err(ControlError::MonitorTick(err.to_string())),
                    },
                    VehicleState::Returning => self.battery.confirm_return(),
                    state if first => {
                        tracing::info!("Battery return deferred while {}", state);
                    }
                    _ => {}
                }
            }
            BatteryAction::LowWarning => {
                let level = telemetry.battery.level_pct.unwrap_or_default();
                tracing::warn!("Low battery level: {:.1}%", level);
                self.vehicle.publish(Downlink::Alert(Alert::new(
                    "battery_low",
                    Severity::High,
                    Some(telemetry.position),
                    format!("Battery at {:.1}%", level),
                )));
            }
            BatteryAction::Nominal => {}
        }

        if vehicle.state() == VehicleState::Flying {
            let breach = {
                let geofence = vehicle.geofence().read();
                if geofence.is_inside(&telemetry.position) {
                    None
                } else {
                    Some((
                        geofence.breach_distance(&telemetry.position),
                        geofence.nearest_safe_point(&telemetry.position),
                    ))
                }
            };

            if let Some((distance_m, safe)) = breach {
                tracing::warn!(
                    "Geofence breach at {} ({:.1}m outside), moving to {}",
                    telemetry.position,
                    distance_m,
                    safe
                );
                self.vehicle.publish(Downlink::Alert(Alert::new(
                    "geofence_breach",
                    Severity::High,
                    Some(telemetry.position),
                    format!("Vehicle {:.1}m outside geofence", distance_m),
                )));
                vehicle
                    .move_to(safe, safe.altitude)
                    .await
                    .map_err(|err| ControlError::MonitorTick(err.to_string()))?;
            }
        }

        vehicle.record_progress(&telemetry);
        Ok(MonitorTick::Continue)
    }
}

/// Start the safety monitor for the current connection.
pub async fn run_safety_monitor(vehicle: VehicleHandle, mut shutdown: broadcast::Receiver<()>) {
    let safety = vehicle.safety().clone();
    let mut monitor = SafetyMonitor::new(vehicle);
    let mut ticker = interval(safety.monitor_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!("Safety monitor started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Safety monitor shutting down");
                break;
            }
            _ = ticker.tick() => {
                match monitor.tick().await {
                    Ok(MonitorTick::Continue) => {}
                    Ok(MonitorTick::Detached) => {
                        tracing::info!("Vehicle disconnected, safety monitor stopping");
                        break;
                    }
                    Err(err) => {
                        tracing::warn!("{}", err);
                        tokio::select! {
                            _ = shutdown.recv() => {
                                tracing::info!("Safety monitor shutting down");
                                break;
                            }
                            _ = sleep(safety.error_backoff()) => {}
                        }
                    }
                }
            }
        }
    }
}
