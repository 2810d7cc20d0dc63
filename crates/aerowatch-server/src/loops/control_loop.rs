//! Control coordinator loop.
//!
//! Drains perception events and ground-control commands on a fixed tick,
//! maps them to vehicle actions and publishes one status snapshot per tick.

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

use aerowatch_core::{Alert, Command, CommandAck, Downlink, Event, StatusSnapshot, VehicleState};

use crate::config::EmergencyConfig;
use crate::error::ControlError;
use crate::vehicle::VehicleHandle;

/// Producer ends handed to the gateway.
pub struct CoordinatorInputs {
    pub events: mpsc::UnboundedSender<Event>,
    pub commands: mpsc::UnboundedSender<Value>,
    pub status: watch::Receiver<Option<StatusSnapshot>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Shutdown(String),
}

pub struct ControlCoordinator {
    vehicle: VehicleHandle,
    emergency: EmergencyConfig,
    events: mpsc::UnboundedReceiver<Event>,
    commands: mpsc::UnboundedReceiver<Value>,
    status: watch::Sender<Option<StatusSnapshot>>,
}

impl ControlCoordinator {
    pub fn new(vehicle: VehicleHandle, emergency: EmergencyConfig) -> (Self, CoordinatorInputs) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(None);

        let coordinator = Self {
            vehicle,
            emergency,
            events: event_rx,
            commands: command_rx,
            status: status_tx,
        };
        let inputs = CoordinatorInputs {
            events: event_tx,
            commands: command_tx,
            status: status_rx,
        };
        (coordinator, inputs)
    }

    /// Process everything queued since the last tick.
    pub async fn tick(&mut self) -> TickOutcome {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event).await;
        }

        while let Ok(raw) = self.commands.try_recv() {
            if let Some(reason) = self.handle_command(raw).await {
                return TickOutcome::Shutdown(reason);
            }
        }

        match self.publish_status().await {
            VehicleState::Error => TickOutcome::Shutdown("vehicle fault".to_string()),
            _ => TickOutcome::Continue,
        }
    }

    async fn handle_event(&self, event: Event) {
        tracing::warn!(
            "{} event ({:?}, confidence {:.2}) at {}",
            event.kind,
            event.severity(),
            event.confidence,
            event.location
        );
        self.vehicle.publish(Downlink::Alert(Alert::from_event(&event)));

        if !self.emergency.automatic_response {
            return;
        }
        let Some(altitude) = self.emergency.altitude_for(&event.kind) else {
            return;
        };

        let result = self
            .vehicle
            .lock()
            .await
            .move_to(event.location, Some(altitude))
            .await;
        match result {
            Ok(target) => tracing::info!("Responding to {} event at {}", event.kind, target),
            Err(ControlError::CommandRejected(reason)) => {
                tracing::info!("No response to {} event: {}", event.kind, reason);
            }
            Err(err) => tracing::error!("Response to {} event failed: {}", event.kind, err),
        }
    }

    /// Dispatch one raw command. Returns the shutdown reason for `shutdown`.
    async fn handle_command(&self, raw: Value) -> Option<String> {
        let name = raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let command = match Command::from_value(raw) {
            Ok(command) => command,
            Err(err) => {
                let reason = ControlError::CommandRejected(err.to_string());
                tracing::warn!("Command '{}': {}", name, reason);
                self.vehicle
                    .publish(Downlink::Ack(CommandAck::rejected(name, reason.to_string())));
                return None;
            }
        };

        tracing::info!("Processing {} command", command.name());
        if command == Command::Shutdown {
            self.vehicle
                .publish(Downlink::Ack(CommandAck::accepted(command.name())));
            return Some("shutdown command".to_string());
        }

        let ack = match self.dispatch(&command).await {
            Ok(()) => CommandAck::accepted(command.name()),
            Err(err) => {
                tracing::warn!("Command {} failed: {}", command.name(), err);
                CommandAck::rejected(command.name(), err.to_string())
            }
        };
        self.vehicle.publish(Downlink::Ack(ack));
        None
    }

    async fn dispatch(&self, command: &Command) -> Result<(), ControlError> {
        let mut vehicle = self.vehicle.lock().await;
        match command {
            Command::Move {
                coordinates,
                altitude,
            } => vehicle.move_to(*coordinates, *altitude).await.map(|_| ()),
            Command::Takeoff { altitude } => vehicle.takeoff(*altitude).await.map(|_| ()),
            Command::Land => vehicle.land().await,
            Command::Return => vehicle.return_to_home().await.map(|_| ()),
            Command::Mission { mission_id } => vehicle.load_mission(mission_id).await.map(|_| ()),
            Command::Shutdown => Ok(()),
        }
    }

    async fn publish_status(&self) -> VehicleState {
        let snapshot = self.vehicle.lock().await.status_snapshot();
        let state = snapshot.state;
        self.status.send_replace(Some(snapshot.clone()));
        self.vehicle.publish(Downlink::Status(snapshot));
        state
    }

    /// Stop intake, land if airborne and disconnect.
    pub async fn shutdown(&mut self, reason: &str) {
        tracing::info!("Control loop shutting down ({})", reason);
        self.events.close();
        self.commands.close();

        self.vehicle.lock().await.emergency_shutdown().await;
        self.publish_status().await;
        tracing::info!("Safe shutdown complete");
    }

    /// Run until a shutdown command, a vehicle fault or an external signal.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.emergency.control_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!("Control loop started");

        let reason = loop {
            tokio::select! {
                _ = shutdown.recv() => break "shutdown signal".to_string(),
                _ = ticker.tick() => {
                    if let TickOutcome::Shutdown(reason) = self.tick().await {
                        break reason;
                    }
                }
            }
        };

        self.shutdown(&reason).await;
    }
}
