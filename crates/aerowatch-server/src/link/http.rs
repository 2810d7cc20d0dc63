//! JSON/HTTP client for a vehicle-side bridge service.
//!
//! The bridge owns the autopilot connection and exposes one endpoint per link
//! operation. Error responses carry `{"error": "...", "fatal": bool}`.

use std::time::Duration;

use aerowatch_core::{FlightMode, Position, Telemetry};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::LinkError;
use crate::link::FlightLink;

pub struct HttpLink {
    client: Client,
    base_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConnectRequest {
    timeout_s: u64,
}

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    home: Position,
}

#[derive(Debug, Serialize)]
struct TakeoffRequest {
    altitude_m: f64,
}

#[derive(Debug, Serialize)]
struct GotoRequest {
    target: Position,
    airspeed_mps: f64,
}

#[derive(Debug, Serialize)]
struct ModeRequest {
    mode: FlightMode,
}

#[derive(Debug, Serialize)]
struct MissionRequest<'a> {
    waypoints: &'a [Position],
}

#[derive(Debug, Default, Deserialize)]
struct BridgeError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    fatal: bool,
}

impl HttpLink {
    /// `request_timeout` bounds every bridge call, including blocking ones
    /// such as arming and takeoff.
    pub fn new(request_timeout: Duration) -> Result<Self, LinkError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| LinkError::Http(err.to_string()))?;
        Ok(Self {
            client,
            base_url: None,
        })
    }

    fn url(&self, path: &str) -> Result<String, LinkError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| LinkError::Unavailable("bridge not connected".to_string()))?;
        Ok(format!("{}{}", base, path))
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response, LinkError> {
        let url = self.url(path)?;
        let response = self.client.post(&url).json(body).send().await?;
        check_status(response).await
    }

    async fn post_empty(&self, path: &str) -> Result<(), LinkError> {
        self.post(path, &serde_json::json!({})).await.map(|_| ())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, LinkError> {
        let url = self.url(path)?;
        let response = check_status(self.client.get(&url).send().await?).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| LinkError::Http(format!("invalid bridge response: {}", err)))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: BridgeError = response.json().await.unwrap_or_default();
    let message = if body.error.is_empty() {
        status.to_string()
    } else {
        body.error
    };

    Err(if body.fatal {
        LinkError::Fatal(message)
    } else if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::GATEWAY_TIMEOUT {
        LinkError::Unavailable(message)
    } else if status.is_client_error() {
        LinkError::Rejected(message)
    } else {
        LinkError::Http(format!("{}: {}", status, message))
    })
}

#[async_trait]
impl FlightLink for HttpLink {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn connect(&mut self, connection: &str, timeout: Duration) -> Result<Position, LinkError> {
        self.base_url = Some(connection.trim_end_matches('/').to_string());

        let request = ConnectRequest {
            timeout_s: timeout.as_secs(),
        };
        let result = match self.post("/connect", &request).await {
            Ok(response) => response
                .json::<ConnectResponse>()
                .await
                .map(|body| body.home)
                .map_err(|err| LinkError::Http(format!("invalid connect response: {}", err))),
            Err(err) => Err(err),
        };

        if result.is_err() {
            self.base_url = None;
        }
        result
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        let result = self.post_empty("/disconnect").await;
        self.base_url = None;
        result
    }

    async fn arm(&mut self) -> Result<(), LinkError> {
        self.post_empty("/arm").await
    }

    async fn takeoff(&mut self, altitude_m: f64) -> Result<(), LinkError> {
        self.post("/takeoff", &TakeoffRequest { altitude_m }).await.map(|_| ())
    }

    async fn goto(&mut self, target: Position, airspeed_mps: f64) -> Result<(), LinkError> {
        self.post("/goto", &GotoRequest { target, airspeed_mps })
            .await
            .map(|_| ())
    }

    async fn set_mode(&mut self, mode: FlightMode) -> Result<(), LinkError> {
        self.post("/mode", &ModeRequest { mode }).await.map(|_| ())
    }

    async fn upload_mission(&mut self, waypoints: &[Position]) -> Result<(), LinkError> {
        self.post("/mission", &MissionRequest { waypoints }).await.map(|_| ())
    }

    async fn read_telemetry(&mut self) -> Result<Telemetry, LinkError> {
        self.get_json("/telemetry").await
    }
}
