// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP transport to the local collector.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tether_core::Entry;
use tracing::debug;
use url::Url;

use crate::batcher::BatchSender;
use crate::error::{DeliveryError, Result};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Collector ingestion endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
	/// `POST /logs {entries}`
	Logs,
	/// `POST /enhanced-actions {actions}`
	EnhancedActions,
	/// `POST /websocket-events {events}`
	WebSocketEvents,
	/// `POST /network-bodies {bodies}`
	NetworkBodies,
	/// `POST /performance-snapshots {snapshots}`
	PerformanceSnapshots,
}

impl Endpoint {
	pub const ALL: [Endpoint; 5] = [
		Self::Logs,
		Self::EnhancedActions,
		Self::WebSocketEvents,
		Self::NetworkBodies,
		Self::PerformanceSnapshots,
	];

	pub fn path(&self) -> &'static str {
		match self {
			Self::Logs => "logs",
			Self::EnhancedActions => "enhanced-actions",
			Self::WebSocketEvents => "websocket-events",
			Self::NetworkBodies => "network-bodies",
			Self::PerformanceSnapshots => "performance-snapshots",
		}
	}

	/// Name of the array field in the request body.
	pub fn body_key(&self) -> &'static str {
		match self {
			Self::Logs => "entries",
			Self::EnhancedActions => "actions",
			Self::WebSocketEvents => "events",
			Self::NetworkBodies => "bodies",
			Self::PerformanceSnapshots => "snapshots",
		}
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "/{}", self.path())
	}
}

/// Result of probing the collector's health endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
	pub connected: bool,
	pub status: Option<String>,
	pub version: Option<String>,
	pub entries: Option<u64>,
	pub max_entries: Option<u64>,
	pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
	status: Option<String>,
	version: Option<String>,
	entries: Option<u64>,
	max_entries: Option<u64>,
	logs: Option<LogsHealth>,
}

#[derive(Debug, Default, Deserialize)]
struct LogsHealth {
	entries: Option<u64>,
	#[serde(alias = "maxEntries")]
	max_entries: Option<u64>,
}

/// Collector client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpTransport {
	client: Client,
	base_url: Url,
}

impl HttpTransport {
	/// Build a transport for `server_url` with the given request timeout.
	pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
		let mut base_url =
			Url::parse(server_url).map_err(|e| DeliveryError::InvalidUrl(format!("{server_url}: {e}")))?;
		if !matches!(base_url.scheme(), "http" | "https") {
			return Err(DeliveryError::InvalidUrl(server_url.to_string()));
		}
		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());
			base_url.set_path(&path);
		}

		let client = Client::builder()
			.user_agent(concat!("tether/", env!("CARGO_PKG_VERSION")))
			.timeout(timeout)
			.build()?;

		Ok(Self { client, base_url })
	}

	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	fn url_for(&self, path: &str) -> Result<Url> {
		self.base_url
			.join(path)
			.map_err(|e| DeliveryError::InvalidUrl(format!("{path}: {e}")))
	}

	/// POST a batch to an ingestion endpoint.
	pub async fn send(&self, endpoint: Endpoint, entries: &[Entry]) -> Result<()> {
		let url = self.url_for(endpoint.path())?;

		let mut body = Map::with_capacity(1);
		body.insert(endpoint.body_key().to_string(), serde_json::to_value(entries)?);

		debug!(url = %url, count = entries.len(), "sending batch to collector");

		let response = self.client.post(url).json(&Value::Object(body)).send().await?;
		check_status(response).await?;
		Ok(())
	}

	/// Probe `GET /health`. Never fails; problems are reported in the result.
	pub async fn health(&self) -> HealthStatus {
		match self.try_health().await {
			Ok(status) => status,
			Err(e) => HealthStatus {
				connected: false,
				error: Some(e.to_string()),
				..HealthStatus::default()
			},
		}
	}

	async fn try_health(&self) -> Result<HealthStatus> {
		let url = self.url_for("health")?;
		let response = check_status(self.client.get(url).send().await?).await?;
		let body: HealthBody = response.json().await.unwrap_or_default();

		let logs = body.logs.unwrap_or_default();
		Ok(HealthStatus {
			connected: true,
			status: body.status,
			version: body.version,
			entries: logs.entries.or(body.entries),
			max_entries: logs.max_entries.or(body.max_entries),
			error: None,
		})
	}

	/// GET an arbitrary URL as text, used to fetch scripts and source maps.
	pub async fn fetch_text(&self, url: &str) -> Result<String> {
		let response = check_status(self.client.get(url).send().await?).await?;
		Ok(response.text().await?)
	}

	/// A [`BatchSender`] that posts to `endpoint` through this transport.
	pub fn sender(self: &Arc<Self>, endpoint: Endpoint) -> Arc<dyn BatchSender> {
		Arc::new(EndpointSender {
			transport: Arc::clone(self),
			endpoint,
		})
	}
}

async fn check_status(response: Response) -> Result<Response> {
	let status = response.status();

	if status == StatusCode::TOO_MANY_REQUESTS {
		let retry_after = response
			.headers()
			.get("Retry-After")
			.and_then(|v| v.to_str().ok())
			.and_then(|s| s.parse().ok());
		return Err(DeliveryError::RateLimited {
			retry_after_secs: retry_after,
		});
	}

	if !status.is_success() {
		let message = response.text().await.unwrap_or_default();
		return Err(DeliveryError::ServerError {
			status: status.as_u16(),
			message,
		});
	}

	Ok(response)
}

/// Posts batches to a single collector endpoint.
#[derive(Debug, Clone)]
pub struct EndpointSender {
	transport: Arc<HttpTransport>,
	endpoint: Endpoint,
}

#[async_trait::async_trait]
impl BatchSender for EndpointSender {
	async fn send_batch(&self, entries: &[Entry]) -> Result<()> {
		self.transport.send(self.endpoint, entries).await
	}
}
