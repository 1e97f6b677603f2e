use crate::domain::{EventIdentifier, ProcessingStatus};
use chrono::Utc;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use uuid::Uuid;

/// Upper bound for a single event submission request
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound for a single status poll request
const POLL_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Error thrown by requests against the pipeline services
#[derive(Debug, Error)]
pub enum ProbeFailure {
    /// Request did not complete within its time budget
    #[error("request did not complete in time")]
    Timeout,
    /// Connection level failure
    #[error("request failed")]
    Connection(#[from] hyper::Error),
    /// Request could not be constructed
    #[error("failed to build request")]
    Request(#[from] hyper::http::Error),
    /// Service answered with an unexpected status code
    #[error("unexpected status code {0}")]
    UnexpectedStatus(StatusCode),
    /// Response body did not have the expected shape
    #[error("malformed response body")]
    MalformedResponse,
}

/// HTTP client driving the pipeline from the outside, like a user would
pub struct PipelineClient {
    http: Client<HttpConnector>,
    ingest_url: String,
    query_url: String,
    health_timeout: Duration,
}

impl PipelineClient {
    /// Creates a new client for the given service base URLs
    pub fn new(ingest_url: String, query_url: String, health_timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            ingest_url,
            query_url,
            health_timeout,
        }
    }

    /// Submits a synthetic event, yielding the identifier assigned by the ingress
    pub async fn submit_event(&self) -> Result<EventIdentifier, ProbeFailure> {
        let payload = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "device_id": format!("device-{}", Uuid::new_v4()),
            "value": 123.45,
        });

        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("{}/events", self.ingest_url))
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))?;

        let response = self.dispatch(request, SUBMIT_TIMEOUT).await?;

        if response.status() != StatusCode::CREATED {
            return Err(ProbeFailure::UnexpectedStatus(response.status()));
        }

        let body: Value = Self::parse_body(response).await?;

        body.get("event_id")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
            .ok_or(ProbeFailure::MalformedResponse)
    }

    /// Looks up the current processing status of an event
    ///
    /// `None` means the query service does not know the identifier (yet).
    pub async fn fetch_status(
        &self,
        id: &EventIdentifier,
    ) -> Result<Option<ProcessingStatus>, ProbeFailure> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("{}/events/{}", self.query_url, id))
            .body(Body::empty())?;

        let response = self.dispatch(request, POLL_REQUEST_TIMEOUT).await?;

        match response.status() {
            StatusCode::OK => {
                let body: Value = Self::parse_body(response).await?;

                body.get("status")
                    .and_then(Value::as_str)
                    .and_then(|raw| raw.parse().ok())
                    .map(Some)
                    .ok_or(ProbeFailure::MalformedResponse)
            }
            StatusCode::NOT_FOUND => Ok(None),
            other => Err(ProbeFailure::UnexpectedStatus(other)),
        }
    }

    /// Whether the ingest service answers its health endpoint
    pub async fn ingest_healthy(&self) -> bool {
        self.health(&self.ingest_url).await.is_ok()
    }

    /// Whether the query service answers its health endpoint
    pub async fn query_healthy(&self) -> bool {
        self.health(&self.query_url).await.is_ok()
    }

    async fn health(&self, base_url: &str) -> Result<(), ProbeFailure> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("{}/healthz", base_url))
            .body(Body::empty())?;

        let response = self.dispatch(request, self.health_timeout).await?;

        if response.status() == StatusCode::OK {
            Ok(())
        } else {
            Err(ProbeFailure::UnexpectedStatus(response.status()))
        }
    }

    async fn dispatch(
        &self,
        request: Request<Body>,
        limit: Duration,
    ) -> Result<Response<Body>, ProbeFailure> {
        match timeout(limit, self.http.request(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(ProbeFailure::Connection(e)),
            Err(_) => Err(ProbeFailure::Timeout),
        }
    }

    async fn parse_body(response: Response<Body>) -> Result<Value, ProbeFailure> {
        let bytes = hyper::body::to_bytes(response.into_body()).await?;
        serde_json::from_slice(&bytes).map_err(|_| ProbeFailure::MalformedResponse)
    }
}
