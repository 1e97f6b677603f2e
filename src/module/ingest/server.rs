use crate::domain::{EventPayload, EventReceivedNotification};
use crate::harness::RedisCommunicationFactory;
use crate::library::communication::event::NotificationPublisher;
use crate::library::communication::CommunicationFactory;
use crate::library::EmptyResult;
use async_trait::async_trait;
use hyper::body::Bytes;
use jatsl::{Job, JobManager};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

/// Upper bound on how long a submission may wait for the log to accept its write
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Job serving the event submission API
///
/// Accepted submissions are answered with `201 Created` and the assigned event
/// identifier, after the notification has been durably appended to the log.
/// A log that does not accept writes turns into `503 Service Unavailable`.
pub struct IngestServerJob {
    port: u16,
    redis_url: String,
    payload_size_limit: u64,
}

impl IngestServerJob {
    pub fn new(port: u16, redis_url: String, payload_size_limit: u64) -> Self {
        Self {
            port,
            redis_url,
            payload_size_limit,
        }
    }
}

#[async_trait]
impl Job for IngestServerJob {
    const NAME: &'static str = module_path!();
    const SUPPORTS_GRACEFUL_TERMINATION: bool = true;

    async fn execute(&self, manager: JobManager) -> EmptyResult {
        let factory = RedisCommunicationFactory::new(&self.redis_url)?;
        let publisher = factory.notification_publisher();

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let signal_manager = manager.clone();
        let (_, server) = warp::serve(routes(publisher, self.payload_size_limit))
            .bind_with_graceful_shutdown(addr, async move {
                signal_manager.termination_signal().await
            });

        manager.ready().await;
        server.await;

        Ok(())
    }
}

fn routes<P>(
    publisher: P,
    payload_size_limit: u64,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone
where
    P: NotificationPublisher + Clone + Send + Sync + 'static,
{
    let with_publisher = warp::any().map(move || publisher.clone());

    let submit = warp::path("events")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(payload_size_limit))
        .and(warp::body::bytes())
        .and(with_publisher.clone())
        .and_then(submit_event);

    let health = warp::path("healthz")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "status": "ok" })));

    let ready = warp::path("readyz")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_publisher)
        .and_then(readiness);

    submit.or(health).or(ready)
}

async fn submit_event<P>(body: Bytes, publisher: P) -> Result<WithStatus<Json>, Infallible>
where
    P: NotificationPublisher + Send + Sync,
{
    let payload = match EventPayload::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => return Ok(error_reply(StatusCode::BAD_REQUEST, &e.to_string())),
    };

    let notification = EventReceivedNotification::new(payload);
    let event_id = notification.event_id;

    match timeout(PUBLISH_TIMEOUT, publisher.publish(notification)).await {
        Ok(Ok(())) => {
            info!(%event_id, "Accepted event submission");
            Ok(warp::reply::with_status(
                warp::reply::json(&json!({ "event_id": event_id })),
                StatusCode::CREATED,
            ))
        }
        Ok(Err(e)) => {
            error!(%event_id, "Failed to append submission to the log: {}", e);
            Ok(error_reply(
                StatusCode::SERVICE_UNAVAILABLE,
                "event log is unavailable",
            ))
        }
        Err(_) => {
            error!(%event_id, "Timed out appending submission to the log");
            Ok(error_reply(
                StatusCode::SERVICE_UNAVAILABLE,
                "event log did not confirm the write in time",
            ))
        }
    }
}

async fn readiness<P>(publisher: P) -> Result<WithStatus<Json>, Infallible>
where
    P: NotificationPublisher + Send + Sync,
{
    match publisher.ping().await {
        Ok(_) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "status": "ready" })),
            StatusCode::OK,
        )),
        Err(e) => Ok(error_reply(StatusCode::SERVICE_UNAVAILABLE, &e.to_string())),
    }
}

fn error_reply(status: StatusCode, message: &str) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(&json!({ "error": message })), status)
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::library::communication::implementation::memory::MemoryLog;
    use serde_json::Value;

    const QUEUE_KEY: &str = "event.received";

    #[tokio::test]
    async fn accept_json_object_submissions() {
        let log = MemoryLog::new();
        let filter = routes(log.clone(), 65_536);

        let response = warp::test::request()
            .method("POST")
            .path("/events")
            .body(r#"{"kind":"signup"}"#)
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::CREATED);

        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert!(body.get("event_id").is_some());
        assert_eq!(log.len(QUEUE_KEY), 1);
    }

    #[tokio::test]
    async fn reject_malformed_submissions_without_log_writes() {
        let log = MemoryLog::new();
        let filter = routes(log.clone(), 65_536);

        for body in [&b"[1, 2, 3]"[..], &b"not json"[..]] {
            let response = warp::test::request()
                .method("POST")
                .path("/events")
                .body(body)
                .reply(&filter)
                .await;

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        assert!(log.is_empty(QUEUE_KEY));
    }

    #[tokio::test]
    async fn answer_health_and_readiness_probes() {
        let filter = routes(MemoryLog::new(), 65_536);

        let health = warp::test::request().path("/healthz").reply(&filter).await;
        assert_eq!(health.status(), StatusCode::OK);

        let ready = warp::test::request().path("/readyz").reply(&filter).await;
        assert_eq!(ready.status(), StatusCode::OK);
    }
}
