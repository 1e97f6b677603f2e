use crate::domain::EventIdentifier;
use crate::library::storage::{ResultStore, SqliteResultStore};
use crate::library::EmptyResult;
use async_trait::async_trait;
use jatsl::{Job, JobManager};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

/// Job serving the event status lookup API
pub struct QueryServerJob {
    port: u16,
    storage_url: String,
}

impl QueryServerJob {
    pub fn new(port: u16, storage_url: String) -> Self {
        Self { port, storage_url }
    }
}

#[async_trait]
impl Job for QueryServerJob {
    const NAME: &'static str = module_path!();
    const SUPPORTS_GRACEFUL_TERMINATION: bool = true;

    async fn execute(&self, manager: JobManager) -> EmptyResult {
        let store = SqliteResultStore::new(&self.storage_url).await?;

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let signal_manager = manager.clone();
        let (_, server) = warp::serve(routes(store))
            .bind_with_graceful_shutdown(addr, async move {
                signal_manager.termination_signal().await
            });

        manager.ready().await;
        server.await;

        Ok(())
    }
}

fn routes<S>(store: S) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone
where
    S: ResultStore + Clone + Send + Sync + 'static,
{
    let with_store = warp::any().map(move || store.clone());

    let lookup = warp::path!("events" / EventIdentifier)
        .and(warp::get())
        .and(with_store.clone())
        .and_then(lookup_event);

    let health = warp::path("healthz")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "status": "ok" })));

    let ready = warp::path("readyz")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_store)
        .and_then(readiness);

    lookup.or(health).or(ready)
}

async fn lookup_event<S>(id: EventIdentifier, store: S) -> Result<WithStatus<Json>, Infallible>
where
    S: ResultStore + Send + Sync,
{
    match store.get(&id).await {
        Ok(Some(result)) => Ok(warp::reply::with_status(
            warp::reply::json(&result),
            StatusCode::OK,
        )),
        Ok(None) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": "unknown event identifier" })),
            StatusCode::NOT_FOUND,
        )),
        Err(e) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": e.to_string() })),
            StatusCode::SERVICE_UNAVAILABLE,
        )),
    }
}

async fn readiness<S>(store: S) -> Result<WithStatus<Json>, Infallible>
where
    S: ResultStore + Send + Sync,
{
    match store.ping().await {
        Ok(_) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "status": "ready" })),
            StatusCode::OK,
        )),
        Err(e) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": e.to_string() })),
            StatusCode::SERVICE_UNAVAILABLE,
        )),
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::domain::{ProcessingResult, ProcessingStatus};
    use crate::library::storage::MemoryResultStore;
    use serde_json::Value;

    #[tokio::test]
    async fn answer_lookups_for_known_events() {
        let store = MemoryResultStore::new();
        let result = ProcessingResult::processed(EventIdentifier::new_v4(), json!({"n": 1}), 1);
        store.upsert_if_not_terminal(&result).await.unwrap();

        let filter = routes(store);
        let response = warp::test::request()
            .path(&format!("/events/{}", result.event_id))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["status"], json!("processed"));
        assert_eq!(body["result_payload"], json!({"n": 1}));
    }

    #[tokio::test]
    async fn answer_unknown_identifiers_with_not_found() {
        let filter = routes(MemoryResultStore::new());

        let response = warp::test::request()
            .path(&format!("/events/{}", EventIdentifier::new_v4()))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn signal_unavailability_of_the_store() {
        let store = MemoryResultStore::new();
        store.set_available(false);

        let filter = routes(store);

        let lookup = warp::test::request()
            .path(&format!("/events/{}", EventIdentifier::new_v4()))
            .reply(&filter)
            .await;
        assert_eq!(lookup.status(), StatusCode::SERVICE_UNAVAILABLE);

        let ready = warp::test::request().path("/readyz").reply(&filter).await;
        assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn use_pending_status_in_responses() {
        let result = ProcessingResult::pending(EventIdentifier::new_v4(), 1);
        let body = serde_json::to_value(&result).unwrap();
        assert_eq!(body["status"], json!("pending"));
        assert_eq!(result.status, ProcessingStatus::Pending);
    }
}
