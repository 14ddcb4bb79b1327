//! Shared helpers for tests that need a live HTTP peer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::get, Router};

use crate::config::Config;

/// Serves `router` on an ephemeral localhost port and returns its `/v1` base.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/v1")
}

#[derive(Clone)]
struct ModelsEndpoint {
    status: StatusCode,
    hits: Arc<AtomicUsize>,
}

/// `GET /v1/models` answering `status` to requests bearing `Bearer sk-test`
/// and 401 otherwise. Returns the base URL and a hit counter.
pub async fn spawn_models_endpoint(status: StatusCode) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = ModelsEndpoint {
        status,
        hits: hits.clone(),
    };

    let router = Router::new()
        .route(
            "/v1/models",
            get(
                |State(endpoint): State<ModelsEndpoint>, headers: HeaderMap| async move {
                    endpoint.hits.fetch_add(1, Ordering::SeqCst);
                    match headers.get("authorization") {
                        Some(value) if value == "Bearer sk-test" => endpoint.status,
                        _ => StatusCode::UNAUTHORIZED,
                    }
                },
            ),
        )
        .with_state(endpoint);

    (spawn_server(router).await, hits)
}

pub fn config_from(vars: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}
