/// GET /healthz
/// Liveness only; does not touch any provider.
pub async fn health_handler() -> &'static str {
    "ok"
}
