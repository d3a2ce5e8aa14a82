//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::notify::Notifier;
use crate::scheduler::Scheduler;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub scheduler: Arc<Scheduler>,
    /// Local channels behind `POST /alert`.
    pub channels: Arc<dyn Notifier>,
}

/// Web server for Sitewatch.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(
        config: ServerConfig,
        store: Arc<Store>,
        scheduler: Arc<Scheduler>,
        channels: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            state: AppState {
                config,
                store,
                scheduler,
                channels,
            },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/health", get(handlers::handle_health))
            // Notification service
            .route("/alert", post(handlers::handle_send_alert))
            // API endpoints
            .route("/api/targets", get(handlers::handle_get_targets))
            .route("/api/targets", post(handlers::handle_create_target))
            .route("/api/targets/{id}", delete(handlers::handle_delete_target))
            .route("/api/targets/{id}/history", get(handlers::handle_get_history))
            .route("/api/targets/{id}/checks", get(handlers::handle_get_checks))
            .route("/api/alerts", get(handlers::handle_get_alerts))
            .route("/api/cycle", post(handlers::handle_run_cycle))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertEvaluator;
    use crate::db::{ResultStore, Target};
    use crate::notify::NotifierError;
    use crate::probe::{
        DomainProbe, DomainResult, HttpProbe, HttpResult, ProbeError, Probers, TlsProbe, TlsResult,
    };
    use crate::scheduler::CheckOrchestrator;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    struct Offline;

    fn offline(target: &str) -> ProbeError {
        ProbeError::Network {
            target: target.to_string(),
            cause: "offline".to_string(),
        }
    }

    #[async_trait]
    impl HttpProbe for Offline {
        async fn probe(&self, url: &str) -> Result<HttpResult, ProbeError> {
            Err(offline(url))
        }
    }

    #[async_trait]
    impl TlsProbe for Offline {
        async fn probe(&self, host: &str) -> Result<TlsResult, ProbeError> {
            Err(offline(host))
        }
    }

    #[async_trait]
    impl DomainProbe for Offline {
        async fn probe(&self, domain: &str) -> Result<DomainResult, ProbeError> {
            Err(offline(domain))
        }
    }

    #[derive(Default)]
    struct Inbox {
        received: Mutex<Vec<(String, String, Target)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Inbox {
        async fn notify(&self, alert_type: &str, message: &str, target: &Target) -> Result<(), NotifierError> {
            self.received
                .lock()
                .unwrap()
                .push((alert_type.to_string(), message.to_string(), target.clone()));
            if self.fail {
                Err(NotifierError::Channels(vec!["smtp down".to_string()]))
            } else {
                Ok(())
            }
        }
    }

    struct TestServer {
        _tmp: NamedTempFile,
        base: String,
        store: Arc<Store>,
        inbox: Arc<Inbox>,
        client: reqwest::Client,
    }

    async fn spawn_server(inbox: Inbox) -> TestServer {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let inbox = Arc::new(inbox);

        let probe = Arc::new(Offline);
        let orchestrator = CheckOrchestrator::new(
            store.clone(),
            Probers {
                http: probe.clone(),
                tls: probe.clone(),
                domain: probe,
            },
            AlertEvaluator::default(),
            inbox.clone(),
        );
        let scheduler = Arc::new(Scheduler::new(orchestrator, Duration::from_secs(3600)));
        let server = Server::new(ServerConfig::default(), store.clone(), scheduler, inbox.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = server.routes();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        TestServer {
            _tmp: tmp,
            base: format!("http://{}", addr),
            store,
            inbox,
            client: reqwest::Client::new(),
        }
    }

    #[tokio::test]
    async fn test_health() {
        let srv = spawn_server(Inbox::default()).await;
        let resp = srv.client.get(format!("{}/health", srv.base)).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_alert_endpoint_accepts_url_or_object_target() {
        let srv = spawn_server(Inbox::default()).await;

        let resp = srv
            .client
            .post(format!("{}/alert", srv.base))
            .json(&json!({"type": "ssl_expiry", "message": "expires soon", "target": "https://x.com"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "Alerts sent!");

        let resp = srv
            .client
            .post(format!("{}/alert", srv.base))
            .json(&json!({
                "type": "http_status",
                "message": "Target https://y.com returned 500 (Internal Server Error).",
                "target": {"id": 4, "url": "https://y.com"}
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let received = srv.inbox.received.lock().unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].0, "ssl_expiry");
        assert_eq!(received[0].2.url, "https://x.com");
        assert_eq!(received[1].2, Target::new(4, "https://y.com"));
    }

    #[tokio::test]
    async fn test_alert_endpoint_reports_channel_failure() {
        let srv = spawn_server(Inbox {
            fail: true,
            ..Default::default()
        })
        .await;

        let resp = srv
            .client
            .post(format!("{}/alert", srv.base))
            .json(&json!({"type": "probe_failure", "message": "down", "target": "https://x.com"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        assert_eq!(resp.text().await.unwrap(), "Failed to send alerts");
    }

    #[tokio::test]
    async fn test_target_lifecycle() {
        let srv = spawn_server(Inbox::default()).await;
        let targets_url = format!("{}/api/targets", srv.base);

        let resp = srv
            .client
            .post(&targets_url)
            .json(&json!({"url": "not a url"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let resp = srv
            .client
            .post(&targets_url)
            .json(&json!({"url": "https://example.com"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let created: Value = resp.json().await.unwrap();
        let id = created["id"].as_i64().unwrap();

        let resp = srv
            .client
            .post(&targets_url)
            .json(&json!({"url": "https://example.com"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 409);

        let listed: Vec<Target> = srv.client.get(&targets_url).send().await.unwrap().json().await.unwrap();
        assert_eq!(listed, vec![Target::new(id, "https://example.com")]);

        let resp = srv
            .client
            .delete(format!("{}/{}", targets_url, id))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);

        let resp = srv
            .client
            .delete(format!("{}/{}", targets_url, id))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_manual_cycle_and_result_queries() {
        let srv = spawn_server(Inbox::default()).await;
        let target = srv.store.add_target("https://down.example").unwrap();

        let report: Value = srv
            .client
            .post(format!("{}/api/cycle", srv.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report, json!({"targets": 1, "checked": 1, "failed": 1, "alerts": 1}));

        let alerts: Value = srv
            .client
            .get(format!("{}/api/alerts?target_id={}", srv.base, target.id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(alerts.as_array().unwrap().len(), 1);
        assert_eq!(alerts[0]["alert_type"], "probe_failure");

        let history: Value = srv
            .client
            .get(format!("{}/api/targets/{}/history", srv.base, target.id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(history, json!([]));

        let resp = srv
            .client
            .get(format!("{}/api/targets/999/checks", srv.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        assert_eq!(srv.store.list_targets().unwrap().len(), 1);
    }
}
