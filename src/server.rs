use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::path::PathBuf;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    error::ScanError,
    resolve,
    scanner::ScanController,
    types::{Notice, ScanOptions},
};

#[derive(Clone)]
pub struct AppState {
    controller: ScanController,
    output: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub target: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(flatten)]
    pub options: ScanOptions,
}

fn default_mode() -> String {
    "Stealth".into()
}

/// API routes over a shared controller: start, stop, status and the live result snapshot.
/// Scans requested with `persist_results` save their lines to `output`.
pub fn router(controller: ScanController, output: impl Into<PathBuf>) -> Router {
    let state = AppState {
        controller,
        output: output.into(),
    };
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .route("/stop", post(post_stop))
        .route("/results", get(get_results))
        .with_state(state);

    Router::new().nest("/api", api).layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str, controller: ScanController, output: PathBuf) -> Result<()> {
    let app = router(controller, output);
    info!(%bind, "serving scan API");
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(app.controller.status().await))
}

async fn get_results(State(app): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(app.controller.snapshot().await))
}

async fn post_stop(State(app): State<AppState>) -> impl IntoResponse {
    app.controller.stop();
    (StatusCode::ACCEPTED, Json(app.controller.status().await))
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> impl IntoResponse {
    let run = match app
        .controller
        .begin(&req.target, &req.mode, req.options)
        .await
    {
        Ok(run) => run.with_output(app.output.clone()),
        Err(e @ ScanError::AlreadyRunning) => {
            return (StatusCode::CONFLICT, e.to_string()).into_response()
        }
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let sink = app.controller.sink().clone();
    let target = req.target.clone();
    tokio::spawn(async move {
        match resolve::resolve_host(&target).await {
            Ok(host) => sink.notice(Notice::HostResolved(host)).await,
            Err(e) => {
                warn!(error = %e, "host resolution failed");
                sink.notice(Notice::ResolveFailed).await;
            }
        }
        let summary = run.run().await;
        info!(?summary, "scan finished");
    });

    (StatusCode::ACCEPTED, Json(app.controller.status().await)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{Prober, ResolvedTarget};
    use crate::scanner::ScanPhase;
    use crate::sink::NullObserver;
    use crate::types::{PortState, ProbeResult};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    /// Port 22 open, everything else closed, each probe taking `latency`.
    struct Lab {
        latency: Duration,
    }

    #[async_trait]
    impl Prober for Lab {
        async fn probe(&self, _target: &ResolvedTarget, port: u16, _grab_banner: bool) -> ProbeResult {
            tokio::time::sleep(self.latency).await;
            let state = if port == 22 { PortState::Open } else { PortState::Closed };
            ProbeResult::new(port, state)
        }
    }

    fn controller(latency: Duration) -> ScanController {
        ScanController::with_prober(Arc::new(NullObserver), Arc::new(Lab { latency }))
    }

    fn temp_output(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("port-sweep-api-{}-{name}", std::process::id()))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_empty(uri: &str) -> Request<Body> {
        Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(res: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn wait_idle(c: &ScanController) {
        for _ in 0..500 {
            if c.phase() == ScanPhase::Idle {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("scan did not finish");
    }


    #[test]
    fn scan_request_defaults() {
        let req: ScanRequest = serde_json::from_str(r#"{"target":"10.0.0.1"}"#).unwrap();
        assert_eq!(req.mode, "Stealth");
        assert!(req.options.show_closed);
        assert!(!req.options.grab_banners);
        assert!(!req.options.persist_results);

        let req: ScanRequest = serde_json::from_str(
            r#"{"target":"10.0.0.1","mode":"Script","show_closed":false,"grab_banners":true,"persist_results":true}"#,
        )
        .unwrap();
        assert_eq!(req.mode, "Script");
        assert!(!req.options.show_closed);
        assert!(req.options.grab_banners);
        assert!(req.options.persist_results);
    }

    #[tokio::test]
    async fn unknown_mode_is_bad_request() {
        let c = controller(Duration::ZERO);
        let app = router(c.clone(), temp_output("bad.txt"));
        let res = app
            .oneshot(post_json("/api/scan", r#"{"target":"localhost","mode":"badmode"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(c.phase(), ScanPhase::Idle);
        assert!(c.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn second_scan_conflicts_and_stop_is_idempotent() {
        let c = controller(Duration::from_millis(100));
        let app = router(c.clone(), temp_output("conflict.txt"));
        let body = r#"{"target":"localhost","mode":"Script"}"#;

        let res = app.clone().oneshot(post_json("/api/scan", body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(res).await["phase"], "running");

        let res = app.clone().oneshot(post_json("/api/scan", body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);

        for _ in 0..2 {
            let res = app.clone().oneshot(post_empty("/api/stop")).await.unwrap();
            assert_eq!(res.status(), StatusCode::ACCEPTED);
        }
        wait_idle(&c).await;

        let res = app.clone().oneshot(get("/api/status")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let status = json_body(res).await;
        assert_eq!(status["phase"], "idle");
        assert_eq!(status["last_summary"]["outcome"], "stopped_by_user");
    }

    #[tokio::test]
    async fn results_return_snapshot_and_persist_flag_writes_file() {
        let output = temp_output("saved.txt");
        let _ = std::fs::remove_file(&output);
        let c = controller(Duration::ZERO);
        let app = router(c.clone(), &output);

        let body = r#"{"target":"localhost","mode":"Script","show_closed":false,"persist_results":true}"#;
        let res = app.clone().oneshot(post_json("/api/scan", body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        wait_idle(&c).await;

        let res = app.oneshot(get("/api/results")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let lines = json_body(res).await;
        assert_eq!(lines, serde_json::json!(["Port 22    → OPEN"]));

        assert_eq!(std::fs::read_to_string(&output).unwrap(), "Port 22    → OPEN");
        let _ = std::fs::remove_file(output);
    }
}
