use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as _;
use tokio::{
    net::TcpListener,
    sync::{Mutex, oneshot},
    task::JoinHandle,
};

use statehub::{audit::AuditLog, config::Config, http::build_router, state::StateStore};

struct ServerHandle {
    base_url: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<anyhow::Result<()>>,
}

impl ServerHandle {
    async fn shutdown(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.join
            .await
            .context("join server task")?
            .context("server exited with error")?;
        Ok(())
    }
}

async fn spawn_server(config: Config) -> anyhow::Result<ServerHandle> {
    let audit = AuditLog::open(&config.db_path).context("open audit log")?;
    let state = Arc::new(Mutex::new(StateStore::new()));
    let router = build_router(config, state, audit);

    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .context("bind listener")?;
    let addr = listener.local_addr().context("local_addr")?;
    let base_url = format!("http://{addr}");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let join = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .map_err(|e| anyhow::anyhow!("axum serve: {e}"))?;
        Ok(())
    });

    Ok(ServerHandle {
        base_url,
        shutdown_tx: Some(shutdown_tx),
        join,
    })
}

fn test_config(db_path: std::path::PathBuf, api_key: &str) -> Config {
    Config {
        bind: SocketAddr::from(([127, 0, 0, 1], 0)),
        db_path,
        api_key: api_key.to_string(),
    }
}

#[tokio::test]
async fn status_update_logs_roundtrip_over_tcp() -> anyhow::Result<()> {
    let tmp = tempfile::TempDir::new()?;
    let server = spawn_server(test_config(tmp.path().join("logs.db"), "sekrit")).await?;
    let client = reqwest::Client::new();

    let status: serde_json::Value = client
        .get(format!("{}/status", server.base_url))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(status["state"]["counter"], 0);
    assert_eq!(status["state"]["message"], "initial");

    let denied = client
        .post(format!("{}/update", server.base_url))
        .json(&serde_json::json!({"counter": 5}))
        .send()
        .await?;
    assert_eq!(denied.status(), reqwest::StatusCode::UNAUTHORIZED);

    let updated: serde_json::Value = client
        .post(format!("{}/update", server.base_url))
        .header("x-api-key", "sekrit")
        .json(&serde_json::json!({"counter": 5, "message": "smoke"}))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(updated["state"]["counter"], 5);
    assert_eq!(updated["state"]["message"], "smoke");

    let logs: serde_json::Value = client
        .get(format!("{}/logs?page=1&limit=10", server.base_url))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(logs["total"], 1);
    assert_eq!(logs["logs"][0]["old_value"]["counter"], 0);
    assert_eq!(logs["logs"][0]["new_value"]["counter"], 5);

    server.shutdown().await
}

#[tokio::test]
async fn audit_log_survives_server_restart() -> anyhow::Result<()> {
    let tmp = tempfile::TempDir::new()?;
    let db_path = tmp.path().join("logs.db");
    let client = reqwest::Client::new();

    let server = spawn_server(test_config(db_path.clone(), "")).await?;
    client
        .post(format!("{}/update", server.base_url))
        .json(&serde_json::json!({"message": "before restart"}))
        .send()
        .await?
        .error_for_status()?;
    server.shutdown().await?;

    let server = spawn_server(test_config(db_path, "")).await?;

    // In-memory state resets to defaults; the audit trail does not.
    let status: serde_json::Value = client
        .get(format!("{}/status", server.base_url))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(status["state"]["message"], "initial");

    let logs: serde_json::Value = client
        .get(format!("{}/logs", server.base_url))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(logs["total"], 1);
    assert_eq!(logs["logs"][0]["new_value"]["message"], "before restart");

    server.shutdown().await
}
