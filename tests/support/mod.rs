//! Shared harness: boots a real server on 127.0.0.1:0 with in-memory stores.
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::net::TcpListener;

use kanbanflow::config::ServerConfig;
use kanbanflow::identity::{Clock, Identity, IdentityStore, MemoryIdentityStore, SystemClock};
use kanbanflow::server::{self, AppState};
use kanbanflow::tickets::MemoryTicketStore;

pub const ORIGIN: &str = "http://localhost:3000";
pub const PASSWORD: &str = "Passw0rd!";

pub struct TestServer {
    pub base: String,
    pub addr: std::net::SocketAddr,
    pub state: AppState,
    pub identities: Arc<MemoryIdentityStore>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String { format!("{}{}", self.base, path) }

    pub fn ws_url(&self) -> String { format!("ws://{}/ws", self.addr) }

    /// Insert a live identity with `PASSWORD` directly into the store.
    pub fn seed_user(&self, email: &str) -> Result<Identity> {
        let hash = kanbanflow::security::hash_password(PASSWORD)?;
        Ok(self.identities.insert(Identity::new("Test", "User", email, hash, Utc::now()))?)
    }
}

/// Test defaults: roomy rate limit, cookies without `Secure` so plain http works.
pub fn test_config() -> ServerConfig {
    let mut cfg = ServerConfig::with_secret("integration-root-secret");
    cfg.bind_addr = "127.0.0.1".into();
    cfg.http_port = 0;
    cfg.allowed_origin = ORIGIN.into();
    cfg.rate_limit.burst = 10_000;
    cfg.secure_cookies = false;
    cfg
}

pub async fn start() -> Result<TestServer> {
    start_with(test_config(), Arc::new(SystemClock)).await
}

pub async fn start_with(config: ServerConfig, clock: Arc<dyn Clock>) -> Result<TestServer> {
    let identities = Arc::new(MemoryIdentityStore::new());
    let state = AppState::new(config, identities.clone(), Arc::new(MemoryTicketStore::new()), clock)?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let serving = state.clone();
    tokio::spawn(async move {
        if let Err(e) = server::serve(listener, serving).await {
            eprintln!("test server stopped: {e}");
        }
    });
    Ok(TestServer { base: format!("http://{addr}"), addr, state, identities })
}

pub struct Pair {
    pub access: String,
    pub refresh: String,
}

pub async fn login(client: &reqwest::Client, srv: &TestServer, email: &str) -> Result<Pair> {
    let resp = client
        .post(srv.url("/iam/v1/login"))
        .json(&serde_json::json!({"email": email, "password": PASSWORD}))
        .send()
        .await?;
    anyhow::ensure!(resp.status() == 200, "login failed: {}", resp.status());
    let body: serde_json::Value = resp.json().await?;
    Ok(Pair {
        access: body["access_token"].as_str().unwrap_or_default().to_string(),
        refresh: body["refresh_token"].as_str().unwrap_or_default().to_string(),
    })
}
