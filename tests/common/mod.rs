#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;

use fieldops_api::auth::generate_token;
use fieldops_api::database::MemoryStore;
use fieldops_api::rls::{PolicyRegistry, RegistryHandle};
use fieldops_api::server::{app, AppState};

/// Router served in-process on a free port, backed by a fresh in-memory
/// store seeded from the field-service fixtures. Each test gets its own.
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub registry: Arc<RegistryHandle>,
    client: reqwest::Client,
}

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/field_service.json")
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        let registry = Arc::new(RegistryHandle::new(PolicyRegistry::builtin()?));
        let store = Arc::new(MemoryStore::from_fixture_path(fixture_path())?);
        let router = app(AppState::new(registry.clone(), store));

        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test listener")?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let server = Self {
            port,
            base_url: format!("http://127.0.0.1:{}", port),
            registry,
            client: reqwest::Client::new(),
        };
        server.wait_ready(Duration::from_secs(5)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Requests carrying a bearer token for (user id, role)
    pub fn get_as(&self, user: &str, role: &str, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(token(user, role))
    }

    pub fn post_as(&self, user: &str, role: &str, path: &str) -> RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(token(user, role))
    }

    pub fn put_as(&self, user: &str, role: &str, path: &str) -> RequestBuilder {
        self.client.put(self.url(path)).bearer_auth(token(user, role))
    }

    pub fn patch_as(&self, user: &str, role: &str, path: &str) -> RequestBuilder {
        self.client.patch(self.url(path)).bearer_auth(token(user, role))
    }

    pub fn delete_as(&self, user: &str, role: &str, path: &str) -> RequestBuilder {
        self.client.delete(self.url(path)).bearer_auth(token(user, role))
    }
}

pub fn token(user: &str, role: &str) -> String {
    generate_token(user, role).expect("token generation")
}

/// Send and return (status, JSON body)
pub async fn send(req: RequestBuilder) -> Result<(StatusCode, Value)> {
    let res = req.send().await?;
    let status = res.status();
    let body = res.json::<Value>().await.context("response body is not JSON")?;
    Ok((status, body))
}

/// Sorted ids of a list response's data array
pub fn ids(body: &Value) -> Vec<String> {
    let mut ids: Vec<String> = body["data"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|r| r["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    ids.sort();
    ids
}
