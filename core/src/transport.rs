//! Executes `HttpRequest` values against the network.
//!
//! The builder/parser in `client` never does I/O; a `Transport` sits between
//! them. Hosts with their own networking stack implement the trait; everyone
//! else uses `UreqTransport`.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one round-trip. Non-success statuses are returned as data,
    /// not as `Err`; only failures to complete the exchange are errors.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, StoreError>;
}

/// Blocking `ureq` agent driven from tokio's blocking pool.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        // Status interpretation belongs to `TodoClient::parse_*`.
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, StoreError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || execute_blocking(&agent, request))
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?
    }
}

fn execute_blocking(agent: &ureq::Agent, req: HttpRequest) -> Result<HttpResponse, StoreError> {
    tracing::trace!(method = req.method.as_str(), url = %req.url, "executing request");

    let result = match req.method {
        HttpMethod::Get => {
            let mut builder = agent.get(&req.url);
            for (k, v) in &req.headers {
                builder = builder.header(k.as_str(), v.as_str());
            }
            builder.call()
        }
        HttpMethod::Delete => {
            let mut builder = agent.delete(&req.url);
            for (k, v) in &req.headers {
                builder = builder.header(k.as_str(), v.as_str());
            }
            builder.call()
        }
        HttpMethod::Post | HttpMethod::Patch => {
            let mut builder = if req.method == HttpMethod::Post {
                agent.post(&req.url)
            } else {
                agent.patch(&req.url)
            };
            for (k, v) in &req.headers {
                builder = builder.header(k.as_str(), v.as_str());
            }
            match req.body {
                Some(body) => builder.send(body.as_bytes()),
                None => builder.send_empty(),
            }
        }
    };

    let mut response = result.map_err(|e| StoreError::Transport(e.to_string()))?;
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| StoreError::Transport(e.to_string()))?;

    Ok(HttpResponse::new(status, body))
}
