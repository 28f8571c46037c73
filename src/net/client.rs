use crate::config::Config;
use crate::error::{OfflineError, Result};
use crate::net::types::{Connectivity, Method, Request, Response};
use color_eyre::eyre::eyre;
use reqwest::header::CONTENT_TYPE;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Boundary to the CRUD backend.
///
/// `send` resolves to `Ok` for every HTTP response, whatever its status.
/// Only transport problems (unreachable, aborted, timed out) are errors.
pub trait Transport: Send + Sync + 'static {
  fn send(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;

  /// Ask the environment whether the backend is currently reachable.
  fn probe(&self) -> impl Future<Output = Connectivity> + Send;
}

/// HTTP transport backed by reqwest
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
  csrf_token: Option<String>,
  probe_path: String,
}

impl HttpTransport {
  pub fn new(config: &Config) -> color_eyre::Result<Self> {
    let base_url = Url::parse(&config.server.url)
      .map_err(|e| eyre!("Invalid server url {}: {}", config.server.url, e))?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.server.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self::with_client(
      client,
      base_url,
      Config::get_csrf_token(),
      config.server.probe_path.clone(),
    ))
  }

  pub fn with_client(
    client: reqwest::Client,
    base_url: Url,
    csrf_token: Option<String>,
    probe_path: String,
  ) -> Self {
    Self {
      client,
      base_url,
      csrf_token,
      probe_path,
    }
  }

  fn url_for(&self, target: &str) -> Result<Url> {
    self
      .base_url
      .join(target)
      .map_err(|e| OfflineError::InvalidRequest(format!("Bad target {}: {}", target, e)))
  }
}

fn to_reqwest(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Patch => reqwest::Method::PATCH,
    Method::Delete => reqwest::Method::DELETE,
  }
}

impl Transport for HttpTransport {
  async fn send(&self, request: &Request) -> Result<Response> {
    let url = self.url_for(&request.target)?;
    let mut builder = self.client.request(to_reqwest(request.method), url);

    if let Some(token) = &self.csrf_token {
      builder = builder.header("X-CSRFToken", token);
    }
    if request.method.is_write() {
      if let Some(payload) = &request.payload {
        builder = builder.json(payload);
      }
    }

    let response = builder
      .send()
      .await
      .map_err(|e| OfflineError::transport(&request.target, e))?;

    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let body = response
      .bytes()
      .await
      .map_err(|e| OfflineError::transport(&request.target, e))?;

    debug!(method = %request.method, target = %request.target, status, "backend responded");
    Ok(Response::new(status, content_type, body.to_vec()))
  }

  async fn probe(&self) -> Connectivity {
    let url = match self.url_for(&self.probe_path) {
      Ok(url) => url,
      Err(_) => return Connectivity::Offline,
    };

    // Any HTTP answer, even an error page, means the backend is reachable.
    match self.client.get(url).send().await {
      Ok(_) => Connectivity::Online,
      Err(e) => {
        debug!("Probe failed: {}", e);
        Connectivity::Offline
      }
    }
  }
}
