//! HTTP transport abstraction for the ticketing API.
//!
//! The retrying client talks to a [`Transport`] so that tests can script
//! responses without a server.

use futures::future::BoxFuture;
use url::Url;

use crate::error::TransportError;

/// HTTP verbs used by the ticketing API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Patch,
}

impl From<Method> for reqwest::Method {
  fn from(method: Method) -> Self {
    match method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Patch => reqwest::Method::PATCH,
    }
  }
}

/// A request relative to the API base URL
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub method: Method,
  pub path: String,
  pub query: Vec<(String, String)>,
  pub body: Option<serde_json::Value>,
}

impl ApiRequest {
  pub fn get(path: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      path: path.into(),
      query: Vec::new(),
      body: None,
    }
  }

  pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
    Self {
      method: Method::Post,
      body: Some(body),
      ..Self::get(path)
    }
  }

  pub fn patch(path: impl Into<String>, body: serde_json::Value) -> Self {
    Self {
      method: Method::Patch,
      body: Some(body),
      ..Self::get(path)
    }
  }

  /// Append a query parameter if a value is present
  pub fn param(mut self, key: &str, value: Option<impl ToString>) -> Self {
    if let Some(value) = value {
      self.query.push((key.to_string(), value.to_string()));
    }
    self
  }

  /// Look up a query parameter
  pub fn query_value(&self, key: &str) -> Option<&str> {
    self
      .query
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  /// Path plus url-encoded query string
  pub fn path_and_query(&self) -> String {
    if self.query.is_empty() {
      return self.path.clone();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
      .extend_pairs(self.query.iter())
      .finish();
    format!("{}?{}", self.path, query)
  }
}

/// Raw response; status interpretation is left to the client
#[derive(Debug, Clone)]
pub struct ApiResponse {
  pub status: u16,
  pub body: String,
}

impl ApiResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Something that can carry an [`ApiRequest`] to the ticketing API.
pub trait Transport: Send + Sync {
  /// Send one request with the given bearer credential.
  fn send<'a>(
    &'a self,
    request: &'a ApiRequest,
    bearer: &'a str,
  ) -> BoxFuture<'a, Result<ApiResponse, TransportError>>;
}

/// Production transport backed by reqwest
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  pub fn new(base_url: Url) -> Result<Self, TransportError> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("ticket-sync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| TransportError::Connection(e.to_string()))?;
    Ok(Self { client, base_url })
  }

  fn url_for(&self, request: &ApiRequest) -> String {
    format!(
      "{}{}",
      self.base_url.as_str().trim_end_matches('/'),
      request.path_and_query()
    )
  }
}

impl Transport for HttpTransport {
  fn send<'a>(
    &'a self,
    request: &'a ApiRequest,
    bearer: &'a str,
  ) -> BoxFuture<'a, Result<ApiResponse, TransportError>> {
    Box::pin(async move {
      let mut builder = self
        .client
        .request(request.method.into(), self.url_for(request))
        .bearer_auth(bearer)
        .header(reqwest::header::ACCEPT, "application/json");

      if let Some(body) = &request.body {
        builder = builder
          .header(reqwest::header::CONTENT_TYPE, "application/json")
          .body(body.to_string());
      }

      let response = builder
        .send()
        .await
        .map_err(|e| TransportError::Connection(e.to_string()))?;
      let status = response.status().as_u16();
      let body = response
        .text()
        .await
        .map_err(|e| TransportError::Decode(e.to_string()))?;

      Ok(ApiResponse { status, body })
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_path_and_query_encodes_values() {
    let request = ApiRequest::get("/tickets")
      .param("limit", Some(1000))
      .param("search", Some("printer jam & fire"))
      .param("status", None::<&str>);

    assert_eq!(
      request.path_and_query(),
      "/tickets?limit=1000&search=printer+jam+%26+fire"
    );
    assert_eq!(request.query_value("limit"), Some("1000"));
    assert_eq!(request.query_value("status"), None);
  }

  #[test]
  fn test_url_joins_base_path() {
    let transport = HttpTransport::new(Url::parse("https://desk.example.com/api/").unwrap()).unwrap();
    let request = ApiRequest::get("/tickets/stats");
    assert_eq!(
      transport.url_for(&request),
      "https://desk.example.com/api/tickets/stats"
    );
  }

  #[test]
  fn test_success_range() {
    let ok = ApiResponse {
      status: 204,
      body: String::new(),
    };
    let bad = ApiResponse {
      status: 401,
      body: String::new(),
    };
    assert!(ok.is_success());
    assert!(!bad.is_success());
  }
}
