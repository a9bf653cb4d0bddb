//! Pass-through proxy to the upstream blog API.
//!
//! Any `/api/...` request not served locally is relayed to
//! `<api_base_url>/...` with the same method, query string and an
//! allow-listed subset of headers.

use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use log::{debug, error, info};
use serde_json::json;

use crate::{BlogError, Config, Result};

/// Path prefix claimed by the proxy.
pub const PROXY_PREFIX: &str = "/api";

/// Request headers copied to the upstream request.
pub const FORWARDED_REQUEST_HEADERS: &[&str] = &[
    "content-type",
    "authorization",
    "cookie",
    "user-agent",
    "accept",
    "accept-language",
];

/// Upstream response headers copied back to the caller.
pub const RELAYED_RESPONSE_HEADERS: &[&str] = &["content-type", "cache-control", "set-cookie"];

/// Relays requests to the upstream API over one pooled HTTP client.
#[derive(Clone)]
pub struct ApiProxy {
    client: reqwest::Client,
    base_url: String,
}

impl ApiProxy {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BlogError::ConfigError {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.api_base_url.clone(), config.proxy_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins the base URL, the suffix after [`PROXY_PREFIX`] and the raw query.
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> String {
        let mut url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    /// Forwards one request and converts the upstream reply, or any failure
    /// to obtain it, into a response for the caller.
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Response {
        let url = self.upstream_url(path, query);
        info!("Proxying {} {}", method, url);

        match self.try_forward(&method, &url, headers, body).await {
            Ok(response) => response,
            Err(e) => {
                error!("Proxy request to {} failed: {}", url, e);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({
                        "error": "API proxy error",
                        "message": e.to_string(),
                        "backend_url": self.base_url,
                    })),
                )
                    .into_response()
            }
        }
    }

    async fn try_forward(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> reqwest::Result<Response> {
        let mut request = self.client.request(upstream_method(method), url);

        for name in FORWARDED_REQUEST_HEADERS {
            for value in headers.get_all(*name) {
                request = request.header(*name, value.as_bytes());
            }
        }

        let carries_body = matches!(
            *method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        );
        if carries_body && !body.is_empty() {
            request = request.body(body);
        }

        let upstream = request.send().await?;
        let status = StatusCode::from_u16(upstream.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        debug!("Upstream answered {} for {}", status, url);

        let mut relayed = HeaderMap::new();
        for name in RELAYED_RESPONSE_HEADERS {
            for value in upstream.headers().get_all(*name) {
                if let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) {
                    relayed.append(HeaderName::from_static(*name), value);
                }
            }
        }

        let bytes = upstream.bytes().await?;
        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = relayed;
        Ok(response)
    }
}

/// Re-expresses an axum method for reqwest, which sits on an older `http`.
///
/// Both accept exactly the RFC 9110 token characters, so any method axum
/// parsed also parses here; the `GET` arm is never taken.
fn upstream_method(method: &Method) -> reqwest::Method {
    reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::Uri, routing::any, Router};
    use tokio::net::TcpListener;

    async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
        let seen: Vec<String> = headers.keys().map(|k| k.to_string()).collect();
        let payload = json!({
            "method": method.as_str(),
            "uri": uri.to_string(),
            "headers": seen,
            "body": String::from_utf8_lossy(&body),
        });
        let mut response = (StatusCode::IM_A_TEAPOT, Json(payload)).into_response();
        let h = response.headers_mut();
        h.append("set-cookie", HeaderValue::from_static("a=1"));
        h.append("set-cookie", HeaderValue::from_static("b=2"));
        h.insert("x-internal", HeaderValue::from_static("secret"));
        response
    }

    async fn spawn_upstream() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/api/*rest", any(echo));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api", addr)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn builds_upstream_urls() {
        let proxy = ApiProxy::new("http://backend/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            proxy.upstream_url("/posts/1", Some("x=1&y=2")),
            "http://backend/api/posts/1?x=1&y=2"
        );
        assert_eq!(proxy.upstream_url("/posts", Some("")), "http://backend/api/posts");
        assert_eq!(proxy.upstream_url("posts", None), "http://backend/api/posts");
    }

    #[test]
    fn methods_carry_over_including_extensions() {
        for raw in ["GET", "POST", "PATCH", "OPTIONS", "PURGE", "PROPFIND"] {
            let method = Method::from_bytes(raw.as_bytes()).unwrap();
            assert_eq!(upstream_method(&method).as_str(), raw);
        }
    }

    #[tokio::test]
    async fn relays_method_query_body_and_allowed_headers() {
        let proxy = ApiProxy::new(spawn_upstream().await, Duration::from_secs(5)).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        headers.insert("authorization", HeaderValue::from_static("Bearer t"));
        headers.insert("x-forwarded-secret", HeaderValue::from_static("nope"));

        let response = proxy
            .forward(
                Method::POST,
                "/posts",
                Some("draft=true"),
                &headers,
                Bytes::from_static(b"hello"),
            )
            .await;

        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        let cookies: Vec<_> = response.headers().get_all("set-cookie").iter().collect();
        assert_eq!(cookies.len(), 2);
        assert!(response.headers().get("x-internal").is_none());

        let body = json_body(response).await;
        assert_eq!(body["method"], "POST");
        assert_eq!(body["uri"], "/api/posts?draft=true");
        assert_eq!(body["body"], "hello");
        let seen = body["headers"].as_array().unwrap();
        assert!(seen.iter().any(|h| h == "authorization"));
        assert!(!seen.iter().any(|h| h == "x-forwarded-secret"));
    }

    #[tokio::test]
    async fn get_requests_do_not_send_a_body() {
        let proxy = ApiProxy::new(spawn_upstream().await, Duration::from_secs(5)).unwrap();
        let response = proxy
            .forward(
                Method::GET,
                "/posts",
                None,
                &HeaderMap::new(),
                Bytes::from_static(b"ignored"),
            )
            .await;
        let body = json_body(response).await;
        assert_eq!(body["method"], "GET");
        assert_eq!(body["body"], "");
    }

    #[tokio::test]
    async fn unreachable_upstream_yields_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = format!("http://{}/api", addr);
        let proxy = ApiProxy::new(base.clone(), Duration::from_secs(5)).unwrap();
        let response = proxy
            .forward(Method::GET, "/posts", None, &HeaderMap::new(), Bytes::new())
            .await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["error"], "API proxy error");
        assert_eq!(body["backend_url"], base);
        assert!(!body["message"].as_str().unwrap().is_empty());
    }
}
