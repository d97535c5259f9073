//! HTTP transport with fixed timeouts and manual cookie forwarding
//!
//! The router session lives in a single cookie string owned by the RCI client,
//! so reqwest's cookie store is not used here.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, COOKIE, SET_COOKIE, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    pub fn new() -> reqwest::Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> reqwest::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("keenetic-vpn/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self { inner: client })
    }

    pub async fn get(&self, url: &str, cookie: &str) -> reqwest::Result<Response> {
        with_cookie(self.inner.get(url), cookie).send().await
    }

    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        cookie: &str,
        body: &T,
    ) -> reqwest::Result<Response> {
        with_cookie(self.inner.post(url), cookie)
            .json(body)
            .send()
            .await
    }
}

fn with_cookie(request: RequestBuilder, cookie: &str) -> RequestBuilder {
    if cookie.is_empty() {
        request
    } else {
        request.header(COOKIE, cookie)
    }
}

/// Collapse every `Set-Cookie` header into one `Cookie` header value.
///
/// Only the `name=value` pair of each cookie is kept; attributes such as
/// `Path` or `HttpOnly` are dropped. Returns `None` when the response set no
/// cookies.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let pairs: Vec<&str> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or("").trim())
        .filter(|pair| !pair.is_empty())
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}
