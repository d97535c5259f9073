//! Session-authenticated RCI client
//!
//! Keenetic routers guard the RCI behind a cookie session obtained through a
//! two-step challenge-response exchange on `/auth`:
//!
//! 1. `GET /auth` answers with a session cookie plus realm and challenge headers
//! 2. `POST /auth` with `{login, password: digest}` promotes that cookie
//!
//! The client caches the cookie, runs at most one handshake at a time and
//! replays a request once when the router reports the session as expired.

use super::auth::{compute_auth_hash, CHALLENGE_HEADER, REALM_HEADER};
use super::Rci;
use crate::error::{AuthError, RciError, Result};
use crate::http::{session_cookie, HttpClient};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
#[cfg(test)]
use std::time::Duration;

const AUTH_PATH: &str = "/auth";

type Handshake = Shared<BoxFuture<'static, std::result::Result<(), AuthError>>>;

#[derive(Default)]
struct HandshakeSlot {
    issued: u64,
    current: Option<(u64, Handshake)>,
}

struct Session {
    base_url: String,
    login: String,
    password: String,
    http: HttpClient,
    /// `Cookie` header value; empty while unauthenticated
    cookie: RwLock<String>,
    handshake: Mutex<HandshakeSlot>,
}

/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct RciClient {
    session: Arc<Session>,
}

impl RciClient {
    pub fn new(
        base_url: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let http = HttpClient::new().map_err(RciError::Client)?;
        Ok(Self::with_http(base_url.into(), login.into(), password.into(), http))
    }

    #[cfg(test)]
    fn with_timeout(base_url: &str, login: &str, password: &str, timeout: Duration) -> Self {
        let http = HttpClient::with_timeout(timeout).unwrap();
        Self::with_http(base_url.into(), login.into(), password.into(), http)
    }

    fn with_http(base_url: String, login: String, password: String, http: HttpClient) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();

        Self {
            session: Arc::new(Session {
                base_url,
                login,
                password,
                http,
                cookie: RwLock::new(String::new()),
                handshake: Mutex::new(HandshakeSlot::default()),
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.session.base_url
    }

    /// Wait for a handshake, joining the one in flight if there is one.
    ///
    /// The handshake runs on its own task, so it completes and frees the slot
    /// even when every waiting caller is dropped.
    async fn ensure_auth(&self) -> Result<()> {
        let handshake = {
            let mut slot = self.session.handshake.lock();
            let in_flight = slot.current.as_ref().map(|(_, handshake)| handshake.clone());
            match in_flight {
                Some(joined) => {
                    tracing::debug!("Joining in-flight authentication");
                    joined
                }
                None => {
                    slot.issued += 1;
                    let id = slot.issued;
                    let session = Arc::clone(&self.session);
                    let task = tokio::spawn(async move {
                        let outcome = session.authenticate().await;
                        session.release_handshake(id);
                        outcome
                    });
                    let handshake = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(AuthError::Transport(format!("handshake task failed: {e}")))
                        })
                    }
                    .boxed()
                    .shared();
                    slot.current = Some((id, handshake.clone()));
                    handshake
                }
            }
        };

        handshake.await.map_err(RciError::from)
    }

    async fn request(&self, path: &str, body: Option<&Value>) -> Result<Value> {
        let unauthenticated = self.session.cookie.read().is_empty();
        if unauthenticated {
            self.ensure_auth().await?;
        }

        let mut response = self.send(path, body).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!("Session expired on {}, re-authenticating", path);
            self.ensure_auth().await?;
            response = self.send(path, body).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RciError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| RciError::transport(path, e))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|source| RciError::Decode {
            path: path.to_string(),
            source,
        })
    }

    async fn send(&self, path: &str, body: Option<&Value>) -> Result<Response> {
        let url = format!("{}{}", self.session.base_url, path);
        let cookie = self.session.cookie.read().clone();

        let sent = match body {
            Some(body) => self.session.http.post_json(&url, &cookie, body).await,
            None => self.session.http.get(&url, &cookie).await,
        };

        sent.map_err(|e| RciError::transport(path, e))
    }
}

impl Session {
    fn release_handshake(&self, id: u64) {
        let mut slot = self.handshake.lock();
        if matches!(&slot.current, Some((current, _)) if *current == id) {
            slot.current = None;
        }
    }

    /// Run one handshake and publish its result to the shared cookie.
    async fn authenticate(&self) -> std::result::Result<(), AuthError> {
        match self.handshake().await {
            Ok(cookie) => {
                *self.cookie.write() = cookie;
                tracing::info!("Authenticated with router at {}", self.base_url);
                Ok(())
            }
            Err(e) => {
                self.cookie.write().clear();
                tracing::warn!("Router authentication failed: {}", e);
                Err(e)
            }
        }
    }

    async fn handshake(&self) -> std::result::Result<String, AuthError> {
        let url = format!("{}{}", self.base_url, AUTH_PATH);
        let mut cookie = self.cookie.read().clone();

        tracing::debug!("Requesting auth challenge");
        let challenge_response = self
            .http
            .get(&url, &cookie)
            .await
            .map_err(AuthError::transport)?;

        if let Some(fresh) = session_cookie(challenge_response.headers()) {
            cookie = fresh;
        }

        let realm = header_text(challenge_response.headers(), REALM_HEADER);
        let challenge = header_text(challenge_response.headers(), CHALLENGE_HEADER);
        if realm.is_empty() || challenge.is_empty() {
            return Err(AuthError::MissingChallenge);
        }

        let digest = compute_auth_hash(&challenge, &self.login, &realm, &self.password);
        let body = json!({ "login": self.login, "password": digest });

        tracing::debug!("Submitting auth response for '{}'", self.login);
        let auth_response = self
            .http
            .post_json(&url, &cookie, &body)
            .await
            .map_err(AuthError::transport)?;

        if let Some(fresh) = session_cookie(auth_response.headers()) {
            cookie = fresh;
        }

        let status = auth_response.status();
        if status != StatusCode::OK {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
            });
        }

        Ok(cookie)
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl Rci for RciClient {
    async fn get(&self, path: &str) -> Result<Value> {
        self.request(path, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(path, Some(body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LOGIN: &str = "admin";
    const PASSWORD: &str = "hunter2";
    const REALM: &str = "Keenetic Giga";
    const CHALLENGE: &str = "ZXCVBNM";

    fn challenge_template() -> ResponseTemplate {
        ResponseTemplate::new(401)
            .insert_header(REALM_HEADER, REALM)
            .insert_header(CHALLENGE_HEADER, CHALLENGE)
            .insert_header("set-cookie", "session=challenge; Path=/")
    }

    /// Mount a router that accepts the test credentials.
    async fn mount_auth(server: &MockServer, expected_logins: u64) {
        Mock::given(method("GET"))
            .and(path("/auth"))
            .respond_with(challenge_template())
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/auth"))
            .and(header("cookie", "session=challenge"))
            .and(body_json(json!({
                "login": LOGIN,
                "password": compute_auth_hash(CHALLENGE, LOGIN, REALM, PASSWORD),
            })))
            .respond_with(
                ResponseTemplate::new(200).insert_header("set-cookie", "session=granted; Path=/"),
            )
            .expect(expected_logins)
            .mount(server)
            .await;
    }

    fn client(server: &MockServer) -> RciClient {
        RciClient::new(server.uri(), LOGIN, PASSWORD).unwrap()
    }

    #[tokio::test]
    async fn test_first_request_authenticates() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/rci/show/version"))
            .and(header("cookie", "session=granted"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"release": "4.1"})))
            .expect(2)
            .mount(&server)
            .await;

        let rci = client(&server);
        let first = rci.get("/rci/show/version").await.unwrap();
        let second = rci.get("/rci/show/version").await.unwrap();

        assert_eq!(first["release"], "4.1");
        assert_eq!(first, second);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_handshake() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth"))
            .respond_with(challenge_template().set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("set-cookie", "session=granted"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rci/ip/hotspot"))
            .and(header("cookie", "session=granted"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(5)
            .mount(&server)
            .await;

        let rci = client(&server);
        let results = join_all((0..5).map(|_| rci.get("/rci/ip/hotspot"))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_expired_session_retries_once() {
        let server = MockServer::start().await;
        mount_auth(&server, 2).await;

        Mock::given(method("GET"))
            .and(path("/rci/show/version"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rci/show/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"release": "4.1"})))
            .expect(1)
            .mount(&server)
            .await;

        let value = client(&server).get("/rci/show/version").await.unwrap();

        assert_eq!(value["release"], "4.1");
        server.verify().await;
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_terminal() {
        let server = MockServer::start().await;
        mount_auth(&server, 2).await;

        Mock::given(method("GET"))
            .and(path("/rci/show/version"))
            .respond_with(ResponseTemplate::new(401).set_body_string("denied"))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(&server)
            .get("/rci/show/version")
            .await
            .unwrap_err();

        assert!(matches!(err, RciError::Status { status: 401, .. }));
        assert!(err.to_string().contains("denied"));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_missing_challenge_fails_without_login() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(401).insert_header(REALM_HEADER, REALM))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server).get("/rci/ip/hotspot").await.unwrap_err();

        assert!(matches!(err, RciError::Auth(AuthError::MissingChallenge)));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_rejected_credentials_report_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth"))
            .respond_with(challenge_template())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rci/ip/hotspot"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let rci = client(&server);
        let err = rci.get("/rci/ip/hotspot").await.unwrap_err();

        assert!(matches!(
            err,
            RciError::Auth(AuthError::Rejected { status: 401 })
        ));
        assert!(rci.session.cookie.read().is_empty());
        server.verify().await;
    }

    #[tokio::test]
    async fn test_upstream_error_carries_status_and_body() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;

        Mock::given(method("POST"))
            .and(path("/rci/"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"system": {"configuration": {"save": {}}}})))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server)
            .post("/rci/", &json!({"system": {"configuration": {"save": {}}}}))
            .await
            .unwrap_err();

        match err {
            RciError::Status { path, status, body } => {
                assert_eq!(path, "/rci/");
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;

        Mock::given(method("POST"))
            .and(path("/rci/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let value = client(&server).post("/rci/", &json!({})).await.unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_slow_response_times_out_without_retry() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/rci/show/ip/hotspot"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_secs(2)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let rci = RciClient::with_timeout(
            &server.uri(),
            LOGIN,
            PASSWORD,
            Duration::from_millis(300),
        );
        let err = rci.get("/rci/show/ip/hotspot").await.unwrap_err();

        match err {
            RciError::Timeout { path } => assert_eq!(path, "/rci/show/ip/hotspot"),
            other => panic!("unexpected error: {other}"),
        }
        server.verify().await;
    }

    #[tokio::test]
    async fn test_abandoned_handshake_still_completes() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth"))
            .respond_with(challenge_template().set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("set-cookie", "session=granted"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rci/show/version"))
            .and(header("cookie", "session=granted"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let rci = client(&server);
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), rci.get("/rci/show/version")).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rci.session.handshake.lock().current.is_none());
        assert_eq!(*rci.session.cookie.read(), "session=granted");

        rci.get("/rci/show/version").await.unwrap();
        server.verify().await;
    }

    #[tokio::test]
    async fn test_unreachable_router_is_auth_transport_error() {
        let rci = RciClient::new("http://127.0.0.1:9", LOGIN, PASSWORD).unwrap();
        let err = rci.get("/rci/show/version").await.unwrap_err();

        assert!(matches!(
            err,
            RciError::Auth(AuthError::Transport(_) | AuthError::Timeout)
        ));
    }
}
