//! Adoption API HTTP client

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use ttl_cache::{cache_key, TtlCache};

use crate::error::{ApiError, Result};

/// Shared response cache. Values are kept as raw JSON so one cache serves
/// every endpoint.
pub type ResponseCache = TtlCache<Value>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("adoption-api/", env!("CARGO_PKG_VERSION"));

// Freshness windows per resource family
pub(crate) const PETS_TTL: Duration = Duration::from_secs(300);
pub(crate) const PET_DETAIL_TTL: Duration = Duration::from_secs(600);
pub(crate) const FAVORITES_TTL: Duration = Duration::from_secs(60);
pub(crate) const INQUIRIES_TTL: Duration = Duration::from_secs(60);
pub(crate) const APPLICATIONS_TTL: Duration = Duration::from_secs(60);
pub(crate) const MESSAGES_TTL: Duration = Duration::from_secs(15);
pub(crate) const NOTIFICATIONS_TTL: Duration = Duration::from_secs(30);

/// Any public pet listing or detail, plus every user's own listings
pub(crate) static PETS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(pets(\?|/|$)|user:[^:]+:pets/mine)").unwrap());

/// Client for the adoption marketplace REST API.
///
/// Protected calls take the caller's access token explicitly; token lifecycle
/// belongs to the session layer. GET requests for resources go through the
/// response cache, and writes invalidate the affected key families.
#[derive(Debug, Clone)]
pub struct AdoptionClient {
    http: reqwest::Client,
    base_url: String,
    cache: ResponseCache,
}

impl AdoptionClient {
    /// Create a client with the default timeout and a private cache
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = url::Url::parse(base_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::Config(format!(
                "unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: ResponseCache::new(),
        })
    }

    /// Use `cache` instead of the client's private one
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let builder = self
            .http
            .request(method, self.url(path))
            .header("Accept", "application/json");
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and turn non-success statuses into typed errors
    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "API request failed to send");
            ApiError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().path().to_string();
        let body = response.bytes().await.unwrap_or_default();
        let err = ApiError::from_response(status.as_u16(), &body);
        debug!(status = status.as_u16(), path = %url, error = %err, "API returned error");
        Err(err)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: Option<&str>,
    ) -> Result<T> {
        let request = self.request(Method::GET, path, token).query(query);
        Ok(self.execute(request).await?.json().await?)
    }

    pub(crate) async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: Option<&str>,
    ) -> Result<T> {
        let mut request = self.request(method, path, token);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(self.execute(request).await?.json().await?)
    }

    /// Like [`send_json`](Self::send_json) but ignores the response body
    pub(crate) async fn send_unit<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: Option<&str>,
    ) -> Result<()> {
        let mut request = self.request(method, path, token);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.execute(request).await?;
        Ok(())
    }

    /// GET through the response cache.
    ///
    /// `scope` namespaces per-user data so two accounts never share entries;
    /// `None` means the resource is public. A cached body that no longer
    /// matches `T` is dropped.
    pub(crate) async fn cached_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: Option<&str>,
        scope: Option<&str>,
        ttl: Duration,
    ) -> Result<T> {
        let key = scoped_key(scope, &cache_key(path, query.iter().map(|(k, v)| (*k, v))));

        let value = self
            .cache
            .with_cache(&key, ttl, || self.get_json::<Value>(path, query, token))
            .await?;

        serde_json::from_value(value).map_err(|e| {
            debug!(key = %key, error = %e, "Dropping cache entry that failed to decode");
            self.cache.delete(&key);
            ApiError::from(e)
        })
    }

    /// Remove cached entries matching `pattern`
    pub(crate) fn invalidate(&self, pattern: &Regex) {
        self.cache.invalidate_pattern(pattern);
    }

    /// Remove one user's entries for a resource family (`favorites`, `inquiries`, ...)
    pub(crate) fn invalidate_scoped(&self, scope: &str, family: &str) {
        let pattern = format!(
            "^user:{}:{}(\\?|/|$)",
            regex::escape(scope),
            regex::escape(family)
        );
        match Regex::new(&pattern) {
            Ok(re) => {
                self.cache.invalidate_pattern(&re);
            }
            Err(e) => warn!(error = %e, "Failed to build invalidation pattern"),
        }
    }
}

/// Stable per-user namespace for a token: its `sub` claim, or a digest of the
/// token when the subject cannot be read.
pub fn cache_scope(token: &str) -> String {
    if let Some(sub) = jwt_claims::decode(token).ok().and_then(|c| c.sub) {
        return sub;
    }
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..8])
}

fn scoped_key(scope: Option<&str>, key: &str) -> String {
    match scope {
        Some(scope) => format!("user:{scope}:{key}"),
        None => key.to_string(),
    }
}

/// Percent-encode a single path segment
pub(crate) fn segment(id: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(id)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) async fn client_for(server: &MockServer) -> AdoptionClient {
        AdoptionClient::new(&server.uri()).unwrap()
    }

    #[test]
    fn test_rejects_bad_base_url() {
        assert!(matches!(
            AdoptionClient::new("not a url"),
            Err(ApiError::Config(_))
        ));
        assert!(matches!(
            AdoptionClient::new("ftp://example.com"),
            Err(ApiError::Config(_))
        ));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = AdoptionClient::new("http://localhost:4000/api/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:4000/api");
        assert_eq!(client.url("/pets"), "http://localhost:4000/api/pets");
    }

    #[test]
    fn test_cache_scope_prefers_subject() {
        // payload: {"sub":"u-7"}
        assert_eq!(cache_scope("eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJ1LTcifQ.sig"), "u-7");

        let scope = cache_scope("not-a-jwt");
        assert_eq!(scope.len(), 16);
        assert_eq!(scope, cache_scope("not-a-jwt"));
        assert_ne!(scope, cache_scope("another-token"));
    }

    #[test]
    fn test_pets_pattern() {
        assert!(PETS_RE.is_match("pets"));
        assert!(PETS_RE.is_match("pets?species=cat"));
        assert!(PETS_RE.is_match("pets/12"));
        assert!(PETS_RE.is_match("user:u1:pets/mine"));
        assert!(!PETS_RE.is_match("petstore"));
        assert!(!PETS_RE.is_match("user:u1:favorites"));
    }

    #[tokio::test]
    async fn test_bearer_header_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/echo"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let value: Value = client.get_json("/echo", &[], Some("tok-1")).await.unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_cached_get_hits_network_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/things"))
            .and(query_param("a", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let query = [("a", "1".to_string())];
        for _ in 0..3 {
            let items: Vec<u32> = client
                .cached_get("things", &query, None, None, Duration::from_secs(60))
                .await
                .unwrap();
            assert_eq!(items, vec![1, 2, 3]);
        }
        assert!(client.cache().has("things?a=1"));
    }

    #[tokio::test]
    async fn test_cached_get_scopes_by_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/favorites"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        for scope in ["u1", "u2"] {
            let _: Vec<Value> = client
                .cached_get("favorites", &[], Some("t"), Some(scope), FAVORITES_TTL)
                .await
                .unwrap();
        }
        assert!(client.cache().has("user:u1:favorites"));
        assert!(client.cache().has("user:u2:favorites"));

        client.invalidate_scoped("u1", "favorites");
        assert!(!client.cache().has("user:u1:favorites"));
        assert!(client.cache().has("user:u2:favorites"));
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "db down" })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        for _ in 0..2 {
            let err = client
                .cached_get::<Value>("flaky", &[], None, None, Duration::from_secs(60))
                .await
                .unwrap_err();
            assert_eq!(
                err,
                ApiError::Status {
                    status: 500,
                    message: "db down".into()
                }
            );
        }
        assert!(client.cache().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_cached_value_is_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shape"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unexpected": 1 })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .cached_get::<Vec<u32>>("shape", &[], None, None, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
        assert!(!client.cache().has("shape"));
    }

    #[tokio::test]
    async fn test_network_error() {
        // Nothing listens on port 9 (discard) in the test environment
        let client = AdoptionClient::with_timeout("http://127.0.0.1:9", Duration::from_secs(2))
            .unwrap();
        let err = client
            .get_json::<Value>("/health", &[], None)
            .await
            .unwrap_err();
        assert!(err.is_network(), "unexpected error: {err:?}");
    }
}
