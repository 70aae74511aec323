//! OCI distribution API client
//!
//! Implements [`RegistryClient`] over the registry HTTP API v2: catalog and tag
//! listing with `Link` pagination, manifest fetch and blob streaming.
//!
//! Credentials are only forwarded, never negotiated: requests carry HTTP Basic
//! auth when credentials are configured, and a `WWW-Authenticate: Bearer`
//! challenge is answered by asking the advertised realm for a token with the
//! same credentials.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use oci_distribution::manifest::{IMAGE_MANIFEST_MEDIA_TYPE, OCI_IMAGE_MEDIA_TYPE, OciImageManifest};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, LINK, LOCATION, WWW_AUTHENTICATE};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use url::Url;

use crate::credentials::Credentials;
use crate::error::{RepoError, Result};
use crate::registry::{ArtifactManifest, BlobStream, LayerDescriptor, RegistryClient};

/// Page size requested from catalog and tag listings
const PAGE_SIZE: usize = 100;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Registry client speaking the distribution API over HTTP(S)
pub struct HttpRegistry {
    /// Base URL, always ending with `/`
    base: Url,
    client: reqwest::Client,
    /// Same transport without redirect following, used by `ping`
    probe_client: reqwest::Client,
    credentials: Option<Credentials>,
    /// Bearer tokens by scope
    tokens: Mutex<HashMap<String, String>>,
}

impl HttpRegistry {
    /// Create a client for `url`, which must carry its scheme prefix
    pub fn new(
        url: &str,
        credentials: Option<Credentials>,
        insecure_skip_tls: bool,
    ) -> Result<Self> {
        let base = Url::parse(&format!("{}/", url.trim_end_matches('/'))).map_err(|e| {
            RepoError::InvalidRegistryUrl {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let client = build_client(insecure_skip_tls, reqwest::redirect::Policy::default())?;
        let probe_client = build_client(insecure_skip_tls, reqwest::redirect::Policy::none())?;

        Ok(Self {
            base,
            client,
            probe_client,
            credentials,
            tokens: Mutex::new(HashMap::new()),
        })
    }

    /// Registry base URL without the trailing slash
    pub fn url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// Check that the endpoint speaks the distribution API.
    ///
    /// An authentication challenge counts as reachable. A redirect does not,
    /// since credentials do not survive a cross-origin redirect.
    pub async fn ping(&self) -> Result<()> {
        let url = self.endpoint("v2/")?;
        let mut request = self.probe_client.get(url.clone());
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            Ok(())
        } else if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            Err(RepoError::HttpError {
                status: status.as_u16(),
                message: format!("{} redirects to '{}'", url, location),
            })
        } else {
            Err(RepoError::HttpError {
                status: status.as_u16(),
                message: format!("Ping to {} failed", url),
            })
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        join_url(&self.base, path)
    }

    fn request(&self, url: &Url, accept: Option<&str>, token: Option<&str>) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url.clone());
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        match (token, &self.credentials) {
            (Some(token), _) => request.bearer_auth(token),
            (None, Some(creds)) => request.basic_auth(&creds.username, Some(&creds.password)),
            (None, None) => request,
        }
    }

    fn cached_token(&self, scope: &str) -> Option<String> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scope)
            .cloned()
    }

    /// Send a GET, answering one bearer challenge if the registry asks for it
    async fn send(&self, url: &Url, scope: &str, accept: Option<&str>) -> Result<reqwest::Response> {
        let token = self.cached_token(scope);
        let response = self.request(url, accept, token.as_deref()).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(BearerChallenge::parse);
        let Some(challenge) = challenge else {
            return Ok(response);
        };

        let token = self.fetch_token(&challenge, scope).await?;
        Ok(self.request(url, accept, Some(&token)).send().await?)
    }

    async fn fetch_token(&self, challenge: &BearerChallenge, scope: &str) -> Result<String> {
        let mut url = Url::parse(&challenge.realm).map_err(|e| RepoError::TokenExchange {
            message: format!("invalid realm '{}': {}", challenge.realm, e),
        })?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &challenge.service {
                query.append_pair("service", service);
            }
            let requested = challenge.scope.as_deref().unwrap_or(scope);
            if !requested.is_empty() {
                query.append_pair("scope", requested);
            }
        }

        tracing::debug!(realm = %challenge.realm, scope, "Requesting registry token");

        let mut request = self.client.get(url);
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RepoError::Unauthorized {
                url: challenge.realm.clone(),
            });
        }
        if !status.is_success() {
            return Err(RepoError::TokenExchange {
                message: format!("{} returned {}", challenge.realm, status),
            });
        }

        let body: TokenResponse = response.json().await?;
        let token = body
            .token
            .or(body.access_token)
            .ok_or_else(|| RepoError::TokenExchange {
                message: "no token in auth response".to_string(),
            })?;

        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scope.to_string(), token.clone());
        Ok(token)
    }

    /// Follow `Link: <...>; rel="next"` pages, collecting a string array field
    async fn list_paginated(
        &self,
        path: &str,
        scope: &str,
        field: &str,
        subject: &str,
    ) -> Result<Vec<String>> {
        let mut items = Vec::new();
        let mut next = Some(self.endpoint(&format!("{}?n={}", path, PAGE_SIZE))?);

        while let Some(url) = next.take() {
            let response = self.send(&url, scope, None).await?;
            if !response.status().is_success() {
                return Err(error_for_response(response, subject).await);
            }

            if let Some(link) = next_link(response.headers()) {
                next = Some(join_url(&url, &link)?);
            }

            let body: serde_json::Value = response.json().await?;
            let page = body
                .get(field)
                .and_then(|v| v.as_array())
                .into_iter()
                .flatten()
                .filter_map(|v| v.as_str().map(String::from));
            items.extend(page);
        }

        Ok(items)
    }
}

#[async_trait]
impl RegistryClient for HttpRegistry {
    async fn list_repositories(&self) -> Result<Vec<String>> {
        self.list_paginated("v2/_catalog", "registry:catalog:*", "repositories", "catalog")
            .await
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        self.list_paginated(
            &format!("v2/{}/tags/list", repository),
            &pull_scope(repository),
            "tags",
            repository,
        )
        .await
    }

    async fn get_manifest(&self, repository: &str, tag: &str) -> Result<ArtifactManifest> {
        let reference = format!("{}:{}", repository, tag);
        let url = self.endpoint(&format!("v2/{}/manifests/{}", repository, tag))?;
        let accept = format!("{}, {}", OCI_IMAGE_MEDIA_TYPE, IMAGE_MANIFEST_MEDIA_TYPE);

        let response = self
            .send(&url, &pull_scope(repository), Some(&accept))
            .await?;
        if !response.status().is_success() {
            return Err(error_for_response(response, &reference).await);
        }

        let body = response.bytes().await?;
        let manifest: OciImageManifest =
            serde_json::from_slice(&body).map_err(|e| RepoError::InvalidManifest {
                reference,
                message: e.to_string(),
            })?;

        Ok(manifest.into())
    }

    async fn download_blob(&self, repository: &str, digest: &str) -> Result<BlobStream> {
        let url = self.endpoint(&format!("v2/{}/blobs/{}", repository, digest))?;
        let response = self.send(&url, &pull_scope(repository), None).await?;
        if !response.status().is_success() {
            return Err(error_for_response(response, &format!("{}@{}", repository, digest)).await);
        }

        Ok(response.bytes_stream().map_err(RepoError::from).boxed())
    }
}

impl From<OciImageManifest> for ArtifactManifest {
    fn from(manifest: OciImageManifest) -> Self {
        Self {
            config_media_type: manifest.config.media_type,
            config_digest: manifest.config.digest,
            layers: manifest
                .layers
                .into_iter()
                .map(|layer| LayerDescriptor {
                    digest: layer.digest,
                    media_type: layer.media_type,
                    size: layer.size,
                })
                .collect(),
        }
    }
}

fn build_client(insecure_skip_tls: bool, redirect: reqwest::redirect::Policy) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .danger_accept_invalid_certs(insecure_skip_tls)
        .redirect(redirect)
        .user_agent(concat!("chartport/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })
}

fn join_url(base: &Url, path: &str) -> Result<Url> {
    base.join(path).map_err(|e| RepoError::InvalidRegistryUrl {
        url: format!("{}{}", base, path),
        reason: e.to_string(),
    })
}

fn pull_scope(repository: &str) -> String {
    format!("repository:{}:pull", repository)
}

/// Extract the target of a `rel="next"` link
fn next_link(headers: &reqwest::header::HeaderMap) -> Option<String> {
    let value = headers.get(LINK)?.to_str().ok()?;
    value
        .split(',')
        .find(|part| part.contains("rel=\"next\"") || part.contains("rel=next"))
        .and_then(|part| {
            let start = part.find('<')? + 1;
            let end = part.find('>')?;
            (start <= end).then(|| part[start..end].to_string())
        })
}

/// Registry error envelope: `{"errors": [{"code": "...", "message": "..."}]}`
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Turn a failed response into a classified error
async fn error_for_response(response: reqwest::Response, subject: &str) -> RepoError {
    let status = response.status();
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    let envelope: ErrorEnvelope = serde_json::from_str(&body).unwrap_or_default();
    let has_code = |code: &str| envelope.errors.iter().any(|e| e.code == code);

    if has_code("PROJECT_POLICY_VIOLATION") {
        let message = envelope
            .errors
            .iter()
            .find(|e| e.code == "PROJECT_POLICY_VIOLATION")
            .map(|e| e.message.clone())
            .unwrap_or_default();
        return RepoError::PolicyViolation {
            message: format!("{}: {}", subject, message),
        };
    }
    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || has_code("UNAUTHORIZED")
        || has_code("DENIED")
    {
        return RepoError::Unauthorized { url };
    }
    if has_code("NAME_UNKNOWN") {
        return RepoError::RepositoryUnknown {
            name: subject.to_string(),
        };
    }
    if has_code("MANIFEST_UNKNOWN") {
        return RepoError::ManifestNotFound {
            reference: subject.to_string(),
        };
    }

    let message = envelope
        .errors
        .first()
        .map(|e| format!("{}: {}", e.code, e.message))
        .unwrap_or_else(|| format!("Request to {} failed", url));
    RepoError::HttpError {
        status: status.as_u16(),
        message,
    }
}

/// Parsed `WWW-Authenticate: Bearer realm="...",service="...",scope="..."`
#[derive(Debug, Clone, PartialEq, Eq)]
struct BearerChallenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

impl BearerChallenge {
    fn parse(header: &str) -> Option<Self> {
        let (kind, params) = header.trim().split_once(' ')?;
        if !kind.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        let mut rest = params.trim();

        while !rest.is_empty() {
            let (key, after) = rest.split_once('=')?;
            let key = key.trim().trim_start_matches(',').trim();
            let (value, remaining) = match after.strip_prefix('"') {
                Some(quoted) => {
                    let end = quoted.find('"')?;
                    (&quoted[..end], &quoted[end + 1..])
                }
                None => {
                    let end = after.find(',').unwrap_or(after.len());
                    (&after[..end], &after[end..])
                }
            };

            match key {
                "realm" => realm = Some(value.to_string()),
                "service" => service = Some(value.to_string()),
                "scope" => scope = Some(value.to_string()),
                _ => {}
            }
            rest = remaining.trim_start_matches([',', ' ']);
        }

        Some(Self {
            realm: realm?,
            service,
            scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::media_types;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chart_manifest() -> serde_json::Value {
        serde_json::json!({
            "schemaVersion": 2,
            "mediaType": OCI_IMAGE_MEDIA_TYPE,
            "config": {
                "mediaType": media_types::HELM_CONFIG,
                "digest": "sha256:cfg",
                "size": 120
            },
            "layers": [{
                "mediaType": media_types::HELM_CONTENT,
                "digest": "sha256:layer",
                "size": 4096
            }]
        })
    }

    #[test]
    fn test_parse_bearer_challenge() {
        let challenge = BearerChallenge::parse(
            r#"Bearer realm="https://auth.example.com/token",service="registry.example.com",scope="repository:demo:pull""#,
        )
        .unwrap();
        assert_eq!(challenge.realm, "https://auth.example.com/token");
        assert_eq!(challenge.service.as_deref(), Some("registry.example.com"));
        assert_eq!(challenge.scope.as_deref(), Some("repository:demo:pull"));

        let challenge = BearerChallenge::parse(r#"Bearer realm="https://a/token""#).unwrap();
        assert!(challenge.service.is_none());

        assert!(BearerChallenge::parse(r#"Basic realm="registry""#).is_none());
        assert!(BearerChallenge::parse(r#"Bearer service="x""#).is_none());
    }

    #[test]
    fn test_next_link() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            LINK,
            r#"</v2/_catalog?last=b&n=100>; rel="next""#.parse().unwrap(),
        );
        assert_eq!(
            next_link(&headers).as_deref(),
            Some("/v2/_catalog?last=b&n=100")
        );

        assert!(next_link(&reqwest::header::HeaderMap::new()).is_none());
    }

    #[test]
    fn test_manifest_conversion() {
        let manifest: OciImageManifest = serde_json::from_value(chart_manifest()).unwrap();
        let manifest = ArtifactManifest::from(manifest);
        assert!(manifest.is_chart());
        assert_eq!(manifest.config_digest, "sha256:cfg");
        assert_eq!(manifest.layers[0].size, 4096);
    }

    #[tokio::test]
    async fn test_list_repositories_follows_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/_catalog"))
            .and(query_param("last", "b"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "repositories": ["c"] })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/_catalog"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Link", r#"</v2/_catalog?last=b&n=100>; rel="next""#)
                    .set_body_json(serde_json::json!({ "repositories": ["a", "b"] })),
            )
            .mount(&server)
            .await;

        let registry = HttpRegistry::new(&server.uri(), None, false).unwrap();
        let repos = registry.list_repositories().await.unwrap();
        assert_eq!(repos, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_list_tags_null_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/demo/tags/list"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "name": "demo", "tags": null })),
            )
            .mount(&server)
            .await;

        let registry = HttpRegistry::new(&server.uri(), None, false).unwrap();
        assert!(registry.list_tags("demo").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_tags_error_classification() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/private/tags/list"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/blocked/tags/list"))
            .respond_with(ResponseTemplate::new(412).set_body_json(serde_json::json!({
                "errors": [{ "code": "PROJECT_POLICY_VIOLATION", "message": "vulnerable" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/gone/tags/list"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "errors": [{ "code": "NAME_UNKNOWN", "message": "repository name not known to registry" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/broken/tags/list"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let registry = HttpRegistry::new(&server.uri(), None, false).unwrap();

        assert!(matches!(
            registry.list_tags("private").await,
            Err(RepoError::Unauthorized { .. })
        ));
        assert!(matches!(
            registry.list_tags("blocked").await,
            Err(RepoError::PolicyViolation { .. })
        ));
        assert!(matches!(
            registry.list_tags("gone").await,
            Err(RepoError::RepositoryUnknown { .. })
        ));
        assert!(matches!(
            registry.list_tags("broken").await,
            Err(RepoError::HttpError { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_get_manifest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/demo/manifests/1.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart_manifest()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/demo/manifests/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "errors": [{ "code": "MANIFEST_UNKNOWN", "message": "manifest unknown" }]
            })))
            .mount(&server)
            .await;

        let registry = HttpRegistry::new(&server.uri(), None, false).unwrap();
        let manifest = registry.get_manifest("demo", "1.0.0").await.unwrap();
        assert_eq!(manifest.config_media_type, media_types::HELM_CONFIG);
        assert_eq!(manifest.content_layer().unwrap().digest, "sha256:layer");

        assert!(matches!(
            registry.get_manifest("demo", "missing").await,
            Err(RepoError::ManifestNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_download_blob() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/demo/blobs/sha256:layer"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"chart-bytes".to_vec()))
            .mount(&server)
            .await;

        let registry = HttpRegistry::new(&server.uri(), None, false).unwrap();
        let data = registry.fetch_blob("demo", "sha256:layer").await.unwrap();
        assert_eq!(data, b"chart-bytes");
    }

    #[tokio::test]
    async fn test_bearer_challenge_with_basic_credentials() {
        let server = MockServer::start().await;
        let realm = format!("{}/token", server.uri());

        Mock::given(method("GET"))
            .and(path("/token"))
            .and(header("authorization", "Basic cm9ib3Q6czNjcmV0"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "abc" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/_catalog"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "repositories": ["demo"] })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/_catalog"))
            .respond_with(ResponseTemplate::new(401).insert_header(
                "WWW-Authenticate",
                format!(r#"Bearer realm="{}",service="registry""#, realm).as_str(),
            ))
            .mount(&server)
            .await;

        let registry = HttpRegistry::new(
            &server.uri(),
            Some(Credentials::new("robot", "s3cret")),
            false,
        )
        .unwrap();

        assert_eq!(registry.list_repositories().await.unwrap(), vec!["demo"]);
        // Token is reused for the same scope
        assert_eq!(
            registry.cached_token("registry:catalog:*").as_deref(),
            Some("abc")
        );
        assert_eq!(registry.list_repositories().await.unwrap(), vec!["demo"]);
    }

    #[tokio::test]
    async fn test_ping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let registry = HttpRegistry::new(&server.uri(), None, false).unwrap();
        assert!(registry.ping().await.is_ok());
        assert_eq!(registry.url(), server.uri());
    }

    #[tokio::test]
    async fn test_ping_rejects_redirect() {
        let target = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(0)
            .mount(&target)
            .await;

        let redirecting = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("Location", format!("{}/v2/", target.uri()).as_str()),
            )
            .mount(&redirecting)
            .await;

        let registry = HttpRegistry::new(
            &redirecting.uri(),
            Some(Credentials::new("robot", "s3cret")),
            false,
        )
        .unwrap();
        let err = registry.ping().await.unwrap_err();
        assert!(matches!(err, RepoError::HttpError { status: 301, .. }));
    }

    #[test]
    fn test_invalid_join_keeps_url() {
        let base = Url::parse("http://registry.local:5000/").unwrap();
        let err = join_url(&base, "http://[::1").unwrap_err();
        match err {
            RepoError::InvalidRegistryUrl { url, .. } => {
                assert_eq!(url, "http://registry.local:5000/http://[::1")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
