//! Sysdig REST client.
//!
//! Resources talk to the backend through the [`SysdigApi`] trait. The
//! production implementation, [`HttpClient`], performs authenticated
//! REST/JSON calls with `reqwest`; tests substitute the in-memory
//! [`FakeBackend`](crate::testing::FakeBackend).

mod iam;
mod retry;

pub use iam::IamTokenSource;
pub use retry::RetryPolicy;

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::{Credentials, Product, ProductConfig, ProviderConfig};
use crate::error::ProviderError;

const PRODUCT_HEADER: &str = "X-Sysdig-Product";
const IBM_INSTANCE_HEADER: &str = "IBMInstanceID";
const TEAM_ID_HEADER: &str = "SysdigTeamID";
const TEAM_NAME_HEADER: &str = "SysdigTeamName";

/// A single call against one product's API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Which product the call targets.
    pub product: Product,
    /// HTTP method.
    pub method: Method,
    /// Path below the product base URL, starting with `/`.
    pub path: String,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl ApiRequest {
    fn new(product: Product, method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            product,
            method,
            path: path.into(),
            body,
        }
    }

    /// `GET path`.
    pub fn get(product: Product, path: impl Into<String>) -> Self {
        Self::new(product, Method::GET, path, None)
    }

    /// `POST path` with a JSON body.
    pub fn post(product: Product, path: impl Into<String>, body: Value) -> Self {
        Self::new(product, Method::POST, path, Some(body))
    }

    /// `PUT path` with a JSON body.
    pub fn put(product: Product, path: impl Into<String>, body: Value) -> Self {
        Self::new(product, Method::PUT, path, Some(body))
    }

    /// `PATCH path` with a JSON body.
    pub fn patch(product: Product, path: impl Into<String>, body: Value) -> Self {
        Self::new(product, Method::PATCH, path, Some(body))
    }

    /// `DELETE path`.
    pub fn delete(product: Product, path: impl Into<String>) -> Self {
        Self::new(product, Method::DELETE, path, None)
    }

    /// `METHOD path`, for logs.
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Access to the Sysdig API.
#[async_trait]
pub trait SysdigApi: Send + Sync {
    /// Execute a request.
    ///
    /// Returns the decoded JSON body, `None` for an empty body, and maps
    /// non-success statuses to [`ProviderError`] with the backend message.
    async fn execute(&self, request: ApiRequest) -> Result<Option<Value>, ProviderError>;
}

enum Auth {
    Token(String),
    Ibm {
        source: IamTokenSource,
        instance_id: String,
    },
}

struct ProductClient {
    http: reqwest::Client,
    config: ProductConfig,
    auth: Auth,
}

/// `reqwest`-based [`SysdigApi`] implementation.
pub struct HttpClient {
    products: BTreeMap<Product, ProductClient>,
    extra_headers: BTreeMap<String, String>,
    retry: RetryPolicy,
}

impl HttpClient {
    /// Build a client for every product that has credentials in `config`.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let mut products = BTreeMap::new();
        for (product, product_config) in [
            (Product::Monitor, config.monitor.as_ref()),
            (Product::Secure, config.secure.as_ref()),
        ] {
            if let Some(product_config) = product_config {
                products.insert(product, ProductClient::new(product_config, config)?);
            }
        }

        Ok(Self {
            products,
            extra_headers: config.extra_headers.clone(),
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn product(&self, product: Product) -> Result<&ProductClient, ProviderError> {
        self.products.get(&product).ok_or_else(|| {
            ProviderError::Configuration(format!(
                "sysdig {} credentials are not configured: set sysdig_{}_api_token or ibm_{}_api_key",
                product, product, product
            ))
        })
    }

    async fn send_once(
        &self,
        client: &ProductClient,
        request: &ApiRequest,
    ) -> Result<Option<Value>, ProviderError> {
        let url = format!("{}{}", client.config.url, request.path);
        let mut builder = client
            .http
            .request(request.method.clone(), &url)
            .header(ACCEPT, "application/json");

        builder = client.authorize(builder).await?;
        if request.product == Product::Secure {
            builder = builder.header(PRODUCT_HEADER, "SDS");
        }
        for (name, value) in &self.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let message = extract_error_message(status, &text);
            debug!(status = status.as_u16(), message = %message, "API call failed");
            return Err(ProviderError::from_status(status.as_u16(), message));
        }

        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }
}

impl ProductClient {
    fn new(config: &ProductConfig, provider: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(provider.timeout)
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()?;

        let auth = match &config.credentials {
            Credentials::Token(token) => Auth::Token(token.clone()),
            Credentials::Ibm {
                iam_url,
                instance_id,
                api_key,
            } => Auth::Ibm {
                source: IamTokenSource::new(http.clone(), iam_url, api_key.clone()),
                instance_id: instance_id.clone(),
            },
        };

        Ok(Self {
            http,
            config: config.clone(),
            auth,
        })
    }

    async fn authorize(&self, builder: RequestBuilder) -> Result<RequestBuilder, ProviderError> {
        let builder = builder.header(
            USER_AGENT,
            concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
        );
        match &self.auth {
            Auth::Token(token) => Ok(builder.bearer_auth(token)),
            Auth::Ibm {
                source,
                instance_id,
            } => {
                let token = source.token().await?;
                let mut builder = builder
                    .bearer_auth(token)
                    .header(IBM_INSTANCE_HEADER, instance_id.as_str());
                if let Some(team_id) = &self.config.team_id {
                    builder = builder.header(TEAM_ID_HEADER, team_id.as_str());
                }
                if let Some(team_name) = &self.config.team_name {
                    builder = builder.header(TEAM_NAME_HEADER, team_name.as_str());
                }
                Ok(builder)
            },
        }
    }
}

#[async_trait]
impl SysdigApi for HttpClient {
    #[instrument(skip(self, request), fields(product = %request.product, call = %request.describe()))]
    async fn execute(&self, request: ApiRequest) -> Result<Option<Value>, ProviderError> {
        let client = self.product(request.product)?;
        let what = request.describe();

        let result = self
            .retry
            .run(&what, || self.send_once(client, &request))
            .await;

        // An IAM token can be revoked before its expiry; refresh once.
        if let (Err(ProviderError::PermissionDenied(_)), Auth::Ibm { source, .. }) =
            (&result, &client.auth)
        {
            warn!("IAM token rejected, refreshing");
            source.invalidate().await;
            return self
                .retry
                .run(&what, || self.send_once(client, &request))
                .await;
        }

        result
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Pull the human-readable message out of a Sysdig error body.
///
/// Handles `{"errors": [{"message": ..}]}` and `{"message": ..}`, falling
/// back to the raw body and then to the status reason.
fn extract_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        let messages: Vec<String> = parsed
            .errors
            .into_iter()
            .filter_map(|e| e.message.or(e.reason))
            .collect();
        if !messages.is_empty() {
            return messages.join("; ");
        }
        if let Some(message) = parsed.message {
            return message;
        }
    }

    let body = body.trim();
    if !body.is_empty() {
        return body.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_string()
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::DeadlineExceeded(err.to_string())
    } else {
        ProviderError::Transport(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProductConfig;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn product_config(uri: &str, credentials: Credentials) -> ProductConfig {
        ProductConfig {
            url: uri.to_string(),
            credentials,
            insecure_tls: false,
            team_id: None,
            team_name: None,
        }
    }

    fn client_for(mock_server: &MockServer) -> HttpClient {
        let config = ProviderConfig {
            monitor: Some(product_config(
                &mock_server.uri(),
                Credentials::Token("monitor-token".into()),
            )),
            secure: Some(product_config(
                &mock_server.uri(),
                Credentials::Token("secure-token".into()),
            )),
            extra_headers: BTreeMap::new(),
            timeout: Duration::from_secs(5),
        };
        HttpClient::new(&config).unwrap().with_retry_policy(
            RetryPolicy::default().with_backoff(Duration::from_millis(1), Duration::from_millis(2)),
        )
    }

    #[tokio::test]
    async fn test_get_with_bearer_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/teams/7"))
            .and(header("Authorization", "Bearer monitor-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "team": {"id": 7, "name": "ops"}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let body = client
            .execute(ApiRequest::get(Product::Monitor, "/api/teams/7"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body["team"]["name"], "ops");
    }

    #[tokio::test]
    async fn test_secure_requests_carry_product_header() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/platform/v1/zones"))
            .and(header("Authorization", "Bearer secure-token"))
            .and(header("X-Sysdig-Product", "SDS"))
            .and(body_json(json!({"name": "prod"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1, "name": "prod"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let body = client
            .execute(ApiRequest::post(
                Product::Secure,
                "/platform/v1/zones",
                json!({"name": "prod"}),
            ))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body["id"], 1);
    }

    #[tokio::test]
    async fn test_empty_body_is_none() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/api/roles/3"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let body = client
            .execute(ApiRequest::delete(Product::Monitor, "/api/roles/3"))
            .await
            .unwrap();
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn test_backend_error_message_is_verbatim() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/teams"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "errors": [{"reason": "Unprocessable", "message": "Team name already in use"}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let err = client
            .execute(ApiRequest::post(Product::Monitor, "/api/teams", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert_eq!(err.message(), "Team name already in use");
    }

    #[tokio::test]
    async fn test_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/secure/rules/99"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Rule not found"})))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let err = client
            .execute(ApiRequest::get(Product::Secure, "/api/secure/rules/99"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.message(), "Rule not found");
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/api/notificationChannels/5"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/api/notificationChannels/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "notificationChannel": {"id": 5, "enabled": false}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let body = client
            .execute(ApiRequest::put(
                Product::Monitor,
                "/api/notificationChannels/5",
                json!({"notificationChannel": {"enabled": false}}),
            ))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body["notificationChannel"]["enabled"], false);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/secure/rules"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid condition"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let err = client
            .execute(ApiRequest::post(Product::Secure, "/api/secure/rules", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "invalid condition");
    }

    #[tokio::test]
    async fn test_unconfigured_product() {
        let config = ProviderConfig {
            monitor: None,
            secure: None,
            extra_headers: BTreeMap::new(),
            timeout: Duration::from_secs(5),
        };
        let client = HttpClient::new(&config).unwrap();
        let err = client
            .execute(ApiRequest::get(Product::Monitor, "/api/teams"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_extra_headers() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .and(header("X-Proxy-Tenant", "acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": {"id": 1}})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut client = client_for(&mock_server);
        client
            .extra_headers
            .insert("X-Proxy-Tenant".into(), "acme".into());
        client
            .execute(ApiRequest::get(Product::Monitor, "/api/users/me"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ibm_authentication() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/identity/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "iam-token",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .and(header("Authorization", "Bearer iam-token"))
            .and(header("IBMInstanceID", "instance-1"))
            .and(header("SysdigTeamName", "ops"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": {"id": 1}})))
            .expect(2)
            .mount(&mock_server)
            .await;

        let mut monitor = product_config(
            &mock_server.uri(),
            Credentials::Ibm {
                iam_url: mock_server.uri(),
                instance_id: "instance-1".into(),
                api_key: "ibm-key".into(),
            },
        );
        monitor.team_name = Some("ops".into());
        let config = ProviderConfig {
            monitor: Some(monitor),
            secure: None,
            extra_headers: BTreeMap::new(),
            timeout: Duration::from_secs(5),
        };

        let client = HttpClient::new(&config).unwrap();
        for _ in 0..2 {
            client
                .execute(ApiRequest::get(Product::Monitor, "/api/users/me"))
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_extract_error_message_fallbacks() {
        assert_eq!(
            extract_error_message(StatusCode::BAD_REQUEST, r#"{"message": "bad scope"}"#),
            "bad scope"
        );
        assert_eq!(
            extract_error_message(
                StatusCode::BAD_REQUEST,
                r#"{"errors": [{"message": "a"}, {"reason": "b"}]}"#
            ),
            "a; b"
        );
        assert_eq!(
            extract_error_message(StatusCode::BAD_GATEWAY, "upstream timed out"),
            "upstream timed out"
        );
        assert_eq!(
            extract_error_message(StatusCode::SERVICE_UNAVAILABLE, ""),
            "Service Unavailable"
        );
    }
}
