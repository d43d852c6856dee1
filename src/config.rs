//! Provider configuration.
//!
//! The provider block carries one set of credentials per product (Monitor and
//! Secure). Every attribute falls back to an environment variable when unset
//! in configuration; the lookup is injectable so tests never touch the
//! process environment.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};

/// Default Sysdig Monitor endpoint.
pub const DEFAULT_MONITOR_URL: &str = "https://app.sysdigcloud.com";

/// Default Sysdig Secure endpoint.
pub const DEFAULT_SECURE_URL: &str = "https://secure.sysdig.com";

/// Default IBM Cloud IAM endpoint.
pub const DEFAULT_IBM_IAM_URL: &str = "https://iam.cloud.ibm.com";

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// Source of environment defaults.
pub trait EnvLookup: Send + Sync {
    /// Return the value of `name`, if set and non-empty.
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

impl EnvLookup for BTreeMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        BTreeMap::get(self, name).filter(|v| !v.is_empty()).cloned()
    }
}

/// The Sysdig products the provider talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Product {
    /// Sysdig Monitor (teams, alerts, notification channels, roles).
    Monitor,
    /// Sysdig Secure (zones, policies, Falco rules, scanning policies).
    Secure,
}

impl Product {
    /// Human-readable product name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Product::Monitor => "monitor",
            Product::Secure => "secure",
        }
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How requests for one product authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A Sysdig API token sent as a bearer token.
    Token(String),
    /// An IBM Cloud API key exchanged for IAM access tokens.
    Ibm {
        /// IAM endpoint the key is exchanged at.
        iam_url: String,
        /// IBM service instance the requests target.
        instance_id: String,
        /// The IBM Cloud API key.
        api_key: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Token(***)"),
            Credentials::Ibm {
                iam_url,
                instance_id,
                ..
            } => f
                .debug_struct("Ibm")
                .field("iam_url", iam_url)
                .field("instance_id", instance_id)
                .field("api_key", &"***")
                .finish(),
        }
    }
}

/// Resolved settings for one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductConfig {
    /// Base URL of the product API.
    pub url: String,
    /// Authentication.
    pub credentials: Credentials,
    /// Skip TLS certificate verification.
    pub insecure_tls: bool,
    /// Team selection headers (IBM only).
    pub team_id: Option<String>,
    /// Team selection headers (IBM only).
    pub team_name: Option<String>,
}

/// Fully resolved provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderConfig {
    /// Monitor settings, if credentials were supplied.
    pub monitor: Option<ProductConfig>,
    /// Secure settings, if credentials were supplied.
    pub secure: Option<ProductConfig>,
    /// Headers added to every request.
    pub extra_headers: BTreeMap<String, String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// The provider block as written in configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    sysdig_monitor_url: Option<String>,
    sysdig_monitor_api_token: Option<String>,
    sysdig_monitor_insecure_tls: Option<bool>,
    sysdig_monitor_team_id: Option<i64>,
    sysdig_monitor_team_name: Option<String>,
    sysdig_secure_url: Option<String>,
    sysdig_secure_api_token: Option<String>,
    sysdig_secure_insecure_tls: Option<bool>,
    ibm_monitor_iam_url: Option<String>,
    ibm_monitor_instance_id: Option<String>,
    ibm_monitor_api_key: Option<String>,
    ibm_secure_iam_url: Option<String>,
    ibm_secure_instance_id: Option<String>,
    ibm_secure_api_key: Option<String>,
    extra_headers: Option<BTreeMap<String, String>>,
    timeout_seconds: Option<u64>,
}

/// Environment variable names, per product.
struct EnvNames {
    url: &'static str,
    token: &'static str,
    insecure: &'static str,
    iam_url: &'static str,
    instance_id: &'static str,
    api_key: &'static str,
}

const MONITOR_ENV: EnvNames = EnvNames {
    url: "SYSDIG_MONITOR_URL",
    token: "SYSDIG_MONITOR_API_TOKEN",
    insecure: "SYSDIG_MONITOR_INSECURE_TLS",
    iam_url: "SYSDIG_IBM_MONITOR_IAM_URL",
    instance_id: "SYSDIG_IBM_MONITOR_INSTANCE_ID",
    api_key: "SYSDIG_IBM_MONITOR_API_KEY",
};

const SECURE_ENV: EnvNames = EnvNames {
    url: "SYSDIG_SECURE_URL",
    token: "SYSDIG_SECURE_API_TOKEN",
    insecure: "SYSDIG_SECURE_INSECURE_TLS",
    iam_url: "SYSDIG_IBM_SECURE_IAM_URL",
    instance_id: "SYSDIG_IBM_SECURE_INSTANCE_ID",
    api_key: "SYSDIG_IBM_SECURE_API_KEY",
};

/// Values for one product before resolution.
struct ProductInput {
    url: Option<String>,
    token: Option<String>,
    insecure: Option<bool>,
    iam_url: Option<String>,
    instance_id: Option<String>,
    api_key: Option<String>,
}

impl ProductInput {
    fn merge(self, env: &dyn EnvLookup, names: &EnvNames) -> Self {
        Self {
            url: non_empty(self.url).or_else(|| env.get(names.url)),
            token: non_empty(self.token).or_else(|| env.get(names.token)),
            insecure: self
                .insecure
                .or_else(|| env.get(names.insecure).map(|v| parse_bool(&v))),
            iam_url: non_empty(self.iam_url).or_else(|| env.get(names.iam_url)),
            instance_id: non_empty(self.instance_id).or_else(|| env.get(names.instance_id)),
            api_key: non_empty(self.api_key).or_else(|| env.get(names.api_key)),
        }
    }
}

impl ProviderConfig {
    /// Schema of the provider configuration block.
    pub fn schema() -> Schema {
        let sensitive = || Attribute::optional_string().sensitive();
        Schema::v0()
            .with_attribute(
                "sysdig_monitor_url",
                Attribute::optional_string()
                    .with_description("Sysdig Monitor endpoint (env SYSDIG_MONITOR_URL)"),
            )
            .with_attribute("sysdig_monitor_api_token", sensitive())
            .with_attribute("sysdig_monitor_insecure_tls", Attribute::optional_bool())
            .with_attribute("sysdig_monitor_team_id", Attribute::optional_int64())
            .with_attribute("sysdig_monitor_team_name", Attribute::optional_string())
            .with_attribute(
                "sysdig_secure_url",
                Attribute::optional_string()
                    .with_description("Sysdig Secure endpoint (env SYSDIG_SECURE_URL)"),
            )
            .with_attribute("sysdig_secure_api_token", sensitive())
            .with_attribute("sysdig_secure_insecure_tls", Attribute::optional_bool())
            .with_attribute("ibm_monitor_iam_url", Attribute::optional_string())
            .with_attribute("ibm_monitor_instance_id", Attribute::optional_string())
            .with_attribute("ibm_monitor_api_key", sensitive())
            .with_attribute("ibm_secure_iam_url", Attribute::optional_string())
            .with_attribute("ibm_secure_instance_id", Attribute::optional_string())
            .with_attribute("ibm_secure_api_key", sensitive())
            .with_attribute("extra_headers", Attribute::optional_string_map())
            .with_attribute(
                "timeout_seconds",
                Attribute::optional_int64().with_default(json!(DEFAULT_TIMEOUT_SECONDS)),
            )
    }

    /// Resolve configuration against the process environment.
    pub fn from_value(config: &Value) -> Result<Self, Vec<Diagnostic>> {
        Self::from_value_with_env(config, &ProcessEnv)
    }

    /// Resolve configuration against an explicit environment.
    ///
    /// Explicit configuration wins over environment values. Returns every
    /// problem found rather than stopping at the first.
    pub fn from_value_with_env(
        config: &Value,
        env: &dyn EnvLookup,
    ) -> Result<Self, Vec<Diagnostic>> {
        let raw: RawConfig = if config.is_null() {
            RawConfig::default()
        } else {
            serde_json::from_value(config.clone()).map_err(|e| {
                vec![Diagnostic::error("Invalid provider configuration").with_detail(e.to_string())]
            })?
        };

        let team_id = raw
            .sysdig_monitor_team_id
            .map(|id| id.to_string())
            .or_else(|| env.get("SYSDIG_MONITOR_TEAM_ID"));
        let team_name =
            non_empty(raw.sysdig_monitor_team_name).or_else(|| env.get("SYSDIG_MONITOR_TEAM_NAME"));

        let monitor_input = ProductInput {
            url: raw.sysdig_monitor_url,
            token: raw.sysdig_monitor_api_token,
            insecure: raw.sysdig_monitor_insecure_tls,
            iam_url: raw.ibm_monitor_iam_url,
            instance_id: raw.ibm_monitor_instance_id,
            api_key: raw.ibm_monitor_api_key,
        }
        .merge(env, &MONITOR_ENV);

        let secure_input = ProductInput {
            url: raw.sysdig_secure_url,
            token: raw.sysdig_secure_api_token,
            insecure: raw.sysdig_secure_insecure_tls,
            iam_url: raw.ibm_secure_iam_url,
            instance_id: raw.ibm_secure_instance_id,
            api_key: raw.ibm_secure_api_key,
        }
        .merge(env, &SECURE_ENV);

        let mut diagnostics = Vec::new();
        let monitor = resolve_product(
            Product::Monitor,
            monitor_input,
            DEFAULT_MONITOR_URL,
            (team_id, team_name),
            &mut diagnostics,
        );
        let secure = resolve_product(
            Product::Secure,
            secure_input,
            DEFAULT_SECURE_URL,
            (None, None),
            &mut diagnostics,
        );

        let timeout_seconds = raw.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        if timeout_seconds == 0 {
            diagnostics.push(
                Diagnostic::error("timeout_seconds must be greater than zero")
                    .with_attribute("timeout_seconds"),
            );
        }

        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }

        Ok(Self {
            monitor,
            secure,
            extra_headers: raw.extra_headers.unwrap_or_default(),
            timeout: Duration::from_secs(timeout_seconds),
        })
    }

    /// Settings for `product`, or a configuration error naming what is missing.
    pub fn product(&self, product: Product) -> Result<&ProductConfig, ProviderError> {
        let config = match product {
            Product::Monitor => self.monitor.as_ref(),
            Product::Secure => self.secure.as_ref(),
        };
        config.ok_or_else(|| {
            ProviderError::Configuration(format!(
                "sysdig {} credentials are not configured: set sysdig_{}_api_token or ibm_{}_api_key",
                product, product, product
            ))
        })
    }
}

fn resolve_product(
    product: Product,
    input: ProductInput,
    default_url: &str,
    team: (Option<String>, Option<String>),
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<ProductConfig> {
    let url_attr = format!("sysdig_{}_url", product);
    let url = input.url.unwrap_or_else(|| default_url.to_string());
    if let Err(e) = Url::parse(&url) {
        diagnostics.push(
            Diagnostic::error(format!("Invalid URL for {}", url_attr))
                .with_detail(format!("{}: {}", url, e))
                .with_attribute(url_attr),
        );
        return None;
    }

    let credentials = match (input.token, input.api_key) {
        (Some(_), Some(_)) => {
            diagnostics.push(
                Diagnostic::error(format!(
                    "sysdig_{}_api_token cannot be used together with ibm_{}_api_key",
                    product, product
                ))
                .with_attribute(format!("sysdig_{}_api_token", product)),
            );
            return None;
        },
        (Some(token), None) => Credentials::Token(token),
        (None, Some(api_key)) => {
            let Some(instance_id) = input.instance_id else {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "ibm_{}_instance_id must be set when ibm_{}_api_key is used",
                        product, product
                    ))
                    .with_attribute(format!("ibm_{}_instance_id", product)),
                );
                return None;
            };
            Credentials::Ibm {
                iam_url: input
                    .iam_url
                    .unwrap_or_else(|| DEFAULT_IBM_IAM_URL.to_string()),
                instance_id,
                api_key,
            }
        },
        (None, None) => return None,
    };

    let (team_id, team_name) = team;
    Some(ProductConfig {
        url: url.trim_end_matches('/').to_string(),
        credentials,
        insecure_tls: input.insecure.unwrap_or(false),
        team_id,
        team_name,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
