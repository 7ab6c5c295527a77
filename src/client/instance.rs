//! Service instance and app facades.
//!
//! Thin wrappers over a [`TransportClient`] that turn resource paths into
//! absolute platform paths and attach bearer tokens to subscriptions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use thiserror::Error;

use super::client::{ClientConfig, ClientError, Subscription, TransportClient};
use crate::core::{Headers, DEFAULT_APP_CLUSTER, DEFAULT_INSTANCE_CLUSTER};
use crate::transport::SubscriptionListeners;

const AUTHORIZATION_HEADER: &str = "Authorization";

/// Failure to obtain a token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TokenError(pub String);

/// Source of bearer tokens.
#[async_trait]
pub trait TokenProvider: fmt::Debug + Send + Sync {
    /// Fetch a token for the next request.
    async fn fetch_token(&self) -> Result<String, TokenError>;
}

/// Provider that always hands out the same token.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticTokenProvider(String);

impl StaticTokenProvider {
    /// Create a provider for `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticTokenProvider(..)")
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_token(&self) -> Result<String, TokenError> {
        Ok(self.0.clone())
    }
}

/// Strip a URL scheme and a trailing slash from a cluster host.
pub fn sanitize_cluster(cluster: &str) -> String {
    let host = match cluster.find("://") {
        Some(at) if !cluster[..at].contains(|c| c == '/' || c == ':') => &cluster[at + 3..],
        _ => cluster,
    };
    host.strip_suffix('/').unwrap_or(host).to_string()
}

/// Collapse repeated slashes and drop trailing ones.
fn normalize_path(raw: &str) -> String {
    let mut path = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '/' && path.ends_with('/') {
            continue;
        }
        path.push(c);
    }
    while path.ends_with('/') {
        path.pop();
    }
    path
}

/// Client and token source behind a facade.
#[derive(Debug)]
struct Endpoint {
    client: TransportClient,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl Endpoint {
    fn new(
        client: Option<TransportClient>,
        cluster: Option<&str>,
        default_cluster: &str,
        encrypted: bool,
        token_provider: Option<Arc<dyn TokenProvider>>,
    ) -> Self {
        let client = client.unwrap_or_else(|| {
            let host = cluster.map_or_else(|| default_cluster.to_string(), sanitize_cluster);
            debug!("connecting to cluster {}", host);
            TransportClient::connect(&ClientConfig {
                host,
                encrypted,
                ..ClientConfig::default()
            })
        });
        Self {
            client,
            token_provider,
        }
    }

    /// Subscribe with a bearer token unless `headers` carry an `Authorization` header.
    async fn subscribe(
        &self,
        path: String,
        listeners: SubscriptionListeners,
        mut headers: Headers,
    ) -> Result<Subscription, ClientError> {
        let has_authorization = headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case(AUTHORIZATION_HEADER));
        if let Some(provider) = &self.token_provider
            && !has_authorization
        {
            let token = provider.fetch_token().await?;
            headers.insert(AUTHORIZATION_HEADER.to_string(), format!("Bearer {token}"));
        }
        self.client.subscribe(path, listeners, headers)
    }
}

/// Options for [`Instance`].
#[derive(Debug, Clone)]
pub struct InstanceOptions {
    /// Instance id.
    pub instance_id: String,
    /// Service name.
    pub service_name: String,
    /// Service version.
    pub service_version: String,
    /// Cluster host; defaults to the platform's instance cluster.
    pub cluster: Option<String>,
    /// Use TLS. Defaults to `true`.
    pub encrypted: bool,
    /// Token source for subscriptions.
    pub token_provider: Option<Arc<dyn TokenProvider>>,
    /// Existing client to reuse instead of connecting.
    pub client: Option<TransportClient>,
}

impl InstanceOptions {
    /// Create options for one service instance.
    pub fn new(
        instance_id: impl Into<String>,
        service_name: impl Into<String>,
        service_version: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            service_name: service_name.into(),
            service_version: service_version.into(),
            cluster: None,
            encrypted: true,
            token_provider: None,
            client: None,
        }
    }

    /// Set the cluster host.
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Enable or disable TLS.
    pub fn with_encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Set the token provider.
    pub fn with_token_provider(mut self, provider: impl TokenProvider + 'static) -> Self {
        self.token_provider = Some(Arc::new(provider));
        self
    }

    /// Reuse an existing client.
    pub fn with_client(mut self, client: TransportClient) -> Self {
        self.client = Some(client);
        self
    }
}

/// One instance of a versioned platform service.
#[derive(Debug)]
pub struct Instance {
    endpoint: Endpoint,
    instance_id: String,
    service_name: String,
    service_version: String,
}

impl Instance {
    /// Create an instance facade, connecting unless a client was supplied.
    ///
    /// Connecting spawns onto the current tokio runtime.
    pub fn new(options: InstanceOptions) -> Result<Self, ClientError> {
        for (name, value) in [
            ("instance_id", &options.instance_id),
            ("service_name", &options.service_name),
            ("service_version", &options.service_version),
        ] {
            if value.is_empty() {
                return Err(ClientError::InvalidOptions(format!(
                    "expected `{name}` in instance options"
                )));
            }
        }
        let endpoint = Endpoint::new(
            options.client,
            options.cluster.as_deref(),
            DEFAULT_INSTANCE_CLUSTER,
            options.encrypted,
            options.token_provider,
        );
        Ok(Self {
            endpoint,
            instance_id: options.instance_id,
            service_name: options.service_name,
            service_version: options.service_version,
        })
    }

    /// Underlying client.
    pub fn client(&self) -> &TransportClient {
        &self.endpoint.client
    }

    /// Absolute platform path for a path relative to this instance.
    pub fn absolute_path(&self, path: &str) -> String {
        normalize_path(&format!(
            "/services/{}/{}/{}/{}",
            self.service_name, self.service_version, self.instance_id, path
        ))
    }

    /// Subscribe to a path relative to this instance.
    ///
    /// A bearer token is attached unless `headers` already carry an
    /// `Authorization` header.
    pub async fn subscribe(
        &self,
        path: &str,
        listeners: SubscriptionListeners,
        headers: Headers,
    ) -> Result<Subscription, ClientError> {
        self.endpoint
            .subscribe(self.absolute_path(path), listeners, headers)
            .await
    }
}

/// Options for [`App`].
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Service id.
    pub service_id: String,
    /// Cluster host; defaults to the platform's app cluster.
    pub cluster: Option<String>,
    /// Use TLS. Defaults to `true`.
    pub encrypted: bool,
    /// Token source for subscriptions.
    pub token_provider: Option<Arc<dyn TokenProvider>>,
    /// Existing client to reuse instead of connecting.
    pub client: Option<TransportClient>,
}

impl AppOptions {
    /// Create options for one app.
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            cluster: None,
            encrypted: true,
            token_provider: None,
            client: None,
        }
    }

    /// Set the cluster host.
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Enable or disable TLS.
    pub fn with_encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Set the token provider.
    pub fn with_token_provider(mut self, provider: impl TokenProvider + 'static) -> Self {
        self.token_provider = Some(Arc::new(provider));
        self
    }

    /// Reuse an existing client.
    pub fn with_client(mut self, client: TransportClient) -> Self {
        self.client = Some(client);
        self
    }
}

/// An app hosted on the platform.
#[derive(Debug)]
pub struct App {
    endpoint: Endpoint,
    service_id: String,
}

impl App {
    /// Create an app facade, connecting unless a client was supplied.
    pub fn new(options: AppOptions) -> Result<Self, ClientError> {
        if options.service_id.is_empty() {
            return Err(ClientError::InvalidOptions(
                "expected `service_id` in app options".to_string(),
            ));
        }
        let endpoint = Endpoint::new(
            options.client,
            options.cluster.as_deref(),
            DEFAULT_APP_CLUSTER,
            options.encrypted,
            options.token_provider,
        );
        Ok(Self {
            endpoint,
            service_id: options.service_id,
        })
    }

    /// Underlying client.
    pub fn client(&self) -> &TransportClient {
        &self.endpoint.client
    }

    /// Absolute platform path for a path relative to this app.
    pub fn absolute_path(&self, path: &str) -> String {
        normalize_path(&format!("/apps/{}/{}", self.service_id, path))
    }

    /// Subscribe to a path relative to this app.
    pub async fn subscribe(
        &self,
        path: &str,
        listeners: SubscriptionListeners,
        headers: Headers,
    ) -> Result<Subscription, ClientError> {
        self.endpoint
            .subscribe(self.absolute_path(path), listeners, headers)
            .await
    }
}
