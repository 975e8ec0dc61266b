//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`GatewayClient`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use gateway_client::{FileAuthCache, FileKeyStore, GatewayClient};
//!
//! # fn example() -> gateway_client::Result<()> {
//! let client = GatewayClient::builder()
//!     .url("wss://gateway.example:18789")
//!     .key_store(FileKeyStore::at_default_path())
//!     .auth_cache(FileAuthCache::at_default_path())
//!     .on_event(|event| println!("{}: {}", event.stream, event.data))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{OnceCell, watch};
use url::Url;

use crate::device::{AuthCache, DeviceSigner, KeyStore};
use crate::error::{Error, Result};
use crate::identifiers::RequestIdAllocator;
use crate::protocol::EventFrame;
use crate::transport::ConnectionState;

use super::core::{ClientInner, DeviceSource, GatewayClient, Lifecycle};
use super::events::{EventDispatcher, EventHandler, StreamFilter};
use super::info::{CloseHandler, CloseInfo, Credentials, HelloHandler, HelloInfo};
use super::options::ClientOptions;
use super::settings::GatewaySettings;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`GatewayClient`] instance.
///
/// Use [`GatewayClient::builder()`] to create a new builder.
#[derive(Default)]
pub struct ClientBuilder {
    /// Gateway URL.
    url: Option<String>,
    /// Shared-secret credentials.
    credentials: Credentials,
    /// Device identity source.
    device: Option<DeviceSource>,
    /// Device token cache.
    auth_cache: Option<Arc<dyn AuthCache>>,
    /// Tuning options.
    options: ClientOptions,
    /// Lifecycle callbacks.
    on_hello: Option<HelloHandler>,
    on_event: Option<EventHandler>,
    on_close: Option<CloseHandler>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("url", &self.url)
            .field("credentials", &self.credentials)
            .field("device", &self.device.is_some())
            .field("auth_cache", &self.auth_cache.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new client builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gateway URL (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets a bearer token.
    #[inline]
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.credentials.token = Some(token.into());
        self
    }

    /// Sets a shared password.
    #[inline]
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.credentials.password = Some(password.into());
        self
    }

    /// Applies persisted settings: URL, and any token or password present.
    #[must_use]
    pub fn settings(mut self, settings: GatewaySettings) -> Self {
        self.url = Some(settings.gateway_url);
        if settings.token.is_some() {
            self.credentials.token = settings.token;
        }
        if settings.password.is_some() {
            self.credentials.password = settings.password;
        }
        self
    }

    /// Authenticates with a device identity from `store`, created on
    /// first use.
    #[inline]
    #[must_use]
    pub fn key_store(mut self, store: impl KeyStore + 'static) -> Self {
        self.device = Some(DeviceSource::Store(Arc::new(store)));
        self
    }

    /// Authenticates with an externally held signer.
    #[inline]
    #[must_use]
    pub fn device_signer(mut self, signer: impl DeviceSigner + 'static) -> Self {
        self.device = Some(DeviceSource::Signer(Arc::new(signer)));
        self
    }

    /// Caches device tokens issued by the gateway in `cache`.
    #[inline]
    #[must_use]
    pub fn auth_cache(mut self, cache: impl AuthCache + 'static) -> Self {
        self.auth_cache = Some(Arc::new(cache));
        self
    }

    /// Sets tuning options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Called on every successful hello, including reconnects.
    #[must_use]
    pub fn on_hello(mut self, handler: impl Fn(&HelloInfo) + Send + Sync + 'static) -> Self {
        self.on_hello = Some(Arc::new(handler));
        self
    }

    /// Called for every event frame. Registered ahead of any
    /// [`GatewayClient::on`] subscription.
    #[must_use]
    pub fn on_event(mut self, handler: impl Fn(&EventFrame) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Arc::new(handler));
        self
    }

    /// Called whenever a connection or connection attempt ends.
    #[must_use]
    pub fn on_close(mut self, handler: impl Fn(&CloseInfo) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(handler));
        self
    }

    /// Builds the client with validation. The client is not started.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is missing, unparseable or not `ws`/`wss`
    /// - [`Error::Config`] if no credential source is configured
    /// - [`Error::Config`] if the options are invalid
    pub fn build(self) -> Result<GatewayClient> {
        let url = self.validate_url()?;
        self.validate_credentials()?;
        self.options.validate().map_err(Error::config)?;

        let dispatcher = EventDispatcher::new();
        if let Some(handler) = self.on_event {
            dispatcher.subscribe(StreamFilter::All, handler);
        }

        let (state_tx, _) = watch::channel(ConnectionState::Idle);

        Ok(GatewayClient::from_inner(ClientInner {
            url,
            options: self.options,
            credentials: RwLock::new(self.credentials),
            credentials_epoch: AtomicU64::new(0),
            device: self.device,
            signer: OnceCell::new(),
            auth_cache: self.auth_cache,
            on_hello: self.on_hello,
            on_close: self.on_close,
            dispatcher,
            state_tx,
            connection: RwLock::new(None),
            hello: RwLock::new(None),
            request_ids: RequestIdAllocator::default(),
            generation: AtomicU64::new(0),
            lifecycle: Mutex::new(Lifecycle::Stopped),
        }))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Validates the gateway URL.
    fn validate_url(&self) -> Result<Url> {
        let raw = self.url.as_deref().ok_or_else(|| {
            Error::config(
                "Gateway URL is required. Use .url() or .settings() to set it.\n\
                 Example: GatewayClient::builder().url(\"ws://127.0.0.1:18789\")",
            )
        })?;

        let url = Url::parse(raw)
            .map_err(|e| Error::config(format!("Invalid gateway URL '{raw}': {e}")))?;

        match url.scheme() {
            "ws" => Ok(url),
            "wss" if cfg!(feature = "tls") => Ok(url),
            "wss" => Err(Error::config(
                "wss:// URLs require the `tls` feature.\n\
                 Enable it with: gateway-client = { features = [\"tls\"] }",
            )),
            scheme => Err(Error::config(format!(
                "Unsupported URL scheme '{scheme}'. Use ws:// or wss://."
            ))),
        }
    }

    /// Validates that some credential source is configured.
    fn validate_credentials(&self) -> Result<()> {
        if self.credentials.is_empty() && self.device.is_none() {
            return Err(Error::config(
                "No credentials configured. Use .token(), .password(), .key_store() \
                 or .device_signer() to set one.",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::device::{DeviceIdentity, MemoryKeyStore};

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = ClientBuilder::new();
        assert!(builder.url.is_none());
        assert!(builder.credentials.is_empty());
        assert!(builder.device.is_none());
        assert!(builder.auth_cache.is_none());
    }

    #[test]
    fn test_settings_fill_url_and_credentials() {
        let builder = ClientBuilder::new()
            .password("pw")
            .settings(GatewaySettings::new("ws://gw:1").with_token("t"));

        assert_eq!(builder.url.as_deref(), Some("ws://gw:1"));
        assert_eq!(builder.credentials.token.as_deref(), Some("t"));
        assert_eq!(builder.credentials.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_build_fails_without_url() {
        let err = ClientBuilder::new().token("t").build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("URL is required"));
    }

    #[test]
    fn test_build_fails_with_bad_scheme() {
        let err = ClientBuilder::new()
            .url("http://127.0.0.1:1")
            .token("t")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("scheme"));
    }

    #[test]
    fn test_build_fails_with_unparseable_url() {
        let result = ClientBuilder::new().url("not a url").token("t").build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_build_fails_without_credentials() {
        let err = ClientBuilder::new()
            .url("ws://127.0.0.1:1")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("credentials"));
    }

    #[test]
    fn test_build_fails_with_invalid_options() {
        let result = ClientBuilder::new()
            .url("ws://127.0.0.1:1")
            .token("t")
            .options(ClientOptions::new().with_request_timeout(Duration::ZERO))
            .build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_device_only_is_enough() {
        assert!(
            ClientBuilder::new()
                .url("ws://127.0.0.1:1")
                .key_store(MemoryKeyStore::new())
                .build()
                .is_ok()
        );
        assert!(
            ClientBuilder::new()
                .url("ws://127.0.0.1:1")
                .device_signer(DeviceIdentity::generate())
                .build()
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_key_store_identity_is_created_once() {
        let client = ClientBuilder::new()
            .url("ws://127.0.0.1:1")
            .key_store(MemoryKeyStore::new())
            .build()
            .unwrap();

        let first = client.inner.device_signer().await.unwrap().unwrap();
        let second = client.inner.device_signer().await.unwrap().unwrap();
        assert_eq!(first.device_id(), second.device_id());
    }

    #[test]
    fn test_on_event_registered_first() {
        let client = ClientBuilder::new()
            .url("ws://127.0.0.1:1")
            .token("t")
            .on_event(|_| {})
            .build()
            .unwrap();
        assert_eq!(client.inner.dispatcher.len(), 1);
    }

    #[test]
    fn test_built_client_is_idle() {
        let client = ClientBuilder::new()
            .url("ws://127.0.0.1:1")
            .token("t")
            .build()
            .unwrap();
        assert_eq!(client.state(), ConnectionState::Idle);
        assert!(client.hello().is_none());
        assert_eq!(client.url().as_str(), "ws://127.0.0.1:1/");
    }
}
