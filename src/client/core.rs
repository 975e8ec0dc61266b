//! Gateway client facade.
//!
//! [`GatewayClient`] is the only type the rest of an application needs.
//! It owns at most one live connection at a time and a background
//! supervisor task that opens, authenticates and re-opens it.
//!
//! # Example
//!
//! ```no_run
//! use gateway_client::{GatewayClient, Result};
//! use serde_json::json;
//!
//! # async fn example() -> Result<()> {
//! let client = GatewayClient::builder()
//!     .url("ws://127.0.0.1:18789")
//!     .token("secret")
//!     .on_hello(|hello| println!("connected as {}", hello.auth.role))
//!     .on_close(|close| println!("{close}"))
//!     .build()?;
//!
//! client.start();
//! let mut state = client.subscribe_state();
//! state.wait_for(|s| s.is_connected()).await.ok();
//!
//! let status = client.request("status", json!({})).await?;
//! println!("{status}");
//!
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{OnceCell, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::device::{AuthCache, DeviceSigner, KeyStore};
use crate::error::{Error, Result};
use crate::identifiers::{Generation, RequestIdAllocator, SubscriptionId};
use crate::protocol::{EventFrame, Request};
use crate::transport::{Connection, ConnectionState};

use super::builder::ClientBuilder;
use super::events::{EventDispatcher, StreamFilter, run_isolated};
use super::info::{CloseHandler, CloseInfo, Credentials, HelloHandler, HelloInfo};
use super::options::{ClientOptions, RequestOptions};
use super::supervisor;

// ============================================================================
// Constants
// ============================================================================

/// Params key carrying [`RequestOptions::idempotency_key`].
pub const IDEMPOTENCY_KEY_FIELD: &str = "idempotencyKey";

// ============================================================================
// Types
// ============================================================================

/// Where the device identity comes from.
pub(crate) enum DeviceSource {
    /// Loaded (or created) through a key store on first use.
    Store(Arc<dyn KeyStore>),
    /// Supplied directly.
    Signer(Arc<dyn DeviceSigner>),
}

/// Running supervisor task.
pub(crate) struct SupervisorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Whether a supervisor is running.
pub(crate) enum Lifecycle {
    /// Never started, or stopped by the owner.
    Stopped,
    /// Supervisor task is running.
    Running(SupervisorHandle),
    /// Supervisor gave up after the gateway rejected the credentials.
    Suspended,
}

/// Internal shared state for the client.
pub(crate) struct ClientInner {
    /// Gateway URL.
    pub url: Url,

    /// Timeouts, limits and reconnect policy.
    pub options: ClientOptions,

    /// Shared-secret credentials.
    pub credentials: RwLock<Credentials>,

    /// Bumped on every credential change.
    pub credentials_epoch: AtomicU64,

    /// Device identity source, if device auth is configured.
    pub device: Option<DeviceSource>,

    /// Resolved device signer.
    pub signer: OnceCell<Arc<dyn DeviceSigner>>,

    /// Device token cache.
    pub auth_cache: Option<Arc<dyn AuthCache>>,

    /// Lifecycle callbacks.
    pub on_hello: Option<HelloHandler>,
    pub on_close: Option<CloseHandler>,

    /// Event subscriptions (survive reconnects).
    pub dispatcher: EventDispatcher,

    /// Current connection state.
    pub state_tx: watch::Sender<ConnectionState>,

    /// The live connection, if any.
    pub connection: RwLock<Option<Connection>>,

    /// Result of the most recent hello.
    pub hello: RwLock<Option<HelloInfo>>,

    /// Request id source.
    pub request_ids: RequestIdAllocator,

    /// Last assigned connection generation.
    pub generation: AtomicU64,

    /// Supervisor task state.
    pub lifecycle: Mutex<Lifecycle>,
}

// ============================================================================
// ClientInner
// ============================================================================

impl ClientInner {
    /// Publishes a state transition.
    pub(crate) fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "State transition");
        }
    }

    /// Returns the current state.
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Returns the live connection, only while connected.
    pub(crate) fn active_connection(&self) -> Option<Connection> {
        if !self.state().is_connected() {
            return None;
        }
        self.connection.read().clone()
    }

    /// Installs a freshly authenticated connection.
    pub(crate) fn install(&self, connection: Connection, hello: HelloInfo) {
        *self.connection.write() = Some(connection);
        *self.hello.write() = Some(hello);
        self.set_state(ConnectionState::Connected);
    }

    /// Forgets the live connection.
    pub(crate) fn clear_connection(&self) {
        self.connection.write().take();
    }

    /// Assigns the next connection generation.
    pub(crate) fn next_generation(&self) -> Generation {
        Generation::new(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Returns the last assigned generation.
    pub(crate) fn current_generation(&self) -> Generation {
        Generation::new(self.generation.load(Ordering::SeqCst))
    }

    /// Returns the credential epoch.
    pub(crate) fn credentials_epoch(&self) -> u64 {
        self.credentials_epoch.load(Ordering::SeqCst)
    }

    /// Resolves the device signer, creating the identity on first use.
    ///
    /// Returns `Ok(None)` when device auth is not configured.
    pub(crate) async fn device_signer(&self) -> Result<Option<Arc<dyn DeviceSigner>>> {
        let Some(source) = &self.device else {
            return Ok(None);
        };

        let signer = self
            .signer
            .get_or_try_init(|| async {
                match source {
                    DeviceSource::Signer(signer) => Ok::<_, Error>(Arc::clone(signer)),
                    DeviceSource::Store(store) => {
                        let identity = store.load_or_create().await.map_err(|e| match e {
                            Error::Identity { .. } => e,
                            other => Error::identity(format!("key store: {other}")),
                        })?;
                        Ok(Arc::new(identity) as Arc<dyn DeviceSigner>)
                    }
                }
            })
            .await?;

        Ok(Some(Arc::clone(signer)))
    }

    /// Discards the cached device token, if a cache is configured.
    pub(crate) async fn clear_device_token(&self) -> Result<()> {
        match &self.auth_cache {
            Some(cache) => cache.clear().await,
            None => Ok(()),
        }
    }

    /// Invokes `on_hello`, containing panics.
    pub(crate) fn notify_hello(&self, hello: &HelloInfo) {
        if let Some(handler) = &self.on_hello
            && !run_isolated(|| handler(hello))
        {
            warn!(generation = %hello.generation, "on_hello handler panicked");
        }
    }

    /// Invokes `on_close`, containing panics.
    pub(crate) fn notify_close(&self, close: &CloseInfo) {
        if let Some(handler) = &self.on_close
            && !run_isolated(|| handler(close))
        {
            warn!(code = close.code, "on_close handler panicked");
        }
    }
}

// ============================================================================
// GatewayClient
// ============================================================================

/// Client for one gateway.
///
/// Cloning is cheap; clones share the connection, subscriptions and
/// supervisor.
#[derive(Clone)]
pub struct GatewayClient {
    /// Shared inner state.
    pub(crate) inner: Arc<ClientInner>,
}

// ============================================================================
// GatewayClient - Display
// ============================================================================

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("url", &self.inner.url.as_str())
            .field("state", &self.inner.state())
            .field("generation", &self.inner.current_generation())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// GatewayClient - Construction
// ============================================================================

impl GatewayClient {
    /// Creates a configuration builder for the client.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Assembles a client from validated builder parts.
    pub(crate) fn from_inner(inner: ClientInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

// ============================================================================
// GatewayClient - Lifecycle
// ============================================================================

impl GatewayClient {
    /// Starts connecting in the background.
    ///
    /// A no-op while the client is already starting, connected or
    /// reconnecting. After a credential rejection, `start()` tries again
    /// with the current credentials.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();

        if let Lifecycle::Running(handle) = &*lifecycle
            && !handle.task.is_finished()
        {
            debug!("Client already started");
            return;
        }

        *lifecycle = Lifecycle::Running(self.launch());
        info!(url = %self.inner.url, "Gateway client started");
    }

    /// Stops the client.
    ///
    /// Cancels any scheduled reconnect, closes the socket and fails all
    /// pending requests with [`Error::Stopped`]. Returns once the
    /// supervisor has exited and the state is `Idle`.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.inner.lifecycle.lock(), Lifecycle::Stopped);

        if let Lifecycle::Running(handle) = previous {
            let _ = handle.stop_tx.send(true);
            if let Err(e) = handle.task.await {
                warn!(error = %e, "Supervisor task failed");
            }
            info!("Gateway client stopped");
        }

        self.inner.clear_connection();
        self.inner.set_state(ConnectionState::Idle);
    }

    /// Replaces the shared-secret credentials.
    ///
    /// If automatic reconnection was suspended because the gateway
    /// rejected the previous credentials, it resumes.
    pub fn set_credentials(&self, credentials: Credentials) {
        let mut lifecycle = self.inner.lifecycle.lock();

        *self.inner.credentials.write() = credentials;
        self.inner.credentials_epoch.fetch_add(1, Ordering::SeqCst);

        if matches!(*lifecycle, Lifecycle::Suspended) {
            info!("Credentials updated, resuming");
            *lifecycle = Lifecycle::Running(self.launch());
        }
    }

    /// Discards the cached device token. The next connect signs afresh.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the token file cannot be removed.
    pub async fn logout(&self) -> Result<()> {
        self.inner.clear_device_token().await?;
        info!("Device token discarded");
        Ok(())
    }

    /// Spawns a supervisor task.
    fn launch(&self) -> SupervisorHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(supervisor::run(Arc::clone(&self.inner), stop_rx));
        SupervisorHandle { stop_tx, task }
    }
}

// ============================================================================
// GatewayClient - Requests
// ============================================================================

impl GatewayClient {
    /// Calls `method` and waits for its result.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless the client is connected
    /// - [`Error::Server`] if the gateway answered with an error
    /// - [`Error::RequestTimeout`] if no answer arrived in time
    /// - [`Error::ConnectionLost`] if the connection dropped first
    /// - [`Error::Stopped`] if the client was stopped first
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.request_with(method, params, RequestOptions::default())
            .await
    }

    /// Calls `method` with per-call options.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request), plus [`Error::Protocol`] if an
    /// idempotency key is set and `params` is not an object.
    pub async fn request_with(
        &self,
        method: &str,
        params: Value,
        options: RequestOptions,
    ) -> Result<Value> {
        let connection = self
            .inner
            .active_connection()
            .ok_or(Error::NotConnected)?;

        let params = match options.idempotency_key {
            Some(key) => with_idempotency_key(params, key)?,
            None => params,
        };
        let timeout = options.timeout.unwrap_or(self.inner.options.request_timeout);

        let request = Request::new(self.inner.request_ids.allocate(), method, params);
        debug!(
            request_id = %request.id,
            method,
            generation = %connection.generation(),
            "Request sent"
        );

        connection.request(request, timeout).await
    }

    /// Calls `method` with typed params and result.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request), plus [`Error::Json`] if the params
    /// cannot be serialized or the result does not match `T`.
    pub async fn request_as<P, T>(&self, method: &str, params: &P) -> Result<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let value = self.request(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Returns the number of in-flight requests on the live connection.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner
            .connection
            .read()
            .as_ref()
            .map_or(0, Connection::pending_count)
    }
}

/// Adds `idempotencyKey` to an object (or null) params value.
fn with_idempotency_key(params: Value, key: String) -> Result<Value> {
    match params {
        Value::Object(mut map) => {
            map.insert(IDEMPOTENCY_KEY_FIELD.to_string(), Value::String(key));
            Ok(Value::Object(map))
        }
        Value::Null => {
            let mut map = serde_json::Map::new();
            map.insert(IDEMPOTENCY_KEY_FIELD.to_string(), Value::String(key));
            Ok(Value::Object(map))
        }
        _ => Err(Error::protocol("idempotency key requires object params")),
    }
}

// ============================================================================
// GatewayClient - Events
// ============================================================================

impl GatewayClient {
    /// Registers an event handler.
    ///
    /// Handlers run on the connection task in registration order and
    /// must not block. They stay registered across reconnects.
    pub fn on<F>(&self, filter: impl Into<StreamFilter>, handler: F) -> SubscriptionId
    where
        F: Fn(&EventFrame) + Send + Sync + 'static,
    {
        self.inner
            .dispatcher
            .subscribe(filter.into(), Arc::new(handler))
    }

    /// Removes an event handler. Returns `false` if it was not registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.dispatcher.unsubscribe(id)
    }
}

// ============================================================================
// GatewayClient - State
// ============================================================================

impl GatewayClient {
    /// Returns the gateway URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Returns `true` while requests can be sent.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Returns a receiver that observes every state transition.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Returns the most recent hello result.
    #[must_use]
    pub fn hello(&self) -> Option<HelloInfo> {
        self.inner.hello.read().clone()
    }

    /// Returns the generation of the most recent connection.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.inner.current_generation()
    }
}

// ============================================================================
// Tests
// ============================================================================
