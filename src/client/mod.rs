//! Service client port — the uniform async interface the gateway uses to
//! fetch remote data.
//!
//! Every backend service is reached through [`ServiceClient`], which exposes
//! the capability set `{list, get_by_id, list_by_foreign_key}`. Two
//! implementations are provided:
//!
//! - [`RemoteClient`] — a real network client speaking HTTP/1.1 + JSON.
//! - [`FixtureClient`] — deterministic in-memory data with injectable
//!   latency and a runtime fault switch, so timeout and partial-failure
//!   paths are testable without a network.
//!
//! The gateway never assumes ordering between two client calls issued
//! concurrently, and never assumes zero latency.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::model::Entity;

/// Boxed future returned by every client call.
pub type ClientFuture<T> = Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send>>;

/// Errors surfaced by service client implementations.
///
/// These are raw transport-level failures; the aggregator classifies them
/// into the gateway error taxonomy at its boundary.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed upstream response: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },

    #[error("failed to decode upstream payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Uniform asynchronous interface for fetching one kind of entity.
///
/// Implementations may succeed with data or fail with a transport error;
/// sibling calls have no ordering guarantee.
pub trait ServiceClient: Send + Sync {
    /// The entity kind this client fetches.
    type Entity: Entity;

    /// Fetches the full collection.
    fn list(&self) -> ClientFuture<Vec<Self::Entity>>;

    /// Fetches a single entity by id; `Ok(None)` when absent.
    fn get_by_id(&self, id: &str) -> ClientFuture<Option<Self::Entity>>;

    /// Fetches the entities whose foreign key equals `parent_id`.
    ///
    /// The default implementation filters [`list`](Self::list) client-side;
    /// implementations backed by a service that can filter server-side
    /// should override it.
    fn list_by_foreign_key(&self, parent_id: &str) -> ClientFuture<Vec<Self::Entity>> {
        let all = self.list();
        let parent_id = parent_id.to_owned();
        Box::pin(async move {
            let entities = all.await?;
            Ok(entities
                .into_iter()
                .filter(|e| e.foreign_key() == Some(parent_id.as_str()))
                .collect())
        })
    }
}

/// Shared handle that lets a test flip a [`FixtureClient`] into a failing
/// state at runtime.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch(Arc<AtomicBool>);

impl FaultSwitch {
    /// Makes every subsequent call fail with a transport error.
    pub fn trip(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Restores normal operation.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    fn is_tripped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deterministic in-memory service client.
///
/// The dataset is constructor-injected and immutable; there is no ambient
/// global state. Latency is simulated with a tokio sleep so paused-clock
/// tests can drive it deterministically, and [`FaultSwitch`] injects
/// transport failures on demand.
pub struct FixtureClient<T> {
    data: Arc<Vec<T>>,
    latency: Duration,
    fault: FaultSwitch,
    calls: Arc<AtomicUsize>,
}

impl<T: Entity> FixtureClient<T> {
    /// Creates a client serving the given snapshot with no latency.
    pub fn new(data: Vec<T>) -> Self {
        Self {
            data: Arc::new(data),
            latency: Duration::ZERO,
            fault: FaultSwitch::default(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sets the simulated per-call latency.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Returns a handle for injecting transport failures.
    pub fn fault_switch(&self) -> FaultSwitch {
        self.fault.clone()
    }

    /// Returns how many calls this client has received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn simulate<R, F>(&self, produce: F) -> ClientFuture<R>
    where
        R: Send + 'static,
        F: FnOnce(&[T]) -> R + Send + 'static,
    {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let data = Arc::clone(&self.data);
        let latency = self.latency;
        let fault = self.fault.clone();
        Box::pin(async move {
            if latency > Duration::ZERO {
                tokio::time::sleep(latency).await;
            }
            if fault.is_tripped() {
                return Err(ClientError::Transport("simulated outage".into()));
            }
            Ok(produce(&data))
        })
    }
}

impl<T: Entity> ServiceClient for FixtureClient<T> {
    type Entity = T;

    fn list(&self) -> ClientFuture<Vec<T>> {
        debug!(kind = T::KIND, "fixture list()");
        self.simulate(|data| data.to_vec())
    }

    fn get_by_id(&self, id: &str) -> ClientFuture<Option<T>> {
        debug!(kind = T::KIND, id, "fixture get_by_id()");
        let id = id.to_owned();
        self.simulate(move |data| data.iter().find(|e| e.id() == id).cloned())
    }

    fn list_by_foreign_key(&self, parent_id: &str) -> ClientFuture<Vec<T>> {
        debug!(kind = T::KIND, parent_id, "fixture list_by_foreign_key()");
        let parent_id = parent_id.to_owned();
        self.simulate(move |data| {
            data.iter()
                .filter(|e| e.foreign_key() == Some(parent_id.as_str()))
                .cloned()
                .collect()
        })
    }
}

/// Network-backed service client speaking HTTP/1.1 + JSON.
///
/// Issues one short-lived `Connection: close` request per call against
/// `http://{addr}/{resource}[...]` and decodes the bare JSON body. The
/// upstream contract is:
///
/// - `GET /{resource}` — full collection as a JSON array.
/// - `GET /{resource}/{id}` — single object, `404` when absent.
/// - `GET /{resource}?{fk_param}={id}` — server-side filtered collection.
pub struct RemoteClient<T> {
    addr: String,
    resource: String,
    fk_param: String,
    _entity: PhantomData<fn() -> T>,
}

impl<T> RemoteClient<T>
where
    T: Entity + DeserializeOwned,
{
    /// Creates a client for `resource` (e.g. `"users"`) at `addr`
    /// (`host:port`). Foreign-key filtering defaults to the query
    /// parameter `parentId`; override it with
    /// [`foreign_key_param`](Self::foreign_key_param).
    pub fn new(addr: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            resource: resource.into(),
            fk_param: "parentId".into(),
            _entity: PhantomData,
        }
    }

    /// Sets the query parameter used for server-side foreign-key filtering.
    #[must_use]
    pub fn foreign_key_param(mut self, param: impl Into<String>) -> Self {
        self.fk_param = param.into();
        self
    }

    fn call(&self, target: String) -> UpstreamCall {
        UpstreamCall {
            addr: self.addr.clone(),
            target,
        }
    }
}

impl<T> ServiceClient for RemoteClient<T>
where
    T: Entity + DeserializeOwned,
{
    type Entity = T;

    fn list(&self) -> ClientFuture<Vec<T>> {
        let call = self.call(format!("/{}", self.resource));
        Box::pin(async move { call.fetch().await })
    }

    fn get_by_id(&self, id: &str) -> ClientFuture<Option<T>> {
        let call = self.call(format!("/{}/{}", self.resource, id));
        Box::pin(async move {
            match call.fetch::<T>().await {
                Ok(entity) => Ok(Some(entity)),
                Err(ClientError::Status { status: 404 }) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    fn list_by_foreign_key(&self, parent_id: &str) -> ClientFuture<Vec<T>> {
        let call = self.call(format!(
            "/{}?{}={}",
            self.resource, self.fk_param, parent_id
        ));
        Box::pin(async move { call.fetch().await })
    }
}

/// One upstream HTTP round trip, owned so the boxed future is `'static`.
struct UpstreamCall {
    addr: String,
    target: String,
}

impl UpstreamCall {
    /// Maximum number of headers we accept in an upstream response.
    const MAX_HEADERS: usize = 64;

    async fn fetch<R: DeserializeOwned>(self) -> Result<R, ClientError> {
        debug!(addr = %self.addr, target = %self.target, "upstream request");

        let mut stream = TcpStream::connect(&self.addr).await?;
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nAccept: application/json\r\nConnection: close\r\n\r\n",
            self.target, self.addr
        );
        stream.write_all(request.as_bytes()).await?;

        // Connection: close — the response ends at EOF.
        let mut buf = Vec::with_capacity(4096);
        stream.read_to_end(&mut buf).await?;

        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut response = httparse::Response::new(&mut headers);
        let body_offset = match response.parse(&buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => {
                return Err(ClientError::Transport(
                    "truncated upstream response".into(),
                ));
            }
        };

        let status = response
            .code
            .ok_or_else(|| ClientError::Transport("upstream response missing status".into()))?;
        if !(200..300).contains(&status) {
            return Err(ClientError::Status { status });
        }

        Ok(serde_json::from_slice(&buf[body_offset..])?)
    }
}
