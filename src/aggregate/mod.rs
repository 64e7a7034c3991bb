//! Aggregator — the fan-out/fan-in coordinator.
//!
//! For a single incoming request, the aggregator issues concurrent service
//! client calls, enforces one overall deadline across all of them, collects
//! partial results, and invokes the join engine. Client-level errors are
//! classified into [`GatewayError`] here; downstream components never see
//! raw transport errors.
//!
//! Failure policy: a *required* source (the parent collection of a
//! composite view) failing or missing the deadline aborts the whole
//! request. An *optional* enrichment source (the child collection) failing
//! degrades the response — parents are served with empty child lists and
//! the outcome is flagged so the envelope can mark the degradation.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, timeout_at};
use tracing::warn;

use crate::client::{ClientError, ServiceClient};
use crate::join::{JoinError, Joined, join_by_foreign_key};
use crate::model::Entity;

/// Request-level failures, classified from raw client errors.
///
/// Each variant maps to one machine-readable envelope kind and HTTP status;
/// see the envelope module for the mapping.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{service} did not respond within the request deadline")]
    UpstreamTimeout { service: &'static str },

    #[error("{service} is unavailable: {source}")]
    UpstreamUnavailable {
        service: &'static str,
        #[source]
        source: ClientError,
    },

    #[error("no matching {kind} entity for id {id:?}")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error("failed to encode response payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("internal failure: {0}")]
    Internal(String),
}

/// Result of a fan-out-and-join request.
///
/// Carries the raw collections alongside the composites: aggregate
/// statistics are computed from the raw collections (orphan children
/// count there even though they are dropped from composites), and
/// `degraded` names the optional source that failed, if any.
#[derive(Debug)]
pub struct JoinOutcome<P, C> {
    pub parents: Vec<P>,
    pub children: Vec<C>,
    pub composites: Vec<Joined<P, C>>,
    pub degraded: Option<&'static str>,
}

/// Fan-out/fan-in coordinator with a per-request deadline.
///
/// Owns no shared state; composites and statistics live only for the
/// request that produced them.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    deadline: Duration,
}

impl Aggregator {
    /// Creates an aggregator enforcing `deadline` per incoming request.
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// Fetches a single entity by id through one client.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotFound`] when the client reports no such entity;
    /// timeout and transport failures classified as usual.
    pub async fn fetch_single<C>(&self, port: &C, id: &str) -> Result<C::Entity, GatewayError>
    where
        C: ServiceClient + ?Sized,
    {
        let deadline = Instant::now() + self.deadline;
        let kind = C::Entity::KIND;
        let fetched = timeout_at(deadline, port.get_by_id(id))
            .await
            .map_err(|_| GatewayError::UpstreamTimeout { service: kind })?
            .map_err(|e| GatewayError::UpstreamUnavailable {
                service: kind,
                source: e,
            })?;
        fetched.ok_or_else(|| GatewayError::NotFound {
            kind,
            id: id.to_owned(),
        })
    }

    /// Fetches a collection through one client, optionally filtered
    /// server-side by foreign key.
    pub async fn fetch_list<C>(
        &self,
        port: &C,
        foreign_key: Option<&str>,
    ) -> Result<Vec<C::Entity>, GatewayError>
    where
        C: ServiceClient + ?Sized,
    {
        let deadline = Instant::now() + self.deadline;
        let kind = C::Entity::KIND;
        let fut = match foreign_key {
            Some(fk) => port.list_by_foreign_key(fk),
            None => port.list(),
        };
        timeout_at(deadline, fut)
            .await
            .map_err(|_| GatewayError::UpstreamTimeout { service: kind })?
            .map_err(|e| GatewayError::UpstreamUnavailable {
                service: kind,
                source: e,
            })
    }

    /// Issues the parent and child list calls concurrently, waits for both
    /// under a single overall deadline, and joins the results.
    ///
    /// The parent source is required: its failure (or deadline miss) fails
    /// the request. The child source is optional enrichment: its failure
    /// degrades the outcome to parents with empty child lists, flagged via
    /// [`JoinOutcome::degraded`]. In-flight calls are aborted best-effort
    /// once their result can no longer be used.
    pub async fn fetch_and_join<P, C>(
        &self,
        parent_port: &P,
        child_port: &C,
    ) -> Result<JoinOutcome<P::Entity, C::Entity>, GatewayError>
    where
        P: ServiceClient + ?Sized,
        C: ServiceClient + ?Sized,
    {
        let deadline = Instant::now() + self.deadline;

        // Fan out: both calls are in flight before either is awaited.
        let mut parent_task = tokio::spawn(parent_port.list());
        let mut child_task = tokio::spawn(child_port.list());

        let parents = match timeout_at(deadline, &mut parent_task).await {
            Err(_) => {
                parent_task.abort();
                child_task.abort();
                warn!(
                    service = P::Entity::KIND,
                    "required source missed the request deadline"
                );
                return Err(GatewayError::UpstreamTimeout {
                    service: P::Entity::KIND,
                });
            }
            Ok(Err(join_err)) => {
                child_task.abort();
                return Err(GatewayError::Internal(join_err.to_string()));
            }
            Ok(Ok(Err(client_err))) => {
                child_task.abort();
                return Err(GatewayError::UpstreamUnavailable {
                    service: P::Entity::KIND,
                    source: client_err,
                });
            }
            Ok(Ok(Ok(parents))) => parents,
        };

        let (children, degraded) = match timeout_at(deadline, &mut child_task).await {
            Err(_) => {
                child_task.abort();
                warn!(
                    service = C::Entity::KIND,
                    "optional source missed the request deadline — degrading"
                );
                (Vec::new(), true)
            }
            Ok(Err(join_err)) => {
                warn!(
                    service = C::Entity::KIND,
                    error = %join_err,
                    "optional source task failed — degrading"
                );
                (Vec::new(), true)
            }
            Ok(Ok(Err(client_err))) => {
                warn!(
                    service = C::Entity::KIND,
                    error = %client_err,
                    "optional source unavailable — degrading"
                );
                (Vec::new(), true)
            }
            Ok(Ok(Ok(children))) => (children, false),
        };

        let composites = join_by_foreign_key(&parents, &children)?;

        Ok(JoinOutcome {
            parents,
            children,
            composites,
            degraded: degraded.then_some(C::Entity::KIND),
        })
    }
}
