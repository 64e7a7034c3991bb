//! # viewgate
//!
//! A backend-for-frontend aggregation gateway: one HTTP surface that fans
//! out to backend services, joins their results into composite views, and
//! caches responses per route.
//!
//! Every route serves the same envelope shape (`success`, `data`,
//! `timestamp`), cached routes serve byte-identical payloads until they
//! are recomputed, and a failed optional source degrades the view instead
//! of failing the request.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use viewgate::client::FixtureClient;
//! use viewgate::config::GatewayConfig;
//! use viewgate::model::{sample_orders, sample_users};
//! use viewgate::routes::{Gateway, build_router};
//! use viewgate::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::default();
//!     let gateway = Arc::new(Gateway::new(
//!         Arc::new(FixtureClient::new(sample_users())),
//!         Arc::new(FixtureClient::new(sample_orders())),
//!         &config,
//!     ));
//!     let router = Arc::new(build_router(gateway));
//!
//!     let server = Server::bind(&config.bind_addr).await?;
//!     server
//!         .run(move |req| {
//!             let router = Arc::clone(&router);
//!             async move { router.route(req).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod envelope;
pub mod http;
pub mod join;
pub mod model;
pub mod router;
pub mod routes;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
