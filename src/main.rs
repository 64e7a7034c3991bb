use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use viewgate::client::{FixtureClient, RemoteClient, ServiceClient};
use viewgate::config::GatewayConfig;
use viewgate::model::{Order, User, sample_orders, sample_users};
use viewgate::routes::{Gateway, build_router};
use viewgate::server::Server;

/// Simulated backend latency when running against fixture data.
const FIXTURE_LATENCY: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!(path = %path, "loading configuration");
            GatewayConfig::load(&path)?
        }
        None => GatewayConfig::default(),
    };

    let (users, orders): (
        Arc<dyn ServiceClient<Entity = User>>,
        Arc<dyn ServiceClient<Entity = Order>>,
    ) = match &config.upstream {
        Some(upstream) => {
            info!(
                users = %upstream.users,
                orders = %upstream.orders,
                "using remote backend services"
            );
            (
                Arc::new(RemoteClient::new(&upstream.users, "users")),
                Arc::new(RemoteClient::new(&upstream.orders, "orders").foreign_key_param("userId")),
            )
        }
        None => {
            info!("no upstream configured, serving fixture data");
            (
                Arc::new(FixtureClient::new(sample_users()).with_latency(FIXTURE_LATENCY)),
                Arc::new(FixtureClient::new(sample_orders()).with_latency(FIXTURE_LATENCY)),
            )
        }
    };

    let gateway = Arc::new(Gateway::new(users, orders, &config));
    let router = Arc::new(build_router(gateway));

    let server = Server::bind(&config.bind_addr).await?;
    server
        .run(move |req| {
            let router = Arc::clone(&router);
            async move { router.route(req).await }
        })
        .await?;

    Ok(())
}
