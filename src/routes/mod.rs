//! The gateway's HTTP surface.
//!
//! Each handler resolves the route's cache policy, then asks the cache to
//! serve or recompute. Compute functions fan out through the aggregator
//! and wrap results in the uniform envelope, so a cached response is
//! byte-identical to the response that populated it.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::aggregate::{Aggregator, GatewayError};
use crate::cache::{ComputeFn, PolicyTable, RouteCache};
use crate::client::ServiceClient;
use crate::config::GatewayConfig;
use crate::context::Context;
use crate::envelope;
use crate::model::{DashboardData, DashboardStats, Order, User, UserWithOrders};
use crate::{Response, Router, StatusCode};

/// Shared handle to the user service client.
pub type UserClient = Arc<dyn ServiceClient<Entity = User>>;
/// Shared handle to the order service client.
pub type OrderClient = Arc<dyn ServiceClient<Entity = Order>>;

/// Everything a request handler needs: the service clients, the fan-out
/// coordinator, and the shared cache with its policy table.
pub struct Gateway {
    users: UserClient,
    orders: OrderClient,
    aggregator: Aggregator,
    cache: RouteCache,
    policies: PolicyTable,
}

impl Gateway {
    /// Assembles a gateway from its clients and configuration.
    pub fn new(users: UserClient, orders: OrderClient, config: &GatewayConfig) -> Self {
        Self {
            users,
            orders,
            aggregator: Aggregator::new(config.request_deadline()),
            cache: RouteCache::new(),
            policies: config.policy_table(),
        }
    }

    /// Serves one request through the cache policy resolver.
    ///
    /// The cache key is the full request target (path plus query), so
    /// `/api/orders?userId=1` and `/api/orders` cache independently.
    async fn serve(&self, ctx: &Context, compute: ComputeFn) -> Response {
        let start = tokio::time::Instant::now();
        let path = ctx.request().path();
        let key = match ctx.request().query_string() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_owned(),
        };
        let policy = self.policies.resolve(path);

        let response = match self.cache.respond(&key, policy, compute).await {
            Ok(body) => Response::json(StatusCode::Ok, body),
            Err(err) => {
                match &err {
                    GatewayError::NotFound { .. } => {
                        info!(path, error = %err, "lookup found nothing");
                    }
                    GatewayError::Join(_) | GatewayError::Encode(_) | GatewayError::Internal(_) => {
                        error!(path, error = %err, "internal failure");
                    }
                    _ => warn!(path, error = %err, "upstream failure"),
                }
                let (status, body) = envelope::from_error(&err);
                Response::json(status, body)
            }
        };

        info!(
            key = %key,
            status = response.status().as_u16(),
            elapsed = ?start.elapsed(),
            "request served"
        );
        response
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Landing {
    service: &'static str,
    version: &'static str,
    endpoints: &'static [&'static str],
}

const LANDING: Landing = Landing {
    service: "viewgate",
    version: env!("CARGO_PKG_VERSION"),
    endpoints: &[
        "/api/users",
        "/api/users/:id",
        "/api/orders",
        "/api/dashboard",
    ],
};

fn landing_compute() -> ComputeFn {
    Arc::new(|| Box::pin(async { envelope::success(&LANDING) }))
}

fn users_compute(gw: &Arc<Gateway>) -> ComputeFn {
    let gw = Arc::clone(gw);
    Arc::new(move || {
        let gw = Arc::clone(&gw);
        Box::pin(async move {
            let users = gw.aggregator.fetch_list(gw.users.as_ref(), None).await?;
            envelope::success(&users)
        })
    })
}

fn user_by_id_compute(gw: &Arc<Gateway>, id: String) -> ComputeFn {
    let gw = Arc::clone(gw);
    Arc::new(move || {
        let gw = Arc::clone(&gw);
        let id = id.clone();
        Box::pin(async move {
            let user = gw.aggregator.fetch_single(gw.users.as_ref(), &id).await?;
            envelope::success(&user)
        })
    })
}

fn orders_compute(gw: &Arc<Gateway>, user_id: Option<String>) -> ComputeFn {
    let gw = Arc::clone(gw);
    Arc::new(move || {
        let gw = Arc::clone(&gw);
        let user_id = user_id.clone();
        Box::pin(async move {
            let orders = gw
                .aggregator
                .fetch_list(gw.orders.as_ref(), user_id.as_deref())
                .await?;
            envelope::success(&orders)
        })
    })
}

fn dashboard_compute(gw: &Arc<Gateway>) -> ComputeFn {
    let gw = Arc::clone(gw);
    Arc::new(move || {
        let gw = Arc::clone(&gw);
        Box::pin(async move {
            let outcome = gw
                .aggregator
                .fetch_and_join(gw.users.as_ref(), gw.orders.as_ref())
                .await?;
            let stats = DashboardStats::compute(&outcome.parents, &outcome.children);
            let users_with_orders: Vec<UserWithOrders> = outcome
                .composites
                .into_iter()
                .map(|joined| UserWithOrders::new(joined.parent, joined.children))
                .collect();
            let data = DashboardData {
                stats,
                users_with_orders,
            };
            match outcome.degraded {
                Some(source) => {
                    warn!(source, "dashboard served without optional enrichment");
                    envelope::degraded(&data, &[source])
                }
                None => envelope::success(&data),
            }
        })
    })
}

fn direct(result: Result<bytes::Bytes, GatewayError>) -> Response {
    match result {
        Ok(body) => Response::json(StatusCode::Ok, body),
        Err(err) => {
            let (status, body) = envelope::from_error(&err);
            Response::json(status, body)
        }
    }
}

/// Registers the full gateway surface on a fresh router.
pub fn build_router(gateway: Arc<Gateway>) -> Router {
    let mut router = Router::new();

    // Liveness probe: plain JSON, no envelope, never cached.
    router.get("/health", |_ctx| async {
        Response::json(StatusCode::Ok, r#"{"status":"ok","service":"viewgate"}"#)
    });

    {
        let gw = Arc::clone(&gateway);
        router.get("/", move |ctx| {
            let gw = Arc::clone(&gw);
            async move { gw.serve(&ctx, landing_compute()).await }
        });
    }

    {
        let gw = Arc::clone(&gateway);
        router.get("/api/users", move |ctx| {
            let gw = Arc::clone(&gw);
            async move {
                let compute = users_compute(&gw);
                gw.serve(&ctx, compute).await
            }
        });
    }

    {
        let gw = Arc::clone(&gateway);
        router.get("/api/users/:id", move |ctx: Context| {
            let gw = Arc::clone(&gw);
            async move {
                let id = ctx.params().get("id").unwrap_or_default().to_owned();
                let compute = user_by_id_compute(&gw, id);
                gw.serve(&ctx, compute).await
            }
        });
    }

    {
        let gw = Arc::clone(&gateway);
        router.get("/api/orders", move |ctx: Context| {
            let gw = Arc::clone(&gw);
            async move {
                let user_id = ctx.query_param("userId").map(str::to_owned);
                let compute = orders_compute(&gw, user_id);
                gw.serve(&ctx, compute).await
            }
        });
    }

    {
        let gw = Arc::clone(&gateway);
        router.get("/api/dashboard", move |ctx| {
            let gw = Arc::clone(&gw);
            async move {
                let compute = dashboard_compute(&gw);
                gw.serve(&ctx, compute).await
            }
        });
    }

    // Explicit invalidation for statically cached routes:
    // `?key=/route` clears one entry, no query clears everything.
    {
        let gw = Arc::clone(&gateway);
        router.post("/admin/invalidate", move |ctx: Context| {
            let gw = Arc::clone(&gw);
            async move {
                let cleared = match ctx.query_param("key") {
                    Some(key) => usize::from(gw.cache.invalidate(key)),
                    None => gw.cache.invalidate_all(),
                };
                info!(cleared, "cache invalidated");
                direct(envelope::success(&serde_json::json!({ "invalidated": cleared })))
            }
        });
    }

    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{FaultSwitch, FixtureClient};
    use crate::http::Request;
    use crate::model::{sample_orders, sample_users};
    use serde_json::Value;

    struct Harness {
        router: Router,
        users: Arc<FixtureClient<User>>,
        orders: Arc<FixtureClient<Order>>,
        user_fault: FaultSwitch,
        order_fault: FaultSwitch,
    }

    fn harness() -> Harness {
        let users = Arc::new(FixtureClient::new(sample_users()));
        let orders = Arc::new(FixtureClient::new(sample_orders()));
        let user_fault = users.fault_switch();
        let order_fault = orders.fault_switch();

        let user_port: UserClient = users.clone();
        let order_port: OrderClient = orders.clone();
        let gateway = Arc::new(Gateway::new(
            user_port,
            order_port,
            &GatewayConfig::default(),
        ));
        Harness {
            router: build_router(gateway),
            users,
            orders,
            user_fault,
            order_fault,
        }
    }

    fn make_request(method: &str, target: &str) -> Request {
        let raw = format!("{method} {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    /// Splits a serialized response into its status and parsed JSON body.
    fn json_body(response: Response) -> (u16, Value) {
        let status = response.status().as_u16();
        let wire = response.into_bytes();
        let split = wire
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("header terminator");
        let value = serde_json::from_slice(&wire[split + 4..]).expect("JSON body");
        (status, value)
    }

    async fn get(harness: &Harness, target: &str) -> (u16, Value) {
        json_body(harness.router.route(make_request("GET", target)).await)
    }

    #[tokio::test]
    async fn list_users() {
        let h = harness();
        let (status, body) = get(&h, "/api/users").await;
        assert_eq!(status, 200);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"].as_array().unwrap().len(), 3);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn get_user_by_id() {
        let h = harness();
        let (status, body) = get(&h, "/api/users/2").await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["name"], "Bruno Lisi");
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let h = harness();
        let (status, body) = get(&h, "/api/users/99").await;
        assert_eq!(status, 404);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "NotFound");
    }

    #[tokio::test]
    async fn orders_filterable_by_user() {
        let h = harness();
        let (_, body) = get(&h, "/api/orders").await;
        assert_eq!(body["data"].as_array().unwrap().len(), 4);

        let (_, body) = get(&h, "/api/orders?userId=1").await;
        let ids: Vec<_> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["O1", "O2"]);
    }

    #[tokio::test]
    async fn dashboard_aggregates_and_joins() {
        let h = harness();
        let (status, body) = get(&h, "/api/dashboard").await;
        assert_eq!(status, 200);
        assert_eq!(body["success"], true);
        assert!(body.get("degraded").is_none());

        let stats = &body["data"]["stats"];
        assert_eq!(stats["totalUsers"], 3);
        assert_eq!(stats["totalOrders"], 4);
        assert_eq!(stats["totalRevenue"], 27996);
        assert_eq!(stats["pendingOrders"], 1);

        let first = &body["data"]["usersWithOrders"][0];
        assert_eq!(first["id"], "1");
        assert_eq!(first["orders"][0]["id"], "O1");
        assert_eq!(first["orders"][1]["id"], "O2");
    }

    #[tokio::test]
    async fn orphan_orders_count_in_stats_but_not_in_composites() {
        let mut orders = sample_orders();
        orders.push(Order {
            id: "O5".into(),
            user_id: "999".into(),
            product_name: "Mystery Box".into(),
            amount: 500,
            status: "pending".into(),
            created_at: "2024-11-01".into(),
        });
        let users: UserClient = Arc::new(FixtureClient::new(sample_users()));
        let orders: OrderClient = Arc::new(FixtureClient::new(orders));
        let gateway = Arc::new(Gateway::new(users, orders, &GatewayConfig::default()));
        let router = build_router(gateway);

        let (_, body) = json_body(router.route(make_request("GET", "/api/dashboard")).await);
        let stats = &body["data"]["stats"];
        assert_eq!(stats["totalOrders"], 5);
        assert_eq!(stats["totalRevenue"], 28496);
        assert_eq!(stats["pendingOrders"], 2);

        let attached: usize = body["data"]["usersWithOrders"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["orders"].as_array().unwrap().len())
            .sum();
        assert_eq!(attached, 4); // O5 has no parent and is dropped from composites
    }

    #[tokio::test]
    async fn dashboard_degrades_when_orders_fail() {
        let h = harness();
        h.order_fault.trip();

        let (status, body) = get(&h, "/api/dashboard").await;
        assert_eq!(status, 200);
        assert_eq!(body["success"], true);
        assert_eq!(body["degraded"][0], "orders");

        let views = body["data"]["usersWithOrders"].as_array().unwrap();
        assert_eq!(views.len(), 3);
        assert!(views.iter().all(|v| v["orders"].as_array().unwrap().is_empty()));

        let stats = &body["data"]["stats"];
        assert_eq!(stats["totalUsers"], 3);
        assert_eq!(stats["totalOrders"], 0);
    }

    #[tokio::test]
    async fn dashboard_fails_when_users_fail() {
        let h = harness();
        h.user_fault.trip();
        h.order_fault.trip();

        let (status, body) = get(&h, "/api/dashboard").await;
        assert_eq!(status, 502);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "UpstreamUnavailable");
    }

    #[tokio::test]
    async fn swr_route_serves_from_cache() {
        let h = harness();
        let (_, first) = get(&h, "/api/users").await;
        let (_, second) = get(&h, "/api/users").await;
        assert_eq!(first, second);
        assert_eq!(h.users.calls(), 1); // second response came from cache
    }

    #[tokio::test]
    async fn failed_responses_are_not_cached() {
        let h = harness();
        h.user_fault.trip();
        let (status, _) = get(&h, "/api/users").await;
        assert_eq!(status, 502);

        h.user_fault.reset();
        let (status, body) = get(&h, "/api/users").await;
        assert_eq!(status, 200);
        assert_eq!(body["data"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn orders_cache_keys_include_the_query() {
        let h = harness();
        let (_, all) = get(&h, "/api/orders").await;
        let (_, filtered) = get(&h, "/api/orders?userId=3").await;
        assert_eq!(all["data"].as_array().unwrap().len(), 4);
        assert_eq!(filtered["data"].as_array().unwrap().len(), 1);
        assert_eq!(h.orders.calls(), 2);
    }

    #[tokio::test]
    async fn landing_is_static_until_invalidated() {
        let h = harness();
        let (_, first) = get(&h, "/").await;
        assert_eq!(first["data"]["service"], "viewgate");
        let (_, second) = get(&h, "/").await;
        assert_eq!(first, second);

        let res = h
            .router
            .route(make_request("POST", "/admin/invalidate?key=/"))
            .await;
        let (status, body) = json_body(res);
        assert_eq!(status, 200);
        assert_eq!(body["data"]["invalidated"], 1);
    }

    #[tokio::test]
    async fn invalidate_all_reports_count() {
        let h = harness();
        get(&h, "/").await;
        get(&h, "/api/users").await;

        let res = h
            .router
            .route(make_request("POST", "/admin/invalidate"))
            .await;
        let (_, body) = json_body(res);
        assert_eq!(body["data"]["invalidated"], 2);
    }

    #[tokio::test]
    async fn health_is_plain_json() {
        let h = harness();
        let (status, body) = get(&h, "/health").await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
        assert!(body.get("success").is_none());
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let h = harness();
        let res = h.router.route(make_request("GET", "/api/unknown")).await;
        assert_eq!(res.status().as_u16(), 404);
    }
}
