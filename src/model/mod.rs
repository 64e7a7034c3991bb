//! Domain entities and the view shapes the gateway serves.
//!
//! Entities are immutable snapshots returned by one service client; the
//! gateway composes them but never mutates them. Field names serialize in
//! camelCase to match the frontend contract.

use serde::{Deserialize, Serialize};

/// A domain record fetched from exactly one service client.
///
/// `kind` names the backing service in logs, degradation markers, and
/// error envelopes; `foreign_key` links a child record to its parent
/// (order → owning user id).
pub trait Entity: Clone + Send + Sync + 'static {
    /// Logical collection name, e.g. `"users"` or `"orders"`.
    const KIND: &'static str;

    /// Opaque identifier of this record.
    fn id(&self) -> &str;

    /// Foreign key referencing a parent entity, where applicable.
    fn foreign_key(&self) -> Option<&str> {
        None
    }
}

/// A user record from the user service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

impl Entity for User {
    const KIND: &'static str = "users";

    fn id(&self) -> &str {
        &self.id
    }
}

/// An order record from the order service, owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub product_name: String,
    /// Amount in minor currency units.
    pub amount: u64,
    pub status: String,
    pub created_at: String,
}

impl Entity for Order {
    const KIND: &'static str = "orders";

    fn id(&self) -> &str {
        &self.id
    }

    fn foreign_key(&self) -> Option<&str> {
        Some(&self.user_id)
    }
}

/// A user annotated with their orders — the dashboard composite view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserWithOrders {
    #[serde(flatten)]
    pub user: User,
    pub orders: Vec<Order>,
}

impl UserWithOrders {
    pub fn new(user: User, orders: Vec<Order>) -> Self {
        Self { user, orders }
    }
}

/// Scalar reductions over the raw collections, recomputed per fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_orders: u64,
    pub total_revenue: u64,
    pub pending_orders: u64,
}

impl DashboardStats {
    /// Computes the statistics with a single pass over each collection.
    ///
    /// Pure function of its inputs: identical collections always produce
    /// identical statistics, independent of any join result.
    pub fn compute(users: &[User], orders: &[Order]) -> Self {
        let mut total_revenue = 0u64;
        let mut pending_orders = 0u64;
        for order in orders {
            total_revenue += order.amount;
            if order.status == "pending" {
                pending_orders += 1;
            }
        }
        Self {
            total_users: users.len() as u64,
            total_orders: orders.len() as u64,
            total_revenue,
            pending_orders,
        }
    }
}

/// The full dashboard payload: statistics plus composite views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub stats: DashboardStats,
    pub users_with_orders: Vec<UserWithOrders>,
}

/// Deterministic user dataset served when no upstream is configured.
pub fn sample_users() -> Vec<User> {
    vec![
        User {
            id: "1".into(),
            name: "Alice Zhang".into(),
            email: "alice@example.com".into(),
            created_at: "2024-01-15".into(),
        },
        User {
            id: "2".into(),
            name: "Bruno Lisi".into(),
            email: "bruno@example.com".into(),
            created_at: "2024-02-20".into(),
        },
        User {
            id: "3".into(),
            name: "Carla Wang".into(),
            email: "carla@example.com".into(),
            created_at: "2024-03-10".into(),
        },
    ]
}

/// Deterministic order dataset served when no upstream is configured.
pub fn sample_orders() -> Vec<Order> {
    vec![
        Order {
            id: "O1".into(),
            user_id: "1".into(),
            product_name: "MacBook Pro".into(),
            amount: 12999,
            status: "completed".into(),
            created_at: "2024-10-01".into(),
        },
        Order {
            id: "O2".into(),
            user_id: "1".into(),
            product_name: "iPhone 15".into(),
            amount: 7999,
            status: "pending".into(),
            created_at: "2024-10-15".into(),
        },
        Order {
            id: "O3".into(),
            user_id: "2".into(),
            product_name: "iPad Air".into(),
            amount: 4999,
            status: "completed".into(),
            created_at: "2024-10-10".into(),
        },
        Order {
            id: "O4".into(),
            user_id: "3".into(),
            product_name: "AirPods Pro".into(),
            amount: 1999,
            status: "shipped".into(),
            created_at: "2024-10-20".into(),
        },
    ]
}
