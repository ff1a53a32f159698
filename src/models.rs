use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PLACE_PREFIX: &str = "PLACE-";
pub const PRODUCT_PREFIX: &str = "PROD-";
pub const ORDER_PREFIX: &str = "ORDER-";

/// User identifiers are opaque: generated once at creation, never
/// recycled through the gap-filling allocator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub birthday: DateTime<Utc>,
    pub phone: String,
    pub email: String,
    pub user_name: String,
    pub pass: String,
    pub user_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaceType {
    Restaurant,
    Supermarket,
    Drugstore,
    Mechanic,
    Bar,
}

/// Coordinates are stored as text; parsing precision is the caller's
/// responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub description: String,
    pub latitude: String,
    pub longitude: String,
    pub address: String,
    pub place_type: PlaceType,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub rating: f32,
    #[serde(default)]
    pub schedule: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub photo: String,
    #[serde(default)]
    pub staff_amount: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: i64,
    #[serde(default)]
    pub photo: String,
    pub place_id: String,
}

/// Closed status set. No transition rules are enforced; any status can
/// be written at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Registered,
    Assigned,
    #[serde(rename = "On route")]
    OnRoute,
    Delivered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    /// Absent when the order is not placed at a registered place.
    #[serde(default)]
    pub place_id: Option<String>,
    pub date_time: DateTime<Utc>,
    pub status: OrderStatus,
    #[serde(default)]
    pub extras: String,
    pub total: i64,
    #[serde(default)]
    pub products: Vec<OrderLine>,
    /// Places suggested alongside this order.
    #[serde(default)]
    pub related: Vec<String>,
}

/// Projection returned by the login lookup.
#[derive(Debug, Clone, Serialize)]
pub struct LoginView {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub user_name: String,
    pub pass: String,
    pub user_type: String,
}

impl From<&User> for LoginView {
    fn from(user: &User) -> Self {
        LoginView {
            id: user.id.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            user_name: user.user_name.clone(),
            pass: user.pass.clone(),
            user_type: user.user_type.clone(),
        }
    }
}
