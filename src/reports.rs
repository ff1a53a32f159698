use crate::graph::RelationshipGraph;
use crate::models::Place;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

pub const TOP_PLACES_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub user_name: String,
    pub user_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductLine {
    pub name: String,
    pub quantity: u32,
}

/// One order of a user's history, with its product lines collected and
/// the place name absent when the order has no placedAt edge.
#[derive(Debug, Serialize)]
pub struct OrderHistoryEntry {
    pub user_id: String,
    pub user_first_name: String,
    pub user_last_name: String,
    pub order_id: String,
    pub total: i64,
    pub place_name: Option<String>,
    pub products: Vec<ProductLine>,
}

#[derive(Debug, Serialize)]
pub struct PlaceOrders {
    #[serde(flatten)]
    pub place: Place,
    pub orders_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreRef {
    pub place_id: String,
    pub place_name: String,
    pub place_description: String,
}

/// One qualifying order by another user at a shared place. Rows are not
/// deduplicated per user: two orders yield two rows.
#[derive(Debug, Serialize)]
pub struct RelatedOrder {
    pub user_id: String,
    pub user_first_name: String,
    pub user_last_name: String,
    pub place_id: String,
    pub place_name: String,
    pub date_time: DateTime<Utc>,
    pub order_id: String,
}

/// Empty `stores`/`other_users` means the user has no relation to report;
/// that is a valid result, not an error.
#[derive(Debug, Serialize)]
pub struct RelatedClientsReport {
    pub client_id: String,
    pub client_first_name: String,
    pub client_last_name: String,
    pub stores: Vec<StoreRef>,
    pub other_users: Vec<RelatedOrder>,
}

// Flat traversal row of the order-history query, one per
// (order, contains edge). Grouped into OrderHistoryEntry afterwards.
struct HistoryRow {
    order_id: String,
    total: i64,
    place_name: Option<String>,
    product_name: String,
    quantity: u32,
}

pub fn find_user(graph: &RelationshipGraph, user_id: &str) -> Option<UserView> {
    graph.user(user_id).map(|node| UserView {
        id: user_id.to_string(),
        first_name: node.first_name.clone(),
        last_name: node.last_name.clone(),
        user_name: node.user_name.clone(),
        user_type: node.user_type.clone(),
    })
}

/// Order history: User -made-> Order -contains-> Product, with the
/// optional Order -placedAt-> Place name. An order appears once it has
/// at least one resolvable contains edge.
pub fn user_order_history(graph: &RelationshipGraph, user_id: &str) -> Vec<OrderHistoryEntry> {
    let Some(user) = graph.user(user_id) else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    for order_id in graph.orders_of(user_id) {
        let Some(order) = graph.order(order_id) else {
            continue;
        };
        let place_name = order
            .place_id
            .as_deref()
            .and_then(|place_id| graph.place(place_id))
            .map(|place| place.name.clone());
        for (product_id, quantity) in &order.lines {
            let Some(product) = graph.product(product_id) else {
                continue;
            };
            rows.push(HistoryRow {
                order_id: order_id.clone(),
                total: order.total,
                place_name: place_name.clone(),
                product_name: product.name.clone(),
                quantity: *quantity,
            });
        }
    }

    // Regroup flat rows by order, preserving first-seen order.
    let mut entries: Vec<OrderHistoryEntry> = Vec::new();
    let mut by_order: HashMap<String, usize> = HashMap::new();
    for row in rows {
        let index = *by_order.entry(row.order_id.clone()).or_insert_with(|| {
            entries.push(OrderHistoryEntry {
                user_id: user_id.to_string(),
                user_first_name: user.first_name.clone(),
                user_last_name: user.last_name.clone(),
                order_id: row.order_id.clone(),
                total: row.total,
                place_name: row.place_name.clone(),
                products: Vec::new(),
            });
            entries.len() - 1
        });
        entries[index].products.push(ProductLine {
            name: row.product_name,
            quantity: row.quantity,
        });
    }
    entries
}

/// Distinct places reachable from any order made by a known user, full
/// attribute projection. No ordering guarantee.
pub fn places_with_orders(graph: &RelationshipGraph) -> Vec<Place> {
    let mut seen = HashSet::new();
    let mut places = Vec::new();
    for (_, order) in graph.orders() {
        if graph.user(&order.user_id).is_none() {
            continue;
        }
        let Some(place_id) = order.place_id.as_deref() else {
            continue;
        };
        if !seen.insert(place_id.to_string()) {
            continue;
        }
        if let Some(place) = graph.place(place_id) {
            places.push(place.clone());
        }
    }
    places
}

/// Top places by incoming order count: count descending, ties broken by
/// place id ascending, truncated to [`TOP_PLACES_LIMIT`].
pub fn top_places(graph: &RelationshipGraph) -> Vec<PlaceOrders> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for (_, order) in graph.orders() {
        if graph.user(&order.user_id).is_none() {
            continue;
        }
        if let Some(place_id) = order.place_id.as_deref() {
            if graph.place(place_id).is_some() {
                *counts.entry(place_id).or_insert(0) += 1;
            }
        }
    }

    let mut ranked: Vec<(&str, u64)> = counts.into_iter().collect();
    ranked.sort_by(|left, right| {
        right
            .1
            .cmp(&left.1)
            .then_with(|| left.0.cmp(right.0))
    });
    ranked.truncate(TOP_PLACES_LIMIT);

    ranked
        .into_iter()
        .filter_map(|(place_id, orders_amount)| {
            graph.place(place_id).map(|place| PlaceOrders {
                place: place.clone(),
                orders_amount,
            })
        })
        .collect()
}

/// Related users: every order by another user at any place the target
/// user has ordered from, plus the deduplicated list of the target
/// user's own places. Returns `None` when the user node is absent.
pub fn related_users(graph: &RelationshipGraph, user_id: &str) -> Option<RelatedClientsReport> {
    let user = graph.user(user_id)?;

    let mut my_places = HashSet::new();
    let mut stores = Vec::new();
    for order_id in graph.orders_of(user_id) {
        let Some(order) = graph.order(order_id) else {
            continue;
        };
        let Some(place_id) = order.place_id.as_deref() else {
            continue;
        };
        let Some(place) = graph.place(place_id) else {
            continue;
        };
        if my_places.insert(place_id.to_string()) {
            stores.push(StoreRef {
                place_id: place_id.to_string(),
                place_name: place.name.clone(),
                place_description: place.description.clone(),
            });
        }
    }

    let mut other_users = Vec::new();
    for (order_id, order) in graph.orders() {
        if order.user_id == user_id {
            continue;
        }
        let Some(other) = graph.user(&order.user_id) else {
            continue;
        };
        let Some(place_id) = order.place_id.as_deref() else {
            continue;
        };
        if !my_places.contains(place_id) {
            continue;
        }
        let Some(place) = graph.place(place_id) else {
            continue;
        };
        other_users.push(RelatedOrder {
            user_id: order.user_id.clone(),
            user_first_name: other.first_name.clone(),
            user_last_name: other.last_name.clone(),
            place_id: place_id.to_string(),
            place_name: place.name.clone(),
            date_time: order.date_time,
            order_id: order_id.clone(),
        });
    }
    // HashMap iteration order is arbitrary; pin the output.
    other_users.sort_by(|left, right| {
        left.order_id
            .cmp(&right.order_id)
            .then_with(|| left.user_id.cmp(&right.user_id))
    });

    Some(RelatedClientsReport {
        client_id: user_id.to_string(),
        client_first_name: user.first_name.clone(),
        client_last_name: user.last_name.clone(),
        stores,
        other_users,
    })
}
