use crate::models::{Order, Place, Product, User};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// User attributes mirrored into the graph. Credentials stay in the
/// primary store.
#[derive(Debug, Clone)]
pub struct UserNode {
    pub first_name: String,
    pub last_name: String,
    pub user_name: String,
    pub user_type: String,
}

#[derive(Debug, Clone)]
pub struct OrderNode {
    pub user_id: String,
    /// Target of the optional placedAt edge.
    pub place_id: Option<String>,
    pub date_time: DateTime<Utc>,
    pub total: i64,
    /// contains(quantity) edges, in document order.
    pub lines: Vec<(String, u32)>,
}

/// Denormalized projection of the primary store: one node per entity,
/// edges User -made-> Order -placedAt-> Place and
/// Order -contains(quantity)-> Product. Node keys equal primary-store
/// identifiers. The projection is rebuilt from the store at startup and
/// kept current by the mutation handlers; the store stays the system of
/// record.
#[derive(Debug, Default)]
pub struct RelationshipGraph {
    users: HashMap<String, UserNode>,
    places: HashMap<String, Place>,
    products: HashMap<String, Product>,
    orders: HashMap<String, OrderNode>,
    made: HashMap<String, Vec<String>>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities(
        users: &[User],
        places: &[Place],
        products: &[Product],
        orders: &[Order],
    ) -> Self {
        let mut graph = Self::new();
        for user in users {
            graph.upsert_user(user);
        }
        for place in places {
            graph.upsert_place(place);
        }
        for product in products {
            graph.upsert_product(product);
        }
        for order in orders {
            graph.upsert_order(order);
        }
        graph
    }

    pub fn upsert_user(&mut self, user: &User) {
        self.users.insert(
            user.id.clone(),
            UserNode {
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
                user_name: user.user_name.clone(),
                user_type: user.user_type.clone(),
            },
        );
    }

    pub fn remove_user(&mut self, id: &str) {
        self.users.remove(id);
        self.made.remove(id);
    }

    pub fn upsert_place(&mut self, place: &Place) {
        self.places.insert(place.id.clone(), place.clone());
    }

    pub fn remove_place(&mut self, id: &str) {
        self.places.remove(id);
    }

    pub fn upsert_product(&mut self, product: &Product) {
        self.products.insert(product.id.clone(), product.clone());
    }

    pub fn remove_product(&mut self, id: &str) {
        self.products.remove(id);
    }

    pub fn upsert_order(&mut self, order: &Order) {
        // A replace may move the order to another user; the old made
        // edge has to go first.
        let stale_user = match self.orders.get(&order.id) {
            Some(previous) if previous.user_id != order.user_id => {
                Some(previous.user_id.clone())
            }
            _ => None,
        };
        if let Some(user_id) = stale_user {
            self.unlink_made(&user_id, &order.id);
        }
        self.orders.insert(
            order.id.clone(),
            OrderNode {
                user_id: order.user_id.clone(),
                place_id: order.place_id.clone(),
                date_time: order.date_time,
                total: order.total,
                lines: order
                    .products
                    .iter()
                    .map(|line| (line.product_id.clone(), line.quantity))
                    .collect(),
            },
        );
        let orders = self.made.entry(order.user_id.clone()).or_default();
        if !orders.iter().any(|id| id == &order.id) {
            orders.push(order.id.clone());
        }
    }

    pub fn remove_order(&mut self, id: &str) {
        if let Some(node) = self.orders.remove(id) {
            self.unlink_made(&node.user_id, id);
        }
    }

    fn unlink_made(&mut self, user_id: &str, order_id: &str) {
        if let Some(orders) = self.made.get_mut(user_id) {
            orders.retain(|id| id != order_id);
            if orders.is_empty() {
                self.made.remove(user_id);
            }
        }
    }

    pub fn user(&self, id: &str) -> Option<&UserNode> {
        self.users.get(id)
    }

    pub fn place(&self, id: &str) -> Option<&Place> {
        self.places.get(id)
    }

    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.get(id)
    }

    pub fn order(&self, id: &str) -> Option<&OrderNode> {
        self.orders.get(id)
    }

    /// Orders reachable from a user through made edges, in insertion
    /// order. Empty when the user has none.
    pub fn orders_of(&self, user_id: &str) -> &[String] {
        self.made.get(user_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn orders(&self) -> impl Iterator<Item = (&String, &OrderNode)> {
        self.orders.iter()
    }
}
