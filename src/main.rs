use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use redb::Database;
use serde_json::json;
use std::{env, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod error;
mod graph;
mod ids;
mod models;
mod reports;
mod store;

use error::{ApiError, StoreError};
use graph::RelationshipGraph;
use ids::Allocators;
use models::{
    LoginView, ORDER_PREFIX, Order, PLACE_PREFIX, PRODUCT_PREFIX, Place, PlaceType, Product, User,
};
use store::{Collection, RedbCollection};

const DB_PATH: &str = "entrega.redb";

#[derive(Clone)]
struct AppState {
    db: Arc<Database>,
    graph: Arc<RwLock<RelationshipGraph>>,
    allocators: Arc<Allocators>,
    api_key: Arc<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let api_key = env::var("ENTREGA_API_KEY").map_err(|_| "ENTREGA_API_KEY not set")?;
    let host = env::var("ENTREGA_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("ENTREGA_PORT").unwrap_or_else(|_| "3000".to_string());
    let db_path = env::var("ENTREGA_DB_PATH").unwrap_or_else(|_| DB_PATH.to_string());
    let db =
        Arc::new(Database::open(db_path.as_str()).or_else(|_| Database::create(db_path.as_str()))?);
    store::init_db(db.as_ref())?;
    let graph = load_graph(db.clone())?;

    let state = AppState {
        db,
        graph: Arc::new(RwLock::new(graph)),
        allocators: Arc::new(Allocators::default()),
        api_key: Arc::new(api_key),
    };

    let app = Router::new()
        .route("/api/users", post(create_user).get(list_users))
        .route(
            "/api/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/api/users/login/{user_name}", get(login))
        .route("/api/places", post(create_place).get(list_places))
        .route(
            "/api/places/{id}",
            get(get_place).put(update_place).delete(delete_place),
        )
        .route("/api/places/type/{place_type}", get(places_by_type))
        .route("/api/products", post(create_product).get(list_products))
        .route(
            "/api/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/api/products/place/{place_id}", get(products_by_place))
        .route("/api/orders", post(create_order).get(list_orders))
        .route(
            "/api/orders/{id}",
            get(get_order).put(update_order).delete(delete_order),
        )
        .route("/api/orders/user/{user_id}", get(orders_by_user))
        .route("/api/reports/user/{user_id}", get(report_user))
        .route(
            "/api/reports/orders/user/{user_id}",
            get(report_order_history),
        )
        .route("/api/reports/orders/places", get(report_places_with_orders))
        .route("/api/reports/orders/places/top", get(report_top_places))
        .route(
            "/api/reports/orders/related/{user_id}",
            get(report_related_users),
        )
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|_| "invalid ENTREGA_HOST or ENTREGA_PORT")?;
    tracing::info!(%addr, db = %db_path, "listening");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Rebuilds the relationship-graph projection from the primary store.
fn load_graph(db: Arc<Database>) -> Result<RelationshipGraph, StoreError> {
    let users: Vec<User> = store::list_entities(&RedbCollection::users(db.clone()))?;
    let places: Vec<Place> = store::list_entities(&RedbCollection::places(db.clone()))?;
    let products: Vec<Product> = store::list_entities(&RedbCollection::products(db.clone()))?;
    let orders: Vec<Order> = store::list_entities(&RedbCollection::orders(db))?;
    tracing::info!(
        users = users.len(),
        places = places.len(),
        products = products.len(),
        orders = orders.len(),
        "graph projection rebuilt"
    );
    Ok(RelationshipGraph::from_entities(
        &users, &places, &products, &orders,
    ))
}

async fn authenticate(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: middleware::Next,
) -> Result<axum::response::Response, StatusCode> {
    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());

    if provided == Some(state.api_key.as_str()) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// Every store round trip is blocking; bridge it off the runtime the
/// same way for all handlers.
async fn run_store<T, F>(operation: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(operation).await??)
}

// ---- users ----------------------------------------------------------

async fn create_user(
    State(state): State<AppState>,
    Json(mut payload): Json<User>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    if payload.id.is_empty() {
        payload.id = Uuid::new_v4().to_string();
    }
    let users = RedbCollection::users(state.db.clone());
    let doc = payload.clone();
    run_store(move || store::insert_entity(&users, &doc.id, &doc)).await?;
    state.graph.write().await.upsert_user(&payload);
    Ok((StatusCode::CREATED, Json(payload)))
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let users = RedbCollection::users(state.db.clone());
    Ok(Json(run_store(move || store::list_entities(&users)).await?))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let users = RedbCollection::users(state.db.clone());
    let user: Option<User> = run_store(move || store::get_entity(&users, &id)).await?;
    Ok(Json(user.ok_or(StoreError::NotFound)?))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut payload): Json<User>,
) -> Result<StatusCode, ApiError> {
    payload.id = id;
    let users = RedbCollection::users(state.db.clone());
    let doc = payload.clone();
    run_store(move || store::replace_entity(&users, &doc.id, &doc)).await?;
    state.graph.write().await.upsert_user(&payload);
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let users = RedbCollection::users(state.db.clone());
    let key = id.clone();
    let removed = run_store(move || users.delete(&key)).await?;
    if !removed {
        return Err(StoreError::NotFound.into());
    }
    state.graph.write().await.remove_user(&id);
    Ok(StatusCode::NO_CONTENT)
}

async fn login(
    State(state): State<AppState>,
    Path(user_name): Path<String>,
) -> Result<Json<LoginView>, ApiError> {
    let users = RedbCollection::users(state.db.clone());
    let matches: Vec<User> =
        run_store(move || store::find_entities_by(&users, "user_name", &json!(user_name))).await?;
    let user = matches.first().ok_or(StoreError::NotFound)?;
    Ok(Json(LoginView::from(user)))
}

// ---- places ---------------------------------------------------------

async fn create_place(
    State(state): State<AppState>,
    Json(mut payload): Json<Place>,
) -> Result<(StatusCode, Json<Place>), ApiError> {
    let places = RedbCollection::places(state.db.clone());
    // Class lock held across scan and insert.
    let _guard = state.allocators.place.lock().await;
    let scan = places.clone();
    let keys = run_store(move || scan.keys()).await?;
    payload.id = ids::next_id(PLACE_PREFIX, &keys)?;
    let doc = payload.clone();
    run_store(move || store::insert_entity(&places, &doc.id, &doc)).await?;
    state.graph.write().await.upsert_place(&payload);
    Ok((StatusCode::CREATED, Json(payload)))
}

async fn list_places(State(state): State<AppState>) -> Result<Json<Vec<Place>>, ApiError> {
    let places = RedbCollection::places(state.db.clone());
    Ok(Json(run_store(move || store::list_entities(&places)).await?))
}

async fn get_place(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Place>, ApiError> {
    let places = RedbCollection::places(state.db.clone());
    let place: Option<Place> = run_store(move || store::get_entity(&places, &id)).await?;
    Ok(Json(place.ok_or(StoreError::NotFound)?))
}

async fn update_place(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut payload): Json<Place>,
) -> Result<StatusCode, ApiError> {
    payload.id = id;
    let places = RedbCollection::places(state.db.clone());
    let doc = payload.clone();
    run_store(move || store::replace_entity(&places, &doc.id, &doc)).await?;
    state.graph.write().await.upsert_place(&payload);
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_place(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let places = RedbCollection::places(state.db.clone());
    let key = id.clone();
    let removed = run_store(move || places.delete(&key)).await?;
    if !removed {
        return Err(StoreError::NotFound.into());
    }
    state.graph.write().await.remove_place(&id);
    Ok(StatusCode::NO_CONTENT)
}

async fn places_by_type(
    State(state): State<AppState>,
    Path(place_type): Path<PlaceType>,
) -> Result<Json<Vec<Place>>, ApiError> {
    let places = RedbCollection::places(state.db.clone());
    let value = serde_json::to_value(place_type).map_err(StoreError::from)?;
    Ok(Json(
        run_store(move || store::find_entities_by(&places, "place_type", &value)).await?,
    ))
}

// ---- products -------------------------------------------------------

async fn create_product(
    State(state): State<AppState>,
    Json(mut payload): Json<Product>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let products = RedbCollection::products(state.db.clone());
    let _guard = state.allocators.product.lock().await;
    let scan = products.clone();
    let keys = run_store(move || scan.keys()).await?;
    payload.id = ids::next_id(PRODUCT_PREFIX, &keys)?;
    let doc = payload.clone();
    run_store(move || store::insert_entity(&products, &doc.id, &doc)).await?;
    state.graph.write().await.upsert_product(&payload);
    Ok((StatusCode::CREATED, Json(payload)))
}

async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    let products = RedbCollection::products(state.db.clone());
    Ok(Json(
        run_store(move || store::list_entities(&products)).await?,
    ))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let products = RedbCollection::products(state.db.clone());
    let product: Option<Product> = run_store(move || store::get_entity(&products, &id)).await?;
    Ok(Json(product.ok_or(StoreError::NotFound)?))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut payload): Json<Product>,
) -> Result<StatusCode, ApiError> {
    payload.id = id;
    let products = RedbCollection::products(state.db.clone());
    let doc = payload.clone();
    run_store(move || store::replace_entity(&products, &doc.id, &doc)).await?;
    state.graph.write().await.upsert_product(&payload);
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let products = RedbCollection::products(state.db.clone());
    let key = id.clone();
    let removed = run_store(move || products.delete(&key)).await?;
    if !removed {
        return Err(StoreError::NotFound.into());
    }
    state.graph.write().await.remove_product(&id);
    Ok(StatusCode::NO_CONTENT)
}

async fn products_by_place(
    State(state): State<AppState>,
    Path(place_id): Path<String>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = RedbCollection::products(state.db.clone());
    Ok(Json(
        run_store(move || store::find_entities_by(&products, "place_id", &json!(place_id))).await?,
    ))
}

// ---- orders ---------------------------------------------------------

async fn create_order(
    State(state): State<AppState>,
    Json(mut payload): Json<Order>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let orders = RedbCollection::orders(state.db.clone());
    let _guard = state.allocators.order.lock().await;
    let scan = orders.clone();
    let keys = run_store(move || scan.keys()).await?;
    payload.id = ids::next_id(ORDER_PREFIX, &keys)?;
    let doc = payload.clone();
    run_store(move || store::insert_entity(&orders, &doc.id, &doc)).await?;
    state.graph.write().await.upsert_order(&payload);
    Ok((StatusCode::CREATED, Json(payload)))
}

async fn list_orders(State(state): State<AppState>) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = RedbCollection::orders(state.db.clone());
    Ok(Json(run_store(move || store::list_entities(&orders)).await?))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let orders = RedbCollection::orders(state.db.clone());
    let order: Option<Order> = run_store(move || store::get_entity(&orders, &id)).await?;
    Ok(Json(order.ok_or(StoreError::NotFound)?))
}

async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut payload): Json<Order>,
) -> Result<StatusCode, ApiError> {
    payload.id = id;
    let orders = RedbCollection::orders(state.db.clone());
    let doc = payload.clone();
    run_store(move || store::replace_entity(&orders, &doc.id, &doc)).await?;
    state.graph.write().await.upsert_order(&payload);
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let orders = RedbCollection::orders(state.db.clone());
    let key = id.clone();
    let removed = run_store(move || orders.delete(&key)).await?;
    if !removed {
        return Err(StoreError::NotFound.into());
    }
    state.graph.write().await.remove_order(&id);
    Ok(StatusCode::NO_CONTENT)
}

async fn orders_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = RedbCollection::orders(state.db.clone());
    Ok(Json(
        run_store(move || store::find_entities_by(&orders, "user_id", &json!(user_id))).await?,
    ))
}

// ---- reports --------------------------------------------------------

async fn report_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<reports::UserView>, ApiError> {
    let graph = state.graph.read().await;
    reports::find_user(&graph, &user_id)
        .map(Json)
        .ok_or(ApiError::UnknownUser(user_id))
}

async fn report_order_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<reports::OrderHistoryEntry>>, ApiError> {
    let graph = state.graph.read().await;
    Ok(Json(reports::user_order_history(&graph, &user_id)))
}

async fn report_places_with_orders(
    State(state): State<AppState>,
) -> Result<Json<Vec<Place>>, ApiError> {
    let graph = state.graph.read().await;
    Ok(Json(reports::places_with_orders(&graph)))
}

async fn report_top_places(
    State(state): State<AppState>,
) -> Result<Json<Vec<reports::PlaceOrders>>, ApiError> {
    let graph = state.graph.read().await;
    Ok(Json(reports::top_places(&graph)))
}

async fn report_related_users(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<reports::RelatedClientsReport>, ApiError> {
    let graph = state.graph.read().await;
    reports::related_users(&graph, &user_id)
        .map(Json)
        .ok_or(ApiError::UnknownUser(user_id))
}
