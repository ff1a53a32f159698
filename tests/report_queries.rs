use serde_json::Value;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};

struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn start_server(port: u16, db_path: &str) -> ChildGuard {
    let exe = env!("CARGO_BIN_EXE_entrega");
    let child = Command::new(exe)
        .env("ENTREGA_API_KEY", "test_token")
        .env("ENTREGA_HOST", "127.0.0.1")
        .env("ENTREGA_PORT", port.to_string())
        .env("ENTREGA_DB_PATH", db_path)
        .spawn()
        .expect("failed to start server");
    ChildGuard(child)
}

fn wait_for_port(addr: SocketAddr) {
    let start = Instant::now();
    loop {
        if TcpStream::connect(addr).is_ok() {
            return;
        }
        if start.elapsed() > Duration::from_secs(5) {
            panic!("server did not start in time");
        }
        thread::sleep(Duration::from_millis(50));
    }
}

fn request_json(method: &str, url: &str, body: Option<&Value>) -> ureq::Response {
    let builder = ureq::request(method, url).set("x-api-key", "test_token");
    match body {
        Some(body) => builder
            .set("content-type", "application/json")
            .send_json(body),
        None => builder.call(),
    }
    .expect("request failed")
}

fn create_user(base: &str, id: &str, first_name: &str) {
    request_json(
        "POST",
        &format!("{base}/api/users"),
        Some(&serde_json::json!({
            "id": id,
            "first_name": first_name,
            "last_name": "Mora",
            "birthday": "1990-01-01T00:00:00Z",
            "phone": "555-0001",
            "email": format!("{id}@example.com"),
            "user_name": id,
            "pass": "secret",
            "user_type": "client",
        })),
    );
}

fn create_place(base: &str, name: &str) -> String {
    let created: Value = request_json(
        "POST",
        &format!("{base}/api/places"),
        Some(&serde_json::json!({
            "name": name,
            "description": format!("{name} desc"),
            "latitude": "9.93000",
            "longitude": "-84.08000",
            "address": "1 Main St",
            "place_type": "Restaurant",
        })),
    )
    .into_json()
    .expect("invalid json");
    created["id"].as_str().expect("id").to_string()
}

fn create_product(base: &str, name: &str, place_id: &str) -> String {
    let created: Value = request_json(
        "POST",
        &format!("{base}/api/products"),
        Some(&serde_json::json!({
            "name": name,
            "description": "",
            "price": 1000,
            "place_id": place_id,
        })),
    )
    .into_json()
    .expect("invalid json");
    created["id"].as_str().expect("id").to_string()
}

fn create_order(base: &str, user_id: &str, place_id: Option<&str>, lines: &[(&str, u32)]) {
    let products: Vec<Value> = lines
        .iter()
        .map(|(product_id, quantity)| {
            serde_json::json!({ "product_id": product_id, "quantity": quantity })
        })
        .collect();
    let mut payload = serde_json::json!({
        "user_id": user_id,
        "date_time": "2024-05-01T10:00:00Z",
        "status": "Registered",
        "total": 1000,
        "products": products,
        "related": [],
    });
    if let Some(place_id) = place_id {
        payload["place_id"] = serde_json::json!(place_id);
    }
    request_json("POST", &format!("{base}/api/orders"), Some(&payload));
}

#[test]
fn reports_reshape_graph_traversals() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let db_path = std::env::temp_dir().join(format!("entrega_test_reports_{}.redb", port));
    if db_path.exists() {
        let _ = std::fs::remove_file(&db_path);
    }
    let _child = start_server(port, db_path.to_str().unwrap());
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    wait_for_port(addr);
    let base = format!("http://127.0.0.1:{}", port);

    create_user(&base, "u1", "Ana");
    create_user(&base, "u2", "Bo");
    create_user(&base, "loner", "Cai");

    let corner = create_place(&base, "Corner"); // PLACE-0
    let market = create_place(&base, "Market"); // PLACE-1
    let rice = create_product(&base, "rice", &corner);
    let beans = create_product(&base, "beans", &corner);

    // u1: one order at Corner with two lines, one order with no place.
    create_order(&base, "u1", Some(&corner), &[(&rice, 2), (&beans, 1)]);
    create_order(&base, "u1", None, &[(&rice, 3)]);
    // u2: two orders at Corner, one at Market.
    create_order(&base, "u2", Some(&corner), &[(&rice, 1)]);
    create_order(&base, "u2", Some(&corner), &[(&beans, 1)]);
    create_order(&base, "u2", Some(&market), &[(&rice, 1)]);

    // Graph user lookup.
    let found: Value = request_json("GET", &format!("{base}/api/reports/user/u1"), None)
        .into_json()
        .expect("invalid json");
    assert_eq!(found["first_name"], "Ana");
    let missing = ureq::get(&format!("{base}/api/reports/user/ghost"))
        .set("x-api-key", "test_token")
        .call();
    assert!(matches!(missing, Err(ureq::Error::Status(404, _))));

    // Order history: grouped lines, nullable place name.
    let history: Vec<Value> = request_json(
        "GET",
        &format!("{base}/api/reports/orders/user/u1"),
        None,
    )
    .into_json()
    .expect("invalid json");
    assert_eq!(history.len(), 2);
    let with_place = history
        .iter()
        .find(|entry| entry["place_name"] == "Corner")
        .expect("order at Corner");
    assert_eq!(with_place["products"].as_array().expect("products").len(), 2);
    assert_eq!(with_place["products"][0]["quantity"], 2);
    let without_place = history
        .iter()
        .find(|entry| entry["place_name"].is_null())
        .expect("order without place");
    assert_eq!(
        without_place["products"].as_array().expect("products").len(),
        1
    );

    // Distinct places with at least one order.
    let places: Vec<Value> = request_json(
        "GET",
        &format!("{base}/api/reports/orders/places"),
        None,
    )
    .into_json()
    .expect("invalid json");
    let mut ids: Vec<&str> = places
        .iter()
        .map(|place| place["id"].as_str().expect("id"))
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, ["PLACE-0", "PLACE-1"]);

    // Top places: Corner has 3 orders, Market 1.
    let top: Vec<Value> = request_json(
        "GET",
        &format!("{base}/api/reports/orders/places/top"),
        None,
    )
    .into_json()
    .expect("invalid json");
    assert_eq!(top.len(), 2);
    assert_eq!(top[0]["id"], "PLACE-0");
    assert_eq!(top[0]["orders_amount"], 3);
    assert_eq!(top[1]["id"], "PLACE-1");
    assert_eq!(top[1]["orders_amount"], 1);

    // Related users: u2 ordered twice at u1's place, one row each.
    let related: Value = request_json(
        "GET",
        &format!("{base}/api/reports/orders/related/u1"),
        None,
    )
    .into_json()
    .expect("invalid json");
    assert_eq!(related["client_id"], "u1");
    assert_eq!(related["stores"].as_array().expect("stores").len(), 1);
    assert_eq!(related["stores"][0]["place_id"], "PLACE-0");
    let rows = related["other_users"].as_array().expect("other_users");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row["user_id"] == "u2"));

    // A user with no orders gets an explicit empty relation, not an error.
    let empty: Value = request_json(
        "GET",
        &format!("{base}/api/reports/orders/related/loner"),
        None,
    )
    .into_json()
    .expect("invalid json");
    assert_eq!(empty["client_id"], "loner");
    assert!(empty["stores"].as_array().expect("stores").is_empty());
    assert!(empty["other_users"].as_array().expect("other_users").is_empty());

    let _ = std::fs::remove_file(&db_path);
}
