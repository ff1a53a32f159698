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

fn request_status(method: &str, url: &str, body: Option<&Value>) -> u16 {
    let builder = ureq::request(method, url).set("x-api-key", "test_token");
    let result = match body {
        Some(body) => builder
            .set("content-type", "application/json")
            .send_json(body),
        None => builder.call(),
    };
    match result {
        Ok(response) => response.status(),
        Err(ureq::Error::Status(code, _)) => code,
        Err(error) => panic!("transport error: {error}"),
    }
}

fn user_payload(id: &str, user_name: &str) -> Value {
    serde_json::json!({
        "id": id,
        "first_name": "Ana",
        "last_name": "Reyes",
        "birthday": "1990-01-01T00:00:00Z",
        "phone": "555-0001",
        "email": format!("{user_name}@example.com"),
        "user_name": user_name,
        "pass": "secret",
        "user_type": "client",
    })
}

fn place_payload(name: &str, place_type: &str) -> Value {
    serde_json::json!({
        "name": name,
        "description": "a place",
        "latitude": "9.93000",
        "longitude": "-84.08000",
        "address": "1 Main St",
        "place_type": place_type,
        "rating": 4.5,
        "staff_amount": 3,
    })
}

#[test]
fn crud_lifecycle_allocates_and_reuses_identifiers() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let db_path = std::env::temp_dir().join(format!("entrega_test_lifecycle_{}.redb", port));
    if db_path.exists() {
        let _ = std::fs::remove_file(&db_path);
    }
    let _child = start_server(port, db_path.to_str().unwrap());
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    wait_for_port(addr);
    let base = format!("http://127.0.0.1:{}", port);

    // No api key, no service.
    let unauthorized = ureq::get(&format!("{base}/api/places")).call();
    assert!(matches!(
        unauthorized,
        Err(ureq::Error::Status(401, _))
    ));

    // Users keep their opaque caller-supplied identifiers.
    let response = request_json(
        "POST",
        &format!("{base}/api/users"),
        Some(&user_payload("client-1", "ana")),
    );
    assert_eq!(response.status(), 201);
    let created: Value = response.into_json().expect("invalid json");
    assert_eq!(created["id"], "client-1");

    // Login projection by user name.
    let login: Value = request_json("GET", &format!("{base}/api/users/login/ana"), None)
        .into_json()
        .expect("invalid json");
    assert_eq!(login["id"], "client-1");
    assert_eq!(login["pass"], "secret");
    assert_eq!(
        request_status("GET", &format!("{base}/api/users/login/nobody"), None),
        404
    );

    // Gap-filling place identifiers.
    for expected in ["PLACE-0", "PLACE-1", "PLACE-2"] {
        let created: Value = request_json(
            "POST",
            &format!("{base}/api/places"),
            Some(&place_payload("Corner", "Restaurant")),
        )
        .into_json()
        .expect("invalid json");
        assert_eq!(created["id"], expected);
    }
    assert_eq!(
        request_status("DELETE", &format!("{base}/api/places/PLACE-1"), None),
        204
    );
    // The freed identifier is handed out again before the range grows.
    let reused: Value = request_json(
        "POST",
        &format!("{base}/api/places"),
        Some(&place_payload("Market", "Supermarket")),
    )
    .into_json()
    .expect("invalid json");
    assert_eq!(reused["id"], "PLACE-1");
    let appended: Value = request_json(
        "POST",
        &format!("{base}/api/places"),
        Some(&place_payload("Garage", "Mechanic")),
    )
    .into_json()
    .expect("invalid json");
    assert_eq!(appended["id"], "PLACE-3");

    // Filter by the closed type enumeration.
    let supermarkets: Vec<Value> =
        request_json("GET", &format!("{base}/api/places/type/Supermarket"), None)
            .into_json()
            .expect("invalid json");
    assert_eq!(supermarkets.len(), 1);
    assert_eq!(supermarkets[0]["id"], "PLACE-1");

    // Full-document replace, read back through the same key.
    let mut updated = place_payload("Corner Renamed", "Restaurant");
    updated["rating"] = serde_json::json!(3.0);
    assert_eq!(
        request_status(
            "PUT",
            &format!("{base}/api/places/PLACE-0"),
            Some(&updated)
        ),
        204
    );
    let fetched: Value = request_json("GET", &format!("{base}/api/places/PLACE-0"), None)
        .into_json()
        .expect("invalid json");
    assert_eq!(fetched["name"], "Corner Renamed");
    assert_eq!(fetched["id"], "PLACE-0");

    // Missing identifiers surface as 404, not a crash.
    assert_eq!(
        request_status("GET", &format!("{base}/api/places/PLACE-9"), None),
        404
    );
    assert_eq!(
        request_status(
            "PUT",
            &format!("{base}/api/places/PLACE-9"),
            Some(&place_payload("Ghost", "Bar"))
        ),
        404
    );
    assert_eq!(
        request_status("DELETE", &format!("{base}/api/places/PLACE-9"), None),
        404
    );

    // Products and orders run through their own allocators.
    let product: Value = request_json(
        "POST",
        &format!("{base}/api/products"),
        Some(&serde_json::json!({
            "name": "rice",
            "description": "1kg",
            "price": 1500,
            "place_id": "PLACE-0",
        })),
    )
    .into_json()
    .expect("invalid json");
    assert_eq!(product["id"], "PROD-0");

    let by_place: Vec<Value> = request_json(
        "GET",
        &format!("{base}/api/products/place/PLACE-0"),
        None,
    )
    .into_json()
    .expect("invalid json");
    assert_eq!(by_place.len(), 1);

    let order: Value = request_json(
        "POST",
        &format!("{base}/api/orders"),
        Some(&serde_json::json!({
            "user_id": "client-1",
            "place_id": "PLACE-0",
            "date_time": "2024-05-01T10:00:00Z",
            "status": "Registered",
            "total": 3000,
            "products": [{ "product_id": "PROD-0", "quantity": 2 }],
            "related": ["PLACE-1"],
        })),
    )
    .into_json()
    .expect("invalid json");
    assert_eq!(order["id"], "ORDER-0");

    let user_orders: Vec<Value> = request_json(
        "GET",
        &format!("{base}/api/orders/user/client-1"),
        None,
    )
    .into_json()
    .expect("invalid json");
    assert_eq!(user_orders.len(), 1);
    assert_eq!(user_orders[0]["status"], "Registered");

    // Replace an order and check the stored document is the replacement.
    assert_eq!(
        request_status(
            "PUT",
            &format!("{base}/api/orders/ORDER-0"),
            Some(&serde_json::json!({
                "user_id": "client-1",
                "place_id": "PLACE-0",
                "date_time": "2024-05-01T11:00:00Z",
                "status": "On route",
                "total": 3000,
                "products": [{ "product_id": "PROD-0", "quantity": 2 }],
                "related": [],
            }))
        ),
        204
    );
    let replaced: Value = request_json("GET", &format!("{base}/api/orders/ORDER-0"), None)
        .into_json()
        .expect("invalid json");
    assert_eq!(replaced["status"], "On route");

    let _ = std::fs::remove_file(&db_path);
}
