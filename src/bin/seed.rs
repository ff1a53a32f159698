use chrono::{Duration, TimeZone, Utc};
use redb::{Database, TableDefinition};
use std::env;
use std::fs;

const USERS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("users");
const PLACES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("places");
const PRODUCTS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("products");
const ORDERS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("orders");

const PLACE_TYPES: [&str; 5] = ["Restaurant", "Supermarket", "Drugstore", "Mechanic", "Bar"];
const STATUSES: [&str; 4] = ["Registered", "Assigned", "On route", "Delivered"];

struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.state >> 32) as u32
    }

    fn gen_range(&mut self, max: u32) -> u32 {
        if max == 0 { 0 } else { self.next_u32() % max }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let db_path = env::var("ENTREGA_DB_PATH").unwrap_or_else(|_| "entrega.redb".to_string());
    let reset = env::var("SEED_RESET").ok().as_deref() == Some("true");
    if reset {
        let _ = fs::remove_file(&db_path);
    }

    let num_users = env::var("SEED_USERS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(50);
    let num_places = env::var("SEED_PLACES")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(20);
    let products_per_place = env::var("SEED_PRODUCTS_PER_PLACE")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(5);
    let num_orders = env::var("SEED_ORDERS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(200);
    let rng_seed = env::var("SEED_RANDOM")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(42);

    let db = Database::open(db_path.as_str()).or_else(|_| Database::create(db_path.as_str()))?;
    init_db(&db)?;

    let mut rng = Lcg::new(rng_seed);
    seed_users(&db, num_users)?;
    seed_places(&db, num_places, &mut rng)?;
    seed_products(&db, num_places, products_per_place, &mut rng)?;
    seed_orders(&db, num_orders, num_users, num_places, products_per_place, &mut rng)?;

    println!(
        "Seeded users={}, places={}, products={}, orders={}",
        num_users,
        num_places,
        num_places * products_per_place,
        num_orders
    );
    Ok(())
}

fn init_db(db: &Database) -> Result<(), redb::Error> {
    let write_txn = db.begin_write()?;
    write_txn.open_table(USERS_TABLE)?;
    write_txn.open_table(PLACES_TABLE)?;
    write_txn.open_table(PRODUCTS_TABLE)?;
    write_txn.open_table(ORDERS_TABLE)?;
    write_txn.commit()?;
    Ok(())
}

fn seed_users(db: &Database, num_users: u32) -> Result<(), redb::Error> {
    let write_txn = db.begin_write()?;
    {
        let mut users = write_txn.open_table(USERS_TABLE)?;
        for idx in 0..num_users {
            let id = format!("usr-{idx}");
            let birthday = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()
                + Duration::days(i64::from(idx) * 137 % 10_000);
            let doc = serde_json::json!({
                "id": id,
                "first_name": format!("First{idx}"),
                "last_name": format!("Last{idx}"),
                "birthday": birthday.to_rfc3339(),
                "phone": format!("555-{idx:04}"),
                "email": format!("user{idx}@example.com"),
                "user_name": format!("user{idx}"),
                "pass": "changeme",
                "user_type": if idx == 0 { "admin" } else { "client" },
            });
            users.insert(id.as_str(), doc.to_string().as_str())?;
        }
    }
    write_txn.commit()?;
    Ok(())
}

fn seed_places(db: &Database, num_places: u32, rng: &mut Lcg) -> Result<(), redb::Error> {
    let write_txn = db.begin_write()?;
    {
        let mut places = write_txn.open_table(PLACES_TABLE)?;
        for idx in 0..num_places {
            let id = format!("PLACE-{idx}");
            let place_type = PLACE_TYPES[rng.gen_range(PLACE_TYPES.len() as u32) as usize];
            let rating = (rng.gen_range(50) as f64) / 10.0;
            let doc = serde_json::json!({
                "id": id,
                "name": format!("Place {idx}"),
                "description": format!("Seeded {place_type}"),
                "latitude": format!("{:.5}", 9.9 + (rng.gen_range(1000) as f64) / 10_000.0),
                "longitude": format!("{:.5}", -84.1 + (rng.gen_range(1000) as f64) / 10_000.0),
                "address": format!("{idx} Main St"),
                "place_type": place_type,
                "phone": format!("222-{idx:04}"),
                "rating": rating,
                "schedule": "08:00-20:00",
                "website": "",
                "photo": "",
                "staff_amount": rng.gen_range(30),
            });
            places.insert(id.as_str(), doc.to_string().as_str())?;
        }
    }
    write_txn.commit()?;
    Ok(())
}

fn seed_products(
    db: &Database,
    num_places: u32,
    products_per_place: u32,
    rng: &mut Lcg,
) -> Result<(), redb::Error> {
    let write_txn = db.begin_write()?;
    {
        let mut products = write_txn.open_table(PRODUCTS_TABLE)?;
        for place_idx in 0..num_places {
            for offset in 0..products_per_place {
                let idx = place_idx * products_per_place + offset;
                let id = format!("PROD-{idx}");
                let doc = serde_json::json!({
                    "id": id,
                    "name": format!("Product {idx}"),
                    "description": format!("Seeded product {idx}"),
                    "price": 500 + i64::from(rng.gen_range(10_000)),
                    "photo": "",
                    "place_id": format!("PLACE-{place_idx}"),
                });
                products.insert(id.as_str(), doc.to_string().as_str())?;
            }
        }
    }
    write_txn.commit()?;
    Ok(())
}

fn seed_orders(
    db: &Database,
    num_orders: u32,
    num_users: u32,
    num_places: u32,
    products_per_place: u32,
    rng: &mut Lcg,
) -> Result<(), redb::Error> {
    let write_txn = db.begin_write()?;
    {
        let mut orders = write_txn.open_table(ORDERS_TABLE)?;
        for idx in 0..num_orders {
            let id = format!("ORDER-{idx}");
            let user_idx = rng.gen_range(num_users.max(1));
            let place_idx = rng.gen_range(num_places.max(1));
            let status = STATUSES[rng.gen_range(STATUSES.len() as u32) as usize];
            let date = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
                + Duration::minutes(i64::from(idx) * 173);

            let line_count = 1 + rng.gen_range(3);
            let mut lines = Vec::new();
            let mut total: i64 = 0;
            for _ in 0..line_count {
                let offset = rng.gen_range(products_per_place.max(1));
                let product_idx = place_idx * products_per_place + offset;
                let quantity = 1 + rng.gen_range(4);
                total += i64::from(quantity) * 1000;
                lines.push(serde_json::json!({
                    "product_id": format!("PROD-{product_idx}"),
                    "quantity": quantity,
                }));
            }

            let doc = serde_json::json!({
                "id": id,
                "user_id": format!("usr-{user_idx}"),
                "place_id": format!("PLACE-{place_idx}"),
                "date_time": date.to_rfc3339(),
                "status": status,
                "extras": "",
                "total": total,
                "products": lines,
                "related": [],
            });
            orders.insert(id.as_str(), doc.to_string().as_str())?;
        }
    }
    write_txn.commit()?;
    Ok(())
}
