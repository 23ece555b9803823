use std::sync::Arc;

use chrono::Utc;
use goatmart::{
    config::AppConfig,
    entities::{self, Address, Gender},
    events::{Event, EventSender},
    handlers::AppServices,
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend,
    Schema, Set,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Test harness backed by an in-memory SQLite database with the schema
/// created from the entity definitions.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub events: mpsc::Receiver<Event>,
}

impl TestApp {
    pub async fn new() -> Self {
        // A single connection keeps every query on the same in-memory
        // database.
        let mut opt = ConnectOptions::new("sqlite::memory:".to_owned());
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opt)
            .await
            .expect("failed to create test database");
        create_schema(&db).await;

        let db = Arc::new(db);
        let (tx, rx) = mpsc::channel(64);
        let sender = Arc::new(EventSender::new(tx));
        let cfg = Arc::new(AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        ));
        let services = AppServices::new(db.clone(), sender, cfg);

        Self {
            db,
            services,
            events: rx,
        }
    }
}

async fn create_schema(db: &DatabaseConnection) {
    let schema = Schema::new(DbBackend::Sqlite);
    let backend = db.get_database_backend();

    let statements = vec![
        schema.create_table_from_entity(entities::User),
        schema.create_table_from_entity(entities::Category),
        schema.create_table_from_entity(entities::Product),
        schema.create_table_from_entity(entities::Cart),
        schema.create_table_from_entity(entities::CartItem),
        schema.create_table_from_entity(entities::Order),
        schema.create_table_from_entity(entities::OrderItem),
        schema.create_table_from_entity(entities::Affiliate),
        schema.create_table_from_entity(entities::AffiliateReferral),
    ];

    for statement in statements {
        db.execute(backend.build(&statement))
            .await
            .expect("failed to create table");
    }
}

pub async fn seed_user(app: &TestApp, name: &str, referred_by: Option<Uuid>) -> entities::UserModel {
    let now = Utc::now();
    let user = entities::user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        email: Set(format!("{}@example.com", Uuid::new_v4())),
        phone: Set(None),
        role: Set("customer".to_string()),
        referred_by: Set(referred_by),
        created_at: Set(now),
        updated_at: Set(now),
    };
    user.insert(&*app.db).await.expect("failed to seed user")
}

pub async fn seed_category(app: &TestApp, name: &str) -> entities::CategoryModel {
    let now = Utc::now();
    let category = entities::category::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        slug: Set(name.to_lowercase().replace(' ', "-")),
        description: Set(None),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    };
    category
        .insert(&*app.db)
        .await
        .expect("failed to seed category")
}

pub struct ProductSeed {
    pub name: &'static str,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub stock_quantity: i32,
    pub allow_preorder: bool,
}

impl Default for ProductSeed {
    fn default() -> Self {
        Self {
            name: "Etawa Buck",
            price: Decimal::from(2_500_000),
            sale_price: None,
            stock_quantity: 10,
            allow_preorder: false,
        }
    }
}

pub async fn seed_product(
    app: &TestApp,
    category_id: Uuid,
    spec: ProductSeed,
) -> entities::ProductModel {
    let now = Utc::now();
    let suffix = Uuid::new_v4().simple().to_string();
    let product = entities::product::ActiveModel {
        id: Set(Uuid::new_v4()),
        category_id: Set(category_id),
        name: Set(spec.name.to_string()),
        slug: Set(format!("{}-{}", spec.name.to_lowercase().replace(' ', "-"), suffix)),
        description: Set("A healthy animal".to_string()),
        short_description: Set(None),
        price: Set(spec.price),
        sale_price: Set(spec.sale_price),
        stock_quantity: Set(spec.stock_quantity),
        sku: Set(format!("GOAT-{}", suffix)),
        breed: Set(Some("Etawa".to_string())),
        gender: Set(Gender::Male),
        age_range: Set(None),
        weight_range: Set(None),
        health_info: Set(None),
        is_featured: Set(false),
        is_active: Set(true),
        allow_preorder: Set(spec.allow_preorder),
        expected_availability: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };
    product
        .insert(&*app.db)
        .await
        .expect("failed to seed product")
}

pub fn sample_address(name: &str) -> Address {
    Address {
        name: name.to_string(),
        street: "Jl. Kebon Jeruk 12".to_string(),
        city: "Bogor".to_string(),
        state: "Jawa Barat".to_string(),
        postal_code: "16110".to_string(),
        phone: "+62811234567".to_string(),
    }
}
