//! Seed script for stockroom
//!
//! Creates a superadmin and a handful of products with stock so the API has
//! something to show. Safe to re-run: products that already exist by name are
//! skipped.
//!   cargo run --bin seed_data -- --email root@example.com --password admin

use chrono::Utc;
use clap::Parser;
use tracing::info;

use stockroom::auth::IdentityProvider;
use stockroom::bootstrap::ensure_superadmin;
use stockroom::config::LogFormat;
use stockroom::models::{LogEntry, Product, Stock};
use stockroom::storage::Storage;
use stockroom::telemetry;

#[derive(Parser)]
#[command(name = "seed_data")]
struct Args {
    #[arg(long, env = "STOCKROOM_DATA_DIR", default_value = "stockroom_data")]
    data_dir: String,

    #[arg(long, env = "STOCKROOM_BOOTSTRAP_EMAIL", default_value = "admin@stockroom.local")]
    email: String,

    #[arg(long, env = "STOCKROOM_BOOTSTRAP_PASSWORD", default_value = "admin")]
    password: String,
}

// Seeding never issues tokens, so any signing key will do.
const UNUSED_SECRET: &[u8] = b"seed";

const SAMPLE: &[(&str, f64, u32)] = &[
    ("manzana", 0.45, 120),
    ("banana", 0.25, 28),
    ("naranja", 0.35, 64),
    ("pera", 0.50, 12),
    ("uva", 2.10, 3),
    ("mango", 1.20, 45),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let _guard = telemetry::init(LogFormat::Pretty, None);

    let storage = Storage::open(&args.data_dir)?;
    let identity = IdentityProvider::new(
        storage.clone(),
        UNUSED_SECRET,
        3600,
        bcrypt::DEFAULT_COST,
    );

    match ensure_superadmin(&identity, &storage, &args.email, &args.password)? {
        Some(uid) => info!(%uid, email = %args.email, "superadmin created"),
        None => info!(email = %args.email, "superadmin already present"),
    }

    let mut created = 0;
    for (name, price, quantity) in SAMPLE {
        if storage.find_product_by_name(name)?.is_some() {
            continue;
        }
        let id = storage.insert_product(&Product {
            name: name.to_string(),
            price: *price,
            created_at: Utc::now(),
        })?;
        storage.put_stock(
            &id,
            &Stock {
                quantity: *quantity,
                created_at: Utc::now(),
                updated_at: None,
            },
        )?;
        storage.append_log(&LogEntry::new(
            "crear",
            format!("Producto '{}' creado", name),
            &args.email,
        ))?;
        created += 1;
    }

    let logged = storage.log_entries()?.len();
    storage.flush().await?;
    info!(created, logged, "seed complete");
    Ok(())
}
