use clap::{Parser, Subcommand};
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;

const TOKEN_FILE: &str = ".stockroom_token";

#[derive(Parser)]
#[command(name = "stockroom-cli")]
#[command(about = "CLI for the stockroom admin API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, env = "STOCKROOM_URL", default_value = "http://localhost:11111")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Logout,
    #[command(subcommand)]
    Products(ProductCommands),
    #[command(subcommand)]
    Users(UserCommands),
    #[command(subcommand)]
    Stock(StockCommands),
    /// Count one more unit of a product by name
    Scan {
        #[arg(short, long)]
        name: String,
    },
    LowStock {
        #[arg(short, long)]
        threshold: Option<u32>,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    #[command(subcommand)]
    Scanner(ScannerCommands),
}

#[derive(Subcommand)]
enum ProductCommands {
    List,
    Create {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        price: Option<f64>,
    },
    Update {
        #[arg(short, long)]
        id: String,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        price: Option<f64>,
    },
    Delete {
        #[arg(short, long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    List,
    Create {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        #[arg(short, long, default_value = "user")]
        role: String,
    },
    Update {
        #[arg(short, long)]
        uid: String,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        role: String,
        #[arg(short, long)]
        password: Option<String>,
    },
    Delete {
        #[arg(short, long)]
        uid: String,
    },
}

#[derive(Subcommand)]
enum StockCommands {
    List,
    Create {
        #[arg(short = 'i', long)]
        product_id: String,
        #[arg(short, long)]
        quantity: u32,
    },
    Update {
        #[arg(short = 'i', long)]
        product_id: String,
        #[arg(short, long)]
        quantity: u32,
    },
    Delete {
        #[arg(short = 'i', long)]
        product_id: String,
    },
}

#[derive(Subcommand)]
enum ScannerCommands {
    Start,
    Stop,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

struct Api {
    client: Client,
    url: String,
}

impl Api {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
        self.client
            .request(method, format!("{}{}", self.url, path))
            .bearer_auth(token.trim())
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> anyhow::Result<()> {
        let mut req = self.request(method, path);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let res = req.send().await?;
        let status = res.status();
        let text = res.text().await?;
        let pretty = serde_json::from_str::<Value>(&text)
            .and_then(|v| serde_json::to_string_pretty(&v))
            .unwrap_or(text);
        println!("{} {}", status, pretty);
        Ok(())
    }
}

const PRODUCTS: &str = "/api/handleProducts";
const USERS: &str = "/api/handleUsers";
const INVENTORY: &str = "/api/handleInventory";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let api = Api {
        client: Client::new(),
        url: cli.url.trim_end_matches('/').to_string(),
    };

    match cli.command {
        Commands::Login { email, password } => {
            let res = api
                .client
                .post(format!("{}/api/login", api.url))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: LoginResponse = res.json().await?;
                fs::write(TOKEN_FILE, body.token)?;
                println!("Logged in. Token saved to {}", TOKEN_FILE);
            } else {
                println!("Login failed: {}", res.text().await?);
            }
        }
        Commands::Logout => {
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Logged out (token removed).");
        }
        Commands::Products(cmd) => match cmd {
            ProductCommands::List => api.send(Method::GET, PRODUCTS, None).await?,
            ProductCommands::Create { name, price } => {
                api.send(Method::POST, PRODUCTS, Some(json!({ "name": name, "price": price })))
                    .await?
            }
            ProductCommands::Update { id, name, price } => {
                api.send(
                    Method::PUT,
                    PRODUCTS,
                    Some(json!({ "id": id, "name": name, "price": price })),
                )
                .await?
            }
            ProductCommands::Delete { id } => {
                api.send(Method::DELETE, PRODUCTS, Some(json!({ "id": id })))
                    .await?
            }
        },
        Commands::Users(cmd) => match cmd {
            UserCommands::List => api.send(Method::GET, USERS, None).await?,
            UserCommands::Create {
                name,
                email,
                password,
                role,
            } => {
                api.send(
                    Method::POST,
                    USERS,
                    Some(json!({ "name": name, "email": email, "password": password, "role": role })),
                )
                .await?
            }
            UserCommands::Update {
                uid,
                name,
                role,
                password,
            } => {
                api.send(
                    Method::PUT,
                    USERS,
                    Some(json!({ "uid": uid, "name": name, "role": role, "password": password })),
                )
                .await?
            }
            UserCommands::Delete { uid } => {
                api.send(Method::DELETE, USERS, Some(json!({ "uid": uid })))
                    .await?
            }
        },
        Commands::Stock(cmd) => match cmd {
            StockCommands::List => api.send(Method::GET, INVENTORY, None).await?,
            StockCommands::Create {
                product_id,
                quantity,
            } => {
                api.send(
                    Method::POST,
                    INVENTORY,
                    Some(json!({ "productId": product_id, "quantity": quantity })),
                )
                .await?
            }
            StockCommands::Update {
                product_id,
                quantity,
            } => {
                api.send(
                    Method::PUT,
                    INVENTORY,
                    Some(json!({ "productId": product_id, "quantity": quantity })),
                )
                .await?
            }
            StockCommands::Delete { product_id } => {
                api.send(
                    Method::DELETE,
                    INVENTORY,
                    Some(json!({ "productId": product_id })),
                )
                .await?
            }
        },
        Commands::Scan { name } => {
            api.send(Method::PATCH, INVENTORY, Some(json!({ "productName": name })))
                .await?
        }
        Commands::LowStock { threshold, limit } => {
            let mut query = vec![];
            if let Some(t) = threshold {
                query.push(format!("threshold={}", t));
            }
            if let Some(l) = limit {
                query.push(format!("limit={}", l));
            }
            let path = if query.is_empty() {
                "/api/lowStock".to_string()
            } else {
                format!("/api/lowStock?{}", query.join("&"))
            };
            api.send(Method::GET, &path, None).await?
        }
        Commands::Scanner(cmd) => {
            let action = match cmd {
                ScannerCommands::Start => "start",
                ScannerCommands::Stop => "stop",
            };
            api.send(Method::POST, "/api/runScanner", Some(json!({ "action": action })))
                .await?
        }
    }

    Ok(())
}
