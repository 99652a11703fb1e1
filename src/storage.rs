//! Document store over Sled.
//!
//! One tree per collection; every value is a Serde JSON document keyed by its id:
//! - `users`: role documents keyed by identity uid
//! - `accounts` / `account_emails`: identity-provider credentials + unique email index
//! - `products`: keyed by a generated UUID
//! - `stock`: keyed by the id of the product it counts
//! - `logs`: append-only audit trail keyed by a monotonic id

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{TransactionError, TransactionResult};
use sled::{Db, Transactional, Tree};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Account, Keyed, LogEntry, Product, Stock, User};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),

    #[error("document codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

#[derive(Clone)] // Sled handles are cheap to clone and internally synchronized
pub struct Storage {
    db: Db,
    user_tree: Tree,
    account_tree: Tree,
    email_tree: Tree,
    product_tree: Tree,
    stock_tree: Tree,
    log_tree: Tree,
}

impl Storage {
    /// Open or create the Sled database at the given path
    pub fn open(path: &str) -> Result<Self, StorageError> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory database removed on drop.
    #[cfg(test)]
    pub(crate) fn temporary() -> Self {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .expect("temporary sled db");
        Self::from_db(db).expect("open trees")
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        Ok(Self {
            user_tree: db.open_tree("users")?,
            account_tree: db.open_tree("accounts")?,
            email_tree: db.open_tree("account_emails")?,
            product_tree: db.open_tree("products")?,
            stock_tree: db.open_tree("stock")?,
            log_tree: db.open_tree("logs")?,
            db,
        })
    }

    pub async fn flush(&self) -> Result<usize, StorageError> {
        Ok(self.db.flush_async().await?)
    }

    // --- Users ---

    pub fn get_user(&self, uid: &str) -> Result<Option<User>, StorageError> {
        get_json(&self.user_tree, uid)
    }

    pub fn put_user(&self, uid: &str, user: &User) -> Result<(), StorageError> {
        put_json(&self.user_tree, uid, user)
    }

    pub fn delete_user(&self, uid: &str) -> Result<bool, StorageError> {
        Ok(self.user_tree.remove(uid.as_bytes())?.is_some())
    }

    pub fn list_users(&self) -> Result<Vec<Keyed<User>>, StorageError> {
        list_json(&self.user_tree)
    }

    // --- Identity accounts ---

    pub fn get_account(&self, uid: &str) -> Result<Option<Account>, StorageError> {
        get_json(&self.account_tree, uid)
    }

    pub fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StorageError> {
        match self.email_tree.get(email.to_lowercase().as_bytes())? {
            Some(uid) => get_json(&self.account_tree, &String::from_utf8_lossy(&uid)),
            None => Ok(None),
        }
    }

    /// Inserts a new account. Returns `false` without writing when the email is taken.
    pub fn insert_account(&self, account: &Account) -> Result<bool, StorageError> {
        let bytes = serde_json::to_vec(account)?;
        let email_key = account.email.to_lowercase();

        let result: TransactionResult<bool, StorageError> = (&self.account_tree, &self.email_tree)
            .transaction(|(accounts, emails)| {
                if emails.get(email_key.as_bytes())?.is_some() {
                    return Ok(false);
                }
                emails.insert(email_key.as_bytes(), account.uid.as_bytes())?;
                accounts.insert(account.uid.as_bytes(), bytes.as_slice())?;
                Ok(true)
            });
        result.map_err(flatten_tx_error)
    }

    /// Rewrites an existing account; the email index is left untouched.
    pub fn update_account(&self, account: &Account) -> Result<(), StorageError> {
        put_json(&self.account_tree, &account.uid, account)
    }

    pub fn delete_account(&self, uid: &str) -> Result<bool, StorageError> {
        let Some(account) = self.get_account(uid)? else {
            return Ok(false);
        };
        let email_key = account.email.to_lowercase();

        let result: TransactionResult<(), StorageError> = (&self.account_tree, &self.email_tree)
            .transaction(|(accounts, emails)| {
                accounts.remove(uid.as_bytes())?;
                emails.remove(email_key.as_bytes())?;
                Ok(())
            });
        result.map_err(flatten_tx_error)?;
        Ok(true)
    }

    // --- Products ---

    /// Stores a new product under a generated id and returns the id.
    pub fn insert_product(&self, product: &Product) -> Result<String, StorageError> {
        let id = Uuid::new_v4().to_string();
        put_json(&self.product_tree, &id, product)?;
        Ok(id)
    }

    pub fn get_product(&self, id: &str) -> Result<Option<Product>, StorageError> {
        get_json(&self.product_tree, id)
    }

    pub fn put_product(&self, id: &str, product: &Product) -> Result<(), StorageError> {
        put_json(&self.product_tree, id, product)
    }

    pub fn delete_product(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.product_tree.remove(id.as_bytes())?.is_some())
    }

    pub fn list_products(&self) -> Result<Vec<Keyed<Product>>, StorageError> {
        list_json(&self.product_tree)
    }

    /// First product whose name matches exactly.
    pub fn find_product_by_name(&self, name: &str) -> Result<Option<Keyed<Product>>, StorageError> {
        for item in self.product_tree.iter() {
            let (k, v) = item?;
            let product: Product = serde_json::from_slice(&v)?;
            if product.name == name {
                return Ok(Some(Keyed {
                    id: String::from_utf8_lossy(&k).into_owned(),
                    doc: product,
                }));
            }
        }
        Ok(None)
    }

    // --- Stock ---

    pub fn get_stock(&self, product_id: &str) -> Result<Option<Stock>, StorageError> {
        get_json(&self.stock_tree, product_id)
    }

    pub fn put_stock(&self, product_id: &str, stock: &Stock) -> Result<(), StorageError> {
        put_json(&self.stock_tree, product_id, stock)
    }

    pub fn delete_stock(&self, product_id: &str) -> Result<bool, StorageError> {
        Ok(self.stock_tree.remove(product_id.as_bytes())?.is_some())
    }

    pub fn list_stock(&self) -> Result<Vec<Keyed<Stock>>, StorageError> {
        list_json(&self.stock_tree)
    }

    /// Adds one unit to the product's stock, creating it at 1 when absent.
    /// Returns `None` without writing when the stock already holds `max`.
    /// Compare-and-swap loop, so concurrent increments are never lost.
    pub fn increment_stock(
        &self,
        product_id: &str,
        max: u32,
    ) -> Result<Option<Stock>, StorageError> {
        loop {
            let current = self.stock_tree.get(product_id.as_bytes())?;
            let now = Utc::now();
            let next = match &current {
                Some(bytes) => {
                    let mut stock: Stock = serde_json::from_slice(bytes)?;
                    if stock.quantity >= max {
                        return Ok(None);
                    }
                    stock.quantity += 1;
                    stock.updated_at = Some(now);
                    stock
                }
                None => Stock {
                    quantity: 1,
                    created_at: now,
                    updated_at: None,
                },
            };
            let encoded = serde_json::to_vec(&next)?;

            if self
                .stock_tree
                .compare_and_swap(product_id.as_bytes(), current, Some(encoded))?
                .is_ok()
            {
                return Ok(Some(next));
            }
        }
    }

    // --- Audit logs ---

    pub fn append_log(&self, entry: &LogEntry) -> Result<(), StorageError> {
        let key = self.db.generate_id()?.to_be_bytes();
        self.log_tree.insert(key, serde_json::to_vec(entry)?)?;
        Ok(())
    }

    /// Log entries in insertion order.
    pub fn log_entries(&self) -> Result<Vec<LogEntry>, StorageError> {
        self.log_tree
            .iter()
            .values()
            .map(|v| -> Result<LogEntry, StorageError> { Ok(serde_json::from_slice(&v?)?) })
            .collect()
    }
}

fn get_json<T: DeserializeOwned>(tree: &Tree, key: &str) -> Result<Option<T>, StorageError> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn put_json<T: Serialize>(tree: &Tree, key: &str, doc: &T) -> Result<(), StorageError> {
    tree.insert(key.as_bytes(), serde_json::to_vec(doc)?)?;
    Ok(())
}

fn list_json<T: DeserializeOwned>(tree: &Tree) -> Result<Vec<Keyed<T>>, StorageError> {
    let mut docs = vec![];
    for item in tree.iter() {
        let (k, v) = item?;
        docs.push(Keyed {
            id: String::from_utf8_lossy(&k).into_owned(),
            doc: serde_json::from_slice(&v)?,
        });
    }
    Ok(docs)
}

fn flatten_tx_error(err: TransactionError<StorageError>) -> StorageError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StorageError::Sled(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use std::sync::Arc;

    fn product(name: &str) -> Product {
        Product {
            name: name.to_string(),
            price: 1.5,
            created_at: Utc::now(),
        }
    }

    fn account(uid: &str, email: &str) -> Account {
        Account {
            uid: uid.to_string(),
            email: email.to_string(),
            display_name: uid.to_string(),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_product_and_user_documents() {
        let storage = Storage::temporary();

        let id = storage.insert_product(&product("manzana")).unwrap();
        assert_eq!(storage.get_product(&id).unwrap().unwrap().name, "manzana");
        assert_eq!(storage.list_products().unwrap().len(), 1);

        let found = storage.find_product_by_name("manzana").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(storage.find_product_by_name("Manzana").unwrap().is_none());

        assert!(storage.delete_product(&id).unwrap());
        assert!(!storage.delete_product(&id).unwrap());

        let user = User {
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            role: Role::Admin,
            created_at: Utc::now(),
        };
        storage.put_user("uid-1", &user).unwrap();
        assert_eq!(storage.get_user("uid-1").unwrap(), Some(user));
        assert_eq!(storage.list_users().unwrap()[0].id, "uid-1");
    }

    #[test]
    fn test_account_email_is_unique() {
        let storage = Storage::temporary();

        assert!(storage.insert_account(&account("a", "Ana@Example.com")).unwrap());
        assert!(!storage.insert_account(&account("b", "ana@example.com")).unwrap());
        assert!(storage.get_account("b").unwrap().is_none());

        let found = storage.find_account_by_email("ANA@example.com").unwrap().unwrap();
        assert_eq!(found.uid, "a");

        assert!(storage.delete_account("a").unwrap());
        assert!(storage.find_account_by_email("ana@example.com").unwrap().is_none());
        assert!(storage.insert_account(&account("b", "ana@example.com")).unwrap());
    }

    #[test]
    fn test_increment_creates_then_adds() {
        let storage = Storage::temporary();

        let first = storage.increment_stock("p1", 10).unwrap().unwrap();
        assert_eq!(first.quantity, 1);
        assert!(first.updated_at.is_none());

        let second = storage.increment_stock("p1", 10).unwrap().unwrap();
        assert_eq!(second.quantity, 2);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at.is_some());
    }

    #[test]
    fn test_increment_stops_at_max() {
        let storage = Storage::temporary();
        storage
            .put_stock(
                "p1",
                &Stock {
                    quantity: 5,
                    created_at: Utc::now(),
                    updated_at: None,
                },
            )
            .unwrap();

        assert!(storage.increment_stock("p1", 5).unwrap().is_none());
        let stock = storage.get_stock("p1").unwrap().unwrap();
        assert_eq!(stock.quantity, 5);
        assert!(stock.updated_at.is_none());
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let storage = Arc::new(Storage::temporary());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let storage = storage.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        storage.increment_stock("p1", u32::MAX).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(storage.get_stock("p1").unwrap().unwrap().quantity, 200);
    }

    #[test]
    fn test_logs_keep_insertion_order() {
        let storage = Storage::temporary();
        for action in ["crear", "actualizar", "eliminar"] {
            storage
                .append_log(&LogEntry::new(action, format!("{} x", action), "admin@example.com"))
                .unwrap();
        }
        let actions: Vec<_> = storage
            .log_entries()
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["crear", "actualizar", "eliminar"]);
    }
}
