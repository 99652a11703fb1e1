//! Local identity provider: bcrypt credentials in the `accounts` tree and
//! HS256 bearer tokens whose subject is the account uid.

use bcrypt::{hash, verify};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Account, AuthPayload};
use crate::storage::{Storage, StorageError};

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("The email address is already in use by another account.")]
    EmailTaken,

    #[error("There is no user record corresponding to the provided identifier.")]
    UnknownAccount,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SignedIn {
    pub token: String,
    pub uid: String,
    pub expires_in: u64,
}

#[derive(Clone)]
pub struct IdentityProvider {
    storage: Storage,
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_ttl_secs: u64,
    bcrypt_cost: u32,
}

impl IdentityProvider {
    pub fn new(storage: Storage, secret: &[u8], token_ttl_secs: u64, bcrypt_cost: u32) -> Self {
        Self {
            storage,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            token_ttl_secs,
            bcrypt_cost,
        }
    }

    pub fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Account, IdentityError> {
        let account = Account {
            uid: Uuid::new_v4().simple().to_string(),
            email: email.trim().to_string(),
            display_name: display_name.to_string(),
            password_hash: hash(password, self.bcrypt_cost)?,
            created_at: Utc::now(),
        };
        if !self.storage.insert_account(&account)? {
            return Err(IdentityError::EmailTaken);
        }
        Ok(account)
    }

    /// Renames the account and, when given, replaces its password.
    pub fn update_account(
        &self,
        uid: &str,
        display_name: &str,
        password: Option<&str>,
    ) -> Result<Account, IdentityError> {
        let mut account = self
            .storage
            .get_account(uid)?
            .ok_or(IdentityError::UnknownAccount)?;
        account.display_name = display_name.to_string();
        if let Some(password) = password {
            account.password_hash = hash(password, self.bcrypt_cost)?;
        }
        self.storage.update_account(&account)?;
        Ok(account)
    }

    pub fn delete_account(&self, uid: &str) -> Result<(), IdentityError> {
        if self.storage.delete_account(uid)? {
            Ok(())
        } else {
            Err(IdentityError::UnknownAccount)
        }
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<Account>, IdentityError> {
        Ok(self.storage.find_account_by_email(email)?)
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, IdentityError> {
        let account = self
            .storage
            .find_account_by_email(email)?
            .ok_or(IdentityError::InvalidCredentials)?;

        if !verify(password, &account.password_hash).unwrap_or(false) {
            return Err(IdentityError::InvalidCredentials);
        }

        Ok(SignedIn {
            token: self.issue_token(&account)?,
            uid: account.uid,
            expires_in: self.token_ttl_secs,
        })
    }

    pub fn issue_token(&self, account: &Account) -> Result<String, IdentityError> {
        let exp = Utc::now().timestamp().max(0) as u64 + self.token_ttl_secs;
        let claims = AuthPayload {
            sub: account.uid.clone(),
            email: account.email.clone(),
            exp: exp as usize,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Checks signature and expiry; does not consult the account store.
    pub fn verify_token(&self, token: &str) -> Result<AuthPayload, IdentityError> {
        let token_data =
            decode::<AuthPayload>(token, &self.decoding, &Validation::new(Algorithm::HS256))?;
        Ok(token_data.claims)
    }
}
