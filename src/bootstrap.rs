use chrono::Utc;

use crate::auth::{IdentityError, IdentityProvider};
use crate::models::{Role, User};
use crate::storage::Storage;

/// Makes sure a superadmin with this email exists, creating the account and
/// its role document when missing. Returns the uid when one was created.
pub fn ensure_superadmin(
    identity: &IdentityProvider,
    storage: &Storage,
    email: &str,
    password: &str,
) -> Result<Option<String>, IdentityError> {
    if identity.find_by_email(email)?.is_some() {
        return Ok(None);
    }

    let name = email.split('@').next().unwrap_or(email);
    let account = identity.create_account(email, password, name)?;
    storage.put_user(
        &account.uid,
        &User {
            name: name.to_string(),
            email: account.email.clone(),
            role: Role::Superadmin,
            created_at: Utc::now(),
        },
    )?;
    Ok(Some(account.uid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_is_idempotent() {
        let storage = Storage::temporary();
        let identity = IdentityProvider::new(storage.clone(), b"secret", 60, 4);

        let uid = ensure_superadmin(&identity, &storage, "root@example.com", "pw")
            .unwrap()
            .unwrap();
        assert_eq!(storage.get_user(&uid).unwrap().unwrap().role, Role::Superadmin);
        assert_eq!(storage.get_user(&uid).unwrap().unwrap().name, "root");

        assert!(ensure_superadmin(&identity, &storage, "root@example.com", "other")
            .unwrap()
            .is_none());
        assert_eq!(storage.list_users().unwrap().len(), 1);
    }
}
