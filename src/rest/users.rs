//! `/api/handleUsers`: account + role management for admins.
//!
//! Each user exists twice: an identity account (credentials) and a role
//! document keyed by the same uid. Handlers keep the two in step.

use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::{ApiError, AppState, JsonBody, RestResponse};
use crate::models::{Keyed, LogEntry, Role, User};
use crate::policy::{Caller, Capability};

const USER_NOT_FOUND: &str = "El usuario no existe.";

#[derive(Deserialize, Debug, Default)]
pub struct UserBody {
    pub uid: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_role(role: &str) -> Result<Role, ApiError> {
    role.parse().map_err(|_| ApiError::validation("Rol inválido."))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Keyed<User>>>, ApiError> {
    Ok(Json(state.storage.list_users()?))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<UserBody>,
) -> Result<Json<RestResponse>, ApiError> {
    let (Some(name), Some(email), Some(password), Some(role)) = (
        non_blank(body.name),
        non_blank(body.email),
        non_blank(body.password),
        non_blank(body.role),
    ) else {
        return Err(ApiError::validation("Missing required fields"));
    };
    let role = parse_role(&role)?;

    if role == Role::Superadmin && !caller.can(Capability::AssignSuperadmin) {
        return Err(ApiError::Forbidden(
            "Only superadmin can create another superadmin".to_string(),
        ));
    }

    let account = state
        .identity
        .create_account(&email, &password, &name)
        .map_err(ApiError::rejected)?;

    let user = User {
        name,
        email: account.email.clone(),
        role,
        created_at: Utc::now(),
    };
    state
        .storage
        .put_user(&account.uid, &user)
        .map_err(ApiError::rejected)?;

    state
        .storage
        .append_log(&LogEntry::new(
            "crear",
            format!("Usuario '{}' creado con rol '{}'", user.name, role),
            &caller.email,
        ))
        .map_err(ApiError::rejected)?;

    info!(uid = %account.uid, %role, by = %caller.email, "user created");
    Ok(Json(RestResponse::with_uid(account.uid)))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<UserBody>,
) -> Result<Json<RestResponse>, ApiError> {
    let (Some(uid), Some(name), Some(role)) =
        (non_blank(body.uid), non_blank(body.name), non_blank(body.role))
    else {
        return Err(ApiError::validation("Missing required fields"));
    };
    let role = parse_role(&role)?;

    if role == Role::Superadmin && !caller.can(Capability::AssignSuperadmin) {
        return Err(ApiError::Forbidden(
            "Only superadmin can assign superadmin role".to_string(),
        ));
    }

    let mut user = state
        .storage
        .get_user(&uid)
        .map_err(ApiError::rejected)?
        .ok_or_else(|| ApiError::validation(USER_NOT_FOUND))?;

    let password = non_blank(body.password);
    state
        .identity
        .update_account(&uid, &name, password.as_deref())
        .map_err(ApiError::rejected)?;

    user.name = name;
    user.role = role;
    state
        .storage
        .put_user(&uid, &user)
        .map_err(ApiError::rejected)?;

    state
        .storage
        .append_log(&LogEntry::new(
            "actualizar",
            format!("Usuario '{}' actualizado (rol: {})", user.name, role),
            &caller.email,
        ))
        .map_err(ApiError::rejected)?;

    info!(%uid, %role, by = %caller.email, "user updated");
    Ok(Json(RestResponse::ok()))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<UserBody>,
) -> Result<Json<RestResponse>, ApiError> {
    let uid = non_blank(body.uid).ok_or_else(|| ApiError::validation("Missing uid"))?;

    if state
        .storage
        .get_user(&uid)
        .map_err(ApiError::rejected)?
        .is_none()
    {
        return Err(ApiError::validation(USER_NOT_FOUND));
    }

    state
        .identity
        .delete_account(&uid)
        .map_err(ApiError::rejected)?;
    state
        .storage
        .delete_user(&uid)
        .map_err(ApiError::rejected)?;

    state
        .storage
        .append_log(&LogEntry::new(
            "eliminar",
            format!("Usuario con UID '{}' eliminado", uid),
            &caller.email,
        ))
        .map_err(ApiError::rejected)?;

    info!(%uid, by = %caller.email, "user deleted");
    Ok(Json(RestResponse::ok()))
}

#[cfg(test)]
mod tests {
    use crate::models::Role;
    use crate::rest::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    const URI: &str = "/api/handleUsers";

    fn new_user(role: &str) -> serde_json::Value {
        json!({
            "name": "Marta",
            "email": format!("marta-{}@example.com", role),
            "password": "clave",
            "role": role
        })
    }

    #[tokio::test]
    async fn test_non_admin_is_forbidden() {
        let app = TestApp::new();
        let user = app.token_for(Role::User);

        for method in [Method::GET, Method::POST, Method::PUT, Method::DELETE] {
            let (status, _) = app
                .call(method, URI, Some(&user), Some(new_user("user")))
                .await;
            assert_eq!(status, StatusCode::FORBIDDEN);
        }
    }

    #[tokio::test]
    async fn test_only_superadmin_grants_superadmin() {
        let app = TestApp::new();
        let admin = app.token_for(Role::Admin);
        let root = app.token_for(Role::Superadmin);

        let (status, body) = app
            .call(Method::POST, URI, Some(&admin), Some(new_user("superadmin")))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Only superadmin can create another superadmin");

        let (status, body) = app
            .call(Method::POST, URI, Some(&root), Some(new_user("superadmin")))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["uid"].is_string());

        let (status, body) = app
            .call(Method::POST, URI, Some(&admin), Some(new_user("user")))
            .await;
        assert_eq!(status, StatusCode::OK);
        let uid = body["uid"].as_str().unwrap().to_string();

        let (status, body) = app
            .call(
                Method::PUT,
                URI,
                Some(&admin),
                Some(json!({"uid": uid, "name": "Marta", "role": "superadmin"})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Only superadmin can assign superadmin role");
    }

    #[tokio::test]
    async fn test_user_lifecycle() {
        let app = TestApp::new();
        let admin = app.token_for(Role::Admin);

        let (status, body) = app
            .call(Method::POST, URI, Some(&admin), Some(new_user("user")))
            .await;
        assert_eq!(status, StatusCode::OK);
        let uid = body["uid"].as_str().unwrap().to_string();

        let (status, _) = app
            .call(
                Method::PUT,
                URI,
                Some(&admin),
                Some(json!({"uid": uid, "name": "Marta R.", "role": "admin", "password": "nueva"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let stored = app.state.storage.get_user(&uid).unwrap().unwrap();
        assert_eq!(stored.name, "Marta R.");
        assert_eq!(stored.role, Role::Admin);
        assert!(app
            .state
            .identity
            .sign_in("marta-user@example.com", "nueva")
            .is_ok());

        let (_, list) = app.call(Method::GET, URI, Some(&admin), None).await;
        assert!(list
            .as_array()
            .unwrap()
            .iter()
            .any(|u| u["id"] == uid.as_str() && u["role"] == "admin"));

        let (status, _) = app
            .call(Method::DELETE, URI, Some(&admin), Some(json!({"uid": uid})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(app.state.storage.get_user(&uid).unwrap().is_none());
        assert!(app.state.storage.get_account(&uid).unwrap().is_none());

        let actions: Vec<_> = app
            .state
            .storage
            .log_entries()
            .unwrap()
            .into_iter()
            .map(|l| l.action)
            .collect();
        assert_eq!(actions, vec!["crear", "actualizar", "eliminar"]);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let app = TestApp::new();
        let admin = app.token_for(Role::Admin);

        let (status, body) = app
            .call(Method::POST, URI, Some(&admin), Some(json!({"name": "x"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields");

        let (status, body) = app
            .call(Method::POST, URI, Some(&admin), Some(new_user("owner")))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Rol inválido.");

        app.call(Method::POST, URI, Some(&admin), Some(new_user("user")))
            .await;
        let (status, body) = app
            .call(Method::POST, URI, Some(&admin), Some(new_user("user")))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "The email address is already in use by another account."
        );

        let (status, body) = app
            .call(Method::DELETE, URI, Some(&admin), Some(json!({"uid": "nobody"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "El usuario no existe.");
    }
}
