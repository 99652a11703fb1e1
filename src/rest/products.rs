//! `/api/handleProducts`: admin-only product catalogue.

use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::{ApiError, AppState, JsonBody, RestResponse};
use crate::models::{Keyed, LogEntry, Product};
use crate::policy::Caller;

const PRODUCT_NOT_FOUND: &str = "El producto no existe.";

#[derive(Deserialize, Debug, Default)]
pub struct ProductBody {
    pub id: Option<String>,
    pub name: Option<String>,
    pub price: Option<f64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn check_price(price: Option<f64>) -> Result<(), ApiError> {
    match price {
        Some(p) if !p.is_finite() || p < 0.0 => Err(ApiError::validation("Precio inválido.")),
        _ => Ok(()),
    }
}

pub async fn list_products(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Keyed<Product>>>, ApiError> {
    Ok(Json(state.storage.list_products()?))
}

pub async fn create_product(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<ProductBody>,
) -> Result<Json<RestResponse>, ApiError> {
    let name = non_blank(body.name).ok_or_else(|| ApiError::validation("Missing name field"))?;
    check_price(body.price)?;

    let product = Product {
        name,
        price: body.price.unwrap_or(0.0),
        created_at: Utc::now(),
    };
    let id = state
        .storage
        .insert_product(&product)
        .map_err(ApiError::rejected)?;

    state
        .storage
        .append_log(&LogEntry::new(
            "crear",
            format!("Producto '{}' creado", product.name),
            &caller.email,
        ))
        .map_err(ApiError::rejected)?;

    info!(%id, name = %product.name, by = %caller.email, "product created");
    Ok(Json(RestResponse::with_id(id)))
}

pub async fn update_product(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<ProductBody>,
) -> Result<Json<RestResponse>, ApiError> {
    let (Some(id), Some(name)) = (non_blank(body.id), non_blank(body.name)) else {
        return Err(ApiError::validation("Missing id or name field"));
    };
    check_price(body.price)?;

    let mut product = state
        .storage
        .get_product(&id)
        .map_err(ApiError::rejected)?
        .ok_or_else(|| ApiError::validation(PRODUCT_NOT_FOUND))?;

    product.name = name;
    if let Some(price) = body.price {
        product.price = price;
    }
    state
        .storage
        .put_product(&id, &product)
        .map_err(ApiError::rejected)?;

    state
        .storage
        .append_log(&LogEntry::new(
            "actualizar",
            format!("Producto '{}' actualizado", product.name),
            &caller.email,
        ))
        .map_err(ApiError::rejected)?;

    info!(%id, by = %caller.email, "product updated");
    Ok(Json(RestResponse::ok()))
}

pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<ProductBody>,
) -> Result<Json<RestResponse>, ApiError> {
    let id = non_blank(body.id).ok_or_else(|| ApiError::validation("Missing id"))?;

    if state
        .storage
        .get_product(&id)
        .map_err(ApiError::rejected)?
        .is_none()
    {
        return Err(ApiError::validation(PRODUCT_NOT_FOUND));
    }

    state
        .storage
        .delete_product(&id)
        .map_err(ApiError::rejected)?;

    state
        .storage
        .append_log(&LogEntry::new(
            "eliminar",
            format!("Producto con ID '{}' eliminado", id),
            &caller.email,
        ))
        .map_err(ApiError::rejected)?;

    info!(%id, by = %caller.email, "product deleted");
    Ok(Json(RestResponse::ok()))
}

#[cfg(test)]
mod tests {
    use crate::models::Role;
    use crate::rest::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    const URI: &str = "/api/handleProducts";

    #[tokio::test]
    async fn test_plain_user_is_forbidden() {
        let app = TestApp::new();
        let user = app.token_for(Role::User);

        for method in [Method::GET, Method::POST, Method::PUT, Method::DELETE] {
            let (status, body) = app
                .call(method, URI, Some(&user), Some(json!({"id": "x", "name": "y"})))
                .await;
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(body["error"], "Forbidden: Insufficient permissions");
        }
    }

    #[tokio::test]
    async fn test_product_lifecycle_writes_logs() {
        let app = TestApp::new();
        let admin = app.token_for(Role::Admin);

        let (status, body) = app
            .call(Method::POST, URI, Some(&admin), Some(json!({"name": "pera", "price": 2.5})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .call(Method::PUT, URI, Some(&admin), Some(json!({"id": id, "name": "pera verde"})))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);

        let (_, list) = app.call(Method::GET, URI, Some(&admin), None).await;
        assert_eq!(list[0]["id"], id.as_str());
        assert_eq!(list[0]["name"], "pera verde");
        assert_eq!(list[0]["price"], 2.5);

        let (status, _) = app
            .call(Method::DELETE, URI, Some(&admin), Some(json!({"id": id})))
            .await;
        assert_eq!(status, StatusCode::OK);

        let logs = app.state.storage.log_entries().unwrap();
        let actions: Vec<_> = logs.iter().map(|l| l.action.as_str()).collect();
        assert_eq!(actions, vec!["crear", "actualizar", "eliminar"]);
        assert!(logs[0].performed_by.starts_with("admin-"));
    }

    #[tokio::test]
    async fn test_missing_fields_and_bad_price() {
        let app = TestApp::new();
        let admin = app.token_for(Role::Superadmin);

        let (status, body) = app
            .call(Method::POST, URI, Some(&admin), Some(json!({"name": "  "})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing name field");

        let (status, body) = app
            .call(Method::POST, URI, Some(&admin), Some(json!({"name": "kiwi", "price": -1})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Precio inválido.");

        let (status, body) = app
            .call(Method::PUT, URI, Some(&admin), Some(json!({"name": "kiwi"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing id or name field");
    }

    #[tokio::test]
    async fn test_unknown_id_is_rejected_before_any_write() {
        let app = TestApp::new();
        let admin = app.token_for(Role::Admin);
        let keep = app
            .call(Method::POST, URI, Some(&admin), Some(json!({"name": "uva"})))
            .await
            .1["id"]
            .as_str()
            .unwrap()
            .to_string();

        let (status, body) = app
            .call(Method::DELETE, URI, Some(&admin), Some(json!({"id": "missing"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "El producto no existe.");

        let (status, _) = app
            .call(Method::PUT, URI, Some(&admin), Some(json!({"id": "missing", "name": "x"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(app.state.storage.get_product(&keep).unwrap().is_some());
        assert!(app.state.storage.get_product("missing").unwrap().is_none());
        // only the create was logged
        assert_eq!(app.state.storage.log_entries().unwrap().len(), 1);
    }
}
