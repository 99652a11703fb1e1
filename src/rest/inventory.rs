//! `/api/handleInventory` and `/api/lowStock`: stock counts, open to every role.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{ApiError, AppState, JsonBody, RestResponse};
use crate::models::{Keyed, Product, Stock};
use crate::policy::Caller;

pub const MAX_QUANTITY: u32 = 999_999;
pub const LOW_STOCK_THRESHOLD: u32 = 30;
pub const LOW_STOCK_LIMIT: usize = 3;

const PRODUCT_NOT_FOUND: &str = "El producto no existe.";
const QUANTITY_TOO_HIGH: &str = "Cantidad demasiado alta.";

/// Validates a `{productId, quantity}` body. The first failing rule wins.
/// Quantities may arrive as JSON numbers or numeric strings.
pub fn validate_stock_input(body: &Value) -> Result<(String, u32), ApiError> {
    let Some(obj) = body.as_object() else {
        return Err(ApiError::validation("Datos inválidos."));
    };

    let product_id = match obj.get("productId") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
        _ => return Err(ApiError::validation("ID de producto inválido.")),
    };

    let quantity = match obj.get("quantity") {
        None | Some(Value::Null) => {
            return Err(ApiError::validation("Cantidad no proporcionada."))
        }
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|q| q.is_finite()),
        Some(_) => None,
    }
    .ok_or_else(|| ApiError::validation("Cantidad debe ser un número."))?;

    if quantity.fract() != 0.0 {
        return Err(ApiError::validation("Cantidad debe ser entera."));
    }
    if quantity < 0.0 {
        return Err(ApiError::validation("Cantidad no puede ser negativa."));
    }
    if quantity > MAX_QUANTITY as f64 {
        return Err(ApiError::validation(QUANTITY_TOO_HIGH));
    }

    Ok((product_id, quantity as u32))
}

fn ensure_product(state: &AppState, product_id: &str) -> Result<(), ApiError> {
    match state
        .storage
        .get_product(product_id)
        .map_err(ApiError::rejected)?
    {
        Some(_) => Ok(()),
        None => Err(ApiError::validation(PRODUCT_NOT_FOUND)),
    }
}

pub async fn list_stock(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Keyed<Stock>>>, ApiError> {
    Ok(Json(state.storage.list_stock()?))
}

pub async fn create_stock(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<RestResponse>, ApiError> {
    let (product_id, quantity) = validate_stock_input(&body)?;
    ensure_product(&state, &product_id)?;

    let stock = Stock {
        quantity,
        created_at: Utc::now(),
        updated_at: None,
    };
    state
        .storage
        .put_stock(&product_id, &stock)
        .map_err(ApiError::rejected)?;

    info!(%product_id, quantity, by = %caller.email, "stock set");
    Ok(Json(RestResponse::ok()))
}

pub async fn update_stock(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<RestResponse>, ApiError> {
    let (product_id, quantity) = validate_stock_input(&body)?;
    ensure_product(&state, &product_id)?;

    let mut stock = state
        .storage
        .get_stock(&product_id)
        .map_err(ApiError::rejected)?
        .ok_or_else(|| ApiError::validation("El stock no existe."))?;
    stock.quantity = quantity;
    stock.updated_at = Some(Utc::now());
    state
        .storage
        .put_stock(&product_id, &stock)
        .map_err(ApiError::rejected)?;

    info!(%product_id, quantity, by = %caller.email, "stock updated");
    Ok(Json(RestResponse::ok()))
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct StockKeyBody {
    pub product_id: Option<String>,
}

pub async fn delete_stock(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<StockKeyBody>,
) -> Result<Json<RestResponse>, ApiError> {
    let product_id = body
        .product_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Missing productId"))?;
    ensure_product(&state, &product_id)?;

    state
        .storage
        .delete_stock(&product_id)
        .map_err(ApiError::rejected)?;

    info!(%product_id, by = %caller.email, "stock deleted");
    Ok(Json(RestResponse::ok()))
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct IncrementBody {
    pub product_name: Option<String>,
}

/// Either `{success:false, needsPrice:true, productName}` or
/// `{success:true, incremented:true, productId, productName, quantity}`.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct IncrementResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_price: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incremented: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub product_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}

/// PATCH: count one more unit of the product named in the body. Unknown
/// names ask the caller to collect a price and create the product first.
pub async fn increment_by_name(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<IncrementBody>,
) -> Result<Json<IncrementResponse>, ApiError> {
    let product_name = body
        .product_name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::validation("Missing productName"))?;

    let Some(product) = state
        .storage
        .find_product_by_name(&product_name)
        .map_err(ApiError::rejected)?
    else {
        return Ok(Json(IncrementResponse {
            success: false,
            needs_price: Some(true),
            incremented: None,
            product_id: None,
            product_name,
            quantity: None,
        }));
    };

    let stock = state
        .storage
        .increment_stock(&product.id, MAX_QUANTITY)
        .map_err(ApiError::rejected)?
        .ok_or_else(|| ApiError::validation(QUANTITY_TOO_HIGH))?;

    info!(product_id = %product.id, quantity = stock.quantity, by = %caller.email, "stock incremented");
    Ok(Json(IncrementResponse {
        success: true,
        needs_price: None,
        incremented: Some(true),
        product_id: Some(product.id),
        product_name,
        quantity: Some(stock.quantity),
    }))
}

#[derive(Deserialize, Debug, Default)]
pub struct LowStockQuery {
    pub threshold: Option<u32>,
    pub limit: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LowStockItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub price: f64,
}

/// Entries at or below `threshold`, scarcest first, at most `limit`.
pub fn low_stock_report(
    products: &[Keyed<Product>],
    stock: &[Keyed<Stock>],
    threshold: u32,
    limit: usize,
) -> Vec<LowStockItem> {
    let mut low: Vec<&Keyed<Stock>> = stock
        .iter()
        .filter(|s| s.doc.quantity <= threshold)
        .collect();
    low.sort_by_key(|s| s.doc.quantity);

    low.into_iter()
        .take(limit)
        .map(|s| {
            let product = products.iter().find(|p| p.id == s.id);
            LowStockItem {
                product_id: s.id.clone(),
                product_name: product
                    .map(|p| p.doc.name.clone())
                    .unwrap_or_else(|| "Producto desconocido".to_string()),
                quantity: s.doc.quantity,
                price: product.map(|p| p.doc.price).unwrap_or(0.0),
            }
        })
        .collect()
}

pub async fn low_stock(
    State(state): State<Arc<AppState>>,
    query: Result<Query<LowStockQuery>, QueryRejection>,
) -> Result<Json<Vec<LowStockItem>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::Validation(e.body_text()))?;
    let products = state.storage.list_products()?;
    let stock = state.storage.list_stock()?;
    Ok(Json(low_stock_report(
        &products,
        &stock,
        query.threshold.unwrap_or(LOW_STOCK_THRESHOLD),
        query.limit.unwrap_or(LOW_STOCK_LIMIT),
    )))
}
