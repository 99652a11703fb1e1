//! `/api/runScanner`: start or stop the external scanner with the caller's token.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, AppState};
use crate::policy::Caller;

#[derive(Deserialize, Debug, Default)]
pub struct ScannerBody {
    pub action: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ScannerResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped: Option<bool>,
}

/// An empty body, or one without `action`, means "start".
pub async fn run_scanner(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<Json<ScannerResponse>, ApiError> {
    let body: ScannerBody = if body.iter().all(u8::is_ascii_whitespace) {
        ScannerBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::Validation(e.to_string()))?
    };

    match body.action.as_deref().unwrap_or("start") {
        "start" => {
            let pid = state.scanner.start(&caller.token).await?;
            info!(?pid, by = %caller.email, "scanner start requested");
            Ok(Json(ScannerResponse {
                started: Some(true),
                pid,
                ..Default::default()
            }))
        }
        "stop" => {
            state.scanner.stop().await?;
            info!(by = %caller.email, "scanner stop requested");
            Ok(Json(ScannerResponse {
                stopped: Some(true),
                ..Default::default()
            }))
        }
        _ => Err(ApiError::validation("Acción inválida.")),
    }
}
