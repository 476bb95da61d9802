use crate::{
    error::PaymentError,
    handlers::AppState,
    models::{ApiResponse, PaymentQr},
};
use axum::{extract::State, Json};
use chrono::Utc;
use qrcode::QrCode;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct QrBody {
    pub deeplink: Option<String>,
}

pub async fn generate_qr(
    State(state): State<AppState>,
    Json(body): Json<QrBody>,
) -> Result<Json<ApiResponse<PaymentQr>>, PaymentError> {
    let deeplink = body
        .deeplink
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .ok_or_else(|| PaymentError::MissingField("deeplink".to_string()))?;

    let intent = state.payments.decode(&deeplink)?;

    Ok(Json(ApiResponse {
        success: true,
        data: PaymentQr {
            qr_text: render_qr(&deeplink)?,
            transaction_id: intent.request().transaction_id.to_string(),
            deeplink,
        },
        timestamp: Utc::now(),
        cache_hit: false,
        data_source: "deeplink".to_string(),
        request_id: Uuid::new_v4().to_string(),
    }))
}

/// Text rendering, two columns per module so it stays square in a terminal.
pub fn render_qr(data: &str) -> Result<String, PaymentError> {
    let code = QrCode::new(data.as_bytes())
        .map_err(|e| PaymentError::InternalError(format!("QR encoding failed: {}", e)))?;

    Ok(code
        .render::<char>()
        .quiet_zone(false)
        .module_dimensions(2, 1)
        .build())
}
