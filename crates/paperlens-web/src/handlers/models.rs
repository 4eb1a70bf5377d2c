use axum::Json;

use crate::models::ModelsResponse;

/// Static recommendations; provider model listings differ too much to proxy.
pub async fn models() -> Json<ModelsResponse> {
    Json(ModelsResponse::default())
}
