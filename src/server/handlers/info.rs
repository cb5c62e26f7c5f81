// 服务信息与健康检查

use axum::{extract::State, Json};
use serde::Serialize;

use crate::explorer::{ExplorerError, ServerInfo};
use crate::server::state::AppState;

/// GET /api/info
/// 根目录、服务器时间和运行平台
pub async fn get_info(State(state): State<AppState>) -> Result<Json<ServerInfo>, ExplorerError> {
    let info = state.explorer.info().await?;
    Ok(Json(info))
}

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
    })
}
