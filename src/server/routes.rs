// 路由与中间件

use axum::{http::HeaderValue, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::server::handlers;
use crate::server::state::AppState;

/// 根据配置构造 CORS 层
///
/// 列表中包含 `*` 时放开所有来源
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.cors_origins.is_empty() || config.cors_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("忽略无效的 CORS 来源: {}", origin);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

/// 构建完整应用路由
pub fn build_router(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http()) // HTTP 请求日志
        .layer(cors_layer(&state.config.server));

    let api_routes = Router::new()
        .route("/tree", get(handlers::get_tree))
        .route("/download", get(handlers::download_file))
        .route("/download-folder", get(handlers::download_folder))
        .route("/search", get(handlers::search))
        .route("/info", get(handlers::get_info));

    let mut app = Router::new()
        .nest("/api", api_routes)
        .route("/health", get(handlers::health_check));

    // 前端静态资源（可选）
    if let Some(static_dir) = state.config.server.static_dir.as_ref() {
        if static_dir.is_dir() {
            info!("前端资源目录: {:?}", static_dir);
            let index_html = static_dir.join("index.html");
            app = app.fallback_service(
                ServeDir::new(static_dir).not_found_service(ServeFile::new(index_html)),
            );
        } else {
            warn!("前端资源目录不存在，跳过静态文件服务: {:?}", static_dir);
        }
    }

    app.with_state(state).layer(middleware)
}
