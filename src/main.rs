use file_explorer_rust::{build_router, config::AppConfig, logging, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = AppConfig::config_path();
    let config = AppConfig::load_or_default(&config_path).await;

    // 🔥 初始化日志系统（必须保持 _log_guard 存活）
    let _log_guard = logging::init_logging(&config.log);

    info!("File Explorer v{} 启动中...", env!("CARGO_PKG_VERSION"));
    info!("配置文件: {:?}", config_path);

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // 根目录无效时直接退出
    let app_state = AppState::new(config)?;
    let app = build_router(app_state);

    info!("服务器启动在: http://{}", addr);
    info!("API 基础路径: http://{}/api", addr);
    info!("健康检查: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("服务器错误: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("收到 Ctrl+C，开始关闭...");
        }
    }

    info!("应用已退出");
    Ok(())
}
