// File Explorer Rust Library
// 基于浏览器的文件浏览服务核心库

// 配置管理模块
pub mod config;

// 文件浏览模块（路径解析、目录树、搜索、打包）
pub mod explorer;

// 日志模块
pub mod logging;

// Web服务器模块
pub mod server;

// 导出常用类型
pub use config::AppConfig;
pub use explorer::{ExplorerError, ExplorerErrorCode, ExplorerService, Node, NodeType};
pub use server::{build_router, AppState};
