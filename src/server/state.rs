// 应用状态

use crate::config::AppConfig;
use crate::explorer::ExplorerService;
use std::sync::Arc;

/// 应用全局状态
///
/// 进程启动后只读，请求之间不共享可变状态
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Arc<AppConfig>,
    /// 文件浏览服务
    pub explorer: Arc<ExplorerService>,
}

impl AppState {
    /// 创建应用状态，根目录无效时启动失败
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let explorer = ExplorerService::new(&config.explorer)?;
        tracing::info!("根目录: {:?}", explorer.root());

        Ok(Self {
            config: Arc::new(config),
            explorer: Arc::new(explorer),
        })
    }
}
