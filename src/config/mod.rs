// 配置管理模块

pub mod env_detector;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub use env_detector::{EnvDetector, OsType, PlatformInfo};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/explorer.toml";

/// 覆盖配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "EXPLORER_CONFIG";

/// 覆盖根目录的环境变量
pub const ROOT_DIR_ENV: &str = "EXPLORER_ROOT";

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 文件浏览配置
    #[serde(default)]
    pub explorer: ExplorerConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    20 * 1024 * 1024 // 20MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS允许的源（包含 "*" 表示任意）
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    /// 前端静态资源目录（可选）
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

fn default_host() -> String {
    // Docker 中需要监听所有网卡才能被端口映射访问
    if EnvDetector::is_docker() {
        "0.0.0.0".to_string()
    } else {
        "127.0.0.1".to_string()
    }
}

fn default_port() -> u16 {
    3000
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            static_dir: None,
        }
    }
}

/// 文件浏览配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// 对外暴露的根目录
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// 是否显示隐藏文件（以 . 开头）
    #[serde(default = "default_show_hidden")]
    pub show_hidden: bool,
    /// 是否跟随符号链接（仅跟随指向根目录内部的链接）
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_root_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn default_show_hidden() -> bool {
    true
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            show_hidden: default_show_hidden(),
            follow_symlinks: false,
        }
    }
}

impl ExplorerConfig {
    /// 校验并规范化根目录
    ///
    /// 远程存储（如 `gdrive://`、`s3://`）不受支持，直接拒绝
    pub fn resolve_root(&self) -> Result<PathBuf> {
        let raw = self.root_dir.to_string_lossy();
        if let Some(scheme) = remote_scheme(&raw) {
            anyhow::bail!("不支持远程存储作为根目录: {} (协议: {})", raw, scheme);
        }

        let canonical = dunce::canonicalize(&self.root_dir)
            .with_context(|| format!("根目录不存在或无法访问: {:?}", self.root_dir))?;

        if !canonical.is_dir() {
            anyhow::bail!("根目录不是文件夹: {:?}", canonical);
        }

        Ok(canonical)
    }
}

/// 识别 `scheme://` 形式的远程地址
fn remote_scheme(raw: &str) -> Option<&str> {
    let idx = raw.find("://")?;
    let scheme = &raw[..idx];
    let valid = !scheme.is_empty()
        && scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            explorer: ExplorerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// 配置文件路径（环境变量优先）
    pub fn config_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// 从文件加载配置
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {:?}", path);
        Ok(())
    }

    /// 加载或创建默认配置
    ///
    /// 文件不存在时写出默认配置；文件损坏时只告警，不覆盖
    pub async fn load_or_default(path: &Path) -> Self {
        let mut config = if fs::try_exists(path).await.unwrap_or(false) {
            match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("配置文件加载成功: {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                    Self::default()
                }
            }
        } else {
            let config = Self::default();
            if let Err(e) = config.save_to_file(path).await {
                tracing::error!("保存默认配置失败: {:#}", e);
            }
            config
        };

        config.apply_env_overrides();
        config
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        if let Some(root) = std::env::var_os(ROOT_DIR_ENV) {
            tracing::info!("根目录由环境变量 {} 指定: {:?}", ROOT_DIR_ENV, root);
            self.explorer.root_dir = PathBuf::from(root);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert!(config.explorer.show_hidden);
        assert!(!config.explorer.follow_symlinks);
        assert_eq!(config.log.level, "info");
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("explorer.toml");

        let mut config = AppConfig::default();
        config.server.port = 8080;
        config.explorer.root_dir = dir.path().to_path_buf();
        config.save_to_file(&path).await.unwrap();

        let loaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.server.port, 8080);
        assert_eq!(loaded.explorer.root_dir, dir.path());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [explorer]
            root_dir = "/srv/files"
            "#,
        )
        .unwrap();
        assert_eq!(config.explorer.root_dir, PathBuf::from("/srv/files"));
        assert!(config.explorer.show_hidden);
        assert_eq!(config.server.port, 3000);
        assert!(config.log.enabled);
    }

    #[tokio::test]
    async fn test_broken_config_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("explorer.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        let config = AppConfig::load_or_default(&path).await;
        assert_eq!(config.server.port, 3000);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not = [valid");
    }

    #[test]
    fn test_resolve_root() {
        let dir = TempDir::new().unwrap();
        let config = ExplorerConfig {
            root_dir: dir.path().join("."),
            ..Default::default()
        };
        let root = config.resolve_root().unwrap();
        assert!(root.is_absolute());
        assert_eq!(root, dunce::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_resolve_root_rejects_missing_and_files() {
        let dir = TempDir::new().unwrap();
        let missing = ExplorerConfig {
            root_dir: dir.path().join("missing"),
            ..Default::default()
        };
        assert!(missing.resolve_root().is_err());

        let file = dir.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();
        let not_dir = ExplorerConfig {
            root_dir: file,
            ..Default::default()
        };
        assert!(not_dir.resolve_root().is_err());
    }

    #[test]
    fn test_remote_root_rejected() {
        for remote in ["gdrive://My Drive", "s3://bucket/prefix", "smb+ssh://host/share"] {
            let config = ExplorerConfig {
                root_dir: PathBuf::from(remote),
                ..Default::default()
            };
            let err = config.resolve_root().unwrap_err();
            assert!(err.to_string().contains("远程存储"), "{}", remote);
        }

        assert_eq!(remote_scheme(r"C:\data"), None);
        assert_eq!(remote_scheme("/srv/files"), None);
        assert_eq!(remote_scheme("gdrive://x"), Some("gdrive"));
    }
}
