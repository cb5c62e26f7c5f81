// 文件浏览服务
//
// 组合路径解析、目录树、搜索和打包，文件系统调用统一放到阻塞线程池执行

use std::io;
use std::path::PathBuf;

use chrono::Utc;
use futures::stream::BoxStream;

use crate::config::EnvDetector;

use super::archive::ArchiveStreamer;
use super::resolver::{PathResolver, ResolvedPath};
use super::search::SearchEngine;
use super::tree::{SortOptions, TreeBuilder};
use super::types::*;

/// 单文件下载
#[derive(Debug)]
pub struct FileDownload {
    pub file: tokio::fs::File,
    pub name: String,
    pub size: u64,
}

/// 文件夹打包下载
pub struct ArchiveDownload {
    pub name: String,
    pub stream: BoxStream<'static, io::Result<Vec<u8>>>,
}

/// 文件浏览服务
#[derive(Debug, Clone)]
pub struct ExplorerService {
    resolver: PathResolver,
    tree: TreeBuilder,
    search: SearchEngine,
    archive: ArchiveStreamer,
}

impl ExplorerService {
    /// 根据配置创建服务，根目录无效时返回错误
    pub fn new(config: &ExplorerConfig) -> anyhow::Result<Self> {
        let root = config.resolve_root()?;
        Ok(Self::with_root(root, config))
    }

    /// `root` 必须已经规范化
    pub fn with_root(root: PathBuf, config: &ExplorerConfig) -> Self {
        let resolver = PathResolver::new(root, config);
        Self {
            tree: TreeBuilder::new(resolver.clone()),
            search: SearchEngine::new(resolver.clone()),
            archive: ArchiveStreamer::new(resolver.clone()),
            resolver,
        }
    }

    pub fn root(&self) -> &std::path::Path {
        self.resolver.root()
    }

    pub fn resolve(&self, path: &str) -> Result<ResolvedPath, ExplorerError> {
        self.resolver.resolve(path)
    }

    /// 目录树
    pub async fn tree(&self, req: TreeRequest) -> Result<TreeResponse, ExplorerError> {
        let target = self.resolve(&req.path)?;
        let sort = SortOptions {
            field: req.sort,
            order: req.order,
        };
        let builder = self.tree.clone();
        run_blocking(move || builder.build(&target, sort)).await
    }

    /// 名称搜索，空白查询直接返回空结果
    pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse, ExplorerError> {
        if req.q.trim().is_empty() {
            return Ok(SearchResponse {
                results: Vec::new(),
            });
        }

        let root = self.resolve(&req.path)?;
        let engine = self.search.clone();
        let query = req.q;
        let results = run_blocking(move || {
            // 只有搜索根目录本身的失败需要报错，子目录失败在遍历中跳过
            let unavailable = |message: String| {
                ExplorerError::new(ExplorerErrorCode::DirectoryUnavailable)
                    .with_path(root.relative.clone())
                    .with_message(message)
            };
            match std::fs::metadata(&root.absolute) {
                Ok(metadata) if metadata.is_dir() => Ok(engine.search(&root, &query)),
                Ok(_) => Err(unavailable("指定路径不是目录".to_string())),
                Err(e) => {
                    tracing::error!("读取搜索目录失败: {:?}, 错误: {}", root.absolute, e);
                    Err(unavailable(format!("无法读取目录: {}", e)))
                }
            }
        })
        .await?;
        Ok(SearchResponse { results })
    }

    /// 打开单个文件用于下载
    pub async fn open_file(&self, path: Option<&str>) -> Result<FileDownload, ExplorerError> {
        let raw = match path {
            Some(p) if !p.trim().is_empty() => p,
            _ => return Err(ExplorerError::new(ExplorerErrorCode::MissingParameter)),
        };

        let target = self.resolve(raw)?;
        let name = match target.name() {
            Some(name) => name.to_string(),
            None => {
                return Err(ExplorerError::not_found(raw).with_message("根目录不能作为文件下载"))
            }
        };

        let metadata = tokio::fs::metadata(&target.absolute)
            .await
            .map_err(|_| ExplorerError::not_found(raw))?;
        if !metadata.is_file() {
            return Err(ExplorerError::not_found(raw).with_message("指定路径不是文件"));
        }

        let file = tokio::fs::File::open(&target.absolute).await.map_err(|e| {
            tracing::warn!("打开文件失败: {:?}, 错误: {}", target.absolute, e);
            match e.kind() {
                io::ErrorKind::NotFound => ExplorerError::not_found(raw),
                _ => ExplorerError::new(ExplorerErrorCode::Internal)
                    .with_path(raw)
                    .with_message(format!("打开文件失败: {}", e)),
            }
        })?;

        Ok(FileDownload {
            file,
            name,
            size: metadata.len(),
        })
    }

    /// 准备文件夹打包下载
    ///
    /// 目标校验在开始输出前完成，之后的错误只能通过中断流来体现
    pub async fn archive(&self, path: &str) -> Result<ArchiveDownload, ExplorerError> {
        let target = self.resolve(path)?;

        let streamer = self.archive.clone();
        let checked = target.clone();
        run_blocking(move || streamer.check_target(&checked)).await?;

        Ok(ArchiveDownload {
            name: self.archive.archive_name(&target),
            stream: self.archive.stream(target),
        })
    }

    /// 服务信息
    pub async fn info(&self) -> Result<ServerInfo, ExplorerError> {
        let root = self.root().to_path_buf();
        let metadata = tokio::fs::metadata(&root).await.map_err(|e| {
            tracing::error!("读取根目录信息失败: {:?}, 错误: {}", root, e);
            ExplorerError::new(ExplorerErrorCode::Internal)
                .with_message(format!("无法读取根目录: {}", e))
        })?;

        let platform = run_blocking(|| Ok(EnvDetector::platform_info())).await?;

        Ok(ServerInfo {
            root_path: root.to_string_lossy().to_string(),
            root_modified: modified_of(&metadata),
            server_time: system_time_to_iso8601(Utc::now().into()),
            platform,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}

/// 在阻塞线程池中执行文件系统操作
async fn run_blocking<T, F>(f: F) -> Result<T, ExplorerError>
where
    F: FnOnce() -> Result<T, ExplorerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!("阻塞任务执行失败: {}", e);
        ExplorerError::new(ExplorerErrorCode::Internal).with_message(format!("任务执行失败: {}", e))
    })?
}
