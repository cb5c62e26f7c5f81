// 文件浏览核心模块
//
// 将配置的根目录以目录树形式对外暴露：路径约束、目录树、名称搜索和文件夹打包

mod archive;
mod resolver;
mod search;
mod service;
mod tree;
mod types;

pub use archive::{ArchiveError, ArchiveStats, ArchiveStreamer, DEFAULT_ARCHIVE_NAME};
pub use resolver::{PathResolver, ResolvedPath};
pub use search::{SearchEngine, MAX_SEARCH_DEPTH, MAX_SEARCH_RESULTS};
pub use service::{ArchiveDownload, ExplorerService, FileDownload};
pub use tree::{sort_nodes, SortOptions, TreeBuilder};
pub use types::*;
