// 文件浏览模块数据类型定义

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

// 重新导出配置模块中的类型
pub use crate::config::{ExplorerConfig, PlatformInfo};

/// 根目录展示名称
pub const ROOT_DISPLAY_NAME: &str = "Root";

/// 文件浏览错误码
///
/// 4xxxx 为客户端错误，5xxxx 为服务端错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorerErrorCode {
    /// 路径越界或格式无效
    InvalidPath = 40001,
    /// 缺少必需参数
    MissingParameter = 40002,
    /// 路径不存在或类型不符
    NotFound = 40401,
    /// 目录无法读取
    DirectoryUnavailable = 50001,
    /// 打包失败
    ArchiveFailure = 50002,
    /// 内部错误
    Internal = 50003,
}

impl ExplorerErrorCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidPath => "路径无效",
            Self::MissingParameter => "缺少路径参数",
            Self::NotFound => "文件不存在",
            Self::DirectoryUnavailable => "无法读取目录",
            Self::ArchiveFailure => "打包下载失败",
            Self::Internal => "服务器内部错误",
        }
    }

    /// 是否为客户端错误（不按服务端故障记录）
    pub fn is_client_error(&self) -> bool {
        self.code() < 50000
    }
}

/// 文件浏览错误
#[derive(Debug)]
pub struct ExplorerError {
    pub code: ExplorerErrorCode,
    pub message: String,
    pub path: Option<String>,
}

impl ExplorerError {
    pub fn new(code: ExplorerErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            path: None,
        }
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::new(ExplorerErrorCode::InvalidPath).with_path(path)
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::new(ExplorerErrorCode::NotFound).with_path(path)
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl std::fmt::Display for ExplorerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.path {
            Some(ref path) if !path.is_empty() => write!(f, "{}: {}", self.message, path),
            _ => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ExplorerError {}

/// 节点类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Folder,
    File,
}

/// 文件树节点
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Node {
    /// 名称
    pub name: String,
    /// 节点类型
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// 相对根目录的路径（POSIX 风格）
    pub path: String,
    /// 文件为字节数，文件夹为直接子项数量
    pub size: u64,
    /// 修改时间 (ISO8601)
    pub modified: String,
    /// 小写扩展名，仅文件
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// 子节点，仅文件夹
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Node>>,
    /// 读取失败标记，仅无法读取的文件夹
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Node {
    pub fn is_folder(&self) -> bool {
        self.node_type == NodeType::Folder
    }

    /// 文件节点
    pub fn file(name: String, path: String, size: u64, modified: String) -> Self {
        let extension = extension_of(Path::new(&name));
        Self {
            name,
            node_type: NodeType::File,
            path,
            size,
            modified,
            extension,
            children: None,
            error: None,
        }
    }

    /// 文件夹节点，size 取子节点数量
    pub fn folder(name: String, path: String, modified: String, children: Vec<Node>) -> Self {
        Self {
            name,
            node_type: NodeType::Folder,
            path,
            size: children.len() as u64,
            modified,
            extension: None,
            children: Some(children),
            error: None,
        }
    }

    /// 无法读取的文件夹：空子节点 + 错误标记
    pub fn unreadable_folder(name: String, path: String, modified: String, error: String) -> Self {
        Self {
            name,
            node_type: NodeType::Folder,
            path,
            size: 0,
            modified,
            extension: None,
            children: Some(Vec::new()),
            error: Some(error),
        }
    }
}

/// 当前文件夹信息
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FolderInfo {
    pub name: String,
    pub path: String,
    pub modified: String,
    #[serde(rename = "itemCount")]
    pub item_count: usize,
}

/// 排序字段
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Name,
    Size,
    Modified,
    Extension,
}

/// 排序顺序
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// 目录树请求参数
#[derive(Debug, Default, Deserialize)]
pub struct TreeRequest {
    /// 相对路径，缺省为根目录
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub order: SortOrder,
}

/// 目录树响应
#[derive(Debug, Serialize)]
pub struct TreeResponse {
    pub tree: Vec<Node>,
    #[serde(rename = "currentFolder")]
    pub current_folder: FolderInfo,
}

/// 搜索请求参数
#[derive(Debug, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub path: String,
}

/// 搜索响应
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<Node>,
}

/// 下载请求参数
#[derive(Debug, Default, Deserialize)]
pub struct DownloadRequest {
    pub path: Option<String>,
}

/// 服务信息响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// 根目录绝对路径
    pub root_path: String,
    /// 根目录修改时间
    pub root_modified: String,
    /// 服务器当前时间 (ISO8601)
    pub server_time: String,
    pub platform: PlatformInfo,
    pub version: String,
}

/// 获取小写扩展名
pub fn extension_of(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// 将 SystemTime 转换为 ISO8601 字符串
pub fn system_time_to_iso8601(time: SystemTime) -> String {
    let datetime: DateTime<Utc> = time.into();
    datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// 读取元数据中的修改时间，失败时为空字符串
pub fn modified_of(metadata: &std::fs::Metadata) -> String {
    metadata
        .modified()
        .map(system_time_to_iso8601)
        .unwrap_or_default()
}
