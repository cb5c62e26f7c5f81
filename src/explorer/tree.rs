// 目录树构建
//
// 递归展开整棵目录树，子目录读取失败时降级为带错误标记的节点

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::resolver::{join_relative, PathResolver, ResolvedPath};
use super::types::*;

/// 排序选项（每次请求单独传入）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortOptions {
    pub field: SortField,
    pub order: SortOrder,
}

/// 目录树构建器
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    resolver: PathResolver,
}

impl TreeBuilder {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// 构建目标目录的完整树及当前文件夹信息
    pub fn build(
        &self,
        target: &ResolvedPath,
        sort: SortOptions,
    ) -> Result<TreeResponse, ExplorerError> {
        let unavailable = |message: String| {
            ExplorerError::new(ExplorerErrorCode::DirectoryUnavailable)
                .with_path(target.relative.clone())
                .with_message(message)
        };

        let metadata = fs::metadata(&target.absolute).map_err(|e| {
            tracing::error!("读取目录信息失败: {:?}, 错误: {}", target.absolute, e);
            unavailable(format!("无法读取目录: {}", e))
        })?;

        if !metadata.is_dir() {
            return Err(unavailable("指定路径不是目录".to_string()));
        }

        let real_dir =
            dunce::canonicalize(&target.absolute).unwrap_or_else(|_| target.absolute.clone());
        let mut ancestors = vec![real_dir.clone()];

        let tree = self
            .build_children(&target.absolute, &real_dir, &target.relative, sort, &mut ancestors)
            .map_err(|e| {
                tracing::error!("读取目录失败: {:?}, 错误: {}", target.absolute, e);
                unavailable(format!("无法读取目录: {}", e))
            })?;

        let current_folder = FolderInfo {
            name: target.name().unwrap_or(ROOT_DISPLAY_NAME).to_string(),
            path: target.relative.clone(),
            modified: modified_of(&metadata),
            item_count: tree.len(),
        };

        Ok(TreeResponse {
            tree,
            current_folder,
        })
    }

    /// 递归构建子节点
    ///
    /// `ancestors` 保存当前递归链上各目录的真实路径
    fn build_children(
        &self,
        dir: &Path,
        real_dir: &Path,
        rel: &str,
        sort: SortOptions,
        ancestors: &mut Vec<PathBuf>,
    ) -> io::Result<Vec<Node>> {
        let items = self.resolver.list_dir(dir, real_dir)?;
        let mut nodes = Vec::with_capacity(items.len());

        for item in items {
            let path = join_relative(rel, &item.name);
            let modified = item.metadata.as_ref().map(modified_of).unwrap_or_default();

            if !item.is_dir {
                match item.metadata {
                    Some(metadata) => {
                        nodes.push(Node::file(item.name, path, metadata.len(), modified))
                    }
                    None => tracing::debug!("跳过无法获取信息的文件: {:?}", item.path),
                }
                continue;
            }

            if ancestors.contains(&item.real_path) {
                tracing::debug!("跳过形成环的符号链接: {:?} -> {:?}", item.path, item.real_path);
                continue;
            }

            ancestors.push(item.real_path.clone());
            let children = self.build_children(&item.path, &item.real_path, &path, sort, ancestors);
            ancestors.pop();

            nodes.push(folder_node(item.name, path, modified, children));
        }

        sort_nodes(&mut nodes, sort);
        Ok(nodes)
    }
}

/// 子目录读取失败时返回带错误标记的空节点，不影响同级其他节点
fn folder_node(
    name: String,
    path: String,
    modified: String,
    children: io::Result<Vec<Node>>,
) -> Node {
    match children {
        Ok(children) => Node::folder(name, path, modified, children),
        Err(e) => {
            tracing::warn!("子目录无法读取，返回空节点: {:?}, 错误: {}", path, e);
            Node::unreadable_folder(name, path, modified, e.to_string())
        }
    }
}

/// 按名称比较：先忽略大小写，再按原始名称区分
pub(crate) fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// 文件夹优先
pub(crate) fn compare_kind(a_is_dir: bool, b_is_dir: bool) -> Ordering {
    match (a_is_dir, b_is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// 对同一层节点排序，文件夹始终排在前面
pub fn sort_nodes(nodes: &mut [Node], sort: SortOptions) {
    nodes.sort_by(|a, b| {
        let kind = compare_kind(a.is_folder(), b.is_folder());
        if kind != Ordering::Equal {
            return kind;
        }

        let cmp = match sort.field {
            SortField::Name => Ordering::Equal,
            SortField::Size => a.size.cmp(&b.size),
            SortField::Modified => a.modified.cmp(&b.modified),
            SortField::Extension => a.extension.cmp(&b.extension),
        }
        .then_with(|| compare_names(&a.name, &b.name));

        match sort.order {
            SortOrder::Asc => cmp,
            SortOrder::Desc => cmp.reverse(),
        }
    });
}
