// 路径解析与根目录约束
//
// 所有客户端路径在访问文件系统前都必须经过这里，防止路径穿越

use std::fs::{self, Metadata};
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::config::ExplorerConfig;

use super::types::ExplorerError;

/// 校验通过的路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// 根目录内的绝对路径
    pub absolute: PathBuf,
    /// 相对根目录的 POSIX 路径，根目录为空字符串
    pub relative: String,
}

impl ResolvedPath {
    pub fn is_root(&self) -> bool {
        self.relative.is_empty()
    }

    /// 最后一段名称，根目录返回 None
    pub fn name(&self) -> Option<&str> {
        self.relative.rsplit('/').next().filter(|s| !s.is_empty())
    }
}

/// 目录条目（已通过隐藏文件和符号链接过滤）
#[derive(Debug)]
pub struct DirItem {
    pub name: String,
    /// 逻辑路径（沿用访问时的路径）
    pub path: PathBuf,
    /// 真实路径，用于符号链接环检测
    pub real_path: PathBuf,
    pub is_dir: bool,
    /// stat 失败时为 None（例如读取期间被删除）
    pub metadata: Option<Metadata>,
}

/// 路径解析器
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    show_hidden: bool,
    follow_symlinks: bool,
}

impl PathResolver {
    /// `root` 必须是已规范化的绝对路径（见 `ExplorerConfig::resolve_root`）
    pub fn new(root: PathBuf, config: &ExplorerConfig) -> Self {
        Self {
            root,
            show_hidden: config.show_hidden,
            follow_symlinks: config.follow_symlinks,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn follow_symlinks(&self) -> bool {
        self.follow_symlinks
    }

    /// 将客户端相对路径解析为根目录内的绝对路径
    ///
    /// 先统一分隔符并按词法处理 `.`/`..`，再检查是否仍在根目录下；
    /// 目标存在时还要求其真实路径在根目录下，防止符号链接逃逸
    pub fn resolve(&self, raw: &str) -> Result<ResolvedPath, ExplorerError> {
        if raw.contains('\0') {
            return Err(ExplorerError::invalid_path(raw.replace('\0', "\\0")));
        }

        let unified = raw.replace('\\', "/");
        let joined = self.root.join(&unified);

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(ExplorerError::invalid_path(raw));
                    }
                }
                other => normalized.push(other.as_os_str()),
            }
        }

        let relative = match normalized.strip_prefix(&self.root) {
            Ok(rel) => rel,
            Err(_) => {
                tracing::debug!("拒绝越界路径: {:?}", raw);
                return Err(ExplorerError::invalid_path(raw));
            }
        };

        // 不跟随符号链接时，路径中任何一段是链接都拒绝（与列表中隐藏链接保持一致）
        if !self.follow_symlinks {
            let mut current = self.root.clone();
            for component in relative.components() {
                current.push(component);
                match fs::symlink_metadata(&current) {
                    Ok(metadata) if metadata.file_type().is_symlink() => {
                        tracing::debug!("拒绝经过符号链接的路径: {:?}", raw);
                        return Err(ExplorerError::invalid_path(raw));
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }

        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if let Ok(real) = dunce::canonicalize(&normalized) {
            if !real.starts_with(&self.root) {
                tracing::warn!("拒绝指向根目录外的符号链接: {:?} -> {:?}", raw, real);
                return Err(ExplorerError::invalid_path(raw));
            }
        }

        Ok(ResolvedPath {
            absolute: normalized,
            relative,
        })
    }

    /// 是否为隐藏条目
    pub fn is_hidden(&self, name: &str) -> bool {
        !self.show_hidden && name.starts_with('.')
    }

    /// 符号链接是否允许跟随：需开启跟随且目标在根目录内
    ///
    /// 返回目标的真实路径
    pub fn admit_symlink(&self, path: &Path) -> Option<PathBuf> {
        if !self.follow_symlinks {
            return None;
        }
        let target = dunce::canonicalize(path).ok()?;
        target.starts_with(&self.root).then_some(target)
    }

    /// 列出目录的直接子项（未排序）
    ///
    /// `real_dir` 为 `dir` 的真实路径
    pub fn list_dir(&self, dir: &Path, real_dir: &Path) -> io::Result<Vec<DirItem>> {
        let mut items = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("跳过无法读取的目录项: {:?}, 错误: {}", dir, e);
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().to_string();
            if self.is_hidden(&name) {
                continue;
            }

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(_) => continue,
            };

            let (real_path, metadata) = if file_type.is_symlink() {
                match self.admit_symlink(&path) {
                    Some(target) => (target, fs::metadata(&path).ok()),
                    None => continue,
                }
            } else {
                (real_dir.join(&name), entry.metadata().ok())
            };

            let is_dir = match &metadata {
                Some(m) => m.is_dir(),
                None => file_type.is_dir(),
            };

            items.push(DirItem {
                name,
                path,
                real_path,
                is_dir,
                metadata,
            });
        }

        Ok(items)
    }
}

/// 拼接相对路径
pub fn join_relative(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}
