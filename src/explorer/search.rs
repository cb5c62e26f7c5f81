// 文件名搜索
//
// 深度优先遍历，按名称子串（忽略大小写）匹配，深度和结果数都有上限

use std::path::{Path, PathBuf};

use super::resolver::{join_relative, PathResolver, ResolvedPath};
use super::tree::{compare_kind, compare_names};
use super::types::*;

/// 最大递归深度（搜索根目录的直接子项为第 0 层）
pub const MAX_SEARCH_DEPTH: usize = 10;

/// 最大结果数
pub const MAX_SEARCH_RESULTS: usize = 100;

/// 搜索引擎
#[derive(Debug, Clone)]
pub struct SearchEngine {
    resolver: PathResolver,
    max_depth: usize,
    max_results: usize,
}

struct SearchState {
    needle: String,
    results: Vec<Node>,
    ancestors: Vec<PathBuf>,
}

impl SearchEngine {
    pub fn new(resolver: PathResolver) -> Self {
        Self::with_limits(resolver, MAX_SEARCH_DEPTH, MAX_SEARCH_RESULTS)
    }

    pub fn with_limits(resolver: PathResolver, max_depth: usize, max_results: usize) -> Self {
        Self {
            resolver,
            max_depth,
            max_results,
        }
    }

    /// 在 `root` 下搜索名称包含 `query` 的文件和文件夹
    ///
    /// 空白查询直接返回空结果；无法读取的目录静默跳过
    pub fn search(&self, root: &ResolvedPath, query: &str) -> Vec<Node> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || self.max_results == 0 {
            return Vec::new();
        }

        let real_root =
            dunce::canonicalize(&root.absolute).unwrap_or_else(|_| root.absolute.clone());
        let mut state = SearchState {
            needle,
            results: Vec::new(),
            ancestors: vec![real_root.clone()],
        };

        self.search_dir(&root.absolute, &real_root, &root.relative, 0, &mut state);

        tracing::debug!(
            "搜索完成: root={:?}, query={:?}, 结果数={}",
            root.relative,
            query,
            state.results.len()
        );
        state.results
    }

    fn search_dir(
        &self,
        dir: &Path,
        real_dir: &Path,
        rel: &str,
        depth: usize,
        state: &mut SearchState,
    ) {
        if depth > self.max_depth || self.is_full(state) {
            return;
        }

        let mut items = match self.resolver.list_dir(dir, real_dir) {
            Ok(items) => items,
            Err(e) => {
                tracing::debug!("搜索时跳过无法读取的目录: {:?}, 错误: {}", dir, e);
                return;
            }
        };
        items.sort_by(|a, b| {
            compare_kind(a.is_dir, b.is_dir).then_with(|| compare_names(&a.name, &b.name))
        });

        for item in items {
            if self.is_full(state) {
                return;
            }

            let path = join_relative(rel, &item.name);
            let matched = item.name.to_lowercase().contains(&state.needle);

            if !item.is_dir {
                if matched {
                    if let Some(metadata) = &item.metadata {
                        state.results.push(Node::file(
                            item.name,
                            path,
                            metadata.len(),
                            modified_of(metadata),
                        ));
                    }
                }
                continue;
            }

            if state.ancestors.contains(&item.real_path) {
                continue;
            }

            if matched {
                let modified = item.metadata.as_ref().map(modified_of).unwrap_or_default();
                let child_count = self
                    .resolver
                    .list_dir(&item.path, &item.real_path)
                    .map(|children| children.len() as u64)
                    .unwrap_or(0);
                let mut node = Node::folder(item.name.clone(), path.clone(), modified, Vec::new());
                node.size = child_count;
                state.results.push(node);
            }

            state.ancestors.push(item.real_path.clone());
            self.search_dir(&item.path, &item.real_path, &path, depth + 1, state);
            state.ancestors.pop();
        }
    }

    fn is_full(&self, state: &SearchState) -> bool {
        state.results.len() >= self.max_results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExplorerConfig;
    use std::fs;
    use tempfile::TempDir;

    fn engine_for(dir: &TempDir) -> (SearchEngine, PathResolver) {
        let root = dunce::canonicalize(dir.path()).unwrap();
        let resolver = PathResolver::new(root, &ExplorerConfig::default());
        (SearchEngine::new(resolver.clone()), resolver)
    }

    #[test]
    fn test_scenario_search() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("Docs")).unwrap();
        fs::write(dir.path().join("Docs/report.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("readme.txt"), b"hello").unwrap();
        let (engine, resolver) = engine_for(&dir);

        let results = engine.search(&resolver.resolve("").unwrap(), "rep");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "Docs/report.pdf");
        assert_eq!(results[0].node_type, NodeType::File);
        assert_eq!(results[0].size, 4);
        assert_eq!(results[0].extension.as_deref(), Some("pdf"));
    }

    #[test]
    fn test_case_insensitive_and_folders() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Photos/Holiday")).unwrap();
        fs::write(dir.path().join("Photos/Holiday/photo.JPG"), b"jpg").unwrap();
        fs::write(dir.path().join("Photos/a.txt"), b"").unwrap();
        let (engine, resolver) = engine_for(&dir);

        let results = engine.search(&resolver.resolve("").unwrap(), "PHOTO");
        let paths: Vec<_> = results.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["Photos", "Photos/Holiday/photo.JPG"]);

        let folder = &results[0];
        assert_eq!(folder.node_type, NodeType::Folder);
        assert_eq!(folder.size, 2);
        assert_eq!(folder.children.as_deref(), Some(&[][..]));
    }

    #[test]
    fn test_blank_query() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("file.txt"), b"").unwrap();
        let (engine, resolver) = engine_for(&dir);
        let root = resolver.resolve("").unwrap();

        assert!(engine.search(&root, "").is_empty());
        assert!(engine.search(&root, "   \t").is_empty());
    }

    #[test]
    fn test_blank_query_does_not_touch_filesystem() {
        let dir = TempDir::new().unwrap();
        let (engine, resolver) = engine_for(&dir);
        let missing = resolver.resolve("does/not/exist").unwrap();
        assert!(engine.search(&missing, " ").is_empty());
    }

    #[test]
    fn test_result_limit() {
        let dir = TempDir::new().unwrap();
        for i in 0..150 {
            fs::write(dir.path().join(format!("match-{:03}.log", i)), b"").unwrap();
        }
        let (engine, resolver) = engine_for(&dir);

        let results = engine.search(&resolver.resolve("").unwrap(), "match");
        assert_eq!(results.len(), MAX_SEARCH_RESULTS);
        assert_eq!(results[0].name, "match-000.log");
        assert_eq!(results[99].name, "match-099.log");
    }

    #[test]
    fn test_fewer_matches_than_limit() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("hit-{}.txt", i)), b"").unwrap();
            fs::write(dir.path().join(format!("other-{}.txt", i)), b"").unwrap();
        }
        let (engine, resolver) = engine_for(&dir);
        assert_eq!(engine.search(&resolver.resolve("").unwrap(), "hit").len(), 5);
    }

    #[test]
    fn test_depth_limit() {
        let dir = TempDir::new().unwrap();
        // d0 在第 0 层，d{n} 内的条目在第 n+1 层
        let mut deep = dir.path().to_path_buf();
        for level in 0..12 {
            deep = deep.join(format!("d{}", level));
        }
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("needle-deep.txt"), b"").unwrap();

        let shallow = dir.path().join("d0/d1/d2");
        fs::write(shallow.join("needle-shallow.txt"), b"").unwrap();

        let (engine, resolver) = engine_for(&dir);
        let results = engine.search(&resolver.resolve("").unwrap(), "needle");
        let names: Vec<_> = results.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["needle-shallow.txt"]);
    }

    #[test]
    fn test_depth_boundary() {
        let dir = TempDir::new().unwrap();
        let mut path = dir.path().to_path_buf();
        for level in 0..10 {
            path = path.join(format!("l{}", level));
        }
        fs::create_dir_all(&path).unwrap();
        // 位于第 10 层，仍在搜索范围内
        fs::write(path.join("edge.txt"), b"").unwrap();

        let (engine, resolver) = engine_for(&dir);
        let results = engine.search(&resolver.resolve("").unwrap(), "edge");
        assert_eq!(results.len(), 1);

        let shallow = SearchEngine::with_limits(resolver.clone(), 9, MAX_SEARCH_RESULTS);
        assert!(shallow.search(&resolver.resolve("").unwrap(), "edge").is_empty());
    }

    #[test]
    fn test_search_within_subfolder() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("a/target.txt"), b"").unwrap();
        fs::write(dir.path().join("b/target.txt"), b"").unwrap();
        let (engine, resolver) = engine_for(&dir);

        let results = engine.search(&resolver.resolve("b").unwrap(), "target");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "b/target.txt");
    }
}
