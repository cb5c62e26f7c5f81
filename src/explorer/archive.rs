// 文件夹打包下载
//
// 压缩在阻塞线程中进行，数据经有界通道边压缩边发送：
// 客户端读取慢时压缩线程阻塞等待，客户端断开时发送失败并立即停止遍历。
// 中途出错会向流中写入错误，使连接中断，而不是返回一个看似完整的残缺压缩包。

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, Timelike};
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::resolver::{PathResolver, ResolvedPath};
use super::types::{ExplorerError, ExplorerErrorCode};

/// 根目录打包时使用的文件名
pub const DEFAULT_ARCHIVE_NAME: &str = "download.zip";

/// 单个数据块大小
const CHUNK_SIZE: usize = 64 * 1024;

/// 通道容量（块数），决定最多缓冲多少未发送数据
const CHANNEL_CAPACITY: usize = 8;

/// 打包错误
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("读取文件失败: {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("遍历目录失败: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("写入压缩包失败: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("写入输出流失败: {0}")]
    Io(#[from] io::Error),
    #[error("客户端已断开")]
    Disconnected,
}

impl ArchiveError {
    /// 按错误类型区分客户端断开与真正的读取失败
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::BrokenPipe {
            Self::Disconnected
        } else {
            Self::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    fn from_zip(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                Self::Disconnected
            }
            other => Self::Zip(other),
        }
    }

    fn into_io(self) -> io::Error {
        match self {
            Self::Read { source, .. } => source,
            Self::Io(e) => e,
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}

impl From<ArchiveError> for ExplorerError {
    fn from(err: ArchiveError) -> Self {
        ExplorerError::new(ExplorerErrorCode::ArchiveFailure).with_message(err.to_string())
    }
}

/// 打包统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: u64,
    pub directories: u64,
    pub bytes: u64,
}

/// 文件夹打包器
#[derive(Debug, Clone)]
pub struct ArchiveStreamer {
    resolver: PathResolver,
}

impl ArchiveStreamer {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// 压缩包文件名：根目录用默认名，其余用文件夹名
    pub fn archive_name(&self, target: &ResolvedPath) -> String {
        match target.name() {
            Some(name) => format!("{}.zip", name),
            None => DEFAULT_ARCHIVE_NAME.to_string(),
        }
    }

    /// 打包前检查：目标必须存在且为目录
    pub fn check_target(&self, target: &ResolvedPath) -> Result<(), ExplorerError> {
        match std::fs::metadata(&target.absolute) {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            _ => Err(ExplorerError::not_found(target.relative.clone())
                .with_message("文件夹不存在")),
        }
    }

    /// 将 `dir` 下的全部内容写成 zip
    ///
    /// 条目路径相对于 `dir`，不带外层文件夹
    pub fn write_archive<W: Write>(
        &self,
        dir: &Path,
        writer: W,
    ) -> Result<ArchiveStats, ArchiveError> {
        self.write_archive_with(dir, writer, |path: &Path| File::open(path))
    }

    /// 同 `write_archive`，文件内容由 `open` 提供
    fn write_archive_with<W, R, F>(
        &self,
        dir: &Path,
        mut writer: W,
        mut open: F,
    ) -> Result<ArchiveStats, ArchiveError>
    where
        W: Write,
        R: Read,
        F: FnMut(&Path) -> io::Result<R>,
    {
        let mut stats = ArchiveStats::default();
        let mut zip = ZipWriter::new_stream(&mut writer);

        let resolver = &self.resolver;
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .follow_links(resolver.follow_symlinks())
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                if resolver.is_hidden(&name) {
                    return false;
                }
                !entry.path_is_symlink() || resolver.admit_symlink(entry.path()).is_some()
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.loop_ancestor().is_some() => {
                    warn!("跳过形成环的符号链接: {:?}", e.path());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let relative = entry_name(dir, entry.path());
            let metadata = entry
                .metadata()
                .map_err(|e| ArchiveError::from_io(entry.path(), e.into()))?;
            let options = entry_options(metadata.modified().ok(), metadata.len());

            if metadata.is_dir() {
                zip.add_directory(format!("{}/", relative), options)
                    .map_err(ArchiveError::from_zip)?;
                stats.directories += 1;
                continue;
            }

            let mut file = open(entry.path()).map_err(|e| ArchiveError::from_io(entry.path(), e))?;
            zip.start_file(relative, options)
                .map_err(ArchiveError::from_zip)?;
            let copied =
                io::copy(&mut file, &mut zip).map_err(|e| ArchiveError::from_io(entry.path(), e))?;

            stats.files += 1;
            stats.bytes += copied;
        }

        zip.finish().map_err(ArchiveError::from_zip)?;
        writer.flush().map_err(|e| ArchiveError::from_io(dir, e))?;

        Ok(stats)
    }

    /// 启动流式打包，返回压缩数据流
    ///
    /// 调用前应先通过 `check_target`
    pub fn stream(&self, target: ResolvedPath) -> BoxStream<'static, io::Result<Vec<u8>>> {
        let streamer = self.clone();
        let span = tracing::info_span!("archive", id = %Uuid::new_v4(), path = %target.relative);

        produce_stream(span, move |writer| {
            info!("开始打包: {:?}", target.absolute);
            streamer.write_archive(&target.absolute, writer)
        })
    }
}

/// 在阻塞线程中运行 `produce`，其输出经有界通道转为数据流
///
/// `produce` 失败（客户端断开除外）时向流中写入错误
fn produce_stream<F>(span: tracing::Span, produce: F) -> BoxStream<'static, io::Result<Vec<u8>>>
where
    F: FnOnce(ChannelWriter) -> Result<ArchiveStats, ArchiveError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<io::Result<Vec<u8>>>(CHANNEL_CAPACITY);

    tokio::task::spawn_blocking(move || {
        let _enter = span.enter();
        match produce(ChannelWriter::new(tx.clone())) {
            Ok(stats) => info!(
                "打包完成: 文件={}, 目录={}, 原始大小={} 字节",
                stats.files, stats.directories, stats.bytes
            ),
            Err(ArchiveError::Disconnected) => info!("客户端已断开，停止打包"),
            Err(e) => {
                error!("打包失败，中断传输: {}", e);
                let _ = tx.blocking_send(Err(e.into_io()));
            }
        }
    });

    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed()
}

/// 相对 `base` 的 POSIX 条目名
fn entry_name(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn entry_options(modified: Option<SystemTime>, len: u64) -> SimpleFileOptions {
    let mut options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        // 最大压缩级别
        .compression_level(Some(9))
        .large_file(len >= u32::MAX as u64);

    if let Some(time) = modified.and_then(zip_datetime) {
        options = options.last_modified_time(time);
    }
    options
}

/// zip 只能表示 1980-2107 年之间的本地时间
fn zip_datetime(time: SystemTime) -> Option<zip::DateTime> {
    let local: DateTime<Local> = time.into();
    let year = u16::try_from(local.year()).ok()?;
    zip::DateTime::from_date_and_time(
        year,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}

/// 把压缩数据按块送入通道的同步写入器
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Vec<u8>>>,
    buf: Vec<u8>,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<io::Result<Vec<u8>>>) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    fn send_chunk(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(CHUNK_SIZE));
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "客户端已断开"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_chunk()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_chunk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExplorerConfig;
    use futures::TryStreamExt;
    use std::fs;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;

    fn streamer_for(dir: &TempDir) -> (ArchiveStreamer, PathResolver) {
        let root = dunce::canonicalize(dir.path()).unwrap();
        let resolver = PathResolver::new(root, &ExplorerConfig::default());
        (ArchiveStreamer::new(resolver.clone()), resolver)
    }

    fn entry_names(bytes: Vec<u8>) -> Vec<String> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("project");
        fs::create_dir_all(folder.join("sub")).unwrap();
        fs::write(folder.join("a.txt"), b"alpha").unwrap();
        fs::write(folder.join("sub/b.txt"), b"bravo").unwrap();
        dir
    }

    #[test]
    fn test_entries_relative_to_folder() {
        let dir = fixture();
        let (streamer, resolver) = streamer_for(&dir);
        let target = resolver.resolve("project").unwrap();

        let mut out = Vec::new();
        let stats = streamer.write_archive(&target.absolute, &mut out).unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.directories, 1);
        assert_eq!(stats.bytes, 10);

        assert_eq!(entry_names(out), vec!["a.txt", "sub/", "sub/b.txt"]);
    }

    #[test]
    fn test_archive_contents_and_compression() {
        let dir = fixture();
        let (streamer, resolver) = streamer_for(&dir);
        let target = resolver.resolve("project").unwrap();

        let mut out = Vec::new();
        streamer.write_archive(&target.absolute, &mut out).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(out)).unwrap();
        let mut file = archive.by_name("sub/b.txt").unwrap();
        assert_eq!(file.compression(), CompressionMethod::Deflated);
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        assert_eq!(content, "bravo");
    }

    #[test]
    fn test_empty_folder_archive() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("empty/inner")).unwrap();
        let (streamer, resolver) = streamer_for(&dir);
        let target = resolver.resolve("empty").unwrap();

        let mut out = Vec::new();
        streamer.write_archive(&target.absolute, &mut out).unwrap();
        assert_eq!(entry_names(out), vec!["inner/"]);
    }

    #[test]
    fn test_archive_name() {
        let dir = fixture();
        let (streamer, resolver) = streamer_for(&dir);
        assert_eq!(
            streamer.archive_name(&resolver.resolve("").unwrap()),
            DEFAULT_ARCHIVE_NAME
        );
        assert_eq!(
            streamer.archive_name(&resolver.resolve("project/sub").unwrap()),
            "sub.zip"
        );
    }

    #[test]
    fn test_check_target() {
        let dir = fixture();
        let (streamer, resolver) = streamer_for(&dir);

        assert!(streamer.check_target(&resolver.resolve("project").unwrap()).is_ok());

        let err = streamer
            .check_target(&resolver.resolve("missing").unwrap())
            .unwrap_err();
        assert_eq!(err.code, ExplorerErrorCode::NotFound);

        let err = streamer
            .check_target(&resolver.resolve("project/a.txt").unwrap())
            .unwrap_err();
        assert_eq!(err.code, ExplorerErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_stream_produces_valid_archive() {
        let dir = fixture();
        // 超过单块大小，确保分多块发送
        let big: Vec<u8> = (0..300_000u32).flat_map(|i| i.to_le_bytes()).collect();
        fs::write(dir.path().join("project/big.bin"), &big).unwrap();
        let (streamer, resolver) = streamer_for(&dir);
        let target = resolver.resolve("project").unwrap();

        let bytes: Vec<u8> = streamer.stream(target).try_concat().await.unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 4);
        let mut content = Vec::new();
        archive
            .by_name("big.bin")
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, big);
    }

    #[test]
    fn test_disconnect_is_detected() {
        let dir = fixture();
        let (streamer, resolver) = streamer_for(&dir);
        let target = resolver.resolve("project").unwrap();

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let writer = ChannelWriter::new(tx);
        let err = streamer.write_archive(&target.absolute, writer).unwrap_err();
        assert!(matches!(err, ArchiveError::Disconnected), "{:?}", err);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_failure_aborts_stream() {
        use std::os::unix::fs::PermissionsExt;

        let dir = fixture();
        let secret = dir.path().join("project/secret.txt");
        fs::write(&secret, b"top secret").unwrap();
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();

        if File::open(&secret).is_ok() {
            // root 用户可以读取，无法构造失败
            return;
        }

        let (streamer, resolver) = streamer_for(&dir);
        let target = resolver.resolve("project").unwrap();
        let result: io::Result<Vec<u8>> = streamer.stream(target).try_concat().await;
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o644)).unwrap();

        assert!(result.is_err());
    }

    /// 读取时总是失败的文件
    struct BrokenFile;

    impl Read for BrokenFile {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "device read error"))
        }
    }

    fn open_breaking_on_b(path: &Path) -> io::Result<Box<dyn Read>> {
        if path.ends_with("b.txt") {
            Ok(Box::new(BrokenFile))
        } else {
            Ok(Box::new(File::open(path)?))
        }
    }

    #[test]
    fn test_read_error_reported_with_path() {
        let dir = fixture();
        let (streamer, resolver) = streamer_for(&dir);
        let target = resolver.resolve("project").unwrap();

        let mut out = Vec::new();
        let err = streamer
            .write_archive_with(&target.absolute, &mut out, open_breaking_on_b)
            .unwrap_err();
        match err {
            ArchiveError::Read { path, source } => {
                assert!(path.ends_with("sub/b.txt"));
                assert_eq!(source.to_string(), "device read error");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mid_stream_failure_aborts_stream() {
        let dir = fixture();
        // 先写入足够多难以压缩的数据，保证出错前已有数据块发出
        let mut seed = 0x2545_f491_u32;
        let big: Vec<u8> = (0..300_000)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                seed as u8
            })
            .collect();
        fs::write(dir.path().join("project/a.txt"), &big).unwrap();
        let (streamer, resolver) = streamer_for(&dir);
        let target = resolver.resolve("project").unwrap();

        let items: Vec<io::Result<Vec<u8>>> = produce_stream(tracing::Span::none(), move |writer| {
            streamer.write_archive_with(&target.absolute, writer, open_breaking_on_b)
        })
        .collect()
        .await;

        assert!(items.len() >= 2);
        assert!(items[..items.len() - 1].iter().all(|item| item.is_ok()));
        let last = items.last().unwrap().as_ref().unwrap_err();
        assert_eq!(last.to_string(), "device read error");
    }

    #[test]
    fn test_entry_name() {
        let base = Path::new("/srv/root/project");
        assert_eq!(entry_name(base, &base.join("sub").join("b.txt")), "sub/b.txt");
    }
}
