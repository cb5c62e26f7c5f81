//! 日志系统
//!
//! 控制台 + 文件双输出，文件按启动时间命名、按大小滚动，启动时清理过期文件

use crate::config::LogConfig;
use chrono::{Local, NaiveDate};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 日志文件名前缀
pub const LOG_FILE_PREFIX: &str = "file-explorer";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 日志文件路径
///
/// `file-explorer.<启动时间>.log`，滚动文件追加 `_N`
fn log_file_path(log_dir: &Path, started: &str, index: u32) -> PathBuf {
    let filename = match index {
        0 => format!("{}.{}.log", LOG_FILE_PREFIX, started),
        n => format!("{}.{}_{}.log", LOG_FILE_PREFIX, started, n),
    };
    log_dir.join(filename)
}

/// 滚动写入状态
struct RollingState {
    log_dir: PathBuf,
    started: String,
    index: u32,
    max_file_size: u64,
    written: u64,
    file: File,
}

impl RollingState {
    fn open(log_dir: &Path, started: &str, index: u32) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path(log_dir, started, index))
    }

    fn write_chunk(&mut self, buf: &[u8]) -> io::Result<usize> {
        // 空文件不滚动，单条超大日志直接写入
        if self.written > 0 && self.written + buf.len() as u64 > self.max_file_size {
            self.file.flush()?;
            self.index += 1;
            self.file = Self::open(&self.log_dir, &self.started, self.index)?;
            self.written = 0;
        }

        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }
}

/// 按大小滚动的日志文件写入器
#[derive(Clone)]
pub struct RollingFileWriter {
    state: Arc<Mutex<RollingState>>,
}

impl RollingFileWriter {
    pub fn new(log_dir: PathBuf, max_file_size: u64) -> io::Result<Self> {
        let started = Local::now().format("%Y-%m-%d-%H%M%S").to_string();
        let file = RollingState::open(&log_dir, &started, 0)?;
        Ok(Self {
            state: Arc::new(Mutex::new(RollingState {
                log_dir,
                started,
                index: 0,
                max_file_size,
                written: 0,
                file,
            })),
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RollingState) -> io::Result<T>) -> io::Result<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "日志写入器锁已损坏"))?;
        f(&mut state)
    }
}

impl Write for RollingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_state(|state| state.write_chunk(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_state(|state| state.file.flush())
    }
}

/// 日志守卫，进程退出前必须保持存活
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 初始化日志系统
///
/// `RUST_LOG` 优先于配置中的级别；文件输出初始化失败时退回仅控制台
pub fn init_logging(config: &LogConfig) -> LogGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_ansi(true);

    let writer = if config.enabled {
        open_log_writer(config)
    } else {
        None
    };

    let Some(writer) = writer else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        info!("日志系统初始化完成（仅控制台输出）");
        return LogGuard { _file_guard: None };
    };

    let (non_blocking, file_guard) = tracing_appender::non_blocking(writer);
    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        "📝 日志系统初始化完成: 目录={:?}, 保留{}天, 级别={}, 单文件上限={:.1}MB",
        config.log_dir,
        config.retention_days,
        config.level,
        config.max_file_size as f64 / 1024.0 / 1024.0
    );

    let removed = cleanup_old_logs(&config.log_dir, config.retention_days, Local::now().date_naive());
    if removed > 0 {
        info!("已清理 {} 个过期日志文件", removed);
    }

    LogGuard {
        _file_guard: Some(file_guard),
    }
}

fn open_log_writer(config: &LogConfig) -> Option<RollingFileWriter> {
    if let Err(e) = fs::create_dir_all(&config.log_dir) {
        eprintln!("创建日志目录失败: {:?}, 错误: {}", config.log_dir, e);
        return None;
    }

    match RollingFileWriter::new(config.log_dir.clone(), config.max_file_size) {
        Ok(writer) => Some(writer),
        Err(e) => {
            eprintln!("创建日志文件失败: {}, 仅输出到控制台", e);
            None
        }
    }
}

/// 从日志文件名中取出日期
///
/// `file-explorer.2024-03-01-120000_2.log` -> 2024-03-01
fn date_of_log_file(filename: &str) -> Option<NaiveDate> {
    let stem = filename
        .strip_prefix(LOG_FILE_PREFIX)?
        .strip_prefix('.')?
        .strip_suffix(".log")?;
    let date = stem.get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// 删除超过保留天数的日志文件，返回删除数量
///
/// 文件名无法解析日期时按修改时间判断
fn cleanup_old_logs(log_dir: &Path, retention_days: u32, today: NaiveDate) -> usize {
    let retention = chrono::Duration::days(retention_days as i64);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("读取日志目录失败: {:?}, 错误: {}", log_dir, e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(filename) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !path.is_file() || !filename.starts_with(LOG_FILE_PREFIX) || !filename.ends_with(".log")
        {
            continue;
        }

        let file_date = date_of_log_file(filename).or_else(|| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            let modified: chrono::DateTime<Local> = modified.into();
            Some(modified.date_naive())
        });

        let expired = match file_date {
            Some(date) => today.signed_duration_since(date) > retention,
            None => false,
        };
        if !expired {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                removed += 1;
                tracing::debug!("已删除过期日志文件: {:?}", path);
            }
            Err(e) => tracing::warn!("删除过期日志文件失败: {:?}, 错误: {}", path, e),
        }
    }

    removed
}
