//! # 日志模块
//!
//! 所有需要记录日志的组件都通过显式传入的 [`SharedSink`] 写日志，而不是依赖全局配置指针。
//! 默认实现 [`Logger`] 把日志转发到 `log` 门面，并通过 log4rs 输出到：
//! - 按启动时间命名的日志文件（`Info` 及以上）；
//! - 彩色控制台（`Debug` 及以上，可由配置关闭）。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::Local;
use log::{Level, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::threshold::ThresholdFilter;

use crate::exception::Exception;

/// 日志写入契约：`Write(level, message)`。
pub trait LogSink: Send + Sync {
    fn write(&self, level: Level, message: &str);
}

/// 在组件之间共享的日志句柄
pub type SharedSink = Arc<dyn LogSink>;

impl dyn LogSink {
    pub fn debug(&self, message: &str) {
        self.write(Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.write(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.write(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.write(Level::Error, message);
    }
}

/// log4rs 的句柄在进程内只能安装一次，之后的初始化只替换配置
static HANDLE: OnceLock<log4rs::Handle> = OnceLock::new();

const FILE_PATTERN: &str = "[{l:>5}]: {m}{n}";
const CONSOLE_PATTERN: &str = "[{d(%Y-%m-%d %H:%M:%S)}] {h({l})} {m}{n}";

/// 基于 log4rs 的默认日志实现
pub struct Logger {
    log_file: PathBuf,
    console: AtomicBool,
}

impl Logger {
    /// 在 `log_dir` 下创建本次运行的日志文件并安装 log4rs 配置。
    pub fn init(log_dir: impl AsRef<Path>) -> Result<Arc<Self>, Exception> {
        let log_dir = log_dir.as_ref();
        std::fs::create_dir_all(log_dir)?;
        let now = Local::now();
        let log_file = log_dir.join(now.format("logs-%-H.%-M-%Y.%-m.%-d.log").to_string());

        let logger = Self {
            log_file,
            console: AtomicBool::new(true),
        };
        let config = logger.build_config()?;
        match HANDLE.get() {
            Some(handle) => handle.set_config(config),
            None => {
                let handle =
                    log4rs::init_config(config).map_err(|e| Exception::Logging(e.to_string()))?;
                // 并发初始化时只保留第一个句柄，另一个句柄上的配置相同
                let _ = HANDLE.set(handle);
            }
        }
        Ok(Arc::new(logger))
    }

    /// 打开或关闭控制台输出，文件输出不受影响。
    pub fn set_console_enabled(&self, enabled: bool) -> Result<(), Exception> {
        if self.console.swap(enabled, Ordering::SeqCst) == enabled {
            return Ok(());
        }
        let config = self.build_config()?;
        if let Some(handle) = HANDLE.get() {
            handle.set_config(config);
        }
        Ok(())
    }

    pub fn console_enabled(&self) -> bool {
        self.console.load(Ordering::SeqCst)
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    fn build_config(&self) -> Result<Config, Exception> {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
            .build(&self.log_file)?;

        let mut builder = Config::builder().appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Info)))
                .build("file", Box::new(file)),
        );
        let mut root = Root::builder().appender("file");

        if self.console_enabled() {
            let console = ConsoleAppender::builder()
                .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
                .build();
            builder = builder.appender(Appender::builder().build("console", Box::new(console)));
            root = root.appender("console");
        }

        builder
            .build(root.build(LevelFilter::Debug))
            .map_err(|e| Exception::Logging(e.to_string()))
    }
}

impl LogSink for Logger {
    fn write(&self, level: Level, message: &str) {
        log::log!(target: "httpx", level, "{}", message);
    }
}
