//! # 服务器引导
//!
//! [`Server`] 把日志、配置与监听器注册表组装在一起：
//! - 构造时创建日志输出、载入（或生成）配置文件、创建注册表；
//! - `begin` 按配置搭建 tokio 运行时，启动全部监听器后永久阻塞；
//! - 析构时关闭全部监听器并保存一次配置。

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Builder;

use crate::config::{ConfigKey, ConfigStore};
use crate::endpoint::RouteBinding;
use crate::exception::Exception;
use crate::logger::{Logger, SharedSink};
use crate::param::{CONFIG_DIR, LOG_DIR};
use crate::registry::ListenerRegistry;

pub struct Server {
    logger: Option<Arc<Logger>>,
    sink: SharedSink,
    config: Arc<ConfigStore>,
    listeners: ListenerRegistry,
}

impl Server {
    /// 使用工作目录下的 `configuration/` 与 `logs/`
    pub fn new() -> Result<Self, Exception> {
        Self::with_directories(CONFIG_DIR, LOG_DIR)
    }

    pub fn with_directories(
        config_dir: impl AsRef<Path>,
        log_dir: impl AsRef<Path>,
    ) -> Result<Self, Exception> {
        // 1. 日志：文件输出始终开启，控制台输出由配置决定
        let logger = Logger::init(log_dir)?;
        let sink: SharedSink = logger.clone();

        // 2. 配置：目录或文件缺失时写入默认值
        let config = Arc::new(ConfigStore::open(config_dir, Arc::clone(&sink))?);
        let quiet: bool = config.get(ConfigKey::DisableConsoleLogging)?;
        logger.set_console_enabled(!quiet)?;
        sink.info(&format!("配置文件已载入：{}", config.path().display()));

        Ok(Self::assemble(Some(logger), sink, config))
    }

    /// 使用调用者提供的日志输出，不安装 log4rs
    pub fn with_sink(config_dir: impl AsRef<Path>, sink: SharedSink) -> Result<Self, Exception> {
        let config = Arc::new(ConfigStore::open(config_dir, Arc::clone(&sink))?);
        Ok(Self::assemble(None, sink, config))
    }

    fn assemble(logger: Option<Arc<Logger>>, sink: SharedSink, config: Arc<ConfigStore>) -> Self {
        let listeners = ListenerRegistry::new(Arc::clone(&config), Arc::clone(&sink));
        Self {
            logger,
            sink,
            config,
            listeners,
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn logger(&self) -> Option<&Logger> {
        self.logger.as_deref()
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn add_endpoint<B: RouteBinding>(&mut self, binding: B) -> Result<(), Exception> {
        self.listeners.register(binding)
    }

    pub fn invalidate_cache_for(&self, route: &str) -> bool {
        self.listeners.invalidate_cache_for(route)
    }

    /// 在当前运行时中启动全部监听器，不阻塞
    pub async fn start(&mut self) -> Result<usize, Exception> {
        self.listeners.start_all().await
    }

    /// 按配置搭建运行时，启动全部监听器并永久阻塞。
    pub fn begin(mut self) -> Result<(), Exception> {
        // 3. 运行时：工作线程与阻塞线程的上限都来自配置
        let workers = self.thread_limit(ConfigKey::MaxWorkerThreads)?;
        let blocking = self.thread_limit(ConfigKey::MaxCompletionPortThreads)?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .max_blocking_threads(blocking)
            .enable_all()
            .build()?;
        self.sink.info(&format!(
            "运行时已创建：{} 个工作线程，{} 个阻塞线程",
            workers, blocking
        ));

        // 4. 启动全部监听器，之后进程的生命周期就是服务器的生命周期
        runtime.block_on(async {
            self.start().await?;
            std::future::pending::<()>().await;
            Ok(())
        })
    }

    fn thread_limit(&self, key: ConfigKey) -> Result<usize, Exception> {
        let value: usize = self.config.get(key)?;
        if value == 0 {
            self.sink
                .warn(&format!("配置项 {} 为 0，按 1 处理", key.name()));
            return Ok(1);
        }
        Ok(value)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.listeners.close_all();
        self.config.save();
        self.sink.info("服务器已关闭");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::LogSink;
    use log::Level;

    struct Silent;

    impl LogSink for Silent {
        fn write(&self, _level: Level, _message: &str) {}
    }

    #[test]
    fn test_with_sink_creates_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join("configuration");

        let server = Server::with_sink(&config_dir, Arc::new(Silent)).unwrap();
        assert!(server.logger().is_none());
        assert!(config_dir.join("core_config.json").exists());
        assert!(server.listeners().is_empty());
    }

    #[test]
    fn test_drop_saves_config() {
        let dir = tempfile::tempdir().unwrap();
        {
            let server = Server::with_sink(dir.path(), Arc::new(Silent)).unwrap();
            server.config().set(ConfigKey::Port, 9999).unwrap();
        }

        let reopened = Server::with_sink(dir.path(), Arc::new(Silent)).unwrap();
        assert_eq!(reopened.config().get::<u16>(ConfigKey::Port).unwrap(), 9999);
    }

    #[test]
    fn test_zero_thread_limit_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let server = Server::with_sink(dir.path(), Arc::new(Silent)).unwrap();
        server.config().set(ConfigKey::MaxWorkerThreads, 0).unwrap();
        assert_eq!(server.thread_limit(ConfigKey::MaxWorkerThreads).unwrap(), 1);
    }
}
