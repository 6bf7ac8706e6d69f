use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::acceptor::Acceptor;
use crate::config::{ConfigKey, ConfigStore};
use crate::endpoint::RouteBinding;
use crate::exception::Exception;
use crate::listener::EndpointListener;
use crate::logger::SharedSink;
use crate::param::WORKER_QUEUE_DEPTH;
use crate::pool::WorkerPool;
use crate::util::normalize_path;

/// 全部路由监听器的集合。
///
/// 外部只需要三个操作就能驱动整个引擎：`register`、`start_all`、`invalidate_cache_for`。
pub struct ListenerRegistry {
    config: Arc<ConfigStore>,
    sink: SharedSink,
    listeners: Vec<EndpointListener>,
    /// 按请求的绑定地址复用套接字
    acceptors: HashMap<SocketAddr, Arc<Acceptor>>,
    pool: Option<WorkerPool>,
}

impl ListenerRegistry {
    pub fn new(config: Arc<ConfigStore>, sink: SharedSink) -> Self {
        Self {
            config,
            sink,
            listeners: Vec::new(),
            acceptors: HashMap::new(),
            pool: None,
        }
    }

    /// 为路由创建监听器，调用 `start_all` 之前不会监听。
    pub fn register<B: RouteBinding>(&mut self, binding: B) -> Result<(), Exception> {
        self.register_shared(Arc::new(binding))
    }

    pub fn register_shared(&mut self, binding: Arc<dyn RouteBinding>) -> Result<(), Exception> {
        let listener = EndpointListener::new(binding, &self.config, Arc::clone(&self.sink))?;
        self.sink.debug(&format!("注册路由 {}", listener.prefix()));
        self.listeners.push(listener);
        Ok(())
    }

    /// 启动所有尚未启动的监听器，返回本次启动的数量。
    pub async fn start_all(&mut self) -> Result<usize, Exception> {
        let pool = match &self.pool {
            Some(pool) => pool.clone(),
            None => {
                let workers = self.config.get::<usize>(ConfigKey::MaxWorkerThreads)?.max(1);
                let pool = WorkerPool::new(workers, workers * WORKER_QUEUE_DEPTH);
                self.sink.debug(&format!("工作池大小：{}", pool.size()));
                self.pool = Some(pool.clone());
                pool
            }
        };

        let mut started = 0;
        for listener in self.listeners.iter_mut() {
            if listener.is_active() {
                continue;
            }
            let bind_addr = listener.address().bind_addr().await?;
            let acceptor = match self.acceptors.get(&bind_addr) {
                Some(acceptor) => Arc::clone(acceptor),
                None => {
                    let acceptor = Acceptor::bind(bind_addr, Arc::clone(&self.sink)).await?;
                    self.acceptors.insert(bind_addr, Arc::clone(&acceptor));
                    acceptor
                }
            };
            listener.initialize(acceptor, pool.clone())?;
            self.sink.info(&format!("正在监听 {}", listener.prefix()));
            started += 1;
        }

        self.sink.info(&format!("已启动 {} 个监听器", started));
        Ok(started)
    }

    /// 清除第一个匹配 `route` 的监听器的缓存。
    ///
    /// `route` 可以是完整前缀（`http://localhost:8080/a/`），也可以是路径（`/a/`、`a`）。
    pub fn invalidate_cache_for(&self, route: &str) -> bool {
        match self.find(route) {
            Some(listener) => {
                listener.cache().invalidate();
                self.sink.debug(&format!("已清除 {} 的缓存", listener.prefix()));
                true
            }
            None => {
                self.sink
                    .warn(&format!("没有与 {} 匹配的监听器，缓存未清除", route));
                false
            }
        }
    }

    /// 路由实际绑定的套接字地址
    pub fn local_addr(&self, route: &str) -> Option<SocketAddr> {
        self.find(route).and_then(|l| l.local_addr())
    }

    pub fn listeners(&self) -> &[EndpointListener] {
        &self.listeners
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// 关闭全部监听器与套接字
    pub fn close_all(&mut self) {
        for listener in self.listeners.iter_mut() {
            listener.close();
        }
        for (_, acceptor) in self.acceptors.drain() {
            acceptor.close();
        }
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }
    }

    /// 空白的 `route` 不匹配任何监听器，根路由只能用 `/` 或完整前缀指定
    fn find(&self, route: &str) -> Option<&EndpointListener> {
        let route = route.trim();
        if route.is_empty() {
            return None;
        }
        let path = normalize_path(route);
        self.listeners
            .iter()
            .find(|l| l.prefix() == route || l.path() == path)
    }
}
