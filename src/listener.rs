//! # 路由监听器
//!
//! 每个 [`RouteBinding`] 对应一个 [`EndpointListener`]：
//! 1. 根据配置推导出完整的监听前缀（`scheme://host[:port]/path/`）。
//! 2. 在所属的 [`Acceptor`] 上挂载前缀，并运行自己的分发循环。
//! 3. 每个请求都交给工作池处理：方法检查、缓存命中判断、执行处理器、捕获异常、填充缓存、写出响应。
//!    请求头与请求体由 [`Acceptor`] 在连接自己的任务中读完，不占用工作池。
//!
//! 分发循环只负责把请求投递到工作池，从不等待处理器执行完成。

use std::any::Any;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};

use crate::acceptor::{status_page, Acceptor, HttpContext};
use crate::cache::{CachedResponse, ResponseCache};
use crate::config::{ConfigKey, ConfigStore};
use crate::endpoint::{HandlerError, ListenerTimeouts, RouteBinding};
use crate::exception::Exception;
use crate::logger::SharedSink;
use crate::pool::WorkerPool;
use crate::request::Request;
use crate::response::Response;
use crate::util::normalize_path;

/// 由配置与路由路径推导出的监听地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerAddress {
    scheme: &'static str,
    /// `localhost` 与 `127.0.0.1` 带端口，其余保持配置中的原样
    host: String,
    path: String,
}

impl ListenerAddress {
    pub fn derive(config: &ConfigStore, path: &str) -> Result<Self, Exception> {
        let use_https: bool = config.get(ConfigKey::UseHttps)?;
        let port: u16 = config.get(ConfigKey::Port)?;
        let base_url = config
            .get::<Option<String>>(ConfigKey::BaseUrl)?
            .map(|b| b.trim().trim_end_matches('/').to_string())
            .filter(|b| !b.is_empty())
            .ok_or(Exception::MissingBaseUrl)?;

        let host = match base_url.as_str() {
            "localhost" | "127.0.0.1" => format!("{}:{}", base_url, port),
            _ => base_url,
        };

        Ok(Self {
            scheme: if use_https { "https" } else { "http" },
            host,
            path: normalize_path(path),
        })
    }

    pub fn scheme(&self) -> &str {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// 规范化后的路径，以 `/` 开头并以 `/` 结尾
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 完整的监听前缀
    pub fn prefix(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path)
    }

    fn default_port(&self) -> u16 {
        if self.scheme == "https" {
            443
        } else {
            80
        }
    }

    /// 解析出实际要绑定的套接字地址。
    ///
    /// `localhost` 绑定到回环地址，`+` 与 `*` 绑定到所有网卡，其余主机名通过 DNS 解析。
    pub async fn bind_addr(&self) -> Result<SocketAddr, Exception> {
        let (name, port) = split_host_port(&self.host);
        let port = port.unwrap_or_else(|| self.default_port());

        match name {
            "localhost" => return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)),
            "+" | "*" => return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)),
            _ => {}
        }
        if let Ok(ip) = name.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }

        tokio::net::lookup_host((name, port))
            .await
            .map_err(|e| Exception::AddressResolution(format!("{}: {}", self.host, e)))?
            .next()
            .ok_or_else(|| Exception::AddressResolution(self.host.clone()))
    }
}

/// 拆出主机名与端口。IPv6 地址只有写成 `[addr]:port` 时才带端口。
fn split_host_port(host: &str) -> (&str, Option<u16>) {
    if let Some(rest) = host.strip_prefix('[') {
        if let Some((name, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
            return (name, port);
        }
    }
    if host.matches(':').count() == 1 {
        if let Some((name, port)) = host.rsplit_once(':') {
            if let Ok(port) = port.parse() {
                return (name, Some(port));
            }
        }
    }
    (host, None)
}

/// 分发循环与工作任务共享的路由状态
struct RouteState {
    binding: Arc<dyn RouteBinding>,
    cache: ResponseCache,
    timeouts: ListenerTimeouts,
    prefix: String,
    sink: SharedSink,
}

pub struct EndpointListener {
    state: Arc<RouteState>,
    address: ListenerAddress,
    acceptor: Option<Arc<Acceptor>>,
    task: Option<JoinHandle<()>>,
}

impl EndpointListener {
    /// 创建监听器并调用路由的 `on_listener_init`，此时还没有开始监听。
    pub fn new(
        binding: Arc<dyn RouteBinding>,
        config: &ConfigStore,
        sink: SharedSink,
    ) -> Result<Self, Exception> {
        let address = ListenerAddress::derive(config, binding.path())?;
        let mut timeouts = ListenerTimeouts::default();
        binding.on_listener_init(&mut timeouts);

        Ok(Self {
            state: Arc::new(RouteState {
                binding,
                cache: ResponseCache::new(),
                timeouts,
                prefix: address.prefix(),
                sink,
            }),
            address,
            acceptor: None,
            task: None,
        })
    }

    /// 在 `acceptor` 上挂载前缀并启动分发循环
    pub fn initialize(&mut self, acceptor: Arc<Acceptor>, pool: WorkerPool) -> Result<(), Exception> {
        let mut receiver = acceptor.register(self.address.path(), self.state.timeouts)?;
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            while let Some(context) = receiver.recv().await {
                let job = Arc::clone(&state).dispatch(context);
                if let Err(e) = pool.submit(Box::pin(job)).await {
                    state.sink.error(&format!("{} 无法投递请求：{}", state.prefix, e));
                    break;
                }
            }
        });

        self.acceptor = Some(acceptor);
        self.task = Some(task);
        Ok(())
    }

    /// 停止分发循环并卸载前缀
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.unregister(self.address.path());
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    pub fn address(&self) -> &ListenerAddress {
        &self.address
    }

    pub fn prefix(&self) -> &str {
        &self.state.prefix
    }

    pub fn path(&self) -> &str {
        self.address.path()
    }

    pub fn timeouts(&self) -> ListenerTimeouts {
        self.state.timeouts
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.state.cache
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.acceptor.as_ref().map(|a| a.local_addr())
    }
}

impl RouteState {
    /// 连接到达这里时请求体已经读完，工作任务只会在处理器与写出响应时挂起
    async fn dispatch(self: Arc<Self>, context: HttpContext) {
        let expected = self.binding.method();
        if context.request().method() != expected {
            let mut page = status_page(405, None);
            page.add_header("Allow", expected.to_string());
            self.write(context, &CachedResponse::from(&page)).await;
            return;
        }

        if let Some(cached) = self.cache.get_cached_item() {
            if self.cache.is_expired(self.binding.invalidate_after()) {
                self.cache.invalidate();
                self.sink.debug(&format!("[CACHE EXPIRED] {}", self.prefix));
            } else {
                let elapsed = self.cache.time_since_modified().unwrap_or_default();
                self.sink.debug(&format!(
                    "[CACHE HIT] {} (cached for {:.3}s)",
                    self.prefix,
                    elapsed.as_secs_f64()
                ));
                self.write(context, &cached).await;
                return;
            }
        }

        let request = context.request().clone();
        self.sink
            .debug(&format!("[{}] {}", request.method(), request.path()));
        let (response, exception) = self.execute(request).await;

        let snapshot = CachedResponse::from(&response);
        // 先填充再写出，客户端收到响应之后发起的请求一定能命中
        if !exception && !self.binding.is_dynamic() && !self.cache.has_cached_item() {
            self.cache.set_item(snapshot.clone());
        }
        self.write(context, &snapshot).await;
    }

    /// 在独立任务中执行处理器，返回响应以及是否发生了异常
    async fn execute(&self, request: Request) -> (Response, bool) {
        let binding = Arc::clone(&self.binding);
        let outcome = tokio::spawn(async move { binding.execute(&request).await }).await;

        let error: HandlerError = match outcome {
            Ok(Ok(response)) => return (response, false),
            Ok(Err(e)) => e,
            Err(e) => Box::new(Exception::HandlerPanicked(panic_message(e))),
        };

        self.sink
            .error(&format!("{} 的处理器出错：{}", self.prefix, error));
        let mut response = Response::new();
        response.with_status_code(500);
        self.binding.on_exception(&error, &mut response);
        (response, true)
    }

    async fn write(&self, context: HttpContext, response: &CachedResponse) {
        let id = context.id();
        let peer = context.peer();
        if let Err(e) = context
            .respond(&response.as_bytes(), self.timeouts.response_write)
            .await
        {
            self.sink
                .debug(&format!("#{} 向 {} 写出响应失败：{}", id, peer, e));
        }
    }
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload: Box<dyn Any + Send> = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
