//! # 连接接收器
//!
//! 一个 [`Acceptor`] 对应一个实际绑定的 TCP 地址。同一地址上可以挂载多个路由前缀，
//! 接收器读完请求头后按最长前缀把连接交给对应监听器的请求队列。
//!
//! 接收循环本身只做 `accept`，读头、解析、读请求体与分发都在每个连接自己的任务中完成，
//! 交给监听器的连接已经带着完整的请求体。

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::cache::CachedResponse;
use crate::endpoint::ListenerTimeouts;
use crate::exception::Exception;
use crate::logger::SharedSink;
use crate::param::{DEFAULT_TIMEOUT, MAX_BODY_SIZE, MAX_HEAD_SIZE, REQUEST_QUEUE_LENGTH};
use crate::request::{find_head_end, Request};
use crate::response::Response;
use crate::util::{normalize_path, HtmlBuilder};

/// 一个已经读完请求头、等待路由处理的连接
pub struct HttpContext {
    id: u64,
    peer: SocketAddr,
    request: Request,
    stream: TcpStream,
    /// 与请求头一起读到的请求体前缀
    leftover: Vec<u8>,
}

impl HttpContext {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// 按 `Content-Length` 读完请求体并放入 `Request`。
    async fn read_body(&mut self, timeout: Duration) -> Result<(), Exception> {
        let length = self.request.content_length()?;
        if length > MAX_BODY_SIZE {
            return Err(Exception::PayloadTooLarge(length));
        }

        let mut body = std::mem::take(&mut self.leftover);
        if body.len() < length {
            let stream = &mut self.stream;
            let read = async {
                let mut chunk = [0u8; 8192];
                while body.len() < length {
                    let n = stream.read(&mut chunk).await?;
                    if n == 0 {
                        return Err(Exception::MalformedRequest(format!(
                            "请求体不完整：期望 {} 字节，实际 {} 字节",
                            length,
                            body.len()
                        )));
                    }
                    body.extend_from_slice(&chunk[..n]);
                }
                Ok::<(), Exception>(())
            };
            tokio::time::timeout(timeout, read)
                .await
                .map_err(|_| Exception::RequestTimeout)??;
        }
        body.truncate(length);
        self.request.set_body(Bytes::from(body));
        Ok(())
    }

    /// 写出完整的响应报文并关闭写端，每个连接只响应一次。
    pub async fn respond(mut self, bytes: &[u8], timeout: Duration) -> Result<(), Exception> {
        write_and_close(&mut self.stream, bytes, timeout).await
    }
}

async fn write_and_close(
    stream: &mut TcpStream,
    bytes: &[u8],
    timeout: Duration,
) -> Result<(), Exception> {
    let write = async {
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok::<(), Exception>(())
    };
    tokio::time::timeout(timeout, write)
        .await
        .map_err(|_| Exception::RequestTimeout)??;
    // 对端可能已经关闭，忽略关闭写端时的错误
    let _ = stream.shutdown().await;
    Ok(())
}

/// 监听器自身给出的状态页（404、405、503 等）
pub(crate) fn status_page(code: u16, note: Option<&str>) -> Response {
    let mut response = Response::new();
    response
        .with_status_code(code)
        .with_content_type("text/html")
        .with_body(HtmlBuilder::from_status_code(code, note).build());
    response
}

struct PrefixRoute {
    /// 规范化后的前缀路径，形如 `/api/weather/`
    path: String,
    sender: mpsc::Sender<HttpContext>,
    timeouts: ListenerTimeouts,
}

pub struct Acceptor {
    local_addr: SocketAddr,
    routes: RwLock<Vec<PrefixRoute>>,
    /// 每个前缀的请求队列长度
    queue_length: usize,
    task: Mutex<Option<JoinHandle<()>>>,
    sink: SharedSink,
    next_id: AtomicU64,
}

impl Acceptor {
    /// 绑定 `addr` 并启动接收循环。
    pub async fn bind(addr: SocketAddr, sink: SharedSink) -> Result<Arc<Self>, Exception> {
        Self::bind_with_queue(addr, sink, REQUEST_QUEUE_LENGTH).await
    }

    pub async fn bind_with_queue(
        addr: SocketAddr,
        sink: SharedSink,
        queue_length: usize,
    ) -> Result<Arc<Self>, Exception> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Exception::Bind {
                address: addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let acceptor = Arc::new(Self {
            local_addr,
            routes: RwLock::new(Vec::new()),
            queue_length: queue_length.max(1),
            task: Mutex::new(None),
            sink,
            next_id: AtomicU64::new(1),
        });

        let handle = tokio::spawn(Arc::clone(&acceptor).accept_loop(listener));
        *acceptor.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        acceptor.sink.debug(&format!("开始在 {} 上接受连接", local_addr));
        Ok(acceptor)
    }

    /// 实际绑定的地址（端口为 0 时由系统分配）
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 挂载一个路由前缀，返回该前缀的请求队列。
    ///
    /// `timeouts` 中的 `header_wait` 与 `entity_body` 在连接自己的任务中生效。
    pub fn register(
        &self,
        path: &str,
        timeouts: ListenerTimeouts,
    ) -> Result<mpsc::Receiver<HttpContext>, Exception> {
        let path = normalize_path(path);
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        if routes.iter().any(|r| r.path == path) {
            return Err(Exception::PrefixConflict(path));
        }
        let (sender, receiver) = mpsc::channel(self.queue_length);
        routes.push(PrefixRoute {
            path,
            sender,
            timeouts,
        });
        Ok(receiver)
    }

    /// 卸载前缀，对应监听器的请求队列随之关闭。
    pub fn unregister(&self, path: &str) {
        let path = normalize_path(path);
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        routes.retain(|r| r.path != path);
    }

    /// 停止接收循环并卸载全部前缀
    pub fn close(&self) {
        if let Some(handle) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let acceptor = Arc::clone(&self);
                    tokio::spawn(async move {
                        acceptor.route_connection(stream, peer).await;
                    });
                }
                Err(e) => {
                    self.sink
                        .error(&format!("{} 接受连接失败：{}", self.local_addr, e));
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    async fn route_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let (head, leftover) = match read_head(&mut stream, self.header_wait()).await {
            Ok(Some(parts)) => parts,
            Ok(None) => return,
            Err(e) => {
                self.sink.debug(&format!("#{} 无法读取来自 {} 的请求头：{}", id, peer, e));
                self.reject(stream, e.status_code(), None).await;
                return;
            }
        };

        let request = match Request::try_from(&head, id) {
            Ok(r) => r,
            Err(e) => {
                self.sink.debug(&format!("#{} 来自 {} 的请求无法解析：{}", id, peer, e));
                self.reject(stream, e.status_code(), None).await;
                return;
            }
        };

        let Some((sender, entity_body)) = self.match_route(request.path()) else {
            self.sink
                .debug(&format!("#{} 没有与 {} 匹配的路由", id, request.path()));
            self.reject(stream, 404, Some("没有与该路径匹配的路由")).await;
            return;
        };

        let mut context = HttpContext {
            id,
            peer,
            request,
            stream,
            leftover,
        };
        if let Err(e) = context.read_body(entity_body).await {
            self.sink.debug(&format!("#{} 无法读取来自 {} 的请求体：{}", id, peer, e));
            self.reject(context.stream, e.status_code(), None).await;
            return;
        }

        match sender.try_send(context) {
            Ok(()) => {}
            Err(TrySendError::Full(context)) => {
                self.sink.warn(&format!(
                    "#{} 路由 {} 的请求队列已满",
                    id,
                    context.request.path()
                ));
                self.reject(context.stream, 503, None).await;
            }
            Err(TrySendError::Closed(context)) => {
                self.reject(context.stream, 404, Some("该路由已经关闭")).await;
            }
        }
    }

    async fn reject(&self, mut stream: TcpStream, code: u16, note: Option<&str>) {
        let bytes = CachedResponse::from(&status_page(code, note)).as_bytes();
        if let Err(e) = write_and_close(&mut stream, &bytes, DEFAULT_TIMEOUT).await {
            self.sink.debug(&format!("写出 {} 响应失败：{}", code, e));
        }
    }

    /// 最长前缀匹配，返回该前缀的请求队列与请求体超时
    fn match_route(&self, path: &str) -> Option<(mpsc::Sender<HttpContext>, Duration)> {
        let path = normalize_path(path);
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes
            .iter()
            .filter(|r| path.starts_with(&r.path))
            .max_by_key(|r| r.path.len())
            .map(|r| (r.sender.clone(), r.timeouts.entity_body))
    }

    fn header_wait(&self) -> Duration {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes
            .iter()
            .map(|r| r.timeouts.header_wait)
            .min()
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// 读到 `\r\n\r\n` 为止，返回请求头与多读到的字节。对端未发送任何数据就关闭时返回 `None`。
async fn read_head(
    stream: &mut TcpStream,
    wait: Duration,
) -> Result<Option<(Vec<u8>, Vec<u8>)>, Exception> {
    tokio::time::timeout(wait, read_until_head_end(stream))
        .await
        .map_err(|_| Exception::RequestTimeout)?
}

async fn read_until_head_end(
    stream: &mut TcpStream,
) -> Result<Option<(Vec<u8>, Vec<u8>)>, Exception> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            if buffer.is_empty() {
                return Ok(None);
            }
            return Err(Exception::MalformedRequest("请求头不完整".to_string()));
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_head_end(&buffer) {
            let leftover = buffer.split_off(end);
            return Ok(Some((buffer, leftover)));
        }
        if buffer.len() > MAX_HEAD_SIZE {
            return Err(Exception::PayloadTooLarge(buffer.len()));
        }
    }
}
