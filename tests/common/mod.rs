#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::Level;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use httpx::{
    async_trait, ConfigKey, ConfigStore, HandlerError, HttpMethod, ListenerRegistry, LogSink,
    Request, Response, RouteBinding, SharedSink,
};

/// 记录全部日志的输出，用于断言警告次数等
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(Level, String)>>,
}

impl LogSink for RecordingSink {
    fn write(&self, level: Level, message: &str) {
        self.records
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }
}

impl RecordingSink {
    pub fn count(&self, level: Level) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }

    pub fn messages(&self, level: Level) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

pub fn recording_sink() -> (Arc<RecordingSink>, SharedSink) {
    let recorder = Arc::new(RecordingSink::default());
    let sink: SharedSink = recorder.clone();
    (recorder, sink)
}

/// 绑定到 127.0.0.1 的随机端口
pub fn local_config(sink: SharedSink) -> Arc<ConfigStore> {
    let config = ConfigStore::create_defaults("unused/core_config.json", sink);
    config.set(ConfigKey::Port, 0).unwrap();
    config.set(ConfigKey::MaxWorkerThreads, 4).unwrap();
    Arc::new(config)
}

pub fn local_registry() -> (Arc<RecordingSink>, ListenerRegistry) {
    let (recorder, sink) = recording_sink();
    let config = local_config(Arc::clone(&sink));
    (recorder, ListenerRegistry::new(config, sink))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// 正常返回 `call N`
    Count,
    /// 原样返回请求体
    Echo,
    /// 返回错误
    Fail,
    /// 处理器 panic
    Panic,
}

/// 可配置的测试路由，记录处理器被执行的次数
pub struct TestRoute {
    pub path: &'static str,
    pub method: HttpMethod,
    pub dynamic: bool,
    pub invalidate_after: Option<Duration>,
    pub mode: Mode,
    pub calls: Arc<AtomicUsize>,
}

impl TestRoute {
    pub fn new(path: &'static str) -> Self {
        Self {
            path,
            method: HttpMethod::Get,
            dynamic: false,
            invalidate_after: None,
            mode: Mode::Count,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn invalidate_after(mut self, period: Duration) -> Self {
        self.invalidate_after = Some(period);
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl RouteBinding for TestRoute {
    fn path(&self) -> &str {
        self.path
    }

    fn method(&self) -> HttpMethod {
        self.method
    }

    fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    fn invalidate_after(&self) -> Option<Duration> {
        self.invalidate_after
    }

    async fn execute(&self, request: &Request) -> Result<Response, HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut response = Response::new();
        match self.mode {
            Mode::Count => {
                response
                    .add_header("X-Route", self.path)
                    .with_body(format!("call {}", call));
            }
            Mode::Echo => {
                response.with_body(request.body_text());
            }
            Mode::Fail => return Err(format!("failure {}", call).into()),
            Mode::Panic => panic!("boom"),
        }
        Ok(response)
    }

    fn on_exception(&self, error: &HandlerError, response: &mut Response) {
        response.with_body(format!("handled: {}", error));
    }
}

/// 发送原始请求并读到连接关闭
pub async fn send_raw(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut out))
        .await
        .expect("response timed out")
        .unwrap();
    String::from_utf8_lossy(&out).to_string()
}

pub async fn get(addr: SocketAddr, path: &str) -> ParsedResponse {
    let raw = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path);
    parse_response(&send_raw(addr, raw.as_bytes()).await)
}

pub async fn request_with_body(
    addr: SocketAddr,
    method: &str,
    path: &str,
    body: &str,
) -> ParsedResponse {
    let raw = format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n{}",
        method,
        path,
        body.len(),
        body
    );
    parse_response(&send_raw(addr, raw.as_bytes()).await)
}

#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl ParsedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 排序后的头部，不含每次都会变化的 `Date`
    pub fn stable_headers(&self) -> Vec<(String, String)> {
        let mut headers: Vec<_> = self
            .headers
            .iter()
            .filter(|(n, _)| !n.eq_ignore_ascii_case("Date"))
            .cloned()
            .collect();
        headers.sort();
        headers
    }
}

pub fn parse_response(response: &str) -> ParsedResponse {
    let (head, body) = response.split_once("\r\n\r\n").unwrap_or((response, ""));
    let mut lines = head.split("\r\n");

    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);

    let headers = lines
        .filter_map(|line| line.split_once(": "))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    ParsedResponse {
        status,
        headers,
        body: body.to_string(),
    }
}
