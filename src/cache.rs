use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use chrono::Utc;
use cookie::Cookie;

use crate::param::{CharacterEncoding, CRLF};
use crate::response::Response;
use crate::util::format_http_date;

/// 由监听器负责计算的头部，处理器设置的同名头会被忽略
const MANAGED_HEADERS: [&str; 4] = ["content-length", "content-type", "date", "connection"];

/// 已经翻译成线上形式的响应快照。
///
/// 每次写出的响应都先生成快照，缓存命中时原样重放同一份快照。
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status_code: u16,
    pub status_message: String,
    pub content_type: String,
    pub encoding: CharacterEncoding,
    pub cookies: Vec<Cookie<'static>>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl From<&Response> for CachedResponse {
    fn from(response: &Response) -> Self {
        Self {
            status_code: response.status_code,
            status_message: response.reason().to_string(),
            content_type: response.content_type.clone(),
            encoding: response.encoding,
            cookies: response.cookies.clone(),
            headers: response.headers.clone(),
            body: response.body.clone(),
        }
    }
}

impl CachedResponse {
    /// `Content-Type` 的最终取值，未声明 charset 时补上响应体编码
    pub fn content_type_header(&self) -> Option<String> {
        if self.content_type.is_empty() {
            return None;
        }
        if self.content_type.to_ascii_lowercase().contains("charset=") {
            Some(self.content_type.clone())
        } else {
            Some(format!("{}; charset={}", self.content_type, self.encoding.label()))
        }
    }

    /// 翻译为完整的 HTTP/1.1 报文，`Content-Length` 按编码后的字节数计算。
    pub fn as_bytes(&self) -> Bytes {
        let body = self.encoding.encode(&self.body);
        let mut out = BytesMut::with_capacity(256 + body.len());

        out.put_slice(format!("HTTP/1.1 {} {}{}", self.status_code, self.status_message, CRLF).as_bytes());
        for (name, value) in &self.headers {
            if MANAGED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                continue;
            }
            out.put_slice(format!("{}: {}{}", name, value, CRLF).as_bytes());
        }
        for cookie in &self.cookies {
            out.put_slice(format!("Set-Cookie: {}{}", cookie, CRLF).as_bytes());
        }
        if let Some(content_type) = self.content_type_header() {
            out.put_slice(format!("Content-Type: {}{}", content_type, CRLF).as_bytes());
        }
        out.put_slice(format!("Content-Length: {}{}", body.len(), CRLF).as_bytes());
        out.put_slice(format!("Date: {}{}", format_http_date(&Utc::now()), CRLF).as_bytes());
        out.put_slice(format!("Connection: close{}", CRLF).as_bytes());
        out.put_slice(CRLF.as_bytes());
        out.put_slice(&body);
        out.freeze()
    }
}

struct Slot {
    item: Option<Arc<CachedResponse>>,
    last_modified: Option<Instant>,
}

/// 单个路由独占的单槽缓存，最多保存一份之前计算过的响应。
///
/// 槽本身由锁保护，但"检查 - 执行处理器 - 填充"并不在同一个临界区内：
/// 冷缓存上的并发请求可能各自执行处理器，并各自尝试填充。
pub struct ResponseCache {
    slot: RwLock<Slot>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Slot {
                item: None,
                last_modified: None,
            }),
        }
    }

    // 放入，同时刷新时间戳
    pub fn set_item(&self, item: CachedResponse) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.item = Some(Arc::new(item));
        slot.last_modified = Some(Instant::now());
    }

    pub fn has_cached_item(&self) -> bool {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        slot.item.is_some()
    }

    pub fn get_cached_item(&self) -> Option<Arc<CachedResponse>> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        slot.item.clone()
    }

    /// 距离上一次填充经过的时间
    pub fn time_since_modified(&self) -> Option<Duration> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        slot.last_modified.map(|t| t.elapsed())
    }

    /// 缓存内容是否已经超过 `invalidate_after`
    pub fn is_expired(&self, invalidate_after: Option<Duration>) -> bool {
        match (invalidate_after, self.time_since_modified()) {
            (Some(period), Some(elapsed)) => elapsed >= period,
            _ => false,
        }
    }

    // 清空，允许路由重新计算
    pub fn invalidate(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.item = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CachedResponse {
        let mut response = Response::new();
        response
            .with_content_type("application/json")
            .add_header("X-Custom", "1")
            .with_body(r#"{"data":123}"#);
        CachedResponse::from(&response)
    }

    fn wire_text(item: &CachedResponse) -> String {
        String::from_utf8_lossy(&item.as_bytes()).to_string()
    }

    #[test]
    fn test_cache_starts_empty() {
        let cache = ResponseCache::new();
        assert!(!cache.has_cached_item());
        assert!(cache.get_cached_item().is_none());
        assert!(cache.time_since_modified().is_none());
        assert!(!cache.is_expired(Some(Duration::ZERO)));
    }

    #[test]
    fn test_set_and_get() {
        let cache = ResponseCache::new();
        cache.set_item(sample());

        assert!(cache.has_cached_item());
        assert_eq!(*cache.get_cached_item().unwrap(), sample());
        assert!(cache.time_since_modified().unwrap() < Duration::from_secs(5));
    }

    #[test]
    fn test_set_replaces_previous_item() {
        let cache = ResponseCache::new();
        cache.set_item(sample());
        let mut other = sample();
        other.body = "replaced".to_string();
        cache.set_item(other);

        assert_eq!(cache.get_cached_item().unwrap().body, "replaced");
    }

    #[test]
    fn test_invalidate() {
        let cache = ResponseCache::new();
        cache.set_item(sample());
        cache.invalidate();

        assert!(!cache.has_cached_item());
        assert!(cache.get_cached_item().is_none());
    }

    #[test]
    fn test_expiry() {
        let cache = ResponseCache::new();
        cache.set_item(sample());

        assert!(!cache.is_expired(None));
        assert!(!cache.is_expired(Some(Duration::from_secs(3600))));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.is_expired(Some(Duration::from_millis(10))));
    }

    #[test]
    fn test_as_bytes_basic() {
        let text = wire_text(&sample());

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Server: httpx\r\n"));
        assert!(text.contains("X-Custom: 1\r\n"));
        assert!(text.contains("Content-Type: application/json; charset=utf-8\r\n"));
        assert!(text.contains("Content-Length: 12\r\n"));
        assert!(text.contains("Date: "));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"data\":123}"));
    }

    #[test]
    fn test_as_bytes_with_cookies_and_status() {
        let mut response = Response::new();
        response
            .with_status_code(404)
            .add_cookie(Cookie::new("session", "abc"))
            .add_cookie(Cookie::new("theme", "dark"));
        let text = wire_text(&CachedResponse::from(&response));

        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Set-Cookie: session=abc\r\n"));
        assert!(text.contains("Set-Cookie: theme=dark\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn test_content_length_counts_encoded_bytes() {
        let mut response = Response::new();
        response.with_body("héllo");
        let utf8 = CachedResponse::from(&response);
        assert!(wire_text(&utf8).contains("Content-Length: 6\r\n"));

        response.with_encoding(CharacterEncoding::Utf16Le);
        let utf16 = CachedResponse::from(&response);
        let bytes = utf16.as_bytes();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("Content-Length: 10\r\n"));
        assert!(text.contains("text/plain; charset=utf-16le"));
    }

    #[test]
    fn test_declared_charset_is_kept() {
        let mut response = Response::new();
        response.with_content_type("text/html; charset=ISO-8859-1");
        let item = CachedResponse::from(&response);
        assert_eq!(
            item.content_type_header().as_deref(),
            Some("text/html; charset=ISO-8859-1")
        );
    }

    #[test]
    fn test_managed_headers_are_not_duplicated() {
        let mut response = Response::new();
        response
            .add_header("Content-Length", "999")
            .add_header("connection", "keep-alive")
            .with_body("ab");
        let text = wire_text(&CachedResponse::from(&response));

        assert_eq!(text.matches("Content-Length").count(), 1);
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(!text.contains("keep-alive"));
    }
}
