// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块集中定义 `httpx` 在各组件之间共享的协议常量与强类型枚举：
//! - 状态码的原因短语（Reason Phrase）。
//! - 静态资源后缀到 `Content-Type` 的推断表。
//! - 路由方法、协议版本与字符编码。
//! - 队列深度、超时、报文大小等运行期上限。

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use lazy_static::lazy_static;

/// 服务器名称标识，由基础响应写入 `Server` 头
pub const SERVER_NAME: &str = "httpx";

/// HTTP 协议规定的换行符
pub const CRLF: &str = "\r\n";

/// 配置目录（相对于进程工作目录）
pub const CONFIG_DIR: &str = "configuration";

/// 配置文件名
pub const CONFIG_FILE_NAME: &str = "core_config.json";

/// 文件日志目录
pub const LOG_DIR: &str = "logs";

/// 每个路由监听器的请求队列长度，队列满时直接返回 503
pub const REQUEST_QUEUE_LENGTH: usize = 1000;

/// 工作线程池中每个 worker 对应的排队深度
pub const WORKER_QUEUE_DEPTH: usize = 64;

/// 运行时阻塞线程池的上限（tokio 自身的默认值）
pub const DEFAULT_BLOCKING_THREADS: usize = 512;

/// 请求头部分的最大字节数
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// 请求体的最大字节数（10MB）
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// 监听器各阶段超时的默认值
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

lazy_static! {
    /// 状态码与标准原因短语的映射表。
    ///
    /// 参考标准：[RFC 9110: HTTP Semantics](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(100, "Continue");
        map.insert(101, "Switching Protocols");

        map.insert(200, "OK");
        map.insert(201, "Created");
        map.insert(202, "Accepted");
        map.insert(204, "No Content");
        map.insert(206, "Partial Content");

        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(303, "See Other");
        map.insert(304, "Not Modified");
        map.insert(307, "Temporary Redirect");
        map.insert(308, "Permanent Redirect");

        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(406, "Not Acceptable");
        map.insert(408, "Request Timeout");
        map.insert(409, "Conflict");
        map.insert(410, "Gone");
        map.insert(411, "Length Required");
        map.insert(413, "Content Too Large");
        map.insert(414, "URI Too Long");
        map.insert(415, "Unsupported Media Type");
        map.insert(418, "I'm a teapot");
        map.insert(422, "Unprocessable Content");
        map.insert(429, "Too Many Requests");
        map.insert(431, "Request Header Fields Too Large");

        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(502, "Bad Gateway");
        map.insert(503, "Service Unavailable");
        map.insert(504, "Gateway Timeout");
        map.insert(505, "HTTP Version Not Supported");
        map
    };
}

lazy_static! {
    /// 静态资源后缀到 `Content-Type` 的推断表。
    ///
    /// 只覆盖页面资源；其余后缀保留处理器自己设置的类型。
    pub static ref ASSET_CONTENT_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("html", "text/html");
        map.insert("htm", "text/html");
        map.insert("js", "text/javascript");
        map.insert("css", "text/css");
        map
    };
}

/// 取得状态码对应的原因短语，未登记的状态码返回通用描述
pub fn reason_phrase(code: u16) -> &'static str {
    STATUS_CODES.get(&code).copied().unwrap_or(match code {
        100..=199 => "Informational",
        200..=299 => "Success",
        300..=399 => "Redirection",
        400..=499 => "Client Error",
        _ => "Server Error",
    })
}

/// 路由可以绑定的 HTTP 方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    /// 从请求行中的方法名解析，大小写不敏感
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "DELETE" => Some(HttpMethod::Delete),
            "PATCH" => Some(HttpMethod::Patch),
            _ => None,
        }
    }
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    V1_0,
    V1_1,
}

/// 响应体的字符编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharacterEncoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Ascii,
    Latin1,
}

impl CharacterEncoding {
    /// `Content-Type` 中 `charset` 参数使用的名称
    pub fn label(&self) -> &'static str {
        match self {
            CharacterEncoding::Utf8 => "utf-8",
            CharacterEncoding::Utf16Le => "utf-16le",
            CharacterEncoding::Utf16Be => "utf-16be",
            CharacterEncoding::Ascii => "us-ascii",
            CharacterEncoding::Latin1 => "iso-8859-1",
        }
    }

    /// 将文本编码为字节。目标编码无法表示的字符替换为 `?`。
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            CharacterEncoding::Utf8 => text.as_bytes().to_vec(),
            CharacterEncoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            CharacterEncoding::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
            CharacterEncoding::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            CharacterEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }
}

impl fmt::Display for HttpMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Delete => write!(f, "DELETE"),
            HttpMethod::Patch => write!(f, "PATCH"),
        }
    }
}

impl fmt::Display for HttpVersion {
    /// 将枚举格式化为报文中的版本字符串
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "HTTP/1.0"),
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}

impl fmt::Display for CharacterEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
