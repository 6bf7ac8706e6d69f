// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求模块
//!
//! 负责把套接字上读到的原始字节解析为强类型的 `Request`：
//! 1. 请求行（方法、目标、版本）的解析。
//! 2. 全部请求头的提取（字段名大小写不敏感）。
//! 3. 请求体由监听器在确定路由之后按 `Content-Length` 补齐。

use bytes::Bytes;

use crate::{exception::Exception, param::*, util::split_target};

/// 一个完整的 HTTP 请求
#[derive(Debug, Clone)]
pub struct Request {
    /// 连接序号，用于在日志中追踪同一个请求
    id: u64,
    method: HttpMethod,
    /// 请求行中的原始目标（包含查询字符串）
    target: String,
    version: HttpVersion,
    /// 按出现顺序保存的请求头
    headers: Vec<(String, String)>,
    body: Bytes,
}

/// 在缓冲区中查找请求头结束位置（`\r\n\r\n` 之后的第一个字节）
pub fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

impl Request {
    /// 从请求头字节中构建 `Request`，请求体为空。
    ///
    /// # 错误处理
    /// 报文不是 UTF-8、请求行不完整、方法或版本不受支持时返回对应的 `Exception`。
    pub fn try_from(buffer: &[u8], id: u64) -> Result<Self, Exception> {
        let head = match find_head_end(buffer) {
            Some(end) => &buffer[..end - 4],
            None => buffer,
        };
        let request_string = std::str::from_utf8(head).map_err(|_| Exception::RequestIsNotUtf8)?;

        let mut lines = request_string.split(CRLF);
        let request_line = lines.next().unwrap_or_default();

        // 请求行，例如 "GET /index.html HTTP/1.1"
        let parts: Vec<&str> = request_line.split(' ').filter(|p| !p.is_empty()).collect();
        if parts.len() < 3 {
            return Err(Exception::MalformedRequest(format!(
                "请求行格式不正确：{}",
                request_line
            )));
        }

        let method = HttpMethod::parse(parts[0])
            .ok_or_else(|| Exception::UnsupportedRequestMethod(parts[0].to_string()))?;

        let version_str = parts[parts.len() - 1].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            _ => return Err(Exception::UnsupportedHttpVersion(version_str)),
        };

        // 目标中可能夹杂空格，虽然不规范，但通过 join 尝试恢复
        let target = parts[1..parts.len() - 1].join(" ");

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                Exception::MalformedRequest(format!("请求头格式不正确：{}", line))
            })?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(Self {
            id,
            method,
            target,
            version,
            headers,
            body: Bytes::new(),
        })
    }

    pub(crate) fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }
}

impl Request {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// 请求行中的原始目标
    pub fn target(&self) -> &str {
        &self.target
    }

    /// 去掉查询字符串后的路径
    pub fn path(&self) -> &str {
        split_target(&self.target).0
    }

    pub fn query(&self) -> Option<&str> {
        split_target(&self.target).1
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// 按字段名（大小写不敏感）取第一个匹配的请求头
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn host(&self) -> Option<&str> {
        self.header("Host")
    }

    pub fn user_agent(&self) -> &str {
        self.header("User-Agent").unwrap_or_default()
    }

    pub fn content_length(&self) -> Result<usize, Exception> {
        match self.header("Content-Length") {
            Some(v) => v
                .parse()
                .map_err(|_| Exception::MalformedRequest(format!("Content-Length 不正确：{}", v))),
            None => Ok(0),
        }
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// 以 UTF-8 文本读取请求体，非法字节被替换
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
