use std::path::Path;

use cookie::Cookie;
use log::debug;
use serde::Serialize;

use crate::{exception::Exception, param::*};

/// 处理器构建的响应。
///
/// 这是一个便于使用的中间形式，由监听器在写出时翻译成线上报文。
#[derive(Debug, Clone)]
pub struct Response {
    /// 状态码，默认 200
    pub status_code: u16,
    /// 可选的状态描述，缺省时使用标准原因短语
    pub status_message: Option<String>,
    /// 默认 `text/plain`
    pub content_type: String,
    /// 响应体编码，默认 UTF-8
    pub encoding: CharacterEncoding,
    pub cookies: Vec<Cookie<'static>>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// 基础响应：200、`text/plain`、UTF-8，并带上 `Server` 头。
    pub fn new() -> Self {
        Self {
            status_code: 200,
            status_message: None,
            content_type: "text/plain".to_string(),
            encoding: CharacterEncoding::Utf8,
            cookies: Vec::new(),
            headers: vec![("Server".to_string(), SERVER_NAME.to_string())],
            body: String::new(),
        }
    }

    pub fn add_cookie(&mut self, cookie: Cookie<'static>) -> &mut Self {
        self.cookies.push(cookie);
        self
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_status_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self
    }

    pub fn with_status_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.status_message = Some(message.into());
        self
    }

    pub fn with_content_type(&mut self, content_type: impl Into<String>) -> &mut Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_encoding(&mut self, encoding: CharacterEncoding) -> &mut Self {
        self.encoding = encoding;
        self
    }

    /// 覆盖整个响应体
    pub fn with_body(&mut self, body: impl Into<String>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// 把 `value` 序列化为 JSON 并覆盖响应体
    pub fn with_serialized_body<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<&mut Self, Exception> {
        self.body = serde_json::to_string(value)?;
        Ok(self)
    }

    pub fn append_to_body(&mut self, content: &str) -> &mut Self {
        self.body.push_str(content);
        self
    }

    /// 用文件内容覆盖响应体，并根据后缀推断 `Content-Type`。
    pub async fn set_body_to_file(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, Exception> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(Exception::FileNotFound(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ASSET_CONTENT_TYPES.get(extension.as_str()) {
            Some(content_type) => self.content_type = content_type.to_string(),
            None => debug!("无法根据后缀 '{}' 推断内容类型", extension),
        }

        self.body = tokio::fs::read_to_string(path).await?;
        Ok(self)
    }

    /// 线上报文使用的状态描述
    pub fn reason(&self) -> &str {
        self.status_message
            .as_deref()
            .unwrap_or_else(|| reason_phrase(self.status_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_derive::Serialize;

    #[test]
    fn test_response_new() {
        let response = Response::new();

        assert_eq!(response.status_code, 200);
        assert_eq!(response.reason(), "OK");
        assert_eq!(response.content_type, "text/plain");
        assert_eq!(response.encoding, CharacterEncoding::Utf8);
        assert_eq!(
            response.headers,
            vec![("Server".to_string(), "httpx".to_string())]
        );
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_builder_chain() {
        let mut response = Response::new();
        response
            .with_status_code(201)
            .with_content_type("application/json")
            .add_header("X-Trace", "abc")
            .add_cookie(Cookie::new("session", "42"))
            .with_body("{")
            .append_to_body("}");

        assert_eq!(response.status_code, 201);
        assert_eq!(response.reason(), "Created");
        assert_eq!(response.content_type, "application/json");
        assert_eq!(response.headers.len(), 2);
        assert_eq!(response.cookies[0].name(), "session");
        assert_eq!(response.body, "{}");
    }

    #[test]
    fn test_custom_status_message() {
        let mut response = Response::new();
        response.with_status_code(299).with_status_message("Mostly Fine");
        assert_eq!(response.reason(), "Mostly Fine");
    }

    #[test]
    fn test_serialized_body() {
        #[derive(Serialize)]
        struct Payload {
            data: u32,
        }

        let mut response = Response::new();
        response.with_body("old").with_serialized_body(&Payload { data: 123 }).unwrap();
        assert_eq!(response.body, r#"{"data":123}"#);
    }

    #[tokio::test]
    async fn test_set_body_to_file_infers_content_type() {
        let dir = tempfile::tempdir().unwrap();
        for (name, expected) in [
            ("index.html", "text/html"),
            ("page.HTM", "text/html"),
            ("timing.js", "text/javascript"),
            ("site.css", "text/css"),
        ] {
            let path = dir.path().join(name);
            std::fs::write(&path, "content").unwrap();

            let mut response = Response::new();
            response.set_body_to_file(&path).await.unwrap();

            assert_eq!(response.content_type, expected, "{}", name);
            assert_eq!(response.body, "content");
        }
    }

    #[tokio::test]
    async fn test_set_body_to_file_keeps_unknown_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "a,b").unwrap();

        let mut response = Response::new();
        response.with_content_type("text/csv");
        response.set_body_to_file(&path).await.unwrap();

        assert_eq!(response.content_type, "text/csv");
        assert_eq!(response.body, "a,b");
    }

    #[tokio::test]
    async fn test_set_body_to_missing_file() {
        let mut response = Response::new();
        let result = response.set_body_to_file("does/not/exist.html").await;
        assert!(matches!(result, Err(Exception::FileNotFound(_))));
    }
}
