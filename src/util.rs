use chrono::{DateTime, Utc};

use crate::param::reason_phrase;

/// 错误页面生成器，用于监听器在路由之外直接给出的响应（404、400、503 等）。
pub struct HtmlBuilder {
    title: String,
    css: String,
    body: String,
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let description = note.unwrap_or_else(|| reason_phrase(code));
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            <hr>
            <p>httpx</p>
            ",
            code, description
        );
        Self {
            title: code.to_string(),
            css: r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
            .to_string(),
            body,
        }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <html>
                <head>
                    <meta charset="utf-8">
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.title, self.css, self.body
        )
    }
}

/// 规范化路由路径，保证以 `/` 开头并以 `/` 结尾
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 2);
    if !path.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(path);
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// 把请求目标拆成路径与查询字符串
pub fn split_target(target: &str) -> (&str, Option<&str>) {
    match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    }
}

/// `Date` 头使用的 IMF-fixdate 格式
pub fn format_http_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
