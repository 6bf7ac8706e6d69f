// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了 `httpx` 在启动、配置、监听与请求处理生命周期中可能出现的异常。
//!
//! ## 分类
//! - **启动期致命错误**：配置文件不可读、地址无法绑定等，向上传播，进程不会启动。
//! - **请求级错误**：报文无法解析、超时、请求体过大等，被转换为对应的状态码直接返回给客户端。
//! - **处理器错误**：路由逻辑中的 panic 被捕获后以 `HandlerPanicked` 交给路由的异常钩子。

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// 服务器运行过程中发生的异常类型。
#[derive(Debug, Error)]
pub enum Exception {
    /// 配置目录无法创建。
    #[error("无法创建配置目录 {path}: {source}")]
    ConfigDirectory { path: PathBuf, source: io::Error },

    /// 配置文件存在但无法读取（格式错误不属于此类）。
    #[error("无法读取配置文件 {path}: {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    /// 配置项的值无法转换为调用者要求的类型。
    #[error("配置项 {key} 的值无法转换为所需类型: {reason}")]
    ConfigValueType { key: &'static str, reason: String },

    /// 配置中没有设置 `base_url`。
    #[error("配置中没有设置 base_url")]
    MissingBaseUrl,

    /// `base_url` 无法解析为可绑定的地址。
    #[error("无法解析监听地址: {0}")]
    AddressResolution(String),

    /// 端口绑定失败。
    #[error("无法绑定地址 {address}: {source}")]
    Bind { address: SocketAddr, source: io::Error },

    /// 同一个套接字上注册了重复的路由前缀。
    #[error("路由前缀 {0} 已经被注册")]
    PrefixConflict(String),

    /// 请求字节流无法解析为合法的 UTF-8 字符串。
    #[error("Request bytes can't be parsed in UTF-8")]
    RequestIsNotUtf8,

    /// 请求行或请求头格式非法。
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// 请求使用了服务器不支持的方法。
    #[error("Unsupported request method: {0}")]
    UnsupportedRequestMethod(String),

    /// 请求使用了服务器不支持的协议版本。
    #[error("Unsupported HTTP version: {0}")]
    UnsupportedHttpVersion(String),

    /// 在超时时间内没有读完请求。
    #[error("Request timed out")]
    RequestTimeout,

    /// 请求头或请求体超过上限。
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// 处理器要求读取的文件不存在。
    #[error("{} is not found", .0.display())]
    FileNotFound(PathBuf),

    /// 路由处理器在执行过程中 panic。
    #[error("Handler panicked: {0}")]
    HandlerPanicked(String),

    /// 工作线程池已经关闭，无法再接收任务。
    #[error("工作线程池已关闭")]
    WorkerPoolClosed,

    /// 日志系统初始化失败。
    #[error("日志系统初始化失败: {0}")]
    Logging(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Exception {
    /// 请求级错误对应的响应状态码，其余错误一律视为 500。
    pub fn status_code(&self) -> u16 {
        match self {
            Exception::RequestIsNotUtf8 | Exception::MalformedRequest(_) => 400,
            Exception::RequestTimeout => 408,
            Exception::PayloadTooLarge(_) => 413,
            Exception::FileNotFound(_) => 404,
            Exception::UnsupportedRequestMethod(_) => 501,
            Exception::UnsupportedHttpVersion(_) => 505,
            _ => 500,
        }
    }
}
