//! # 路由绑定
//!
//! 应用通过实现 [`RouteBinding`] 描述一个路由：路径、方法、缓存策略、处理逻辑，
//! 以及两个可选钩子。监听器只依赖这个 trait，不关心具体的路由类型。

use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;

use crate::param::{HttpMethod, DEFAULT_TIMEOUT};
use crate::request::Request;
use crate::response::Response;

/// 处理器返回的错误
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// 监听器各阶段的超时设置，可在 [`RouteBinding::on_listener_init`] 中调整。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerTimeouts {
    /// 等待请求头到达
    pub header_wait: Duration,
    /// 读取请求体
    pub entity_body: Duration,
    /// 写出响应
    pub response_write: Duration,
}

impl Default for ListenerTimeouts {
    fn default() -> Self {
        Self {
            header_wait: DEFAULT_TIMEOUT,
            entity_body: DEFAULT_TIMEOUT,
            response_write: DEFAULT_TIMEOUT,
        }
    }
}

/// 一个由应用定义的路由。
///
/// 除 `path` 与 `execute` 以外都有默认实现：`GET`、可缓存、永不过期、钩子为空。
#[async_trait]
pub trait RouteBinding: Send + Sync + 'static {
    /// 相对路径，例如 `"api/weather"`，也可以为空表示根路径
    fn path(&self) -> &str;

    fn method(&self) -> HttpMethod {
        HttpMethod::Get
    }

    /// 为 `true` 时每个请求都重新执行处理器
    fn is_dynamic(&self) -> bool {
        false
    }

    /// 缓存的有效期，`None` 表示直到显式失效
    fn invalidate_after(&self) -> Option<Duration> {
        None
    }

    /// 处理请求。返回错误或 panic 时，本次响应变为 500 并交给 [`Self::on_exception`]。
    async fn execute(&self, request: &Request) -> Result<Response, HandlerError>;

    /// 处理器失败后调整要写出的响应
    fn on_exception(&self, _error: &HandlerError, _response: &mut Response) {}

    /// 监听器构造时调用一次
    fn on_listener_init(&self, _timeouts: &mut ListenerTimeouts) {}
}
