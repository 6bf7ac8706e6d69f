pub mod acceptor;
pub mod cache;
pub mod config;
pub mod endpoint;
pub mod exception;
pub mod listener;
pub mod logger;
pub mod param;
pub mod pool;
pub mod registry;
pub mod request;
pub mod response;
pub mod server;
pub mod util;

pub use async_trait::async_trait;

pub use cache::{CachedResponse, ResponseCache};
pub use config::{ConfigKey, ConfigStore};
pub use endpoint::{HandlerError, ListenerTimeouts, RouteBinding};
pub use exception::Exception;
pub use listener::{EndpointListener, ListenerAddress};
pub use logger::{LogSink, Logger, SharedSink};
pub use param::{CharacterEncoding, HttpMethod, HttpVersion};
pub use registry::ListenerRegistry;
pub use request::Request;
pub use response::Response;
pub use server::Server;
pub use util::HtmlBuilder;
