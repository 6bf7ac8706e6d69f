// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 示例服务
//!
//! 注册三个演示路由后进入 `begin`，进程的生命周期就是服务器的生命周期：
//! - `/api/weather`：动态 JSON 接口，每次请求都重新计算；
//! - `/timing.js`：静态脚本，首个请求之后走缓存；
//! - `/`：静态首页，缓存每 60 秒失效一次。

use std::time::Duration;

use chrono::{Datelike, Utc};
use serde_derive::Serialize;

use httpx::{async_trait, HandlerError, Request, Response, RouteBinding, Server};

const ASSET_DIR: &str = "assets";

#[derive(Serialize)]
struct Forecast {
    date: String,
    temperature_c: i32,
    summary: &'static str,
}

struct WeatherEndpoint;

#[async_trait]
impl RouteBinding for WeatherEndpoint {
    fn path(&self) -> &str {
        "api/weather"
    }

    fn is_dynamic(&self) -> bool {
        true
    }

    async fn execute(&self, _request: &Request) -> Result<Response, HandlerError> {
        const SUMMARIES: [&str; 5] = ["Freezing", "Chilly", "Mild", "Warm", "Hot"];

        let today = Utc::now().date_naive();
        let forecasts: Vec<Forecast> = (1..=5)
            .map(|day| {
                let temperature_c = (today.ordinal0() as i32 * 7 + day * 13) % 45 - 10;
                let bucket = ((temperature_c + 10) / 9).clamp(0, 4) as usize;
                Forecast {
                    date: (today + chrono::Days::new(day as u64)).to_string(),
                    temperature_c,
                    summary: SUMMARIES[bucket],
                }
            })
            .collect();

        let mut response = Response::new();
        response
            .with_content_type("application/json")
            .with_serialized_body(&forecasts)?;
        Ok(response)
    }
}

struct TimingScript;

#[async_trait]
impl RouteBinding for TimingScript {
    fn path(&self) -> &str {
        "timing.js"
    }

    async fn execute(&self, _request: &Request) -> Result<Response, HandlerError> {
        let mut response = Response::new();
        response
            .set_body_to_file(format!("{}/script.js", ASSET_DIR))
            .await?;
        Ok(response)
    }
}

struct IndexPage;

#[async_trait]
impl RouteBinding for IndexPage {
    fn path(&self) -> &str {
        ""
    }

    fn invalidate_after(&self) -> Option<Duration> {
        Some(Duration::from_secs(60))
    }

    async fn execute(&self, _request: &Request) -> Result<Response, HandlerError> {
        let mut response = Response::new();
        response
            .set_body_to_file(format!("{}/index.html", ASSET_DIR))
            .await?;
        Ok(response)
    }

    fn on_exception(&self, error: &HandlerError, response: &mut Response) {
        response
            .with_content_type("text/html")
            .with_body(httpx::HtmlBuilder::from_status_code(500, Some(&error.to_string())).build());
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new()?;
    server.add_endpoint(WeatherEndpoint)?;
    server.add_endpoint(TimingScript)?;
    server.add_endpoint(IndexPage)?;
    server.begin()?;
    Ok(())
}
