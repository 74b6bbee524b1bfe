//! http_get 工具：带超时的 GET 请求
//!
//! 超时、非 2xx、连接失败都以 `[HTTP GET ...]` 文本返回，不视为 handler 失败。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::tools::{ArgSpec, ArgType, Args, ToolDescriptor, ToolHandler};

pub struct HttpGetTool {
    client: Client,
}

impl HttpGetTool {
    pub fn descriptor(default_timeout_secs: f64) -> ToolDescriptor {
        let client = Client::builder()
            .user_agent(concat!("arbor/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        ToolDescriptor::new(
            "http_get",
            "Send a HTTP GET request with timeout and basic error handling",
            HttpGetTool { client },
        )
        .required("url", ArgType::String)
        .with_default("timeout", ArgSpec::of(ArgType::Number), json!(default_timeout_secs))
    }
}

fn is_http_url(url: &str) -> bool {
    let lower = url.trim().to_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[async_trait]
impl ToolHandler for HttpGetTool {
    async fn call(&self, args: Args) -> Result<String, String> {
        let url = args.get("url").and_then(|v| v.as_str()).unwrap_or_default().trim();
        if !is_http_url(url) {
            return Ok(format!("[HTTP GET request error: unsupported URL {}]", url));
        }
        let secs = args.get("timeout").and_then(|v| v.as_f64()).unwrap_or(10.0);
        let timeout = if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs.min(3_600.0))
        } else {
            Duration::from_secs(10)
        };
        tracing::info!(url = %url, "http_get tool execute");

        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Ok(format!("[HTTP GET timeout: {}]", e)),
            Err(e) if e.is_connect() => return Ok(format!("[HTTP GET connection error: {}]", e)),
            Err(e) => return Ok(format!("[HTTP GET request error: {}]", e)),
        };
        let response = match response.error_for_status() {
            Ok(r) => r,
            Err(e) => return Ok(format!("[HTTP GET status error: {}]", e)),
        };
        match response.text().await {
            Ok(body) => Ok(body),
            Err(e) => Ok(format!("[HTTP GET error: {}]", e)),
        }
    }
}
