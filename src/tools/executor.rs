//! 工具执行器
//!
//! 持有只读 ToolRegistry 与单次调用超时；run(tool_name, args) 总是返回字符串结果：
//! 校验失败、handler 报错、超时都被记录为 "Error: ..." 文本，不会中断同轮的其它步骤。
//! 每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::ToolError;
use crate::tools::registry::DispatchOutcome;
use crate::tools::{Args, ToolRegistry};

/// 工具执行器：对每次调用施加超时，并把所有结果折叠为字符串
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self::shared(Arc::new(registry), timeout_secs)
    }

    pub fn shared(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 带超时的 dispatch；保留 handler 报错 / panic 的区分
    pub(crate) async fn try_run(
        &self,
        tool_name: &str,
        args: Args,
    ) -> Result<Result<DispatchOutcome, ToolError>, Duration> {
        timeout(self.timeout, self.registry.dispatch_outcome(tool_name, args))
            .await
            .map_err(|_| self.timeout)
    }

    /// 执行指定工具并返回结果文本；输出 JSON 审计日志
    pub async fn run(&self, tool_name: &str, args: Args) -> String {
        let (content, audit) = self.run_audited(tool_name, args).await;
        tracing::info!(audit = %audit, "tool");
        content
    }

    /// 结果文本 + 审计记录
    pub(crate) async fn run_audited(&self, tool_name: &str, args: Args) -> (String, Value) {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = self.try_run(tool_name, args).await;

        let (ok, outcome) = match &result {
            Ok(Ok(outcome)) => (outcome.is_completed(), outcome.label()),
            Ok(Err(_)) => (false, "rejected"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });

        let content = match result {
            Ok(Ok(outcome)) => outcome.into_content(tool_name),
            Ok(Err(e)) => format!("Error: {}", e),
            Err(limit) => format!("Error: tool {} timed out after {}s", tool_name, limit.as_secs()),
        };
        (content, audit)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Args) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
