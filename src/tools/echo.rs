//! Echo 工具：回显文本（带长度上限）

use async_trait::async_trait;
use serde_json::json;

use crate::tools::{ArgSpec, ArgType, Args, ToolDescriptor, ToolHandler};

pub struct EchoTool;

impl EchoTool {
    pub fn descriptor(max_chars: u64) -> ToolDescriptor {
        ToolDescriptor::new("echo", "Echo the input text", EchoTool)
            .required("text", ArgType::String)
            .with_default("max_chars", ArgSpec::of(ArgType::Integer), json!(max_chars))
    }
}

#[async_trait]
impl ToolHandler for EchoTool {
    async fn call(&self, args: Args) -> Result<String, String> {
        let text = args.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        let max_chars = args
            .get("max_chars")
            .and_then(|v| v.as_u64())
            .unwrap_or(u64::MAX);
        if text.chars().count() as u64 > max_chars {
            return Ok("[Text is too large]".to_string());
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;

    #[tokio::test]
    async fn test_echo_limit() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool::descriptor(5)).unwrap();

        let args = json!({"text": "hello"}).as_object().cloned().unwrap();
        assert_eq!(reg.dispatch("echo", args).await.unwrap(), "hello");

        let args = json!({"text": "hello!"}).as_object().cloned().unwrap();
        assert_eq!(reg.dispatch("echo", args).await.unwrap(), "[Text is too large]");
    }
}
