//! LLM 客户端抽象
//!
//! 引擎只依赖 LlmClient::complete；流式、重试与退避属于具体后端，调度器一律视为一次同步调用。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::{Message, SamplingParams};

/// 生成调用失败的三种形态
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM transport error: {0}")]
    Transport(String),

    #[error("LLM upstream error: {0}")]
    Upstream(String),
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        params: &SamplingParams,
    ) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
