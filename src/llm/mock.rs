//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! - MockLlmClient：按 prompt 类型回复：规划返回 echo + final 计划，生成返回思维数组，
//!   评估返回固定分数，复盘返回 JSON 结论，其余（合成）返回以问题为内容的答案
//! - ScriptedLlmClient：由闭包决定回复，并记录每次调用，便于断言 prompt 内容

use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message, Role, SamplingParams};

/// Mock 客户端：离线跑通 dag 与 tree 两种模式
#[derive(Debug, Default)]
pub struct MockLlmClient;

impl MockLlmClient {
    fn plan(last_user: &str) -> String {
        let plan = serde_json::json!([
            {
                "id": "echo",
                "tool": "echo",
                "args": { "text": format!("Echo from Mock: {}", last_user) },
                "dependencies": []
            },
            {
                "id": "final",
                "action": "final",
                "answer": "Mock answer",
                "dependencies": ["echo"]
            }
        ]);
        format!("```json\n{}\n```", plan)
    }

    fn thoughts(question: &str) -> String {
        let thoughts = serde_json::json!([
            {
                "thought": format!("Restate the question: {}", question),
                "action": { "tool": "echo", "args": { "text": question } }
            },
            { "thought": "Break the problem into smaller steps" },
            { "thought": "Check the answer against the question" }
        ]);
        thoughts.to_string()
    }

    fn reflection() -> String {
        serde_json::json!({
            "success": true,
            "strengths": ["Mock run completed"],
            "errors": [],
            "improvements": []
        })
        .to_string()
    }
}

/// 合成 / 生成 prompt 中 "Question: ..." 行的内容
fn question_line(prompt: &str) -> Option<&str> {
    prompt
        .lines()
        .find_map(|line| line.trim().strip_prefix("Question: "))
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _params: &SamplingParams,
    ) -> Result<String, LlmError> {
        let system = messages
            .iter()
            .find(|m| matches!(m.role, Role::System))
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        let question = question_line(last_user).unwrap_or(last_user);

        let reply = if system.contains("Directed Acyclic Graph") {
            Self::plan(last_user)
        } else if system.contains("agent evaluator") {
            Self::reflection()
        } else if last_user.contains("Evaluate this thought") {
            r#"{"score": 0.7}"#.to_string()
        } else if last_user.contains("diverse thoughts") {
            Self::thoughts(question)
        } else {
            format!("Mock answer: {}", question)
        };
        Ok(reply)
    }
}

type Responder = dyn Fn(&[Message], &SamplingParams) -> Result<String, LlmError> + Send + Sync;

/// 一次被记录的调用
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub params: SamplingParams,
}

impl RecordedCall {
    /// 最后一条 User 消息内容
    pub fn last_user(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// 脚本化客户端：closure 决定回复
pub struct ScriptedLlmClient {
    responder: Box<Responder>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlmClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[Message], &SamplingParams) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 每次都返回同一段文本
    pub fn fixed(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(move |_, _| Ok(reply.clone()))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        params: &SamplingParams,
    ) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages: messages.to_vec(),
                params: params.clone(),
            });
        }
        (self.responder)(messages, params)
    }
}
