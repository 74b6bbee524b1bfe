//! 合成：把 DAG 的 {id: result} 或思维树的候选路径渲染成一个 prompt，调用 LLM 得到最终答案
//!
//! 只有 Final 步骤的计划直接返回其 answer，不发起调用。合成调用失败是整次运行的错误。

use std::sync::Arc;

use crate::core::EngineError;
use crate::llm::{LlmClient, Message, SamplingParams};
use crate::plan::{ExecutionResult, Step};
use crate::prompts::CommandMode;
use crate::scheduler::ThoughtPath;

/// 思维树没有任何候选路径时的答案
pub const NO_THOUGHTS_ANSWER: &str = "No thoughts were generated to form an answer.";

const SYNTHESIS_SYSTEM: &str =
    "You are a helpful assistant that writes the final answer to the user's question from the work already done.";

/// 按字符截断，截断时追加 "..."
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// DAG 合成 prompt；计划中没有工具步骤时返回 None（直接使用 Final 答案）
pub fn dag_prompt(
    goal: &str,
    plan: &[Step],
    results: &ExecutionResult,
    preview_chars: usize,
) -> Option<String> {
    let tool_lines: Vec<String> = plan
        .iter()
        .filter(|s| !s.is_final())
        .map(|s| {
            let result = results.get(&s.id).unwrap_or("(no result)");
            format!("{}: {}", s.id, preview(result, preview_chars))
        })
        .collect();
    if tool_lines.is_empty() {
        return None;
    }
    let summary = tool_lines.join("\n");

    let prompt = match plan.iter().find_map(Step::answer) {
        Some(draft) => format!(
            "Based on the following tool execution results, provide a comprehensive final answer to the user's question.\n\n\
             Question: {goal}\n\n\
             Tool Results:\n{summary}\n\n\
             Initial Answer: {draft}\n\n\
             Please provide a clear, comprehensive final answer that incorporates all relevant information from the tool results:"
        ),
        None => format!(
            "Based on the following tool execution results, provide a final answer to the user's question.\n\n\
             Question: {goal}\n\n\
             Tool Results:\n{summary}\n\n\
             Provide a clear, concise final answer:"
        ),
    };
    Some(prompt)
}

/// 思维树合成 prompt；没有路径时返回 None
pub fn tree_prompt(goal: &str, paths: &[ThoughtPath], preview_chars: usize) -> Option<String> {
    if paths.is_empty() {
        return None;
    }
    let mut blocks = String::new();
    for (i, path) in paths.iter().enumerate() {
        blocks.push_str(&format!("Path {} (score: {:.2}):\n", i + 1, path.score));
        for (j, step) in path.steps.iter().enumerate() {
            blocks.push_str(&format!("  {}. {}\n", j + 1, step.content));
            if let Some(result) = &step.result {
                blocks.push_str(&format!("     Result: {}\n", preview(result, preview_chars)));
            }
        }
    }
    Some(format!(
        "Question: {goal}\n\n\
         Explored reasoning paths:\n{blocks}\n\
         Based on these reasoning paths, provide a comprehensive final answer to the question.\n\
         Use the highest-scoring path as your primary approach, but incorporate insights from other paths where relevant.\n\n\
         Answer:"
    ))
}

/// 只有 Final 步骤时的答案：优先取调度结果（可能是 Unreachable 错误文本），否则取字面 answer
fn direct_answer(plan: &[Step], results: &ExecutionResult) -> String {
    plan.iter()
        .find(|s| s.is_final())
        .map(|s| {
            results
                .get(&s.id)
                .map(String::from)
                .unwrap_or_else(|| s.answer().unwrap_or_default().to_string())
        })
        .unwrap_or_default()
}

pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
    params: SamplingParams,
    result_preview_chars: usize,
    path_result_preview_chars: usize,
    mode: CommandMode,
}

impl Synthesizer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        params: SamplingParams,
        result_preview_chars: usize,
        path_result_preview_chars: usize,
    ) -> Self {
        Self {
            llm,
            params,
            result_preview_chars,
            path_result_preview_chars,
            mode: CommandMode::default(),
        }
    }

    pub fn with_command(mut self, mode: CommandMode) -> Self {
        self.mode = mode;
        self
    }

    /// 固定的合成说明 + 当前命令模式的角色说明
    fn system_prompt(&self) -> String {
        format!("{}\n\n{}", SYNTHESIS_SYSTEM, self.mode.system_prompt())
    }

    pub async fn synthesize_dag(
        &self,
        goal: &str,
        plan: &[Step],
        results: &ExecutionResult,
    ) -> Result<String, EngineError> {
        match dag_prompt(goal, plan, results, self.result_preview_chars) {
            Some(prompt) => self.complete(prompt).await,
            None => {
                tracing::info!("Plan has no tool steps, returning final answer directly");
                Ok(direct_answer(plan, results))
            }
        }
    }

    pub async fn synthesize_tree(
        &self,
        goal: &str,
        paths: &[ThoughtPath],
    ) -> Result<String, EngineError> {
        match tree_prompt(goal, paths, self.path_result_preview_chars) {
            Some(prompt) => self.complete(prompt).await,
            None => Ok(NO_THOUGHTS_ANSWER.to_string()),
        }
    }

    async fn complete(&self, prompt: String) -> Result<String, EngineError> {
        let messages = [Message::system(self.system_prompt()), Message::user(prompt)];
        self.llm.complete(&messages, &self.params).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to synthesize final answer");
            EngineError::Synthesis(e)
        })
    }
}
