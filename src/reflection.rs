//! 运行复盘：一次 DAG / 思维树运行结束后，由 LLM 给出优点、问题与改进建议
//!
//! 先从运行结果汇总执行摘要（DagSummary / TreeSummary），再发起一次低温调用；
//! 回复中的 JSON 对象解析为 AgentReflection。回复无法解析时给出中性结论，
//! 调用失败时 success = false 并在 errors 中记录原因。复盘不会让运行本身失败。

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::{DagRun, TreeRun};
use crate::llm::{LlmClient, Message, SamplingParams};
use crate::scheduler::TreeConfig;

pub const DAG_AGENT: &str = "dag-compiler";
pub const TREE_AGENT: &str = "tree-of-thoughts";

const REFLECTION_SYSTEM: &str =
    "You are an expert AI agent evaluator. Provide honest, constructive feedback in JSON format.";

/// 复盘结论
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentReflection {
    pub agent_type: String,
    pub goal: String,
    pub success: bool,
    pub strengths: Vec<String>,
    pub errors: Vec<String>,
    pub improvements: Vec<String>,
    /// 发给 LLM 的执行摘要
    pub summary: Value,
}

impl fmt::Display for AgentReflection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reflection for {} run", self.agent_type)?;
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "Goal: {}", self.goal)?;
        writeln!(f, "Success: {}", self.success)?;
        for (title, mark, items) in [
            ("Strengths", '✓', &self.strengths),
            ("Errors/Issues", '✗', &self.errors),
            ("Improvements", '→', &self.improvements),
        ] {
            if items.is_empty() {
                continue;
            }
            writeln!(f)?;
            writeln!(f, "{}:", title)?;
            for item in items {
                writeln!(f, "  {} {}", mark, item)?;
            }
        }
        Ok(())
    }
}

/// DAG 运行的执行摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DagSummary {
    pub total_steps: usize,
    pub steps_executed: usize,
    /// 去重后按名称排序
    pub tools_used: Vec<String>,
    /// 结果文本中含 "Error" 的步骤，按计划顺序
    pub errors_encountered: Vec<String>,
    /// 没有依赖、可在第一轮并发的步骤数
    pub parallel_opportunities: usize,
    /// 实际执行的轮数
    pub dependency_depth: usize,
    pub unreachable: Vec<String>,
}

impl DagSummary {
    pub fn from_run(run: &DagRun) -> Self {
        let tools_used: BTreeSet<String> = run
            .plan
            .iter()
            .filter_map(|s| s.tool_name())
            .map(String::from)
            .collect();
        let errors_encountered = run
            .plan
            .iter()
            .filter_map(|s| run.report.results.get(&s.id))
            .filter(|r| r.contains("Error"))
            .map(String::from)
            .collect();
        Self {
            total_steps: run.plan.len(),
            steps_executed: run.report.rounds.iter().map(Vec::len).sum(),
            tools_used: tools_used.into_iter().collect(),
            errors_encountered,
            parallel_opportunities: run.plan.iter().filter(|s| s.dependencies.is_empty()).count(),
            dependency_depth: run.report.rounds.len(),
            unreachable: run.report.unreachable.clone(),
        }
    }
}

/// 思维树运行的执行摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeSummary {
    pub max_depth: usize,
    pub branching_factor: usize,
    pub beam_width: usize,
    pub depth_reached: usize,
    pub thoughts_explored: usize,
    pub final_paths: usize,
    pub placeholders: usize,
    pub tools_suggested: Vec<String>,
    pub tools_executed: usize,
    pub best_score: f64,
    /// thoughts_explored / (max_depth × branching_factor)
    pub exploration_efficiency: f64,
}

impl TreeSummary {
    pub fn from_run(run: &TreeRun, config: &TreeConfig) -> Self {
        let thoughts = &run.report.thoughts;
        let tools_suggested: BTreeSet<String> = thoughts
            .iter()
            .filter_map(|t| t.action.as_ref())
            .map(|call| call.tool.clone())
            .collect();
        let best_score = run
            .report
            .frontier
            .iter()
            .map(|t| t.score)
            .fold(0.0, f64::max);
        let budget = config.max_depth * config.branching_factor;
        Self {
            max_depth: config.max_depth,
            branching_factor: config.branching_factor,
            beam_width: config.beam_width,
            depth_reached: run.report.levels.len(),
            thoughts_explored: thoughts.len(),
            final_paths: run.report.paths.len(),
            placeholders: thoughts.iter().filter(|t| t.placeholder).count(),
            tools_suggested: tools_suggested.into_iter().collect(),
            tools_executed: thoughts.iter().filter(|t| t.result.is_some()).count(),
            best_score,
            exploration_efficiency: if budget > 0 {
                thoughts.len() as f64 / budget as f64
            } else {
                0.0
            },
        }
    }
}

/// 复盘调用的 user prompt
pub fn reflection_prompt(goal: &str, agent_type: &str, summary: &Value, answer: &str) -> String {
    let summary = serde_json::to_string_pretty(summary).unwrap_or_else(|_| summary.to_string());
    format!(
        r#"Analyze the following agent execution and provide constructive feedback.

## Task:
{goal}

## Agent Type:
{agent_type}

## Execution Summary:
{summary}

## Final Answer:
{answer}

## Your Task:
Analyze this execution and provide:
1. **Strengths**: What did the agent do well? (2-4 points)
2. **Errors/Issues**: What went wrong or could be improved? (be specific)
3. **Improvements**: Concrete suggestions for better performance next time

Format your response as JSON:
{{
    "success": true,
    "strengths": ["strength1", "strength2"],
    "errors": ["error1"],
    "improvements": ["improvement1"]
}}

Be honest and constructive. Focus on actionable feedback."#
    )
}

#[derive(Debug, Deserialize)]
struct ReflectionReply {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    improvements: Vec<String>,
}

fn default_success() -> bool {
    true
}

fn fenced_object() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("valid fenced-object regex")
    })
}

fn outer_object() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid object regex"))
}

/// 依次尝试：```json {...}``` 代码块、第一个 { 到最后一个 } 的子串、整段文本
fn parse_reply(text: &str) -> Option<ReflectionReply> {
    let fenced = fenced_object()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());
    let outer = outer_object().find(text).map(|m| m.as_str());
    [fenced, outer, Some(text.trim())]
        .into_iter()
        .flatten()
        .find_map(|candidate| serde_json::from_str(candidate).ok())
}

/// 复盘器：持有 LLM 与复盘专用的采样参数
pub struct Reflector {
    llm: Arc<dyn LlmClient>,
    params: SamplingParams,
}

impl Reflector {
    pub fn new(llm: Arc<dyn LlmClient>, params: SamplingParams) -> Self {
        Self { llm, params }
    }

    pub async fn reflect_dag(&self, goal: &str, run: &DagRun) -> AgentReflection {
        let summary = serde_json::to_value(DagSummary::from_run(run)).unwrap_or_default();
        self.reflect(goal, DAG_AGENT, summary, &run.answer).await
    }

    pub async fn reflect_tree(
        &self,
        goal: &str,
        run: &TreeRun,
        config: &TreeConfig,
    ) -> AgentReflection {
        let summary =
            serde_json::to_value(TreeSummary::from_run(run, config)).unwrap_or_default();
        self.reflect(goal, TREE_AGENT, summary, &run.answer).await
    }

    async fn reflect(
        &self,
        goal: &str,
        agent_type: &str,
        summary: Value,
        answer: &str,
    ) -> AgentReflection {
        let messages = [
            Message::system(REFLECTION_SYSTEM),
            Message::user(reflection_prompt(goal, agent_type, &summary, answer)),
        ];
        let mut reflection = AgentReflection {
            agent_type: agent_type.to_string(),
            goal: goal.to_string(),
            success: true,
            strengths: Vec::new(),
            errors: Vec::new(),
            improvements: Vec::new(),
            summary,
        };

        match self.llm.complete(&messages, &self.params).await {
            Ok(text) => match parse_reply(&text) {
                Some(reply) => {
                    reflection.success = reply.success;
                    reflection.strengths = reply.strengths;
                    reflection.errors = reply.errors;
                    reflection.improvements = reply.improvements;
                }
                None => {
                    tracing::warn!("Could not parse reflection JSON, using basic reflection");
                    reflection.strengths = vec!["Agent completed the task".to_string()];
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to generate reflection");
                reflection.success = false;
                reflection.errors = vec![format!("Reflection generation failed: {}", e)];
                reflection.improvements = vec![
                    "Retry reflection generation".to_string(),
                    "Check API connectivity".to_string(),
                ];
            }
        }
        tracing::info!(
            agent = agent_type,
            success = reflection.success,
            errors = reflection.errors.len(),
            "Reflection finished"
        );
        reflection
    }
}
