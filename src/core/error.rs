//! 引擎错误类型
//!
//! 按作用范围分层：ToolError / PlanError 针对单个工具调用或计划结构，
//! EngineError 只在整次运行必须中止时出现（计划结构错误、最终合成调用失败、配置错误）。

use thiserror::Error;

use crate::llm::LlmError;

/// 工具注册与参数校验错误（调用方可据此区分「请求非法」与「工具运行后报告问题」）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Duplicate tool: {0}")]
    DuplicateTool(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error(
        "Missing or unknown arguments for tool {tool}: missing [{}], unknown [{}]",
        .missing.join(", "),
        .unknown.join(", ")
    )]
    MissingOrUnknownArgument {
        tool: String,
        missing: Vec<String>,
        unknown: Vec<String>,
    },

    #[error("Invalid argument type for tool {tool}: [{}]", .keys.join(", "))]
    InvalidArgumentType { tool: String, keys: Vec<String> },
}

/// 计划结构错误：携带出错的步骤 id，便于定位
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Step {step} depends on undefined steps: [{}]", .missing.join(", "))]
    MissingDependency { step: String, missing: Vec<String> },

    #[error("Plan contains a cycle: [{}]", .ids.join(" -> "))]
    Cycle { ids: Vec<String> },
}

/// 中止整次运行的错误
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid plan: {0}")]
    InvalidPlan(#[from] PlanError),

    #[error("Synthesis failed: {0}")]
    Synthesis(LlmError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Tool registry error: {0}")]
    Tool(#[from] ToolError),
}
