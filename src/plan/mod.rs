//! 计划模型：Step / Thought 类型、文本解析、依赖图校验与线上 schema

pub mod graph;
pub mod parser;
pub mod schema;
pub mod types;

pub use graph::{missing_dependencies, validate_dag, validate_structure, PlanGraph};
pub use parser::{
    extract_json_array, fallback_plan, parse_plan, parse_score, parse_thoughts, FALLBACK_STEP_ID,
};
pub use schema::{plan_schema_json, thought_schema_json};
pub use types::{ExecutionResult, Step, StepId, StepKind, Thought, ToolCall, WireStep, WireThought};
