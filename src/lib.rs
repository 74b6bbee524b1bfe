//! Arbor - Rust 任务编排引擎
//!
//! 模块划分：
//! - **agent**: Orchestrator（规划 → 解析 → 调度 → 合成）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类与有界工作池
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）
//! - **observability**: tracing 初始化
//! - **plan**: Step / Thought 类型、文本解析与 DAG 校验
//! - **prompts**: 命令模式与规划、生成、评估提示词
//! - **reflection**: 运行结束后的复盘（执行摘要 + 一次 LLM 评价）
//! - **scheduler**: DAG 轮次调度与思维树 beam search
//! - **synthesis**: 最终答案合成
//! - **tools**: 类型化工具注册表、执行器与内置工具

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod plan;
pub mod prompts;
pub mod reflection;
pub mod scheduler;
pub mod synthesis;
pub mod tools;

pub use agent::{DagRun, Orchestrator, TreeRun};
pub use reflection::AgentReflection;
