//! 编排器：规划 → 解析 → 调度 → 合成（→ 可选复盘）
//!
//! Orchestrator 持有唯一的 WorkerPool、只读的 ToolExecutor 与 LLM 客户端，
//! run_dag / run_tree 分别走 DAG 编译执行与思维树 beam search 两条路径。
//! 命令模式（CommandMode）贯穿规划、生成、评估与合成的 system prompt。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{EngineError, WorkerPool};
use crate::llm::{create_llm_from_config, LlmClient, SamplingParams};
use crate::plan::{fallback_plan, parse_plan, Step};
use crate::prompts::{self, CommandMode};
use crate::reflection::{AgentReflection, Reflector};
use crate::scheduler::{DagReport, DagScheduler, TreeConfig, TreeReport, TreeScheduler};
use crate::synthesis::Synthesizer;
use crate::tools::{builtin_registry, ToolExecutor, ToolRegistry};

/// DAG 运行结果：最终答案 + 计划与执行明细
#[derive(Debug, Clone)]
pub struct DagRun {
    pub answer: String,
    pub plan: Vec<Step>,
    pub report: DagReport,
}

/// 思维树运行结果
#[derive(Debug, Clone)]
pub struct TreeRun {
    pub answer: String,
    pub report: TreeReport,
}

pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    params: SamplingParams,
    mode: CommandMode,
    dag: DagScheduler,
    tree: TreeScheduler,
    synthesizer: Synthesizer,
    reflector: Reflector,
}

impl Orchestrator {
    /// 按配置创建 LLM 客户端与内置工具
    pub fn from_config(cfg: &AppConfig) -> Result<Self, EngineError> {
        let llm = create_llm_from_config(cfg);
        let registry = builtin_registry(&cfg.tools)?;
        Self::new(cfg, llm, registry)
    }

    /// 使用外部提供的 LLM 与工具注册表（测试与嵌入式调用）
    pub fn new(
        cfg: &AppConfig,
        llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
    ) -> Result<Self, EngineError> {
        let pool = WorkerPool::new(cfg.engine.max_concurrency);
        let executor = Arc::new(ToolExecutor::new(registry, cfg.tools.tool_timeout_secs));
        let params = cfg.llm.sampling();
        let mode = CommandMode::from_name(&cfg.engine.command);

        let dag = DagScheduler::new(executor.clone(), pool.clone())
            .with_strict_dependencies(cfg.engine.dag.strict_dependencies);
        let tree = TreeScheduler::new(
            llm.clone(),
            executor.clone(),
            pool.clone(),
            TreeConfig::from(&cfg.engine.tree),
            params.clone(),
        )?
        .with_command(mode);
        let synthesizer = Synthesizer::new(
            llm.clone(),
            params.clone(),
            cfg.engine.result_preview_chars,
            cfg.engine.tree.path_result_preview_chars,
        )
        .with_command(mode);
        let reflection_params = SamplingParams {
            max_tokens: cfg.engine.reflection.max_tokens,
            ..params.with_temperature(cfg.engine.reflection.temperature)
        };
        let reflector = Reflector::new(llm.clone(), reflection_params);
        tracing::info!(
            tools = ?executor.tool_names(),
            max_concurrency = pool.width(),
            command = mode.name(),
            "Orchestrator ready"
        );

        Ok(Self {
            llm,
            executor,
            params,
            mode,
            dag,
            tree,
            synthesizer,
            reflector,
        })
    }

    /// 覆盖配置中的命令模式
    pub fn with_command(mut self, mode: CommandMode) -> Self {
        self.mode = mode;
        self.tree = self.tree.with_command(mode);
        self.synthesizer = self.synthesizer.with_command(mode);
        self
    }

    pub fn command(&self) -> CommandMode {
        self.mode
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// 累计 token 使用：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 规划调用；失败时退化为携带错误信息的单步计划
    pub async fn plan(&self, goal: &str) -> Vec<Step> {
        let tool_specs = self.executor.registry().tool_specs();
        let messages = prompts::planning_messages(goal, self.mode, &tool_specs);
        match self.llm.complete(&messages, &self.params).await {
            Ok(text) => {
                let plan = parse_plan(&text);
                tracing::info!(steps = plan.len(), "Plan parsed");
                plan
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to get plan from LLM");
                fallback_plan(&format!("Error: Failed to get plan from LLM: {}", e))
            }
        }
    }

    pub async fn run_dag(&self, goal: &str) -> Result<DagRun, EngineError> {
        let plan = self.plan(goal).await;
        let report = self.dag.execute(&plan).await?;
        let answer = self
            .synthesizer
            .synthesize_dag(goal, &plan, &report.results)
            .await?;
        Ok(DagRun {
            answer,
            plan,
            report,
        })
    }

    pub async fn run_tree(&self, goal: &str) -> Result<TreeRun, EngineError> {
        let report = self.tree.search(goal).await?;
        let answer = self.synthesizer.synthesize_tree(goal, &report.paths).await?;
        Ok(TreeRun { answer, report })
    }

    /// 对一次 DAG 运行复盘；复盘失败体现在 AgentReflection 中，不返回错误
    pub async fn reflect_dag(&self, goal: &str, run: &DagRun) -> AgentReflection {
        self.reflector.reflect_dag(goal, run).await
    }

    pub async fn reflect_tree(&self, goal: &str, run: &TreeRun) -> AgentReflection {
        self.reflector.reflect_tree(goal, run, self.tree.config()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient, ScriptedLlmClient};
    use crate::tools::EchoTool;

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool::descriptor(4000)).unwrap();
        reg
    }

    #[tokio::test]
    async fn test_planning_failure_becomes_error_answer() {
        let llm = Arc::new(ScriptedLlmClient::new(|_, _| Err(LlmError::Timeout(30))));
        let orch = Orchestrator::new(&AppConfig::default(), llm.clone(), registry()).unwrap();
        let run = orch.run_dag("anything").await.unwrap();
        assert_eq!(
            run.answer,
            "Error: Failed to get plan from LLM: LLM request timed out after 30s"
        );
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_client_end_to_end() {
        let llm = Arc::new(MockLlmClient);
        let orch = Orchestrator::new(&AppConfig::default(), llm, registry()).unwrap();
        let run = orch.run_dag("hello").await.unwrap();
        assert_eq!(run.plan.len(), 2);
        let echo = run.report.results.get("echo").unwrap();
        assert!(echo.starts_with("Echo from Mock: hello"));
        assert_eq!(run.answer, "Mock answer: hello");
    }

    #[tokio::test]
    async fn test_mock_client_tree_end_to_end() {
        let llm = Arc::new(MockLlmClient);
        let orch = Orchestrator::new(&AppConfig::default(), llm, registry()).unwrap();
        let run = orch.run_tree("hello").await.unwrap();
        assert_eq!(run.report.levels.len(), 3);
        assert_eq!(run.report.paths.len(), 2);
        assert!(run.report.thoughts.iter().any(|t| t.result.as_deref() == Some("hello")));
        assert_eq!(run.answer, "Mock answer: hello");
    }

    #[tokio::test]
    async fn test_command_mode_reaches_planning_and_synthesis() {
        let llm = Arc::new(ScriptedLlmClient::new(|messages, _| {
            if messages[0].content.contains("Directed Acyclic Graph") {
                Ok(r#"[{"id": "a", "tool": "echo", "args": {"text": "x"}, "dependencies": []}]"#
                    .to_string())
            } else {
                Ok("patched".to_string())
            }
        }));
        let mut cfg = AppConfig::default();
        cfg.engine.command = "explain".to_string();
        let orch = Orchestrator::new(&cfg, llm.clone(), registry()).unwrap();
        assert_eq!(orch.command(), CommandMode::Explain);

        let orch = orch.with_command(CommandMode::Debug);
        orch.run_dag("why does it crash?").await.unwrap();
        let calls = llm.calls();
        assert_eq!(calls.len(), 2);
        let role = CommandMode::Debug.system_prompt();
        assert!(calls.iter().all(|c| c.messages[0].content.contains(role)));
    }

    #[tokio::test]
    async fn test_reflect_dag_after_run() {
        let llm = Arc::new(ScriptedLlmClient::new(|messages, _| {
            let system = messages[0].content.as_str();
            if system.contains("Directed Acyclic Graph") {
                Ok(r#"[{"id": "a", "tool": "echo", "args": {"text": "x"}, "dependencies": []},
                       {"id": "b", "tool": "ghost", "args": {}, "dependencies": []}]"#
                    .to_string())
            } else if system.contains("agent evaluator") {
                Ok(r#"{"success": false, "errors": ["used an unknown tool"]}"#.to_string())
            } else {
                Ok("x".to_string())
            }
        }));
        let orch = Orchestrator::new(&AppConfig::default(), llm.clone(), registry()).unwrap();
        let run = orch.run_dag("echo x").await.unwrap();
        let reflection = orch.reflect_dag("echo x", &run).await;

        assert!(!reflection.success);
        assert_eq!(reflection.errors, vec!["used an unknown tool".to_string()]);
        assert_eq!(reflection.summary["tools_used"], serde_json::json!(["echo", "ghost"]));
        assert_eq!(
            reflection.summary["errors_encountered"],
            serde_json::json!(["Error: Unknown tool: ghost"])
        );

        let calls = llm.calls();
        let last = calls.last().unwrap();
        assert_eq!(last.params.temperature, 0.3);
        assert_eq!(last.params.max_tokens, 2048);
    }

    #[tokio::test]
    async fn test_reflect_tree_uses_tree_config() {
        let llm = Arc::new(MockLlmClient);
        let mut cfg = AppConfig::default();
        cfg.engine.tree.max_depth = 1;
        let orch = Orchestrator::new(&cfg, llm, registry()).unwrap();
        let run = orch.run_tree("hi").await.unwrap();
        let reflection = orch.reflect_tree("hi", &run).await;
        assert!(reflection.success);
        assert_eq!(reflection.strengths, vec!["Mock run completed".to_string()]);
        assert_eq!(reflection.summary["max_depth"], 1);
        assert_eq!(reflection.summary["thoughts_explored"], 3);
        assert_eq!(reflection.summary["tools_executed"], 1);
    }

    #[test]
    fn test_invalid_tree_config_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.engine.tree.beam_width = 0;
        let llm = Arc::new(MockLlmClient);
        assert!(matches!(
            Orchestrator::new(&cfg, llm, registry()),
            Err(EngineError::Config(_))
        ));
    }
}
