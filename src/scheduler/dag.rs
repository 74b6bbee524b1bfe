//! DAG 调度器：按轮次分层执行
//!
//! 每一轮计算 ready 集合（依赖全部完成的未完成步骤），通过共享 WorkerPool 并发执行，
//! 整轮结束后才进入下一轮。ready 为空但仍有未完成步骤时停止，剩余步骤记为 Unreachable；
//! 轮数上限为 2 × 步骤数。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::{EngineError, WorkerPool};
use crate::plan::{
    missing_dependencies, validate_dag, validate_structure, ExecutionResult, PlanGraph, Step,
    StepKind,
};
use crate::tools::ToolExecutor;

/// 一次 DAG 执行的结果
#[derive(Debug, Clone, Default)]
pub struct DagReport {
    /// 每个步骤的结果文本（包括 Unreachable 的错误文本）
    pub results: ExecutionResult,
    /// 每一轮执行的步骤 id（按计划顺序）
    pub rounds: Vec<Vec<String>>,
    /// 未能执行的步骤 id
    pub unreachable: Vec<String>,
}

pub struct DagScheduler {
    executor: Arc<ToolExecutor>,
    pool: WorkerPool,
    strict_dependencies: bool,
}

impl DagScheduler {
    pub fn new(executor: Arc<ToolExecutor>, pool: WorkerPool) -> Self {
        Self {
            executor,
            pool,
            strict_dependencies: false,
        }
    }

    /// 为 true 时未定义依赖直接视为非法计划
    pub fn with_strict_dependencies(mut self, strict: bool) -> Self {
        self.strict_dependencies = strict;
        self
    }

    pub async fn execute(&self, plan: &[Step]) -> Result<DagReport, EngineError> {
        if self.strict_dependencies {
            validate_dag(plan)?;
        } else {
            validate_structure(plan)?;
            for (step, missing) in missing_dependencies(plan) {
                tracing::warn!(
                    step = %step,
                    missing = ?missing,
                    "Step depends on undefined steps, it will not run"
                );
            }
        }
        tracing::info!(steps = plan.len(), "Plan validated, starting DAG execution");

        let steps: HashMap<&str, &Step> = plan.iter().map(|s| (s.id.as_str(), s)).collect();
        let graph = PlanGraph::new(plan);
        let mut completed: HashSet<String> = HashSet::new();
        let mut report = DagReport::default();
        let max_rounds = 2 * graph.len();

        for round in 1..=max_rounds {
            if completed.len() == graph.len() {
                break;
            }
            let ready = graph.ready_steps(&completed);
            if ready.is_empty() {
                tracing::warn!(
                    round,
                    remaining = ?graph.remaining(&completed),
                    "No ready steps but plan is incomplete, stopping"
                );
                break;
            }
            tracing::info!(round, ready = ?ready, "Executing DAG round");

            let units = ready
                .iter()
                .filter_map(|id| steps.get(id.as_str()).copied())
                .map(|step| {
                    let executor = self.executor.clone();
                    async move {
                        let result = match &step.kind {
                            StepKind::Final { answer } => answer.clone(),
                            StepKind::Tool(call) => {
                                executor.run(&call.tool, call.args.clone()).await
                            }
                        };
                        (step.id.clone(), result)
                    }
                });
            let outcomes = self.pool.run_all(units).await;

            for (id, result) in outcomes {
                report.results.insert(id.clone(), result);
                completed.insert(id);
            }
            report.rounds.push(ready);
        }

        for id in graph.remaining(&completed) {
            let mut unmet: Vec<&String> = graph
                .dependencies_of(&id)
                .map(|deps| deps.iter().filter(|d| !completed.contains(*d)).collect())
                .unwrap_or_default();
            unmet.sort();
            let unmet: Vec<&str> = unmet.into_iter().map(String::as_str).collect();
            report.results.insert(
                id.clone(),
                format!(
                    "Error: Step {} was not executed (dependencies not satisfied: {})",
                    id,
                    unmet.join(", ")
                ),
            );
            report.unreachable.push(id);
        }
        if !report.unreachable.is_empty() {
            tracing::warn!(unreachable = ?report.unreachable, "Some steps were unreachable");
        }
        tracing::info!(
            rounds = report.rounds.len(),
            completed = completed.len(),
            "DAG execution finished"
        );
        Ok(report)
    }
}
