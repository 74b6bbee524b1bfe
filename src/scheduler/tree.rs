//! 思维树调度器：逐层 beam search
//!
//! 第 d 层：对上一层保留的每个思维（d=0 时为空上下文）生成 branching_factor 个候选；
//! 每个候选并发地打分，并在带 action 时执行工具；全部记录进 ThoughtTree 后按分数降序
//! 稳定排序，保留前 beam_width 个进入下一层。生成调用失败时以占位思维代替。

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;

use crate::config::TreeSection;
use crate::core::{EngineError, WorkerPool};
use crate::llm::{LlmClient, SamplingParams};
use crate::plan::{parse_score, parse_thoughts, parser::short_uuid, Thought};
use crate::prompts::{self, CommandMode, PathContext};
use crate::tools::ToolExecutor;

/// 打分失败或占位思维使用的中性分数
pub const NEUTRAL_SCORE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub branching_factor: usize,
    pub beam_width: usize,
    pub generation_temperature: f32,
    pub evaluation_temperature: f32,
}

impl TreeConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, value) in [
            ("max_depth", self.max_depth),
            ("branching_factor", self.branching_factor),
            ("beam_width", self.beam_width),
        ] {
            if value < 1 {
                return Err(EngineError::Config(format!(
                    "{} must be >= 1, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

impl From<&TreeSection> for TreeConfig {
    fn from(s: &TreeSection) -> Self {
        Self {
            max_depth: s.max_depth,
            branching_factor: s.branching_factor,
            beam_width: s.beam_width,
            generation_temperature: s.generation_temperature,
            evaluation_temperature: s.evaluation_temperature,
        }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::from(&TreeSection::default())
    }
}

/// 扁平索引：id -> Thought，外加生成顺序
#[derive(Debug, Clone, Default)]
pub struct ThoughtTree {
    nodes: HashMap<String, Thought>,
    order: Vec<String>,
}

impl ThoughtTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, thought: Thought) {
        let id = thought.id.clone();
        if self.nodes.insert(id.clone(), thought).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Thought> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 按生成顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &Thought> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// 根到该节点的路径（含该节点）；id 不存在时为空
    pub fn path_to(&self, id: &str) -> Vec<&Thought> {
        let mut path = Vec::new();
        let mut cursor = self.nodes.get(id);
        while let Some(node) = cursor {
            path.push(node);
            if path.len() > self.nodes.len() {
                break;
            }
            cursor = node.parent_id.as_deref().and_then(|p| self.nodes.get(p));
        }
        path.reverse();
        path
    }

    fn context_for(&self, id: &str) -> PathContext {
        self.path_to(id)
            .into_iter()
            .map(|t| (t.id.clone(), t.content.clone()))
            .collect()
    }
}

/// 每一层的统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSummary {
    pub depth: usize,
    pub generated: usize,
    /// 保留进入下一层的思维 id（按分数降序）
    pub retained: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStep {
    pub content: String,
    pub result: Option<String>,
}

/// 从根到某个 frontier 思维的路径
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThoughtPath {
    pub thought_id: String,
    pub score: f64,
    pub steps: Vec<PathStep>,
}

#[derive(Debug, Clone, Default)]
pub struct TreeReport {
    /// 全部生成的思维（生成顺序），包括落选者
    pub thoughts: Vec<Thought>,
    /// 最后保留的思维（按分数降序）
    pub frontier: Vec<Thought>,
    pub levels: Vec<LevelSummary>,
    pub paths: Vec<ThoughtPath>,
}

pub struct TreeScheduler {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    pool: WorkerPool,
    config: TreeConfig,
    params: SamplingParams,
    mode: CommandMode,
}

impl TreeScheduler {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<ToolExecutor>,
        pool: WorkerPool,
        config: TreeConfig,
        params: SamplingParams,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            llm,
            executor,
            pool,
            config,
            params,
            mode: CommandMode::default(),
        })
    }

    pub fn with_command(mut self, mode: CommandMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub async fn search(&self, goal: &str) -> Result<TreeReport, EngineError> {
        self.config.validate()?;
        let tool_specs = self.executor.registry().tool_specs();
        let mut tree = ThoughtTree::new();
        let mut frontier: Vec<String> = Vec::new();
        let mut levels = Vec::new();

        for depth in 0..self.config.max_depth {
            let parents: Vec<Option<String>> = if depth == 0 {
                vec![None]
            } else {
                frontier.iter().cloned().map(Some).collect()
            };
            tracing::info!(depth, parents = parents.len(), "Expanding thought level");

            let generations = parents.into_iter().map(|parent| {
                let context = parent
                    .as_deref()
                    .map(|p| tree.context_for(p))
                    .unwrap_or_default();
                let specs = tool_specs.as_str();
                async move {
                    self.pool
                        .run(self.generate(goal, &context, depth, parent.as_deref(), specs))
                        .await
                }
            });
            let candidates: Vec<Thought> = join_all(generations)
                .await
                .into_iter()
                .flatten()
                .collect();

            if candidates.is_empty() {
                tracing::warn!(depth, "No thoughts generated at this depth, stopping search");
                break;
            }

            let expansions = candidates.into_iter().map(|thought| {
                let context = thought
                    .parent_id
                    .as_deref()
                    .map(|p| tree.context_for(p))
                    .unwrap_or_default();
                async move { self.expand(goal, context, thought).await }
            });
            let mut level: Vec<Thought> = join_all(expansions).await;

            for thought in &level {
                tree.insert(thought.clone());
            }
            let generated = level.len();
            // sort_by 稳定：同分时先生成者在前
            level.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
            level.truncate(self.config.beam_width);
            frontier = level.into_iter().map(|t| t.id).collect();

            tracing::info!(depth, generated, retained = frontier.len(), "Thought level finished");
            levels.push(LevelSummary {
                depth,
                generated,
                retained: frontier.clone(),
            });
        }

        let paths = frontier
            .iter()
            .filter_map(|id| tree.get(id))
            .map(|t| ThoughtPath {
                thought_id: t.id.clone(),
                score: t.score,
                steps: tree
                    .path_to(&t.id)
                    .into_iter()
                    .map(|n| PathStep {
                        content: n.content.clone(),
                        result: n.result.clone(),
                    })
                    .collect(),
            })
            .collect();

        Ok(TreeReport {
            thoughts: tree.iter().cloned().collect(),
            frontier: frontier.iter().filter_map(|id| tree.get(id)).cloned().collect(),
            levels,
            paths,
        })
    }

    /// 一次生成调用；失败时返回 branching_factor 个占位思维
    async fn generate(
        &self,
        goal: &str,
        context: &PathContext,
        depth: usize,
        parent_id: Option<&str>,
        tool_specs: &str,
    ) -> Vec<Thought> {
        let bf = self.config.branching_factor;
        let messages = prompts::generation_messages(goal, context, bf, self.mode, tool_specs);
        let params = self.params.with_temperature(self.config.generation_temperature);
        match self.llm.complete(&messages, &params).await {
            Ok(text) => parse_thoughts(&text, depth, parent_id, bf),
            Err(e) => {
                tracing::warn!(depth, error = %e, "Thought generation failed, using placeholders");
                (0..bf)
                    .map(|i| {
                        let mut t = Thought::new(
                            format!("fallback_{}_{}_{}", depth, i, short_uuid()),
                            format!("Fallback approach {} for depth {}", i + 1, depth),
                            depth,
                            parent_id.map(String::from),
                        );
                        t.score = NEUTRAL_SCORE;
                        t.placeholder = true;
                        t
                    })
                    .collect()
            }
        }
    }

    /// 打分与工具执行各占一个许可，二者并发
    async fn expand(&self, goal: &str, context: PathContext, mut thought: Thought) -> Thought {
        if thought.placeholder {
            return thought;
        }
        let evaluation = self.pool.run(self.evaluate(goal, &context, &thought.content));
        let action = async {
            match &thought.action {
                Some(call) => {
                    let run = self.executor.run(&call.tool, call.args.clone());
                    Some(self.pool.run(run).await)
                }
                None => None,
            }
        };
        let (score, result) = tokio::join!(evaluation, action);
        thought.score = score;
        thought.result = result;
        thought
    }

    async fn evaluate(&self, goal: &str, context: &PathContext, content: &str) -> f64 {
        let messages = prompts::evaluation_messages(goal, context, content, self.mode);
        let params = self.params.with_temperature(self.config.evaluation_temperature);
        match self.llm.complete(&messages, &params).await {
            Ok(text) => parse_score(&text).unwrap_or_else(|| {
                tracing::warn!(response = %text, "Could not parse thought score");
                NEUTRAL_SCORE
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Thought evaluation failed");
                NEUTRAL_SCORE
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, Message, ScriptedLlmClient};
    use crate::tools::{EchoTool, ToolRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn executor() -> Arc<ToolExecutor> {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool::descriptor(4000)).unwrap();
        Arc::new(ToolExecutor::new(reg, 5))
    }

    fn config(max_depth: usize, branching_factor: usize, beam_width: usize) -> TreeConfig {
        TreeConfig {
            max_depth,
            branching_factor,
            beam_width,
            ..TreeConfig::default()
        }
    }

    fn is_evaluation(messages: &[Message]) -> bool {
        messages
            .last()
            .map(|m| m.content.contains("Evaluate this thought"))
            .unwrap_or(false)
    }

    /// 生成三个思维 "idea N"，分数取自 idea 编号（idea 2 最高）
    fn scripted() -> Arc<ScriptedLlmClient> {
        Arc::new(ScriptedLlmClient::new(|messages, _| {
            if is_evaluation(messages) {
                let user = &messages[1].content;
                let score = if user.contains("Thought: idea 2") { 0.9 } else { 0.6 };
                return Ok(format!(r#"{{"score": {}}}"#, score));
            }
            Ok(r#"[
                {"thought": "idea 1", "action": {"tool": "echo", "args": {"text": "r1"}}},
                {"thought": "idea 2"},
                {"thought": "idea 3"}
            ]"#
            .to_string())
        }))
    }

    fn scheduler(llm: Arc<dyn LlmClient>, cfg: TreeConfig) -> TreeScheduler {
        TreeScheduler::new(llm, executor(), WorkerPool::new(4), cfg, SamplingParams::default())
            .unwrap()
    }

    #[tokio::test]
    async fn test_beam_keeps_top_scored() {
        let report = scheduler(scripted(), config(2, 3, 2)).search("goal").await.unwrap();
        assert_eq!(report.levels.len(), 2);
        assert_eq!(report.levels[0].generated, 3);
        // 第二层：2 个父节点 × 3
        assert_eq!(report.levels[1].generated, 6);
        assert_eq!(report.thoughts.len(), 9);

        for level in &report.levels {
            assert_eq!(level.retained.len(), 2.min(level.generated));
            let at_depth: Vec<&Thought> =
                report.thoughts.iter().filter(|t| t.depth == level.depth).collect();
            let min_kept = level
                .retained
                .iter()
                .filter_map(|id| at_depth.iter().find(|t| &t.id == id))
                .map(|t| t.score)
                .fold(f64::INFINITY, f64::min);
            for t in at_depth.iter().filter(|t| !level.retained.contains(&t.id)) {
                assert!(t.score <= min_kept);
            }
        }

        // 同分 0.6 时 idea 1 先生成，因此在 idea 3 之前
        let first = &report.levels[0].retained;
        let content = |id: &String| {
            let thought = report.thoughts.iter().find(|t| &t.id == id).unwrap();
            thought.content.clone()
        };
        assert_eq!(content(&first[0]), "idea 2");
        assert_eq!(content(&first[1]), "idea 1");

        let idea1 = report.thoughts.iter().find(|t| t.depth == 0 && t.content == "idea 1").unwrap();
        assert_eq!(idea1.result.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_single_beam_path_length() {
        let report = scheduler(scripted(), config(2, 3, 1)).search("goal").await.unwrap();
        assert!(report.levels.iter().all(|l| l.retained.len() == 1));
        assert_eq!(report.frontier.len(), 1);
        assert_eq!(report.paths.len(), 1);
        assert_eq!(report.paths[0].steps.len(), 2);
        assert_eq!(report.paths[0].steps[0].content, "idea 2");
        assert_eq!(report.frontier[0].depth, 1);
    }

    #[tokio::test]
    async fn test_generation_failure_uses_placeholders() {
        let evaluations = Arc::new(AtomicUsize::new(0));
        let counter = evaluations.clone();
        let llm = Arc::new(ScriptedLlmClient::new(move |messages, _| {
            if is_evaluation(messages) {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
                return Ok(r#"{"score": 0.1}"#.to_string());
            }
            Err(LlmError::Timeout(30))
        }));
        let report = scheduler(llm, config(2, 2, 1)).search("goal").await.unwrap();
        assert_eq!(report.thoughts.len(), 4);
        assert!(report.thoughts.iter().all(|t| t.placeholder && t.score == NEUTRAL_SCORE));
        assert!(report.thoughts[0].id.starts_with("fallback_0_0_"));
        assert_eq!(evaluations.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(report.paths[0].steps.len(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_generation_stops_early() {
        let llm = Arc::new(ScriptedLlmClient::fixed("I have no ideas."));
        let report = scheduler(llm.clone(), config(3, 3, 2)).search("goal").await.unwrap();
        assert!(report.levels.is_empty());
        assert!(report.frontier.is_empty());
        assert!(report.paths.is_empty());
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_evaluation_scores_neutral() {
        let llm = Arc::new(ScriptedLlmClient::new(|messages, _| {
            if is_evaluation(messages) {
                return Err(LlmError::Upstream("overloaded".into()));
            }
            Ok(r#"[{"thought": "only one"}]"#.to_string())
        }));
        let report = scheduler(llm, config(1, 3, 2)).search("goal").await.unwrap();
        assert_eq!(report.thoughts.len(), 1);
        assert_eq!(report.thoughts[0].score, NEUTRAL_SCORE);
        assert!(!report.thoughts[0].placeholder);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = TreeScheduler::new(
            Arc::new(ScriptedLlmClient::fixed("")),
            executor(),
            WorkerPool::default(),
            config(1, 0, 1),
            SamplingParams::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, EngineError::Config(msg) if msg.contains("branching_factor")));
    }

    #[test]
    fn test_path_to_walks_parents() {
        let mut tree = ThoughtTree::new();
        tree.insert(Thought::new("a", "root", 0, None));
        tree.insert(Thought::new("b", "child", 1, Some("a".into())));
        tree.insert(Thought::new("c", "grandchild", 2, Some("b".into())));
        let ids: Vec<&str> = tree.path_to("c").iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(tree.path_to("zzz").is_empty());
    }
}
