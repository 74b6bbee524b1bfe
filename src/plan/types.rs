//! 计划与思维节点类型
//!
//! Step 是 DAG 计划节点，Thought 是思维树节点。线上格式（WireStep）字段可选、结构不可信，
//! 转换为 Step 时收敛为 Tool / Final 两种形态，调度时穷尽匹配即可。

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::Args;

pub type StepId = String;

/// 一次工具调用：{"tool": "...", "args": {...}}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolCall {
    /// 已注册的工具名，如 read_file、shell、echo
    pub tool: String,
    /// 工具参数
    #[serde(default)]
    pub args: Args,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Tool(ToolCall),
    Final { answer: String },
}

/// DAG 计划节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireStep", try_from = "WireStep")]
pub struct Step {
    pub id: StepId,
    pub dependencies: Vec<StepId>,
    pub kind: StepKind,
}

impl Step {
    pub fn tool(
        id: impl Into<StepId>,
        tool: impl Into<String>,
        args: Args,
        dependencies: Vec<StepId>,
    ) -> Self {
        Self {
            id: id.into(),
            dependencies,
            kind: StepKind::Tool(ToolCall {
                tool: tool.into(),
                args,
            }),
        }
    }

    pub fn final_answer(
        id: impl Into<StepId>,
        answer: impl Into<String>,
        dependencies: Vec<StepId>,
    ) -> Self {
        Self {
            id: id.into(),
            dependencies,
            kind: StepKind::Final {
                answer: answer.into(),
            },
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, StepKind::Final { .. })
    }

    pub fn tool_name(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Tool(call) => Some(&call.tool),
            StepKind::Final { .. } => None,
        }
    }

    pub fn answer(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Final { answer } => Some(answer),
            StepKind::Tool(_) => None,
        }
    }
}

/// 计划步骤的线上格式：工具步骤 {id, tool, args, dependencies}，
/// 最终步骤 {id, action: "final", answer, dependencies}
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WireStep {
    /// 步骤唯一 id
    pub id: String,
    /// 工具名（工具步骤）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// 固定为 "final"（最终步骤）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// 工具参数
    #[serde(default, skip_serializing_if = "Args::is_empty")]
    pub args: Args,
    /// 最终答案（最终步骤）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// 必须先完成的步骤 id
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl TryFrom<WireStep> for Step {
    type Error = String;

    fn try_from(wire: WireStep) -> Result<Self, Self::Error> {
        if wire.id.trim().is_empty() {
            return Err("step without id".to_string());
        }
        if wire.action.as_deref() == Some("final") {
            return Ok(Step::final_answer(
                wire.id,
                wire.answer.unwrap_or_default(),
                wire.dependencies,
            ));
        }
        match wire.tool {
            Some(tool) if !tool.trim().is_empty() => {
                Ok(Step::tool(wire.id, tool, wire.args, wire.dependencies))
            }
            _ => Err(format!("step {} has neither a tool nor a final action", wire.id)),
        }
    }
}

impl From<Step> for WireStep {
    fn from(step: Step) -> Self {
        match step.kind {
            StepKind::Tool(call) => WireStep {
                id: step.id,
                tool: Some(call.tool),
                action: None,
                args: call.args,
                answer: None,
                dependencies: step.dependencies,
            },
            StepKind::Final { answer } => WireStep {
                id: step.id,
                tool: None,
                action: Some("final".to_string()),
                args: Args::new(),
                answer: Some(answer),
                dependencies: step.dependencies,
            },
        }
    }
}

/// 思维生成的线上格式：{"thought": "...", "action": {"tool": "...", "args": {...}}}
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WireThought {
    /// 这一步的思路描述
    pub thought: String,
    /// 可选的工具调用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ToolCall>,
}

/// 思维树节点：parent_id 只是查找用的回指，节点本身归 ThoughtTree 的扁平索引所有
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thought {
    pub id: String,
    pub parent_id: Option<String>,
    pub depth: usize,
    pub content: String,
    /// [0, 1]，评估前为 0
    pub score: f64,
    pub action: Option<ToolCall>,
    /// 仅当 action 存在且已执行时有值
    pub result: Option<String>,
    /// 生成调用失败时的占位节点
    pub placeholder: bool,
}

impl Thought {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        depth: usize,
        parent_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id,
            depth,
            content: content.into(),
            score: 0.0,
            action: None,
            result: None,
            placeholder: false,
        }
    }
}

/// 执行结果：step/thought id -> 结果文本（失败也是文本），同时保留写入顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    results: HashMap<StepId, String>,
    order: Vec<StepId>,
}

impl ExecutionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<StepId>, result: impl Into<String>) {
        let id = id.into();
        if self.results.insert(id.clone(), result.into()).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.results.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.results.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// 结果被记录的先后顺序
    pub fn order(&self) -> &[StepId] {
        &self.order
    }

    /// 按记录顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .filter_map(|id| self.results.get(id).map(|r| (id.as_str(), r.as_str())))
    }

    pub fn into_map(self) -> HashMap<StepId, String> {
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_round_trip_for_both_kinds() {
        let steps: Vec<Step> = serde_json::from_value(json!([
            {"id": "a", "tool": "echo", "args": {"text": "x"}, "dependencies": []},
            {"id": "final", "action": "final", "answer": "done", "dependencies": ["a"]}
        ]))
        .unwrap();
        assert_eq!(steps[0].tool_name(), Some("echo"));
        assert_eq!(steps[1].answer(), Some("done"));

        let back = serde_json::to_value(&steps).unwrap();
        assert_eq!(back[1]["action"], "final");
        assert!(back[1].get("tool").is_none());
    }

    #[test]
    fn test_step_without_tool_or_action_is_rejected() {
        let r: Result<Step, _> = serde_json::from_value(json!({"id": "x", "dependencies": []}));
        assert!(r.is_err());
    }

    #[test]
    fn test_execution_result_keeps_first_insert_order() {
        let mut r = ExecutionResult::new();
        r.insert("b", "1");
        r.insert("a", "2");
        r.insert("b", "3");
        assert_eq!(r.order(), &["b".to_string(), "a".to_string()]);
        assert_eq!(r.get("b"), Some("3"));
    }
}
