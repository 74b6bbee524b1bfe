//! Plan Parser：从自由文本中尽力提取结构
//!
//! 候选顺序固定：```json 围栏中的数组 → 第一个括号配平的 `[...]` 子串 → 整段文本。
//! 每个候选独立尝试解析与转换，失败则换下一个；全部失败时 parse_plan 返回单个 Final 步骤，
//! 其 answer 为原文，保证调度器总能拿到非空、类型完整的计划。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::plan::{Step, Thought, ToolCall};

/// 回退计划中 Final 步骤的 id
pub const FALLBACK_STEP_ID: &str = "final";

fn fenced_array() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\[.*?\])\s*```").expect("valid fenced-array regex")
    })
}

fn first_object() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*\}").expect("valid object regex"))
}

/// 第一个 `[` 起、按括号深度配平的子串（忽略字符串字面量中的括号）
fn balanced_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 按固定顺序产出候选子串
fn candidates(text: &str) -> Vec<&str> {
    let mut out = Vec::with_capacity(3);
    if let Some(m) = fenced_array().captures(text).and_then(|c| c.get(1)) {
        out.push(m.as_str());
    }
    if let Some(s) = balanced_array(text) {
        out.push(s);
    }
    out.push(text.trim());
    out
}

/// 依次尝试每个候选，返回第一个能解析为 JSON 数组的值
pub fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    candidates(text)
        .into_iter()
        .find_map(|c| match serde_json::from_str::<Value>(c) {
            Ok(Value::Array(items)) => Some(items),
            _ => None,
        })
}

fn try_plan(candidate: &str) -> Option<Vec<Step>> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    if !value.as_array().is_some_and(|items| !items.is_empty()) {
        return None;
    }
    serde_json::from_value::<Vec<Step>>(value).ok()
}

/// 解析 DAG 计划；无法提取时返回单步回退计划
pub fn parse_plan(text: &str) -> Vec<Step> {
    if let Some(plan) = candidates(text).into_iter().find_map(try_plan) {
        return plan;
    }
    tracing::warn!("Could not extract valid plan, treating response as final answer");
    fallback_plan(text)
}

/// 单个 Final 步骤，answer 为原文
pub fn fallback_plan(answer: &str) -> Vec<Step> {
    vec![Step::final_answer(FALLBACK_STEP_ID, answer, Vec::new())]
}

pub(crate) fn short_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// 解析思维生成结果：[{thought, action?}]；跳过空 thought，丢弃格式错误的 action，最多保留 limit 个
pub fn parse_thoughts(
    text: &str,
    depth: usize,
    parent_id: Option<&str>,
    limit: usize,
) -> Vec<Thought> {
    let Some(items) = extract_json_array(text) else {
        tracing::warn!(depth, "No thought array found in generation output");
        return Vec::new();
    };

    let mut thoughts = Vec::new();
    for item in items {
        if thoughts.len() >= limit {
            break;
        }
        let content = item
            .get("thought")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or_default();
        if content.is_empty() {
            continue;
        }
        let action = match item.get("action") {
            None | Some(Value::Null) => None,
            Some(raw) => match serde_json::from_value::<ToolCall>(raw.clone()) {
                Ok(call) if !call.tool.trim().is_empty() => Some(call),
                _ => {
                    tracing::warn!(depth, action = %raw, "Dropping malformed thought action");
                    None
                }
            },
        };
        let index = thoughts.len();
        let mut thought = Thought::new(
            format!("thought_{}_{}_{}", depth, index, short_uuid()),
            content,
            depth,
            parent_id.map(String::from),
        );
        thought.action = action;
        thoughts.push(thought);
    }
    thoughts
}

/// score 字段可以是数字，也可以是数字字符串（"0.8"）
fn score_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// 解析评估分数：第一个 {...} 里的 score，否则整段当作数字；结果截断到 [0, 1]
pub fn parse_score(text: &str) -> Option<f64> {
    let from_object = first_object()
        .find_iter(text)
        .filter_map(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .find_map(|v| v.get("score").and_then(score_value));
    let score = from_object.or_else(|| text.trim().parse::<f64>().ok())?;
    score.is_finite().then(|| score.clamp(0.0, 1.0))
}
