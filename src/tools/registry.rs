//! 工具注册表
//!
//! 每个工具由 ToolDescriptor 描述：名称、必填参数、默认参数、参数类型与 handler。
//! ToolRegistry::dispatch 先合并默认值、校验缺失/未声明参数与类型，再调用 handler；
//! 校验失败以 ToolError 返回，handler 的失败（含 panic）一律转为描述性字符串结果。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::{Map, Value};

use crate::core::ToolError;

/// 工具参数（JSON 对象）
pub type Args = Map<String, Value>;

/// 参数期望类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    String,
    Integer,
    /// 整数或浮点数
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl ArgType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ArgType::String => value.is_string(),
            ArgType::Integer => value.is_i64() || value.is_u64(),
            ArgType::Number => value.is_number(),
            ArgType::Boolean => value.is_boolean(),
            ArgType::Array => value.is_array(),
            ArgType::Object => value.is_object(),
            ArgType::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArgType::String => "string",
            ArgType::Integer => "integer",
            ArgType::Number => "number",
            ArgType::Boolean => "boolean",
            ArgType::Array => "array",
            ArgType::Object => "object",
            ArgType::Any => "any",
        }
    }
}

/// 参数声明：类型 + 是否可为 null（可空参数缺省时按 null 传入 handler）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub ty: ArgType,
    pub nullable: bool,
}

impl ArgSpec {
    pub fn of(ty: ArgType) -> Self {
        Self {
            ty,
            nullable: false,
        }
    }

    pub fn nullable(ty: ArgType) -> Self {
        Self { ty, nullable: true }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        (value.is_null() && self.nullable) || self.ty.matches(value)
    }

    fn type_label(&self) -> String {
        if self.nullable {
            format!("{}|null", self.ty.as_str())
        } else {
            self.ty.as_str().to_string()
        }
    }
}

/// 工具 handler：参数已通过校验；普通领域错误应返回 Err(描述) 而非 panic
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Args) -> Result<String, String>;
}

/// 将同步闭包包装为 ToolHandler
pub struct FnHandler<F>(F);

pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(Args) -> Result<String, String> + Send + Sync,
{
    FnHandler(f)
}

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(Args) -> Result<String, String> + Send + Sync,
{
    async fn call(&self, args: Args) -> Result<String, String> {
        (self.0)(args)
    }
}

/// 工具描述：required_args 始终是 arg_types 键集的子集（由构建方法保证）
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    required_args: BTreeSet<String>,
    default_args: Args,
    arg_types: BTreeMap<String, ArgSpec>,
    handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self::with_handler(name, description, Arc::new(handler))
    }

    pub fn with_handler(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required_args: BTreeSet::new(),
            default_args: Args::new(),
            arg_types: BTreeMap::new(),
            handler,
        }
    }

    /// 声明必填参数
    pub fn required(mut self, name: impl Into<String>, ty: ArgType) -> Self {
        let name = name.into();
        self.arg_types.insert(name.clone(), ArgSpec::of(ty));
        self.required_args.insert(name);
        self
    }

    /// 声明可选参数（无默认值）
    pub fn optional(mut self, name: impl Into<String>, spec: ArgSpec) -> Self {
        self.arg_types.insert(name.into(), spec);
        self
    }

    /// 声明带默认值的可选参数
    pub fn with_default(mut self, name: impl Into<String>, spec: ArgSpec, default: Value) -> Self {
        let name = name.into();
        self.arg_types.insert(name.clone(), spec);
        self.default_args.insert(name, default);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn required_args(&self) -> &BTreeSet<String> {
        &self.required_args
    }

    pub fn default_args(&self) -> &Args {
        &self.default_args
    }

    pub fn arg_types(&self) -> &BTreeMap<String, ArgSpec> {
        &self.arg_types
    }

    /// 合并默认值并校验：缺失/未声明参数一并报告，其次检查类型
    pub fn validate(&self, args: Args) -> Result<Args, ToolError> {
        let mut merged = self.default_args.clone();
        merged.extend(args);

        let missing: Vec<String> = self
            .required_args
            .iter()
            .filter(|k| !merged.contains_key(k.as_str()))
            .cloned()
            .collect();
        let mut unknown: Vec<String> = merged
            .keys()
            .filter(|k| !self.arg_types.contains_key(k.as_str()))
            .cloned()
            .collect();
        unknown.sort();
        if !missing.is_empty() || !unknown.is_empty() {
            return Err(ToolError::MissingOrUnknownArgument {
                tool: self.name.clone(),
                missing,
                unknown,
            });
        }

        for (key, spec) in &self.arg_types {
            if spec.nullable && !merged.contains_key(key) {
                merged.insert(key.clone(), Value::Null);
            }
        }

        let mut keys: Vec<String> = merged
            .iter()
            .filter(|(k, v)| {
                self.arg_types
                    .get(k.as_str())
                    .map(|spec| !spec.accepts(v))
                    .unwrap_or(false)
            })
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        if !keys.is_empty() {
            return Err(ToolError::InvalidArgumentType {
                tool: self.name.clone(),
                keys,
            });
        }

        Ok(merged)
    }

    /// 参数说明（用于 prompt）：{"path_str": "string (required)", "max_chars": "integer (default: 4000)"}
    pub fn args_summary(&self) -> Value {
        let summary: Map<String, Value> = self
            .arg_types
            .iter()
            .map(|(name, spec)| {
                let label = if self.required_args.contains(name) {
                    format!("{} (required)", spec.type_label())
                } else if let Some(default) = self.default_args.get(name) {
                    format!("{} (default: {})", spec.type_label(), default)
                } else {
                    format!("{} (optional)", spec.type_label())
                };
                (name.clone(), Value::String(label))
            })
            .collect();
        Value::Object(summary)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 工具注册表：构建后只读，可在并发调用间共享（&ToolRegistry / Arc）
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

/// 通过校验后一次 handler 调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DispatchOutcome {
    Completed(String),
    HandlerFailed(String),
    Panicked(String),
}

impl DispatchOutcome {
    pub(crate) fn is_completed(&self) -> bool {
        matches!(self, DispatchOutcome::Completed(_))
    }

    /// 审计日志中的 outcome 字段
    pub(crate) fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Completed(_) => "ok",
            DispatchOutcome::HandlerFailed(_) => "handler_error",
            DispatchOutcome::Panicked(_) => "panic",
        }
    }

    /// 折叠为步骤结果文本
    pub(crate) fn into_content(self, name: &str) -> String {
        match self {
            DispatchOutcome::Completed(content) => content,
            DispatchOutcome::HandlerFailed(e) => format!("Error executing {}: {}", name, e),
            DispatchOutcome::Panicked(msg) => {
                format!("Error executing {}: handler panicked: {}", name, msg)
            }
        }
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), ToolError> {
        if self.tools.contains_key(descriptor.name()) {
            return Err(ToolError::DuplicateTool(descriptor.name().to_string()));
        }
        self.tools.insert(descriptor.name().to_string(), descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 校验参数后调用 handler；只有三类校验失败以 Err 返回
    pub async fn dispatch(&self, name: &str, args: Args) -> Result<String, ToolError> {
        self.dispatch_outcome(name, args)
            .await
            .map(|outcome| outcome.into_content(name))
    }

    /// 与 dispatch 相同，但保留 handler 报错 / panic 的区分，供审计日志使用
    pub(crate) async fn dispatch_outcome(
        &self,
        name: &str,
        args: Args,
    ) -> Result<DispatchOutcome, ToolError> {
        let descriptor = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let merged = descriptor.validate(args)?;

        let outcome = AssertUnwindSafe(descriptor.handler.call(merged))
            .catch_unwind()
            .await;
        Ok(match outcome {
            Ok(Ok(content)) => DispatchOutcome::Completed(content),
            Ok(Err(e)) => DispatchOutcome::HandlerFailed(e),
            Err(payload) => DispatchOutcome::Panicked(panic_message(payload.as_ref())),
        })
    }

    /// 按名称排序
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 生成 prompt 中的 Available Tools 段落：每行 " - name: description | args: {...}"
    pub fn tool_specs(&self) -> String {
        self.tool_names()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| format!(" - {}: {} | args: {}", t.name(), t.description(), t.args_summary()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
