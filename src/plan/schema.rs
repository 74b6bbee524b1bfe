//! 线上格式的 JSON Schema，嵌入提示词让 LLM 按结构输出

use schemars::schema_for;

use crate::plan::{WireStep, WireThought};

/// 计划数组的 schema：`[WireStep, ...]`
pub fn plan_schema_json() -> String {
    let schema = schema_for!(Vec<WireStep>);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}

/// 思维生成数组的 schema：`[WireThought, ...]`
pub fn thought_schema_json() -> String {
    let schema = schema_for!(Vec<WireThought>);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_name_wire_fields() {
        let plan = plan_schema_json();
        assert!(plan.contains("dependencies"));
        assert!(plan.contains("answer"));
        let thought = thought_schema_json();
        assert!(thought.contains("thought"));
        assert!(thought.contains("tool"));
    }
}
