//! 提示词模板
//!
//! 规划（DAG 编译）、思维生成、思维评估三类调用的 system / user 文本。
//! 工具列表来自 ToolRegistry::tool_specs，输出格式来自 plan::schema。
//! 每类 system prompt 都嵌入当前 CommandMode 的角色说明，合成调用同样使用。

use crate::llm::Message;
use crate::plan::{plan_schema_json, thought_schema_json};

/// 思维树历史：(thought id, 内容)，根在前
pub type PathContext = Vec<(String, String)>;

const GENERAL_PROMPT: &str = "You are a concise and reliable command-line assistant that answers questions and gives code snippets.
Requirements:
- Put code in a fenced block with the right language.
- Keep explanations short and highlight the key steps.
- State your assumptions when unsure, never invent paths or files.";

const EXPLAIN_PROMPT: &str = "You are a code explanation assistant. Explain the given code or concept in short points.
Requirements:
- Give 2-4 key points first, then the important caveats.
- Quote line numbers or snippets when the input contains code, do not make things up.
- If information is missing, state your assumptions and list what else is needed.";

const GENERATE_PROMPT: &str = "You are a code generation assistant that prefers minimal examples which run as is.
Requirements:
- Give the complete function or script in a code block.
- Briefly explain the design trade-offs and complexity.
- List external dependencies explicitly.";

const DEBUG_PROMPT: &str = "You are a debugging assistant. Locate the problem first, then propose a patch.
Requirements:
- List the likely bug sites, then give the modified code block.
- If context is missing, say what extra information is needed.
- Prefer the smallest change and keep the existing style.";

const FIX_PROMPT: &str = "You are a code repair assistant. Locate the problem first, then propose a patch.
Requirements:
- List the likely bug sites, then give the modified code block.
- If context is missing, say what extra information is needed.
- Prefer the smallest change and keep the existing style.";

/// 命令模式：决定各个 system prompt 中的角色说明
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandMode {
    #[default]
    Ask,
    Explain,
    Debug,
    Fix,
    Generate,
    Draft,
    /// 未识别的模式名
    General,
}

impl CommandMode {
    /// 未知名称退化为 General
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "ask" => CommandMode::Ask,
            "explain" => CommandMode::Explain,
            "debug" => CommandMode::Debug,
            "fix" => CommandMode::Fix,
            "generate" => CommandMode::Generate,
            "draft" => CommandMode::Draft,
            _ => CommandMode::General,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CommandMode::Ask => "ask",
            CommandMode::Explain => "explain",
            CommandMode::Debug => "debug",
            CommandMode::Fix => "fix",
            CommandMode::Generate => "generate",
            CommandMode::Draft => "draft",
            CommandMode::General => "general",
        }
    }

    /// ask / draft 没有专门的说明，与 general 共用
    pub fn system_prompt(&self) -> &'static str {
        match self {
            CommandMode::Explain => EXPLAIN_PROMPT,
            CommandMode::Debug => DEBUG_PROMPT,
            CommandMode::Fix => FIX_PROMPT,
            CommandMode::Generate => GENERATE_PROMPT,
            CommandMode::Ask | CommandMode::Draft | CommandMode::General => GENERAL_PROMPT,
        }
    }
}

/// DAG 规划的 system prompt
pub fn compiler_system_prompt(mode: CommandMode, tool_specs: &str) -> String {
    format!(
        r#"You are a helpful assistant that compiles a task into a Directed Acyclic Graph (DAG) of tool calls that can be executed efficiently.

{role}

## Available Tools:
{tool_specs}

## Output format
Respond with a JSON array wrapped in a ```json code block. Each element is either a tool step
{{"id": "step1", "tool": "tool_name", "args": {{...}}, "dependencies": []}}
or the final step
{{"id": "final", "action": "final", "answer": "...", "dependencies": ["step1"]}}

JSON Schema of the array:
{schema}

## Rules:
1. "dependencies" lists the step ids that must complete before this step
2. Steps with no dependencies or the same dependencies run in parallel, keep dependencies minimal
3. Always include exactly one final step with "action": "final"
4. The plan must not contain cycles
5. Only use tools listed above, do not make up tool names"#,
        role = mode.system_prompt(),
        tool_specs = tool_specs,
        schema = plan_schema_json(),
    )
}

/// 规划调用的完整消息
pub fn planning_messages(goal: &str, mode: CommandMode, tool_specs: &str) -> Vec<Message> {
    vec![
        Message::system(compiler_system_prompt(mode, tool_specs)),
        Message::user(goal),
    ]
}

/// 思维树的 system prompt
pub fn tree_system_prompt(mode: CommandMode, tool_specs: &str) -> String {
    format!(
        r#"You are a helpful assistant that explores multiple reasoning paths to solve complex tasks.

{role}

## Available Tools:
{tool_specs}

## Thought generation
Each thought is a distinct approach or perspective. If a thought needs a tool, include a structured
action object {{"tool": "...", "args": {{...}}}}. Only use tools listed above.

## Thought evaluation
Score a thought from 0.0 to 1.0 by relevance, feasibility and progress toward a solution."#,
        role = mode.system_prompt(),
        tool_specs = tool_specs,
    )
}

fn render_context(path: &PathContext) -> String {
    if path.is_empty() {
        return String::new();
    }
    let mut out = String::from("Previous thoughts:\n");
    for (id, content) in path {
        out.push_str(&format!("- {}: {}\n", id, content));
    }
    out
}

/// 为一个父节点生成候选思维
pub fn generation_messages(
    goal: &str,
    path: &PathContext,
    branching_factor: usize,
    mode: CommandMode,
    tool_specs: &str,
) -> Vec<Message> {
    let user = format!(
        r#"Question: {goal}

{context}
Generate {branching_factor} diverse thoughts for the next step in solving this problem.
Each thought should represent a different approach or perspective.

Respond with a JSON array, for example:
[
    {{"thought": "First approach description", "action": {{"tool": "read_file", "args": {{"path_str": "a.py", "max_chars": 1000}}}}}},
    {{"thought": "Second approach description"}}
]

JSON Schema of the array:
{schema}"#,
        goal = goal,
        context = render_context(path),
        branching_factor = branching_factor,
        schema = thought_schema_json(),
    );
    vec![
        Message::system(tree_system_prompt(mode, tool_specs)),
        Message::user(user),
    ]
}

/// 对单个思维打分
pub fn evaluation_messages(
    goal: &str,
    path: &PathContext,
    thought: &str,
    mode: CommandMode,
) -> Vec<Message> {
    let user = format!(
        r#"Question: {goal}

{context}
Evaluate this thought on quality (0.0-1.0):

Thought: {thought}

Scoring criteria:
- Relevance: How well does it address the question?
- Feasibility: Is it practically achievable?
- Progress: Does it move toward a solution?

Respond with ONLY a JSON object:
{{"score": 0.8}}"#,
        goal = goal,
        context = render_context(path),
        thought = thought,
    );
    vec![
        Message::system(format!(
            "You are a strict reviewer that scores reasoning steps.\n\n{}",
            mode.system_prompt()
        )),
        Message::user(user),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn test_planning_messages_embed_tools() {
        let msgs = planning_messages(
            "fix main.py",
            CommandMode::default(),
            " - echo: Echo text | args: {}",
        );
        assert_eq!(msgs.len(), 2);
        assert!(matches!(msgs[0].role, Role::System));
        assert!(msgs[0].content.contains(" - echo: Echo text"));
        assert!(msgs[0].content.contains("\"action\": \"final\""));
        assert_eq!(msgs[1].content, "fix main.py");
    }

    #[test]
    fn test_generation_context_lists_parents() {
        let path = vec![("t0".to_string(), "look at logs".to_string())];
        let msgs = generation_messages("why slow?", &path, 3, CommandMode::Ask, "");
        let user = &msgs[1].content;
        assert!(user.contains("Generate 3 diverse thoughts"));
        assert!(user.contains("- t0: look at logs"));
    }

    #[test]
    fn test_evaluation_without_context() {
        let msgs = evaluation_messages("q", &Vec::new(), "try caching", CommandMode::Ask);
        assert!(!msgs[1].content.contains("Previous thoughts"));
        assert!(msgs[1].content.contains("Thought: try caching"));
    }

    #[test]
    fn test_command_mode_names_and_fallback() {
        assert_eq!(CommandMode::from_name("Explain"), CommandMode::Explain);
        assert_eq!(CommandMode::from_name(" fix "), CommandMode::Fix);
        assert_eq!(CommandMode::from_name("translate"), CommandMode::General);
        assert_eq!(CommandMode::from_name("translate").name(), "general");
        for name in ["ask", "explain", "debug", "fix", "generate", "draft"] {
            assert_eq!(CommandMode::from_name(name).name(), name);
        }
        assert_eq!(CommandMode::Ask.system_prompt(), CommandMode::General.system_prompt());
        assert_eq!(CommandMode::Draft.system_prompt(), GENERAL_PROMPT);
        assert_ne!(CommandMode::Debug.system_prompt(), GENERAL_PROMPT);
    }

    #[test]
    fn test_mode_role_reaches_every_system_prompt() {
        let mode = CommandMode::Explain;
        let role = mode.system_prompt();
        assert!(planning_messages("g", mode, "")[0].content.contains(role));
        assert!(generation_messages("g", &Vec::new(), 2, mode, "")[0].content.contains(role));
        let eval = evaluation_messages("g", &Vec::new(), "t", mode);
        assert!(eval[0].content.starts_with("You are a strict reviewer"));
        assert!(eval[0].content.contains(role));
        assert!(!planning_messages("g", CommandMode::Ask, "")[0].content.contains(role));
    }
}
