//! 编排器集成测试：脚本化 LLM + 闭包工具，不访问网络

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arbor::config::AppConfig;
    use arbor::core::{EngineError, PlanError};
    use arbor::llm::{Message, ScriptedLlmClient};
    use arbor::tools::{handler_fn, ArgType, Args, ToolDescriptor, ToolRegistry};
    use arbor::Orchestrator;

    fn is_planning(messages: &[Message]) -> bool {
        messages[0].content.contains("Directed Acyclic Graph")
    }

    fn is_synthesis(messages: &[Message]) -> bool {
        messages[0].content.contains("writes the final answer")
    }

    fn upper_registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(
            ToolDescriptor::new(
                "echo",
                "Echo text",
                handler_fn(|a: Args| Ok(a["text"].as_str().unwrap_or_default().to_string())),
            )
            .required("text", ArgType::String),
        )
        .unwrap();
        reg.register(
            ToolDescriptor::new(
                "upper",
                "Uppercase text",
                handler_fn(|a: Args| Ok(a["text"].as_str().unwrap_or_default().to_uppercase())),
            )
            .required("text", ArgType::String),
        )
        .unwrap();
        reg
    }

    const ECHO_PLAN: &str = r#"```json
[
  {"id": "a", "tool": "echo", "args": {"text": "x"}, "dependencies": []},
  {"id": "b", "tool": "echo", "args": {"text": "y"}, "dependencies": ["a"]},
  {"id": "final", "action": "final", "answer": "done", "dependencies": ["b"]}
]
```"#;

    #[tokio::test]
    async fn test_dag_run_synthesizes_from_tool_results() {
        let llm = Arc::new(ScriptedLlmClient::new(|messages, _| {
            if is_planning(messages) {
                Ok(ECHO_PLAN.to_string())
            } else {
                Ok("x then y".to_string())
            }
        }));
        let orch = Orchestrator::new(&AppConfig::default(), llm.clone(), upper_registry()).unwrap();
        let run = orch.run_dag("echo x then y").await.unwrap();

        assert_eq!(run.answer, "x then y");
        assert_eq!(
            run.report.rounds,
            vec![vec!["a".to_string()], vec!["b".to_string()], vec!["final".to_string()]]
        );
        assert_eq!(run.report.results.get("final"), Some("done"));

        let calls = llm.calls();
        assert_eq!(calls.len(), 2);
        assert!(is_synthesis(&calls[1].messages));
        let prompt = calls[1].last_user();
        assert!(prompt.contains("a: x\nb: y"));
        assert!(prompt.contains("Initial Answer: done"));
        assert!(prompt.contains("Question: echo x then y"));
    }

    #[tokio::test]
    async fn test_free_text_plan_returns_verbatim() {
        let llm = Arc::new(ScriptedLlmClient::fixed("Paris is the capital of France."));
        let orch = Orchestrator::new(&AppConfig::default(), llm.clone(), upper_registry()).unwrap();
        let run = orch.run_dag("capital of France?").await.unwrap();
        assert_eq!(run.answer, "Paris is the capital of France.");
        assert_eq!(run.plan.len(), 1);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cyclic_plan_aborts_run() {
        let llm = Arc::new(ScriptedLlmClient::fixed(
            r#"[{"id": "a", "tool": "echo", "args": {"text": "1"}, "dependencies": ["b"]},
                {"id": "b", "tool": "echo", "args": {"text": "2"}, "dependencies": ["a"]}]"#,
        ));
        let orch = Orchestrator::new(&AppConfig::default(), llm, upper_registry()).unwrap();
        match orch.run_dag("loop").await {
            Err(EngineError::InvalidPlan(PlanError::Cycle { ids })) => {
                assert_eq!(ids.len(), 2);
                assert!(ids.contains(&"a".to_string()) && ids.contains(&"b".to_string()));
            }
            other => panic!("expected cycle error, got {:?}", other.map(|r| r.answer)),
        }
    }

    #[tokio::test]
    async fn test_bad_arguments_recorded_as_step_results() {
        let plan = r#"[
            {"id": "a", "tool": "upper", "args": {"txt": "oops"}, "dependencies": []},
            {"id": "b", "tool": "upper", "args": {"text": 5}, "dependencies": []},
            {"id": "c", "tool": "upper", "args": {"text": "ok"}, "dependencies": []},
            {"id": "final", "action": "final", "answer": "draft", "dependencies": ["a", "b", "c"]}
        ]"#;
        let llm = Arc::new(ScriptedLlmClient::new(move |messages, _| {
            if is_planning(messages) {
                Ok(plan.to_string())
            } else {
                Ok("synthesized".to_string())
            }
        }));
        let orch = Orchestrator::new(&AppConfig::default(), llm, upper_registry()).unwrap();
        let run = orch.run_dag("shout").await.unwrap();
        let results = &run.report.results;

        let a = results.get("a").unwrap();
        assert!(a.starts_with("Error: Missing or unknown arguments for tool upper"));
        assert!(a.contains("text") && a.contains("txt"));
        assert!(results.get("b").unwrap().starts_with("Error: Invalid argument type"));
        assert_eq!(results.get("c"), Some("OK"));
        assert_eq!(run.report.rounds.len(), 2);
        assert_eq!(run.answer, "synthesized");
    }

    #[tokio::test]
    async fn test_tree_run_single_beam() {
        let llm = Arc::new(ScriptedLlmClient::new(|messages, _| {
            if is_synthesis(messages) {
                return Ok("best path answer".to_string());
            }
            let user = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            if user.contains("Evaluate this thought") {
                let score = if user.contains("Thought: option B") { 0.9 } else { 0.2 };
                return Ok(format!(r#"{{"score": {}}}"#, score));
            }
            Ok(r#"[{"thought": "option A"},
                   {"thought": "option B", "action": {"tool": "upper", "args": {"text": "b"}}},
                   {"thought": "option C"}]"#
                .to_string())
        }));

        let mut cfg = AppConfig::default();
        cfg.engine.tree.max_depth = 2;
        cfg.engine.tree.branching_factor = 3;
        cfg.engine.tree.beam_width = 1;
        let orch = Orchestrator::new(&cfg, llm.clone(), upper_registry()).unwrap();
        let run = orch.run_tree("pick one").await.unwrap();

        assert_eq!(run.answer, "best path answer");
        assert_eq!(run.report.levels.len(), 2);
        assert!(run.report.levels.iter().all(|l| l.retained.len() == 1));
        assert_eq!(run.report.thoughts.len(), 6);
        assert_eq!(run.report.paths.len(), 1);
        let path = &run.report.paths[0];
        assert_eq!(path.steps.len(), 2);
        assert_eq!(path.steps[0].content, "option B");
        assert_eq!(path.steps[0].result.as_deref(), Some("B"));

        let synthesis = llm
            .calls()
            .into_iter()
            .find(|c| is_synthesis(&c.messages))
            .unwrap();
        assert!(synthesis.last_user().contains("Path 1 (score: 0.90)"));
        assert!(synthesis.last_user().contains("Result: B"));
    }
}
