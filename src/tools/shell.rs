//! Shell 工具：sh -c 执行命令，带超时；禁止明显危险的子串
//!
//! 输出为 stdout + stderr；无输出时返回固定提示；超时视为普通结果。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;

use crate::tools::{ArgSpec, ArgType, Args, ToolDescriptor, ToolHandler, Workspace};

/// 禁止的命令子串
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf /",
    "rm -fr /",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    "chmod 777 /",
    ":(){ :|:& };:", // fork bomb
];

pub struct ShellTool {
    workspace: Workspace,
}

impl ShellTool {
    pub fn descriptor(workspace: Workspace, default_timeout_secs: f64) -> ToolDescriptor {
        ToolDescriptor::new("shell", "Execute shell command with timeout", ShellTool { workspace })
            .required("command", ArgType::String)
            .with_default("timeout", ArgSpec::of(ArgType::Number), json!(default_timeout_secs))
            .optional("cwd", ArgSpec::nullable(ArgType::String))
    }

    fn check_forbidden(command: &str) -> Result<(), String> {
        let lower = command.to_lowercase();
        match FORBIDDEN_SUBSTR.iter().find(|f| lower.contains(*f)) {
            Some(f) => Err(format!("Forbidden pattern: {}", f)),
            None => Ok(()),
        }
    }
}

fn to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs.min(86_400.0))
    } else {
        Duration::from_secs(30)
    }
}

#[async_trait]
impl ToolHandler for ShellTool {
    async fn call(&self, args: Args) -> Result<String, String> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        if command.is_empty() {
            return Err("Empty command".to_string());
        }
        Self::check_forbidden(&command)?;
        let timeout_secs = args.get("timeout").and_then(|v| v.as_f64()).unwrap_or(30.0);
        let cwd = match args.get("cwd").and_then(|v| v.as_str()) {
            Some(dir) => self.workspace.resolve(dir)?,
            None => self.workspace.root().to_path_buf(),
        };

        tracing::info!(command = %command, cwd = %cwd.display(), "shell tool execute");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command.as_str()]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command.as_str()]);
            c
        };
        cmd.current_dir(&cwd).kill_on_drop(true);

        let output = match tokio::time::timeout(to_duration(timeout_secs), cmd.output()).await {
            Ok(result) => result.map_err(|e| format!("Shell execution error: {}", e))?,
            Err(_) => return Ok(format!("[Command timeout after {}s]", timeout_secs)),
        };

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if text.is_empty() {
            Ok("[Command executed successfully with no output]".to_string())
        } else {
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;

    fn registry(root: &std::path::Path) -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(ShellTool::descriptor(Workspace::new(root), 5.0)).unwrap();
        reg
    }

    fn args(v: serde_json::Value) -> Args {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_forbidden_patterns() {
        assert!(ShellTool::check_forbidden("rm -rf / --no-preserve-root").is_err());
        assert!(ShellTool::check_forbidden("ls -la").is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_output_and_silence() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());

        let out = reg.dispatch("shell", args(json!({"command": "echo hi"}))).await.unwrap();
        assert_eq!(out.trim(), "hi");

        let out = reg.dispatch("shell", args(json!({"command": "true"}))).await.unwrap();
        assert_eq!(out, "[Command executed successfully with no output]");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let out = reg
            .dispatch("shell", args(json!({"command": "sleep 5", "timeout": 0.2})))
            .await
            .unwrap();
        assert_eq!(out, "[Command timeout after 0.2s]");
    }
}
