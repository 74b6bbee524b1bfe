//! 工具层：类型化注册表、执行器与内置工具（echo / read_file / write_file / shell / http_get）

pub mod echo;
pub mod executor;
pub mod filesystem;
pub mod http;
pub mod registry;
pub mod shell;

pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use filesystem::{ReadFileTool, Workspace, WriteFileTool};
pub use http::HttpGetTool;
pub use registry::{
    handler_fn, ArgSpec, ArgType, Args, FnHandler, ToolDescriptor, ToolHandler, ToolRegistry,
};
pub use shell::ShellTool;

use crate::config::ToolsSection;
use crate::core::ToolError;

/// 按 [tools] 配置注册全部内置工具
pub fn builtin_registry(cfg: &ToolsSection) -> Result<ToolRegistry, ToolError> {
    let workspace = Workspace::new(&cfg.workspace_root);
    let mut tools = ToolRegistry::new();
    tools.register(EchoTool::descriptor(cfg.echo_max_chars))?;
    tools.register(ReadFileTool::descriptor(workspace.clone(), cfg.read_max_chars))?;
    tools.register(WriteFileTool::descriptor(workspace.clone()))?;
    tools.register(ShellTool::descriptor(workspace, cfg.shell_timeout_secs))?;
    tools.register(HttpGetTool::descriptor(cfg.http_timeout_secs))?;
    Ok(tools)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let reg = builtin_registry(&ToolsSection::default()).unwrap();
        assert_eq!(
            reg.tool_names(),
            vec!["echo", "http_get", "read_file", "shell", "write_file"]
        );
        let shell = reg.get("shell").unwrap();
        assert!(shell.required_args().contains("command"));
        assert!(shell.arg_types().get("cwd").unwrap().nullable);
    }
}
