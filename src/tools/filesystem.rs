//! 文件工具：read_file / write_file
//!
//! Workspace 绑定根目录，只接受相对路径且禁止 `..` 分量（防止路径逃逸）；
//! 找不到文件、文件过大等属于普通结果，以方括号文本返回。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;

use crate::tools::{ArgSpec, ArgType, Args, ToolDescriptor, ToolHandler};

/// 工具可访问的根目录
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 解析相对路径；绝对路径或含 `..` 的路径返回 Err
    pub fn resolve(&self, path: &str) -> Result<PathBuf, String> {
        let rel = Path::new(path.trim());
        let escapes = rel.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if path.trim().is_empty() || escapes {
            return Err(format!("Path escape attempt: {}", path));
        }
        Ok(self.root.join(rel))
    }
}

fn str_arg<'a>(args: &'a Args, key: &str) -> &'a str {
    args.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

/// 读取文件内容（超过 max_chars 时不返回内容）
pub struct ReadFileTool {
    workspace: Workspace,
}

impl ReadFileTool {
    pub fn descriptor(workspace: Workspace, max_chars: u64) -> ToolDescriptor {
        ToolDescriptor::new(
            "read_file",
            "Read a local file with size limit",
            ReadFileTool { workspace },
        )
        .required("path_str", ArgType::String)
        .with_default("max_chars", ArgSpec::of(ArgType::Integer), json!(max_chars))
    }
}

#[async_trait]
impl ToolHandler for ReadFileTool {
    async fn call(&self, args: Args) -> Result<String, String> {
        let path_str = str_arg(&args, "path_str");
        let max_chars = args
            .get("max_chars")
            .and_then(|v| v.as_u64())
            .unwrap_or(u64::MAX);
        let path = self.workspace.resolve(path_str)?;
        tracing::info!(path = %path.display(), "read_file tool execute");

        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Ok(format!("[File {} not found]", path_str));
        }
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| format!("Read failed: {}", e))?;
        let content = String::from_utf8_lossy(&bytes).to_string();
        if content.chars().count() as u64 > max_chars {
            return Ok(format!("[File {} is too large]", path_str));
        }
        Ok(content)
    }
}

/// 写文件（可选先备份为 *.bak），自动创建父目录
pub struct WriteFileTool {
    workspace: Workspace,
}

impl WriteFileTool {
    pub fn descriptor(workspace: Workspace) -> ToolDescriptor {
        ToolDescriptor::new(
            "write_file",
            "Write content to a file (creates or overwrites) with optional backup",
            WriteFileTool { workspace },
        )
        .required("path_str", ArgType::String)
        .required("content", ArgType::String)
        .with_default("backup", ArgSpec::of(ArgType::Boolean), json!(true))
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

#[async_trait]
impl ToolHandler for WriteFileTool {
    async fn call(&self, args: Args) -> Result<String, String> {
        let path_str = str_arg(&args, "path_str");
        let content = str_arg(&args, "content");
        let backup = args.get("backup").and_then(|v| v.as_bool()).unwrap_or(true);
        let path = self.workspace.resolve(path_str)?;
        tracing::info!(path = %path.display(), backup, "write_file tool execute");

        if backup && tokio::fs::metadata(&path).await.is_ok() {
            tokio::fs::copy(&path, backup_path(&path))
                .await
                .map_err(|e| format!("Backup of {} failed: {}", path_str, e))?;
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Error writing file {}: {}", path_str, e))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| format!("Error writing file {}: {}", path_str, e))?;
        Ok(format!("[File written successfully to {}]", path_str))
    }
}
