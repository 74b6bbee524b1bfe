//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ARBOR__*` 覆盖（双下划线表示嵌套，如 `ARBOR__ENGINE__MAX_CONCURRENCY=4`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::SamplingParams;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub engine: EngineSection,
}

/// [llm] 段：后端选择、超时与默认采样参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai（任意 OpenAI 兼容端点）/ mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读取 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub max_tokens: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        let sampling = SamplingParams::default();
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            frequency_penalty: sampling.frequency_penalty,
            max_tokens: sampling.max_tokens,
        }
    }
}

impl LlmSection {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            max_tokens: self.max_tokens,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// [tools] 段：工作目录、单次工具超时、内置工具限制
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// read_file / write_file 的相对路径根
    pub workspace_root: PathBuf,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub read_max_chars: u64,
    pub echo_max_chars: u64,
    pub shell_timeout_secs: f64,
    pub http_timeout_secs: f64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            tool_timeout_secs: 60,
            read_max_chars: 4000,
            echo_max_chars: 4000,
            shell_timeout_secs: 30.0,
            http_timeout_secs: 10.0,
        }
    }
}

/// [engine] 段：工作池宽度、结果预览长度、命令模式与两种调度器参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_concurrency: usize,
    /// 合成 prompt 中每个步骤结果保留的字符数
    pub result_preview_chars: usize,
    /// ask / explain / debug / fix / generate / draft，未知值按 general 处理
    pub command: String,
    pub dag: DagSection,
    pub tree: TreeSection,
    pub reflection: ReflectionSection,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_concurrency: crate::core::DEFAULT_MAX_CONCURRENCY,
            result_preview_chars: 500,
            command: "ask".to_string(),
            dag: DagSection::default(),
            tree: TreeSection::default(),
            reflection: ReflectionSection::default(),
        }
    }
}

/// [engine.dag] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DagSection {
    /// true 时缺失依赖直接判为非法计划；默认让相关步骤以 Unreachable 结束
    pub strict_dependencies: bool,
}

/// [engine.tree] 段：beam search 参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TreeSection {
    pub max_depth: usize,
    pub branching_factor: usize,
    pub beam_width: usize,
    pub generation_temperature: f32,
    pub evaluation_temperature: f32,
    pub path_result_preview_chars: usize,
}

impl Default for TreeSection {
    fn default() -> Self {
        Self {
            max_depth: 3,
            branching_factor: 3,
            beam_width: 2,
            generation_temperature: 0.7,
            evaluation_temperature: 0.3,
            path_result_preview_chars: 200,
        }
    }
}

/// [engine.reflection] 段：复盘调用的采样参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReflectionSection {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ReflectionSection {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2048,
        }
    }
}

/// 从 config 目录加载配置，环境变量 ARBOR__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ARBOR__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ARBOR")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.max_concurrency, 10);
        assert_eq!(cfg.engine.tree.beam_width, 2);
        assert!(!cfg.engine.dag.strict_dependencies);
        assert_eq!(cfg.llm.sampling().top_p, 0.85);
        assert_eq!(cfg.engine.command, "ask");
        assert_eq!(cfg.engine.reflection.temperature, 0.3);
        assert_eq!(cfg.engine.reflection.max_tokens, 2048);
    }

    #[test]
    fn test_load_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[engine]\nmax_concurrency = 4\n\n[engine.tree]\nmax_depth = 2\n\n[llm]\nprovider = \"mock\""
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.engine.max_concurrency, 4);
        assert_eq!(cfg.engine.tree.max_depth, 2);
        assert_eq!(cfg.engine.tree.branching_factor, 3);
        assert_eq!(cfg.llm.provider, "mock");
    }
}
