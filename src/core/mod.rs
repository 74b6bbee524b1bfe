//! 核心层：错误分类与有界工作池

pub mod error;
pub mod pool;

pub use error::{EngineError, PlanError, ToolError};
pub use pool::{WorkerPool, DEFAULT_MAX_CONCURRENCY};
