//! 调度层：DAG 轮次调度与思维树 beam search，共享同一个 WorkerPool

pub mod dag;
pub mod tree;

pub use dag::{DagReport, DagScheduler};
pub use tree::{
    LevelSummary, PathStep, ThoughtPath, ThoughtTree, TreeConfig, TreeReport, TreeScheduler,
    NEUTRAL_SCORE,
};
