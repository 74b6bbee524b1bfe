//! 有界工作池
//!
//! 一个 Orchestrator 只构建一个 WorkerPool，DAG 的每一轮与思维树的每一层都复用它；
//! 每个调度单元（工具调用、生成调用、评估调用）持有一个许可，单元内部不再嵌套申请。

use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Semaphore;

/// 默认并发宽度
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// 基于 Semaphore 的工作池，Clone 后共享同一组许可
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    width: usize,
}

impl WorkerPool {
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            permits: Arc::new(Semaphore::new(width)),
            width,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// 当前空闲许可数
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// 取得许可后执行单个单元
    pub async fn run<F, T>(&self, unit: F) -> T
    where
        F: Future<Output = T>,
    {
        // 许可只在本结构内持有，Semaphore 不会被 close
        let _permit = self.permits.acquire().await.ok();
        unit.await
    }

    /// 并发执行一批单元，等待全部完成；返回顺序与输入顺序一致
    pub async fn run_all<I, F, T>(&self, units: I) -> Vec<T>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = T>,
    {
        join_all(units.into_iter().map(|unit| self.run(unit))).await
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_all_respects_width() {
        let pool = WorkerPool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let units = (0..6).map(|i| {
            let active = active.clone();
            let peak = peak.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                i
            }
        });

        let out = pool.run_all(units).await;
        assert_eq!(out, vec![0, 1, 2, 3, 4, 5]);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_zero_width_is_clamped() {
        assert_eq!(WorkerPool::new(0).width(), 1);
    }
}
