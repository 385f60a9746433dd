// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::models::task::TaskStatus;
use crate::domain::services::retry_manager::RetryManager;
use crate::domain::services::status_manager::StatusManager;
use crate::queue::task_queue::TaskQueue;
use crate::utils::errors::WorkerError;
use crate::workers::Worker;

/// 单轮对账扫描的Pending任务上限
const RECONCILE_BATCH: u64 = 100;

/// 重试清扫工作器
///
/// 固定间隔执行两类批处理：
/// 1. 处理重试集合中所有到期的条目，将任务重新入队
/// 2. 对账清扫：把持久化为Pending但超过阈值仍未入队的
///    孤儿任务重新入队，补偿准入阶段持久化与入队之间的
///    一致性缺口
pub struct RetrySweepWorker {
    retry: Arc<RetryManager>,
    status: Arc<StatusManager>,
    queue: Arc<dyn TaskQueue>,
    /// 清扫间隔
    sweep_interval: Duration,
    /// Pending任务超过该时长未入队即视为孤儿
    pending_requeue_after: chrono::Duration,
}

impl RetrySweepWorker {
    /// 创建新的重试清扫工作器实例
    ///
    /// # 参数
    ///
    /// * `retry` - 重试管理器
    /// * `status` - 状态管理器
    /// * `queue` - 任务队列
    /// * `sweep_interval` - 清扫间隔
    /// * `pending_requeue_after` - Pending孤儿判定阈值
    pub fn new(
        retry: Arc<RetryManager>,
        status: Arc<StatusManager>,
        queue: Arc<dyn TaskQueue>,
        sweep_interval: Duration,
        pending_requeue_after: chrono::Duration,
    ) -> Self {
        Self {
            retry,
            status,
            queue,
            sweep_interval,
            pending_requeue_after,
        }
    }

    /// 重新入队超过阈值的Pending孤儿任务
    async fn reconcile_pending(&self) -> Result<usize, WorkerError> {
        let pending = self
            .status
            .get_tasks_by_status(TaskStatus::Pending, RECONCILE_BATCH)
            .await
            .map_err(|e| WorkerError::StatusError(e.to_string()))?;

        let threshold = Utc::now()
            .fixed_offset()
            .checked_sub_signed(self.pending_requeue_after);
        let Some(threshold) = threshold else {
            return Ok(0);
        };

        let mut requeued = 0;
        for task in pending {
            if task.created_at > threshold {
                continue;
            }

            if let Err(e) = self.queue.enqueue(task.tier(), &task).await {
                warn!("Requeueing orphaned task {} failed: {}", task.id, e);
                continue;
            }

            match self
                .status
                .update_status(task.id, TaskStatus::Queued, None)
                .await
            {
                Ok(_) => requeued += 1,
                Err(e) => warn!("Marking orphaned task {} as queued failed: {}", task.id, e),
            }
        }

        Ok(requeued)
    }
}

#[async_trait]
impl Worker for RetrySweepWorker {
    async fn run(&self, shutdown: CancellationToken) -> Result<(), WorkerError> {
        info!(
            "Retry sweep worker started, interval {:?}",
            self.sweep_interval
        );

        let mut ticker = interval(self.sweep_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.retry.process_retry_queue().await {
                        error!("Retry sweep failed: {}", e);
                    }

                    match self.reconcile_pending().await {
                        Ok(count) if count > 0 => {
                            info!("Reconciliation requeued {} orphaned pending tasks", count);
                        }
                        Ok(_) => {}
                        Err(e) => error!("Pending reconciliation failed: {}", e),
                    }
                }
            }
        }

        info!("Retry sweep worker stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        "retry-sweep-worker"
    }
}
