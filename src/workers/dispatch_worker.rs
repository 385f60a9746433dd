// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::models::task::{CrawlTask, PriorityTier, TaskStatus};
use crate::domain::services::retry_manager::RetryManager;
use crate::domain::services::status_manager::StatusManager;
use crate::infrastructure::metrics;
use crate::queue::task_queue::TaskQueue;
use crate::utils::errors::WorkerError;
use crate::workers::Worker;

/// 标记Processing的有限次重试次数
const MARK_PROCESSING_ATTEMPTS: u32 = 3;

/// 分发工作器
///
/// 独立的长循环，按 realtime → high → normal → low 的严格
/// 优先级顺序扫描层级队列，对每层做有界阻塞弹出，第一个
/// 命中的层级赢得本轮。取到任务后标记Processing并把完整
/// 序列化副本推入交接队列，不等待执行结果。
///
/// 严格优先级意味着持续的高优先级负载可以无限期饿死低优
/// 层级，这是有意保留的策略而非缺陷。
pub struct DispatchWorker {
    status: Arc<StatusManager>,
    retry: Arc<RetryManager>,
    queue: Arc<dyn TaskQueue>,
    worker_id: String,
    /// 每层队列的有界阻塞弹出时长
    pop_timeout: Duration,
    /// 所有层级均为空时的退避时长
    idle_backoff: Duration,
}

impl DispatchWorker {
    /// 创建新的分发工作器实例
    ///
    /// # 参数
    ///
    /// * `status` - 状态管理器
    /// * `retry` - 重试管理器
    /// * `queue` - 任务队列
    /// * `worker_id` - 工作器标识
    /// * `pop_timeout` - 每层的阻塞弹出超时
    /// * `idle_backoff` - 空转退避时长
    pub fn new(
        status: Arc<StatusManager>,
        retry: Arc<RetryManager>,
        queue: Arc<dyn TaskQueue>,
        worker_id: String,
        pop_timeout: Duration,
        idle_backoff: Duration,
    ) -> Self {
        Self {
            status,
            retry,
            queue,
            worker_id,
            pop_timeout,
            idle_backoff,
        }
    }

    /// 扫描一轮所有层级，返回是否分发了任务
    async fn dispatch_next(&self, shutdown: &CancellationToken) -> bool {
        for tier in PriorityTier::SCAN_ORDER {
            if shutdown.is_cancelled() {
                return true;
            }

            match self.queue.dequeue(tier, self.pop_timeout).await {
                Ok(Some(task)) => {
                    debug!("Dequeued task {} from {} tier", task.id, tier);
                    self.process_task(task).await;
                    return true;
                }
                Ok(None) => {}
                Err(e) => {
                    // 队列暂不可用不应终止循环，退避后进入下一轮
                    error!("Dequeue from {} tier failed: {}", tier, e);
                    return false;
                }
            }
        }

        false
    }

    #[instrument(skip(self, task), fields(task_id = %task.id, url = %task.url, worker = %self.worker_id))]
    async fn process_task(&self, task: CrawlTask) {
        let task = match self.mark_processing(task).await {
            Some(task) => task,
            None => return,
        };

        if let Err(e) = self.queue.push_handoff(&task).await {
            // 交接推送失败与执行失败走同一条失败处理路径，
            // 任务不会滞留在Processing状态
            error!("Handoff push failed for task {}: {}", task.id, e);
            if let Err(err) = self
                .retry
                .handle_failure(&task, &format!("handoff push failed: {}", e))
                .await
            {
                error!("Failure handling for task {} failed: {}", task.id, err);
            }
            return;
        }

        metrics::record_task_dispatched();
        info!("Task {} handed off to worker pool", task.id);
    }

    /// 将任务标记为Processing
    ///
    /// 持久层短暂不可用或刚入队的任务状态尚未落库时做有限次
    /// 重试；依旧失败则把任务放回原层级队列等待下一轮分发
    async fn mark_processing(&self, task: CrawlTask) -> Option<CrawlTask> {
        for attempt in 1..=MARK_PROCESSING_ATTEMPTS {
            match self
                .status
                .update_status(
                    task.id,
                    TaskStatus::Processing,
                    Some(self.worker_id.clone()),
                )
                .await
            {
                Ok(updated) => return Some(updated),
                Err(e) => {
                    warn!(
                        "Marking task {} as processing failed (attempt {}/{}): {}",
                        task.id, attempt, MARK_PROCESSING_ATTEMPTS, e
                    );
                    sleep(Duration::from_millis(100)).await;
                }
            }
        }

        // 放回队列，保持任务可追踪
        if let Err(e) = self.queue.enqueue(task.tier(), &task).await {
            error!("Requeueing task {} after mark failure failed: {}", task.id, e);
        }
        None
    }
}

#[async_trait]
impl Worker for DispatchWorker {
    async fn run(&self, shutdown: CancellationToken) -> Result<(), WorkerError> {
        info!("Dispatch worker {} started", self.worker_id);

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let dispatched = self.dispatch_next(&shutdown).await;

            if !dispatched {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(self.idle_backoff) => {}
                }
            }
        }

        info!("Dispatch worker {} stopped", self.worker_id);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.worker_id
    }
}
