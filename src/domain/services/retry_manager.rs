// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::task::{CrawlTask, TaskStatus};
use crate::domain::services::status_manager::{StatusError, StatusManager};
use crate::infrastructure::metrics;
use crate::queue::task_queue::{QueueError, TaskQueue};
use crate::utils::retry_policy::RetryPolicy;

/// 单次清扫认领的重试条目上限
const RETRY_SWEEP_BATCH: usize = 100;

/// 重试管理器错误类型
#[derive(Error, Debug)]
pub enum RetryError {
    /// 状态管理器错误
    #[error("Status error: {0}")]
    Status(#[from] StatusError),

    /// 队列错误
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// 任务未找到
    #[error("Task {0} not found")]
    NotFound(Uuid),

    /// 任务不在死信队列中
    #[error("Task {0} is not in the dead letter queue")]
    NotDeadLettered(Uuid),
}

/// 重试管理器
///
/// 负责退避计算、延迟重新入队与死信决策。重试排期写入按
/// 到期时刻排序的持久集合而非内存定时器，因此排期在进程
/// 重启后仍然有效。重试次数的递增与死信投放只由本管理器
/// 发起。
pub struct RetryManager {
    status: Arc<StatusManager>,
    queue: Arc<dyn TaskQueue>,
    policy: RetryPolicy,
}

impl RetryManager {
    /// 创建新的重试管理器实例
    ///
    /// # 参数
    ///
    /// * `status` - 状态管理器
    /// * `queue` - 任务队列
    /// * `policy` - 重试退避策略
    pub fn new(status: Arc<StatusManager>, queue: Arc<dyn TaskQueue>, policy: RetryPolicy) -> Self {
        Self {
            status,
            queue,
            policy,
        }
    }

    /// 为失败的任务排期一次延迟重试
    ///
    /// 以当前重试次数计算退避延迟，递增重试次数并置状态为
    /// Retrying，然后把任务加入按到期时刻排序的重试集合
    ///
    /// # 参数
    ///
    /// * `task` - 失败的任务
    /// * `reason` - 失败原因
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 排期成功
    /// * `Err(RetryError)` - 持久化或队列操作失败
    pub async fn schedule_retry(&self, task: &CrawlTask, reason: &str) -> Result<(), RetryError> {
        let delay = self.policy.calculate_backoff(task.retry_count.max(0) as u32);
        let due_at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);

        self.status
            .apply_retry(task.id, task.retry_count + 1, reason)
            .await?;
        self.queue.schedule_retry(task.id, due_at).await?;

        metrics::record_task_retried();
        info!(
            "Scheduled retry {}/{} for task {} in {:?}",
            task.retry_count + 1,
            task.max_retries,
            task.id,
            delay
        );
        Ok(())
    }

    /// 统一的失败处理入口
    ///
    /// 执行失败与交接推送失败都经过这里：剩余重试额度时排期
    /// 延迟重试，重试耗尽时转入终态并投放死信队列
    ///
    /// # 参数
    ///
    /// * `task` - 失败的任务
    /// * `reason` - 失败原因
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 处理完成
    /// * `Err(RetryError)` - 持久化或队列操作失败
    pub async fn handle_failure(&self, task: &CrawlTask, reason: &str) -> Result<(), RetryError> {
        metrics::record_task_failed();

        if task.can_retry() {
            self.schedule_retry(task, reason).await
        } else {
            self.dead_letter(task, reason).await
        }
    }

    /// 将重试耗尽的任务转入终态并投放死信队列
    async fn dead_letter(&self, task: &CrawlTask, reason: &str) -> Result<(), RetryError> {
        let applied = self
            .status
            .update_error(task.id, reason, TaskStatus::Failed)
            .await?;

        if applied {
            self.queue.push_dead_letter(task.id).await?;
            metrics::record_task_dead_lettered();
            warn!(
                "Task {} exhausted {} retries and was dead lettered: {}",
                task.id, task.max_retries, reason
            );
        }
        Ok(())
    }

    /// 处理到期的重试条目
    ///
    /// 原子地认领所有到期条目并逐个转回 Retrying → Queued，
    /// 重新推入任务原本的优先级层级队列。多个调度器实例并发
    /// 调用时每个条目只会被处理一次。
    ///
    /// # 返回值
    ///
    /// * `Ok(usize)` - 本轮重新入队的任务数
    /// * `Err(RetryError)` - 队列访问失败
    pub async fn process_retry_queue(&self) -> Result<usize, RetryError> {
        let due = self
            .queue
            .claim_due_retries(Utc::now(), RETRY_SWEEP_BATCH)
            .await?;

        let mut requeued = 0;
        for task_id in due {
            match self.requeue_task(task_id).await {
                Ok(true) => requeued += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to requeue task {}: {}", task_id, e);
                }
            }
        }

        if requeued > 0 {
            info!("Retry sweep requeued {} tasks", requeued);
        }
        Ok(requeued)
    }

    /// 将单个到期任务重新入队
    async fn requeue_task(&self, task_id: Uuid) -> Result<bool, RetryError> {
        let task = match self.status.get_task(task_id).await? {
            Some(task) => task,
            None => {
                warn!("Due retry entry {} has no persisted task", task_id);
                return Ok(false);
            }
        };

        if task.status != TaskStatus::Retrying {
            warn!(
                "Skipping due retry for task {} in unexpected status {}",
                task_id, task.status
            );
            return Ok(false);
        }

        let updated = self
            .status
            .update_status(task_id, TaskStatus::Queued, None)
            .await?;
        self.queue.enqueue(updated.tier(), &updated).await?;
        Ok(true)
    }

    /// 读取死信队列中的任务
    ///
    /// # 参数
    ///
    /// * `limit` - 返回条数上限，0表示不限制
    ///
    /// # 返回值
    ///
    /// * `Ok(Vec<CrawlTask>)` - 死信任务列表
    /// * `Err(RetryError)` - 读取失败
    pub async fn get_dead_letter_tasks(&self, limit: usize) -> Result<Vec<CrawlTask>, RetryError> {
        let ids = self.queue.list_dead_letters(limit).await?;

        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            match self.status.get_task(id).await? {
                Some(task) => tasks.push(task),
                None => warn!("Dead letter entry {} has no persisted task", id),
            }
        }
        Ok(tasks)
    }

    /// 重新处理一个死信任务
    ///
    /// 将任务从死信列表移除，显式清零重试次数并经由正常的
    /// Pending → Queued 准入路径重新调度。死信任务绝不会在
    /// 没有该显式调用的情况下自动恢复。
    ///
    /// # 参数
    ///
    /// * `id` - 任务ID
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlTask)` - 重新入队后的任务
    /// * `Err(RetryError)` - 任务不在死信队列或重新入队失败
    pub async fn reprocess_dead_letter_task(&self, id: Uuid) -> Result<CrawlTask, RetryError> {
        if !self.queue.remove_dead_letter(id).await? {
            return Err(RetryError::NotDeadLettered(id));
        }

        let task = self.status.reset_for_reprocess(id).await?;
        self.queue.enqueue(task.tier(), &task).await?;
        let queued = self
            .status
            .update_status(id, TaskStatus::Queued, None)
            .await?;

        info!("Dead letter task {} reset and requeued", id);
        Ok(queued)
    }

    /// 手动触发一次重试
    ///
    /// 操作员路径：无论剩余重试额度如何都重新进入重试排期
    ///
    /// # 参数
    ///
    /// * `id` - 任务ID
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 排期成功
    /// * `Err(RetryError)` - 任务不存在或排期失败
    pub async fn retry_task(&self, id: Uuid) -> Result<(), RetryError> {
        let task = self
            .status
            .get_task(id)
            .await?
            .ok_or(RetryError::NotFound(id))?;

        self.schedule_retry(&task, "manual retry requested").await
    }
}
