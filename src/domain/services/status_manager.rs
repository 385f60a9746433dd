// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::domain::models::task::{
    CrawlResult, CrawlTask, DomainError, TaskMetrics, TaskStatus,
};
use crate::domain::repositories::task_repository::{
    RepositoryError, TaskQueryParams, TaskRepository,
};
use crate::infrastructure::cache::task_cache::TaskCache;
use crate::infrastructure::metrics;

/// 状态管理器错误类型
#[derive(Error, Debug)]
pub enum StatusError {
    /// 仓库错误
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// 领域错误（非法状态转换等）
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// 任务未找到
    #[error("Task {0} not found")]
    NotFound(Uuid),
}

/// 状态管理器
///
/// 任务状态的唯一读写权威：所有状态变更先写持久层（权威来源），
/// 再刷新或清除短TTL读缓存。终态写入清除缓存条目，强制后续读取
/// 回源，保证写后读的新鲜度；唯一的过期窗口是两次读取之间没有
/// 写入的TTL区间。缓存访问失败只记录日志，不影响状态写入。
pub struct StatusManager {
    repository: Arc<dyn TaskRepository>,
    cache: Arc<dyn TaskCache>,
}

impl StatusManager {
    /// 创建新的状态管理器实例
    ///
    /// # 参数
    ///
    /// * `repository` - 任务仓库
    /// * `cache` - 任务读缓存
    pub fn new(repository: Arc<dyn TaskRepository>, cache: Arc<dyn TaskCache>) -> Self {
        Self { repository, cache }
    }

    /// 持久化一个新任务并预热缓存
    ///
    /// # 参数
    ///
    /// * `task` - Pending状态的新任务
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlTask)` - 持久化后的任务
    /// * `Err(StatusError)` - 持久化失败
    pub async fn create_task(&self, task: &CrawlTask) -> Result<CrawlTask, StatusError> {
        let created = self.repository.insert(task).await?;
        self.refresh_cache(&created).await;
        Ok(created)
    }

    /// 根据ID获取任务
    ///
    /// 缓存命中直接返回；未命中时回源持久层并回填缓存
    ///
    /// # 参数
    ///
    /// * `id` - 任务ID
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(CrawlTask))` - 任务
    /// * `Ok(None)` - 任务不存在
    /// * `Err(StatusError)` - 读取失败
    pub async fn get_task(&self, id: Uuid) -> Result<Option<CrawlTask>, StatusError> {
        match self.cache.get(id).await {
            Ok(Some(task)) => return Ok(Some(task)),
            Ok(None) => {}
            Err(e) => warn!("Cache read failed for task {}: {}", id, e),
        }

        let task = self.repository.find_by_id(id).await?;
        if let Some(task) = &task {
            self.refresh_cache(task).await;
        }
        Ok(task)
    }

    /// 更新任务状态
    ///
    /// 先写持久层再原地刷新缓存。转入Processing时记录startedAt
    /// 与工作者标识，转入终态时记录completedAt。
    ///
    /// # 参数
    ///
    /// * `id` - 任务ID
    /// * `status` - 目标状态
    /// * `worker_id` - 工作者标识（转入Processing时使用）
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlTask)` - 更新后的任务
    /// * `Err(StatusError)` - 任务不存在、转换非法或持久化失败
    pub async fn update_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        worker_id: Option<String>,
    ) -> Result<CrawlTask, StatusError> {
        let mut task = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(StatusError::NotFound(id))?;

        task.check_transition(status)?;

        let now = Utc::now().into();
        task.status = status;
        task.updated_at = now;

        if status == TaskStatus::Processing {
            task.started_at = Some(now);
            if worker_id.is_some() {
                task.worker_id = worker_id;
            }
        }

        if status.is_terminal() {
            task.completed_at = Some(now);
        }

        let updated = self.repository.update(&task).await?;
        self.refresh_cache(&updated).await;
        Ok(updated)
    }

    /// 记录任务执行成功的结果
    ///
    /// 原子地置状态为Completed、附加结果与耗时并记录completedAt，
    /// 然后清除缓存条目，保证紧随其后的读取取得新值。来自已不在
    /// Processing状态的任务或工作者不匹配的迟到上报按无操作处理。
    ///
    /// # 参数
    ///
    /// * `id` - 任务ID
    /// * `result` - 爬取结果
    /// * `execution_time_ms` - 执行耗时（毫秒）
    /// * `worker_id` - 上报的工作者标识
    ///
    /// # 返回值
    ///
    /// * `Ok(true)` - 结果已写入
    /// * `Ok(false)` - 迟到上报被忽略
    /// * `Err(StatusError)` - 任务不存在或持久化失败
    pub async fn update_result(
        &self,
        id: Uuid,
        result: CrawlResult,
        execution_time_ms: i64,
        worker_id: &str,
    ) -> Result<bool, StatusError> {
        let mut task = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(StatusError::NotFound(id))?;

        if task.status != TaskStatus::Processing {
            warn!(
                "Ignoring stale result report for task {} in status {}",
                id, task.status
            );
            return Ok(false);
        }

        if let Some(assigned) = &task.worker_id {
            if assigned != worker_id {
                warn!(
                    "Ignoring result report for task {} from worker {} (assigned to {})",
                    id, worker_id, assigned
                );
                return Ok(false);
            }
        }

        let now = Utc::now().into();
        task.status = TaskStatus::Completed;
        task.result = Some(result);
        task.execution_time_ms = Some(execution_time_ms);
        task.worker_id = Some(worker_id.to_string());
        task.completed_at = Some(now);
        task.updated_at = now;

        self.repository.update(&task).await?;
        self.clear_cache(id).await;
        metrics::record_task_completed(execution_time_ms);
        Ok(true)
    }

    /// 记录任务错误
    ///
    /// 置状态与错误信息，目标为终态时记录completedAt，随后清除
    /// 缓存条目。与结果上报相同，已离开Processing状态的任务的
    /// 迟到错误上报按无操作处理。
    ///
    /// # 参数
    ///
    /// * `id` - 任务ID
    /// * `message` - 错误信息
    /// * `status` - 目标状态（Failed或Retrying）
    ///
    /// # 返回值
    ///
    /// * `Ok(true)` - 错误已写入
    /// * `Ok(false)` - 迟到上报被忽略
    /// * `Err(StatusError)` - 任务不存在或持久化失败
    pub async fn update_error(
        &self,
        id: Uuid,
        message: &str,
        status: TaskStatus,
    ) -> Result<bool, StatusError> {
        let mut task = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(StatusError::NotFound(id))?;

        if task.status != TaskStatus::Processing {
            warn!(
                "Ignoring stale error report for task {} in status {}",
                id, task.status
            );
            return Ok(false);
        }

        let now = Utc::now().into();
        task.status = status;
        task.error = Some(message.to_string());
        task.updated_at = now;

        if status.is_terminal() {
            task.completed_at = Some(now);
        }

        self.repository.update(&task).await?;
        self.clear_cache(id).await;
        Ok(true)
    }

    /// 持久化一次重试排期
    ///
    /// 重试次数由RetryManager计算，这里负责写入持久层并刷新缓存
    ///
    /// # 参数
    ///
    /// * `id` - 任务ID
    /// * `retry_count` - 新的重试次数
    /// * `reason` - 触发重试的错误信息
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlTask)` - 更新后的任务
    /// * `Err(StatusError)` - 任务不存在、转换非法或持久化失败
    pub async fn apply_retry(
        &self,
        id: Uuid,
        retry_count: i32,
        reason: &str,
    ) -> Result<CrawlTask, StatusError> {
        let mut task = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(StatusError::NotFound(id))?;

        task.check_transition(TaskStatus::Retrying)?;

        task.status = TaskStatus::Retrying;
        task.retry_count = retry_count;
        task.error = Some(reason.to_string());
        task.updated_at = Utc::now().into();

        let updated = self.repository.update(&task).await?;
        self.refresh_cache(&updated).await;
        Ok(updated)
    }

    /// 将死信任务重置回初始可调度状态
    ///
    /// 显式地将重试次数清零并回到Pending，清除上一轮执行的
    /// 痕迹（错误、工作者、耗时与时间戳）
    ///
    /// # 参数
    ///
    /// * `id` - 任务ID
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlTask)` - 重置后的任务
    /// * `Err(StatusError)` - 任务不存在或持久化失败
    pub async fn reset_for_reprocess(&self, id: Uuid) -> Result<CrawlTask, StatusError> {
        let mut task = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(StatusError::NotFound(id))?;

        task.status = TaskStatus::Pending;
        task.retry_count = 0;
        task.error = None;
        task.worker_id = None;
        task.execution_time_ms = None;
        task.started_at = None;
        task.completed_at = None;
        task.updated_at = Utc::now().into();

        let updated = self.repository.update(&task).await?;
        self.refresh_cache(&updated).await;
        Ok(updated)
    }

    /// 分页过滤查询任务，按创建时间倒序
    ///
    /// # 返回值
    ///
    /// 返回当前页任务与总条数
    pub async fn list_tasks(
        &self,
        params: TaskQueryParams,
    ) -> Result<(Vec<CrawlTask>, u64), StatusError> {
        Ok(self.repository.query_tasks(params).await?)
    }

    /// 按状态查询任务，按创建时间正序，供清扫器批量消费
    pub async fn get_tasks_by_status(
        &self,
        status: TaskStatus,
        limit: u64,
    ) -> Result<Vec<CrawlTask>, StatusError> {
        Ok(self.repository.find_by_status(status, limit).await?)
    }

    /// 统计时间窗口内的任务指标
    pub async fn get_metrics(
        &self,
        from: chrono::DateTime<chrono::FixedOffset>,
        to: chrono::DateTime<chrono::FixedOffset>,
    ) -> Result<TaskMetrics, StatusError> {
        Ok(self.repository.aggregate_metrics(from, to).await?)
    }

    async fn refresh_cache(&self, task: &CrawlTask) {
        if let Err(e) = self.cache.refresh(task).await {
            warn!("Cache refresh failed for task {}: {}", task.id, e);
        }
    }

    async fn clear_cache(&self, id: Uuid) {
        if let Err(e) = self.cache.clear(id).await {
            warn!("Cache clear failed for task {}: {}", id, e);
        }
    }
}
