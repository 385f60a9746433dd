// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::domain::models::task::{
    CrawlResult, CrawlTask, TaskMetrics, TaskStatus,
};
use crate::domain::repositories::task_repository::TaskQueryParams;
use crate::domain::services::retry_manager::RetryManager;
use crate::domain::services::status_manager::StatusManager;
use crate::infrastructure::metrics;
use crate::queue::task_queue::TaskQueue;
use crate::utils::errors::SchedulerError;
use crate::workers::dispatch_worker::DispatchWorker;
use crate::workers::retry_worker::RetrySweepWorker;
use crate::workers::Worker;

/// 任务提交请求
///
/// 客户端提交新任务的契约：url、platform与sessionId必填且
/// 非空，priority与maxRetries可选，metadata为开放键值对
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSubmission {
    /// 任务标识，缺省时由调度器生成
    pub id: Option<Uuid>,
    /// 目标URL
    pub url: String,
    /// 平台标签
    pub platform: String,
    /// 会话标识符
    pub session_id: String,
    /// 优先级，0保留为实时，负值或缺省默认为普通层
    pub priority: Option<i32>,
    /// 最大重试次数，0或缺省时使用全局默认值
    pub max_retries: Option<i32>,
    /// 开放式元数据
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TaskSubmission {
    /// 校验提交请求
    ///
    /// url、platform与sessionId必须非空，url必须可解析
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 校验通过
    /// * `Err(SchedulerError)` - 校验失败，任务不会被持久化
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.url.trim().is_empty() {
            return Err(SchedulerError::Validation("url must not be empty".into()));
        }
        if self.platform.trim().is_empty() {
            return Err(SchedulerError::Validation(
                "platform must not be empty".into(),
            ));
        }
        if self.session_id.trim().is_empty() {
            return Err(SchedulerError::Validation(
                "sessionId must not be empty".into(),
            ));
        }
        Url::parse(&self.url)
            .map_err(|e| SchedulerError::Validation(format!("invalid url: {}", e)))?;
        Ok(())
    }
}

/// 调度器运行参数
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// 分发工作器数量
    pub dispatcher_count: usize,
    /// 全局默认最大重试次数
    pub default_max_retries: i32,
    /// 每层队列的有界阻塞弹出时长
    pub pop_timeout: Duration,
    /// 所有层级均为空时的退避时长
    pub idle_backoff: Duration,
    /// 重试清扫间隔
    pub sweep_interval: Duration,
    /// Pending孤儿任务的对账阈值
    pub pending_requeue_after: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            dispatcher_count: 4,
            default_max_retries: 3,
            pop_timeout: Duration::from_secs(1),
            idle_backoff: Duration::from_millis(500),
            sweep_interval: Duration::from_secs(30),
            pending_requeue_after: Duration::from_secs(300),
        }
    }
}

/// 运行中的后台循环句柄
struct SchedulerRuntime {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// 任务调度器
///
/// 调度引擎的编排入口：校验并准入新任务、启动/停止后台
/// 循环，并将查询与状态变更委托给状态管理器与重试管理器。
/// 调度器是注入了存储与队列客户端的普通实例，运行标志是
/// 仅在启动/停止期间持锁的实例状态。
pub struct TaskScheduler {
    status: Arc<StatusManager>,
    retry: Arc<RetryManager>,
    queue: Arc<dyn TaskQueue>,
    options: SchedulerOptions,
    runtime: Mutex<Option<SchedulerRuntime>>,
}

impl TaskScheduler {
    /// 创建新的任务调度器实例
    ///
    /// # 参数
    ///
    /// * `status` - 状态管理器
    /// * `retry` - 重试管理器
    /// * `queue` - 任务队列
    /// * `options` - 运行参数
    ///
    /// # 返回值
    ///
    /// 返回新的任务调度器实例
    pub fn new(
        status: Arc<StatusManager>,
        retry: Arc<RetryManager>,
        queue: Arc<dyn TaskQueue>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            status,
            retry,
            queue,
            options,
            runtime: Mutex::new(None),
        }
    }

    /// 校验并准入一个新任务
    ///
    /// 校验失败同步返回且不持久化。准入顺序为：持久化Pending →
    /// 推入层级队列 → 置状态Queued。入队失败时任务以Pending
    /// 孤儿形式留在持久层，由对账清扫补偿（持久化与入队之间
    /// 不存在分布式事务，这是设计接受的唯一一致性缺口）。
    ///
    /// # 参数
    ///
    /// * `submission` - 任务提交请求
    ///
    /// # 返回值
    ///
    /// * `Ok(Uuid)` - 准入成功的任务标识
    /// * `Err(SchedulerError)` - 校验失败、准入失败或持久化失败
    pub async fn schedule_task(&self, submission: TaskSubmission) -> Result<Uuid, SchedulerError> {
        submission.validate()?;

        let mut task = CrawlTask::new(
            submission.id.unwrap_or_else(Uuid::new_v4),
            submission.url,
            submission.platform,
            submission.session_id,
        );

        // 优先级0保留为实时层，负值或缺省默认为普通层
        task.priority = match submission.priority {
            Some(p) if p >= 0 => p,
            _ => 2,
        };
        task.max_retries = match submission.max_retries {
            Some(m) if m > 0 => m,
            _ => self.options.default_max_retries,
        };
        task.metadata = submission.metadata;

        let task = self.status.create_task(&task).await?;

        if let Err(e) = self.queue.enqueue(task.tier(), &task).await {
            error!("Enqueueing task {} failed after persistence: {}", task.id, e);
            return Err(SchedulerError::Admission {
                task_id: task.id,
                reason: e.to_string(),
            });
        }

        self.status
            .update_status(task.id, TaskStatus::Queued, None)
            .await?;

        metrics::record_task_scheduled();
        info!(
            "Task {} admitted on {} tier (priority {})",
            task.id,
            task.tier(),
            task.priority
        );
        Ok(task.id)
    }

    /// 启动调度器
    ///
    /// 幂等：重复启动是无操作。启动固定数量的分发循环加一个
    /// 重试清扫循环，全部由同一个取消令牌协调。
    pub fn start(&self) {
        let mut runtime = self.runtime.lock();
        if runtime.is_some() {
            warn!("Task scheduler already running");
            return;
        }

        let token = CancellationToken::new();
        let mut handles = Vec::with_capacity(self.options.dispatcher_count + 1);

        for i in 0..self.options.dispatcher_count {
            let worker = DispatchWorker::new(
                self.status.clone(),
                self.retry.clone(),
                self.queue.clone(),
                format!("dispatcher-{}", i),
                self.options.pop_timeout,
                self.options.idle_backoff,
            );
            handles.push(Self::spawn_worker(worker, token.clone()));
        }

        let pending_requeue_after = chrono::Duration::from_std(self.options.pending_requeue_after)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let sweep = RetrySweepWorker::new(
            self.retry.clone(),
            self.status.clone(),
            self.queue.clone(),
            self.options.sweep_interval,
            pending_requeue_after,
        );
        handles.push(Self::spawn_worker(sweep, token.clone()));

        *runtime = Some(SchedulerRuntime { token, handles });
        info!(
            "Task scheduler started with {} dispatch workers",
            self.options.dispatcher_count
        );
    }

    /// 停止调度器
    ///
    /// 幂等：未启动时是无操作。触发共享取消信号并等待所有
    /// 进程内循环退出；已推入交接队列的任务不被等待。
    pub async fn stop(&self) {
        let runtime = self.runtime.lock().take();
        let Some(runtime) = runtime else {
            warn!("Task scheduler is not running");
            return;
        };

        runtime.token.cancel();
        for handle in runtime.handles {
            if let Err(e) = handle.await {
                error!("Worker task join failed: {}", e);
            }
        }

        info!("Task scheduler stopped");
    }

    fn spawn_worker<W: Worker + 'static>(worker: W, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let name = worker.name().to_string();
            if let Err(e) = worker.run(token).await {
                error!("Worker {} exited with error: {}", name, e);
            }
        })
    }

    /// 根据ID获取任务
    pub async fn get_task(&self, id: Uuid) -> Result<Option<CrawlTask>, SchedulerError> {
        Ok(self.status.get_task(id).await?)
    }

    /// 分页过滤查询任务，按创建时间倒序
    pub async fn list_tasks(
        &self,
        params: TaskQueryParams,
    ) -> Result<(Vec<CrawlTask>, u64), SchedulerError> {
        Ok(self.status.list_tasks(params).await?)
    }

    /// 更新任务状态
    pub async fn update_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        worker_id: Option<String>,
    ) -> Result<CrawlTask, SchedulerError> {
        Ok(self.status.update_status(id, status, worker_id).await?)
    }

    /// 接收外部工作者的成功上报
    ///
    /// # 参数
    ///
    /// * `id` - 任务ID
    /// * `result` - 爬取结果
    /// * `execution_time_ms` - 执行耗时（毫秒）
    /// * `worker_id` - 上报的工作者标识
    pub async fn report_result(
        &self,
        id: Uuid,
        result: CrawlResult,
        execution_time_ms: i64,
        worker_id: &str,
    ) -> Result<(), SchedulerError> {
        self.status
            .update_result(id, result, execution_time_ms, worker_id)
            .await?;
        Ok(())
    }

    /// 接收外部工作者的失败上报
    ///
    /// 剩余重试额度时排期延迟重试，否则转入终态并投放死信
    /// 队列。已离开Processing状态的任务的迟到上报按无操作
    /// 处理。
    ///
    /// # 参数
    ///
    /// * `id` - 任务ID
    /// * `error_message` - 失败原因
    pub async fn report_failure(
        &self,
        id: Uuid,
        error_message: &str,
    ) -> Result<(), SchedulerError> {
        let task = self
            .status
            .get_task(id)
            .await?
            .ok_or(SchedulerError::NotFound(id))?;

        if task.status != TaskStatus::Processing {
            warn!(
                "Ignoring stale failure report for task {} in status {}",
                id, task.status
            );
            return Ok(());
        }

        self.retry.handle_failure(&task, error_message).await?;
        Ok(())
    }

    /// 更新任务错误信息
    pub async fn update_error(
        &self,
        id: Uuid,
        message: &str,
        status: TaskStatus,
    ) -> Result<(), SchedulerError> {
        self.status.update_error(id, message, status).await?;
        Ok(())
    }

    /// 统计时间窗口内的任务指标
    pub async fn get_metrics(
        &self,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> Result<TaskMetrics, SchedulerError> {
        Ok(self.status.get_metrics(from, to).await?)
    }

    /// 读取死信队列中的任务
    pub async fn get_dead_letter_tasks(
        &self,
        limit: usize,
    ) -> Result<Vec<CrawlTask>, SchedulerError> {
        Ok(self.retry.get_dead_letter_tasks(limit).await?)
    }

    /// 重新处理一个死信任务
    pub async fn reprocess_dead_letter_task(&self, id: Uuid) -> Result<CrawlTask, SchedulerError> {
        Ok(self.retry.reprocess_dead_letter_task(id).await?)
    }

    /// 手动触发一次重试
    pub async fn retry_task(&self, id: Uuid) -> Result<(), SchedulerError> {
        Ok(self.retry.retry_task(id).await?)
    }
}
