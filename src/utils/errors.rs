// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::services::retry_manager::RetryError;
use crate::domain::services::status_manager::StatusError;
use crate::queue::task_queue::QueueError;

/// 调度器错误类型
///
/// 对外暴露的错误分类：校验失败在持久化前同步返回；准入错误
/// 表示任务已持久化但未入队（孤儿缺口，由对账清扫补偿）；
/// 其余为底层状态、重试与队列错误的透传。
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// 校验错误，任务未被持久化
    #[error("Validation error: {0}")]
    Validation(String),

    /// 准入错误，任务已持久化为Pending但未入队
    #[error("Admission error: task {task_id} persisted but not enqueued: {reason}")]
    Admission { task_id: Uuid, reason: String },

    /// 状态管理器错误
    #[error("Status error: {0}")]
    Status(#[from] StatusError),

    /// 重试管理器错误
    #[error("Retry error: {0}")]
    Retry(#[from] RetryError),

    /// 队列错误
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// 任务未找到
    #[error("Task {0} not found")]
    NotFound(Uuid),
}

/// Worker错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    /// 状态管理器错误
    #[error("Status error: {0}")]
    StatusError(String),

    /// 队列错误
    #[error("Queue error: {0}")]
    QueueError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}
