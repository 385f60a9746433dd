// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::{CrawlTask, TaskMetrics, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
}

/// 任务查询参数
///
/// 分页过滤查询的条件集合，所有过滤条件可选
#[derive(Debug, Default, Clone)]
pub struct TaskQueryParams {
    pub statuses: Option<Vec<TaskStatus>>,
    pub platform: Option<String>,
    pub session_id: Option<String>,
    pub priority: Option<i32>,
    pub created_after: Option<DateTime<FixedOffset>>,
    pub created_before: Option<DateTime<FixedOffset>>,
    /// 页码，从1开始
    pub page: u64,
    /// 每页条数
    pub page_size: u64,
}

/// 任务仓库特质
///
/// 定义任务的持久化访问接口，持久层是任务状态的唯一权威记录
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 插入新任务
    async fn insert(&self, task: &CrawlTask) -> Result<CrawlTask, RepositoryError>;
    /// 根据ID查找任务
    async fn find_by_id(&self, id: Uuid) -> Result<Option<CrawlTask>, RepositoryError>;
    /// 更新任务
    async fn update(&self, task: &CrawlTask) -> Result<CrawlTask, RepositoryError>;
    /// 分页过滤查询，按创建时间倒序，返回任务列表与总数
    async fn query_tasks(
        &self,
        params: TaskQueryParams,
    ) -> Result<(Vec<CrawlTask>, u64), RepositoryError>;
    /// 按状态查询，按创建时间正序，供批处理清扫器消费
    async fn find_by_status(
        &self,
        status: TaskStatus,
        limit: u64,
    ) -> Result<Vec<CrawlTask>, RepositoryError>;
    /// 对时间窗口内的任务做聚合统计
    async fn aggregate_metrics(
        &self,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> Result<TaskMetrics, RepositoryError>;
}
