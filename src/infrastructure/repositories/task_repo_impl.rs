// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::{CrawlTask, TaskMetrics, TaskStatus};
use crate::domain::repositories::task_repository::{
    RepositoryError, TaskQueryParams, TaskRepository,
};
use crate::infrastructure::database::entities::task as task_entity;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// 任务仓库实现
///
/// 基于SeaORM实现的任务数据访问层
#[derive(Clone)]
pub struct TaskRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl TaskRepositoryImpl {
    /// 创建新的任务仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    ///
    /// # 返回值
    ///
    /// 返回新的任务仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<task_entity::Model> for CrawlTask {
    fn from(model: task_entity::Model) -> Self {
        Self {
            id: model.id,
            url: model.url,
            platform: model.platform,
            session_id: model.session_id,
            status: model.status.parse().unwrap_or_default(),
            priority: model.priority,
            retry_count: model.retry_count,
            max_retries: model.max_retries,
            worker_id: model.worker_id,
            execution_time_ms: model.execution_time_ms,
            result: model
                .result
                .and_then(|value| serde_json::from_value(value).ok()),
            error: model.error,
            metadata: serde_json::from_value(model.metadata).unwrap_or_default(),
            created_at: model.created_at,
            updated_at: model.updated_at,
            started_at: model.started_at,
            completed_at: model.completed_at,
        }
    }
}

impl From<CrawlTask> for task_entity::ActiveModel {
    fn from(task: CrawlTask) -> Self {
        Self {
            id: Set(task.id),
            url: Set(task.url.clone()),
            platform: Set(task.platform.clone()),
            session_id: Set(task.session_id.clone()),
            status: Set(task.status.to_string()),
            priority: Set(task.priority),
            retry_count: Set(task.retry_count),
            max_retries: Set(task.max_retries),
            worker_id: Set(task.worker_id.clone()),
            execution_time_ms: Set(task.execution_time_ms),
            result: Set(task
                .result
                .as_ref()
                .and_then(|r| serde_json::to_value(r).ok())),
            error: Set(task.error.clone()),
            metadata: Set(serde_json::to_value(&task.metadata)
                .unwrap_or_else(|_| serde_json::json!({}))),
            created_at: Set(task.created_at),
            updated_at: Set(task.updated_at),
            started_at: Set(task.started_at),
            completed_at: Set(task.completed_at),
        }
    }
}

#[async_trait]
impl TaskRepository for TaskRepositoryImpl {
    async fn insert(&self, task: &CrawlTask) -> Result<CrawlTask, RepositoryError> {
        let model: task_entity::ActiveModel = task.clone().into();

        model.insert(self.db.as_ref()).await?;
        Ok(task.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CrawlTask>, RepositoryError> {
        let model = task_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Into::into))
    }

    async fn update(&self, task: &CrawlTask) -> Result<CrawlTask, RepositoryError> {
        let model: task_entity::ActiveModel = task.clone().into();

        let updated_model = model.update(self.db.as_ref()).await?;
        Ok(updated_model.into())
    }

    async fn query_tasks(
        &self,
        params: TaskQueryParams,
    ) -> Result<(Vec<CrawlTask>, u64), RepositoryError> {
        let mut query = task_entity::Entity::find();

        if let Some(statuses) = &params.statuses {
            let values: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
            query = query.filter(task_entity::Column::Status.is_in(values));
        }

        if let Some(platform) = &params.platform {
            query = query.filter(task_entity::Column::Platform.eq(platform.clone()));
        }

        if let Some(session_id) = &params.session_id {
            query = query.filter(task_entity::Column::SessionId.eq(session_id.clone()));
        }

        if let Some(priority) = params.priority {
            query = query.filter(task_entity::Column::Priority.eq(priority));
        }

        if let Some(after) = params.created_after {
            query = query.filter(task_entity::Column::CreatedAt.gte(after));
        }

        if let Some(before) = params.created_before {
            query = query.filter(task_entity::Column::CreatedAt.lte(before));
        }

        let page_size = params.page_size.max(1);
        let page = params.page.max(1);

        let paginator = query
            .order_by_desc(task_entity::Column::CreatedAt)
            .paginate(self.db.as_ref(), page_size);

        let total = paginator.num_items().await?;
        let tasks = paginator.fetch_page(page - 1).await?;

        Ok((tasks.into_iter().map(Into::into).collect(), total))
    }

    async fn find_by_status(
        &self,
        status: TaskStatus,
        limit: u64,
    ) -> Result<Vec<CrawlTask>, RepositoryError> {
        let models = task_entity::Entity::find()
            .filter(task_entity::Column::Status.eq(status.to_string()))
            .order_by_asc(task_entity::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn aggregate_metrics(
        &self,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> Result<TaskMetrics, RepositoryError> {
        let counts: Vec<(String, i64)> = task_entity::Entity::find()
            .select_only()
            .column(task_entity::Column::Status)
            .column_as(task_entity::Column::Id.count(), "count")
            .filter(task_entity::Column::CreatedAt.gte(from))
            .filter(task_entity::Column::CreatedAt.lte(to))
            .group_by(task_entity::Column::Status)
            .into_tuple()
            .all(self.db.as_ref())
            .await?;

        let mut status_counts: HashMap<String, u64> = HashMap::new();
        let mut total: u64 = 0;
        for (status, count) in counts {
            let count = count.max(0) as u64;
            total += count;
            status_counts.insert(status, count);
        }

        let times: Vec<Option<i64>> = task_entity::Entity::find()
            .select_only()
            .column(task_entity::Column::ExecutionTimeMs)
            .filter(task_entity::Column::Status.eq(TaskStatus::Completed.to_string()))
            .filter(task_entity::Column::CreatedAt.gte(from))
            .filter(task_entity::Column::CreatedAt.lte(to))
            .into_tuple()
            .all(self.db.as_ref())
            .await?;

        let times: Vec<i64> = times.into_iter().flatten().collect();

        let (avg, min, max) = if times.is_empty() {
            (None, None, None)
        } else {
            let sum: i64 = times.iter().sum();
            (
                Some(sum as f64 / times.len() as f64),
                times.iter().min().copied(),
                times.iter().max().copied(),
            )
        };

        Ok(TaskMetrics {
            total,
            status_counts,
            avg_execution_time_ms: avg,
            min_execution_time_ms: min,
            max_execution_time_ms: max,
        })
    }
}
