// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::DbErr;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use schedrs::domain::models::task::{CrawlTask, PriorityTier, TaskMetrics, TaskStatus};
use schedrs::domain::repositories::task_repository::{
    RepositoryError, TaskQueryParams, TaskRepository,
};
use schedrs::domain::services::retry_manager::RetryManager;
use schedrs::domain::services::status_manager::StatusManager;
use schedrs::infrastructure::cache::task_cache::{MemoryTaskCache, TaskCache};
use schedrs::queue::scheduler::{SchedulerOptions, TaskScheduler, TaskSubmission};
use schedrs::queue::task_queue::{QueueError, TaskQueue};
use schedrs::utils::retry_policy::RetryPolicy;

/// In-memory task repository standing in for the durable store.
#[derive(Default)]
pub struct MockTaskRepository {
    tasks: Mutex<HashMap<Uuid, CrawlTask>>,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn insert(&self, task: &CrawlTask) -> Result<CrawlTask, RepositoryError> {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.contains_key(&task.id) {
            return Err(RepositoryError::Database(DbErr::Custom(format!(
                "duplicate id {}",
                task.id
            ))));
        }
        tasks.insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CrawlTask>, RepositoryError> {
        Ok(self.tasks.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, task: &CrawlTask) -> Result<CrawlTask, RepositoryError> {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.contains_key(&task.id) {
            return Err(RepositoryError::NotFound);
        }
        tasks.insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn query_tasks(
        &self,
        params: TaskQueryParams,
    ) -> Result<(Vec<CrawlTask>, u64), RepositoryError> {
        let tasks = self.tasks.lock().unwrap();
        let mut matched: Vec<CrawlTask> = tasks
            .values()
            .filter(|t| {
                params
                    .statuses
                    .as_ref()
                    .is_none_or(|s| s.contains(&t.status))
                    && params.platform.as_ref().is_none_or(|p| &t.platform == p)
                    && params
                        .session_id
                        .as_ref()
                        .is_none_or(|s| &t.session_id == s)
                    && params.priority.is_none_or(|p| t.priority == p)
                    && params.created_after.is_none_or(|a| t.created_at >= a)
                    && params.created_before.is_none_or(|b| t.created_at <= b)
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matched.len() as u64;

        let page_size = params.page_size.max(1) as usize;
        let page = params.page.max(1) as usize;
        let start = (page - 1) * page_size;
        let page_items = matched.into_iter().skip(start).take(page_size).collect();

        Ok((page_items, total))
    }

    async fn find_by_status(
        &self,
        status: TaskStatus,
        limit: u64,
    ) -> Result<Vec<CrawlTask>, RepositoryError> {
        let tasks = self.tasks.lock().unwrap();
        let mut matched: Vec<CrawlTask> = tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();

        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matched.truncate(limit as usize);
        Ok(matched)
    }

    async fn aggregate_metrics(
        &self,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> Result<TaskMetrics, RepositoryError> {
        let tasks = self.tasks.lock().unwrap();
        let in_window: Vec<&CrawlTask> = tasks
            .values()
            .filter(|t| t.created_at >= from && t.created_at <= to)
            .collect();

        let mut status_counts: HashMap<String, u64> = HashMap::new();
        for task in &in_window {
            *status_counts.entry(task.status.to_string()).or_insert(0) += 1;
        }

        let times: Vec<i64> = in_window
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .filter_map(|t| t.execution_time_ms)
            .collect();

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
            total: in_window.len() as u64,
            status_counts,
            avg_execution_time_ms: avg,
            min_execution_time_ms: min,
            max_execution_time_ms: max,
        })
    }
}

/// In-memory queue store standing in for redis.
#[derive(Default)]
pub struct MockTaskQueue {
    tiers: Mutex<HashMap<PriorityTier, VecDeque<CrawlTask>>>,
    handoff: Mutex<Vec<CrawlTask>>,
    retries: Mutex<Vec<(Uuid, DateTime<Utc>)>>,
    dead_letters: Mutex<Vec<Uuid>>,
}

impl MockTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tier_len(&self, tier: PriorityTier) -> usize {
        self.tiers
            .lock()
            .unwrap()
            .get(&tier)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    pub fn handoff_tasks(&self) -> Vec<CrawlTask> {
        self.handoff.lock().unwrap().clone()
    }

    pub fn retry_entries(&self) -> Vec<(Uuid, DateTime<Utc>)> {
        self.retries.lock().unwrap().clone()
    }

    pub fn dead_letter_ids(&self) -> Vec<Uuid> {
        self.dead_letters.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskQueue for MockTaskQueue {
    async fn enqueue(&self, tier: PriorityTier, task: &CrawlTask) -> Result<(), QueueError> {
        self.tiers
            .lock()
            .unwrap()
            .entry(tier)
            .or_default()
            .push_front(task.clone());
        Ok(())
    }

    async fn dequeue(
        &self,
        tier: PriorityTier,
        _timeout: Duration,
    ) -> Result<Option<CrawlTask>, QueueError> {
        Ok(self
            .tiers
            .lock()
            .unwrap()
            .get_mut(&tier)
            .and_then(|q| q.pop_back()))
    }

    async fn push_handoff(&self, task: &CrawlTask) -> Result<(), QueueError> {
        self.handoff.lock().unwrap().push(task.clone());
        Ok(())
    }

    async fn schedule_retry(&self, task_id: Uuid, due_at: DateTime<Utc>) -> Result<(), QueueError> {
        self.retries.lock().unwrap().push((task_id, due_at));
        Ok(())
    }

    async fn claim_due_retries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Uuid>, QueueError> {
        let mut retries = self.retries.lock().unwrap();
        let mut claimed = Vec::new();
        let mut remaining = Vec::new();

        for (id, due) in retries.drain(..) {
            if due <= now && claimed.len() < limit {
                claimed.push(id);
            } else {
                remaining.push((id, due));
            }
        }

        *retries = remaining;
        Ok(claimed)
    }

    async fn push_dead_letter(&self, task_id: Uuid) -> Result<(), QueueError> {
        self.dead_letters.lock().unwrap().push(task_id);
        Ok(())
    }

    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<Uuid>, QueueError> {
        let ids = self.dead_letters.lock().unwrap();
        let take = if limit == 0 { ids.len() } else { limit };
        Ok(ids.iter().take(take).copied().collect())
    }

    async fn remove_dead_letter(&self, task_id: Uuid) -> Result<bool, QueueError> {
        let mut ids = self.dead_letters.lock().unwrap();
        if let Some(pos) = ids.iter().position(|id| *id == task_id) {
            ids.remove(pos);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Assembled scheduling engine over the in-memory stores.
pub struct TestContext {
    pub repo: Arc<MockTaskRepository>,
    pub queue: Arc<MockTaskQueue>,
    pub status: Arc<StatusManager>,
    pub retry: Arc<RetryManager>,
    pub scheduler: TaskScheduler,
}

/// Builds a context with retries due immediately so sweeps can run
/// without waiting out real backoff delays.
pub fn build_context() -> TestContext {
    build_context_with_policy(RetryPolicy {
        initial_backoff: Duration::ZERO,
        max_backoff: Duration::from_secs(1),
        backoff_multiplier: 2.0,
        jitter_factor: 0.1,
        enable_jitter: false,
    })
}

pub fn build_context_with_policy(policy: RetryPolicy) -> TestContext {
    let repo = Arc::new(MockTaskRepository::new());
    let queue = Arc::new(MockTaskQueue::new());
    let cache: Arc<dyn TaskCache> = Arc::new(MemoryTaskCache::new(Duration::from_secs(300)));

    let status = Arc::new(StatusManager::new(repo.clone(), cache));
    let retry = Arc::new(RetryManager::new(
        status.clone(),
        queue.clone() as Arc<dyn TaskQueue>,
        policy,
    ));

    let options = SchedulerOptions {
        dispatcher_count: 1,
        default_max_retries: 3,
        pop_timeout: Duration::from_millis(10),
        idle_backoff: Duration::from_millis(10),
        sweep_interval: Duration::from_millis(50),
        pending_requeue_after: Duration::from_secs(300),
    };

    let scheduler = TaskScheduler::new(
        status.clone(),
        retry.clone(),
        queue.clone() as Arc<dyn TaskQueue>,
        options,
    );

    TestContext {
        repo,
        queue,
        status,
        retry,
        scheduler,
    }
}

/// A valid submission for the given url and priority.
pub fn submission(url: &str, priority: Option<i32>) -> TaskSubmission {
    TaskSubmission {
        id: None,
        url: url.to_string(),
        platform: "weibo".to_string(),
        session_id: "s1".to_string(),
        priority,
        max_retries: None,
        metadata: HashMap::new(),
    }
}
