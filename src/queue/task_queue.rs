// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::{CrawlTask, PriorityTier};
use crate::infrastructure::cache::redis_client::RedisClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 任务序列化/反序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Redis后端错误
    #[error(transparent)]
    Redis(#[from] anyhow::Error),
}

/// 任务队列特质
///
/// 定义队列存储的操作接口：每个优先级层级一个原子可弹出的
/// 列表、一个按到期时间排序的重试集合、一个死信列表，以及
/// 面向外部工作池的交接队列。所有操作对并发访问是原子的。
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 将任务推入指定层级队列
    async fn enqueue(&self, tier: PriorityTier, task: &CrawlTask) -> Result<(), QueueError>;

    /// 从指定层级队列弹出任务，阻塞至多timeout
    ///
    /// 弹出是破坏性的：同一任务实例不会被两个消费者同时取得
    async fn dequeue(
        &self,
        tier: PriorityTier,
        timeout: Duration,
    ) -> Result<Option<CrawlTask>, QueueError>;

    /// 将任务完整序列化后推入交接队列，供外部工作池消费
    async fn push_handoff(&self, task: &CrawlTask) -> Result<(), QueueError>;

    /// 将任务加入重试集合，按到期时刻排序
    async fn schedule_retry(&self, task_id: Uuid, due_at: DateTime<Utc>) -> Result<(), QueueError>;

    /// 原子认领所有已到期的重试条目
    ///
    /// 多个调度器实例并发清扫时，每个条目只会被一个实例认领
    async fn claim_due_retries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Uuid>, QueueError>;

    /// 将任务追加到死信列表
    async fn push_dead_letter(&self, task_id: Uuid) -> Result<(), QueueError>;

    /// 读取死信列表中的任务ID
    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<Uuid>, QueueError>;

    /// 从死信列表移除任务，返回是否确实存在并被移除
    async fn remove_dead_letter(&self, task_id: Uuid) -> Result<bool, QueueError>;
}

/// Redis任务队列实现
///
/// 层级队列与死信队列为Redis列表，重试集合为以到期秒数
/// 作为分值的有序集合，交接队列为单一FIFO列表。
#[derive(Clone)]
pub struct RedisTaskQueue {
    /// Redis客户端
    redis: RedisClient,
}

impl RedisTaskQueue {
    const HANDOFF_KEY: &'static str = "queue:handoff";
    const RETRY_KEY: &'static str = "queue:retry";
    const DEAD_LETTER_KEY: &'static str = "queue:dead_letter";

    /// 创建新的Redis任务队列实例
    ///
    /// # 参数
    ///
    /// * `redis` - Redis客户端
    ///
    /// # 返回值
    ///
    /// 返回新的Redis任务队列实例
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    fn tier_key(tier: PriorityTier) -> String {
        format!("queue:tasks:{}", tier)
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, tier: PriorityTier, task: &CrawlTask) -> Result<(), QueueError> {
        let payload = serde_json::to_string(task)?;
        self.redis.lpush(&Self::tier_key(tier), &payload).await?;
        Ok(())
    }

    async fn dequeue(
        &self,
        tier: PriorityTier,
        timeout: Duration,
    ) -> Result<Option<CrawlTask>, QueueError> {
        let raw = self
            .redis
            .brpop(&Self::tier_key(tier), timeout.as_secs().max(1) as usize)
            .await?;

        match raw {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn push_handoff(&self, task: &CrawlTask) -> Result<(), QueueError> {
        let payload = serde_json::to_string(task)?;
        self.redis.lpush(Self::HANDOFF_KEY, &payload).await?;
        Ok(())
    }

    async fn schedule_retry(&self, task_id: Uuid, due_at: DateTime<Utc>) -> Result<(), QueueError> {
        self.redis
            .zadd(
                Self::RETRY_KEY,
                &task_id.to_string(),
                due_at.timestamp_millis() as f64 / 1000.0,
            )
            .await?;
        Ok(())
    }

    async fn claim_due_retries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Uuid>, QueueError> {
        let due = self
            .redis
            .zrangebyscore(
                Self::RETRY_KEY,
                now.timestamp_millis() as f64 / 1000.0,
                limit as isize,
            )
            .await?;

        let mut claimed = Vec::with_capacity(due.len());
        for member in due {
            // ZREM是原子的：返回true表示该条目由当前实例认领
            if self.redis.zrem(Self::RETRY_KEY, &member).await? {
                if let Ok(id) = member.parse::<Uuid>() {
                    claimed.push(id);
                }
            }
        }

        Ok(claimed)
    }

    async fn push_dead_letter(&self, task_id: Uuid) -> Result<(), QueueError> {
        self.redis
            .lpush(Self::DEAD_LETTER_KEY, &task_id.to_string())
            .await?;
        Ok(())
    }

    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<Uuid>, QueueError> {
        let stop = if limit == 0 { -1 } else { limit as isize - 1 };
        let members = self.redis.lrange(Self::DEAD_LETTER_KEY, 0, stop).await?;

        Ok(members
            .into_iter()
            .filter_map(|m| m.parse::<Uuid>().ok())
            .collect())
    }

    async fn remove_dead_letter(&self, task_id: Uuid) -> Result<bool, QueueError> {
        let removed = self
            .redis
            .lrem(Self::DEAD_LETTER_KEY, &task_id.to_string())
            .await?;
        Ok(removed > 0)
    }
}

#[async_trait]
impl<T: TaskQueue + ?Sized> TaskQueue for Arc<T> {
    async fn enqueue(&self, tier: PriorityTier, task: &CrawlTask) -> Result<(), QueueError> {
        (**self).enqueue(tier, task).await
    }

    async fn dequeue(
        &self,
        tier: PriorityTier,
        timeout: Duration,
    ) -> Result<Option<CrawlTask>, QueueError> {
        (**self).dequeue(tier, timeout).await
    }

    async fn push_handoff(&self, task: &CrawlTask) -> Result<(), QueueError> {
        (**self).push_handoff(task).await
    }

    async fn schedule_retry(&self, task_id: Uuid, due_at: DateTime<Utc>) -> Result<(), QueueError> {
        (**self).schedule_retry(task_id, due_at).await
    }

    async fn claim_due_retries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Uuid>, QueueError> {
        (**self).claim_due_retries(now, limit).await
    }

    async fn push_dead_letter(&self, task_id: Uuid) -> Result<(), QueueError> {
        (**self).push_dead_letter(task_id).await
    }

    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<Uuid>, QueueError> {
        (**self).list_dead_letters(limit).await
    }

    async fn remove_dead_letter(&self, task_id: Uuid) -> Result<bool, QueueError> {
        (**self).remove_dead_letter(task_id).await
    }
}
