// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::domain::models::task::CrawlTask;
use crate::infrastructure::cache::redis_client::RedisClient;

/// 任务状态缓存特质
///
/// 短TTL读缓存的抽象，只作为读性能优化，持久层始终是任务
/// 状态的权威来源。条目在TTL内未被写操作刷新或清除时自然
/// 过期。
#[async_trait]
pub trait TaskCache: Send + Sync {
    /// 读取缓存中的任务，反序列化失败按未命中处理
    async fn get(&self, task_id: Uuid) -> Result<Option<CrawlTask>>;

    /// 写入或原地刷新缓存条目
    async fn refresh(&self, task: &CrawlTask) -> Result<()>;

    /// 清除缓存条目，强制下一次读取回源持久层
    async fn clear(&self, task_id: Uuid) -> Result<()>;
}

/// Redis任务缓存实现
#[derive(Clone)]
pub struct RedisTaskCache {
    redis: RedisClient,
    ttl_seconds: usize,
}

impl RedisTaskCache {
    /// 创建新的Redis任务缓存实例
    ///
    /// # 参数
    ///
    /// * `redis` - Redis客户端
    /// * `ttl_seconds` - 缓存条目的存活时间（秒）
    pub fn new(redis: RedisClient, ttl_seconds: usize) -> Self {
        Self { redis, ttl_seconds }
    }

    fn cache_key(task_id: Uuid) -> String {
        format!("task:cache:{}", task_id)
    }
}

#[async_trait]
impl TaskCache for RedisTaskCache {
    async fn get(&self, task_id: Uuid) -> Result<Option<CrawlTask>> {
        let raw = self.redis.get(&Self::cache_key(task_id)).await?;
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    async fn refresh(&self, task: &CrawlTask) -> Result<()> {
        let payload = serde_json::to_string(task)?;
        self.redis
            .set(&Self::cache_key(task.id), &payload, self.ttl_seconds)
            .await
    }

    async fn clear(&self, task_id: Uuid) -> Result<()> {
        self.redis.delete(&Self::cache_key(task_id)).await
    }
}

/// 缓存条目
#[derive(Clone)]
struct CacheEntry {
    task: CrawlTask,
    created_at: Instant,
}

/// 内存任务缓存实现
///
/// 单进程部署与测试场景使用，TTL语义与Redis实现一致
pub struct MemoryTaskCache {
    entries: DashMap<Uuid, CacheEntry>,
    ttl: Duration,
}

impl MemoryTaskCache {
    /// 创建新的内存任务缓存实例
    ///
    /// # 参数
    ///
    /// * `ttl` - 缓存条目的存活时间
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }
}

#[async_trait]
impl TaskCache for MemoryTaskCache {
    async fn get(&self, task_id: Uuid) -> Result<Option<CrawlTask>> {
        if let Some(entry) = self.entries.get(&task_id) {
            if entry.created_at.elapsed() <= self.ttl {
                return Ok(Some(entry.task.clone()));
            }
        }

        // 过期条目延迟清理
        self.entries
            .remove_if(&task_id, |_, entry| entry.created_at.elapsed() > self.ttl);
        Ok(None)
    }

    async fn refresh(&self, task: &CrawlTask) -> Result<()> {
        self.entries.insert(
            task.id,
            CacheEntry {
                task: task.clone(),
                created_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn clear(&self, task_id: Uuid) -> Result<()> {
        self.entries.remove(&task_id);
        Ok(())
    }
}
