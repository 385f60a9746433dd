// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Result;
use redis::AsyncCommands;

/// Redis客户端
///
/// 提供对Redis数据库的异步操作接口，覆盖缓存键值、
/// 队列列表与按分值排序集合三类操作
#[derive(Clone)]
pub struct RedisClient {
    /// Redis客户端
    client: redis::Client,
}

impl RedisClient {
    /// 创建新的Redis客户端实例
    ///
    /// # 参数
    ///
    /// * `redis_url` - Redis连接URL
    ///
    /// # 返回值
    ///
    /// * `Ok(RedisClient)` - Redis客户端实例
    /// * `Err(anyhow::Error)` - 创建过程中出现的错误
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// 获取指定键的值
    ///
    /// # 参数
    ///
    /// * `key` - 键
    ///
    /// # 返回值
    ///
    /// * `Ok(Option<String>)` - 键对应的值，如果不存在则返回None
    /// * `Err(anyhow::Error)` - 获取过程中出现的错误
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = con.get(key).await?;
        Ok(value)
    }

    /// 设置键值对并指定过期时间
    ///
    /// # 参数
    ///
    /// * `key` - 键
    /// * `value` - 值
    /// * `ttl_seconds` - 过期时间（秒）
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 设置成功
    /// * `Err(anyhow::Error)` - 设置过程中出现的错误
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: usize) -> Result<()> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        con.set_ex::<_, _, ()>(key, value, ttl_seconds as u64).await?;
        Ok(())
    }

    /// 删除指定键
    ///
    /// # 参数
    ///
    /// * `key` - 键
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 删除成功（键不存在也视为成功）
    /// * `Err(anyhow::Error)` - 删除过程中出现的错误
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        con.del::<_, ()>(key).await?;
        Ok(())
    }

    /// 向列表头部推入一个元素
    ///
    /// # 参数
    ///
    /// * `key` - 列表键
    /// * `value` - 元素值
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 推入成功
    /// * `Err(anyhow::Error)` - 推入过程中出现的错误
    pub async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        con.lpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    /// 阻塞地从列表尾部弹出一个元素
    ///
    /// 超时窗口内列表为空时返回None，弹出操作对并发消费者是原子的
    ///
    /// # 参数
    ///
    /// * `key` - 列表键
    /// * `timeout_secs` - 阻塞超时（秒），0表示无限等待
    ///
    /// # 返回值
    ///
    /// * `Ok(Option<String>)` - 弹出的元素，超时返回None
    /// * `Err(anyhow::Error)` - 弹出过程中出现的错误
    pub async fn brpop(&self, key: &str, timeout_secs: usize) -> Result<Option<String>> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let value: Option<(String, String)> = con.brpop(key, timeout_secs as f64).await?;
        Ok(value.map(|(_, v)| v))
    }

    /// 读取列表区间内的元素
    ///
    /// # 参数
    ///
    /// * `key` - 列表键
    /// * `start` - 起始下标
    /// * `stop` - 结束下标（含）
    ///
    /// # 返回值
    ///
    /// * `Ok(Vec<String>)` - 区间内的元素列表
    /// * `Err(anyhow::Error)` - 读取过程中出现的错误
    pub async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let values: Vec<String> = con.lrange(key, start, stop).await?;
        Ok(values)
    }

    /// 从列表中移除与给定值相等的元素
    ///
    /// # 参数
    ///
    /// * `key` - 列表键
    /// * `value` - 要移除的元素值
    ///
    /// # 返回值
    ///
    /// * `Ok(usize)` - 实际移除的元素个数
    /// * `Err(anyhow::Error)` - 移除过程中出现的错误
    pub async fn lrem(&self, key: &str, value: &str) -> Result<usize> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let removed: usize = con.lrem(key, 0, value).await?;
        Ok(removed)
    }

    /// 向有序集合插入成员
    ///
    /// # 参数
    ///
    /// * `key` - 有序集合键
    /// * `member` - 成员
    /// * `score` - 分值
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 插入成功
    /// * `Err(anyhow::Error)` - 插入过程中出现的错误
    pub async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        con.zadd::<_, _, _, ()>(key, member, score).await?;
        Ok(())
    }

    /// 读取分值不超过上限的成员
    ///
    /// # 参数
    ///
    /// * `key` - 有序集合键
    /// * `max_score` - 分值上限（含）
    /// * `limit` - 返回条数上限
    ///
    /// # 返回值
    ///
    /// * `Ok(Vec<String>)` - 按分值升序的成员列表
    /// * `Err(anyhow::Error)` - 读取过程中出现的错误
    pub async fn zrangebyscore(
        &self,
        key: &str,
        max_score: f64,
        limit: isize,
    ) -> Result<Vec<String>> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let members: Vec<String> = con
            .zrangebyscore_limit(key, f64::NEG_INFINITY, max_score, 0, limit)
            .await?;
        Ok(members)
    }

    /// 从有序集合移除成员
    ///
    /// 移除是原子的，返回值可用于在多个并发清扫器之间认领成员
    ///
    /// # 参数
    ///
    /// * `key` - 有序集合键
    /// * `member` - 成员
    ///
    /// # 返回值
    ///
    /// * `Ok(bool)` - 成员存在并被当前调用移除时返回true
    /// * `Err(anyhow::Error)` - 移除过程中出现的错误
    pub async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let removed: usize = con.zrem(key, member).await?;
        Ok(removed > 0)
    }
}
