// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 是否启用抖动
    pub enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(3600),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            enable_jitter: false,
        }
    }
}

impl RetryPolicy {
    /// 计算第retry_count次重试的退避时间
    ///
    /// 退避时间为 initial_backoff × backoff_multiplier^retry_count，
    /// 并被限制在max_backoff以内；启用抖动时在结果上叠加
    /// ±jitter_factor比例的随机偏移
    ///
    /// # 参数
    ///
    /// * `retry_count` - 已重试次数（首次重试为0）
    ///
    /// # 返回值
    ///
    /// 返回本次重试应等待的时长
    pub fn calculate_backoff(&self, retry_count: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(retry_count as i32);

        // 限制最大退避时间
        let capped_backoff = backoff_secs.min(self.max_backoff.as_secs_f64());

        // 添加抖动
        let final_backoff = if self.enable_jitter {
            let jitter_range = capped_backoff * self.jitter_factor;
            let jitter = rand::random_range(-jitter_range..jitter_range);
            (capped_backoff + jitter).max(0.0)
        } else {
            capped_backoff
        };

        Duration::from_secs_f64(final_backoff)
    }

    /// 计算下次重试的到期时刻
    ///
    /// # 参数
    ///
    /// * `retry_count` - 已重试次数
    /// * `base_time` - 计算基准时刻
    ///
    /// # 返回值
    ///
    /// 返回重试到期时刻
    pub fn next_retry_time(&self, retry_count: u32, base_time: DateTime<Utc>) -> DateTime<Utc> {
        let backoff = self.calculate_backoff(retry_count);
        base_time + chrono::Duration::milliseconds(backoff.as_millis() as i64)
    }
}
