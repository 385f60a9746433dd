// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::queue::scheduler::SchedulerOptions;
use crate::utils::retry_policy::RetryPolicy;

/// 应用程序配置设置
///
/// 包含数据库、Redis、调度器、重试与指标等所有配置项
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// Redis配置
    pub redis: RedisSettings,
    /// 调度器配置
    pub scheduler: SchedulerSettings,
    /// 重试退避配置
    pub retry: RetrySettings,
    /// 指标导出配置
    pub metrics: MetricsSettings,
}

/// 数据库配置设置
#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

/// Redis配置设置
#[derive(Debug, Deserialize)]
pub struct RedisSettings {
    /// Redis连接URL
    pub url: String,
}

/// 调度器配置设置
#[derive(Debug, Deserialize)]
pub struct SchedulerSettings {
    /// 分发工作器数量
    pub dispatcher_count: usize,
    /// 全局默认最大重试次数
    pub default_max_retries: i32,
    /// 每层队列的有界阻塞弹出时长（秒）
    pub pop_timeout_secs: u64,
    /// 所有层级均为空时的退避时长（毫秒）
    pub idle_backoff_ms: u64,
    /// 任务读缓存TTL（秒）
    pub cache_ttl_secs: u64,
    /// 重试清扫间隔（秒）
    pub sweep_interval_secs: u64,
    /// Pending孤儿任务的对账阈值（秒）
    pub pending_requeue_after_secs: u64,
}

impl SchedulerSettings {
    /// 转换为调度器运行参数
    pub fn to_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            dispatcher_count: self.dispatcher_count,
            default_max_retries: self.default_max_retries,
            pop_timeout: Duration::from_secs(self.pop_timeout_secs),
            idle_backoff: Duration::from_millis(self.idle_backoff_ms),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            pending_requeue_after: Duration::from_secs(self.pending_requeue_after_secs),
        }
    }
}

/// 重试退避配置设置
#[derive(Debug, Deserialize)]
pub struct RetrySettings {
    /// 初始退避时间（秒）
    pub initial_backoff_secs: u64,
    /// 最大退避时间（秒）
    pub max_backoff_secs: u64,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 是否启用抖动
    pub enable_jitter: bool,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
}

impl RetrySettings {
    /// 转换为重试策略
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_secs(self.initial_backoff_secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
            enable_jitter: self.enable_jitter,
        }
    }
}

/// 指标导出配置设置
#[derive(Debug, Deserialize)]
pub struct MetricsSettings {
    /// Prometheus导出器监听地址
    pub listen_addr: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从环境变量加载配置，支持默认值
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Start with default settings
            .set_default("database.url", "postgres://localhost/schedrs")?
            .set_default("database.max_connections", 100)?
            .set_default("database.min_connections", 10)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            // Default Redis settings
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            // Default Scheduler settings
            .set_default("scheduler.dispatcher_count", 4)?
            .set_default("scheduler.default_max_retries", 3)?
            .set_default("scheduler.pop_timeout_secs", 1)?
            .set_default("scheduler.idle_backoff_ms", 500)?
            .set_default("scheduler.cache_ttl_secs", 300)?
            .set_default("scheduler.sweep_interval_secs", 30)?
            .set_default("scheduler.pending_requeue_after_secs", 300)?
            // Default Retry settings
            .set_default("retry.initial_backoff_secs", 30)?
            .set_default("retry.max_backoff_secs", 3600)?
            .set_default("retry.backoff_multiplier", 2.0)?
            .set_default("retry.enable_jitter", false)?
            .set_default("retry.jitter_factor", 0.1)?
            // Default Metrics settings
            .set_default("metrics.listen_addr", "0.0.0.0:9000")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("SCHEDRS").separator("__"));

        builder.build()?.try_deserialize()
    }
}
