// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use schedrs::config::settings::Settings;
use schedrs::domain::services::retry_manager::RetryManager;
use schedrs::domain::services::status_manager::StatusManager;
use schedrs::infrastructure::cache::redis_client::RedisClient;
use schedrs::infrastructure::cache::task_cache::{RedisTaskCache, TaskCache};
use schedrs::infrastructure::database::connection;
use schedrs::infrastructure::repositories::task_repo_impl::TaskRepositoryImpl;
use schedrs::queue::scheduler::TaskScheduler;
use schedrs::queue::task_queue::{RedisTaskQueue, TaskQueue};
use schedrs::infrastructure::database::schema;
use std::sync::Arc;
use tracing::info;

use schedrs::utils::telemetry;

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动调度器
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting schedrs...");

    // 2. Load configuration
    let settings = Settings::new()?;
    info!("Configuration loaded");

    // Initialize Prometheus Metrics
    schedrs::infrastructure::metrics::init_metrics(&settings.metrics.listen_addr);

    // 3. Connect to database
    let db = connection::create_pool(&settings.database).await?;
    let db = Arc::new(db);
    info!("Database connection established");

    // Ensure schema
    schema::ensure_schema(db.as_ref()).await?;
    info!("Database schema ready");

    // 4. Initialize Redis Client
    let redis_client = RedisClient::new(&settings.redis.url).await?;
    info!("Redis client initialized");

    // 5. Initialize Components
    let task_repo = Arc::new(TaskRepositoryImpl::new(db.clone()));
    let cache: Arc<dyn TaskCache> = Arc::new(RedisTaskCache::new(
        redis_client.clone(),
        settings.scheduler.cache_ttl_secs as usize,
    ));
    let queue: Arc<dyn TaskQueue> = Arc::new(RedisTaskQueue::new(redis_client.clone()));

    let status_manager = Arc::new(StatusManager::new(task_repo.clone(), cache));
    let retry_manager = Arc::new(RetryManager::new(
        status_manager.clone(),
        queue.clone(),
        settings.retry.to_policy(),
    ));

    // 6. Start Scheduler
    let scheduler = TaskScheduler::new(
        status_manager,
        retry_manager,
        queue,
        settings.scheduler.to_options(),
    );
    scheduler.start();

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler.stop().await;
    info!("schedrs stopped");

    Ok(())
}
