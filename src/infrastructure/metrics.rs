// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// 初始化指标系统
///
/// 安装Prometheus导出器并注册调度引擎的各项指标
pub fn init_metrics(listen_addr: &str) {
    let builder = PrometheusBuilder::new();

    match listen_addr.parse::<SocketAddr>() {
        Ok(addr) => {
            // Ignore error if address is already in use (for development/testing)
            if let Err(e) = builder.with_http_listener(addr).install() {
                tracing::warn!(
                    "Failed to install Prometheus recorder: {}. This might happen if the port is already in use.",
                    e
                );
            } else {
                info!("Metrics exporter listening on {}", addr);
            }
        }
        Err(e) => {
            tracing::warn!("Invalid metrics address {}: {}", listen_addr, e);
        }
    }

    describe_counter!(
        "scheduler_tasks_scheduled_total",
        "Total number of tasks admitted by the scheduler"
    );
    describe_counter!(
        "scheduler_tasks_dispatched_total",
        "Total number of tasks handed off to the worker pool"
    );
    describe_counter!(
        "scheduler_tasks_completed_total",
        "Total number of tasks completed"
    );
    describe_counter!(
        "scheduler_tasks_failed_total",
        "Total number of task execution failures reported"
    );
    describe_counter!(
        "scheduler_tasks_retried_total",
        "Total number of retries scheduled"
    );
    describe_counter!(
        "scheduler_tasks_dead_lettered_total",
        "Total number of tasks moved to the dead letter queue"
    );
    describe_histogram!(
        "scheduler_execution_time_seconds",
        "Execution time of completed tasks in seconds"
    );
}

/// 记录一次任务入队
pub fn record_task_scheduled() {
    counter!("scheduler_tasks_scheduled_total").increment(1);
}

/// 记录一次分发
pub fn record_task_dispatched() {
    counter!("scheduler_tasks_dispatched_total").increment(1);
}

/// 记录一次完成及其执行耗时
pub fn record_task_completed(execution_time_ms: i64) {
    counter!("scheduler_tasks_completed_total").increment(1);
    histogram!("scheduler_execution_time_seconds").record(execution_time_ms as f64 / 1000.0);
}

/// 记录一次执行失败
pub fn record_task_failed() {
    counter!("scheduler_tasks_failed_total").increment(1);
}

/// 记录一次重试排期
pub fn record_task_retried() {
    counter!("scheduler_tasks_retried_total").increment(1);
}

/// 记录一次死信
pub fn record_task_dead_lettered() {
    counter!("scheduler_tasks_dead_lettered_total").increment(1);
}
