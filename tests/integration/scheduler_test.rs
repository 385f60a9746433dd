use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use uuid::Uuid;

use schedrs::domain::models::task::{CrawlTask, PriorityTier, TaskStatus};
use schedrs::domain::repositories::task_repository::{TaskQueryParams, TaskRepository};
use schedrs::queue::task_queue::TaskQueue;
use schedrs::utils::errors::SchedulerError;

use super::helpers::{build_context, submission};

#[tokio::test]
async fn test_validation_rejects_empty_fields() {
    let ctx = build_context();

    let mut sub = submission("https://a.example", None);
    sub.url = String::new();
    let err = ctx.scheduler.schedule_task(sub).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Validation(_)));

    let mut sub = submission("https://a.example", None);
    sub.platform = String::new();
    let err = ctx.scheduler.schedule_task(sub).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Validation(_)));

    let mut sub = submission("https://a.example", None);
    sub.session_id = String::new();
    let err = ctx.scheduler.schedule_task(sub).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Validation(_)));

    // 校验失败的任务绝不落库
    assert_eq!(ctx.repo.task_count(), 0);
}

#[tokio::test]
async fn test_admission_defaults() {
    let ctx = build_context();

    // 缺省优先级默认为普通层
    let id = ctx
        .scheduler
        .schedule_task(submission("https://a.example", None))
        .await
        .unwrap();
    let task = ctx.scheduler.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.priority, 2);
    assert_eq!(task.max_retries, 3);
    assert_eq!(task.status, TaskStatus::Queued);

    // 负优先级同样默认为普通层
    let id = ctx
        .scheduler
        .schedule_task(submission("https://b.example", Some(-5)))
        .await
        .unwrap();
    let task = ctx.scheduler.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.priority, 2);

    // 优先级0保留为实时层，不被默认值覆盖
    let id = ctx
        .scheduler
        .schedule_task(submission("https://c.example", Some(0)))
        .await
        .unwrap();
    let task = ctx.scheduler.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.priority, 0);
    assert_eq!(task.tier(), PriorityTier::Realtime);
}

#[tokio::test]
async fn test_caller_assigned_id_preserved() {
    let ctx = build_context();
    let caller_id = Uuid::new_v4();

    let mut sub = submission("https://a.example", None);
    sub.id = Some(caller_id);

    let id = ctx.scheduler.schedule_task(sub).await.unwrap();
    assert_eq!(id, caller_id);
    assert!(ctx.scheduler.get_task(caller_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_tier_mapping_and_destructive_dequeue() {
    let ctx = build_context();

    ctx.scheduler
        .schedule_task(submission("https://a.example", Some(0)))
        .await
        .unwrap();
    ctx.scheduler
        .schedule_task(submission("https://b.example", Some(5)))
        .await
        .unwrap();

    // 每个任务只出现在自己层级的队列中
    assert_eq!(ctx.queue.tier_len(PriorityTier::Realtime), 1);
    assert_eq!(ctx.queue.tier_len(PriorityTier::High), 0);
    assert_eq!(ctx.queue.tier_len(PriorityTier::Normal), 0);
    assert_eq!(ctx.queue.tier_len(PriorityTier::Low), 1);

    // 出队是破坏性的：同一实例不会被观察到两次
    let first = ctx
        .queue
        .dequeue(PriorityTier::Realtime, Duration::from_millis(10))
        .await
        .unwrap();
    assert!(first.is_some());
    let second = ctx
        .queue
        .dequeue(PriorityTier::Realtime, Duration::from_millis(10))
        .await
        .unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn test_dispatch_loop_hands_off_task() {
    let ctx = build_context();

    let id = ctx
        .scheduler
        .schedule_task(submission("https://a.example", Some(0)))
        .await
        .unwrap();

    ctx.scheduler.start();
    // 重复启动是无操作
    ctx.scheduler.start();

    // 等待分发循环取走任务并推入交接队列
    let mut handed_off = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if !ctx.queue.handoff_tasks().is_empty() {
            handed_off = true;
            break;
        }
    }
    assert!(handed_off, "task should reach the handoff queue");

    let task = ctx.scheduler.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Processing);
    assert!(task.started_at.is_some());
    assert!(task.worker_id.is_some());

    ctx.scheduler.stop().await;
    // 重复停止是无操作
    ctx.scheduler.stop().await;
}

#[tokio::test]
async fn test_list_tasks_pagination() {
    let ctx = build_context();

    for i in 0..5 {
        ctx.scheduler
            .schedule_task(submission(&format!("https://t{}.example", i), None))
            .await
            .unwrap();
    }

    let params = TaskQueryParams {
        page: 1,
        page_size: 2,
        ..Default::default()
    };
    let (page, total) = ctx.scheduler.list_tasks(params).await.unwrap();
    assert_eq!(total, 5);
    assert_eq!(page.len(), 2);

    let params = TaskQueryParams {
        page: 3,
        page_size: 2,
        ..Default::default()
    };
    let (page, _) = ctx.scheduler.list_tasks(params).await.unwrap();
    assert_eq!(page.len(), 1);
}

#[tokio::test]
async fn test_metrics_window_aggregation() {
    let ctx = build_context();
    let now = Utc::now().fixed_offset();

    // 窗口内10个任务：7个已完成（已知耗时），3个失败
    let times = [100i64, 200, 300, 400, 500, 600, 700];
    for (i, ms) in times.iter().enumerate() {
        let mut task = CrawlTask::new(
            Uuid::new_v4(),
            format!("https://done{}.example", i),
            "weibo".to_string(),
            "s1".to_string(),
        );
        task.status = TaskStatus::Completed;
        task.execution_time_ms = Some(*ms);
        ctx.repo.insert(&task).await.unwrap();
    }
    for i in 0..3 {
        let mut task = CrawlTask::new(
            Uuid::new_v4(),
            format!("https://failed{}.example", i),
            "weibo".to_string(),
            "s1".to_string(),
        );
        task.status = TaskStatus::Failed;
        ctx.repo.insert(&task).await.unwrap();
    }

    let metrics = ctx
        .scheduler
        .get_metrics(
            now - ChronoDuration::minutes(5),
            now + ChronoDuration::minutes(5),
        )
        .await
        .unwrap();

    assert_eq!(metrics.total, 10);
    assert_eq!(metrics.status_counts.get("completed"), Some(&7));
    assert_eq!(metrics.status_counts.get("failed"), Some(&3));
    assert_eq!(metrics.avg_execution_time_ms, Some(400.0));
    assert_eq!(metrics.min_execution_time_ms, Some(100));
    assert_eq!(metrics.max_execution_time_ms, Some(700));
}
