use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use schedrs::domain::models::task::{CrawlResult, CrawlTask, TaskStatus};
use schedrs::domain::repositories::task_repository::TaskRepository;

use super::helpers::{build_context, submission};

fn sample_result() -> CrawlResult {
    CrawlResult {
        title: "title".to_string(),
        content: "content".to_string(),
        author: "author".to_string(),
        publish_time: None,
        tags: vec!["tag".to_string()],
        images: vec![],
        links: vec![],
    }
}

#[tokio::test]
async fn test_result_write_visible_on_next_read() {
    let ctx = build_context();

    let id = ctx
        .scheduler
        .schedule_task(submission("https://a.example", None))
        .await
        .unwrap();

    // 预热缓存
    let cached = ctx.scheduler.get_task(id).await.unwrap().unwrap();
    assert_eq!(cached.status, TaskStatus::Queued);

    ctx.status
        .update_status(id, TaskStatus::Processing, Some("worker-1".to_string()))
        .await
        .unwrap();

    let applied = ctx
        .status
        .update_result(id, sample_result(), 1234, "worker-1")
        .await
        .unwrap();
    assert!(applied);

    // 终态写入清除缓存：紧随其后的读取必须取得新值，
    // 即使此前的缓存TTL（300秒）远未到期
    let task = ctx.scheduler.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.execution_time_ms, Some(1234));
    assert!(task.completed_at.is_some());
    let result = task.result.expect("result should be attached");
    assert_eq!(result.title, "title");
}

#[tokio::test]
async fn test_result_report_for_non_processing_task_is_noop() {
    let ctx = build_context();

    let id = ctx
        .scheduler
        .schedule_task(submission("https://a.example", None))
        .await
        .unwrap();

    // 任务仍在Queued，成功上报被忽略
    let applied = ctx
        .status
        .update_result(id, sample_result(), 100, "worker-1")
        .await
        .unwrap();
    assert!(!applied);

    let task = ctx.scheduler.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
    assert!(task.result.is_none());
}

#[tokio::test]
async fn test_result_report_from_wrong_worker_is_noop() {
    let ctx = build_context();

    let id = ctx
        .scheduler
        .schedule_task(submission("https://a.example", None))
        .await
        .unwrap();
    ctx.status
        .update_status(id, TaskStatus::Processing, Some("worker-1".to_string()))
        .await
        .unwrap();

    let applied = ctx
        .status
        .update_result(id, sample_result(), 100, "worker-2")
        .await
        .unwrap();
    assert!(!applied);

    let task = ctx.scheduler.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Processing);
    assert_eq!(task.worker_id.as_deref(), Some("worker-1"));
}

#[tokio::test]
async fn test_update_error_sets_completed_at_only_for_terminal() {
    let ctx = build_context();

    let id = ctx
        .scheduler
        .schedule_task(submission("https://a.example", None))
        .await
        .unwrap();
    ctx.status
        .update_status(id, TaskStatus::Processing, Some("worker-1".to_string()))
        .await
        .unwrap();

    let applied = ctx
        .status
        .update_error(id, "transient", TaskStatus::Retrying)
        .await
        .unwrap();
    assert!(applied);
    let task = ctx.scheduler.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Retrying);
    assert!(task.completed_at.is_none());

    // 回到Processing后写终态错误
    ctx.status
        .update_status(id, TaskStatus::Queued, None)
        .await
        .unwrap();
    ctx.status
        .update_status(id, TaskStatus::Processing, None)
        .await
        .unwrap();
    let applied = ctx
        .status
        .update_error(id, "fatal", TaskStatus::Failed)
        .await
        .unwrap();
    assert!(applied);
    let task = ctx.scheduler.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.completed_at.is_some());
    assert_eq!(task.error.as_deref(), Some("fatal"));
}

#[tokio::test]
async fn test_invalid_transition_rejected() {
    let ctx = build_context();

    let mut task = CrawlTask::new(
        Uuid::new_v4(),
        "https://a.example".to_string(),
        "weibo".to_string(),
        "s1".to_string(),
    );
    task.status = TaskStatus::Pending;
    ctx.repo.insert(&task).await.unwrap();

    // Pending不能跳过Queued直接进入Processing
    let err = ctx
        .status
        .update_status(task.id, TaskStatus::Processing, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        schedrs::domain::services::status_manager::StatusError::Domain(_)
    ));
}

#[tokio::test]
async fn test_get_tasks_by_status_oldest_first() {
    let ctx = build_context();
    let base = Utc::now().fixed_offset();

    for i in 0..3 {
        let mut task = CrawlTask::new(
            Uuid::new_v4(),
            format!("https://t{}.example", i),
            "weibo".to_string(),
            "s1".to_string(),
        );
        // 逆序创建时间，验证返回按创建时间正序
        task.created_at = base - ChronoDuration::minutes(i);
        ctx.repo.insert(&task).await.unwrap();
    }

    let pending = ctx
        .status
        .get_tasks_by_status(TaskStatus::Pending, 10)
        .await
        .unwrap();
    assert_eq!(pending.len(), 3);
    assert!(pending.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

#[tokio::test]
async fn test_pending_reconciliation_requeues_orphans() {
    // 准入缺口：持久化成功但未入队的Pending孤儿由对账清扫补偿
    let ctx = build_context();

    let mut task = CrawlTask::new(
        Uuid::new_v4(),
        "https://orphan.example".to_string(),
        "weibo".to_string(),
        "s1".to_string(),
    );
    task.created_at = Utc::now().fixed_offset() - ChronoDuration::minutes(30);
    ctx.repo.insert(&task).await.unwrap();

    ctx.scheduler.start();

    let mut requeued = false;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let current = ctx.scheduler.get_task(task.id).await.unwrap().unwrap();
        // 清扫重新入队后，分发器可能已经将其标记为Processing
        if current.status != TaskStatus::Pending {
            requeued = true;
            break;
        }
    }
    ctx.scheduler.stop().await;

    assert!(requeued, "orphaned pending task should be requeued by sweep");
}
