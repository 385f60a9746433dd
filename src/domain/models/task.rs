// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 爬取任务实体
///
/// 表示系统中一个待调度的爬取工作单元。任务由客户端提交，
/// 经过校验和默认值填充后持久化，再按优先级分层排队，
/// 由分发器交给外部执行工作池处理。任务具有状态、优先级、
/// 重试机制和结果记录等属性。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTask {
    /// 任务唯一标识符，创建后不可变
    pub id: Uuid,
    /// 目标URL，任务要爬取的具体网址
    pub url: String,
    /// 平台标签，标识内容来源平台（如weibo、zhihu等）
    pub platform: String,
    /// 会话标识符，关联提交方的爬取会话
    pub session_id: String,
    /// 任务优先级：0=实时，1=高，2=普通，>=3=低
    pub priority: i32,
    /// 任务状态，跟踪任务在其生命周期中的当前阶段
    pub status: TaskStatus,
    /// 已重试次数
    pub retry_count: i32,
    /// 最大重试次数，重试耗尽后任务进入死信队列
    pub max_retries: i32,
    /// 执行该任务的外部工作者标识（可选）
    pub worker_id: Option<String>,
    /// 执行耗时（毫秒），任务完成后记录
    pub execution_time_ms: Option<i64>,
    /// 爬取结果，任务成功完成后附加，附加后不可变
    pub result: Option<CrawlResult>,
    /// 错误信息，任务失败时记录
    pub error: Option<String>,
    /// 开放式元数据，提交方附加的键值对
    pub metadata: HashMap<String, serde_json::Value>,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
    /// 更新时间，任务信息最后更新的时间戳
    pub updated_at: DateTime<FixedOffset>,
    /// 开始执行时间，任务转入Processing的时间戳
    pub started_at: Option<DateTime<FixedOffset>>,
    /// 完成时间，任务进入终态的时间戳
    pub completed_at: Option<DateTime<FixedOffset>>,
}

/// 任务状态枚举
///
/// 状态转换遵循以下流程：
/// Pending → Queued → Processing → Completed/Failed
/// Failed且剩余重试次数时经 Retrying → Queued 循环；
/// 重试耗尽的 Failed 与 Completed 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 已持久化但尚未入队
    #[default]
    Pending,
    /// 已进入优先级队列，等待分发
    Queued,
    /// 已分发给外部工作池执行
    Processing,
    /// 已成功完成（终态）
    Completed,
    /// 已失败；重试耗尽时为终态
    Failed,
    /// 等待延迟重试，到期后由清扫器重新入队
    Retrying,
}

impl TaskStatus {
    /// 判断状态是否为终态
    ///
    /// # 返回值
    ///
    /// Completed和Failed返回true，其余返回false
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::Processing => write!(f, "processing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Retrying => write!(f, "retrying"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "queued" => Ok(TaskStatus::Queued),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "retrying" => Ok(TaskStatus::Retrying),
            _ => Err(()),
        }
    }
}

/// 优先级层级枚举
///
/// 每个任务根据priority字段被确定性地路由到唯一的层级队列。
/// 分发器按 Realtime → High → Normal → Low 的严格顺序扫描。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    /// 实时层，priority = 0
    Realtime,
    /// 高优先级层，priority = 1
    High,
    /// 普通层，priority = 2
    Normal,
    /// 低优先级层，priority >= 3
    Low,
}

impl PriorityTier {
    /// 分发器扫描顺序（严格优先级，先实时后低优）
    pub const SCAN_ORDER: [PriorityTier; 4] = [
        PriorityTier::Realtime,
        PriorityTier::High,
        PriorityTier::Normal,
        PriorityTier::Low,
    ];

    /// 根据优先级数值映射层级
    ///
    /// 负值在任务入队前已被默认为普通优先级，这里同样归入普通层
    ///
    /// # 参数
    ///
    /// * `priority` - 任务优先级数值
    ///
    /// # 返回值
    ///
    /// 返回该优先级对应的唯一层级
    pub fn from_priority(priority: i32) -> Self {
        match priority {
            0 => PriorityTier::Realtime,
            1 => PriorityTier::High,
            2 => PriorityTier::Normal,
            p if p >= 3 => PriorityTier::Low,
            _ => PriorityTier::Normal,
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PriorityTier::Realtime => write!(f, "realtime"),
            PriorityTier::High => write!(f, "high"),
            PriorityTier::Normal => write!(f, "normal"),
            PriorityTier::Low => write!(f, "low"),
        }
    }
}

/// 爬取结果实体
///
/// 存储外部工作者上报的结构化爬取内容，嵌入在已完成的任务中，
/// 附加后不再修改。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CrawlResult {
    /// 标题
    pub title: String,
    /// 正文内容
    pub content: String,
    /// 作者
    pub author: String,
    /// 发布时间（可选）
    pub publish_time: Option<DateTime<FixedOffset>>,
    /// 标签列表
    pub tags: Vec<String>,
    /// 图片链接列表
    pub images: Vec<String>,
    /// 外链列表
    pub links: Vec<String>,
}

/// 任务聚合指标
///
/// 按需对持久层做聚合得出的派生数据，不作为可变实体持久化。
/// 统计窗口由调用方指定。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskMetrics {
    /// 窗口内任务总数
    pub total: u64,
    /// 各状态任务数
    pub status_counts: HashMap<String, u64>,
    /// 已完成任务的平均执行耗时（毫秒）
    pub avg_execution_time_ms: Option<f64>,
    /// 已完成任务的最短执行耗时（毫秒）
    pub min_execution_time_ms: Option<i64>,
    /// 已完成任务的最长执行耗时（毫秒）
    pub max_execution_time_ms: Option<i64>,
}

/// 领域错误类型
///
/// 表示领域层的错误情况，包括非法状态转换与校验失败。
#[derive(Error, Debug)]
pub enum DomainError {
    /// 无效的状态转换，当任务状态转换不符合生命周期规则时发生
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: TaskStatus, to: TaskStatus },

    /// 验证错误，当输入数据不符合领域规则时发生
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl CrawlTask {
    /// 创建一个新的爬取任务
    ///
    /// # 参数
    ///
    /// * `id` - 任务标识，调用方指定或由上层生成
    /// * `url` - 目标URL
    /// * `platform` - 平台标签
    /// * `session_id` - 会话标识符
    ///
    /// # 返回值
    ///
    /// 返回Pending状态的新任务实例
    pub fn new(id: Uuid, url: String, platform: String, session_id: String) -> Self {
        let now: DateTime<FixedOffset> = Utc::now().into();
        Self {
            id,
            url,
            platform,
            session_id,
            priority: 2,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries: 3,
            worker_id: None,
            execution_time_ms: None,
            result: None,
            error: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// 任务归属的优先级层级
    pub fn tier(&self) -> PriorityTier {
        PriorityTier::from_priority(self.priority)
    }

    /// 判断任务是否还有剩余重试额度
    ///
    /// # 返回值
    ///
    /// 重试次数未达上限时返回true
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// 校验一次状态转换是否符合生命周期规则
    ///
    /// 唯一允许的回退是 Retrying → Queued 的重试循环
    ///
    /// # 参数
    ///
    /// * `to` - 目标状态
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 转换合法
    /// * `Err(DomainError)` - 转换不符合生命周期规则
    pub fn check_transition(&self, to: TaskStatus) -> Result<(), DomainError> {
        use TaskStatus::*;

        let allowed = matches!(
            (self.status, to),
            (Pending, Queued)
                | (Queued, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Retrying)
                | (Failed, Retrying)
                | (Retrying, Queued)
        );

        if allowed {
            Ok(())
        } else {
            Err(DomainError::InvalidStateTransition {
                from: self.status,
                to,
            })
        }
    }
}
