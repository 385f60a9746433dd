// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 提供后台循环的实现：
/// - 分发工作器（dispatch_worker）：按严格优先级出队并交接任务
/// - 重试清扫工作器（retry_worker）：到期重试重新入队与Pending对账
pub mod dispatch_worker;
pub mod retry_worker;
pub mod worker;

pub use worker::Worker;
