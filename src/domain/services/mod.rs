// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 该模块包含调度引擎的核心业务逻辑服务：
/// - 状态管理器（status_manager）：任务状态的唯一读写权威，
///   协调持久层与短TTL读缓存
/// - 重试管理器（retry_manager）：退避计算、延迟重新入队
///   与死信决策
///
/// 领域服务只依赖仓库与队列的抽象接口，不绑定具体后端。
pub mod retry_manager;
pub mod status_manager;
