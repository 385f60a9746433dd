// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::sea_query::{Alias, Index};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Schema};

use crate::infrastructure::database::entities::task as task_entity;

/// 初始化数据库结构
///
/// 根据实体定义创建crawl_tasks表及其索引，已存在时跳过。
/// 在服务启动时调用一次。
///
/// # 参数
///
/// * `db` - 数据库连接
///
/// # 返回值
///
/// * `Ok(())` - 结构就绪
/// * `Err(DbErr)` - 建表或建索引失败
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut table = schema.create_table_from_entity(task_entity::Entity);
    table.if_not_exists();
    db.execute(backend.build(&table)).await?;

    // 状态清扫与分页列表依赖的索引
    let indexes = [
        (
            "idx_crawl_tasks_status_created_at",
            vec!["status", "created_at"],
        ),
        ("idx_crawl_tasks_created_at", vec!["created_at"]),
        ("idx_crawl_tasks_session_id", vec!["session_id"]),
    ];

    for (name, columns) in indexes {
        let mut stmt = Index::create();
        stmt.if_not_exists()
            .name(name)
            .table(Alias::new("crawl_tasks"));
        for column in columns {
            stmt.col(Alias::new(column));
        }
        db.execute(backend.build(&stmt)).await?;
    }

    Ok(())
}
