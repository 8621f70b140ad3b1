use sea_orm_migration::prelude::*;

use crate::m20240101_000001_executors::Executors;

#[derive(DeriveIden)]
enum Deals {
    Table,
    DealId,
    RequestId,
    ExecutorId,
    AgreedPrice,
    Status,
    CreatedAt,
    ClosedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Deals::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Deals::DealId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Deals::RequestId)
                            .integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Deals::ExecutorId).integer().not_null())
                    .col(
                        ColumnDef::new(Deals::AgreedPrice)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Deals::Status)
                            .string_len(64)
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Deals::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Deals::ClosedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_deals_executor")
                            .from(Deals::Table, Deals::ExecutorId)
                            .to(Executors::Table, Executors::ExecutorId)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_deals_executor")
                    .table(Deals::Table)
                    .col(Deals::ExecutorId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Deals::Table).if_exists().to_owned())
            .await
    }
}
