use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
pub(crate) enum Executors {
    Table,
    ExecutorId,
    Name,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Executors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Executors::ExecutorId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Executors::Name).string_len(256).not_null())
                    .col(
                        ColumnDef::new(Executors::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Executors::Table).if_exists().to_owned())
            .await
    }
}
