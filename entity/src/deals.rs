use crate::executors;
use sea_orm::prelude::{DateTimeWithTimeZone, *};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "deals")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub deal_id: i32,
    #[sea_orm(unique)]
    pub request_id: i32,
    #[sea_orm(indexed)]
    pub executor_id: i32,
    #[sea_orm(column_type = "Double")]
    pub agreed_price: f64,
    pub status: String,
    pub created_at: DateTimeWithTimeZone,
    pub closed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "executors::Entity",
        from = "Column::ExecutorId",
        to = "executors::Column::ExecutorId"
    )]
    Executor,
}

impl Related<executors::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Executor.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
