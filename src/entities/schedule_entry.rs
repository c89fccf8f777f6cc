use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One weekly slot of a module's timetable.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "schedule_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub module_id: i64,
    /// 0 = Monday .. 6 = Sunday.
    pub weekday: i64,
    /// Minutes from midnight, local school time.
    pub start_minute: i64,
    pub end_minute: i64,
    pub room: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
