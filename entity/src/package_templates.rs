use super::sea_orm_active_enums::PackageType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "package_templates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub package_type: PackageType,
    /// None for unlimited packages
    pub credits: Option<i32>,
    pub duration_days: i32,
    pub price: i64,
    pub is_active: bool,
    pub created_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_packages::Entity")]
    UserPackages,
}

impl Related<super::user_packages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserPackages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
