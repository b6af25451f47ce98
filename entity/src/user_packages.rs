use super::sea_orm_active_enums::UserPackageStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_packages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub package_id: Uuid,
    /// None means unlimited
    pub credits_remaining: Option<i32>,
    pub credits_total: Option<i32>,
    pub usage_count: i32,
    pub start_at: TimeDateTimeWithTimeZone,
    pub expire_at: TimeDateTimeWithTimeZone,
    pub status: UserPackageStatus,
    pub created_at: TimeDateTimeWithTimeZone,
    pub updated_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::package_templates::Entity",
        from = "Column::PackageId",
        to = "super::package_templates::Column::Id"
    )]
    PackageTemplates,
    #[sea_orm(has_many = "super::bookings::Entity")]
    Bookings,
}

impl Related<super::package_templates::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PackageTemplates.def()
    }
}

impl Related<super::bookings::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
