use super::sea_orm_active_enums::{PaymentLogStatus, PaymentMethod};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only audit row, written whenever money changes hands
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub booking_id: Option<Uuid>,
    pub user_package_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub method: PaymentMethod,
    pub amount: i64,
    pub currency: String,
    pub log_status: PaymentLogStatus,
    pub paid_at: TimeDateTimeWithTimeZone,
    pub evidence_url: Option<String>,
    pub note: Option<String>,
    pub recorded_by: Uuid,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bookings::Entity",
        from = "Column::BookingId",
        to = "super::bookings::Column::Id"
    )]
    Bookings,
}

impl Related<super::bookings::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
