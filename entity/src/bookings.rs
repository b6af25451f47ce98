use super::sea_orm_active_enums::{BookingKind, BookingStatus, PaymentMethod, PaymentStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bookings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub guest_name: Option<String>,
    pub guest_contact: Option<String>,
    pub class_id: Uuid,
    pub kind: BookingKind,
    pub status: BookingStatus,
    pub is_attended: bool,
    pub user_package_id: Option<Uuid>,
    pub payment_status: PaymentStatus,
    pub amount_due: i64,
    pub amount_paid: i64,
    pub payment_method: Option<PaymentMethod>,
    pub payment_slip_url: Option<String>,
    pub payment_note: Option<String>,
    pub paid_at: Option<TimeDateTimeWithTimeZone>,
    pub cancelled_at: Option<TimeDateTimeWithTimeZone>,
    /// Whether the cancellation returned a package credit
    pub credit_refunded: bool,
    pub created_by: Uuid,
    pub created_at: TimeDateTimeWithTimeZone,
    pub updated_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::class_sessions::Entity",
        from = "Column::ClassId",
        to = "super::class_sessions::Column::Id"
    )]
    ClassSessions,
    #[sea_orm(
        belongs_to = "super::user_packages::Entity",
        from = "Column::UserPackageId",
        to = "super::user_packages::Column::Id"
    )]
    UserPackages,
    #[sea_orm(has_many = "super::payments::Entity")]
    Payments,
}

impl Related<super::class_sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ClassSessions.def()
    }
}

impl Related<super::user_packages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserPackages.def()
    }
}

impl Related<super::payments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
