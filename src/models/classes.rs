use entity::class_sessions;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

use super::common::SuccessResponse;

/// POST /api/v1/admin/classes
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateClassRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(default = "default_duration")]
    #[validate(range(min = 5, max = 600))]
    pub duration_minutes: i32,
    #[validate(range(min = 0, max = 500))]
    pub capacity: i32,
    #[validate(range(min = 0))]
    pub price: i64,
    pub class_type_id: Option<Uuid>,
}

fn default_duration() -> i32 {
    60
}

/// PATCH /api/v1/admin/classes/{id}
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClassRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub starts_at: Option<OffsetDateTime>,
    #[validate(range(min = 5, max = 600))]
    pub duration_minutes: Option<i32>,
    #[validate(range(min = 0, max = 500))]
    pub capacity: Option<i32>,
    #[validate(range(min = 0))]
    pub price: Option<i64>,
}

/// One recurring slot of a weekly timetable
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySlot {
    /// ISO weekday, 1 = Monday .. 7 = Sunday
    #[validate(range(min = 1, max = 7))]
    pub weekday: u8,
    #[validate(range(max = 23))]
    pub hour: u8,
    #[validate(range(max = 59))]
    pub minute: u8,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default = "default_duration")]
    #[validate(range(min = 5, max = 600))]
    pub duration_minutes: i32,
    #[validate(range(min = 0, max = 500))]
    pub capacity: i32,
    #[validate(range(min = 0))]
    pub price: i64,
    pub class_type_id: Option<Uuid>,
}

/// POST /api/v1/admin/classes/generate
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateScheduleRequest {
    #[serde(with = "time::serde::rfc3339")]
    pub from: OffsetDateTime,
    #[validate(range(min = 1, max = 26))]
    pub weeks: u32,
    /// Studio local offset the slot times are expressed in
    #[serde(default)]
    #[validate(range(min = -720, max = 840))]
    pub utc_offset_minutes: i16,
    #[validate(length(min = 1, max = 100), nested)]
    pub slots: Vec<WeeklySlot>,
}

/// GET /api/v1/classes
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassListQuery {
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassData {
    pub id: Uuid,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    pub duration_minutes: i32,
    pub capacity: i32,
    pub booked_count: i32,
    pub spots_left: i32,
    pub price: i64,
    pub is_cancelled: bool,
    pub class_type_id: Option<Uuid>,
}

impl From<class_sessions::Model> for ClassData {
    fn from(model: class_sessions::Model) -> Self {
        Self {
            spots_left: (model.capacity - model.booked_count).max(0),
            id: model.id,
            title: model.title,
            starts_at: model.starts_at,
            duration_minutes: model.duration_minutes,
            capacity: model.capacity,
            booked_count: model.booked_count,
            price: model.price,
            is_cancelled: model.is_cancelled,
            class_type_id: model.class_type_id,
        }
    }
}

pub type ClassResponse = SuccessResponse<ClassData>;

pub type ClassListResponse = SuccessResponse<Vec<ClassData>>;
