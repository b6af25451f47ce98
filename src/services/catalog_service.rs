use crate::{
    error::BookingError,
    models::{
        actor::Actor,
        classes::{ClassData, CreateClassRequest, GenerateScheduleRequest, UpdateClassRequest, WeeklySlot},
        packages::CreatePackageTemplateRequest,
    },
    services::listing_cache::ListingCache,
};
use entity::{class_sessions, package_templates};
use sea_orm::{
    entity::*, query::*, sea_query::Expr, DatabaseConnection, TransactionTrait,
};
use time::{Duration, OffsetDateTime, UtcOffset};
use tracing::{info, instrument};
use uuid::Uuid;

const DEFAULT_LISTING_LIMIT: u64 = 50;
const MAX_LISTING_LIMIT: u64 = 200;

/// A session produced by the weekly timetable, not yet stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSession {
    pub title: String,
    pub starts_at: OffsetDateTime,
    pub duration_minutes: i32,
    pub capacity: i32,
    pub price: i64,
    pub class_type_id: Option<Uuid>,
}

/// Expand weekly slots into concrete sessions for `weeks` weeks starting at
/// the week containing `from`. Slots before `from` are skipped. Times are
/// read in the studio's local offset and returned in UTC.
pub fn plan_weekly_sessions(
    from: OffsetDateTime,
    weeks: u32,
    utc_offset_minutes: i16,
    slots: &[WeeklySlot],
) -> Result<Vec<PlannedSession>, BookingError> {
    let offset = UtcOffset::from_whole_seconds(i32::from(utc_offset_minutes) * 60)
        .map_err(|e| BookingError::Validation(format!("Invalid UTC offset: {}", e)))?;

    let local_from = from.to_offset(offset);
    let week_start = local_from.date()
        - Duration::days(i64::from(local_from.weekday().number_days_from_monday()));

    let mut sessions = Vec::with_capacity(weeks as usize * slots.len());
    for week in 0..weeks {
        for slot in slots {
            if !(1..=7).contains(&slot.weekday) {
                return Err(BookingError::Validation(format!(
                    "Weekday {} is out of range",
                    slot.weekday
                )));
            }
            let day = week_start
                + Duration::days(i64::from(week) * 7 + i64::from(slot.weekday - 1));
            let starts_at = day
                .with_hms(slot.hour, slot.minute, 0)
                .map_err(|e| BookingError::Validation(format!("Invalid slot time: {}", e)))?
                .assume_offset(offset)
                .to_offset(UtcOffset::UTC);

            if starts_at < from {
                continue;
            }

            sessions.push(PlannedSession {
                title: slot.title.clone(),
                starts_at,
                duration_minutes: slot.duration_minutes,
                capacity: slot.capacity,
                price: slot.price,
                class_type_id: slot.class_type_id,
            });
        }
    }

    sessions.sort_by_key(|s| s.starts_at);
    Ok(sessions)
}

/// Class timetable and package templates (admin), plus the public listing
pub struct CatalogService {
    db: DatabaseConnection,
    cache: ListingCache,
}

impl CatalogService {
    pub fn new(db: DatabaseConnection, cache: ListingCache) -> Self {
        Self { db, cache }
    }

    pub fn cache(&self) -> &ListingCache {
        &self.cache
    }

    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create_class(
        &self,
        actor: Actor,
        request: CreateClassRequest,
    ) -> Result<class_sessions::Model, BookingError> {
        actor.require_admin()?;
        let now = OffsetDateTime::now_utc();

        let class = class_sessions::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(request.title.trim().to_string()),
            starts_at: Set(request.starts_at.to_offset(UtcOffset::UTC)),
            duration_minutes: Set(request.duration_minutes),
            capacity: Set(request.capacity),
            booked_count: Set(0),
            price: Set(request.price),
            is_cancelled: Set(false),
            class_type_id: Set(request.class_type_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        info!(class_id = %class.id, starts_at = %class.starts_at, "Class created");
        self.cache.invalidate_classes().await;
        Ok(class)
    }

    /// Partial update. Capacity can never drop below the seats already taken.
    #[instrument(skip(self, request))]
    pub async fn update_class(
        &self,
        actor: Actor,
        class_id: Uuid,
        request: UpdateClassRequest,
    ) -> Result<class_sessions::Model, BookingError> {
        actor.require_admin()?;

        let mut update = class_sessions::Entity::update_many()
            .col_expr(
                class_sessions::Column::UpdatedAt,
                Expr::value(OffsetDateTime::now_utc()),
            )
            .filter(class_sessions::Column::Id.eq(class_id));

        if let Some(title) = &request.title {
            update = update.col_expr(
                class_sessions::Column::Title,
                Expr::value(title.trim().to_string()),
            );
        }
        if let Some(starts_at) = request.starts_at {
            update = update.col_expr(
                class_sessions::Column::StartsAt,
                Expr::value(starts_at.to_offset(UtcOffset::UTC)),
            );
        }
        if let Some(duration) = request.duration_minutes {
            update = update.col_expr(class_sessions::Column::DurationMinutes, Expr::value(duration));
        }
        if let Some(price) = request.price {
            update = update.col_expr(class_sessions::Column::Price, Expr::value(price));
        }
        if let Some(capacity) = request.capacity {
            update = update
                .col_expr(class_sessions::Column::Capacity, Expr::value(capacity))
                .filter(class_sessions::Column::BookedCount.lte(capacity));
        }

        let result = update.exec(&self.db).await?;

        let class = class_sessions::Entity::find_by_id(class_id)
            .one(&self.db)
            .await?
            .ok_or(BookingError::ClassNotFound(class_id))?;

        if result.rows_affected != 1 {
            return Err(BookingError::Validation(format!(
                "Capacity cannot be lower than the {} seats already booked",
                class.booked_count
            )));
        }

        info!(class_id = %class_id, "Class updated");
        self.cache.invalidate_classes().await;
        Ok(class)
    }

    /// Soft cancel; bookings on the class are left for the admin to cancel
    #[instrument(skip(self))]
    pub async fn cancel_class(
        &self,
        actor: Actor,
        class_id: Uuid,
    ) -> Result<class_sessions::Model, BookingError> {
        actor.require_admin()?;

        class_sessions::Entity::update_many()
            .col_expr(class_sessions::Column::IsCancelled, Expr::value(true))
            .col_expr(
                class_sessions::Column::UpdatedAt,
                Expr::value(OffsetDateTime::now_utc()),
            )
            .filter(class_sessions::Column::Id.eq(class_id))
            .filter(class_sessions::Column::IsCancelled.eq(false))
            .exec(&self.db)
            .await?;

        let class = class_sessions::Entity::find_by_id(class_id)
            .one(&self.db)
            .await?
            .ok_or(BookingError::ClassNotFound(class_id))?;

        info!(class_id = %class_id, booked_count = class.booked_count, "Class cancelled");
        self.cache.invalidate_classes().await;
        Ok(class)
    }

    /// Materialize a weekly timetable in one transaction
    #[instrument(skip(self, request), fields(weeks = request.weeks, slots = request.slots.len()))]
    pub async fn generate_schedule(
        &self,
        actor: Actor,
        request: GenerateScheduleRequest,
    ) -> Result<Vec<class_sessions::Model>, BookingError> {
        actor.require_admin()?;

        let planned = plan_weekly_sessions(
            request.from,
            request.weeks,
            request.utc_offset_minutes,
            &request.slots,
        )?;

        let now = OffsetDateTime::now_utc();
        let txn = self.db.begin().await?;
        let mut created = Vec::with_capacity(planned.len());

        for session in planned {
            let class = class_sessions::ActiveModel {
                id: Set(Uuid::new_v4()),
                title: Set(session.title),
                starts_at: Set(session.starts_at),
                duration_minutes: Set(session.duration_minutes),
                capacity: Set(session.capacity),
                booked_count: Set(0),
                price: Set(session.price),
                is_cancelled: Set(false),
                class_type_id: Set(session.class_type_id),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await?;
            created.push(class);
        }

        txn.commit().await?;

        info!(count = created.len(), "Generated class schedule");
        self.cache.invalidate_classes().await;
        Ok(created)
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_package_template(
        &self,
        actor: Actor,
        request: CreatePackageTemplateRequest,
    ) -> Result<package_templates::Model, BookingError> {
        actor.require_admin()?;

        let template = package_templates::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            package_type: Set(request.package_type),
            credits: Set(request.credits),
            duration_days: Set(request.duration_days),
            price: Set(request.price),
            is_active: Set(true),
            created_at: Set(OffsetDateTime::now_utc()),
        }
        .insert(&self.db)
        .await?;

        info!(package_id = %template.id, "Package template created");
        Ok(template)
    }

    /// Retire a template; accounts already granted from it are unaffected
    #[instrument(skip(self))]
    pub async fn deactivate_package_template(
        &self,
        actor: Actor,
        package_id: Uuid,
    ) -> Result<package_templates::Model, BookingError> {
        actor.require_admin()?;

        let template = package_templates::Entity::find_by_id(package_id)
            .one(&self.db)
            .await?
            .ok_or(BookingError::PackageNotFound(package_id))?;

        if !template.is_active {
            return Ok(template);
        }

        let mut active: package_templates::ActiveModel = template.into();
        active.is_active = Set(false);
        Ok(active.update(&self.db).await?)
    }

    pub async fn list_active_package_templates(
        &self,
    ) -> Result<Vec<package_templates::Model>, BookingError> {
        Ok(package_templates::Entity::find()
            .filter(package_templates::Column::IsActive.eq(true))
            .order_by_asc(package_templates::Column::Price)
            .all(&self.db)
            .await?)
    }

    /// Upcoming, non-cancelled classes with remaining spots. Read-only.
    #[instrument(skip(self))]
    pub async fn list_upcoming_classes(
        &self,
        from: OffsetDateTime,
        limit: Option<u64>,
    ) -> Result<Vec<ClassData>, BookingError> {
        let limit = limit.unwrap_or(DEFAULT_LISTING_LIMIT).clamp(1, MAX_LISTING_LIMIT);
        let cache_key = format!("upcoming:{}", limit);

        if let Some(cached) = self.cache.get_json::<Vec<ClassData>>(&cache_key).await {
            return Ok(cached
                .into_iter()
                .filter(|class| class.starts_at >= from)
                .collect());
        }

        let classes: Vec<ClassData> = class_sessions::Entity::find()
            .filter(class_sessions::Column::IsCancelled.eq(false))
            .filter(class_sessions::Column::StartsAt.gte(from.to_offset(UtcOffset::UTC)))
            .order_by_asc(class_sessions::Column::StartsAt)
            .limit(limit)
            .all(&self.db)
            .await?
            .into_iter()
            .map(ClassData::from)
            .collect();

        self.cache.put_json(&cache_key, &classes).await;
        Ok(classes)
    }
}
