use crate::{
    error::BookingError,
    models::{
        actor::Actor,
        packages::{CreditBalance, GrantPackageRequest},
        user_package_ext::UserPackageExt,
    },
};
use entity::{
    package_templates, payments,
    sea_orm_active_enums::{PaymentLogStatus, UserPackageStatus},
    user_packages,
};
use sea_orm::{
    entity::*, query::*, sea_query::Expr, ConnectionTrait, DatabaseConnection, TransactionTrait,
};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

/// The only code path that mutates `credits_remaining`.
///
/// `debit`/`credit` run on the caller's connection or transaction and never
/// open one of their own. Each is a single conditional UPDATE, so the balance
/// is never read in application code and written back.
pub struct CreditAccountService {
    db: DatabaseConnection,
    currency: String,
}

impl CreditAccountService {
    pub fn new(db: DatabaseConnection, currency: impl Into<String>) -> Self {
        Self {
            db,
            currency: currency.into(),
        }
    }

    /// Take `amount` credits from an account. Unlimited accounts only bump
    /// their usage counter.
    #[instrument(skip(conn))]
    pub async fn debit<C>(
        conn: &C,
        user_package_id: Uuid,
        amount: i32,
    ) -> Result<user_packages::Model, BookingError>
    where
        C: ConnectionTrait,
    {
        if amount < 1 {
            return Err(BookingError::Validation(
                "Debit amount must be at least 1".to_string(),
            ));
        }

        let now = OffsetDateTime::now_utc();
        let account = Self::find(conn, user_package_id).await?;
        Self::ensure_fundable(&account, now)?;

        let mut update = user_packages::Entity::update_many()
            .col_expr(
                user_packages::Column::UsageCount,
                Expr::col(user_packages::Column::UsageCount).add(amount),
            )
            .col_expr(user_packages::Column::UpdatedAt, Expr::value(now))
            .filter(user_packages::Column::Id.eq(user_package_id))
            .filter(user_packages::Column::Status.eq(UserPackageStatus::Active));

        update = if account.is_unlimited() {
            update.filter(user_packages::Column::CreditsRemaining.is_null())
        } else {
            update
                .col_expr(
                    user_packages::Column::CreditsRemaining,
                    Expr::col(user_packages::Column::CreditsRemaining).sub(amount),
                )
                .filter(user_packages::Column::CreditsRemaining.gte(amount))
        };

        let result = update.exec(conn).await?;

        if result.rows_affected != 1 {
            // Lost a race against another debit or a status change
            let current = Self::find(conn, user_package_id).await?;
            return Err(if current.status != UserPackageStatus::Active {
                BookingError::PackageNotActive
            } else {
                BookingError::InsufficientCredits
            });
        }

        let updated = Self::find(conn, user_package_id).await?;

        info!(
            user_package_id = %user_package_id,
            amount,
            credits_remaining = ?updated.credits_remaining,
            usage_count = updated.usage_count,
            "Debited credit account"
        );

        Ok(updated)
    }

    /// Return `amount` credits (cancellation refund). Works regardless of
    /// status so a refund still lands on an expired account, but never
    /// lifts the balance above the purchased total.
    #[instrument(skip(conn))]
    pub async fn credit<C>(
        conn: &C,
        user_package_id: Uuid,
        amount: i32,
    ) -> Result<user_packages::Model, BookingError>
    where
        C: ConnectionTrait,
    {
        if amount < 1 {
            return Err(BookingError::Validation(
                "Credit amount must be at least 1".to_string(),
            ));
        }

        let now = OffsetDateTime::now_utc();
        let account = Self::find(conn, user_package_id).await?;

        if !account.is_unlimited() {
            let result = user_packages::Entity::update_many()
                .col_expr(
                    user_packages::Column::CreditsRemaining,
                    Expr::col(user_packages::Column::CreditsRemaining).add(amount),
                )
                .col_expr(user_packages::Column::UpdatedAt, Expr::value(now))
                .filter(user_packages::Column::Id.eq(user_package_id))
                .filter(
                    Expr::col(user_packages::Column::CreditsRemaining)
                        .lte(Expr::col(user_packages::Column::CreditsTotal).sub(amount)),
                )
                .exec(conn)
                .await?;

            if result.rows_affected != 1 {
                return Err(BookingError::InvalidStateTransition(
                    "Refund would exceed the package's purchased credits".to_string(),
                ));
            }
        }

        // Usage is reporting-only; floor at zero
        user_packages::Entity::update_many()
            .col_expr(
                user_packages::Column::UsageCount,
                Expr::col(user_packages::Column::UsageCount).sub(amount),
            )
            .col_expr(user_packages::Column::UpdatedAt, Expr::value(now))
            .filter(user_packages::Column::Id.eq(user_package_id))
            .filter(user_packages::Column::UsageCount.gte(amount))
            .exec(conn)
            .await?;

        let updated = Self::find(conn, user_package_id).await?;

        info!(
            user_package_id = %user_package_id,
            amount,
            credits_remaining = ?updated.credits_remaining,
            "Credited credit account"
        );

        Ok(updated)
    }

    /// Lazy active -> expired transition. Returns whether a row changed.
    pub async fn expire_if_lapsed<C>(conn: &C, user_package_id: Uuid) -> Result<bool, BookingError>
    where
        C: ConnectionTrait,
    {
        let now = OffsetDateTime::now_utc();
        let account = Self::find(conn, user_package_id).await?;
        if !account.is_lapsed(now) {
            return Ok(false);
        }

        let result = user_packages::Entity::update_many()
            .col_expr(
                user_packages::Column::Status,
                Expr::value(UserPackageStatus::Expired),
            )
            .col_expr(user_packages::Column::UpdatedAt, Expr::value(now))
            .filter(user_packages::Column::Id.eq(user_package_id))
            .filter(user_packages::Column::Status.eq(UserPackageStatus::Active))
            .exec(conn)
            .await?;

        if result.rows_affected == 1 {
            info!(user_package_id = %user_package_id, "Credit account expired");
        }

        Ok(result.rows_affected == 1)
    }

    /// Status and expiry gate shared by booking validation and `debit`
    pub fn ensure_fundable(
        account: &user_packages::Model,
        now: OffsetDateTime,
    ) -> Result<(), BookingError> {
        match account.status {
            UserPackageStatus::Active if account.is_lapsed(now) => Err(BookingError::PackageExpired),
            UserPackageStatus::Active => Ok(()),
            UserPackageStatus::Expired => Err(BookingError::PackageExpired),
            UserPackageStatus::Suspended => Err(BookingError::PackageNotActive),
        }
    }

    async fn find<C>(conn: &C, user_package_id: Uuid) -> Result<user_packages::Model, BookingError>
    where
        C: ConnectionTrait,
    {
        user_packages::Entity::find_by_id(user_package_id)
            .one(conn)
            .await?
            .ok_or(BookingError::PackageNotFound(user_package_id))
    }

    /// Approve a package purchase: create the credit account and record the
    /// payment in one transaction
    #[instrument(skip(self, request), fields(user_id = %request.user_id, package_id = %request.package_id))]
    pub async fn grant_package(
        &self,
        actor: Actor,
        request: GrantPackageRequest,
    ) -> Result<user_packages::Model, BookingError> {
        let admin_id = actor.require_admin()?;
        let now = OffsetDateTime::now_utc();

        let txn = self.db.begin().await?;

        let template = package_templates::Entity::find_by_id(request.package_id)
            .one(&txn)
            .await?
            .ok_or(BookingError::PackageNotFound(request.package_id))?;

        if !template.is_active {
            return Err(BookingError::PackageNotActive);
        }

        let start_at = request.start_at.unwrap_or(now);
        let expire_at = start_at + time::Duration::days(template.duration_days as i64);

        let account = user_packages::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(request.user_id),
            package_id: Set(template.id),
            credits_remaining: Set(template.credits),
            credits_total: Set(template.credits),
            usage_count: Set(0),
            start_at: Set(start_at),
            expire_at: Set(expire_at),
            status: Set(UserPackageStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        payments::ActiveModel {
            id: Set(Uuid::new_v4()),
            booking_id: Set(None),
            user_package_id: Set(Some(account.id)),
            user_id: Set(Some(request.user_id)),
            method: Set(request.method),
            amount: Set(request.amount_paid.unwrap_or(template.price)),
            currency: Set(self.currency.clone()),
            log_status: Set(PaymentLogStatus::Verified),
            paid_at: Set(now),
            evidence_url: Set(request.evidence_url),
            note: Set(request.note),
            recorded_by: Set(admin_id),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        info!(
            user_package_id = %account.id,
            credits = ?account.credits_remaining,
            expire_at = %account.expire_at,
            "Granted package"
        );

        Ok(account)
    }

    #[instrument(skip(self))]
    pub async fn balance(
        &self,
        actor: Actor,
        user_package_id: Uuid,
    ) -> Result<CreditBalance, BookingError> {
        let account = Self::find(&self.db, user_package_id).await?;
        if !actor.may_act_for(Some(account.user_id)) {
            return Err(BookingError::PackageNotFound(user_package_id));
        }
        Ok(CreditBalance::from_model(&account, OffsetDateTime::now_utc()))
    }

    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<CreditBalance>, BookingError> {
        let now = OffsetDateTime::now_utc();
        let accounts = user_packages::Entity::find()
            .filter(user_packages::Column::UserId.eq(user_id))
            .order_by_desc(user_packages::Column::ExpireAt)
            .all(&self.db)
            .await?;

        Ok(accounts
            .iter()
            .map(|account| CreditBalance::from_model(account, now))
            .collect())
    }
}
