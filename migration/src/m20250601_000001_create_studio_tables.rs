use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Class sessions (bookable time slots)
        manager
            .create_table(
                Table::create()
                    .table(ClassSessions::Table)
                    .if_not_exists()
                    .col(pk_uuid(ClassSessions::Id))
                    .col(string_len(ClassSessions::Title, 200))
                    .col(timestamp_with_time_zone(ClassSessions::StartsAt))
                    .col(integer(ClassSessions::DurationMinutes).default(60))
                    .col(integer(ClassSessions::Capacity))
                    .col(integer(ClassSessions::BookedCount).default(0))
                    .col(big_integer(ClassSessions::Price).default(0))
                    .col(boolean(ClassSessions::IsCancelled).default(false))
                    .col(uuid_null(ClassSessions::ClassTypeId))
                    .col(
                        timestamp_with_time_zone(ClassSessions::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(ClassSessions::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .check(Expr::col(ClassSessions::Capacity).gte(0))
                    .check(Expr::col(ClassSessions::BookedCount).gte(0))
                    .check(
                        Expr::col(ClassSessions::BookedCount)
                            .lte(Expr::col(ClassSessions::Capacity)),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_class_sessions_starts_at")
                    .table(ClassSessions::Table)
                    .col(ClassSessions::StartsAt)
                    .to_owned(),
            )
            .await?;

        // Package templates (purchasable products)
        manager
            .create_table(
                Table::create()
                    .table(PackageTemplates::Table)
                    .if_not_exists()
                    .col(pk_uuid(PackageTemplates::Id))
                    .col(string_len(PackageTemplates::Name, 120))
                    .col(string_len(PackageTemplates::PackageType, 16))
                    .col(integer_null(PackageTemplates::Credits))
                    .col(integer(PackageTemplates::DurationDays))
                    .col(big_integer(PackageTemplates::Price))
                    .col(boolean(PackageTemplates::IsActive).default(true))
                    .col(
                        timestamp_with_time_zone(PackageTemplates::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Purchased packages (credit accounts)
        manager
            .create_table(
                Table::create()
                    .table(UserPackages::Table)
                    .if_not_exists()
                    .col(pk_uuid(UserPackages::Id))
                    .col(uuid(UserPackages::UserId))
                    .col(uuid(UserPackages::PackageId))
                    .col(integer_null(UserPackages::CreditsRemaining))
                    .col(integer_null(UserPackages::CreditsTotal))
                    .col(integer(UserPackages::UsageCount).default(0))
                    .col(timestamp_with_time_zone(UserPackages::StartAt))
                    .col(timestamp_with_time_zone(UserPackages::ExpireAt))
                    .col(string_len(UserPackages::Status, 16).default("active"))
                    .col(
                        timestamp_with_time_zone(UserPackages::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(UserPackages::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .check(Expr::col(UserPackages::CreditsRemaining).gte(0))
                    .check(Expr::col(UserPackages::UsageCount).gte(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_packages_package_id")
                            .from(UserPackages::Table, UserPackages::PackageId)
                            .to(PackageTemplates::Table, PackageTemplates::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_packages_user_id")
                    .table(UserPackages::Table)
                    .col(UserPackages::UserId)
                    .to_owned(),
            )
            .await?;

        // Bookings (never physically deleted)
        manager
            .create_table(
                Table::create()
                    .table(Bookings::Table)
                    .if_not_exists()
                    .col(pk_uuid(Bookings::Id))
                    .col(uuid_null(Bookings::UserId))
                    .col(string_len_null(Bookings::GuestName, 120))
                    .col(string_len_null(Bookings::GuestContact, 120))
                    .col(uuid(Bookings::ClassId))
                    .col(string_len(Bookings::Kind, 16))
                    .col(string_len(Bookings::Status, 16).default("booked"))
                    .col(boolean(Bookings::IsAttended).default(false))
                    .col(uuid_null(Bookings::UserPackageId))
                    .col(string_len(Bookings::PaymentStatus, 32).default("unpaid"))
                    .col(big_integer(Bookings::AmountDue).default(0))
                    .col(big_integer(Bookings::AmountPaid).default(0))
                    .col(string_len_null(Bookings::PaymentMethod, 16))
                    .col(text_null(Bookings::PaymentSlipUrl))
                    .col(text_null(Bookings::PaymentNote))
                    .col(timestamp_with_time_zone_null(Bookings::PaidAt))
                    .col(timestamp_with_time_zone_null(Bookings::CancelledAt))
                    .col(boolean(Bookings::CreditRefunded).default(false))
                    .col(uuid(Bookings::CreatedBy))
                    .col(
                        timestamp_with_time_zone(Bookings::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Bookings::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    // Exactly one of member or guest identity
                    .check(
                        Expr::col(Bookings::UserId)
                            .is_not_null()
                            .and(Expr::col(Bookings::GuestName).is_null())
                            .or(Expr::col(Bookings::UserId)
                                .is_null()
                                .and(Expr::col(Bookings::GuestName).is_not_null())),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bookings_class_id")
                            .from(Bookings::Table, Bookings::ClassId)
                            .to(ClassSessions::Table, ClassSessions::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bookings_user_package_id")
                            .from(Bookings::Table, Bookings::UserPackageId)
                            .to(UserPackages::Table, UserPackages::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Payment audit trail (append-only)
        manager
            .create_table(
                Table::create()
                    .table(Payments::Table)
                    .if_not_exists()
                    .col(pk_uuid(Payments::Id))
                    .col(uuid_null(Payments::BookingId))
                    .col(uuid_null(Payments::UserPackageId))
                    .col(uuid_null(Payments::UserId))
                    .col(string_len(Payments::Method, 16))
                    .col(big_integer(Payments::Amount))
                    .col(string_len(Payments::Currency, 3).default("THB"))
                    .col(string_len(Payments::LogStatus, 16).default("recorded"))
                    .col(timestamp_with_time_zone(Payments::PaidAt))
                    .col(text_null(Payments::EvidenceUrl))
                    .col(text_null(Payments::Note))
                    .col(uuid(Payments::RecordedBy))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payments_booking_id")
                            .from(Payments::Table, Payments::BookingId)
                            .to(Bookings::Table, Bookings::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Payments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Bookings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserPackages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PackageTemplates::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ClassSessions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ClassSessions {
    Table,
    Id,
    Title,
    StartsAt,
    DurationMinutes,
    Capacity,
    BookedCount,
    Price,
    IsCancelled,
    ClassTypeId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PackageTemplates {
    Table,
    Id,
    Name,
    PackageType,
    Credits,
    DurationDays,
    Price,
    IsActive,
    CreatedAt,
}

#[derive(DeriveIden)]
enum UserPackages {
    Table,
    Id,
    UserId,
    PackageId,
    CreditsRemaining,
    CreditsTotal,
    UsageCount,
    StartAt,
    ExpireAt,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Bookings {
    Table,
    Id,
    UserId,
    GuestName,
    GuestContact,
    ClassId,
    Kind,
    Status,
    IsAttended,
    UserPackageId,
    PaymentStatus,
    AmountDue,
    AmountPaid,
    PaymentMethod,
    PaymentSlipUrl,
    PaymentNote,
    PaidAt,
    CancelledAt,
    CreditRefunded,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Payments {
    Table,
    Id,
    BookingId,
    UserPackageId,
    UserId,
    Method,
    Amount,
    Currency,
    LogStatus,
    PaidAt,
    EvidenceUrl,
    Note,
    RecordedBy,
}
