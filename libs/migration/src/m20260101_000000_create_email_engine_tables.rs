use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailQueue::Table)
                    .if_not_exists()
                    .col(pk_uuid(EmailQueue::Id))
                    .col(
                        ColumnDef::new(EmailQueue::RecipientEmail)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailQueue::EmailType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(EmailQueue::TemplateData).json_binary().not_null())
                    .col(
                        ColumnDef::new(EmailQueue::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EmailQueue::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(5),
                    )
                    .col(
                        ColumnDef::new(EmailQueue::Status)
                            .string_len(16)
                            .not_null()
                            .default("queued"),
                    )
                    .col(
                        timestamp_with_time_zone(EmailQueue::NextRetryAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(text_null(EmailQueue::LastError))
                    .col(ColumnDef::new(EmailQueue::DedupKey).string_len(255).null())
                    .col(ColumnDef::new(EmailQueue::ClaimToken).uuid().null())
                    .col(timestamp_with_time_zone_null(EmailQueue::ClaimDeadline))
                    .col(
                        timestamp_with_time_zone(EmailQueue::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(EmailQueue::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_queue_claim_order")
                    .table(EmailQueue::Table)
                    .col(EmailQueue::Status)
                    .col(EmailQueue::NextRetryAt)
                    .col(EmailQueue::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_queue_dedup_key")
                    .table(EmailQueue::Table)
                    .col(EmailQueue::DedupKey)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmailLogs::Table)
                    .if_not_exists()
                    .col(pk_uuid(EmailLogs::Id))
                    .col(ColumnDef::new(EmailLogs::QueueId).uuid().not_null())
                    .col(
                        ColumnDef::new(EmailLogs::Provider)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(text_null(EmailLogs::ProviderMessageId))
                    .col(
                        ColumnDef::new(EmailLogs::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(EmailLogs::LatencyMs).integer().not_null())
                    .col(text_null(EmailLogs::Error))
                    .col(
                        timestamp_with_time_zone(EmailLogs::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_email_logs_queue")
                            .from(EmailLogs::Table, EmailLogs::QueueId)
                            .to(EmailQueue::Table, EmailQueue::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_logs_queue_id")
                    .table(EmailLogs::Table)
                    .col(EmailLogs::QueueId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmailProviderQuota::Table)
                    .if_not_exists()
                    .col(pk_uuid(EmailProviderQuota::Id))
                    .col(
                        ColumnDef::new(EmailProviderQuota::Provider)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(EmailProviderQuota::DateUtc).date().not_null())
                    .col(
                        ColumnDef::new(EmailProviderQuota::EmailsSent)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EmailProviderQuota::DailyLimit)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(EmailProviderQuota::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(EmailProviderQuota::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_provider_quota_provider_date")
                    .table(EmailProviderQuota::Table)
                    .col(EmailProviderQuota::Provider)
                    .col(EmailProviderQuota::DateUtc)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmailProviderHealthMetrics::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailProviderHealthMetrics::Provider)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EmailProviderHealthMetrics::HealthScore)
                            .integer()
                            .not_null()
                            .default(100),
                    )
                    .col(
                        ColumnDef::new(EmailProviderHealthMetrics::TotalRequests)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EmailProviderHealthMetrics::SuccessfulRequests)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EmailProviderHealthMetrics::FailedRequests)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EmailProviderHealthMetrics::ConsecutiveFailures)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EmailProviderHealthMetrics::AverageLatencyMs)
                            .double()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EmailProviderHealthMetrics::CircuitState)
                            .string_len(16)
                            .not_null()
                            .default("closed"),
                    )
                    .col(timestamp_with_time_zone_null(
                        EmailProviderHealthMetrics::LastFailureTime,
                    ))
                    .col(text_null(EmailProviderHealthMetrics::LastError))
                    .col(
                        timestamp_with_time_zone(EmailProviderHealthMetrics::MeasurementWindowStart)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(EmailProviderHealthMetrics::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmailProviderHealthHistory::Table)
                    .if_not_exists()
                    .col(pk_uuid(EmailProviderHealthHistory::Id))
                    .col(
                        ColumnDef::new(EmailProviderHealthHistory::Provider)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(EmailProviderHealthHistory::SnapshotAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(EmailProviderHealthHistory::HealthScore)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailProviderHealthHistory::SuccessRate)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailProviderHealthHistory::AvgLatencyMs)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailProviderHealthHistory::TotalRequests)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_provider_health_history_provider_snapshot")
                    .table(EmailProviderHealthHistory::Table)
                    .col(EmailProviderHealthHistory::Provider)
                    .col(EmailProviderHealthHistory::SnapshotAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmailDeadLetterQueue::Table)
                    .if_not_exists()
                    .col(pk_uuid(EmailDeadLetterQueue::Id))
                    .col(ColumnDef::new(EmailDeadLetterQueue::QueueId).uuid().not_null())
                    .col(
                        ColumnDef::new(EmailDeadLetterQueue::RecipientEmail)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailDeadLetterQueue::EmailType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailDeadLetterQueue::TemplateData)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailDeadLetterQueue::Attempts)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailDeadLetterQueue::MaxAttempts)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailDeadLetterQueue::FinalError)
                            .text()
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(EmailDeadLetterQueue::FailedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(EmailDeadLetterQueue::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_dead_letter_queue_queue_id")
                    .table(EmailDeadLetterQueue::Table)
                    .col(EmailDeadLetterQueue::QueueId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmailSuppression::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailSuppression::Email)
                            .string_len(255)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EmailSuppression::Reason)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(EmailSuppression::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Single-writer lock backing the worker tick's `email.queue.lock`.
        manager
            .create_table(
                Table::create()
                    .table(EmailQueueLock::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailQueueLock::Name)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EmailQueueLock::Token).uuid().not_null())
                    .col(
                        ColumnDef::new(EmailQueueLock::AcquiredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailQueueLock::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailQueueLock::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailSuppression::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailDeadLetterQueue::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailProviderHealthHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailProviderHealthMetrics::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailProviderQuota::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailQueue::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum EmailQueue {
    Table,
    Id,
    RecipientEmail,
    EmailType,
    TemplateData,
    Attempts,
    MaxAttempts,
    Status,
    NextRetryAt,
    LastError,
    DedupKey,
    ClaimToken,
    ClaimDeadline,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum EmailLogs {
    Table,
    Id,
    QueueId,
    Provider,
    ProviderMessageId,
    Status,
    LatencyMs,
    Error,
    CreatedAt,
}

#[derive(DeriveIden)]
enum EmailProviderQuota {
    Table,
    Id,
    Provider,
    DateUtc,
    EmailsSent,
    DailyLimit,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum EmailProviderHealthMetrics {
    Table,
    Provider,
    HealthScore,
    TotalRequests,
    SuccessfulRequests,
    FailedRequests,
    ConsecutiveFailures,
    AverageLatencyMs,
    CircuitState,
    LastFailureTime,
    LastError,
    MeasurementWindowStart,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum EmailProviderHealthHistory {
    Table,
    Id,
    Provider,
    SnapshotAt,
    HealthScore,
    SuccessRate,
    AvgLatencyMs,
    TotalRequests,
}

#[derive(DeriveIden)]
enum EmailDeadLetterQueue {
    Table,
    Id,
    QueueId,
    RecipientEmail,
    EmailType,
    TemplateData,
    Attempts,
    MaxAttempts,
    FinalError,
    FailedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum EmailSuppression {
    Table,
    Email,
    Reason,
    CreatedAt,
}

#[derive(DeriveIden)]
enum EmailQueueLock {
    Table,
    Name,
    Token,
    AcquiredAt,
    ExpiresAt,
}
