use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum EmailType {
    #[sea_orm(string_value = "auth")]
    Auth,
    #[sea_orm(string_value = "chat")]
    Chat,
    #[sea_orm(string_value = "food_listing")]
    FoodListing,
    #[sea_orm(string_value = "feedback")]
    Feedback,
    #[sea_orm(string_value = "review_reminder")]
    ReviewReminder,
    #[sea_orm(string_value = "newsletter")]
    Newsletter,
    #[sea_orm(string_value = "announcement")]
    Announcement,
}

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum QueueStatus {
    #[sea_orm(string_value = "queued")]
    Queued,
    #[sea_orm(string_value = "in_flight")]
    InFlight,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed_retry")]
    FailedRetry,
    #[sea_orm(string_value = "dead")]
    Dead,
}

/// Everything needed to render and send a message, independent of provider.
///
/// `from`/`from_name` are optional on input; `enqueue` fills a missing value
/// from the `EMAIL_FROM`/`EMAIL_FROM_NAME` config before the row is stored,
/// so the field is always populated by the time a worker reads it back out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateData {
    pub subject: String,
    pub html: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "email_queue")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub recipient_email: String,
    pub email_type: EmailType,
    pub template_data: Json,
    pub attempts: i32,
    pub max_attempts: i32,
    pub status: QueueStatus,
    pub next_retry_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub dedup_key: Option<String>,
    pub claim_token: Option<Uuid>,
    pub claim_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::email_logs::Entity")]
    EmailLogs,
}

impl Related<super::email_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailLogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Default retry budget when not specified by the caller.
    pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

    pub fn parsed_template_data(&self) -> Result<TemplateData, serde_json::Error> {
        serde_json::from_value(self.template_data.clone())
    }
}
