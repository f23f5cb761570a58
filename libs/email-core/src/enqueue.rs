//! C11 — Enqueue API (§4.11): validates, checks suppression, and durably
//! queues a request. Returns once the row is durable; delivery outcomes are
//! only observable later via `email_logs`, the DLQ, or health metrics (§7).

use sea_orm::{ActiveEnum, DatabaseConnection};

use crate::error::EngineError;
use crate::models::{EnqueueRequest, EnqueueResponse};
use crate::queue::QueueStore;
use crate::suppression::SuppressionList;

pub async fn enqueue(
    db: &DatabaseConnection,
    request: &EnqueueRequest,
) -> Result<EnqueueResponse, EngineError> {
    if let Err(e) = validate(request) {
        crate::metrics::record_enqueue_rejected("invalid_argument");
        return Err(e);
    }

    let suppression = SuppressionList::new(db);
    if suppression.is_suppressed(&request.recipient_email).await? {
        crate::metrics::record_enqueue_rejected("suppressed");
        return Err(EngineError::Suppressed(request.recipient_email.clone()));
    }

    let mut request = request.clone();
    apply_from_defaults(&mut request.template_data);

    let queue = QueueStore::new(db);
    let (id, status) = queue.enqueue(&request).await?;
    crate::metrics::record_enqueued(&request.email_type.to_value());

    Ok(EnqueueResponse { id, status })
}

/// Fill a missing `from`/`from_name` from `EMAIL_FROM`/`EMAIL_FROM_NAME` (§6).
fn apply_from_defaults(template_data: &mut crate::models::TemplateData) {
    if template_data.from.is_none() {
        template_data.from = Some(core_config::env_or_default("EMAIL_FROM", "noreply@example.com"));
    }
    if template_data.from_name.is_none() {
        template_data.from_name = Some(core_config::env_or_default("EMAIL_FROM_NAME", "Notifications"));
    }
}

fn validate(request: &EnqueueRequest) -> Result<(), EngineError> {
    if request.recipient_email.trim().is_empty() || !request.recipient_email.contains('@') {
        return Err(EngineError::InvalidArgument(
            "recipient_email must be a valid email address".into(),
        ));
    }
    if request.template_data.subject.trim().is_empty() {
        return Err(EngineError::InvalidArgument(
            "template_data.subject is required".into(),
        ));
    }
    if request.template_data.html.trim().is_empty() {
        return Err(EngineError::InvalidArgument(
            "template_data.html is required".into(),
        ));
    }
    if let Some(max_attempts) = request.max_attempts {
        if max_attempts < 1 {
            return Err(EngineError::InvalidArgument(
                "max_attempts must be at least 1".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmailType, TemplateData};

    fn valid_request() -> EnqueueRequest {
        EnqueueRequest {
            recipient_email: "user@example.com".into(),
            email_type: EmailType::Auth,
            template_data: TemplateData {
                subject: "Welcome".into(),
                html: "<p>hi</p>".into(),
                text: None,
                from: Some("noreply@example.com".into()),
                from_name: Some("Example".into()),
                reply_to: None,
            },
            max_attempts: None,
            dedup_key: None,
            scheduled_at: None,
        }
    }

    #[test]
    fn rejects_malformed_recipient() {
        let mut request = valid_request();
        request.recipient_email = "not-an-email".into();
        assert!(validate(&request).is_err());
    }

    #[test]
    fn rejects_empty_subject() {
        let mut request = valid_request();
        request.template_data.subject = "".into();
        assert!(validate(&request).is_err());
    }

    #[test]
    fn accepts_well_formed_request() {
        assert!(validate(&valid_request()).is_ok());
    }

    #[test]
    fn accepts_request_with_no_from() {
        let mut request = valid_request();
        request.template_data.from = None;
        request.template_data.from_name = None;
        assert!(validate(&request).is_ok());
    }

    #[test]
    fn fills_missing_from_from_config() {
        let mut template_data = valid_request().template_data;
        template_data.from = None;
        template_data.from_name = None;
        apply_from_defaults(&mut template_data);
        assert!(template_data.from.is_some());
        assert!(template_data.from_name.is_some());
    }
}
