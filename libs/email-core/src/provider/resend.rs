//! Resend adapter (§6): bearer-token JSON API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{classify_status, classify_transport_error, EmailAdapter, SendOutcome, UPSTREAM_TIMEOUT};
use crate::error::EngineError;
use crate::models::TemplateData;

const BASE_URL: &str = "https://api.resend.com";

/// Resend's `name` field for a rejected-recipient error (the rest of its
/// 400/422 validation errors are transient: bad template fields, etc).
const BOUNCE_MARKERS: &[&str] = &["invalid_to_address", "invalid_from_address"];

pub struct ResendAdapter {
    client: Client,
    api_key: String,
}

impl ResendAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(UPSTREAM_TIMEOUT)
                .build()
                .expect("failed to build reqwest client"),
            api_key,
        }
    }
}

#[derive(Deserialize)]
struct ResendSendResponse {
    id: String,
}

#[async_trait]
impl EmailAdapter for ResendAdapter {
    async fn send(
        &self,
        recipient_email: &str,
        template_data: &TemplateData,
    ) -> Result<SendOutcome, EngineError> {
        let body = json!({
            "from": format!(
                "{} <{}>",
                template_data.from_name.as_deref().unwrap_or_default(),
                template_data.from.as_deref().unwrap_or_default(),
            ),
            "to": [recipient_email],
            "subject": template_data.subject,
            "html": template_data.html,
        });

        let resp = self
            .client
            .post(format!("{BASE_URL}/emails"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &text, BOUNCE_MARKERS));
        }

        let parsed: ResendSendResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::TransientProviderError(format!("bad response body: {e}")))?;

        Ok(SendOutcome {
            provider_message_id: parsed.id,
        })
    }

    async fn get_quota_live(&self) -> Result<Option<i32>, EngineError> {
        Ok(None)
    }

    async fn ping(&self) -> Result<(), EngineError> {
        let resp = self
            .client
            .get(format!("{BASE_URL}/domains"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &text, BOUNCE_MARKERS));
        }
        Ok(())
    }
}
