//! Brevo adapter (§6): `api-key` header JSON API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{classify_status, classify_transport_error, EmailAdapter, SendOutcome, UPSTREAM_TIMEOUT};
use crate::error::EngineError;
use crate::models::TemplateData;

const BASE_URL: &str = "https://api.brevo.com/v3";

/// Markers Brevo's 400/422 body carries for a rejected-recipient error;
/// its other 400s (missing/invalid unrelated parameters) are transient.
const BOUNCE_MARKERS: &[&str] = &["invalid email address", "invalid recipient"];

pub struct BrevoAdapter {
    client: Client,
    api_key: String,
}

impl BrevoAdapter {
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
struct BrevoSendResponse {
    #[serde(rename = "messageId")]
    message_id: String,
}

#[derive(Deserialize)]
struct BrevoAccountResponse {
    plan: Vec<BrevoPlan>,
}

#[derive(Deserialize)]
struct BrevoPlan {
    credits: f64,
    #[serde(rename = "creditsType")]
    credits_type: String,
}

#[async_trait]
impl EmailAdapter for BrevoAdapter {
    async fn send(
        &self,
        recipient_email: &str,
        template_data: &TemplateData,
    ) -> Result<SendOutcome, EngineError> {
        let body = json!({
            "sender": {
                "email": template_data.from.as_deref().unwrap_or_default(),
                "name": template_data.from_name.as_deref().unwrap_or_default(),
            },
            "to": [{ "email": recipient_email }],
            "subject": template_data.subject,
            "htmlContent": template_data.html,
        });

        let resp = self
            .client
            .post(format!("{BASE_URL}/smtp/email"))
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &text, BOUNCE_MARKERS));
        }

        let parsed: BrevoSendResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::TransientProviderError(format!("bad response body: {e}")))?;

        Ok(SendOutcome {
            provider_message_id: parsed.message_id,
        })
    }

    /// Reads `GET /account`'s `plan[].credits` for the `sendLimit` plan,
    /// the remaining daily send credits (mirrors SES's `Max24HourSend`).
    async fn get_quota_live(&self) -> Result<Option<i32>, EngineError> {
        let resp = self
            .client
            .get(format!("{BASE_URL}/account"))
            .header("api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &text, BOUNCE_MARKERS));
        }

        let parsed: BrevoAccountResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::TransientProviderError(format!("bad response body: {e}")))?;

        let credits = parsed
            .plan
            .iter()
            .find(|p| p.credits_type == "sendLimit")
            .or_else(|| parsed.plan.first())
            .map(|p| p.credits as i32);

        Ok(credits)
    }

    async fn ping(&self) -> Result<(), EngineError> {
        let resp = self
            .client
            .get(format!("{BASE_URL}/account"))
            .header("api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &text, BOUNCE_MARKERS));
        }
        Ok(())
    }
}
