//! Amazon SES adapter (§6): SigV4-signed `x-www-form-urlencoded` calls
//! against the regional SES endpoint.

pub mod sigv4;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use super::{classify_status, classify_transport_error, EmailAdapter, SendOutcome, UPSTREAM_TIMEOUT};
use crate::error::EngineError;
use crate::models::TemplateData;

/// SES's XML `<Code>` for a rejected-recipient error; other 400s
/// (malformed parameters, missing fields) are transient.
const BOUNCE_MARKERS: &[&str] = &["MessageRejected"];

pub struct SesAdapter {
    client: Client,
    access_key: String,
    secret_key: String,
    region: String,
}

impl SesAdapter {
    pub fn new(access_key: String, secret_key: String, region: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(UPSTREAM_TIMEOUT)
                .build()
                .expect("failed to build reqwest client"),
            access_key,
            secret_key,
            region,
        }
    }

    fn host(&self) -> String {
        format!("email.{}.amazonaws.com", self.region)
    }

    fn endpoint(&self) -> String {
        format!("https://{}/", self.host())
    }

    async fn call(&self, body: &str) -> Result<String, EngineError> {
        let amz_date = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let headers = sigv4::sign(
            &self.access_key,
            &self.secret_key,
            &self.region,
            "ses",
            &self.host(),
            "/",
            body,
            &amz_date,
        );

        let resp = self
            .client
            .post(self.endpoint())
            .header("Host", headers.host)
            .header("X-Amz-Date", headers.x_amz_date)
            .header("Authorization", headers.authorization)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| EngineError::TransientProviderError(format!("bad response body: {e}")))?;

        if status != 200 {
            return Err(classify_status(status, &text, BOUNCE_MARKERS));
        }
        Ok(text)
    }
}

#[derive(Deserialize)]
struct SendEmailResponse {
    #[serde(rename = "SendEmailResult")]
    result: SendEmailResult,
}

#[derive(Deserialize)]
struct SendEmailResult {
    #[serde(rename = "MessageId")]
    message_id: String,
}

#[derive(Deserialize)]
struct GetSendQuotaResponse {
    #[serde(rename = "GetSendQuotaResult")]
    result: GetSendQuotaResult,
}

#[derive(Deserialize)]
struct GetSendQuotaResult {
    #[serde(rename = "Max24HourSend")]
    max_24_hour_send: f64,
}

#[async_trait]
impl EmailAdapter for SesAdapter {
    async fn send(
        &self,
        recipient_email: &str,
        template_data: &TemplateData,
    ) -> Result<SendOutcome, EngineError> {
        let from = format!(
            "{} <{}>",
            template_data.from_name.as_deref().unwrap_or_default(),
            template_data.from.as_deref().unwrap_or_default(),
        );
        let body = format!(
            "Action=SendEmail&Source={}&Destination.ToAddresses.member.1={}&Message.Subject.Data={}&Message.Body.Html.Data={}",
            urlencoding::encode(&from),
            urlencoding::encode(recipient_email),
            urlencoding::encode(&template_data.subject),
            urlencoding::encode(&template_data.html),
        );

        let xml = self.call(&body).await?;
        let parsed: SendEmailResponse = quick_xml::de::from_str(&xml)
            .map_err(|e| EngineError::TransientProviderError(format!("bad SES XML: {e}")))?;

        Ok(SendOutcome {
            provider_message_id: parsed.result.message_id,
        })
    }

    async fn get_quota_live(&self) -> Result<Option<i32>, EngineError> {
        let xml = self.call("Action=GetSendQuota").await?;
        let parsed: GetSendQuotaResponse = quick_xml::de::from_str(&xml)
            .map_err(|e| EngineError::TransientProviderError(format!("bad SES XML: {e}")))?;
        Ok(Some(parsed.result.max_24_hour_send as i32))
    }

    async fn ping(&self) -> Result<(), EngineError> {
        self.get_quota_live().await.map(|_| ())
    }
}
