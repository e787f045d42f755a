//! A client for DingTalk-style markdown robot webhooks.

use crate::core::{NotificationMessage, NotificationTarget};
use crate::notification::DeliveryError;
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

/// The robot's reply body. Missing fields count as success.
#[derive(Debug, Default, Deserialize)]
struct RobotReply {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// Posts markdown messages to one webhook URL.
#[derive(Debug, Clone)]
pub struct DingTalkTarget {
    webhook_url: String,
    name: String,
    http: reqwest::Client,
}

impl DingTalkTarget {
    /// Creates a target for `webhook_url` sharing the given HTTP client.
    pub fn new(webhook_url: String, http: reqwest::Client) -> Self {
        let name = target_label(&webhook_url);
        Self {
            webhook_url,
            name,
            http,
        }
    }

    /// Builds the robot's markdown payload.
    pub fn payload(message: &NotificationMessage) -> Value {
        json!({
            "msgtype": "markdown",
            "markdown": {
                "title": message.title,
                "text": message.body,
            },
            "at": {
                "isAtAll": message.mention_all,
            },
        })
    }
}

#[async_trait]
impl NotificationTarget for DingTalkTarget {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, message), fields(target = %self.name))]
    async fn deliver(&self, message: &NotificationMessage) -> Result<(), DeliveryError> {
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&Self::payload(message))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let reply: RobotReply = serde_json::from_str(&text).unwrap_or_default();
        if reply.errcode != 0 {
            return Err(DeliveryError::Rejected {
                code: reply.errcode,
                message: reply.errmsg,
            });
        }

        debug!("Notification accepted by webhook.");
        Ok(())
    }
}

/// Host and path of the webhook, without the query string that usually
/// carries the access token.
fn target_label(webhook_url: &str) -> String {
    match Url::parse(webhook_url) {
        Ok(url) => format!("{}{}", url.host_str().unwrap_or_default(), url.path()),
        Err(_) => "webhook".to_string(),
    }
}
