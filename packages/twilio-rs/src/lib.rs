// Minimal Twilio Programmable Messaging client.
//
// https://www.twilio.com/docs/messaging/api/message-resource

use std::collections::HashMap;

use reqwest::{header, Client};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct TwilioOptions {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender phone number in E.164 format (or a messaging service SID)
    pub from: String,
}

/// Subset of the Message resource returned by Twilio
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub sid: String,
    pub status: String,
    pub to: String,
}

#[derive(Debug, Clone)]
pub struct TwilioService {
    options: TwilioOptions,
    client: Client,
}

impl TwilioService {
    pub fn new(options: TwilioOptions) -> Self {
        Self {
            options,
            client: Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{sid}/Messages.json",
            sid = self.options.account_sid
        )
    }

    /// Send a plain text SMS to `recipient`
    pub async fn send_sms(
        &self,
        recipient: &str,
        body: &str,
    ) -> Result<MessageResponse, &'static str> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let mut form_body: HashMap<&str, &str> = HashMap::new();
        form_body.insert("To", recipient);
        form_body.insert("Body", body);
        if self.options.from.starts_with("MG") {
            form_body.insert("MessagingServiceSid", &self.options.from);
        } else {
            form_body.insert("From", &self.options.from);
        }

        let res = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.options.account_sid, Some(&self.options.auth_token))
            .headers(headers)
            .form(&form_body)
            .send()
            .await;

        match res {
            Ok(response) => {
                if !response.status().is_success() {
                    return Err("Twilio returned an error");
                }

                response
                    .json::<MessageResponse>()
                    .await
                    .map_err(|_| "Error parsing message response")
            }
            Err(_) => Err("Error sending message"),
        }
    }
}
