//! Wire messages of the real-time notification channel.
//!
//! Outbound: `{"type":"SUBSCRIBE","destination":"/topic/notifications/{userId}"}`
//! Inbound:  `{"type":"NOTIFICATION","payload":{..}}` or
//!           `{"type":"SUBSCRIBED","message":".."}`

use serde::{Deserialize, Serialize};

use super::notification::Notification;

const TOPIC_PREFIX: &str = "/topic/notifications/";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    Subscribe { destination: String },
}

impl ClientMessage {
    pub fn subscribe(user_id: &str) -> Self {
        ClientMessage::Subscribe {
            destination: format!("{}{}", TOPIC_PREFIX, user_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Notification { payload: Notification },
    Subscribed {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
