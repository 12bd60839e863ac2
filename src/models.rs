//! A representative slice of the platform's payloads.
//!
//! The full model catalogue is plain serialization glue; the types here are the ones the
//! crate's own examples and tests route through the gateway. Any other payload can be
//! registered with [`crate::gateway::EventDispatchTable::register`] or by implementing
//! [`crate::gateway::Event`].

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::types::{DateTime, Utc, Uuid};

/// Whether a message was written by a user/bot or generated by the platform.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Default,
    System,
}

/// A chat message.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub server_id: Option<String>,
    pub channel_id: Uuid,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    #[builder(default)]
    pub reply_message_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    /// ID of the user or bot that created the message
    pub created_by: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// What remains of a message after deletion.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMessage {
    pub id: Uuid,
    #[serde(default)]
    pub server_id: Option<String>,
    pub channel_id: Uuid,
    pub deleted_at: DateTime<Utc>,
    #[serde(default)]
    pub is_private: bool,
}

/// `ChatMessageCreated` gateway event.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageCreated {
    #[serde(default)]
    pub server_id: Option<String>,
    pub message: ChatMessage,
}

/// `ChatMessageUpdated` gateway event.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageUpdated {
    #[serde(default)]
    pub server_id: Option<String>,
    pub message: ChatMessage,
}

/// `ChatMessageDeleted` gateway event.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageDeleted {
    #[serde(default)]
    pub server_id: Option<String>,
    pub message: DeletedMessage,
}

#[cfg(feature = "gateway")]
mod events {
    use super::{ChatMessageCreated, ChatMessageDeleted, ChatMessageUpdated};
    use crate::gateway::Event;

    impl Event for ChatMessageCreated {
        const NAME: &'static str = "ChatMessageCreated";
    }

    impl Event for ChatMessageUpdated {
        const NAME: &'static str = "ChatMessageUpdated";
    }

    impl Event for ChatMessageDeleted {
        const NAME: &'static str = "ChatMessageDeleted";
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn chat_message_created_should_succeed() {
        let event: ChatMessageCreated = serde_json::from_value(json!({
            "serverId": "wlVr3Ggl",
            "message": {
                "id": "00000000-0000-0000-0000-000000000001",
                "type": "default",
                "serverId": "wlVr3Ggl",
                "channelId": "00000000-0000-0000-0000-0000000000c1",
                "content": "Hello **world**!",
                "createdAt": "2021-06-15T20:15:00.706Z",
                "createdBy": "Ann6LewA"
            }
        }))
        .expect("valid payload");

        assert_eq!(event.server_id.as_deref(), Some("wlVr3Ggl"));
        assert_eq!(event.message.message_type, MessageType::Default);
        assert_eq!(event.message.content.as_deref(), Some("Hello **world**!"));
        assert!(event.message.reply_message_ids.is_empty());
        assert!(event.message.updated_at.is_none());
    }

    #[test]
    fn chat_message_deleted_should_succeed() {
        let event: ChatMessageDeleted = serde_json::from_value(json!({
            "serverId": "wlVr3Ggl",
            "message": {
                "id": "00000000-0000-0000-0000-000000000001",
                "serverId": "wlVr3Ggl",
                "channelId": "00000000-0000-0000-0000-0000000000c1",
                "deletedAt": "2021-06-15T20:16:00.000Z",
                "isPrivate": true
            }
        }))
        .expect("valid payload");

        assert!(event.message.is_private);
    }
}
