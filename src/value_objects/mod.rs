//! Value objects for the turn engine
//!
//! Inbound [`Activity`] values arrive from the transport adapter once per turn;
//! [`OutgoingActivity`] values are what the engine hands back to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of an inbound or outbound activity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ActivityType {
    /// User message (text, attachments or a card submit value)
    Message,
    /// Programmatic event sent by the client
    Event,
    /// Members joined or left the conversation
    ConversationUpdate,
    /// Contact list change (skype)
    ContactRelationUpdate,
    /// Conversation was closed by the channel
    EndOfConversation,
    /// Typing indicator
    Typing,
}

/// A user or bot account on a channel
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelAccount {
    /// Channel-specific id
    pub id: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// File or card attached to an activity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// MIME type or card content type
    pub content_type: String,
    /// Where the file can be fetched from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    /// Inline content (cards)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Attachment {
    /// Attachment pointing at a downloadable file
    pub fn from_url(content_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            content_url: Some(url.into()),
            content: None,
            name: None,
        }
    }

    /// Inline card attachment
    pub fn card(content_type: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            content_type: content_type.into(),
            content_url: None,
            content: Some(content),
            name: None,
        }
    }
}

/// One inbound activity; exactly one is processed per turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Channel the activity came from (`webchat`, `skype`, ...)
    #[serde(default)]
    pub channel_id: String,
    /// Key of the persisted dialog state
    pub conversation_id: String,
    #[serde(default)]
    pub from: ChannelAccount,
    #[serde(default)]
    pub recipient: ChannelAccount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Card submit payload or event body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members_added: Vec<ChannelAccount>,
    /// Contact relation action (`add`/`remove`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Receive time when the transport sends none
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Activity {
    /// Create a bare activity of the given type
    pub fn new(activity_type: ActivityType, conversation_id: impl Into<String>) -> Self {
        Self {
            activity_type,
            id: Some(Uuid::new_v4().to_string()),
            channel_id: "directline".to_string(),
            conversation_id: conversation_id.into(),
            from: ChannelAccount::new("user"),
            recipient: ChannelAccount::new("bot"),
            text: None,
            attachments: Vec::new(),
            value: None,
            locale: None,
            members_added: Vec::new(),
            action: None,
            name: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a text message
    pub fn message(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut activity = Self::new(ActivityType::Message, conversation_id);
        activity.text = Some(text.into());
        activity
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Trimmed text, `None` when absent or blank
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// Whether this activity marks the user entering the conversation
    pub fn is_start_activity(&self) -> bool {
        match self.channel_id.as_str() {
            "skype" => {
                self.activity_type == ActivityType::ContactRelationUpdate
                    && self.action.as_deref() == Some("add")
            }
            "directline" | "emulator" | "webchat" | "msteams" => {
                self.activity_type == ActivityType::ConversationUpdate
                    && self
                        .members_added
                        .iter()
                        .any(|member| member.id == self.recipient.id)
            }
            _ => false,
        }
    }

    /// Build a text reply addressed back to the sender
    pub fn create_reply(&self, text: impl Into<String>) -> OutgoingActivity {
        let mut reply = OutgoingActivity::text(text);
        reply.locale = self.locale.clone();
        reply.reply_to_id = self.id.clone();
        reply
    }
}

/// Whether the client should open its input box after a reply
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum InputHint {
    AcceptingInput,
    ExpectingInput,
    IgnoringInput,
}

/// Content sent back to the transport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingActivity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speak: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Quick-reply buttons (prompt choices)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_hint: Option<InputHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

impl OutgoingActivity {
    /// Minimal message carrying only text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            activity_type: ActivityType::Message,
            text: Some(text.into()),
            speak: None,
            attachments: Vec::new(),
            suggested_actions: Vec::new(),
            input_hint: None,
            locale: None,
            reply_to_id: None,
        }
    }

    /// Message carrying a single card
    pub fn attachment(attachment: Attachment) -> Self {
        Self {
            text: None,
            attachments: vec![attachment],
            input_hint: Some(InputHint::AcceptingInput),
            ..Self::text("")
        }
    }

    pub fn with_suggested_actions(mut self, actions: Vec<String>) -> Self {
        self.suggested_actions = actions;
        self
    }

    pub fn with_input_hint(mut self, hint: InputHint) -> Self {
        self.input_hint = Some(hint);
        self
    }

    /// True when neither text nor attachments carry anything
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().is_none_or(str::is_empty) && self.attachments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_activity_detection() {
        let mut update = Activity::new(ActivityType::ConversationUpdate, "c1").with_channel("webchat");
        assert!(!update.is_start_activity());

        update.members_added.push(ChannelAccount::new("bot"));
        assert!(update.is_start_activity());

        let mut skype = Activity::new(ActivityType::ContactRelationUpdate, "c1").with_channel("skype");
        skype.action = Some("add".to_string());
        assert!(skype.is_start_activity());

        let mut unknown = update.clone();
        unknown.channel_id = "slack".to_string();
        assert!(!unknown.is_start_activity());
    }

    #[test]
    fn test_activity_wire_shape() {
        let activity = Activity::message("c1", "hallo").with_locale("de-DE");
        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["conversationId"], "c1");

        let back: Activity = serde_json::from_value(json).unwrap();
        assert_eq!(back.trimmed_text(), Some("hallo"));
    }

    #[test]
    fn test_minimal_transport_payload() {
        let before = Utc::now();
        let activity: Activity = serde_json::from_str(
            r#"{"type": "message", "conversationId": "c9", "text": "hi", "locale": "en"}"#,
        )
        .unwrap();

        assert_eq!(activity.conversation_id, "c9");
        assert_eq!(activity.trimmed_text(), Some("hi"));
        assert!(activity.timestamp >= before);
        assert!(activity.channel_id.is_empty());
    }
}
