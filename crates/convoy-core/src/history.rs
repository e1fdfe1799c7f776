//! Conversation history items and approval records.
//!
//! These are the items exchanged with clients: the request `messages`
//! array, the authoritative `history` in `done`/`interruption` frames,
//! and the display history the reassembler maintains.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of a conversation history.
///
/// A `function_call` and its `function_call_result` are correlated by
/// `callId`. A result arriving before, or never arriving for, its call
/// is legal: the call simply stays in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HistoryItem {
    #[serde(rename = "message")]
    Message {
        role: String,
        #[serde(default)]
        content: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },

    #[serde(rename = "function_call")]
    FunctionCall {
        name: String,
        #[serde(default)]
        arguments: String,
        #[serde(rename = "callId")]
        call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    #[serde(rename = "function_call_result")]
    FunctionCallResult {
        #[serde(rename = "callId")]
        call_id: String,
        #[serde(default)]
        output: Value,
    },

    #[serde(rename = "reasoning_item")]
    Reasoning {
        #[serde(default)]
        content: String,
    },
}

impl HistoryItem {
    pub fn user_text(text: impl Into<String>) -> Self {
        HistoryItem::Message {
            role: "user".into(),
            content: Value::String(text.into()),
            status: None,
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        HistoryItem::Message {
            role: "assistant".into(),
            content: Value::String(text.into()),
            status: None,
        }
    }

    pub fn is_assistant_message(&self) -> bool {
        matches!(self, HistoryItem::Message { role, .. } if role == "assistant")
    }

    /// An assistant message with no content yet (streaming placeholder).
    pub fn is_empty_assistant_placeholder(&self) -> bool {
        match self {
            HistoryItem::Message { role, content, .. } if role == "assistant" => match content {
                Value::Array(items) => items.is_empty(),
                Value::String(s) => s.is_empty(),
                Value::Null => true,
                _ => false,
            },
            _ => false,
        }
    }
}

/// A tool call awaiting an external approval decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    #[serde(rename = "approvalId")]
    pub approval_id: String,
    #[serde(rename = "callId")]
    pub call_id: String,
    #[serde(rename = "toolName", default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A client decision on a pending approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

/// Mint a conversation id: `conv_` followed by 24 lowercase hex chars.
pub fn new_conversation_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("conv_{}", &hex[..24])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_id_shape() {
        let id = new_conversation_id();
        assert!(id.starts_with("conv_"));
        let hex = &id["conv_".len()..];
        assert_eq!(hex.len(), 24);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_history_item_wire_names() {
        let item = HistoryItem::FunctionCall {
            name: "getWeather".into(),
            arguments: r#"{"city":"Paris"}"#.into(),
            call_id: "c1".into(),
            id: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "function_call");
        assert_eq!(json["callId"], "c1");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_empty_assistant_placeholder() {
        let placeholder = HistoryItem::Message {
            role: "assistant".into(),
            content: Value::Array(vec![]),
            status: Some("in_progress".into()),
        };
        assert!(placeholder.is_empty_assistant_placeholder());
        assert!(!HistoryItem::assistant_text("hi").is_empty_assistant_placeholder());
        assert!(!HistoryItem::user_text("").is_empty_assistant_placeholder());
    }
}
