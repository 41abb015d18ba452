//! Inbound and outbound WebSocket messages.

use serde::{Deserialize, Serialize};

use crate::document::{DocumentKind, Question};

// ============================================================================
// Commands (Client -> Broker)
// ============================================================================

/// Messages sent from the client to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    // ========== Shell ==========
    /// Start the shell session. Geometry defaults to 80x24.
    #[serde(rename = "terminal:start")]
    TerminalStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cols: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rows: Option<u16>,
    },

    /// Raw keystrokes for the shell.
    #[serde(rename = "terminal:input")]
    TerminalInput { data: String },

    #[serde(rename = "terminal:resize")]
    TerminalResize { cols: u16, rows: u16 },

    #[serde(rename = "terminal:close")]
    TerminalClose,

    /// Change the shell's working directory.
    #[serde(rename = "config:setWorkingDir")]
    SetWorkingDir { path: String },

    // ========== Assistant ==========
    // Older clients send the `gemini:*` discriminants.
    /// Start the assistant CLI and its question flow.
    #[serde(rename = "assistant:start", alias = "gemini:terminal:start")]
    AssistantStart {
        #[serde(alias = "docType")]
        document_kind: DocumentKind,
        /// Document text at session start. Never re-synced afterwards.
        #[serde(default, alias = "currentContent")]
        text_snapshot: String,
        /// Injected into the assistant process environment when present.
        #[serde(default, alias = "apiKey", skip_serializing_if = "Option::is_none")]
        credential: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cols: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rows: Option<u16>,
    },

    /// Raw keystrokes for the assistant CLI.
    #[serde(rename = "assistant:input", alias = "gemini:terminal:input")]
    AssistantInput { data: String },

    #[serde(rename = "assistant:resize", alias = "gemini:terminal:resize")]
    AssistantResize { cols: u16, rows: u16 },

    #[serde(rename = "assistant:answer", alias = "gemini:question:answer")]
    AssistantAnswer {
        question_id: String,
        #[serde(alias = "answer")]
        answer_text: String,
    },

    #[serde(rename = "assistant:getImprovements", alias = "gemini:get:improvements")]
    AssistantGetImprovements,

    #[serde(rename = "assistant:close", alias = "gemini:terminal:close")]
    AssistantClose,
}

impl ClientMessage {
    /// Wire discriminant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TerminalStart { .. } => "terminal:start",
            Self::TerminalInput { .. } => "terminal:input",
            Self::TerminalResize { .. } => "terminal:resize",
            Self::TerminalClose => "terminal:close",
            Self::SetWorkingDir { .. } => "config:setWorkingDir",
            Self::AssistantStart { .. } => "assistant:start",
            Self::AssistantInput { .. } => "assistant:input",
            Self::AssistantResize { .. } => "assistant:resize",
            Self::AssistantAnswer { .. } => "assistant:answer",
            Self::AssistantGetImprovements => "assistant:getImprovements",
            Self::AssistantClose => "assistant:close",
        }
    }
}

// ============================================================================
// Events (Broker -> Client)
// ============================================================================

/// Messages sent from the broker to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    // ========== Connection ==========
    /// Sent once right after the WebSocket upgrade.
    #[serde(rename = "connection:status")]
    ConnectionStatus { connected: bool },

    #[serde(rename = "error")]
    Error { message: String },

    // ========== Shell ==========
    #[serde(rename = "terminal:ready")]
    TerminalReady,

    #[serde(rename = "terminal:output")]
    TerminalOutput { data: String },

    #[serde(rename = "terminal:exit")]
    TerminalExit { code: i32 },

    #[serde(rename = "config:workingDir")]
    WorkingDir { path: String },

    // ========== Assistant raw stream ==========
    #[serde(rename = "assistant:ready")]
    AssistantReady,

    #[serde(rename = "assistant:output")]
    AssistantOutput { data: String },

    #[serde(rename = "assistant:exit")]
    AssistantExit { code: i32 },

    // ========== Assistant question flow ==========
    #[serde(rename = "assistant:question:new")]
    QuestionNew { question: Question },

    #[serde(rename = "assistant:question:answered")]
    QuestionAnswered {
        question_id: String,
        answer_text: String,
    },

    /// Interview completeness, 0 to 100.
    #[serde(rename = "assistant:completeness")]
    Completeness { completeness: u8 },

    #[serde(rename = "assistant:improvements")]
    Improvements { improvements: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_terminal_start_defaults() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"terminal:start"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::TerminalStart {
                cols: None,
                rows: None
            }
        );
    }

    #[test]
    fn test_parse_assistant_start_legacy_field_names() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "assistant:start",
            "docType": "userProfile",
            "currentContent": "# Users",
            "apiKey": "k-123"
        }))
        .unwrap();

        match msg {
            ClientMessage::AssistantStart {
                document_kind,
                text_snapshot,
                credential,
                ..
            } => {
                assert_eq!(document_kind, DocumentKind::UserProfile);
                assert_eq!(text_snapshot, "# Users");
                assert_eq!(credential.as_deref(), Some("k-123"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_answer_camel_case() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "assistant:answer",
            "questionId": "problem",
            "answerText": "Lack of existing tools"
        }))
        .unwrap();
        assert_eq!(msg.kind(), "assistant:answer");
    }

    #[test]
    fn test_unit_commands_parse() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"assistant:getImprovements"}"#).unwrap();
        assert_eq!(msg, ClientMessage::AssistantGetImprovements);
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"terminal:close"}"#).unwrap();
        assert_eq!(msg, ClientMessage::TerminalClose);
    }

    #[test]
    fn test_parse_gemini_discriminants() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "gemini:terminal:start",
            "docType": "vision",
            "currentContent": ""
        }))
        .unwrap();
        assert_eq!(msg.kind(), "assistant:start");

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"gemini:terminal:input","data":"y\r"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::AssistantInput {
                data: "y\r".to_string()
            }
        );

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"gemini:terminal:resize","cols":120,"rows":40}"#)
                .unwrap();
        assert_eq!(msg, ClientMessage::AssistantResize { cols: 120, rows: 40 });

        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "gemini:question:answer",
            "questionId": "problem",
            "answer": "Inefficient workflow"
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::AssistantAnswer {
                question_id: "problem".to_string(),
                answer_text: "Inefficient workflow".to_string(),
            }
        );

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"gemini:get:improvements"}"#).unwrap();
        assert_eq!(msg, ClientMessage::AssistantGetImprovements);
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"gemini:terminal:close"}"#).unwrap();
        assert_eq!(msg, ClientMessage::AssistantClose);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"gemini:send"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"data":"ls"}"#).is_err());
    }

    #[test]
    fn test_server_message_shapes() {
        let json = serde_json::to_value(ServerMessage::QuestionAnswered {
            question_id: "problem".to_string(),
            answer_text: "Other".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "assistant:question:answered");
        assert_eq!(json["questionId"], "problem");
        assert_eq!(json["answerText"], "Other");

        let json = serde_json::to_value(ServerMessage::TerminalReady).unwrap();
        assert_eq!(json, json!({"type": "terminal:ready"}));

        let json = serde_json::to_value(ServerMessage::Completeness { completeness: 50 }).unwrap();
        assert_eq!(json["completeness"], 50);
    }
}
