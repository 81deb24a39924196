use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// One decoded line of the agent's stream, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    System(SystemEvent),
    Assistant(AssistantEvent),
    User(ToolResultEvent),
    Result(ResultEvent),
    /// Unrecognized `type` value, preserved rather than dropped.
    Unknown(String),
}

impl AgentEvent {
    /// Returns the session id carried by this event, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::System(event) => Some(&event.session_id),
            Self::Result(event) => Some(&event.session_id),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for AgentEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let event_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| de::Error::missing_field("type"))?
            .to_owned();

        let decoded = match event_type.as_str() {
            "system" => serde_json::from_value(value).map(Self::System),
            "assistant" => serde_json::from_value(value).map(Self::Assistant),
            "user" => serde_json::from_value(value).map(Self::User),
            "result" => serde_json::from_value(value).map(Self::Result),
            _ => return Ok(Self::Unknown(event_type)),
        };

        decoded.map_err(de::Error::custom)
    }
}

/// Turn-start announcement carrying the authoritative session id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SystemEvent {
    pub session_id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssistantEvent {
    pub message: AssistantMessage,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub role: Option<String>,
    pub content: Vec<AgentContentBlock>,
}

/// Content block inside an assistant message.
///
/// Unrecognized block types map to `Unknown` without failing the whole event.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    Unknown,
}

impl<'de> Deserialize<'de> for AgentContentBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let block_type = value.get("type").and_then(Value::as_str).unwrap_or("");

        match block_type {
            "text" => {
                let text = value
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| de::Error::missing_field("text"))?;
                Ok(Self::Text {
                    text: text.to_owned(),
                })
            }
            "tool_use" => {
                let id = value
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| de::Error::missing_field("id"))?;
                let name = value
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| de::Error::missing_field("name"))?;
                let input = value.get("input").cloned().unwrap_or(Value::Null);
                Ok(Self::ToolUse {
                    id: id.to_owned(),
                    name: name.to_owned(),
                    input,
                })
            }
            _ => Ok(Self::Unknown),
        }
    }
}

/// `user`-typed event delivering one or more tool results.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolResultEvent {
    pub message: ToolResultMessage,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolResultMessage {
    #[serde(default)]
    pub role: Option<String>,
    pub content: Vec<ToolResultBlock>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    #[serde(default)]
    pub content: Option<Value>,
}

/// Turn-end summary; its session id is authoritative for resumption.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultEvent {
    pub session_id: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub num_turns: Option<u64>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AgentContentBlock, AgentEvent};

    fn decode(line: &str) -> AgentEvent {
        serde_json::from_str(line).expect("event should decode")
    }

    #[test]
    fn system_event_carries_session_id_and_model() {
        let event = decode(r#"{"type":"system","session_id":"s1","model":"m","cwd":"/work"}"#);
        let AgentEvent::System(system) = event else {
            panic!("expected system event");
        };

        assert_eq!(system.session_id, "s1");
        assert_eq!(system.model.as_deref(), Some("m"));
        assert_eq!(system.cwd.as_deref(), Some("/work"));
    }

    #[test]
    fn assistant_event_decodes_text_and_tool_use_blocks() {
        let event = decode(
            r#"{"type":"assistant","message":{"role":"assistant","content":[
                {"type":"text","text":"running"},
                {"type":"tool_use","id":"tool-1","name":"Bash","input":{"command":"ls"}}
            ]}}"#,
        );
        let AgentEvent::Assistant(assistant) = event else {
            panic!("expected assistant event");
        };

        assert_eq!(
            assistant.message.content,
            vec![
                AgentContentBlock::Text {
                    text: "running".to_owned(),
                },
                AgentContentBlock::ToolUse {
                    id: "tool-1".to_owned(),
                    name: "Bash".to_owned(),
                    input: json!({"command": "ls"}),
                },
            ]
        );
    }

    #[test]
    fn unknown_content_block_type_does_not_fail_the_event() {
        let event = decode(
            r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"..."}]}}"#,
        );
        let AgentEvent::Assistant(assistant) = event else {
            panic!("expected assistant event");
        };

        assert_eq!(assistant.message.content, vec![AgentContentBlock::Unknown]);
    }

    #[test]
    fn user_event_decodes_tool_results_keyed_by_invocation_id() {
        let event = decode(
            r#"{"type":"user","message":{"role":"user","content":[
                {"type":"tool_result","tool_use_id":"tool-1","content":"ok"}
            ]}}"#,
        );
        let AgentEvent::User(user) = event else {
            panic!("expected user event");
        };

        assert_eq!(user.message.content.len(), 1);
        assert_eq!(user.message.content[0].tool_use_id, "tool-1");
        assert_eq!(user.message.content[0].content, Some(json!("ok")));
    }

    #[test]
    fn result_event_defaults_error_flag_to_false() {
        let event = decode(r#"{"type":"result","session_id":"s1","duration_ms":12.5}"#);
        let AgentEvent::Result(result) = event else {
            panic!("expected result event");
        };

        assert_eq!(result.session_id, "s1");
        assert!(!result.is_error);
        assert_eq!(result.duration_ms, Some(12.5));
    }

    #[test]
    fn unrecognized_type_is_preserved_as_unknown() {
        let event = decode(r#"{"type":"rate_limit_notice","detail":"soon"}"#);
        assert_eq!(event, AgentEvent::Unknown("rate_limit_notice".to_owned()));
    }

    #[test]
    fn session_id_accessor_covers_system_and_result() {
        assert_eq!(
            decode(r#"{"type":"system","session_id":"a"}"#).session_id(),
            Some("a")
        );
        assert_eq!(
            decode(r#"{"type":"result","session_id":"b"}"#).session_id(),
            Some("b")
        );
        assert_eq!(decode(r#"{"type":"other"}"#).session_id(), None);
    }
}
