//! Event model for the ledger streams.
//!
//! Facts and acts are structurally identical for this daemon: an actor id, a
//! `what` payload describing the event, and an open-ended `meta` context.
//! `What` is typed for the keys this daemon inspects and lossless for
//! everything else, so re-serializing an event (for ancestry chaining) never
//! drops fabric keys it does not understand.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Which stream entry field carried the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Fact,
    Act,
}

impl EventKind {
    /// The stream entry field key holding the JSON payload.
    pub const fn field_key(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Act => "act",
        }
    }

    /// Classify a stream entry by which payload field it carries.
    pub fn of_entry<'a, I>(field_keys: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for key in field_keys {
            match key {
                "fact" => return Some(Self::Fact),
                "act" => return Some(Self::Act),
                _ => {}
            }
        }
        None
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field_key())
    }
}

/// An event read off a ledger stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Actor that originated or is targeted by the event. Events without one
    /// are never eligible for dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// The event payload.
    #[serde(default)]
    pub what: What,

    /// Auxiliary context, opaque to this daemon beyond ancestry chaining.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
}

impl Event {
    /// Decode a JSON payload from a stream entry field.
    pub fn decode(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

/// The `what` mapping of an event.
///
/// Typed for the keys the dispatch decision tree reads; unknown keys survive
/// in `extra` via the flattened map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct What {
    /// Event category, e.g. "statement" or "command"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    /// Command name, when the event carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Command arguments. Older producers write `args`.
    #[serde(default, alias = "args", skip_serializing_if = "Map::is_empty")]
    pub values: Map<String, Value>,

    /// App names this event is addressed to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apps: Vec<String>,

    /// Failure marker set by upstream processing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,

    /// Accumulated failure markers from upstream processing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Value>,

    /// Statement text (outbound events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Causal link to the triggering event's `what`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ancestor: Option<Box<Value>>,

    /// Fabric keys this daemon does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl What {
    /// Whether any failure marker is set. Error-flagged events are inert for
    /// this consumer.
    pub fn has_error(&self) -> bool {
        self.error.as_ref().is_some_and(truthy) || !self.errors.is_empty()
    }

    /// Whether this is a command addressed to the given app.
    pub fn is_command_for(&self, who: &str) -> bool {
        self.command.is_some() && self.apps.iter().any(|app| app == who)
    }

    /// Look up a string argument by name.
    pub fn string_value(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }
}

/// Truthiness the fabric's producers assume: null, false, zero, and empty
/// containers all count as "no error".
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// A newly created act, ready to append to the outbound stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundAct {
    /// Target of the reply
    pub entity_id: String,
    /// This daemon's registration id
    pub app_id: Uuid,
    /// Unix timestamp of creation
    pub when: i64,
    pub what: What,
    pub meta: Value,
}

impl OutboundAct {
    /// Build a statement act replying to a triggering event, chaining both
    /// ancestry links back to it.
    pub fn statement(
        entity_id: impl Into<String>,
        app_id: Uuid,
        text: impl Into<String>,
        trigger: &Event,
    ) -> serde_json::Result<Self> {
        let ancestor = serde_json::to_value(&trigger.what)?;
        let what = What {
            base: Some("statement".to_string()),
            text: Some(text.into()),
            ancestor: Some(Box::new(ancestor)),
            ..Default::default()
        };
        Ok(Self {
            entity_id: entity_id.into(),
            app_id,
            when: Utc::now().timestamp(),
            what,
            meta: serde_json::json!({ "ancestor": trigger.meta }),
        })
    }

    /// Serialize for the `act` field of a stream entry.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ask_event() -> Event {
        Event::decode(
            r#"{
                "entity_id": "e1",
                "what": {
                    "base": "command",
                    "command": "ask",
                    "apps": ["ayaye"],
                    "values": {"question": "2+2?"},
                    "channel": "general"
                },
                "meta": {"room": "lobby"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn decodes_a_command_event() {
        let event = ask_event();
        assert_eq!(event.entity_id.as_deref(), Some("e1"));
        assert!(event.what.is_command_for("ayaye"));
        assert!(!event.what.is_command_for("scribe"));
        assert_eq!(event.what.string_value("question"), Some("2+2?"));
        assert!(!event.what.has_error());
    }

    #[test]
    fn args_alias_is_accepted() {
        let event = Event::decode(
            r#"{"entity_id": "e1", "what": {"command": "ask", "args": {"question": "why?"}}}"#,
        )
        .unwrap();
        assert_eq!(event.what.string_value("question"), Some("why?"));
    }

    #[test]
    fn error_markers_follow_producer_truthiness() {
        let mut what = What::default();
        assert!(!what.has_error());

        what.error = Some(json!(null));
        assert!(!what.has_error());
        what.error = Some(json!(""));
        assert!(!what.has_error());
        what.error = Some(json!({}));
        assert!(!what.has_error());
        what.error = Some(json!("timeout upstream"));
        assert!(what.has_error());

        what.error = None;
        what.errors = vec![json!("bad")];
        assert!(what.has_error());
    }

    #[test]
    fn unknown_keys_round_trip() {
        let event = ask_event();
        assert_eq!(event.what.extra.get("channel"), Some(&json!("general")));

        let raw = serde_json::to_value(&event.what).unwrap();
        assert_eq!(raw.get("channel"), Some(&json!("general")));
    }

    #[test]
    fn statement_chains_both_ancestors() {
        let trigger = ask_event();
        let app_id = Uuid::new_v4();
        let act = OutboundAct::statement("e1", app_id, "4", &trigger).unwrap();

        assert_eq!(act.entity_id, "e1");
        assert_eq!(act.app_id, app_id);
        assert_eq!(act.what.base.as_deref(), Some("statement"));
        assert_eq!(act.what.text.as_deref(), Some("4"));

        let ancestor = act.what.ancestor.as_deref().unwrap();
        assert_eq!(ancestor.get("command"), Some(&json!("ask")));
        assert_eq!(act.meta.get("ancestor"), Some(&json!({"room": "lobby"})));
    }

    #[test]
    fn entry_classification_by_field_key() {
        assert_eq!(EventKind::of_entry(["fact"]), Some(EventKind::Fact));
        assert_eq!(EventKind::of_entry(["act"]), Some(EventKind::Act));
        assert_eq!(EventKind::of_entry(["other"]), None);
    }
}
