//! Declared capability description.
//!
//! This is the document upserted into the daemon's registration record on
//! every start. The broader fabric uses it for discovery and help text; the
//! daemon itself never reads it back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The app's stable short name in the fabric.
pub const WHO: &str = "ayaye";

/// The daemon (and consumer group) name.
pub const DAEMON: &str = "ayaye-daemon";

/// Registration metadata: display title, help, and the command surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMeta {
    pub title: String,
    pub description: String,
    pub help: String,
    pub channel: String,
    pub commands: Vec<CommandMeta>,
}

/// One recognized command and its argument schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandMeta {
    pub name: String,
    pub description: String,
    pub help: String,
    pub requires: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<CommandExample>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usages: Vec<CommandUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandExample {
    pub meme: String,
    pub args: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandUsage {
    pub name: String,
    pub meme: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<CommandArg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandArg {
    pub name: String,
    pub description: String,
    pub format: String,
}

impl AppMeta {
    /// The capability description this build declares.
    pub fn declared() -> Self {
        Self {
            title: "the Ay Aye (AI) App".to_string(),
            description: "ayaye interface with this Unum.".to_string(),
            help: "Welcome to this ayaye App, how this Unum works with ChatGPT, etc.\n"
                .to_string(),
            channel: "unum-ayaye".to_string(),
            commands: vec![CommandMeta {
                name: "ask".to_string(),
                description: "Run a prompt and get an answer back.".to_string(),
                help: "Just sends what you type right to ChatGPT.\n\n\
                       You can take like a listing from some other command and feed that in \
                       here. Just type what you want it to do, ctrl-return for a new line, and \
                       paste in the listing.\n\n\
                       Just be careful. This costs money.\n"
                    .to_string(),
                requires: "none".to_string(),
                examples: vec![CommandExample {
                    meme: "?".to_string(),
                    args: "Do you know what a Unifist is?".to_string(),
                    description: "Sees if this project knows what we are".to_string(),
                }],
                usages: vec![CommandUsage {
                    name: "prompt".to_string(),
                    meme: "?".to_string(),
                    description: "Asks ChatGPT a general question".to_string(),
                    args: vec![CommandArg {
                        name: "question".to_string(),
                        description: "The question".to_string(),
                        format: "remainder".to_string(),
                    }],
                }],
            }],
        }
    }

    /// As the JSON document stored on the registration record.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
