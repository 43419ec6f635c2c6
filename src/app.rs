//! The ayaye app: one recognized command, `ask`.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::dispatch::App;
use crate::error::{AyayeError, Result};
use crate::event::{Event, EventKind, OutboundAct};
use crate::generation::Generator;
use crate::meta;
use crate::registry::Registry;

/// Instruction passed with every `ask` generation call.
const ASK_INSTRUCTIONS: &str = "Just a general question";

/// App implementation answering `ask` commands via the generation service.
pub struct AyayeApp {
    registry: Arc<dyn Registry>,
    generator: Arc<dyn Generator>,
    /// This daemon's registration id, stamped on outbound acts.
    app_id: Uuid,
}

impl AyayeApp {
    pub fn new(registry: Arc<dyn Registry>, generator: Arc<dyn Generator>, app_id: Uuid) -> Self {
        Self {
            registry,
            generator,
            app_id,
        }
    }

    /// Handle `ask`: gather fabric context, run one generation, and reply
    /// with a statement act chained back to the triggering event.
    async fn command_ask(&self, event: &Event) -> Result<Option<OutboundAct>> {
        let question = event
            .what
            .string_value("question")
            .ok_or(AyayeError::MissingArgument {
                command: "ask",
                argument: "question",
            })?;

        // Latent context for future prompts; the fabric is assumed healthy,
        // so a fetch failure here is fatal for the handler.
        let mut metas = Vec::new();
        for origin in self.registry.active_origins().await? {
            metas.push(origin.meta);
        }
        for app in self.registry.active_apps().await? {
            metas.push(app.meta);
        }
        tracing::debug!(peers = metas.len(), "Fabric context gathered");

        let text = self.generator.generate(ASK_INSTRUCTIONS, question).await?;

        let entity_id = event
            .entity_id
            .clone()
            .unwrap_or_default();
        let act = OutboundAct::statement(entity_id, self.app_id, text, event)?;
        Ok(Some(act))
    }
}

#[async_trait]
impl App for AyayeApp {
    fn who(&self) -> &str {
        meta::WHO
    }

    fn command_names(&self) -> &[&'static str] {
        &["ask"]
    }

    async fn handle(
        &self,
        command: &str,
        _kind: EventKind,
        event: &Event,
    ) -> Result<Option<OutboundAct>> {
        match command {
            "ask" => self.command_ask(event).await,
            // The dispatcher only routes names from command_names()
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockGenerator, MockRegistry};
    use serde_json::json;

    fn ask_event() -> Event {
        Event::decode(
            r#"{
                "entity_id": "e1",
                "what": {"command": "ask", "apps": ["ayaye"], "values": {"question": "2+2?"}},
                "meta": {"room": "lobby"}
            }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn ask_builds_a_statement_reply() {
        let app_id = Uuid::new_v4();
        let generator = Arc::new(MockGenerator::answering("4"));
        let app = AyayeApp::new(
            Arc::new(MockRegistry::with_active(&["e1"])),
            generator.clone(),
            app_id,
        );

        let act = app
            .handle("ask", EventKind::Fact, &ask_event())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(act.entity_id, "e1");
        assert_eq!(act.app_id, app_id);
        assert_eq!(act.what.base.as_deref(), Some("statement"));
        assert_eq!(act.what.text.as_deref(), Some("4"));
        let ancestor = act.what.ancestor.as_deref().unwrap();
        assert_eq!(ancestor.get("command"), Some(&json!("ask")));
        assert_eq!(act.meta["ancestor"]["room"], "lobby");

        let calls = generator.calls.lock().await;
        assert_eq!(calls.as_slice(), &[(ASK_INSTRUCTIONS.to_string(), "2+2?".to_string())]);
    }

    #[tokio::test]
    async fn ask_without_question_is_a_handler_failure() {
        let app = AyayeApp::new(
            Arc::new(MockRegistry::with_active(&["e1"])),
            Arc::new(MockGenerator::answering("4")),
            Uuid::new_v4(),
        );
        let event = Event::decode(
            r#"{"entity_id": "e1", "what": {"command": "ask", "apps": ["ayaye"]}}"#,
        )
        .unwrap();

        let error = app.handle("ask", EventKind::Fact, &event).await.unwrap_err();
        assert_eq!(error.kind(), "missing_argument");
        assert!(!error.is_fatal());
    }

    #[tokio::test]
    async fn generation_failure_produces_no_act() {
        let app = AyayeApp::new(
            Arc::new(MockRegistry::with_active(&["e1"])),
            Arc::new(MockGenerator::failing("rate limited")),
            Uuid::new_v4(),
        );

        let error = app
            .handle("ask", EventKind::Fact, &ask_event())
            .await
            .unwrap_err();
        assert_eq!(error.kind(), "generation");
        assert!(!error.is_fatal());
    }

    #[tokio::test]
    async fn context_fetch_failure_is_fatal_for_the_handler() {
        let app = AyayeApp::new(
            Arc::new(MockRegistry::with_active(&["e1"]).failing_peers()),
            Arc::new(MockGenerator::answering("4")),
            Uuid::new_v4(),
        );

        let error = app
            .handle("ask", EventKind::Fact, &ask_event())
            .await
            .unwrap_err();
        assert!(error.is_fatal());
    }
}
