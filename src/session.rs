//! A user session: one registry, one responder, one conversation.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::Config;
use crate::error::PreviewError;
use crate::models::{ConversationTurn, Outcome, Role, SubmitReport};
use crate::preview::{PreviewPayload, PreviewResolver};
use crate::progress::IngestProgressReporter;
use crate::registry::IngestionRegistry;
use crate::responder::{ExcerptResponder, Responder};

pub struct Session {
    registry: IngestionRegistry,
    responder: Box<dyn Responder>,
    preview: PreviewResolver,
    conversation: Mutex<Vec<ConversationTurn>>,
    clear_conversation_on_ingest: bool,
}

impl Session {
    pub fn new(
        registry: IngestionRegistry,
        responder: Box<dyn Responder>,
        preview: PreviewResolver,
        clear_conversation_on_ingest: bool,
    ) -> Self {
        Self {
            registry,
            responder,
            preview,
            conversation: Mutex::new(Vec::new()),
            clear_conversation_on_ingest,
        }
    }

    /// Session wired from configuration with the excerpt responder.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            IngestionRegistry::from_config(config)?,
            Box::new(ExcerptResponder::new(config.responder.excerpt_chars)),
            PreviewResolver::new(config.ingest.preview_chars),
            config.session.clear_conversation_on_ingest,
        ))
    }

    pub fn registry(&self) -> &IngestionRegistry {
        &self.registry
    }

    fn turns(&self) -> std::sync::MutexGuard<'_, Vec<ConversationTurn>> {
        self.conversation.lock().expect("conversation lock poisoned")
    }

    fn after_ingest(&self, accepted: bool) {
        if accepted && self.clear_conversation_on_ingest {
            let mut turns = self.turns();
            if !turns.is_empty() {
                debug!(turns = turns.len(), "new upload, clearing conversation");
                turns.clear();
            }
        }
    }

    pub async fn submit(&self, filename: &str, bytes: impl Into<Arc<[u8]>>) -> Outcome {
        let outcome = self.registry.submit(filename, bytes).await;
        self.after_ingest(outcome == Outcome::Accepted);
        outcome
    }

    pub async fn submit_batch<I>(
        &self,
        files: I,
        progress: &dyn IngestProgressReporter,
    ) -> Vec<SubmitReport>
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
        I::IntoIter: ExactSizeIterator,
    {
        let reports = self.registry.submit_batch(files, progress).await;
        self.after_ingest(reports.iter().any(|r| r.outcome == Outcome::Accepted));
        reports
    }

    /// Record the prompt, answer it from the current corpus, record the reply.
    pub fn answer(&self, prompt: &str) -> String {
        // Turns are recorded before the corpus lock drops, so a concurrent
        // clear either sees them or precedes the snapshot.
        self.registry.with_snapshot(|snapshot| {
            let reply = self.responder.answer(prompt, snapshot);
            let mut turns = self.turns();
            turns.push(ConversationTurn {
                role: Role::User,
                text: prompt.to_string(),
            });
            turns.push(ConversationTurn {
                role: Role::Assistant,
                text: reply.clone(),
            });
            reply
        })
    }

    pub fn conversation(&self) -> Vec<ConversationTurn> {
        self.turns().clone()
    }

    pub fn preview(&self, filename: &str) -> Result<PreviewPayload, PreviewError> {
        self.preview.preview(&self.registry, filename)
    }

    /// Drop every file and the conversation in one step.
    pub async fn clear(&self) {
        self.registry.clear_with(|| self.turns().clear()).await;
    }
}
