use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::debug;

use super::Board;
use crate::api::ApiClient;
use crate::api::models::ChatAnswer;
use crate::command::Command;
use crate::query::{Mutation, MutationState, QueryError};

/// The chatbot conversation of one screen.
///
/// Questions are never cached or deduplicated, and only one question may be
/// pending at a time: asking again before the answer arrives fails with
/// [`QueryError::Busy`] instead of queuing.
#[derive(Clone)]
pub struct ChatAssistant {
    mutation: Mutation<String, ChatAnswer>,
}

impl ChatAssistant {
    pub fn new(api: Arc<ApiClient>) -> Self {
        let mutation = Mutation::new(move |question: String| {
            let api = api.clone();
            async move { api.chat_query(&question).await }.boxed()
        });
        Self { mutation }
    }

    /// Sends `question` with surrounding whitespace removed.
    pub async fn ask(&self, question: &str) -> Result<ChatAnswer, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }
        debug!(chars = question.chars().count(), "asking chatbot");
        self.mutation.execute_exclusive(question.to_owned()).await
    }

    /// [`ask`](Self::ask) as a `Command`.
    pub fn ask_command(&self, question: impl Into<String>) -> Command<Result<ChatAnswer, QueryError>> {
        let assistant = self.clone();
        let question = question.into();
        Command::future(async move { assistant.ask(&question).await })
    }

    pub fn is_pending(&self) -> bool {
        self.mutation.is_pending()
    }

    pub fn state(&self) -> MutationState<ChatAnswer> {
        self.mutation.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState<ChatAnswer>> {
        self.mutation.subscribe()
    }

    pub fn reset(&self) {
        self.mutation.reset();
    }
}

impl Board {
    /// A new chat conversation. Keep one per screen so its pending flag is shared.
    pub fn chat(&self) -> ChatAssistant {
        ChatAssistant::new(self.api.clone())
    }
}
