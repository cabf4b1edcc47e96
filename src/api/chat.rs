use super::ApiClient;
use super::models::{ChatAnswer, ChatRequest};
use crate::query::QueryError;

const CHAT_FAILED: &str = "서버 통신 중 오류가 발생했습니다.";

impl ApiClient {
    /// Asks the campus chatbot. The question is sent as given, with the
    /// client's language tag.
    pub async fn chat_query(&self, question: &str) -> Result<ChatAnswer, QueryError> {
        let request = self.post(&["chat", "query"]).json(&ChatRequest {
            question: question.to_owned(),
            lang: self.lang.clone(),
        });
        self.send(request, CHAT_FAILED).await
    }
}
