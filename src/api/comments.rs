use super::ApiClient;
use super::models::{Comment, CommentCreateRequest, ReportReason, ReportRequest};
use super::posts::{RECOMMEND_FAILED, REPORT_FAILED};
use crate::query::QueryError;

const LIST_FAILED: &str = "댓글 조회 중 오류가 발생했습니다.";
const REPLIES_FAILED: &str = "대댓글 조회 중 오류가 발생했습니다.";
const CREATE_FAILED: &str = "댓글 작성 중 오류가 발생했습니다.";
const DELETE_FAILED: &str = "댓글 삭제 중 오류가 발생했습니다.";

impl ApiClient {
    /// Top-level comments of a post.
    pub async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>, QueryError> {
        self.send(self.get(&["comments", "post", post_id]), LIST_FAILED)
            .await
    }

    pub async fn list_replies(&self, comment_id: &str) -> Result<Vec<Comment>, QueryError> {
        self.send(self.get(&["comments", comment_id, "replies"]), REPLIES_FAILED)
            .await
    }

    /// Creates a comment, or a reply when `parent_id` is set.
    pub async fn create_comment(&self, request: &CommentCreateRequest) -> Result<Comment, QueryError> {
        self.send(self.post(&["comments"]).json(request), CREATE_FAILED)
            .await
    }

    pub async fn delete_comment(&self, comment_id: &str) -> Result<(), QueryError> {
        self.send_empty(self.delete(&["comments", comment_id]), DELETE_FAILED)
            .await
    }

    pub async fn toggle_comment_recommend(&self, comment_id: &str) -> Result<(), QueryError> {
        let request = self.post(&["comments", comment_id, "recommend", "toggle"]);
        self.send_empty(request, RECOMMEND_FAILED).await
    }

    pub async fn report_comment(
        &self,
        comment_id: &str,
        reason: ReportReason,
    ) -> Result<(), QueryError> {
        let request = self
            .post(&["comments", comment_id, "report"])
            .json(&ReportRequest { reason });
        self.send_empty(request, REPORT_FAILED).await
    }
}
