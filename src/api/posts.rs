use tracing::debug;

use super::ApiClient;
use super::models::{
    Post, PostCreateRequest, PostListParams, PostPage, PostUpdateRequest, ReportReason,
    ReportRequest,
};
use crate::query::QueryError;

const LIST_FAILED: &str = "게시글 목록 조회 중 오류가 발생했습니다.";
const GET_FAILED: &str = "게시글 조회 중 오류가 발생했습니다.";
const CREATE_FAILED: &str = "게시글 작성 중 오류가 발생했습니다.";
const UPDATE_FAILED: &str = "게시글 수정 중 오류가 발생했습니다.";
const DELETE_FAILED: &str = "게시글 삭제 중 오류가 발생했습니다.";
pub(crate) const RECOMMEND_FAILED: &str = "추천 처리 중 오류가 발생했습니다.";
pub(crate) const REPORT_FAILED: &str = "신고 처리 중 오류가 발생했습니다.";

impl ApiClient {
    /// `GET /api/posts/cursor`
    pub async fn list_posts(&self, params: &PostListParams) -> Result<PostPage, QueryError> {
        debug!(?params, "listing posts");
        let request = self
            .get(&["api", "posts", "cursor"])
            .query(&params.to_query());
        self.send(request, LIST_FAILED).await
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Post, QueryError> {
        self.send(self.get(&["api", "posts", post_id]), GET_FAILED).await
    }

    pub async fn create_post(&self, request: &PostCreateRequest) -> Result<Post, QueryError> {
        let request = self.post(&["api", "posts"]).json(request);
        self.send(request, CREATE_FAILED).await
    }

    /// `PATCH /api/posts/{id}`
    pub async fn update_post(
        &self,
        post_id: &str,
        request: &PostUpdateRequest,
    ) -> Result<Post, QueryError> {
        let request = self.patch(&["api", "posts", post_id]).json(request);
        self.send(request, UPDATE_FAILED).await
    }

    pub async fn delete_post(&self, post_id: &str) -> Result<(), QueryError> {
        self.send_empty(self.delete(&["api", "posts", post_id]), DELETE_FAILED)
            .await
    }

    /// Flips the caller's recommendation of the post.
    pub async fn toggle_post_recommend(&self, post_id: &str) -> Result<(), QueryError> {
        let request = self.post(&["api", "posts", post_id, "recommend", "toggle"]);
        self.send_empty(request, RECOMMEND_FAILED).await
    }

    pub async fn report_post(&self, post_id: &str, reason: ReportReason) -> Result<(), QueryError> {
        let request = self
            .post(&["api", "posts", post_id, "report"])
            .json(&ReportRequest { reason });
        self.send_empty(request, REPORT_FAILED).await
    }
}
