//! Wire models exchanged with the board backend (JSON, camelCase).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::query::Page;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub author_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub recommend_count: u32,
    #[serde(default)]
    pub report_count: u32,
    #[serde(default)]
    pub comment_count: u32,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub blinded_at: Option<String>,
    #[serde(default)]
    pub blinded_reason: Option<String>,
    #[serde(default)]
    pub reported: bool,
    #[serde(default)]
    pub recommended: bool,
}

/// One page of `GET /api/posts/cursor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    pub items: Vec<Post>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_next: bool,
}

impl Page for PostPage {
    type Item = Post;

    fn items(&self) -> &[Post] {
        &self.items
    }

    fn next_cursor(&self) -> Option<&str> {
        if self.has_next {
            self.next_cursor.as_deref().filter(|cursor| !cursor.is_empty())
        } else {
            None
        }
    }
}

/// Query parameters of the post list. Empty values are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostListParams {
    pub keyword: Option<String>,
    pub after: Option<String>,
    pub limit: Option<u32>,
}

impl PostListParams {
    pub(crate) fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::with_capacity(3);
        let present = |value: &Option<String>| value.clone().filter(|v| !v.trim().is_empty());
        if let Some(keyword) = present(&self.keyword) {
            query.push(("keyword", keyword));
        }
        if let Some(after) = present(&self.after) {
            query.push(("after", after));
        }
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        query
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreateRequest {
    pub author_id: String,
    pub title: String,
    pub content: String,
}

pub type PostUpdateRequest = PostCreateRequest;

/// Why a post or comment is reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReportReason {
    Spam,
    Abuse,
    Obscene,
    Etc,
    Other(String),
}

impl ReportReason {
    /// The fixed reasons offered in the report dialog.
    pub const PRESETS: [Self; 4] = [Self::Spam, Self::Abuse, Self::Obscene, Self::Etc];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Spam => "스팸/도배",
            Self::Abuse => "욕설/비방",
            Self::Obscene => "음란성",
            Self::Etc => "기타",
            Self::Other(reason) => reason,
        }
    }
}

impl fmt::Display for ReportReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ReportReason {
    fn from(reason: String) -> Self {
        match reason.as_str() {
            "스팸/도배" => Self::Spam,
            "욕설/비방" => Self::Abuse,
            "음란성" => Self::Obscene,
            "기타" => Self::Etc,
            _ => Self::Other(reason),
        }
    }
}

impl From<&str> for ReportReason {
    fn from(reason: &str) -> Self {
        Self::from(reason.to_owned())
    }
}

impl From<ReportReason> for String {
    fn from(reason: ReportReason) -> Self {
        match reason {
            ReportReason::Other(reason) => reason,
            preset => preset.as_str().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub reason: ReportReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub author_name: String,
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub recommend_count: u32,
    #[serde(default)]
    pub report_count: u32,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub is_recommended: bool,
    #[serde(default)]
    pub is_reported: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentCreateRequest {
    pub post_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    pub lang: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<ChatSource>,
}

/// A document the chatbot cited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSource {
    pub doc_id: i64,
    pub title: String,
    pub link: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_post_defaults_missing_counters() {
        let post: Post = serde_json::from_value(json!({
            "id": "P1",
            "title": "시험 범위",
            "content": "중간고사 범위가 어디까지인가요?"
        }))
        .expect("decode");
        assert_eq!(post.recommend_count, 0);
        assert!(!post.recommended);
        assert_eq!(post.blinded_at, None);
    }

    #[test]
    fn test_post_page_cursor_requires_has_next() {
        let page: PostPage = serde_json::from_value(json!({
            "items": [],
            "nextCursor": "c2",
            "hasNext": false
        }))
        .expect("decode");
        assert_eq!(Page::next_cursor(&page), None);

        let page = PostPage {
            has_next: true,
            ..page
        };
        assert_eq!(Page::next_cursor(&page), Some("c2"));
    }

    #[test]
    fn test_list_params_omit_empty_values() {
        let params = PostListParams {
            keyword: Some(" ".into()),
            after: Some("c1".into()),
            limit: Some(20),
        };
        assert_eq!(
            params.to_query(),
            vec![("after", "c1".to_string()), ("limit", "20".to_string())]
        );
        assert!(PostListParams::default().to_query().is_empty());
    }

    #[test]
    fn test_report_reason_wire_format() {
        let body = serde_json::to_value(ReportRequest {
            reason: ReportReason::Abuse,
        })
        .expect("encode");
        assert_eq!(body, json!({"reason": "욕설/비방"}));

        let custom: ReportReason = serde_json::from_value(json!("광고성 링크")).expect("decode");
        assert_eq!(custom, ReportReason::Other("광고성 링크".into()));
        assert_eq!(ReportReason::from("음란성"), ReportReason::Obscene);
    }

    #[test]
    fn test_comment_request_skips_missing_parent() {
        let body = serde_json::to_value(CommentCreateRequest {
            post_id: "P1".into(),
            content: "감사합니다".into(),
            parent_id: None,
        })
        .expect("encode");
        assert_eq!(body, json!({"postId": "P1", "content": "감사합니다"}));
    }

    #[test]
    fn test_chat_answer_decodes_sources() {
        let answer: ChatAnswer = serde_json::from_value(json!({
            "answer": "도서관은 9시에 엽니다.",
            "sources": [{"docId": 3, "title": "도서관 이용 안내", "link": "https://lib.example/3"}]
        }))
        .expect("decode");
        assert_eq!(answer.sources[0].doc_id, 3);
    }
}
