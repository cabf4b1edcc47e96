use futures::FutureExt;
use tracing::debug;

use super::{Board, invalidate, keys};
use crate::api::models::{
    Post, PostCreateRequest, PostListParams, PostPage, PostUpdateRequest, ReportReason,
};
use crate::query::{InfiniteData, InfiniteQuery, Mutation, Query, QueryClient};

/// Input of [`Board::update_post`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostEdit {
    pub post_id: String,
    pub request: PostUpdateRequest,
}

/// Input of the report mutations: what is reported and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub target_id: String,
    pub reason: ReportReason,
}

impl Board {
    /// The post list filtered by `keyword`, one page of `page_size` posts at a time.
    pub fn posts(&self, keyword: Option<&str>) -> InfiniteQuery<PostPage> {
        let api = self.api.clone();
        let keyword = keyword.filter(|keyword| !keyword.is_empty()).map(str::to_owned);
        let key = keys::posts(keyword.as_deref());
        let limit = self.page_size;
        InfiniteQuery::new(
            key,
            move |cursor| {
                let api = api.clone();
                let params = PostListParams {
                    keyword: keyword.clone(),
                    after: cursor,
                    limit: Some(limit),
                };
                async move { api.list_posts(&params).await }.boxed()
            },
            self.client.clone(),
        )
    }

    /// A single post; disabled while `post_id` is empty.
    pub fn post(&self, post_id: &str) -> Query<Post> {
        let api = self.api.clone();
        let id = post_id.to_owned();
        Query::new(
            keys::post(post_id),
            move || {
                let api = api.clone();
                let id = id.clone();
                async move { api.get_post(&id).await }.boxed()
            },
            self.client.clone(),
        )
        .enabled(!post_id.is_empty())
    }

    pub fn create_post(&self) -> Mutation<PostCreateRequest, Post> {
        let api = self.api.clone();
        let client = self.client.clone();
        Mutation::new(move |request: PostCreateRequest| {
            let api = api.clone();
            async move { api.create_post(&request).await }.boxed()
        })
        .on_success(move |_, _| invalidate(&client, &[keys::all_posts()]))
    }

    pub fn update_post(&self) -> Mutation<PostEdit, Post> {
        let api = self.api.clone();
        let client = self.client.clone();
        Mutation::new(move |edit: PostEdit| {
            let api = api.clone();
            async move { api.update_post(&edit.post_id, &edit.request).await }.boxed()
        })
        .on_success(move |edit, _| {
            invalidate(&client, &[keys::post(&edit.post_id), keys::all_posts()]);
        })
    }

    /// Deletes a post. On success the post is removed from every cached list
    /// before the lists are invalidated.
    pub fn delete_post(&self) -> Mutation<String, ()> {
        let api = self.api.clone();
        let client = self.client.clone();
        Mutation::new(move |post_id: String| {
            let api = api.clone();
            async move { api.delete_post(&post_id).await }.boxed()
        })
        .on_success(move |post_id, _| {
            evict_post(&client, post_id);
            invalidate(&client, &[keys::all_posts()]);
        })
    }

    pub fn toggle_post_recommend(&self) -> Mutation<String, ()> {
        let api = self.api.clone();
        let client = self.client.clone();
        Mutation::new(move |post_id: String| {
            let api = api.clone();
            async move { api.toggle_post_recommend(&post_id).await }.boxed()
        })
        .on_success(move |post_id, _| {
            invalidate(&client, &[keys::post(post_id), keys::all_posts()]);
        })
    }

    pub fn report_post(&self) -> Mutation<Report, ()> {
        let api = self.api.clone();
        let client = self.client.clone();
        Mutation::new(move |report: Report| {
            let api = api.clone();
            async move { api.report_post(&report.target_id, report.reason).await }.boxed()
        })
        .on_success(move |report, _| {
            invalidate(&client, &[keys::post(&report.target_id), keys::all_posts()]);
        })
    }
}

/// Drops `post_id` from every cached post list. Returns the number of lists changed.
fn evict_post(client: &QueryClient, post_id: &str) -> usize {
    let snapshot = client.patch_queries::<InfiniteData<PostPage>, _>(&[keys::all_posts()], |data| {
        let mut removed = false;
        for page in &mut data.pages {
            let before = page.items.len();
            page.items.retain(|post| post.id != post_id);
            removed |= page.items.len() != before;
        }
        removed
    });
    debug!(post_id, lists = snapshot.len(), "evicted deleted post from cached lists");
    snapshot.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str) -> Post {
        Post {
            id: id.into(),
            author_id: "u1".into(),
            title: format!("title {id}"),
            content: String::new(),
            status: "OPEN".into(),
            recommend_count: 0,
            report_count: 0,
            comment_count: 0,
            created_at: String::new(),
            updated_at: String::new(),
            blinded_at: None,
            blinded_reason: None,
            reported: false,
            recommended: false,
        }
    }

    fn list(ids: &[&[&str]]) -> InfiniteData<PostPage> {
        InfiniteData {
            pages: ids
                .iter()
                .map(|page| PostPage {
                    items: page.iter().map(|id| post(id)).collect(),
                    next_cursor: None,
                    has_next: false,
                })
                .collect(),
            page_params: vec![None; ids.len()],
        }
    }

    #[test]
    fn test_evict_post_from_every_list() {
        let client = QueryClient::new();
        client.set_query_data(keys::posts(None), list(&[&["P1", "P2"], &["P3"]]));
        client.set_query_data(keys::posts(Some("exam")), list(&[&["P1"]]));
        client.set_query_data(keys::posts(Some("lab")), list(&[&["P4"]]));

        assert_eq!(evict_post(&client, "P1"), 2);

        let all = client
            .get_query_data::<InfiniteData<PostPage>>(&keys::posts(None))
            .expect("cached");
        let ids: Vec<String> = all.items().into_iter().map(|post| post.id).collect();
        assert_eq!(ids, vec!["P2", "P3"]);
        let exam = client
            .get_query_data::<InfiniteData<PostPage>>(&keys::posts(Some("exam")))
            .expect("cached");
        assert!(exam.pages[0].items.is_empty());
    }

    #[test]
    fn test_disabled_post_query() {
        let board = Board::new(
            std::sync::Arc::new(crate::api::ApiClient::new("http://localhost").expect("valid")),
            std::sync::Arc::new(QueryClient::new()),
        );
        assert!(!board.post("").is_enabled());
        assert!(board.post("P1").is_enabled());
        assert_eq!(board.posts(Some("")).key(), &keys::posts(None));
    }
}
