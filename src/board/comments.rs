use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use tracing::debug;

use super::{Board, Report, invalidate, keys};
use crate::api::models::{Comment, CommentCreateRequest};
use crate::query::{Mutation, OptimisticUpdate, Query, QueryClient, QueryError};

/// A record viewers can recommend and report.
pub trait Reactable {
    fn reaction_id(&self) -> &str;

    /// The viewer's recommend flag and the recommend count.
    fn recommend_state(&mut self) -> (&mut bool, &mut u32);

    /// The viewer's report flag and the report count.
    fn report_state(&mut self) -> (&mut bool, &mut u32);
}

impl Reactable for Comment {
    fn reaction_id(&self) -> &str {
        &self.id
    }

    fn recommend_state(&mut self) -> (&mut bool, &mut u32) {
        (&mut self.is_recommended, &mut self.recommend_count)
    }

    fn report_state(&mut self) -> (&mut bool, &mut u32) {
        (&mut self.is_reported, &mut self.report_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Flip the recommend flag; the count follows it and never drops below zero.
    ToggleRecommend,
    /// Mark reported and count the report once.
    Report,
}

/// Applies `reaction` to every record with id `id`. Returns `true` if anything changed.
pub fn patch_reaction<R: Reactable>(records: &mut [R], id: &str, reaction: Reaction) -> bool {
    let mut changed = false;
    for record in records.iter_mut().filter(|record| record.reaction_id() == id) {
        match reaction {
            Reaction::ToggleRecommend => {
                let (recommended, count) = record.recommend_state();
                *recommended = !*recommended;
                *count = if *recommended {
                    (*count).saturating_add(1)
                } else {
                    (*count).saturating_sub(1)
                };
                changed = true;
            }
            Reaction::Report => {
                let (reported, count) = record.report_state();
                if !*reported {
                    *reported = true;
                    *count = (*count).saturating_add(1);
                    changed = true;
                }
            }
        }
    }
    changed
}

/// Patches every cached comment and reply collection in one step.
fn apply_reaction(client: &Arc<QueryClient>, comment_id: &str, reaction: Reaction) -> OptimisticUpdate {
    let mut update = OptimisticUpdate::new(
        client.clone(),
        vec![keys::all_comments(), keys::all_replies()],
    );
    let patched = update.apply::<Vec<Comment>, _>(|comments| {
        patch_reaction(comments, comment_id, reaction)
    });
    debug!(comment_id, ?reaction, patched, "applied optimistic reaction");
    update
}

impl Board {
    /// Top-level comments of a post; disabled while `post_id` is empty.
    pub fn comments(&self, post_id: &str) -> Query<Vec<Comment>> {
        let api = self.api.clone();
        let id = post_id.to_owned();
        Query::new(
            keys::comments(post_id),
            move || {
                let api = api.clone();
                let id = id.clone();
                async move { api.list_comments(&id).await }.boxed()
            },
            self.client.clone(),
        )
        .enabled(!post_id.is_empty())
    }

    /// Replies to a comment; disabled while `comment_id` is empty.
    pub fn replies(&self, comment_id: &str) -> Query<Vec<Comment>> {
        let api = self.api.clone();
        let id = comment_id.to_owned();
        Query::new(
            keys::replies(comment_id),
            move || {
                let api = api.clone();
                let id = id.clone();
                async move { api.list_replies(&id).await }.boxed()
            },
            self.client.clone(),
        )
        .enabled(!comment_id.is_empty())
    }

    /// Loads the replies of many comments at once.
    ///
    /// Requests run concurrently and repeated ids share one request. Results
    /// come back in the order of `comment_ids`.
    pub async fn load_replies<S>(&self, comment_ids: &[S]) -> Vec<Result<Vec<Comment>, QueryError>>
    where
        S: AsRef<str>,
    {
        let queries: Vec<Query<Vec<Comment>>> = comment_ids
            .iter()
            .map(|id| self.replies(id.as_ref()))
            .collect();
        debug!(count = queries.len(), "loading replies");
        join_all(queries.iter().map(Query::fetch)).await
    }

    /// Creates a comment or, with `parent_id` set, a reply.
    pub fn create_comment(&self) -> Mutation<CommentCreateRequest, Comment> {
        let api = self.api.clone();
        let client = self.client.clone();
        Mutation::new(move |request: CommentCreateRequest| {
            let api = api.clone();
            async move { api.create_comment(&request).await }.boxed()
        })
        .on_success(move |request, _| {
            let mut stale = vec![
                keys::comments(&request.post_id),
                keys::post(&request.post_id),
                keys::all_posts(),
            ];
            if let Some(parent_id) = request.parent_id.as_deref().filter(|id| !id.is_empty()) {
                stale.push(keys::replies(parent_id));
            }
            invalidate(&client, &stale);
        })
    }

    /// Toggles the viewer's recommendation of a comment or reply, showing the
    /// new state in every cached collection before the server answers.
    pub fn toggle_comment_recommend(&self) -> Mutation<String, ()> {
        let api = self.api.clone();
        let patch_client = self.client.clone();
        let client = self.client.clone();
        Mutation::new(move |comment_id: String| {
            let api = api.clone();
            async move { api.toggle_comment_recommend(&comment_id).await }.boxed()
        })
        .on_mutate(move |comment_id| {
            Some(apply_reaction(&patch_client, comment_id, Reaction::ToggleRecommend))
        })
        .on_success(move |_, _| invalidate(&client, &[keys::all_comments(), keys::all_replies()]))
    }

    pub fn report_comment(&self) -> Mutation<Report, ()> {
        let api = self.api.clone();
        let patch_client = self.client.clone();
        let client = self.client.clone();
        Mutation::new(move |report: Report| {
            let api = api.clone();
            async move { api.report_comment(&report.target_id, report.reason).await }.boxed()
        })
        .on_mutate(move |report| {
            Some(apply_reaction(&patch_client, &report.target_id, Reaction::Report))
        })
        .on_success(move |_, _| invalidate(&client, &[keys::all_comments(), keys::all_replies()]))
    }

    pub fn delete_comment(&self) -> Mutation<String, ()> {
        let api = self.api.clone();
        let client = self.client.clone();
        Mutation::new(move |comment_id: String| {
            let api = api.clone();
            async move { api.delete_comment(&comment_id).await }.boxed()
        })
        .on_success(move |_, _| {
            invalidate(
                &client,
                &[
                    keys::all_comments(),
                    keys::all_replies(),
                    keys::all_posts(),
                    keys::all_post(),
                ],
            );
        })
    }
}
