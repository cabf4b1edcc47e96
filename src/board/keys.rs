//! Cache keys of the board resources.
//!
//! | Key | Value |
//! |---|---|
//! | `posts:{keyword}` | `InfiniteData<PostPage>` |
//! | `posts:{keyword}:{cursor}` | one `PostPage` while it loads |
//! | `post:{id}` | `Post` |
//! | `comments:{postId}` | `Vec<Comment>` |
//! | `replies:{commentId}` | `Vec<Comment>` |

use crate::query::QueryKey;

pub const POSTS: &str = "posts";
pub const POST: &str = "post";
pub const COMMENTS: &str = "comments";
pub const REPLIES: &str = "replies";

/// The post list for `keyword`; no keyword and an empty one share a key.
pub fn posts(keyword: Option<&str>) -> QueryKey {
    QueryKey::new(POSTS).with(keyword.unwrap_or_default())
}

pub fn all_posts() -> QueryKey {
    QueryKey::new(POSTS)
}

pub fn post(post_id: &str) -> QueryKey {
    QueryKey::new(POST).with(post_id)
}

pub fn all_post() -> QueryKey {
    QueryKey::new(POST)
}

pub fn comments(post_id: &str) -> QueryKey {
    QueryKey::new(COMMENTS).with(post_id)
}

pub fn all_comments() -> QueryKey {
    QueryKey::new(COMMENTS)
}

pub fn replies(comment_id: &str) -> QueryKey {
    QueryKey::new(REPLIES).with(comment_id)
}

pub fn all_replies() -> QueryKey {
    QueryKey::new(REPLIES)
}
