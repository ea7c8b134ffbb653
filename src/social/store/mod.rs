// The relational store is an external collaborator. The core only relies on
// three things from it: every method below runs as one atomic transaction,
// constraint violations come back as distinguishable signals, and fan-out is a
// single set-based insert that returns the rows it created.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use super::model::{
    Comment, FeedItem, Notification, NotificationKind, PostId, ToggleFollowOutput,
    ToggleLikeOutput, ToggleSubscriptionOutput, User, UserId,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unique constraint violated")]
    UniqueViolation,
    #[error("foreign key constraint violated")]
    ForeignKeyViolation,
    #[error("no matching row")]
    NoRows,
    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub author_id: UserId,
    pub content: String,
    pub spoiler_of: Option<String>,
    pub nsfw: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub author_id: UserId,
    pub post_id: PostId,
    pub content: String,
}

/// A feed entry created by fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: String,
    pub user_id: UserId,
}

/// Who receives a post-scoped notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    /// Everyone subscribed to the post.
    PostSubscribers,
    /// The users with these handles. Unknown handles are ignored.
    Handles(Vec<String>),
}

/// One triggering action on a post to be merged into its recipients' unread
/// notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMerge {
    pub kind: NotificationKind,
    pub post_id: PostId,
    /// Never notified about their own action.
    pub actor_id: UserId,
    pub actor: String,
    pub recipients: Recipients,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn user_by_id(&self, user_id: &str) -> Result<User, StoreError>;

    async fn user_id_by_username(
        &self,
        username: &str,
    ) -> Result<UserId, StoreError>;

    /// Inserts the post, subscribes its author to it and creates the author's
    /// own feed entry.
    async fn create_post(&self, post: NewPost) -> Result<FeedItem, StoreError>;

    /// Inserts the comment, subscribes its author to the post if they were
    /// not already and bumps the post's comment count.
    async fn create_comment(
        &self,
        comment: NewComment,
    ) -> Result<Comment, StoreError>;

    async fn toggle_follow(
        &self,
        follower_id: &str,
        followee_id: &str,
    ) -> Result<ToggleFollowOutput, StoreError>;

    async fn toggle_post_subscription(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> Result<ToggleSubscriptionOutput, StoreError>;

    /// Likes the post, or takes the like back, and adjusts its like count.
    async fn toggle_post_like(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> Result<ToggleLikeOutput, StoreError>;

    async fn toggle_comment_like(
        &self,
        user_id: &str,
        comment_id: &str,
    ) -> Result<ToggleLikeOutput, StoreError>;

    /// Creates one feed entry per follower of `author_id` for the post and
    /// returns them in insertion order.
    async fn fan_out_post(
        &self,
        post_id: &str,
        author_id: &str,
    ) -> Result<Vec<FeedEntry>, StoreError>;

    /// Merges a follow into the recipient's unread follow notification.
    /// Returns `None` when the actor is already named in it.
    async fn merge_follow_notification(
        &self,
        recipient_id: &str,
        actor: &str,
    ) -> Result<Option<Notification>, StoreError>;

    /// Upserts one unread notification per recipient, moving the actor to
    /// the front of its actor list, and returns every affected notification.
    async fn merge_post_notifications(
        &self,
        merge: NotificationMerge,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn mark_notification_as_read(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> Result<(), StoreError>;

    async fn mark_notifications_as_read(
        &self,
        user_id: &str,
    ) -> Result<(), StoreError>;

    async fn has_unread_notifications(
        &self,
        user_id: &str,
    ) -> Result<bool, StoreError>;
}
