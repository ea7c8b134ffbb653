use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::broker::{Event, TopicKey};

pub type UserId = String;
pub type PostId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(skip)]
    pub id: UserId,
    pub username: String,
    #[serde(rename = "avatarURL", skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    #[serde(skip)]
    pub user_id: UserId,
    pub content: String,
    pub spoiler_of: Option<String>,
    pub nsfw: bool,
    pub likes_count: u64,
    pub comments_count: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    pub mine: bool,
    pub liked: bool,
    pub subscribed: bool,
}

/// A post as it appears in one user's feed. Feed items are created once, for
/// the author at publish time and for every follower at fan-out time, and are
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    #[serde(rename = "feedItemID")]
    pub id: String,
    #[serde(skip)]
    pub user_id: UserId,
    pub post: Post,
}

impl Event for FeedItem {
    fn topic(&self) -> TopicKey {
        self.user_id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    #[serde(skip)]
    pub user_id: UserId,
    #[serde(skip)]
    pub post_id: PostId,
    pub content: String,
    pub likes_count: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    pub mine: bool,
    pub liked: bool,
}

impl Event for Comment {
    fn topic(&self) -> TopicKey {
        self.post_id.clone()
    }

    // an author never receives a live echo of their own comment
    fn actor(&self) -> Option<&str> {
        Some(&self.user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Follow,
    Comment,
    CommentMention,
    PostMention,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Follow => "follow",
            NotificationKind::Comment => "comment",
            NotificationKind::CommentMention => "comment_mention",
            NotificationKind::PostMention => "post_mention",
        }
    }
}

/// The unit of aggregation. At most one unread notification exists for a
/// given recipient, kind and post at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(skip)]
    pub user_id: UserId,
    /// Most recent actor first, without duplicates.
    pub actors: Vec<String>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(rename = "postID", skip_serializing_if = "Option::is_none")]
    pub post_id: Option<PostId>,
    pub read: bool,
    pub issued_at: DateTime<Utc>,
}

impl Event for Notification {
    fn topic(&self) -> TopicKey {
        self.user_id.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleFollowOutput {
    pub following: bool,
    pub followers_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleLikeOutput {
    pub liked: bool,
    pub likes_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleSubscriptionOutput {
    pub subscribed: bool,
}
