use tracing::debug;

use super::{
    broker::Publisher,
    error::{Error, Result, USER_GONE},
    mention::collect_mentions,
    model::{Comment, Notification, NotificationKind, Post, User},
    store::{NotificationMerge, Recipients, Store, StoreError},
};

/// Turns notification-causing actions into merged unread notifications and
/// announces every affected notification to its recipient's live readers.
///
/// The merge itself happens inside the store as one atomic upsert, so
/// concurrent actions for the same recipient, kind and post never produce two
/// unread notifications. Publishing only happens after that upsert returns.
pub struct NotificationAggregator<'a> {
    store: &'a dyn Store,
    notifications: &'a dyn Publisher<Notification>,
}

impl<'a> NotificationAggregator<'a> {
    pub fn new(
        store: &'a dyn Store,
        notifications: &'a dyn Publisher<Notification>,
    ) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// Notifies `followee_id` that `follower_id` followed them. Nothing is
    /// written or published when the follower is already named in the
    /// followee's unread follow notification.
    pub async fn follow(
        &self,
        follower_id: &str,
        followee_id: &str,
    ) -> Result<Option<Notification>> {
        let actor = self
            .store
            .user_by_id(follower_id)
            .await
            .map_err(|e| match e {
                StoreError::NoRows => USER_GONE,
                e => Error::from(e),
            })?;

        match self
            .store
            .merge_follow_notification(followee_id, &actor.username)
            .await?
        {
            Some(notification) => {
                self.notifications.publish(notification.clone());
                Ok(Some(notification))
            }
            None => {
                debug!(actor = %actor.username, "follow notification suppressed");
                Ok(None)
            }
        }
    }

    /// Notifies everyone subscribed to the comment's post except its author.
    pub async fn comment(&self, comment: &Comment, author: &User) -> Result<usize> {
        self.merge(NotificationMerge {
            kind: NotificationKind::Comment,
            post_id: comment.post_id.clone(),
            actor_id: author.id.clone(),
            actor: author.username.clone(),
            recipients: Recipients::PostSubscribers,
        })
        .await
    }

    /// Notifies every user mentioned in the comment except its author.
    pub async fn comment_mentions(
        &self,
        comment: &Comment,
        author: &User,
    ) -> Result<usize> {
        self.mentions(
            NotificationKind::CommentMention,
            &comment.post_id,
            &comment.content,
            author,
        )
        .await
    }

    /// Notifies every user mentioned in the post except its author.
    pub async fn post_mentions(&self, post: &Post, author: &User) -> Result<usize> {
        self.mentions(NotificationKind::PostMention, &post.id, &post.content, author)
            .await
    }

    async fn mentions(
        &self,
        kind: NotificationKind,
        post_id: &str,
        content: &str,
        author: &User,
    ) -> Result<usize> {
        let handles = collect_mentions(content);
        if handles.is_empty() {
            return Ok(0);
        }
        self.merge(NotificationMerge {
            kind,
            post_id: post_id.to_string(),
            actor_id: author.id.clone(),
            actor: author.username.clone(),
            recipients: Recipients::Handles(handles),
        })
        .await
    }

    async fn merge(&self, merge: NotificationMerge) -> Result<usize> {
        let kind = merge.kind;
        let notifications = self.store.merge_post_notifications(merge).await?;
        debug!(
            kind = kind.as_str(),
            recipients = notifications.len(),
            "merged notifications"
        );
        let count = notifications.len();
        for notification in notifications {
            self.notifications.publish(notification);
        }
        Ok(count)
    }
}
