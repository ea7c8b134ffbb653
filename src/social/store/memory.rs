use std::hash::Hash;

use async_trait::async_trait;
use chrono::Utc;
use hashbrown::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    FeedEntry, NewComment, NewPost, NotificationMerge, Recipients, Store,
    StoreError,
};
use crate::social::model::{
    Comment, FeedItem, Notification, NotificationKind, Post, PostId,
    ToggleFollowOutput, ToggleLikeOutput, ToggleSubscriptionOutput, User, UserId,
};

/// Key of the unique index over unread notifications. A read notification
/// leaves the index, so the next action for the same key starts a new one.
type UnreadKey = (UserId, NotificationKind, Option<PostId>);

struct UserRow {
    user: User,
    followers_count: u64,
    followees_count: u64,
}

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, UserRow>,
    usernames: HashMap<String, UserId>,
    /// (follower, followee), in follow order
    follows: Vec<(UserId, UserId)>,
    posts: HashMap<PostId, Post>,
    subscriptions: HashSet<(UserId, PostId)>,
    post_likes: HashSet<(UserId, PostId)>,
    comment_likes: HashSet<(UserId, String)>,
    feed: Vec<(FeedEntry, PostId)>,
    comments: HashMap<String, Comment>,
    notifications: HashMap<String, Notification>,
    unread: HashMap<UnreadKey, String>,
}

/// An in-process store. Every method holds the table lock for its whole body,
/// which makes each call one atomic transaction.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user. Usernames are unique.
    pub async fn insert_user(&self, username: &str) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.usernames.contains_key(username) {
            return Err(StoreError::UniqueViolation);
        }
        let user = User {
            id: new_id(),
            username: username.to_string(),
            avatar_url: None,
        };
        tables.usernames.insert(user.username.clone(), user.id.clone());
        tables.users.insert(
            user.id.clone(),
            UserRow {
                user: user.clone(),
                followers_count: 0,
                followees_count: 0,
            },
        );
        Ok(user)
    }

    pub async fn delete_user(&self, user_id: &str) {
        let mut tables = self.tables.write().await;
        if let Some(row) = tables.users.remove(user_id) {
            tables.usernames.remove(&row.user.username);
        }
    }

    /// Every feed entry owned by `user_id` as (entry id, post id), oldest
    /// first.
    pub async fn feed_of(&self, user_id: &str) -> Vec<(String, PostId)> {
        let tables = self.tables.read().await;
        tables
            .feed
            .iter()
            .filter(|(entry, _)| entry.user_id == user_id)
            .map(|(entry, post_id)| (entry.id.clone(), post_id.clone()))
            .collect()
    }

    /// Every notification of `user_id`, most recently issued first.
    pub async fn notifications_of(&self, user_id: &str) -> Vec<Notification> {
        let tables = self.tables.read().await;
        let mut notifications: Vec<_> = tables
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| {
            b.issued_at.cmp(&a.issued_at).then_with(|| a.id.cmp(&b.id))
        });
        notifications
    }
}

/// Adds `key` to `likes` or removes it when already there, keeping `count`
/// in step.
fn toggle_like<K: Eq + Hash>(
    likes: &mut HashSet<K>,
    key: K,
    count: &mut u64,
) -> ToggleLikeOutput {
    let liked = if likes.remove(&key) {
        *count = count.saturating_sub(1);
        false
    } else {
        likes.insert(key);
        *count += 1;
        true
    };
    ToggleLikeOutput {
        liked,
        likes_count: *count,
    }
}

impl Tables {
    fn user(&self, user_id: &str) -> Result<&UserRow, StoreError> {
        self.users.get(user_id).ok_or(StoreError::NoRows)
    }

    fn require_user(&self, user_id: &str) -> Result<(), StoreError> {
        if self.users.contains_key(user_id) {
            Ok(())
        } else {
            Err(StoreError::ForeignKeyViolation)
        }
    }

    fn require_post(&self, post_id: &str) -> Result<(), StoreError> {
        if self.posts.contains_key(post_id) {
            Ok(())
        } else {
            Err(StoreError::ForeignKeyViolation)
        }
    }

    fn insert_feed_entry(&mut self, user_id: &str, post_id: &str) -> FeedEntry {
        let entry = FeedEntry {
            id: new_id(),
            user_id: user_id.to_string(),
        };
        self.feed.push((entry.clone(), post_id.to_string()));
        entry
    }

    /// `INSERT .. ON CONFLICT (user, kind, post, unread) DO UPDATE` with the
    /// actor moved to the front of the existing actor list.
    fn upsert_unread(
        &mut self,
        recipient_id: &str,
        kind: NotificationKind,
        post_id: Option<&str>,
        actor: &str,
    ) -> Notification {
        let key = (
            recipient_id.to_string(),
            kind,
            post_id.map(String::from),
        );
        let now = Utc::now();
        if let Some(existing) = self
            .unread
            .get(&key)
            .and_then(|id| self.notifications.get_mut(id))
        {
            existing.actors.retain(|a| a != actor);
            existing.actors.insert(0, actor.to_string());
            existing.issued_at = now;
            return existing.clone();
        }

        let notification = Notification {
            id: new_id(),
            user_id: recipient_id.to_string(),
            actors: vec![actor.to_string()],
            kind,
            post_id: post_id.map(String::from),
            read: false,
            issued_at: now,
        };
        self.unread.insert(key, notification.id.clone());
        self.notifications
            .insert(notification.id.clone(), notification.clone());
        notification
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn user_by_id(&self, user_id: &str) -> Result<User, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.user(user_id)?.user.clone())
    }

    async fn user_id_by_username(
        &self,
        username: &str,
    ) -> Result<UserId, StoreError> {
        let tables = self.tables.read().await;
        tables.usernames.get(username).cloned().ok_or(StoreError::NoRows)
    }

    async fn create_post(&self, new: NewPost) -> Result<FeedItem, StoreError> {
        let mut tables = self.tables.write().await;
        tables.require_user(&new.author_id)?;

        let post = Post {
            id: new_id(),
            user_id: new.author_id.clone(),
            content: new.content,
            spoiler_of: new.spoiler_of,
            nsfw: new.nsfw,
            likes_count: 0,
            comments_count: 0,
            created_at: Utc::now(),
            user: None,
            mine: true,
            liked: false,
            subscribed: true,
        };
        tables.posts.insert(post.id.clone(), post.clone());
        tables
            .subscriptions
            .insert((new.author_id.clone(), post.id.clone()));
        let entry = tables.insert_feed_entry(&new.author_id, &post.id);

        Ok(FeedItem {
            id: entry.id,
            user_id: entry.user_id,
            post,
        })
    }

    async fn create_comment(
        &self,
        new: NewComment,
    ) -> Result<Comment, StoreError> {
        let mut tables = self.tables.write().await;
        tables.require_user(&new.author_id)?;
        tables.require_post(&new.post_id)?;

        let comment = Comment {
            id: new_id(),
            user_id: new.author_id.clone(),
            post_id: new.post_id.clone(),
            content: new.content,
            likes_count: 0,
            created_at: Utc::now(),
            user: None,
            mine: true,
            liked: false,
        };
        tables.comments.insert(comment.id.clone(), comment.clone());
        tables
            .subscriptions
            .insert((new.author_id, new.post_id.clone()));
        if let Some(post) = tables.posts.get_mut(&new.post_id) {
            post.comments_count += 1;
        }
        Ok(comment)
    }

    async fn toggle_follow(
        &self,
        follower_id: &str,
        followee_id: &str,
    ) -> Result<ToggleFollowOutput, StoreError> {
        let mut tables = self.tables.write().await;
        tables.require_user(follower_id)?;
        tables.require_user(followee_id)?;

        let existing = tables
            .follows
            .iter()
            .position(|(a, b)| a == follower_id && b == followee_id);
        let following = match existing {
            Some(i) => {
                tables.follows.remove(i);
                false
            }
            None => {
                tables
                    .follows
                    .push((follower_id.to_string(), followee_id.to_string()));
                true
            }
        };

        let step = |count: &mut u64| {
            *count = if following {
                *count + 1
            } else {
                count.saturating_sub(1)
            }
        };
        if let Some(row) = tables.users.get_mut(follower_id) {
            step(&mut row.followees_count);
        }
        let row = tables.users.get_mut(followee_id).ok_or(StoreError::NoRows)?;
        step(&mut row.followers_count);

        Ok(ToggleFollowOutput {
            following,
            followers_count: row.followers_count,
        })
    }

    async fn toggle_post_subscription(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> Result<ToggleSubscriptionOutput, StoreError> {
        let mut tables = self.tables.write().await;
        tables.require_user(user_id)?;
        tables.require_post(post_id)?;

        let key = (user_id.to_string(), post_id.to_string());
        let subscribed = if tables.subscriptions.remove(&key) {
            false
        } else {
            tables.subscriptions.insert(key);
            true
        };
        Ok(ToggleSubscriptionOutput { subscribed })
    }

    async fn toggle_post_like(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> Result<ToggleLikeOutput, StoreError> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        tables.require_user(user_id)?;
        let post = tables
            .posts
            .get_mut(post_id)
            .ok_or(StoreError::ForeignKeyViolation)?;
        Ok(toggle_like(
            &mut tables.post_likes,
            (user_id.to_string(), post_id.to_string()),
            &mut post.likes_count,
        ))
    }

    async fn toggle_comment_like(
        &self,
        user_id: &str,
        comment_id: &str,
    ) -> Result<ToggleLikeOutput, StoreError> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        tables.require_user(user_id)?;
        let comment = tables
            .comments
            .get_mut(comment_id)
            .ok_or(StoreError::ForeignKeyViolation)?;
        Ok(toggle_like(
            &mut tables.comment_likes,
            (user_id.to_string(), comment_id.to_string()),
            &mut comment.likes_count,
        ))
    }

    async fn fan_out_post(
        &self,
        post_id: &str,
        author_id: &str,
    ) -> Result<Vec<FeedEntry>, StoreError> {
        let mut tables = self.tables.write().await;
        tables.require_post(post_id)?;

        let followers: Vec<UserId> = tables
            .follows
            .iter()
            .filter(|(_, followee)| followee == author_id)
            .map(|(follower, _)| follower.clone())
            .collect();
        Ok(followers
            .iter()
            .map(|follower| tables.insert_feed_entry(follower, post_id))
            .collect())
    }

    async fn merge_follow_notification(
        &self,
        recipient_id: &str,
        actor: &str,
    ) -> Result<Option<Notification>, StoreError> {
        let mut tables = self.tables.write().await;
        tables.require_user(recipient_id)?;

        let key = (recipient_id.to_string(), NotificationKind::Follow, None);
        let already_named = tables
            .unread
            .get(&key)
            .and_then(|id| tables.notifications.get(id))
            .map_or(false, |n| n.actors.iter().any(|a| a == actor));
        if already_named {
            return Ok(None);
        }
        Ok(Some(tables.upsert_unread(
            recipient_id,
            NotificationKind::Follow,
            None,
            actor,
        )))
    }

    async fn merge_post_notifications(
        &self,
        merge: NotificationMerge,
    ) -> Result<Vec<Notification>, StoreError> {
        let mut tables = self.tables.write().await;
        tables.require_post(&merge.post_id)?;

        let recipients: Vec<UserId> = match &merge.recipients {
            Recipients::PostSubscribers => tables
                .subscriptions
                .iter()
                .filter(|(_, post_id)| *post_id == merge.post_id)
                .map(|(user_id, _)| user_id.clone())
                .collect(),
            Recipients::Handles(handles) => handles
                .iter()
                .filter_map(|handle| tables.usernames.get(handle))
                .cloned()
                .collect(),
        };

        Ok(recipients
            .iter()
            .filter(|recipient| **recipient != merge.actor_id)
            .map(|recipient| {
                tables.upsert_unread(
                    recipient,
                    merge.kind,
                    Some(&merge.post_id),
                    &merge.actor,
                )
            })
            .collect())
    }

    async fn mark_notification_as_read(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let key = match tables.notifications.get_mut(notification_id) {
            Some(n) if n.user_id == user_id && !n.read => {
                n.read = true;
                (n.user_id.clone(), n.kind, n.post_id.clone())
            }
            _ => return Ok(()),
        };
        tables.unread.remove(&key);
        Ok(())
    }

    async fn mark_notifications_as_read(
        &self,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        for n in tables.notifications.values_mut() {
            if n.user_id == user_id {
                n.read = true;
            }
        }
        tables.unread.retain(|(recipient, ..), _| recipient != user_id);
        Ok(())
    }

    async fn has_unread_notifications(
        &self,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.unread.keys().any(|(recipient, ..)| recipient == user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::testing::seeded;

    fn new_post(author: &User) -> NewPost {
        NewPost {
            author_id: author.id.clone(),
            content: "hello".into(),
            spoiler_of: None,
            nsfw: false,
        }
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let (store, _) = seeded(&["alice"]).await;
        assert_eq!(
            store.insert_user("alice").await,
            Err(StoreError::UniqueViolation)
        );
    }

    #[tokio::test]
    async fn post_by_missing_author_violates_foreign_key() {
        let store = MemoryStore::new();
        let post = NewPost {
            author_id: "ghost".into(),
            content: "boo".into(),
            spoiler_of: None,
            nsfw: false,
        };
        assert_eq!(
            store.create_post(post).await,
            Err(StoreError::ForeignKeyViolation)
        );
    }

    #[tokio::test]
    async fn create_post_writes_author_entry() {
        let (store, users) = seeded(&["alice"]).await;
        let item = store.create_post(new_post(&users[0])).await.unwrap();
        assert_eq!(item.user_id, users[0].id);
        assert!(item.post.subscribed);
        assert_eq!(
            store.feed_of(&users[0].id).await,
            vec![(item.id, item.post.id)]
        );
    }

    #[tokio::test]
    async fn fan_out_creates_one_entry_per_follower() {
        let (store, users) = seeded(&["alice", "bob", "carol", "dave"]).await;
        let alice = &users[0];
        for follower in &users[1..3] {
            store.toggle_follow(&follower.id, &alice.id).await.unwrap();
        }
        let item = store.create_post(new_post(alice)).await.unwrap();

        let entries = store.fan_out_post(&item.post.id, &alice.id).await.unwrap();
        let owners: Vec<_> = entries.iter().map(|e| e.user_id.clone()).collect();
        assert_eq!(owners, vec![users[1].id.clone(), users[2].id.clone()]);
        assert!(store.feed_of(&users[3].id).await.is_empty());
    }

    #[tokio::test]
    async fn toggle_follow_counts() {
        let (store, users) = seeded(&["alice", "bob"]).await;
        let out = store.toggle_follow(&users[1].id, &users[0].id).await.unwrap();
        assert_eq!(
            out,
            ToggleFollowOutput {
                following: true,
                followers_count: 1
            }
        );
        let out = store.toggle_follow(&users[1].id, &users[0].id).await.unwrap();
        assert_eq!(
            out,
            ToggleFollowOutput {
                following: false,
                followers_count: 0
            }
        );
    }

    #[tokio::test]
    async fn comment_on_missing_post_violates_foreign_key() {
        let (store, users) = seeded(&["alice"]).await;
        let comment = NewComment {
            author_id: users[0].id.clone(),
            post_id: "gone".into(),
            content: "hi".into(),
        };
        assert_eq!(
            store.create_comment(comment).await,
            Err(StoreError::ForeignKeyViolation)
        );
    }

    #[tokio::test]
    async fn one_unread_notification_per_key() {
        let (store, users) = seeded(&["alice", "bob", "carol"]).await;
        let post = store.create_post(new_post(&users[0])).await.unwrap().post;
        let merge = |actor: &User| NotificationMerge {
            kind: NotificationKind::Comment,
            post_id: post.id.clone(),
            actor_id: actor.id.clone(),
            actor: actor.username.clone(),
            recipients: Recipients::PostSubscribers,
        };

        let first = store.merge_post_notifications(merge(&users[1])).await.unwrap();
        let second = store.merge_post_notifications(merge(&users[2])).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(second[0].actors, vec!["carol", "bob"]);
        assert_eq!(store.notifications_of(&users[0].id).await.len(), 1);

        store
            .mark_notification_as_read(&users[0].id, &first[0].id)
            .await
            .unwrap();
        assert!(!store.has_unread_notifications(&users[0].id).await.unwrap());

        let third = store.merge_post_notifications(merge(&users[1])).await.unwrap();
        assert_ne!(third[0].id, first[0].id);
        assert_eq!(third[0].actors, vec!["bob"]);
        assert_eq!(store.notifications_of(&users[0].id).await.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_merges_keep_one_unread() {
        let (store, users) = seeded(&["alice", "bob", "carol", "dave"]).await;
        let store = std::sync::Arc::new(store);
        let post = store.create_post(new_post(&users[0])).await.unwrap().post;

        let mut tasks = Vec::new();
        for actor in users[1..].iter().cloned() {
            let store = store.clone();
            let post_id = post.id.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .merge_post_notifications(NotificationMerge {
                        kind: NotificationKind::Comment,
                        post_id,
                        actor_id: actor.id.clone(),
                        actor: actor.username.clone(),
                        recipients: Recipients::PostSubscribers,
                    })
                    .await
                    .unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let notifications = store.notifications_of(&users[0].id).await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].actors.len(), 3);
    }

    #[tokio::test]
    async fn mark_all_as_read() {
        let (store, users) = seeded(&["alice", "bob"]).await;
        store
            .merge_follow_notification(&users[0].id, "bob")
            .await
            .unwrap();
        assert!(store.has_unread_notifications(&users[0].id).await.unwrap());
        store.mark_notifications_as_read(&users[0].id).await.unwrap();
        assert!(!store.has_unread_notifications(&users[0].id).await.unwrap());
        assert!(store.notifications_of(&users[0].id).await[0].read);
    }

    #[tokio::test]
    async fn post_likes_toggle_and_count() {
        let (store, users) = seeded(&["alice", "bob", "carol"]).await;
        let post = store.create_post(new_post(&users[0])).await.unwrap().post;

        let liked = store.toggle_post_like(&users[1].id, &post.id).await.unwrap();
        assert_eq!(liked, ToggleLikeOutput { liked: true, likes_count: 1 });
        let liked = store.toggle_post_like(&users[2].id, &post.id).await.unwrap();
        assert_eq!(liked.likes_count, 2);

        let unliked = store.toggle_post_like(&users[1].id, &post.id).await.unwrap();
        assert_eq!(unliked, ToggleLikeOutput { liked: false, likes_count: 1 });

        assert_eq!(
            store.toggle_post_like(&users[1].id, "missing").await,
            Err(StoreError::ForeignKeyViolation)
        );
        assert_eq!(
            store.toggle_post_like("ghost", &post.id).await,
            Err(StoreError::ForeignKeyViolation)
        );
    }

    #[tokio::test]
    async fn comment_likes_toggle_and_count() {
        let (store, users) = seeded(&["alice", "bob"]).await;
        let post = store.create_post(new_post(&users[0])).await.unwrap().post;
        let comment = store
            .create_comment(NewComment {
                author_id: users[0].id.clone(),
                post_id: post.id.clone(),
                content: "first".into(),
            })
            .await
            .unwrap();

        let liked = store
            .toggle_comment_like(&users[1].id, &comment.id)
            .await
            .unwrap();
        assert_eq!(liked, ToggleLikeOutput { liked: true, likes_count: 1 });
        let unliked = store
            .toggle_comment_like(&users[1].id, &comment.id)
            .await
            .unwrap();
        assert_eq!(unliked, ToggleLikeOutput { liked: false, likes_count: 0 });

        // liking a comment leaves the post alone
        let liked = store.toggle_post_like(&users[1].id, &post.id).await.unwrap();
        assert_eq!(liked.likes_count, 1);
        assert_eq!(
            store.toggle_comment_like(&users[1].id, "missing").await,
            Err(StoreError::ForeignKeyViolation)
        );
    }
}
