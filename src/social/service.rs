use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::{
    broker::{EventHub, EventStream},
    config::Config,
    error::{
        Error, Result, COMMENT_NOT_FOUND, FORBIDDEN_FOLLOW, INVALID_COMMENT_ID,
        INVALID_CONTENT, INVALID_NOTIFICATION_ID, INVALID_POST_ID,
        INVALID_SPOILER, INVALID_USERNAME, POST_NOT_FOUND, USER_GONE,
        USER_NOT_FOUND,
    },
    fanout::FeedFanout,
    mention::is_valid_handle,
    model::{
        Comment, FeedItem, Notification, ToggleFollowOutput, ToggleLikeOutput,
        ToggleSubscriptionOutput,
    },
    notify::NotificationAggregator,
    store::{NewComment, NewPost, Store, StoreError},
    tasks::PostCommit,
};

/// The write path and the live read boundary.
///
/// Each write commits its own rows first and only then dispatches its
/// follow-up work (fan-out, notifications, live echoes) as post-commit tasks.
/// Those tasks never report back: once a write has returned `Ok`, it stands.
pub struct Service {
    store: Arc<dyn Store>,
    config: Config,
    tasks: PostCommit,
    feed: EventHub<FeedItem>,
    comments: EventHub<Comment>,
    notifications: EventHub<Notification>,
}

impl Service {
    /// Starts the three hubs. Must be called inside a tokio runtime.
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        let (delivery, buffer) = (config.delivery, config.stream_buffer);
        let feed = EventHub::spawn("feed", delivery, buffer);
        let comments = EventHub::spawn("comments", delivery, buffer);
        let notifications = EventHub::spawn("notifications", delivery, buffer);
        Self {
            store,
            config,
            tasks: PostCommit::new(),
            feed,
            comments,
            notifications,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The post-commit tasks dispatched by this service.
    pub fn tasks(&self) -> &PostCommit {
        &self.tasks
    }

    /// Publishes a post to its author's feed, then fans it out to their
    /// followers and notifies the users it mentions.
    pub async fn create_post(
        &self,
        author_id: &str,
        content: &str,
        spoiler_of: Option<&str>,
        nsfw: bool,
    ) -> Result<FeedItem> {
        let content = self.checked(content, self.config.post_max_len, INVALID_CONTENT)?;
        let spoiler_of = spoiler_of
            .map(|s| self.checked(s, self.config.spoiler_max_len, INVALID_SPOILER))
            .transpose()?;

        let item = self
            .store
            .create_post(NewPost {
                author_id: author_id.to_string(),
                content,
                spoiler_of,
                nsfw,
            })
            .await
            .map_err(|e| match e {
                StoreError::ForeignKeyViolation => USER_GONE,
                e => Error::from(e),
            })?;
        debug!(post = %item.post.id, "post created");

        self.post_created(item.clone());
        Ok(item)
    }

    fn post_created(&self, item: FeedItem) {
        let store = self.store.clone();
        let feed = self.feed.clone();
        let notifications = self.notifications.clone();
        let tasks = self.tasks.clone();
        self.tasks.dispatch("post_created", async move {
            let author = store.user_by_id(&item.user_id).await?;
            let mut item = item;
            item.post.user = Some(author.clone());

            let post = item.post.clone();
            let mentions_store = store.clone();
            tasks.dispatch("post_mentions", async move {
                NotificationAggregator::new(&*mentions_store, &notifications)
                    .post_mentions(&post, &author)
                    .await
                    .map(drop)
            });

            FeedFanout::new(&*store, &feed).fan_out(item).await.map(drop)
        });
    }

    /// Comments on a post, subscribing the author to the post's thread.
    pub async fn create_comment(
        &self,
        author_id: &str,
        post_id: &str,
        content: &str,
    ) -> Result<Comment> {
        if Uuid::parse_str(post_id).is_err() {
            return Err(INVALID_POST_ID);
        }
        let content =
            self.checked(content, self.config.comment_max_len, INVALID_CONTENT)?;

        let comment = self
            .store
            .create_comment(NewComment {
                author_id: author_id.to_string(),
                post_id: post_id.to_string(),
                content,
            })
            .await
            .map_err(|e| match e {
                StoreError::ForeignKeyViolation => POST_NOT_FOUND,
                e => Error::from(e),
            })?;
        debug!(comment = %comment.id, post = post_id, "comment created");

        self.comment_created(comment.clone());
        Ok(comment)
    }

    fn comment_created(&self, comment: Comment) {
        let store = self.store.clone();
        let comments = self.comments.clone();
        let notifications = self.notifications.clone();
        let tasks = self.tasks.clone();
        self.tasks.dispatch("comment_created", async move {
            let author = store.user_by_id(&comment.user_id).await?;
            let mut comment = comment;
            comment.user = Some(author.clone());
            comment.mine = false;

            {
                let store = store.clone();
                let notifications = notifications.clone();
                let (comment, author) = (comment.clone(), author.clone());
                tasks.dispatch("comment_notifications", async move {
                    NotificationAggregator::new(&*store, &notifications)
                        .comment(&comment, &author)
                        .await
                        .map(drop)
                });
            }
            {
                let comment = comment.clone();
                tasks.dispatch("comment_mentions", async move {
                    NotificationAggregator::new(&*store, &notifications)
                        .comment_mentions(&comment, &author)
                        .await
                        .map(drop)
                });
            }

            comments.publish(comment);
            Ok(())
        });
    }

    /// Follows or unfollows the user called `username`. A new follow notifies
    /// the followee.
    pub async fn toggle_follow(
        &self,
        follower_id: &str,
        username: &str,
    ) -> Result<ToggleFollowOutput> {
        let username = username.trim();
        if !is_valid_handle(username) {
            return Err(INVALID_USERNAME);
        }
        let followee_id = self
            .store
            .user_id_by_username(username)
            .await
            .map_err(|e| match e {
                StoreError::NoRows => USER_NOT_FOUND,
                e => Error::from(e),
            })?;
        if followee_id == follower_id {
            return Err(FORBIDDEN_FOLLOW);
        }

        let out = self
            .store
            .toggle_follow(follower_id, &followee_id)
            .await
            .map_err(|e| match e {
                StoreError::ForeignKeyViolation | StoreError::NoRows => {
                    USER_NOT_FOUND
                }
                e => Error::from(e),
            })?;

        if out.following {
            let store = self.store.clone();
            let notifications = self.notifications.clone();
            let follower_id = follower_id.to_string();
            self.tasks.dispatch("follow_notification", async move {
                NotificationAggregator::new(&*store, &notifications)
                    .follow(&follower_id, &followee_id)
                    .await
                    .map(drop)
            });
        }
        Ok(out)
    }

    pub async fn toggle_post_like(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> Result<ToggleLikeOutput> {
        if Uuid::parse_str(post_id).is_err() {
            return Err(INVALID_POST_ID);
        }
        self.store
            .toggle_post_like(user_id, post_id)
            .await
            .map_err(|e| match e {
                StoreError::ForeignKeyViolation => POST_NOT_FOUND,
                e => Error::from(e),
            })
    }

    pub async fn toggle_comment_like(
        &self,
        user_id: &str,
        comment_id: &str,
    ) -> Result<ToggleLikeOutput> {
        if Uuid::parse_str(comment_id).is_err() {
            return Err(INVALID_COMMENT_ID);
        }
        self.store
            .toggle_comment_like(user_id, comment_id)
            .await
            .map_err(|e| match e {
                StoreError::ForeignKeyViolation => COMMENT_NOT_FOUND,
                e => Error::from(e),
            })
    }

    /// Opts in or out of comment notifications for a post.
    pub async fn toggle_post_subscription(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> Result<ToggleSubscriptionOutput> {
        if Uuid::parse_str(post_id).is_err() {
            return Err(INVALID_POST_ID);
        }
        self.store
            .toggle_post_subscription(user_id, post_id)
            .await
            .map_err(|e| match e {
                StoreError::ForeignKeyViolation => POST_NOT_FOUND,
                e => Error::from(e),
            })
    }

    /// Closes the notification's aggregation window. The next matching action
    /// starts a new notification.
    pub async fn mark_notification_as_read(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> Result<()> {
        if Uuid::parse_str(notification_id).is_err() {
            return Err(INVALID_NOTIFICATION_ID);
        }
        Ok(self
            .store
            .mark_notification_as_read(user_id, notification_id)
            .await?)
    }

    pub async fn mark_notifications_as_read(&self, user_id: &str) -> Result<()> {
        Ok(self.store.mark_notifications_as_read(user_id).await?)
    }

    pub async fn has_unread_notifications(&self, user_id: &str) -> Result<bool> {
        Ok(self.store.has_unread_notifications(user_id).await?)
    }

    /// Live feed items of the viewer's feed until `scope` is cancelled.
    pub fn feed_stream(
        &self,
        viewer: Option<&str>,
        scope: &CancellationToken,
    ) -> Result<EventStream<FeedItem>> {
        let viewer = viewer.ok_or(Error::Unauthenticated)?;
        Ok(self.feed.stream(viewer, None, scope))
    }

    /// Live notifications of the viewer until `scope` is cancelled.
    pub fn notification_stream(
        &self,
        viewer: Option<&str>,
        scope: &CancellationToken,
    ) -> Result<EventStream<Notification>> {
        let viewer = viewer.ok_or(Error::Unauthenticated)?;
        Ok(self.notifications.stream(viewer, None, scope))
    }

    /// Live comments on a post until `scope` is cancelled. A signed-in viewer
    /// does not receive their own comments.
    pub fn comment_stream(
        &self,
        post_id: &str,
        viewer: Option<&str>,
        scope: &CancellationToken,
    ) -> EventStream<Comment> {
        self.comments.stream(post_id, viewer.map(String::from), scope)
    }

    fn checked(&self, text: &str, max_len: usize, invalid: Error) -> Result<String> {
        let text = smart_trim(text);
        if text.is_empty() || text.chars().count() > max_len {
            return Err(invalid);
        }
        Ok(text)
    }
}

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\s)+").expect("whitespace pattern is valid"));
static LINE_BREAK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("line break pattern is valid"));

/// Collapses whitespace runs inside each line to one character, keeps at most
/// one blank line between paragraphs and trims the result.
fn smart_trim(text: &str) -> String {
    let lines: Vec<String> = text
        .split('\n')
        .map(|line| WHITESPACE_RUN.replace_all(line, "$1").trim().to_string())
        .collect();
    let text = lines.join("\n");
    LINE_BREAK_RUN.replace_all(&text, "\n\n").trim().to_string()
}
