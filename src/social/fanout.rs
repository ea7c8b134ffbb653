use tracing::debug;

use super::{
    broker::Publisher,
    error::Result,
    model::FeedItem,
    store::Store,
};

/// Materializes a newly committed post into every follower's feed and
/// announces each new feed entry to its owner's live readers.
///
/// Fan-out is all or nothing at the store: if the set-based insert fails, no
/// follower sees the post in their feed and nothing is published for them.
/// The post itself stays committed either way.
pub struct FeedFanout<'a> {
    store: &'a dyn Store,
    feed: &'a dyn Publisher<FeedItem>,
}

impl<'a> FeedFanout<'a> {
    pub fn new(store: &'a dyn Store, feed: &'a dyn Publisher<FeedItem>) -> Self {
        Self { store, feed }
    }

    /// Publishes the author's own entry, then creates and publishes one entry
    /// per follower in the order the store returned them. Returns the number
    /// of follower entries created.
    pub async fn fan_out(&self, author_item: FeedItem) -> Result<usize> {
        let post = author_item.post.clone();
        let author_id = author_item.user_id.clone();
        self.feed.publish(author_item);

        let entries = self.store.fan_out_post(&post.id, &author_id).await?;
        debug!(post = %post.id, followers = entries.len(), "fanned out post");

        // followers see the post as someone else's
        let mut follower_post = post;
        follower_post.mine = false;
        follower_post.subscribed = false;
        follower_post.liked = false;

        let count = entries.len();
        for entry in entries {
            self.feed.publish(FeedItem {
                id: entry.id,
                user_id: entry.user_id,
                post: follower_post.clone(),
            });
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::{
        model::User,
        store::{NewPost, Store},
        testing::{seeded, Recorder},
    };

    async fn post_by(store: &dyn Store, author: &User) -> FeedItem {
        store
            .create_post(NewPost {
                author_id: author.id.clone(),
                content: "fresh".into(),
                spoiler_of: None,
                nsfw: false,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn one_publish_per_entry() {
        let (store, users) =
            seeded(&["alice", "bob", "carol", "dave", "erin"]).await;
        let author = &users[0];
        for follower in &users[1..4] {
            store.toggle_follow(&follower.id, &author.id).await.unwrap();
        }
        let item = post_by(&store, author).await;
        let recorder = Recorder::new();

        let count = FeedFanout::new(&store, &recorder)
            .fan_out(item.clone())
            .await
            .unwrap();
        assert_eq!(count, 3);

        let published = recorder.events();
        assert_eq!(published.len(), 4);
        assert_eq!(published[0], item);

        let mut owners: Vec<_> =
            published.iter().map(|i| i.user_id.clone()).collect();
        owners.sort();
        let mut expected: Vec<_> =
            users[..4].iter().map(|u| u.id.clone()).collect();
        expected.sort();
        assert_eq!(owners, expected);

        for follower_item in &published[1..] {
            assert_eq!(follower_item.post.id, item.post.id);
            assert!(!follower_item.post.mine);
            let feed = store.feed_of(&follower_item.user_id).await;
            assert_eq!(feed, vec![(follower_item.id.clone(), item.post.id.clone())]);
        }
        assert!(store.feed_of(&users[4].id).await.is_empty());
    }

    #[tokio::test]
    async fn author_without_followers() {
        let (store, users) = seeded(&["alice"]).await;
        let item = post_by(&store, &users[0]).await;
        let recorder = Recorder::new();

        let count = FeedFanout::new(&store, &recorder)
            .fan_out(item.clone())
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(recorder.events(), vec![item]);
    }

    #[tokio::test]
    async fn store_failure_abandons_fan_out() {
        let (store, users) = seeded(&["alice", "bob"]).await;
        store.toggle_follow(&users[1].id, &users[0].id).await.unwrap();
        let mut item = post_by(&store, &users[0]).await;
        item.post.id = "vanished".into();
        let recorder = Recorder::new();

        let result = FeedFanout::new(&store, &recorder).fan_out(item).await;
        assert!(result.is_err());
        assert!(store.feed_of(&users[1].id).await.is_empty());
        // only the author's own entry went out
        assert_eq!(recorder.events().len(), 1);
    }
}
