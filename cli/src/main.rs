use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use murmur::social::{
    store::memory::MemoryStore, wire, Config, Service,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run().await {
        error!(error = %e, "demo failed");
    }
}

async fn run() -> murmur::social::Result<()> {
    let config = Config::from_env();
    info!(delivery = %config.delivery, buffer = config.stream_buffer, "starting");

    let store = Arc::new(MemoryStore::new());
    let mut users = Vec::new();
    for name in ["alice", "bob", "carol"] {
        users.push(store.insert_user(name).await?);
    }
    let (alice, bob, carol) = (&users[0], &users[1], &users[2]);
    let service = Service::new(store.clone(), config);
    let scope = CancellationToken::new();

    // one feed reader and one notification reader
    let bobs_feed = service.feed_stream(Some(&bob.id), &scope)?;
    let alices_notifications =
        service.notification_stream(Some(&alice.id), &scope)?;

    let feed_task = tokio::spawn(print_records("bob/feed", wire::framed(bobs_feed)));
    let notification_task = tokio::spawn(print_records(
        "alice/notifications",
        wire::framed(alices_notifications),
    ));

    service.toggle_follow(&bob.id, "alice").await?;
    service.toggle_follow(&carol.id, "alice").await?;

    let post = service
        .create_post(&alice.id, "hello   world, @carol", None, false)
        .await?
        .post;
    let comments = service.comment_stream(&post.id, Some(&alice.id), &scope);
    let comment_task =
        tokio::spawn(print_records("alice/comments", wire::framed(comments)));

    service
        .create_comment(&bob.id, &post.id, "welcome @alice")
        .await?;
    service
        .create_comment(&carol.id, &post.id, "thanks for the mention")
        .await?;
    let like = service.toggle_post_like(&carol.id, &post.id).await?;
    info!(likes = like.likes_count, "post liked");

    service.tasks().idle().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    info!(
        unread = service.has_unread_notifications(&alice.id).await?,
        "alice"
    );
    service.mark_notifications_as_read(&alice.id).await?;

    scope.cancel();
    for task in [feed_task, notification_task, comment_task] {
        if let Err(e) = task.await {
            error!(error = %e, "printer panicked");
        }
    }
    Ok(())
}

async fn print_records<S>(name: &'static str, records: S)
where
    S: futures::Stream<Item = String>,
{
    futures::pin_mut!(records);
    while let Some(record) = records.next().await {
        print!("{name} {record}");
    }
    info!(stream = name, "closed");
}
