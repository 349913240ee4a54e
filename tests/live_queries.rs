use std::sync::Arc;

use reunite_core::{
    Database, LiveList, MemoryBackend, NewCase, NewComment, UserId,
};

fn database() -> Database {
    Database::new(Arc::new(MemoryBackend::new()))
}

fn report(title: &str) -> NewCase {
    NewCase {
        title: title.into(),
        description: "D".into(),
        reporter_id: UserId::new("u1"),
        reporter_name: "alice".into(),
    }
}

#[tokio::test]
async fn created_case_is_fetchable_with_empty_photos() {
    let db = database();

    let id = db.create_case(report("T"), Vec::new()).await.unwrap();
    let case = db.get_case(&id).await.unwrap().unwrap();

    assert_eq!(case.id, id);
    assert_eq!(case.title, "T");
    assert_eq!(case.description, "D");
    assert!(case.photo_urls.is_empty());
    assert!(case.created_at.is_some());
}

#[tokio::test]
async fn unknown_case_is_absent_not_an_error() {
    let db = database();
    let found = db
        .get_case(&reunite_core::CaseId::new("nope"))
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn case_feed_is_newest_first() {
    let db = database();
    for title in ["first", "second", "third"] {
        db.create_case(report(title), Vec::new()).await.unwrap();
    }

    let mut feed = db.listen_cases();
    let cases = feed.recv().await.unwrap();

    let titles: Vec<&str> = cases.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["third", "second", "first"]);

    let stamps: Vec<u64> = cases
        .iter()
        .map(|c| c.created_at.unwrap().as_millis())
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn case_feed_delivers_every_insert() {
    let db = database();
    let mut feed = db.listen_cases();

    assert!(feed.recv().await.unwrap().is_empty());

    db.create_case(report("a"), Vec::new()).await.unwrap();
    assert_eq!(feed.recv().await.unwrap().len(), 1);

    db.create_case(report("b"), Vec::new()).await.unwrap();
    let cases = feed.recv().await.unwrap();
    assert_eq!(cases.len(), 2);
    assert_eq!(cases[0].title, "b");
}

#[tokio::test]
async fn comments_are_oldest_first_and_scoped_to_their_case() {
    let db = database();
    let case_a = db.create_case(report("A"), Vec::new()).await.unwrap();
    let case_b = db.create_case(report("B"), Vec::new()).await.unwrap();

    for content in ["one", "two"] {
        db.create_comment(
            &case_a,
            NewComment {
                author_name: "carol".into(),
                content: content.into(),
            },
        )
        .await
        .unwrap();
    }
    db.create_comment(
        &case_b,
        NewComment {
            author_name: "dave".into(),
            content: "elsewhere".into(),
        },
    )
    .await
    .unwrap();

    let mut thread = db.listen_comments(&case_a);
    let comments = thread.recv().await.unwrap();

    let contents: Vec<&str> = comments.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two"]);

    let stamps: Vec<u64> = comments
        .iter()
        .map(|c| c.created_at.unwrap().as_millis())
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn new_comment_arrives_last_in_the_thread() {
    let db = database();
    let case_id = db.create_case(report("A"), Vec::new()).await.unwrap();

    db.create_comment(
        &case_id,
        NewComment {
            author_name: "someone".into(),
            content: "earlier".into(),
        },
    )
    .await
    .unwrap();
    db.create_comment(
        &case_id,
        NewComment {
            author_name: "bob".into(),
            content: "hi".into(),
        },
    )
    .await
    .unwrap();

    let mut thread = db.listen_comments(&case_id);
    let comments = thread.recv().await.unwrap();

    let last = comments.last().unwrap();
    assert_eq!(last.content, "hi");
    assert_eq!(last.author_name, "bob");
}

#[tokio::test]
async fn slow_reader_sees_the_latest_feed_state() {
    let db = database();
    let mut feed = db.listen_cases();

    // three writes land before the reader polls once; the intermediate
    // snapshots are superseded, never re-delivered
    for title in ["a", "b", "c"] {
        db.create_case(report(title), Vec::new()).await.unwrap();
    }

    let cases = feed.recv().await.unwrap();
    assert_eq!(cases.len(), 3);
    assert_eq!(cases[0].title, "c");
}

#[tokio::test]
async fn unsubscribed_feed_stops_delivering() {
    let db = database();
    let mut feed = db.listen_cases();
    assert!(feed.recv().await.unwrap().is_empty());

    feed.unsubscribe();
    db.create_case(report("late"), Vec::new()).await.unwrap();

    assert!(feed.recv().await.is_none());
}

#[tokio::test]
async fn live_list_tracks_the_feed_without_duplicates() {
    let db = database();
    let mut feed = db.listen_cases();
    let mut list = LiveList::new();

    list.apply_snapshot(feed.recv().await.unwrap());
    assert!(list.is_empty());

    db.create_case(report("a"), Vec::new()).await.unwrap();
    list.apply_snapshot(feed.recv().await.unwrap());
    db.create_case(report("b"), Vec::new()).await.unwrap();
    list.apply_snapshot(feed.recv().await.unwrap());

    assert_eq!(list.len(), 2);
    let mut ids: Vec<&str> = list.items().iter().map(|c| c.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 2);
}
