//! Reports and admin stats against the in-memory store

mod common;

use bson::oid::ObjectId;
use std::sync::Arc;

use common::*;
use connected_community::community::{CreatePost, CreateReport, ModerationService, PostService};
use connected_community::db::schemas::{
    PostCategory, PostStatus, PostVisibility, ReportStatus, ReportTarget, UserDoc,
};
use connected_community::store::Store;
use connected_community::CommunityError;

/// A verified user placed on High Street through their own address
async fn placed(store: &Arc<dyn Store>, name: &str, line1: &str) -> UserDoc {
    let user = verified_user(store, name).await;
    coordinator(store)
        .join(user.id, &join_request(line1, "KA12 8EE", "Irvine", "High Street"))
        .await
        .unwrap();
    fetch_user(store, user.id).await
}

fn sofa() -> CreatePost {
    CreatePost {
        category: PostCategory::Free,
        title: "Free sofa".into(),
        body: "Collect any time this week".into(),
        visibility: PostVisibility::Street,
        images: vec![],
    }
}

#[tokio::test]
async fn test_stats_count_only_live_posts() {
    let store = memory_store();
    let moderation = ModerationService::new(Arc::clone(&store), coordinator(&store));
    let posts = PostService::new(Arc::clone(&store));
    let alice = placed(&store, "Alice", "1 High Street").await;

    let kept = posts.create(&alice, &sofa()).await.unwrap();
    let gone = posts.create(&alice, &sofa()).await.unwrap();
    assert_eq!(moderation.stats().await.unwrap().posts, 2);

    posts
        .delete(&alice, ObjectId::parse_str(&gone.id).unwrap())
        .await
        .unwrap();

    let stats = moderation.stats().await.unwrap();
    assert_eq!(stats.posts, 1);
    assert_eq!(stats.streets, 1);
    assert_eq!(stats.towns, 1);
    assert!(posts
        .get(&alice, ObjectId::parse_str(&kept.id).unwrap())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_actioned_post_report_hides_post() {
    let store = memory_store();
    let moderation = ModerationService::new(Arc::clone(&store), coordinator(&store));
    let posts = PostService::new(Arc::clone(&store));
    let admin = admin_user(&store).await;
    let alice = placed(&store, "Alice", "1 High Street").await;
    let bob = placed(&store, "Bob", "2 High Street").await;

    let post = posts.create(&alice, &sofa()).await.unwrap();
    let post_id = ObjectId::parse_str(&post.id).unwrap();
    assert!(posts.get(&bob, post_id).await.is_ok());

    let report = moderation
        .report(
            &bob,
            &CreateReport {
                target_type: ReportTarget::Post,
                target_id: post.id.clone(),
                reason: "Not actually free".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(moderation.stats().await.unwrap().open_reports, 1);

    let handled = moderation
        .act_on_report(
            &admin,
            ObjectId::parse_str(&report.id).unwrap(),
            ReportStatus::Actioned,
        )
        .await
        .unwrap();
    assert_eq!(handled.status, ReportStatus::Actioned);

    // Gone for the street, still there for the author and admins
    assert!(matches!(
        posts.get(&bob, post_id).await,
        Err(CommunityError::NotFound(_))
    ));
    assert_eq!(posts.get(&alice, post_id).await.unwrap().status, PostStatus::Hidden);
    assert!(posts.get(&admin, post_id).await.is_ok());

    let stats = moderation.stats().await.unwrap();
    assert_eq!(stats.posts, 0);
    assert_eq!(stats.open_reports, 0);
}

#[tokio::test]
async fn test_dismissed_report_leaves_post_up() {
    let store = memory_store();
    let moderation = ModerationService::new(Arc::clone(&store), coordinator(&store));
    let posts = PostService::new(Arc::clone(&store));
    let admin = admin_user(&store).await;
    let alice = placed(&store, "Alice", "1 High Street").await;
    let bob = placed(&store, "Bob", "2 High Street").await;

    let post = posts.create(&alice, &sofa()).await.unwrap();
    let report = moderation
        .report(
            &bob,
            &CreateReport {
                target_type: ReportTarget::Post,
                target_id: post.id.clone(),
                reason: "Looks suspicious".into(),
            },
        )
        .await
        .unwrap();
    let report_id = ObjectId::parse_str(&report.id).unwrap();

    moderation
        .act_on_report(&admin, report_id, ReportStatus::Dismissed)
        .await
        .unwrap();

    let post_id = ObjectId::parse_str(&post.id).unwrap();
    assert_eq!(posts.get(&bob, post_id).await.unwrap().status, PostStatus::Active);

    let again = moderation
        .act_on_report(&admin, report_id, ReportStatus::Actioned)
        .await;
    assert!(matches!(again, Err(CommunityError::InvalidState(_))));
}
