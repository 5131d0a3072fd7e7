//! Street posts and their comment threads
//!
//! A post belongs to the street and town its author was placed in when it was
//! written. It can be read by its author, by admins, by members of that street
//! and, for `STREET_AND_TOWN` posts, by anyone placed in the town.

use bson::oid::ObjectId;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::community::views::{CommentView, PostView};
use crate::db::schemas::{
    CommentDoc, Metadata, PostCategory, PostDoc, PostStatus, PostVisibility, UserDoc,
};
use crate::store::{not_found, settle, Store, UnitOfWork};
use crate::types::{CommunityError, Result};

const MIN_TEXT_CHARS: usize = 3;
const MAX_IMAGES: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePost {
    pub category: PostCategory,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub visibility: PostVisibility,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostUpdate {
    #[serde(default)]
    pub category: Option<PostCategory>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub visibility: Option<PostVisibility>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateComment {
    pub body: String,
}

fn check_text(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.chars().count() < MIN_TEXT_CHARS {
        return Err(CommunityError::Validation(format!(
            "{} must be at least {} characters",
            field, MIN_TEXT_CHARS
        )));
    }
    Ok(value.to_string())
}

fn check_images(images: &[String]) -> Result<()> {
    if images.len() > MAX_IMAGES {
        return Err(CommunityError::Validation(format!(
            "At most {} images are allowed",
            MAX_IMAGES
        )));
    }
    if images
        .iter()
        .any(|url| !(url.starts_with("https://") || url.starts_with("http://")))
    {
        return Err(CommunityError::Validation("images must be http(s) URLs".into()));
    }
    Ok(())
}

/// Whether `viewer` may read `post`
pub fn can_view(post: &PostDoc, viewer: &UserDoc) -> bool {
    if post.status == PostStatus::Deleted {
        return false;
    }
    if viewer.is_admin || post.author_id == viewer.id {
        return true;
    }
    if post.status != PostStatus::Active {
        return false;
    }
    viewer.street_group_id == Some(post.street_group_id)
        || (post.visibility == PostVisibility::StreetAndTown
            && viewer.town_id == Some(post.town_id))
}

pub struct PostService {
    store: Arc<dyn Store>,
}

impl PostService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, author: &UserDoc, input: &CreatePost) -> Result<PostView> {
        let title = check_text("title", &input.title)?;
        let body = check_text("body", &input.body)?;
        check_images(&input.images)?;

        let (Some(street_group_id), Some(town_id)) = (author.street_group_id, author.town_id)
        else {
            return Err(CommunityError::Validation(
                "Join your street before posting".into(),
            ));
        };

        let post = PostDoc {
            id: ObjectId::new(),
            metadata: Metadata::new(),
            author_id: author.id,
            street_group_id,
            town_id,
            category: input.category,
            title,
            body,
            visibility: input.visibility,
            images: input.images.clone(),
            status: PostStatus::Active,
        };

        let mut uow = self.store.begin().await?;
        let result = uow.insert_post(&post).await;
        settle(uow, result).await?;

        info!(post_id = %post.id, author_id = %author.id, "Post created");
        Ok(PostView::from(&post))
    }

    pub async fn get(&self, viewer: &UserDoc, post_id: ObjectId) -> Result<PostView> {
        let mut uow = self.store.begin().await?;
        let result = visible_post(&mut *uow, viewer, post_id).await;
        let post = settle(uow, result).await?;
        Ok(PostView::from(&post))
    }

    /// Partial update by the author
    pub async fn update(
        &self,
        editor: &UserDoc,
        post_id: ObjectId,
        update: &PostUpdate,
    ) -> Result<PostView> {
        let title = update.title.as_deref().map(|t| check_text("title", t)).transpose()?;
        let body = update.body.as_deref().map(|b| check_text("body", b)).transpose()?;
        if let Some(images) = &update.images {
            check_images(images)?;
        }

        let mut uow = self.store.begin().await?;
        let result = Self::update_in(&mut *uow, editor, post_id, update, title, body).await;
        let post = settle(uow, result).await?;
        Ok(PostView::from(&post))
    }

    /// Soft-delete by the author or an admin
    pub async fn delete(&self, actor: &UserDoc, post_id: ObjectId) -> Result<&'static str> {
        let mut uow = self.store.begin().await?;
        let result = Self::delete_in(&mut *uow, actor, post_id).await;
        settle(uow, result).await?;

        info!(post_id = %post_id, actor_id = %actor.id, "Post deleted");
        Ok("Post deleted")
    }

    /// Comments on a visible post, oldest first
    pub async fn comments(&self, viewer: &UserDoc, post_id: ObjectId) -> Result<Vec<CommentView>> {
        let mut uow = self.store.begin().await?;
        let result = visible_thread(&mut *uow, viewer, post_id).await;
        let comments = settle(uow, result).await?;
        Ok(comments.iter().map(CommentView::from).collect())
    }

    pub async fn add_comment(
        &self,
        author: &UserDoc,
        post_id: ObjectId,
        input: &CreateComment,
    ) -> Result<CommentView> {
        let body = input.body.trim();
        if body.is_empty() {
            return Err(CommunityError::Validation("body is required".into()));
        }
        let comment = CommentDoc::new(post_id, author.id, body);

        let mut uow = self.store.begin().await?;
        let result = Self::comment_in(&mut *uow, author, &comment).await;
        settle(uow, result).await?;
        Ok(CommentView::from(&comment))
    }

    async fn update_in(
        uow: &mut dyn UnitOfWork,
        editor: &UserDoc,
        post_id: ObjectId,
        update: &PostUpdate,
        title: Option<String>,
        body: Option<String>,
    ) -> Result<PostDoc> {
        let mut post = visible_post(uow, editor, post_id).await?;
        if post.author_id != editor.id {
            return Err(CommunityError::Forbidden(
                "Only the author can edit this post".into(),
            ));
        }

        if let Some(category) = update.category {
            post.category = category;
        }
        if let Some(title) = title {
            post.title = title;
        }
        if let Some(body) = body {
            post.body = body;
        }
        if let Some(visibility) = update.visibility {
            post.visibility = visibility;
        }
        if let Some(images) = &update.images {
            post.images = images.clone();
        }

        uow.save_post(&post).await?;
        Ok(post)
    }

    async fn delete_in(uow: &mut dyn UnitOfWork, actor: &UserDoc, post_id: ObjectId) -> Result<()> {
        let mut post = visible_post(uow, actor, post_id).await?;
        if post.author_id != actor.id && !actor.is_admin {
            return Err(CommunityError::Forbidden(
                "Only the author or an admin can delete this post".into(),
            ));
        }
        post.status = PostStatus::Deleted;
        uow.save_post(&post).await
    }

    async fn comment_in(uow: &mut dyn UnitOfWork, author: &UserDoc, comment: &CommentDoc) -> Result<()> {
        visible_post(uow, author, comment.post_id).await?;
        uow.insert_comment(comment).await
    }
}

async fn visible_post(uow: &mut dyn UnitOfWork, viewer: &UserDoc, post_id: ObjectId) -> Result<PostDoc> {
    uow.post(post_id)
        .await?
        .filter(|post| can_view(post, viewer))
        .ok_or_else(|| not_found("Post"))
}

async fn visible_thread(
    uow: &mut dyn UnitOfWork,
    viewer: &UserDoc,
    post_id: ObjectId,
) -> Result<Vec<CommentDoc>> {
    visible_post(uow, viewer, post_id).await?;
    uow.comments_for_post(post_id).await
}
