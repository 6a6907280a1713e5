use crate::{
    server::{Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json},
    service::{likes::LikeService, posts::PostService},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use murmur_common::model::post::{CreatePost, LikeAction, LikeToggle, Post, RECENT_POSTS_LIMIT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_posts)
        .typed_post(create_post)
        .typed_put(toggle_like)
        .typed_delete(delete_post)
}

#[derive(TypedPath)]
#[typed_path("/api/posts")]
struct PostsPath;

async fn list_posts(_: PostsPath, State(posts): State<Arc<PostService>>) -> Result<Json<Vec<Post>>> {
    let recent = posts.list_recent(RECENT_POSTS_LIMIT).await?;

    Ok(Json(recent))
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct CreatedResponse {
    success: bool,
    post: Post,
}

async fn create_post(
    _: PostsPath,
    State(posts): State<Arc<PostService>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Json(request): Json<CreatePost>,
) -> Result<Json<CreatedResponse>> {
    let post = posts.create(&identity, request).await?;

    Ok(Json(CreatedResponse {
        success: true,
        post,
    }))
}

// Ids stay raw strings here so that malformed ones are a validation error
// rather than a routing miss.
#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/{id}/like", rejection(ServerError))]
struct PostLikePath {
    id: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct LikeResponse {
    success: bool,
    post: Post,
    action: LikeAction,
}

async fn toggle_like(
    PostLikePath { id }: PostLikePath,
    State(likes): State<Arc<LikeService>>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> Result<Json<LikeResponse>> {
    let LikeToggle { post, action } = likes.toggle_like(&identity, &id).await?;

    Ok(Json(LikeResponse {
        success: true,
        post,
        action,
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/{id}", rejection(ServerError))]
struct PostPath {
    id: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct DeleteResponse {
    success: bool,
    msg: &'static str,
}

async fn delete_post(
    PostPath { id }: PostPath,
    State(posts): State<Arc<PostService>>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> Result<Json<DeleteResponse>> {
    posts.delete_by_id(&identity, &id).await?;

    Ok(Json(DeleteResponse {
        success: true,
        msg: "Post deleted successfully",
    }))
}
