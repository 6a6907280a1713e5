use crate::{
    server::{Result, ServerRouter, json::Json},
    service::accounts::{AccountService, Session},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use murmur_common::model::{
    auth::{Identity, SessionToken},
    user::Credentials,
};
use serde::Serialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_post(register).typed_post(login)
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct SessionResponse {
    success: bool,
    token: SessionToken,
    user: Identity,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            success: true,
            token: session.token,
            user: session.user,
        }
    }
}

#[derive(TypedPath)]
#[typed_path("/api/register")]
struct RegisterPath;

async fn register(
    _: RegisterPath,
    State(accounts): State<Arc<AccountService>>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<SessionResponse>> {
    let session = accounts.register(credentials).await?;

    Ok(Json(session.into()))
}

#[derive(TypedPath)]
#[typed_path("/api/login")]
struct LoginPath;

async fn login(
    _: LoginPath,
    State(accounts): State<Arc<AccountService>>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<SessionResponse>> {
    let session = accounts.authenticate(credentials).await?;

    Ok(Json(session.into()))
}
