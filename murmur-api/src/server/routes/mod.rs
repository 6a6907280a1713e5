use crate::server::ServerRouter;
use axum::Router;

mod accounts;
mod health;
mod posts;

pub fn routes() -> ServerRouter {
    Router::new()
        .merge(accounts::routes())
        .merge(health::routes())
        .merge(posts::routes())
}
