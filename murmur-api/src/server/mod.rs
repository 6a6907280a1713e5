use crate::service::{
    AuthError, ServiceError, accounts::AccountService, guard::SessionGuard, likes::LikeService,
    posts::PostService,
};
use axum::{
    Router,
    extract::{
        FromRef, Request, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use json::Json;
use murmur_common::model::{auth::TokenSigner, user::PasswordHasher};
use murmur_db::store::FeedStore;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error};

pub mod auth;
mod json;
mod routes;

pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub accounts: Arc<AccountService>,
    pub posts: Arc<PostService>,
    pub likes: Arc<LikeService>,
    pub guard: Arc<SessionGuard>,
    pub store: Arc<dyn FeedStore>,
}

impl ServerState {
    /// Wires every service to the same store handle.
    #[must_use]
    pub fn new(store: Arc<dyn FeedStore>, signer: TokenSigner, hasher: PasswordHasher) -> Self {
        let signer = Arc::new(signer);

        Self {
            accounts: Arc::new(AccountService::new(
                Arc::clone(&store),
                Arc::clone(&signer),
                hasher,
            )),
            posts: Arc::new(PostService::new(Arc::clone(&store))),
            likes: Arc::new(LikeService::new(Arc::clone(&store))),
            guard: Arc::new(SessionGuard::new(signer)),
            store,
        }
    }
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

/// The complete service: routes, state and the request-wide layers.
pub fn app(state: ServerState, request_timeout: Duration, cors: CorsLayer) -> Router {
    routes()
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            request_timeout,
            enforce_timeout,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Drops the handler once `timeout` passes and answers with a JSON error.
async fn enforce_timeout(
    State(timeout): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => ServerError::Timeout(timeout).into_response(),
    }
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("Request did not finish within {0:?}")]
    Timeout(Duration),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        Self::Service(value.into())
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_) => StatusCode::NOT_FOUND,
            ServerError::PathRejection(_) | ServerError::JsonRejection(_) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ServerError::JsonResponse(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Service(err) => match err {
                ServiceError::Validation(_)
                | ServiceError::Conflict
                | ServiceError::Auth(AuthError::InvalidCredentials) => StatusCode::BAD_REQUEST,
                ServiceError::Auth(AuthError::MissingCredential | AuthError::InvalidCredential) => {
                    StatusCode::UNAUTHORIZED
                }
                ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
                ServiceError::PostNotFound(_) => StatusCode::NOT_FOUND,
                ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// What the caller gets to see.
    pub fn message(&self) -> String {
        match self {
            ServerError::UnknownRoute(_) => "Route not found".to_owned(),
            ServerError::PathRejection(_) => "Invalid request path".to_owned(),
            ServerError::JsonRejection(_) => "Invalid JSON body".to_owned(),
            ServerError::Timeout(_) => "Request timed out".to_owned(),
            ServerError::JsonResponse(_) | ServerError::Service(ServiceError::Internal(_)) => {
                "Internal server error".to_owned()
            }
            ServerError::Service(err) => err.to_string(),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
struct ErrorResponse {
    success: bool,
    status: u16,
    msg: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(error = %self, %status, "Replying with error");
        } else {
            debug!(error = %self, %status, "Replying with error");
        }

        let error_response = ErrorResponse {
            success: false,
            status: status.as_u16(),
            msg: self.message(),
        };
        (status, Json(error_response)).into_response()
    }
}
