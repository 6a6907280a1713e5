use crate::service::AuthError;
use murmur_common::model::auth::{Identity, TokenSigner};
use std::sync::Arc;
use tracing::debug;

/// Turns the raw credential of a request into a verified [`Identity`].
#[derive(Clone, Debug)]
pub struct SessionGuard {
    signer: Arc<TokenSigner>,
}

impl SessionGuard {
    #[must_use]
    pub fn new(signer: Arc<TokenSigner>) -> Self {
        Self { signer }
    }

    /// `credential` is the token as sent, `None` if the request had none.
    /// An empty credential counts as missing.
    pub fn authorize(&self, credential: Option<&str>) -> Result<Identity, AuthError> {
        let token = match credential.map(str::trim) {
            None | Some("") => return Err(AuthError::MissingCredential),
            Some(token) => token,
        };

        self.signer.verify(token).map_err(|err| {
            debug!(reason = ?err.reason(), "Rejected session token");
            AuthError::InvalidCredential
        })
    }
}
