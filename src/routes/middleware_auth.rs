use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;
use uuid::Uuid;

use crate::state::AppState;
use crate::tasks::Caller;

/// User id attached by [`identify_caller`] when a valid token was presented.
#[derive(Debug, Clone, Copy)]
struct CallerId(Uuid);

/// Requires a signed-in user.
pub struct JwtUser(pub Uuid);

impl<S> FromRequestParts<S> for JwtUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerId>()
            .map(|caller| JwtUser(caller.0))
            .ok_or((StatusCode::UNAUTHORIZED, "missing user"))
    }
}

/// Whoever is calling, signed in or not. Never rejects.
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller(parts.extensions.get::<CallerId>().map(|caller| caller.0)))
    }
}

/// Resolves the bearer token, if any. Requests without an `authorization`
/// header go through as anonymous; a bad token is refused outright.
pub async fn identify_caller(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, impl IntoResponse> {
    let auth_header = req.headers().get("authorization").and_then(|v| v.to_str().ok());

    let token = match auth_header {
        None => None,
        Some(h) if h.starts_with("Bearer ") => Some(h[7..].to_string()),
        Some(_) => {
            return Err((StatusCode::UNAUTHORIZED, "missing token"));
        }
    };
    let Some(token) = token else {
        return Ok(next.run(req).await);
    };

    match state.tokens.verify(&token) {
        Ok(user_id) => {
            req.extensions_mut().insert(CallerId(user_id));
            Ok(next.run(req).await)
        }
        Err(e) => {
            debug!(error = %e, "rejected bearer token");
            Err((StatusCode::UNAUTHORIZED, "invalid token"))
        }
    }
}
