//! Bearer-token verification middleware: checks signature, expiry, and
//! the blacklist, then inserts the verified subject into request
//! extensions for downstream handlers. Mirrors the `tower::Layer` /
//! `tower::Service` shape used elsewhere in this workspace for request
//! middleware.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    response::IntoResponse,
};
use tower::{Layer, Service};
use uuid::Uuid;

use crate::blacklist::Blacklist;
use crate::token::{Claims, TokenAuthority, TokenKind};

/// The authenticated subject, inserted into request extensions on success.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Uuid);

#[derive(Clone)]
pub struct AuthLayer {
    authority: TokenAuthority,
    blacklist: Arc<Blacklist>,
}

impl AuthLayer {
    pub fn new(authority: TokenAuthority, blacklist: Arc<Blacklist>) -> Self {
        Self {
            authority,
            blacklist,
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            authority: self.authority.clone(),
            blacklist: self.blacklist.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    authority: TokenAuthority,
    blacklist: Arc<Blacklist>,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let authority = self.authority.clone();
        let blacklist = self.blacklist.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let token = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "));

            let Some(token) = token else {
                return Ok(unauthorized());
            };

            let claims = match authority.verify(token, TokenKind::Access) {
                Ok(claims) => claims,
                Err(_) => return Ok(unauthorized()),
            };

            if blacklist.is_token_revoked(claims.jti).await
                || blacklist.is_user_revoked(claims.sub).await
            {
                return Ok(unauthorized());
            }

            req.extensions_mut().insert(AuthenticatedUser(claims.sub));
            req.extensions_mut().insert(claims);
            inner.call(req).await
        })
    }
}

fn unauthorized() -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({"error": "unauthorized"})),
    )
        .into_response()
}
