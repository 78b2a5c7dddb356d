//! Route-level enforcement for axum.
//!
//! ```ignore
//! Router::new().route(
//!     "/members/:username",
//!     get(members::get_member).route_layer(state.protect("/members/:username", rule)?),
//! )
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::async_trait;
use axum::body::Body;
use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};

use super::gate::{AccessGate, RegisteredRule};
use super::principal::{Principal, RouteContext};
use super::resolution::ParticipationSource;
use super::AuthzMode;
use crate::app::AppState;
use crate::errors::AppError;
use crate::session::SessionBoundary;

// =============================================================================
// AccessLayer
// =============================================================================

/// Layer enforcing one [`RegisteredRule`] in front of a route.
#[derive(Clone)]
pub struct AccessLayer {
    gate: Arc<AccessGate>,
    session: Arc<dyn SessionBoundary>,
    participations: Arc<dyn ParticipationSource>,
    rule: Arc<RegisteredRule>,
}

impl AccessLayer {
    pub fn new(
        gate: Arc<AccessGate>,
        session: Arc<dyn SessionBoundary>,
        participations: Arc<dyn ParticipationSource>,
        rule: RegisteredRule,
    ) -> Self {
        Self {
            gate,
            session,
            participations,
            rule: Arc::new(rule),
        }
    }
}

impl<S> Layer<S> for AccessLayer {
    type Service = AccessMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessMiddleware {
            inner,
            layer: self.clone(),
        }
    }
}

// =============================================================================
// AccessMiddleware
// =============================================================================

#[derive(Clone)]
pub struct AccessMiddleware<S> {
    inner: S,
    layer: AccessLayer,
}

impl<S> Service<Request<Body>> for AccessMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let layer = self.layer.clone();
        // the readied service handles this request, the clone waits for the next one
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if layer.gate.mode() == AuthzMode::Off {
                return inner.call(req).await;
            }

            let (mut parts, body) = req.into_parts();

            let route = match Path::<HashMap<String, String>>::from_request_parts(&mut parts, &()).await {
                Ok(Path(params)) => RouteContext::from(params),
                Err(_) => RouteContext::new(),
            };

            let principal = match layer.session.current_principal(&parts.headers).await {
                Ok(principal) => principal,
                Err(err) => return Ok(err.into_response()),
            };

            let decision = layer
                .gate
                .authorize(&layer.rule, principal.as_ref(), &route, layer.participations.as_ref())
                .await;

            match decision {
                Ok(decision) => {
                    if let Some(principal) = principal {
                        parts.extensions.insert(CurrentMember(principal));
                    }
                    parts.extensions.insert(decision);
                    inner.call(Request::from_parts(parts, body)).await
                }
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}

// =============================================================================
// CurrentMember
// =============================================================================

/// The authenticated principal for handlers.
///
/// Protected routes receive it from [`AccessMiddleware`]; elsewhere (or with
/// access control off) it is materialized from the session on demand.
#[derive(Debug, Clone)]
pub struct CurrentMember(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for CurrentMember {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(current) = parts.extensions.get::<CurrentMember>() {
            return Ok(current.clone());
        }

        state
            .session
            .current_principal(&parts.headers)
            .await?
            .map(CurrentMember)
            .ok_or_else(|| AppError::unauthorized("Authorization header missing"))
    }
}

/// The principal behind the request, if any.
///
/// Mutating handlers take this so they still run with access control off:
/// the principal only feeds audit records and ownership. With access control
/// on, protected routes always carry one.
#[derive(Debug, Clone)]
pub struct MaybeMember(pub Option<Principal>);

impl MaybeMember {
    pub fn member_id(&self) -> Option<uuid::Uuid> {
        self.0.as_ref().map(|principal| principal.member_id)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeMember {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(CurrentMember(principal)) = parts.extensions.get::<CurrentMember>() {
            return Ok(MaybeMember(Some(principal.clone())));
        }

        match state.session.current_principal(&parts.headers).await {
            Ok(principal) => Ok(MaybeMember(principal)),
            Err(err) if state.gate.mode() == AuthzMode::Off => {
                tracing::debug!(error = %err, "ignoring unusable session with access control off");
                Ok(MaybeMember(None))
            }
            Err(err) => Err(err),
        }
    }
}
