//! Request gates for routes behind a session.
//!
//! Both gates verify the claim from the session cookie, attach it to the
//! request as a [`VerifiedClaim`] and short-circuit with the login page when
//! verification fails. Stage 2 additionally requires a confirmed postcode.

use super::{
    session::{current_claim, unauthenticated},
    state::AuthState,
};
use crate::claims::SessionClaim;
use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{Span, debug};

/// Claim that passed a gate on this request.
#[derive(Debug, Clone)]
pub struct VerifiedClaim(pub SessionClaim);

async fn gate(
    auth_state: &AuthState,
    mut request: Request,
    next: Next,
    require_postcode: bool,
) -> Response {
    let claim = match current_claim(auth_state, request.headers()) {
        Ok(claim) => claim,
        Err(err) => {
            debug!(reason = %err, "session rejected");
            return unauthenticated(auth_state, request.headers());
        }
    };
    if require_postcode && !claim.postcode_validated {
        debug!(reason = "postcode not confirmed", "session rejected");
        return unauthenticated(auth_state, request.headers());
    }

    claim.record_scope(&Span::current());
    request.extensions_mut().insert(VerifiedClaim(claim));
    next.run(request).await
}

pub async fn require_stage1(
    auth_state: Extension<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Response {
    gate(&auth_state, request, next, false).await
}

pub async fn require_stage2(
    auth_state: Extension<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Response {
    gate(&auth_state, request, next, true).await
}
