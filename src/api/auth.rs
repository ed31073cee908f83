use std::collections::HashMap;

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::StatusCode;

use super::ApiState;

/// Extractor enforcing the shared-secret check on a route.
///
/// Callers present the secret either as an `X-Auth-Token` header or as a
/// `token` query parameter. When no secret is configured the check is
/// disabled and every request passes.
pub(super) struct RequireAuth;

#[axum::async_trait]
impl FromRequestParts<ApiState> for RequireAuth {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("x-auth-token")
            .and_then(|value| value.to_str().ok());
        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|params| params.0.get("token").cloned());

        if is_authorized(state.auth_token.as_deref(), header, query.as_deref()) {
            Ok(Self)
        } else {
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

fn is_authorized(expected: Option<&str>, header: Option<&str>, query: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    header == Some(expected) || query == Some(expected)
}
