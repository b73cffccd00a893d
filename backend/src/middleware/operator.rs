//! Operator identity
//!
//! The ledger has no login of its own. Whoever sits at the scanning station
//! is named in the `X-Operator` header and recorded on every movement.

use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

pub const OPERATOR_HEADER: &str = "x-operator";

/// Extractor for the optional operator name
#[derive(Clone, Debug, Default)]
pub struct Operator(pub Option<String>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Operator
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let name = parts
            .headers
            .get(OPERATOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| name.chars().take(100).collect());
        Ok(Operator(name))
    }
}
