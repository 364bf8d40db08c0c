use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::server::error::Error;

/// wraps `axum::extract::Query` with a `validator::Validate` pass, so malformed
/// query params and semantically invalid ones both become the same 400 shape.
pub struct ValidatedQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|err| Error::BadRequest(err.to_string()))?;

        value.validate().map_err(|err| Error::BadRequest(err.to_string()))?;

        Ok(ValidatedQuery(value))
    }
}
