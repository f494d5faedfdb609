//! Request extractors.
//!
//! Authentication happens upstream; the ledger trusts the identity headers
//! forwarded by the fronting proxy and only turns them into an [`Actor`].

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::domain::{Actor, Role, UserId};
use crate::error::LedgerError;

/// Header carrying the acting user's UUID.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

/// Header carrying the acting user's role.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

fn header<'a>(parts: &'a Parts, name: &'static str) -> Result<&'a str, LedgerError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| LedgerError::Unauthenticated(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| LedgerError::Unauthenticated(format!("{name} header is not valid text")))
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = LedgerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id: UserId = header(parts, ACTOR_ID_HEADER)?
            .trim()
            .parse()
            .map_err(|_| LedgerError::Unauthenticated(format!("{ACTOR_ID_HEADER} is not a UUID")))?;
        let role: Role = header(parts, ACTOR_ROLE_HEADER)?.parse()?;
        Ok(Self::new(id, role))
    }
}
