//! Data Transfer Objects for REST request/response serialization.
//!
//! All monetary amounts are serialized as JSON strings to prevent
//! precision loss; requests accept either strings or numbers.

pub mod common_dto;
pub mod loan_dto;
pub mod payment_dto;

pub use common_dto::*;
pub use loan_dto::*;
pub use payment_dto::*;
