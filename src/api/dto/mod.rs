//! Data Transfer Objects for REST request/response serialization.
//!
//! Field names are camelCase on the wire. Wei amounts travel as JSON
//! strings to prevent precision loss on u128 values.

pub mod common_dto;
pub mod event_dto;
pub mod job_dto;

pub use common_dto::*;
pub use event_dto::*;
pub use job_dto::*;
