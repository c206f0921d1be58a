//! Cursor pagination over the event log.

pub mod cursor;
pub mod service;

pub use cursor::{Cursor, CursorError};
pub use service::{
    DEFAULT_LIMIT, Direction, MAX_LIMIT, Page, PageInfo, PageRequest, PaginationError,
    PaginationService, clamp_limit,
};
