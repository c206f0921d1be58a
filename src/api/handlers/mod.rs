//! REST endpoint handlers organized by resource.

pub mod events;
pub mod jobs;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes at the root.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(events::routes())
        .merge(jobs::routes())
        .merge(system::routes())
}
