//! `OpenAPI` document for the REST surface.

use utoipa::OpenApi;

/// `OpenAPI` documentation for the auction enricher.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "Auction Enricher API",
        version = env!("CARGO_PKG_VERSION"),
        description = "Enrichment job submission, cursor-paginated auction event history and operator job inspection. Live updates are served over the `/ws` WebSocket channel."
    ),
    paths(
        crate::api::handlers::events::list_events,
        crate::api::handlers::events::get_event,
        crate::api::handlers::jobs::submit_enrichment_job,
        crate::api::handlers::jobs::list_failed_jobs,
        crate::api::handlers::jobs::get_job,
        crate::api::handlers::jobs::retry_failed_job,
        crate::api::handlers::jobs::queue_stats,
        crate::api::handlers::system::health_handler,
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            crate::error::ErrorBody,
            crate::api::dto::PaginationDto,
            crate::api::dto::EventListResponse,
            crate::api::dto::SubmitJobResponse,
            crate::api::dto::JobDto,
            crate::api::dto::QueueStatsResponse,
        )
    ),
    tags(
        (name = "Events", description = "Auction event history"),
        (name = "Jobs", description = "Enrichment job submission and inspection"),
        (name = "System", description = "Service health"),
    ),
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/events",
            "/events/{id}",
            "/jobs/enrichment",
            "/jobs/failed",
            "/jobs/{eventId}",
            "/jobs/{eventId}/retry",
            "/jobs/stats",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn doc_type_is_debuggable() {
        assert_eq!(format!("{ApiDoc:?}"), "ApiDoc");
    }
}
