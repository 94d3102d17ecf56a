//! fleetgrid-api — REST API for FleetGrid.
//!
//! Exposes the upgrade knobs, the current per-tier targets, and write feeds
//! for the fleet directory and the version status.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/upgrader` | All upgrade knobs |
//! | PUT | `/api/v1/upgrader/upgrades-per-minute` | Set the upgrade rate |
//! | PUT | `/api/v1/upgrader/target-major-version` | Set or clear the target major |
//! | GET | `/api/v1/upgrader/targets` | Current target version per tier |
//! | GET | `/api/v1/upgrader/confidence-overrides` | List confidence overrides |
//! | PUT | `/api/v1/upgrader/confidence-overrides/{version}` | Override a confidence |
//! | DELETE | `/api/v1/upgrader/confidence-overrides/{version}` | Remove an override |
//! | GET | `/api/v1/applications` | List applications |
//! | GET | `/api/v1/applications/{tenant}/{application}` | Get an application |
//! | PUT | `/api/v1/applications/{tenant}/{application}` | Store an application |
//! | GET | `/api/v1/versions` | Get the version status |
//! | PUT | `/api/v1/versions` | Replace the version status |

pub mod handlers;

use axum::Router;
use axum::routing::{get, put};
use fleetgrid_state::StateStore;
use fleetgrid_upgrader::UpgradePolicy;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub policy: UpgradePolicy,
}

impl ApiState {
    pub fn new(store: StateStore) -> Self {
        Self {
            policy: UpgradePolicy::new(store.clone()),
            store,
        }
    }
}

/// Build the complete API router.
pub fn build_router(store: StateStore) -> Router {
    let api_routes = Router::new()
        .route("/upgrader", get(handlers::get_upgrader))
        .route(
            "/upgrader/upgrades-per-minute",
            put(handlers::set_upgrades_per_minute),
        )
        .route(
            "/upgrader/target-major-version",
            put(handlers::set_target_major_version),
        )
        .route("/upgrader/targets", get(handlers::get_targets))
        .route(
            "/upgrader/confidence-overrides",
            get(handlers::list_confidence_overrides),
        )
        .route(
            "/upgrader/confidence-overrides/{version}",
            put(handlers::override_confidence).delete(handlers::remove_confidence_override),
        )
        .route("/applications", get(handlers::list_applications))
        .route(
            "/applications/{tenant}/{application}",
            get(handlers::get_application).put(handlers::put_application),
        )
        .route(
            "/versions",
            get(handlers::get_versions).put(handlers::put_versions),
        )
        .with_state(ApiState::new(store));

    Router::new().nest("/api/v1", api_routes)
}
