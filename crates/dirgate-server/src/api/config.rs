//! Deployment hints for the UI. Not policy-gated.

use axum::extract::State;
use axum::Json;
use dirgate_core::config::StructureSection;

use crate::state::SharedState;

/// `GET /config/structure`
pub async fn structure(State(state): State<SharedState>) -> Json<StructureSection> {
    Json(state.structure.clone())
}

/// `GET /config/baseDN`, as plain text.
pub async fn base_dn(State(state): State<SharedState>) -> String {
    state.base_dn.clone()
}
