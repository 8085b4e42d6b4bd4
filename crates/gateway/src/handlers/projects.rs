//! Project directory

use axum::{extract::State, Json};

use crate::AppState;
use deskflow_common::{auth::AuthContext, db::models::Project, errors::Result};

/// Projects a requester can pick, ordered by name
pub async fn list_projects(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<Vec<Project>>> {
    let projects = state.repository().list_projects().await?;
    Ok(Json(projects))
}
