use axum::{Json, extract::State};

use crate::{context::AppContext, error::ApiError, usage::UsageSummary};

pub(super) async fn stats(State(ctx): State<AppContext>) -> Result<Json<UsageSummary>, ApiError> {
    Ok(Json(ctx.usage.read().await?))
}
