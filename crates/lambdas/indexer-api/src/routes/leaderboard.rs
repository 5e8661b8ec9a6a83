// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::{
    handler::{cache_control, handle_error},
    models::{LeaderboardEntryResponse, LeaderboardResponse},
    state::AppState,
};

/// Create leaderboard routes
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_leaderboard))
}

/// GET /v1/leaderboard
/// Returns the top winners by total claimed winnings
#[utoipa::path(
    get,
    path = "/v1/leaderboard",
    tag = "Leaderboard",
    responses(
        (status = 200, description = "Top winners", body = LeaderboardResponse),
        (status = 503, description = "Upstream service unavailable"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_leaderboard(State(state): State<Arc<AppState>>) -> Response {
    match get_leaderboard_impl(state).await {
        Ok(response) => {
            let mut res = Json(response).into_response();
            res.headers_mut().insert(header::CACHE_CONTROL, cache_control("public, max-age=300"));
            res
        }
        Err(err) => handle_error(err).into_response(),
    }
}

async fn get_leaderboard_impl(state: Arc<AppState>) -> anyhow::Result<LeaderboardResponse> {
    tracing::debug!("Fetching leaderboard");

    let leaderboard = state.pipeline.leaderboard().await?;
    let token = state.pipeline.token_info().await?;

    Ok(LeaderboardResponse {
        leaderboard: leaderboard
            .entries
            .iter()
            .map(|entry| LeaderboardEntryResponse::from_entry(entry, token.decimals, &token.symbol))
            .collect(),
        token_symbol: leaderboard.token_symbol,
        last_updated_ms: leaderboard.last_updated_ms,
        complete: leaderboard.complete,
    })
}
