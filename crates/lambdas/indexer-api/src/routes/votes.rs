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
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::{
    handler::{cache_control, handle_error},
    models::{VoteEntryResponse, VotesParams, VotesResponse},
    state::AppState,
    utils::parse_address,
};

/// Create vote history routes
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/:address", get(get_votes))
}

/// GET /v1/votes/:address
/// Returns every share purchase of an address, joined with market metadata
#[utoipa::path(
    get,
    path = "/v1/votes/{address}",
    tag = "Votes",
    params(
        ("address" = String, Path, description = "Ethereum address of the buyer"),
        VotesParams
    ),
    responses(
        (status = 200, description = "Vote history", body = VotesResponse),
        (status = 400, description = "Invalid address"),
        (status = 503, description = "Upstream service unavailable"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_votes(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(params): Query<VotesParams>,
) -> Response {
    match get_votes_impl(state, address, params).await {
        Ok(response) => {
            let mut res = Json(response).into_response();
            res.headers_mut().insert(header::CACHE_CONTROL, cache_control("public, max-age=300"));
            res
        }
        Err(err) => handle_error(err).into_response(),
    }
}

async fn get_votes_impl(
    state: Arc<AppState>,
    address: String,
    params: VotesParams,
) -> anyhow::Result<VotesResponse> {
    let address = parse_address(&address)?;
    tracing::debug!("Fetching votes for {:#x}", address);

    let history = state.pipeline.vote_history(address, &params.into_query()).await?;
    let token = state.pipeline.token_info().await?;

    Ok(VotesResponse {
        address: format!("{:#x}", history.address),
        votes: history
            .votes
            .iter()
            .map(|vote| VoteEntryResponse::from_entry(vote, token.decimals, &token.symbol))
            .collect(),
        token_symbol: history.token_symbol,
        complete: history.complete,
    })
}
