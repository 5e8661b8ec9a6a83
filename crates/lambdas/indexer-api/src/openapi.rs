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


use crate::models::*;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Predictboard Indexer API",
        version = "1.0.0",
        description = "API for prediction market winnings leaderboards and per-address vote histories.",
        contact(name = "Predictboard Development Team")
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Leaderboard", description = "Winnings leaderboard endpoints"),
        (name = "Votes", description = "Per-address share purchase endpoints")
    ),
    paths(
        // Health check
        crate::handler::health_check,
        // Leaderboard endpoints
        crate::routes::leaderboard::get_leaderboard,
        // Vote endpoints
        crate::routes::votes::get_votes,
    ),
    components(schemas(
        // Response models
        HealthResponse,
        LeaderboardResponse,
        LeaderboardEntryResponse,
        VotesResponse,
        VoteEntryResponse,

        // Query enums
        VoteSort,
        Direction,
    ))
)]
pub struct ApiDoc;
