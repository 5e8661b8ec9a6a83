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

use thiserror::Error;

/// Errors that cross the pipeline boundary.
///
/// Recoverable, record-level failures (a skipped sub-range, a missing market, an unresolved
/// identity) never surface as a [PipelineError]; they are absorbed where they occur and logged.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The identity lookup service was configured without an API credential.
    #[error("identity lookup credential is not configured")]
    MissingCredential,

    /// Any other configuration problem detected at runtime.
    #[error("configuration error: {0}")]
    Config(String),

    /// A remote call exhausted its retries.
    #[error("upstream request failed: {0:#}")]
    Upstream(#[source] anyhow::Error),

    /// The backing store failed.
    #[error("store error: {0:#}")]
    Store(#[source] anyhow::Error),
}

impl PipelineError {
    /// Configuration failures are surfaced immediately and never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::MissingCredential | PipelineError::Config(_))
    }
}
