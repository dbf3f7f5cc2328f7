// sigscictl - CLI for the Signal Sciences dashboard API
// Copyright (C) 2025 sigscictl contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use thiserror::Error;

/// Failures surfaced by the API client, time resolver, and record sinks.
///
/// Everything here is fatal for the current operation; there is no
/// partial-window resume across invocations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid time expression `{0}`: expected -<n>d, -<n>h, -<n>m, or epoch seconds")]
    InvalidTimeExpression(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The API answered with an explicit error payload. The message is the
    /// server's verbatim text; `query` is the request URL that triggered it.
    #[error("API error: {message} (query: {query})")]
    Upstream { message: String, query: String },

    #[error("request failed after retry: {0}")]
    RequestFailed(#[source] reqwest::Error),

    #[error("writing output: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("encoding csv row: {0}")]
    Csv(#[from] csv::Error),
}
