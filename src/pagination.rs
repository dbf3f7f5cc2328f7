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

//! The pagination driver: turns the backend's capped search endpoint and its
//! cursor-style feed endpoint into a flat, ordered record stream.
//!
//! Two strategies:
//!
//! * **Bounded mode**: the requests endpoint returns at most [`PAGE_LIMIT`]
//!   records per call and offers no cursor, so the driver synthesizes
//!   pagination out of repeated time-windowed queries. While pages come back
//!   full the window's start advances to the watermark (the last record's
//!   timestamp); a drained window rolls forward by [`WINDOW_SECS`].
//! * **Cursor mode**: the feed endpoint hands back a `next.uri` continuation
//!   link which the driver follows verbatim until it comes back empty.

use crate::error::Error;
use crate::output::RecordSink;
use crate::query::{QuerySpec, SortOrder};
use crate::timerange::TimeRange;
use chrono::NaiveDateTime;
use serde_json::Value;

/// Hard cap the backend puts on one requests-endpoint response.
pub const PAGE_LIMIT: usize = 1000;

/// Window advance on an under-full page. Rescanning empty spans a day at a
/// time would waste API calls; a week matches the default search span.
pub const WINDOW_SECS: i64 = 7 * 86_400;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One page of the cursor-mode feed. An empty or blank `next_uri` signals
/// end of stream.
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub data: Vec<Value>,
    pub next_uri: Option<String>,
}

/// The driver's view of the HTTP client. Implemented by `ApiClient`; tests
/// substitute a scripted source.
pub trait PageSource {
    /// One bounded query: `GET .../requests?q=<query>&limit=<limit>`.
    fn search_page(&mut self, query: &str, limit: usize) -> Result<Vec<Value>, Error>;

    /// First feed request, carrying the full `from`/`until`/`tags` filter.
    fn feed_start(&mut self, range: &TimeRange, tags: &[String]) -> Result<FeedPage, Error>;

    /// Follow a continuation link exactly as the server gave it.
    fn feed_follow(&mut self, uri: &str) -> Result<FeedPage, Error>;

    /// Obtain a fresh session after a mid-stream expiry.
    fn reauthenticate(&mut self) -> Result<(), Error>;
}

/// Walk the bounded requests endpoint until the requested range is exhausted,
/// streaming each page to `sink` as it arrives. Returns the record count.
///
/// Boundary policy: a full page advances `from` to the watermark itself, so
/// the boundary record can be fetched again on the next page; consumers
/// de-duplicate by record id. If a full page of records shares one timestamp
/// the watermark cannot move, and the driver steps one second past it instead
/// of reissuing the same query forever.
pub fn run_bounded<S, K>(
    source: &mut S,
    spec: &mut QuerySpec,
    now_epoch: i64,
    sink: &mut K,
) -> Result<u64, Error>
where
    S: PageSource + ?Sized,
    K: RecordSink + ?Sized,
{
    // Watermark tracking only works on ascending pages.
    spec.sort = SortOrder::Asc;

    let fixed_until = spec.time_range.until_epoch;
    let mut emitted: u64 = 0;

    loop {
        let query = spec.build();
        let page = source.search_page(&query, PAGE_LIMIT)?;
        let full_page = page.len() >= PAGE_LIMIT;

        let mut watermark = None;
        for record in &page {
            if let Some(epoch) = record_epoch(record) {
                watermark = Some(epoch);
            }
            sink.write(record)?;
            emitted += 1;
        }

        let current = spec.time_range.from_epoch;
        spec.time_range.from_epoch = if full_page {
            match watermark {
                Some(mark) if mark > current => mark,
                _ => current + 1,
            }
        } else {
            // The window is drained; the watermark is stale for rollover.
            current + WINDOW_SECS
        };

        if spec.time_range.from_epoch > fixed_until || spec.time_range.from_epoch > now_epoch {
            break;
        }
    }

    sink.finish()?;
    Ok(emitted)
}

/// Follow the feed endpoint's continuation links until the server signals no
/// further data. Returns the record count.
///
/// An authentication-expired error on a follow-up gets one fresh login and a
/// replay of the same link; any further failure aborts the stream (records
/// already written stay written).
pub fn run_cursor<S, K>(
    source: &mut S,
    range: &TimeRange,
    tags: &[String],
    sink: &mut K,
) -> Result<u64, Error>
where
    S: PageSource + ?Sized,
    K: RecordSink + ?Sized,
{
    let mut page = source.feed_start(range, tags)?;
    let mut emitted: u64 = 0;

    loop {
        for record in &page.data {
            sink.write(record)?;
            emitted += 1;
        }

        let uri = match &page.next_uri {
            Some(uri) if !uri.trim().is_empty() => uri.clone(),
            _ => break,
        };

        page = match source.feed_follow(&uri) {
            Ok(next) => next,
            Err(Error::AuthenticationFailed(_)) => {
                source.reauthenticate()?;
                source.feed_follow(&uri)?
            }
            Err(err) => return Err(err),
        };
    }

    sink.finish()?;
    Ok(emitted)
}

/// Epoch of a record's `timestamp` field (ISO-8601 UTC, whole seconds).
fn record_epoch(record: &Value) -> Option<i64> {
    let raw = record.get("timestamp")?.as_str()?;
    let parsed = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok()?;
    Some(parsed.and_utc().timestamp())
}
