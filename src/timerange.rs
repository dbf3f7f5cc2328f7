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

//! Resolution of relative (`-6h`) and absolute (epoch) time expressions into
//! concrete epoch boundaries for search and feed queries.

use crate::error::Error;
use chrono::Utc;

const MINUTE: i64 = 60;
const HOUR: i64 = 3_600;
const DAY: i64 = 86_400;

/// Default span appended to `from` when no `until` is given in standard mode.
pub const DEFAULT_SPAN_SECS: i64 = 7 * DAY;

const DEFAULT_FROM_EXPR: &str = "-6h";

/// Which query family the range is resolved for. Feed queries lag `now` by a
/// few minutes so the backend has finished ingesting the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Standard,
    Feed,
    Timeseries,
}

impl QueryMode {
    fn delay_minutes(self) -> i64 {
        match self {
            QueryMode::Feed => 5,
            QueryMode::Standard | QueryMode::Timeseries => 0,
        }
    }
}

/// A resolved `[from, until]` pair in epoch seconds, `until` clamped to `now`.
///
/// Immutable once resolved, except that the bounded pagination driver advances
/// `from_epoch` as windows are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from_epoch: i64,
    pub until_epoch: i64,
}

#[derive(Debug, Clone, Copy)]
enum Unit {
    Days,
    Hours,
    Minutes,
}

impl Unit {
    fn seconds(self) -> i64 {
        match self {
            Unit::Days => DAY,
            Unit::Hours => HOUR,
            Unit::Minutes => MINUTE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Expr {
    Relative(i64, Unit),
    Absolute(i64),
}

/// Current UTC time in epoch seconds, rounded down to the minute.
pub fn now_epoch_minute() -> i64 {
    let now = Utc::now().timestamp();
    now - now.rem_euclid(MINUTE)
}

/// Resolve `from`/`until` expressions into a concrete range.
///
/// `now_epoch` is passed explicitly so resolution is a pure function of its
/// inputs; callers use [`now_epoch_minute`].
pub fn resolve(
    from_expr: Option<&str>,
    until_expr: Option<&str>,
    mode: QueryMode,
    now_epoch: i64,
) -> Result<TimeRange, Error> {
    let range = match mode {
        QueryMode::Standard => resolve_standard(from_expr, until_expr, now_epoch)?,
        QueryMode::Feed | QueryMode::Timeseries => {
            resolve_delayed(from_expr, until_expr, mode, now_epoch)?
        }
    };

    Ok(TimeRange {
        from_epoch: range.from_epoch,
        until_epoch: range.until_epoch.min(now_epoch),
    })
}

fn resolve_standard(
    from_expr: Option<&str>,
    until_expr: Option<&str>,
    now_epoch: i64,
) -> Result<TimeRange, Error> {
    let from_epoch = match parse_expr(from_expr.unwrap_or(DEFAULT_FROM_EXPR))? {
        Expr::Relative(value, unit) => now_epoch - value * unit.seconds(),
        Expr::Absolute(epoch) => epoch,
    };

    let until_epoch = match until_expr {
        None => from_epoch + DEFAULT_SPAN_SECS,
        Some(raw) => match parse_expr(raw)? {
            Expr::Relative(value, unit) => now_epoch - value * unit.seconds(),
            Expr::Absolute(epoch) => epoch,
        },
    };

    Ok(TimeRange {
        from_epoch,
        until_epoch,
    })
}

fn resolve_delayed(
    from_expr: Option<&str>,
    until_expr: Option<&str>,
    mode: QueryMode,
    now_epoch: i64,
) -> Result<TimeRange, Error> {
    let is_feed = mode == QueryMode::Feed;
    let delay = mode.delay_minutes();

    let from_epoch = match from_expr {
        None => now_epoch - (30 + delay) * MINUTE,
        Some(raw) => match parse_expr(raw)? {
            Expr::Absolute(epoch) => epoch,
            Expr::Relative(value, unit) => match unit {
                Unit::Days => {
                    // One minute shy of the full delay keeps `from` inside the
                    // backend's 24h-plus-delay maximum lookback.
                    let minutes = if is_feed { delay - 1 } else { delay };
                    now_epoch - value * DAY - minutes * MINUTE
                }
                Unit::Hours => {
                    let minutes = if is_feed && value == 24 { delay - 1 } else { delay };
                    now_epoch - value * HOUR - minutes * MINUTE
                }
                Unit::Minutes => now_epoch - (value + delay) * MINUTE,
            },
        },
    };

    let until_epoch = match until_expr {
        None => now_epoch - delay * MINUTE,
        Some(raw) => match parse_expr(raw)? {
            Expr::Absolute(epoch) => epoch,
            Expr::Relative(value, unit) => match unit {
                Unit::Days => now_epoch - value * DAY,
                Unit::Hours => now_epoch - value * HOUR - delay * MINUTE,
                Unit::Minutes => now_epoch - (value + delay) * MINUTE,
            },
        },
    };

    Ok(TimeRange {
        from_epoch,
        until_epoch,
    })
}

fn parse_expr(raw: &str) -> Result<Expr, Error> {
    let trimmed = raw.trim();

    let body = match trimmed.strip_prefix('-') {
        None => {
            return trimmed
                .parse::<i64>()
                .map(Expr::Absolute)
                .map_err(|_| Error::InvalidTimeExpression(raw.to_string()));
        }
        Some(body) => body,
    };

    let unit_char = body
        .chars()
        .last()
        .ok_or_else(|| Error::InvalidTimeExpression(raw.to_string()))?;

    let unit = match unit_char.to_ascii_lowercase() {
        'd' => Unit::Days,
        'h' => Unit::Hours,
        'm' => Unit::Minutes,
        _ => return Err(Error::InvalidTimeExpression(raw.to_string())),
    };

    let value = body[..body.len() - unit_char.len_utf8()]
        .parse::<i64>()
        .map_err(|_| Error::InvalidTimeExpression(raw.to_string()))?;

    Ok(Expr::Relative(value, unit))
}
