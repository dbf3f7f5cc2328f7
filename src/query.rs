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

use crate::timerange::TimeRange;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Parameters for one search query against the requests endpoint.
///
/// Rebuilt into a query string before every page fetch, because the bounded
/// pagination driver mutates `time_range` between pages.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub time_range: TimeRange,
    pub tags: Vec<String>,
    pub custom_tags: Vec<String>,
    pub server: Option<String>,
    pub ip: Option<String>,
    pub sort: SortOrder,
}

impl QuerySpec {
    pub fn new(time_range: TimeRange) -> Self {
        Self {
            time_range,
            tags: Vec::new(),
            custom_tags: Vec::new(),
            server: None,
            ip: None,
            sort: SortOrder::Asc,
        }
    }

    /// Render the wire-format query string.
    ///
    /// Clause order is fixed: `from`, `until`, `server`, `ip`, tag clauses
    /// (tags then custom tags, duplicates kept), then exactly one trailing
    /// `sort:time-<asc|desc>`. The trailing sort is what lets the bounded
    /// driver read a meaningful watermark off the last record of a page.
    pub fn build(&self) -> String {
        let mut query = format!(
            "from:{} until:{} ",
            self.time_range.from_epoch, self.time_range.until_epoch
        );

        if let Some(server) = &self.server {
            let _ = write!(query, "server:{server} ");
        }

        if let Some(ip) = &self.ip {
            let _ = write!(query, "ip:{ip} ");
        }

        for tag in self.tags.iter().chain(self.custom_tags.iter()) {
            match tag.strip_prefix('-') {
                // A leading `-` marks exclusion; only the marker is stripped.
                Some(name) => {
                    let _ = write!(query, "-tag:{name} ");
                }
                None => {
                    let _ = write!(query, "tag:{tag} ");
                }
            }
        }

        let _ = write!(query, "sort:time-{}", self.sort.as_str());
        query
    }
}
