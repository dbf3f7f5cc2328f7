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

//! Record sinks: stream retrieved records to a file or stdout as JSON or CSV.

use crate::error::Error;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;

/// Consumes the record stream produced by the pagination driver.
///
/// Sinks flush after every record so an interrupted run leaves output that is
/// readable up to the truncation point.
pub trait RecordSink {
    fn write(&mut self, record: &Value) -> Result<(), Error>;

    /// Close any framing. Must be called once after the last record.
    fn finish(&mut self) -> Result<(), Error>;
}

/// Which fixed CSV column layout to use for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Request,
    Event,
}

/// JSON sink. Framed output (files) is a single `[...]` array with element
/// separators tracked across page boundaries; unframed output (console) is
/// one record per line.
pub struct JsonSink<W: Write> {
    out: W,
    framed: bool,
    pretty: bool,
    written: u64,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W, framed: bool, pretty: bool) -> Self {
        Self {
            out,
            framed,
            pretty,
            written: 0,
        }
    }
}

impl<W: Write> RecordSink for JsonSink<W> {
    fn write(&mut self, record: &Value) -> Result<(), Error> {
        let rendered = if self.pretty {
            pretty_string(record)?
        } else {
            serde_json::to_string(record)?
        };

        if self.framed {
            self.out
                .write_all(if self.written == 0 { b"[" } else { b"," })?;
            self.out.write_all(rendered.as_bytes())?;
        } else {
            writeln!(self.out, "{rendered}")?;
        }

        self.out.flush()?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        if self.framed {
            self.out
                .write_all(if self.written == 0 { b"[]" } else { b"]" })?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// CSV sink with a fixed column order per record kind. No header row.
///
/// List-valued fields (request tags, event reasons) are pipe-joined, which is
/// lossy: the join cannot be reversed if a member contains `|`.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    kind: RecordKind,
}

impl<W: Write> CsvSink<W> {
    pub fn new(out: W, kind: RecordKind) -> Self {
        Self {
            writer: csv::WriterBuilder::new().has_headers(false).from_writer(out),
            kind,
        }
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn write(&mut self, record: &Value) -> Result<(), Error> {
        let row = match self.kind {
            RecordKind::Request => request_row(record),
            RecordKind::Event => event_row(record),
        };
        self.writer.write_record(&row)?;
        self.writer.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.writer.flush()?;
        Ok(())
    }
}

fn request_row(record: &Value) -> Vec<String> {
    vec![
        field(record, "timestamp"),
        field(record, "id"),
        field(record, "remoteIP"),
        field(record, "remoteCountryCode"),
        field(record, "path"),
        pipe_join_tag_types(record.get("tags")),
        field(record, "responseCode"),
        field(record, "agentResponseCode"),
    ]
}

fn event_row(record: &Value) -> Vec<String> {
    vec![
        field(record, "timestamp"),
        field(record, "id"),
        field(record, "source"),
        field(record, "remoteHostname"),
        field(record, "remoteCountryCode"),
        field(record, "action"),
        field(record, "type"),
        pipe_join_strings(record.get("reasons")),
        field(record, "tagCount"),
        field(record, "window"),
        field(record, "detectedTimestamp"),
        field(record, "expires"),
    ]
}

fn field(record: &Value, key: &str) -> String {
    match record.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Request tags arrive as objects; the CSV column carries each one's `type`.
fn pipe_join_tag_types(tags: Option<&Value>) -> String {
    let types: Vec<&str> = tags
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|t| t.get("type").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    types.join("|")
}

fn pipe_join_strings(values: Option<&Value>) -> String {
    let strings: Vec<&str> = values
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    strings.join("|")
}

/// Print a single non-paginated payload (timeseries, config objects, ...).
pub fn write_value<W: Write>(out: &mut W, value: &Value, pretty: bool) -> Result<(), Error> {
    if pretty {
        writeln!(out, "{}", pretty_string(value)?)?;
    } else {
        writeln!(out, "{}", serde_json::to_string(value)?)?;
    }
    out.flush()?;
    Ok(())
}

// serde_json's default pretty printer indents with two spaces; the dashboard
// tooling convention is four, with keys sorted (serde_json maps are ordered).
fn pretty_string(value: &Value) -> Result<String, Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn framed_json_tracks_separators_across_writes() {
        let mut buf = Vec::new();
        {
            let mut sink = JsonSink::new(&mut buf, true, false);
            sink.write(&json!({"id": "a"})).unwrap();
            sink.write(&json!({"id": "b"})).unwrap();
            sink.write(&json!({"id": "c"})).unwrap();
            sink.finish().unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, r#"[{"id":"a"},{"id":"b"},{"id":"c"}]"#);
        // Still valid JSON after framing.
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 3);
    }

    #[test]
    fn framed_json_with_no_records_is_an_empty_array() {
        let mut buf = Vec::new();
        {
            let mut sink = JsonSink::new(&mut buf, true, false);
            sink.finish().unwrap();
        }
        assert_eq!(String::from_utf8(buf).unwrap(), "[]");
    }

    #[test]
    fn unframed_json_is_one_record_per_line() {
        let mut buf = Vec::new();
        {
            let mut sink = JsonSink::new(&mut buf, false, false);
            sink.write(&json!({"id": "a"})).unwrap();
            sink.write(&json!({"id": "b"})).unwrap();
            sink.finish().unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn pretty_output_uses_four_space_indent_and_sorted_keys() {
        let mut buf = Vec::new();
        write_value(&mut buf, &json!({"zebra": 1, "apple": 2}), true).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("    \"apple\": 2"));
        assert!(text.find("apple").unwrap() < text.find("zebra").unwrap());
    }

    #[test]
    fn request_rows_round_trip_through_csv() {
        let record = json!({
            "timestamp": "2024-05-01T12:00:00Z",
            "id": "req-1",
            "remoteIP": "198.51.100.7",
            "remoteCountryCode": "NL",
            "path": "/login, with comma",
            "tags": [{"type": "SQLI"}, {"type": "XSS"}],
            "responseCode": 406,
            "agentResponseCode": 406,
        });

        let mut buf = Vec::new();
        {
            let mut sink = CsvSink::new(&mut buf, RecordKind::Request);
            sink.write(&record).unwrap();
            sink.finish().unwrap();
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(buf.as_slice());
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[0], "2024-05-01T12:00:00Z");
        assert_eq!(&row[1], "req-1");
        assert_eq!(&row[2], "198.51.100.7");
        assert_eq!(&row[3], "NL");
        assert_eq!(&row[4], "/login, with comma");
        assert_eq!(&row[5], "SQLI|XSS");
        assert_eq!(&row[6], "406");
        assert_eq!(&row[7], "406");
    }

    #[test]
    fn event_rows_use_the_event_column_order() {
        let record = json!({
            "timestamp": "2024-05-01T12:00:00Z",
            "id": "evt-1",
            "source": "198.51.100.7",
            "remoteHostname": "bad.example",
            "remoteCountryCode": "NL",
            "action": "flagged",
            "type": "attack",
            "reasons": ["SQLI", "XSS"],
            "tagCount": 12,
            "window": 60,
            "detectedTimestamp": "2024-05-01T11:59:00Z",
            "expires": "2024-05-02T12:00:00Z",
        });

        let mut buf = Vec::new();
        {
            let mut sink = CsvSink::new(&mut buf, RecordKind::Event);
            sink.write(&record).unwrap();
            sink.finish().unwrap();
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(buf.as_slice());
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(row.len(), 12);
        assert_eq!(&row[2], "198.51.100.7");
        assert_eq!(&row[7], "SQLI|XSS");
        assert_eq!(&row[8], "12");
    }

    #[test]
    fn missing_fields_render_as_empty_cells() {
        let mut buf = Vec::new();
        {
            let mut sink = CsvSink::new(&mut buf, RecordKind::Request);
            sink.write(&json!({"id": "req-2"})).unwrap();
            sink.finish().unwrap();
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(buf.as_slice());
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[0], "");
        assert_eq!(&row[1], "req-2");
        assert_eq!(&row[5], "");
    }
}
