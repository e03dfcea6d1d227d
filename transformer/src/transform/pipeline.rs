//! Message dispatch and the line-oriented run loop.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use singer_transform::{run, MappingConfig, MemorySink, Processor};
//!
//! let config = MappingConfig::from_value(json!({
//!     "mappings": {
//!         "facilities": [{"stream": "location", "properties": {"name": {"type": "record", "key": "name"}}}]
//!     }
//! })).unwrap();
//!
//! let input = r#"{"type": "RECORD", "stream": "facilities", "record": {"name": "Foo"}}"#;
//! let mut sink = MemorySink::new();
//! let summary = run(&Processor::new(config), input.as_bytes(), &mut sink).unwrap();
//!
//! assert_eq!(summary.records_out, 1);
//! assert_eq!(sink.records[0].record, json!({"name": "Foo"}));
//! ```

use serde::Serialize;
use serde_json::Value;
use std::io::BufRead;
use tracing::{debug, error, info};

use crate::config::MappingConfig;
use crate::error::{MessageResult, PipelineResult};
use crate::message::{Message, Sink};
use crate::transform::expander::RecordExpander;

/// Dispatches decoded messages.
pub struct Processor {
    config: MappingConfig,
}

impl Processor {
    pub fn new(config: MappingConfig) -> Self {
        Self { config }
    }

    /// Handle one message. Returns the number of records written.
    pub fn process<S: Sink + ?Sized>(&self, message: Message, sink: &mut S) -> MessageResult<usize> {
        match message {
            Message::Schema { stream, .. } => {
                self.process_schema(&stream);
                Ok(0)
            }
            Message::Record { stream, record } => self.process_record(&stream, &record, sink),
            Message::State { value } => {
                sink.write_state(value)?;
                Ok(0)
            }
        }
    }

    /// Schemas are not converted; they are dropped.
    fn process_schema(&self, stream: &str) {
        let nested = self.config.nested_segments(stream);
        debug!(stream, nested = ?nested, "Dropping SCHEMA message");
    }

    fn process_record<S: Sink + ?Sized>(
        &self,
        stream: &str,
        record: &Value,
        sink: &mut S,
    ) -> MessageResult<usize> {
        let outputs = RecordExpander::new(&self.config).transform(stream, record);
        let count = outputs.len();
        debug!(stream, emitted = count, "Transformed record");

        for output in outputs {
            sink.write_record(&output.stream, output.record)?;
        }
        Ok(count)
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Lines read from the input
    pub lines: usize,
    /// RECORD messages received
    pub records_in: usize,
    /// Records written
    pub records_out: usize,
    /// STATE messages passed through
    pub states: usize,
    /// Lines that could not be decoded
    pub invalid: usize,
}

impl RunSummary {
    /// Get summary statistics
    pub fn summary(&self) -> String {
        format!(
            "Read {} lines: {} records in, {} records out, {} states, {} invalid",
            self.lines, self.records_in, self.records_out, self.states, self.invalid
        )
    }
}

/// Read messages line by line from `input` until EOF, writing results to `sink`.
///
/// Undecodable lines, including invalid UTF-8, are logged and skipped. Read and
/// write failures end the run.
pub fn run<R: BufRead, S: Sink + ?Sized>(
    processor: &Processor,
    input: R,
    sink: &mut S,
) -> PipelineResult<RunSummary> {
    let mut summary = RunSummary::default();

    for line in input.split(b'\n') {
        let line = line?;
        summary.lines += 1;

        let line = match String::from_utf8(line) {
            Ok(line) => line,
            Err(e) => {
                error!(line = summary.lines, error = %e, "Skipping line that is not UTF-8");
                summary.invalid += 1;
                continue;
            }
        };

        let message = match Message::from_line(&line) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(e) => {
                error!(line = summary.lines, error = %e, "Skipping undecodable line");
                summary.invalid += 1;
                continue;
            }
        };

        match &message {
            Message::Record { .. } => summary.records_in += 1,
            Message::State { .. } => summary.states += 1,
            Message::Schema { .. } => {}
        }

        summary.records_out += processor.process(message, sink)?;
    }

    sink.flush()?;
    info!("{}", summary.summary());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{JsonLinesSink, MemorySink};
    use serde_json::json;

    fn processor() -> Processor {
        Processor::new(
            MappingConfig::from_value(json!({
                "mappings": {
                    "facilities": [{"stream": "location", "properties": {"name": {"type": "record", "key": "name"}}}],
                    "facilities.children": [{"stream": "person", "properties": {"name": {"type": "record", "key": "name"}}}]
                }
            }))
            .unwrap(),
        )
    }

    #[test]
    fn test_process_record() {
        let mut sink = MemorySink::new();
        let message = Message::Record {
            stream: "facilities".into(),
            record: json!({"name": "Foo", "children": [{"name": "Joe"}]}),
        };

        let written = processor().process(message, &mut sink).unwrap();
        assert_eq!(written, 2);
        assert_eq!(sink.records[0].stream, "location");
        assert_eq!(sink.records[1].stream, "person");
        assert_eq!(sink.records[1].record, json!({"name": "Joe"}));
    }

    #[test]
    fn test_state_passthrough_and_schema_dropped() {
        let mut sink = MemorySink::new();
        let p = processor();
        p.process(Message::State { value: json!({"bookmarks": {"a": 1}}) }, &mut sink).unwrap();
        p.process(
            Message::Schema { stream: "facilities".into(), schema: json!({}), key_properties: vec![] },
            &mut sink,
        )
        .unwrap();

        assert_eq!(sink.states, vec![json!({"bookmarks": {"a": 1}})]);
        assert!(sink.records.is_empty());
    }

    #[test]
    fn test_run_skips_bad_lines() {
        let input = [
            r#"{"type": "SCHEMA", "stream": "facilities", "schema": {}}"#,
            "this is not json",
            "",
            r#"{"type": "RECORD", "stream": "facilities", "record": {"name": "A"}}"#,
            r#"{"no_type": true}"#,
            r#"{"type": "STATE", "value": {"n": 1}}"#,
            r#"{"type": "RECORD", "stream": "facilities", "record": {"name": "B"}}"#,
        ]
        .join("\n");

        let mut sink = MemorySink::new();
        let summary = run(&processor(), input.as_bytes(), &mut sink).unwrap();

        assert_eq!(
            summary,
            RunSummary { lines: 7, records_in: 2, records_out: 2, states: 1, invalid: 2 }
        );
        let names: Vec<&Value> = sink.records.iter().map(|r| &r.record["name"]).collect();
        assert_eq!(names, vec![&json!("A"), &json!("B")]);
    }

    #[test]
    fn test_run_skips_non_utf8_line() {
        let mut input = Vec::new();
        input.extend_from_slice(br#"{"type": "RECORD", "stream": "facilities", "record": {"name": "A"}}"#);
        input.extend_from_slice(b"\n\xff\xfe garbage\r\n");
        input.extend_from_slice(br#"{"type": "RECORD", "stream": "facilities", "record": {"name": "B"}}"#);

        let mut sink = MemorySink::new();
        let summary = run(&processor(), input.as_slice(), &mut sink).unwrap();

        assert_eq!(summary.lines, 3);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.records_out, 2);
        assert_eq!(sink.records[1].record, json!({"name": "B"}));
    }

    #[test]
    fn test_run_preserves_order_with_state() {
        let input = [
            r#"{"type": "RECORD", "stream": "facilities", "record": {"name": "A"}}"#,
            r#"{"type": "STATE", "value": 1}"#,
            r#"{"type": "RECORD", "stream": "facilities", "record": {"name": "B"}}"#,
        ]
        .join("\n");

        let mut sink = JsonLinesSink::new(Vec::new());
        run(&processor(), input.as_bytes(), &mut sink).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let types: Vec<String> = output
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(types, vec!["RECORD", "STATE", "RECORD"]);
    }
}
