//! Singer messages and output sinks.
//!
//! Messages are newline-delimited JSON objects tagged by `type`:
//!
//! ```text
//! {"type": "SCHEMA", "stream": "facilities", "schema": {...}, "key_properties": ["id"]}
//! {"type": "RECORD", "stream": "facilities", "record": {...}}
//! {"type": "STATE", "value": {...}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use tracing::debug;

use crate::error::{MessageError, MessageResult};

/// A Singer message understood by the transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Message {
    Schema {
        stream: String,
        #[serde(default)]
        schema: Value,
        #[serde(default)]
        key_properties: Vec<String>,
    },
    Record {
        stream: String,
        record: Value,
    },
    State {
        value: Value,
    },
}

impl Message {
    /// Decode one input line.
    ///
    /// Blank lines and message types other than SCHEMA/RECORD/STATE give `Ok(None)`.
    pub fn from_line(line: &str) -> MessageResult<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(line)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| MessageError::InvalidEnvelope("missing string 'type'".to_string()))?;

        match kind {
            "SCHEMA" | "RECORD" | "STATE" => Ok(Some(serde_json::from_value(value)?)),
            other => {
                debug!(message_type = other, "Skipping unsupported message type");
                Ok(None)
            }
        }
    }
}

/// A transformed record ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    pub stream: String,
    pub record: Value,
}

impl OutputRecord {
    pub fn new(stream: impl Into<String>, record: Value) -> Self {
        Self {
            stream: stream.into(),
            record,
        }
    }
}

/// Destination for transformed records and passed-through state.
pub trait Sink {
    fn write_record(&mut self, stream: &str, record: Value) -> MessageResult<()>;

    fn write_state(&mut self, value: Value) -> MessageResult<()>;

    fn flush(&mut self) -> MessageResult<()> {
        Ok(())
    }
}

/// Writes one JSON message per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_message(&mut self, message: &Message) -> MessageResult<()> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write> Sink for JsonLinesSink<W> {
    fn write_record(&mut self, stream: &str, record: Value) -> MessageResult<()> {
        self.write_message(&Message::Record {
            stream: stream.to_string(),
            record,
        })
    }

    fn write_state(&mut self, value: Value) -> MessageResult<()> {
        self.write_message(&Message::State { value })?;
        // Targets checkpoint on STATE, so everything before it must be out
        self.flush()
    }

    fn flush(&mut self) -> MessageResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects output in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<OutputRecord>,
    pub states: Vec<Value>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for MemorySink {
    fn write_record(&mut self, stream: &str, record: Value) -> MessageResult<()> {
        self.records.push(OutputRecord::new(stream, record));
        Ok(())
    }

    fn write_state(&mut self, value: Value) -> MessageResult<()> {
        self.states.push(value);
        Ok(())
    }
}
