// THEORY:
// The output contract of the engine: one record per tick, one line per record.
//
// JSON (default), stable field names, absent circle is `null`:
//   {"tick":42,"circle":{"x":160.5,"y":120.5,"radius":31.0}}
//   {"tick":43,"circle":null}
//
// Text, a bracketed vector for humans and shell pipes:
//   [160.5 120.5 31]
//   []
//
// Ticks without a selection are only written when `emit_empty` is set;
// otherwise they produce no line at all.

use crate::config::{OutputConfig, OutputFormat};
use crate::core_modules::selector::Selection;
use serde::Serialize;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Circle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionRecord {
    /// Zero-based tick counter since the scheduler started.
    pub tick: u64,
    pub circle: Option<Circle>,
}

impl DetectionRecord {
    pub fn new(tick: u64, selection: Selection) -> Self {
        Self {
            tick,
            circle: selection.map(|c| Circle {
                x: c.x,
                y: c.y,
                radius: c.radius,
            }),
        }
    }
}

/// Writes detection records to any `Write` sink, flushing after each line.
pub struct Emitter<W: Write> {
    writer: W,
    format: OutputFormat,
    emit_empty: bool,
}

impl<W: Write> Emitter<W> {
    pub fn new(writer: W, config: &OutputConfig) -> Self {
        Self {
            writer,
            format: config.format,
            emit_empty: config.emit_empty,
        }
    }

    /// Writes `record` unless it is empty and empty records are suppressed.
    /// Returns whether a line was written.
    pub fn emit(&mut self, record: &DetectionRecord) -> io::Result<bool> {
        if record.circle.is_none() && !self.emit_empty {
            return Ok(false);
        }
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.writer, record)?;
                self.writer.write_all(b"\n")?;
            }
            OutputFormat::Text => match record.circle {
                Some(c) => writeln!(self.writer, "[{} {} {}]", c.x, c.y, c.radius)?,
                None => writeln!(self.writer, "[]")?,
            },
        }
        self.writer.flush()?;
        Ok(true)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::shape_detector::Candidate;

    fn emit_all(config: OutputConfig, records: &[DetectionRecord]) -> String {
        let mut emitter = Emitter::new(Vec::new(), &config);
        for record in records {
            emitter.emit(record).expect("write to vec");
        }
        String::from_utf8(emitter.into_inner()).expect("utf8")
    }

    #[test]
    fn json_lines_with_null_for_absent_circle() {
        let config = OutputConfig {
            format: OutputFormat::Json,
            emit_empty: true,
        };
        let records = [
            DetectionRecord::new(0, Some(Candidate::new(20.0, 20.0, 12.0))),
            DetectionRecord::new(1, None),
        ];
        assert_eq!(
            emit_all(config, &records),
            "{\"tick\":0,\"circle\":{\"x\":20.0,\"y\":20.0,\"radius\":12.0}}\n{\"tick\":1,\"circle\":null}\n"
        );
    }

    #[test]
    fn empty_ticks_are_silent_by_default() {
        let records = [DetectionRecord::new(7, None)];
        assert_eq!(emit_all(OutputConfig::default(), &records), "");

        let mut emitter = Emitter::new(Vec::new(), &OutputConfig::default());
        assert!(!emitter.emit(&records[0]).expect("write"));
    }

    #[test]
    fn text_format_prints_a_vector() {
        let config = OutputConfig {
            format: OutputFormat::Text,
            emit_empty: true,
        };
        let records = [
            DetectionRecord::new(0, Some(Candidate::new(160.5, 120.5, 31.0))),
            DetectionRecord::new(1, None),
        ];
        assert_eq!(emit_all(config, &records), "[160.5 120.5 31]\n[]\n");
    }
}
