// Cassandra/DSE log parsing (system.log, debug.log, output.log)
//
// Record header layout (logback pattern used by Cassandra and DSE):
//   LEVEL [thread] TIMESTAMP Source.java:LINE - message
// Anything that does not start with a level keyword continues the previous
// record (stack traces, multi-line StatusLogger output).
//
// output.log also yields `jar.<name>` config entries from the startup
// classpath, so jar versions are compared across nodes like any setting.

pub mod fields;

use crate::timestamp::{TimestampConfig, TimestampFormat, TimestampParser};
use crate::traits::{ArtifactParser, ItemSink, LineDecoder, ProbeResult, head_lines};
use once_cell::sync::Lazy;
use regex::Regex;
use sperf_types::{ArtifactKind, LogEvent, LogLevel, Record};
use std::path::Path;

static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(TRACE|DEBUG|INFO|WARN|WARNING|ERROR|FATAL)\s+\[([^\]]*)\]\s+(.*)$")
        .expect("valid log header regex")
});

static SOURCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<source>[\w$.]+?)(?::(?P<line>\d+))?\s+-\s?(?P<message>.*)$")
        .expect("valid log source regex")
});

pub struct SystemLogParser {
    timestamps: TimestampConfig,
}

impl SystemLogParser {
    pub fn new(timestamps: TimestampConfig) -> Self {
        Self { timestamps }
    }
}

impl ArtifactParser for SystemLogParser {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Log
    }

    fn description(&self) -> &'static str {
        "Cassandra/DSE logback logs (system.log, debug.log, output.log)"
    }

    fn probe(&self, head: &str) -> ProbeResult {
        let mut timestamps = self.timestamps.parser();
        for line in head_lines(head).take(20) {
            if let Some(caps) = HEADER.captures(line)
                && timestamps.parse_prefix(caps[3].trim_start()).is_some()
            {
                return ProbeResult::match_high();
            }
        }
        ProbeResult::NoMatch
    }

    fn decoder(&self) -> Box<dyn LineDecoder> {
        Box::new(LogDecoder {
            timestamps: self.timestamps.parser(),
            pending: None,
            skipping: false,
        })
    }
}

/// Header parsed but not yet emitted (continuations may follow)
struct PendingEvent {
    line: u64,
    level: LogLevel,
    thread: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    component: String,
    message: String,
    detail: Vec<String>,
}

struct LogDecoder {
    timestamps: TimestampParser,
    pending: Option<PendingEvent>,
    /// Set after a malformed header so its continuation lines are dropped silently
    skipping: bool,
}

impl LogDecoder {
    fn flush(&mut self, sink: &mut ItemSink) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let fields = fields::extract(&pending.component, &pending.message, &pending.detail);
        let jars = if is_output_log(sink.path()) {
            fields::classpath_jars(&pending.message)
        } else {
            Vec::new()
        };
        let line = pending.line;
        let event = LogEvent {
            id: sink.next_id(),
            node: sink.node().clone(),
            timestamp: pending.timestamp,
            level: pending.level,
            thread: pending.thread,
            component: pending.component,
            message: pending.message,
            detail: pending.detail,
            fields,
            line: pending.line,
        };
        sink.record(Record::Log(event));
        for (name, version) in jars {
            sink.config(format!("jar.{}", name), version, line);
        }
    }

    fn parse_header(&mut self, caps: &regex::Captures<'_>, line_no: u64) -> Result<PendingEvent, String> {
        let level: LogLevel = caps[1].parse().map_err(|e: sperf_types::Error| e.to_string())?;
        let thread = caps[2].trim().to_string();
        let rest = caps[3].trim_start();
        let (timestamp, rest) = self
            .timestamps
            .parse_prefix(rest)
            .ok_or_else(|| format!("unrecognized timestamp in '{}'", sperf_types::truncate(rest, 40)))?;

        let (component, message) = match SOURCE.captures(rest) {
            Some(src) => (component_name(&src["source"]), src["message"].to_string()),
            None => (String::new(), rest.trim().to_string()),
        };

        Ok(PendingEvent {
            line: line_no,
            level,
            thread,
            timestamp,
            component,
            message,
            detail: Vec::new(),
        })
    }
}

impl LineDecoder for LogDecoder {
    fn decode_line(&mut self, line: &str, line_no: u64, sink: &mut ItemSink) {
        if line.trim().is_empty() {
            return;
        }

        if let Some(caps) = HEADER.captures(line) {
            self.flush(sink);
            match self.parse_header(&caps, line_no) {
                Ok(event) => {
                    self.pending = Some(event);
                    self.skipping = false;
                }
                Err(reason) => {
                    sink.warn(line_no, reason);
                    self.skipping = true;
                }
            }
            return;
        }

        match self.pending.as_mut() {
            Some(pending) => pending.detail.push(line.trim_end().to_string()),
            None if self.skipping => {}
            None => sink.warn(line_no, "continuation line without a preceding log record"),
        }
    }

    fn finish(&mut self, sink: &mut ItemSink) {
        self.flush(sink);
    }

    fn timestamp_format(&self) -> Option<TimestampFormat> {
        self.timestamps.matched()
    }
}

/// `output.log`, including rotations such as `output.log.1`
fn is_output_log(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("output.log"))
}

/// `GCInspector.java` -> `GCInspector`, `o.a.c.db.Memtable` -> `Memtable`
fn component_name(source: &str) -> String {
    let source = source
        .strip_suffix(".java")
        .or_else(|| source.strip_suffix(".scala"))
        .unwrap_or(source);
    source.rsplit('.').next().unwrap_or(source).to_string()
}
