// iostat capture parsing (`iostat -x -c -d -t <interval>`)
//
// Each block is a sample time, an avg-cpu table and a Device table, separated
// by blank lines. Samples are named `cpu.<column>` and `disk.<device>.<column>`.

use crate::timestamp::{TimestampConfig, TimestampFormat, TimestampParser};
use crate::traits::{ArtifactParser, ItemSink, LineDecoder, ProbeResult, head_lines};
use chrono::{DateTime, Utc};
use sperf_types::{ArtifactKind, MetricSample, Record};
use std::collections::BTreeMap;

pub struct IostatParser {
    timestamps: TimestampConfig,
}

impl IostatParser {
    pub fn new(timestamps: TimestampConfig) -> Self {
        Self { timestamps }
    }
}

impl ArtifactParser for IostatParser {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Iostat
    }

    fn description(&self) -> &'static str {
        "iostat captures (avg-cpu and extended device statistics)"
    }

    fn probe(&self, head: &str) -> ProbeResult {
        for line in head_lines(head).take(10) {
            let trimmed = line.trim_start();
            if trimmed.starts_with("avg-cpu:") {
                return ProbeResult::match_high();
            }
            if trimmed.starts_with("Linux ") && trimmed.contains("CPU)") {
                return ProbeResult::match_medium();
            }
        }
        ProbeResult::NoMatch
    }

    fn decoder(&self) -> Box<dyn LineDecoder> {
        Box::new(IostatDecoder {
            timestamps: self.timestamps.parser(),
            sampled_at: None,
            state: State::Idle,
        })
    }
}

enum State {
    Idle,
    Cpu(Vec<String>),
    Device(Vec<String>),
}

struct IostatDecoder {
    timestamps: TimestampParser,
    sampled_at: Option<DateTime<Utc>>,
    state: State,
}

impl IostatDecoder {
    fn parse_date(&mut self, line: &str) -> Option<DateTime<Utc>> {
        let at = self.timestamps.parse_iostat(line);
        at.or_else(|| self.timestamps.parse_exact(line))
    }

    fn emit_row(
        &self,
        prefix: &str,
        columns: &[String],
        values: &[&str],
        line_no: u64,
        sink: &mut ItemSink,
    ) -> Result<(), String> {
        let at = self
            .sampled_at
            .ok_or_else(|| "statistics row before any sample time".to_string())?;
        if values.len() != columns.len() {
            return Err(format!(
                "expected {} columns, found {}",
                columns.len(),
                values.len()
            ));
        }

        // Parse the whole row first so a bad value never leaves half a row behind
        let mut parsed = Vec::with_capacity(values.len());
        for (column, raw) in columns.iter().zip(values) {
            // iostat prints numbers in the collecting host's locale
            let normalized = raw.replacen(',', ".", 1);
            let value: f64 = normalized
                .parse()
                .map_err(|_| format!("invalid value '{}' for column {}", raw, column))?;
            parsed.push((column, value));
        }

        for (column, value) in parsed {
            let sample = MetricSample {
                id: sink.next_id(),
                node: sink.node().clone(),
                name: format!("{}.{}", prefix, column),
                timestamp: at,
                value,
                unit: None,
                tags: BTreeMap::new(),
                line: line_no,
            };
            sink.record(Record::Metric(sample));
        }
        Ok(())
    }
}

impl LineDecoder for IostatDecoder {
    fn decode_line(&mut self, line: &str, line_no: u64, sink: &mut ItemSink) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            self.state = State::Idle;
            return;
        }

        if let Some(header) = trimmed.strip_prefix("avg-cpu:") {
            self.state = State::Cpu(header.split_whitespace().map(str::to_string).collect());
            return;
        }
        if trimmed.starts_with("Device") {
            let columns = trimmed.split_whitespace().skip(1).map(str::to_string).collect();
            self.state = State::Device(columns);
            return;
        }

        let result = match &self.state {
            State::Cpu(columns) => {
                let values: Vec<&str> = trimmed.split_whitespace().collect();
                let result = self.emit_row("cpu", columns, &values, line_no, sink);
                self.state = State::Idle;
                result
            }
            State::Device(columns) => {
                let mut parts = trimmed.split_whitespace();
                let device = parts.next().unwrap_or_default().to_string();
                let values: Vec<&str> = parts.collect();
                self.emit_row(&format!("disk.{}", device), columns, &values, line_no, sink)
            }
            State::Idle => {
                if trimmed.starts_with("Linux ") {
                    Ok(())
                } else {
                    match self.parse_date(trimmed) {
                        Some(at) => {
                            self.sampled_at = Some(at);
                            Ok(())
                        }
                        None => Err(format!(
                            "unrecognized iostat line '{}'",
                            sperf_types::truncate(trimmed, 40)
                        )),
                    }
                }
            }
        };

        if let Err(reason) = result {
            sink.warn(line_no, reason);
        }
    }

    fn finish(&mut self, _sink: &mut ItemSink) {}

    fn timestamp_format(&self) -> Option<TimestampFormat> {
        self.timestamps.matched()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::test_support::{parse_str, records, stream_str, warnings};
    use chrono::TimeZone;

    const SAMPLE: &str = "\
Linux 5.15.0-91-generic (cass-1) \t03/01/2024 \t_x86_64_\t(8 CPU)

03/01/2024 10:00:00 AM
avg-cpu:  %user   %nice %system %iowait  %steal   %idle
          40.00    0.00   15.00    7,50    0.00   37.50

Device            r/s     w/s  aqu-sz  %util
sda              1.00    2.00    1.20   10.00
sdb              0.00    0.00    0.00    0.00

03/01/2024 10:00:05 AM
avg-cpu:  %user   %nice %system %iowait  %steal   %idle
          10.00    0.00    5.00    1.00    0.00   84.00

Device            r/s     w/s  aqu-sz  %util
sda              1.00    2.00    0.10    1.00
";

    #[test]
    fn test_parses_blocks_into_samples() {
        let items = parse_str(&IostatParser::new(TimestampConfig::default()), SAMPLE);
        assert!(warnings(&items).is_empty(), "{:?}", warnings(&items));
        let recs = records(&items);
        // 6 cpu + 2 devices * 4 columns, then 6 cpu + 1 device * 4
        assert_eq!(recs.len(), 14 + 10);

        let iowait = recs[3].as_metric().unwrap();
        assert_eq!(iowait.name, "cpu.%iowait");
        assert_eq!(iowait.value, 7.5);
        assert_eq!(
            iowait.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );

        let queue = recs
            .iter()
            .filter_map(|r| r.as_metric())
            .find(|m| m.name == "disk.sda.aqu-sz")
            .unwrap();
        assert_eq!(queue.value, 1.2);

        let last = recs.last().unwrap().as_metric().unwrap();
        assert_eq!(
            last.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 5).unwrap()
        );
    }

    #[test]
    fn test_locale_date_locks_file_format() {
        let parser = IostatParser::new(TimestampConfig::default());
        let mut stream = stream_str(&parser, SAMPLE);
        assert!(stream.timestamp_format().is_none());
        let items: Vec<_> = stream.by_ref().collect();
        assert!(warnings(&items).is_empty());
        assert_eq!(stream.timestamp_format(), Some(TimestampFormat::IostatLocale));
    }

    #[test]
    fn test_iso_sample_times_lock_iso() {
        let content = "2024-03-01T10:00:00+0000\navg-cpu:  %user\n          1.0\n";
        let parser = IostatParser::new(TimestampConfig::default());
        let mut stream = stream_str(&parser, content);
        let items: Vec<_> = stream.by_ref().collect();
        assert_eq!(records(&items).len(), 1);
        assert_eq!(stream.timestamp_format(), Some(TimestampFormat::Iso8601));
    }

    #[test]
    fn test_bad_row_is_skipped_whole() {
        let content = "\
03/01/2024 10:00:00 AM
Device            r/s     w/s
sda              1.00    abc
sdb              1.00    2.00
";
        let items = parse_str(&IostatParser::new(TimestampConfig::default()), content);
        assert_eq!(warnings(&items).len(), 1);
        let names: Vec<_> = records(&items)
            .iter()
            .map(|r| r.as_metric().unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["disk.sdb.r/s", "disk.sdb.w/s"]);
    }

    #[test]
    fn test_rows_before_time_are_warnings() {
        let content = "avg-cpu:  %user\n          1.0\n";
        let items = parse_str(&IostatParser::new(TimestampConfig::default()), content);
        assert_eq!(warnings(&items).len(), 1);
        assert!(records(&items).is_empty());
    }
}
