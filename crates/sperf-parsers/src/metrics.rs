// Metrics export parsing
//
// One sample per CSV row: timestamp,metric,value[,unit[,tags]]
// Tags are `k=v` pairs separated by `;`. A leading header row is skipped.
// Numbers are parsed with Rust's locale-independent float syntax only.

use crate::timestamp::{TimestampConfig, TimestampFormat, TimestampParser};
use crate::traits::{ArtifactParser, ItemSink, LineDecoder, ProbeResult, head_lines};
use sperf_types::{ArtifactKind, MetricSample, Record};
use std::collections::BTreeMap;

pub struct MetricsCsvParser {
    timestamps: TimestampConfig,
}

impl MetricsCsvParser {
    pub fn new(timestamps: TimestampConfig) -> Self {
        Self { timestamps }
    }
}

impl ArtifactParser for MetricsCsvParser {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Metrics
    }

    fn description(&self) -> &'static str {
        "Metrics export (CSV: timestamp,metric,value[,unit[,tags]])"
    }

    fn probe(&self, head: &str) -> ProbeResult {
        let Some(first) = head_lines(head).next() else {
            return ProbeResult::NoMatch;
        };
        if is_header(&split_row(first)) {
            return ProbeResult::match_high();
        }
        let mut timestamps = self.timestamps.parser();
        let fields = split_row(first);
        if fields.len() >= 3
            && timestamps.parse_exact(&fields[0]).is_some()
            && fields[2].trim().parse::<f64>().is_ok()
        {
            return ProbeResult::match_medium();
        }
        ProbeResult::NoMatch
    }

    fn decoder(&self) -> Box<dyn LineDecoder> {
        Box::new(MetricsDecoder {
            timestamps: self.timestamps.parser(),
            seen_data: false,
        })
    }
}

struct MetricsDecoder {
    timestamps: TimestampParser,
    seen_data: bool,
}

impl LineDecoder for MetricsDecoder {
    fn decode_line(&mut self, line: &str, line_no: u64, sink: &mut ItemSink) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return;
        }

        let fields = split_row(trimmed);
        if !self.seen_data && is_header(&fields) {
            self.seen_data = true;
            return;
        }
        self.seen_data = true;

        match self.decode_row(&fields, line_no, sink) {
            Ok(sample) => sink.record(Record::Metric(sample)),
            Err(reason) => sink.warn(line_no, reason),
        }
    }

    fn finish(&mut self, _sink: &mut ItemSink) {}

    fn timestamp_format(&self) -> Option<TimestampFormat> {
        self.timestamps.matched()
    }
}

impl MetricsDecoder {
    fn decode_row(
        &mut self,
        fields: &[String],
        line_no: u64,
        sink: &mut ItemSink,
    ) -> Result<MetricSample, String> {
        if fields.len() < 3 {
            return Err(format!("expected at least 3 fields, found {}", fields.len()));
        }

        let timestamp = self
            .timestamps
            .parse_exact(&fields[0])
            .ok_or_else(|| format!("unrecognized timestamp '{}'", fields[0].trim()))?;

        let name = fields[1].trim();
        if name.is_empty() {
            return Err("empty metric name".to_string());
        }

        let raw_value = fields[2].trim();
        let value: f64 = raw_value
            .parse()
            .map_err(|_| format!("invalid numeric value '{}'", raw_value))?;
        if !value.is_finite() {
            return Err(format!("non-finite value '{}'", raw_value));
        }

        let unit = fields
            .get(3)
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        let tags = match fields.get(4) {
            Some(raw) => parse_tags(raw)?,
            None => BTreeMap::new(),
        };

        Ok(MetricSample {
            id: sink.next_id(),
            node: sink.node().clone(),
            name: name.to_string(),
            timestamp,
            value,
            unit,
            tags,
            line: line_no,
        })
    }
}

/// Split one CSV row, honouring quotes
fn split_row(line: &str) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    match reader.records().next() {
        Some(Ok(record)) => record.iter().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn is_header(fields: &[String]) -> bool {
    fields
        .first()
        .is_some_and(|f| f.trim().eq_ignore_ascii_case("timestamp"))
}

fn parse_tags(raw: &str) -> Result<BTreeMap<String, String>, String> {
    let mut tags = BTreeMap::new();
    for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("malformed tag '{}'", pair))?;
        tags.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(tags)
}
