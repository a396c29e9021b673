use crate::Result;
use crate::timestamp::TimestampFormat;
use sperf_types::{
    ArtifactFile, ArtifactKind, ConfigEntry, FileId, NodeId, ParseWarning, Record, RecordId,
};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Artifact parsing
///
/// Responsibilities:
/// - Recognize file content when the filename alone is ambiguous
/// - Turn one artifact file into a lazy stream of typed records
/// - Keep going after malformed records (they become warnings)
pub trait ArtifactParser: Send + Sync {
    /// Artifact kind this parser handles
    fn kind(&self) -> ArtifactKind;

    /// Short human-readable description
    fn description(&self) -> &'static str;

    /// Inspect the first bytes of a file and report how likely it is this kind
    fn probe(&self, head: &str) -> ProbeResult;

    /// Fresh per-file decoder state
    fn decoder(&self) -> Box<dyn LineDecoder>;

    /// Open a file as a record stream.
    ///
    /// Streams are restartable: every call opens the file again and starts
    /// from a clean decoder, without side effects on the parser.
    fn open(&self, file: &ArtifactFile) -> Result<RecordStream> {
        let handle = File::open(&file.path)?;
        Ok(RecordStream::new(
            Box::new(BufReader::new(handle)),
            self.decoder(),
            file,
        ))
    }
}

/// Line-oriented decoding state for one file.
///
/// The stream feeds physical lines in order; decoders emit records through the sink,
/// possibly delayed (multi-line log records are emitted when the next header arrives).
pub trait LineDecoder: Send {
    fn decode_line(&mut self, line: &str, line_no: u64, sink: &mut ItemSink);

    /// Called once at end of input to flush buffered state
    fn finish(&mut self, sink: &mut ItemSink);

    /// Timestamp format locked for this file, once known
    fn timestamp_format(&self) -> Option<TimestampFormat> {
        None
    }
}

/// One item produced by a record stream
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedItem {
    Record(Record),
    Config(ConfigEntry),
    Warning(ParseWarning),
}

/// Output buffer handed to decoders. Allocates record ids in emission order.
#[derive(Debug)]
pub struct ItemSink {
    file: FileId,
    node: NodeId,
    path: PathBuf,
    next_seq: u32,
    pending: VecDeque<ParsedItem>,
}

impl ItemSink {
    fn new(file: &ArtifactFile) -> Self {
        Self {
            file: file.id,
            node: file.node.clone(),
            path: file.path.clone(),
            next_seq: 0,
            pending: VecDeque::new(),
        }
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reserve the id for the next record
    pub fn next_id(&mut self) -> RecordId {
        let id = RecordId::new(self.file, self.next_seq);
        self.next_seq += 1;
        id
    }

    pub fn record(&mut self, record: Record) {
        self.pending.push_back(ParsedItem::Record(record));
    }

    pub fn config(&mut self, key: impl Into<String>, value: impl Into<String>, line: u64) {
        self.pending.push_back(ParsedItem::Config(ConfigEntry {
            node: self.node.clone(),
            file: self.file,
            key: key.into(),
            value: value.into(),
            line,
        }));
    }

    pub fn warn(&mut self, line: u64, reason: impl Into<String>) {
        self.pending.push_back(ParsedItem::Warning(ParseWarning {
            file: self.file,
            node: self.node.clone(),
            path: self.path.clone(),
            line,
            reason: reason.into(),
        }));
    }
}

/// Lazy, finite stream of parsed items for one file.
///
/// Owns the file handle; it is closed when the stream is dropped.
pub struct RecordStream {
    reader: Box<dyn BufRead + Send>,
    decoder: Box<dyn LineDecoder>,
    sink: ItemSink,
    buf: Vec<u8>,
    line_no: u64,
    done: bool,
}

impl RecordStream {
    pub fn new(
        reader: Box<dyn BufRead + Send>,
        decoder: Box<dyn LineDecoder>,
        file: &ArtifactFile,
    ) -> Self {
        Self {
            reader,
            decoder,
            sink: ItemSink::new(file),
            buf: Vec::with_capacity(256),
            line_no: 0,
            done: false,
        }
    }

    /// Timestamp format the decoder locked for this file
    pub fn timestamp_format(&self) -> Option<TimestampFormat> {
        self.decoder.timestamp_format()
    }

    /// Number of physical lines consumed so far
    pub fn lines_read(&self) -> u64 {
        self.line_no
    }
}

impl Iterator for RecordStream {
    type Item = ParsedItem;

    fn next(&mut self) -> Option<ParsedItem> {
        loop {
            if let Some(item) = self.sink.pending.pop_front() {
                return Some(item);
            }
            if self.done {
                return None;
            }

            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.decoder.finish(&mut self.sink);
                    self.done = true;
                }
                Ok(_) => {
                    self.line_no += 1;
                    while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
                        self.buf.pop();
                    }
                    match std::str::from_utf8(&self.buf) {
                        Ok(line) => self.decoder.decode_line(line, self.line_no, &mut self.sink),
                        Err(_) => self.sink.warn(self.line_no, "line is not valid UTF-8"),
                    }
                }
                Err(err) => {
                    // Truncated or unreadable tail: keep what was parsed so far
                    self.sink
                        .warn(self.line_no + 1, format!("read failed: {}", err));
                    self.decoder.finish(&mut self.sink);
                    self.done = true;
                }
            }
        }
    }
}

// --- Helper types ---

/// Probe result with confidence score
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeResult {
    /// Parser can handle this content with given confidence (0.0 - 1.0)
    Confidence(f32),
    /// Parser cannot handle this content
    NoMatch,
}

impl ProbeResult {
    /// Create high confidence match (1.0)
    pub fn match_high() -> Self {
        ProbeResult::Confidence(1.0)
    }

    /// Create medium confidence match (0.5)
    pub fn match_medium() -> Self {
        ProbeResult::Confidence(0.5)
    }

    /// Create low confidence match (0.3)
    pub fn match_low() -> Self {
        ProbeResult::Confidence(0.3)
    }

    /// Check if this is a match (confidence > 0)
    pub fn is_match(&self) -> bool {
        matches!(self, ProbeResult::Confidence(c) if *c > 0.0)
    }

    /// Get confidence score (0.0 if NoMatch)
    pub fn confidence(&self) -> f32 {
        match self {
            ProbeResult::Confidence(c) => *c,
            ProbeResult::NoMatch => 0.0,
        }
    }
}

/// Iterate the non-blank, non-comment lines of a probe head
pub(crate) fn head_lines(head: &str) -> impl Iterator<Item = &str> {
    head.lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::io::Cursor;

    pub fn artifact(kind: ArtifactKind) -> ArtifactFile {
        ArtifactFile {
            id: FileId(0),
            node: NodeId::from("10.0.0.1"),
            kind,
            path: PathBuf::from("/bundle/10.0.0.1/artifact"),
            relative_path: "artifact".to_string(),
        }
    }

    /// Run a decoder over in-memory content
    pub fn parse_str(parser: &dyn ArtifactParser, content: &str) -> Vec<ParsedItem> {
        stream_str(parser, content).collect()
    }

    pub fn stream_str(parser: &dyn ArtifactParser, content: &str) -> RecordStream {
        let file = artifact(parser.kind());
        RecordStream::new(
            Box::new(Cursor::new(content.as_bytes().to_vec())),
            parser.decoder(),
            &file,
        )
    }

    pub fn warnings(items: &[ParsedItem]) -> Vec<&ParseWarning> {
        items
            .iter()
            .filter_map(|i| match i {
                ParsedItem::Warning(w) => Some(w),
                _ => None,
            })
            .collect()
    }

    pub fn records(items: &[ParsedItem]) -> Vec<&Record> {
        items
            .iter()
            .filter_map(|i| match i {
                ParsedItem::Record(r) => Some(r),
                _ => None,
            })
            .collect()
    }
}
