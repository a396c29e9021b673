// Parse worker pool
//
// Every non-unknown artifact file is parsed independently. A worker opens,
// drains and drops one file's stream at a time, so each handle is owned by
// exactly one worker and closed on every path. Outputs are merged in file-id
// order once all workers have joined.

use sperf_engine::FileSummary;
use sperf_parsers::{ParsedItem, ParserRegistry};
use sperf_types::{ArtifactFile, ArtifactKind, Bundle, ConfigEntry, ParseWarning, Record};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Everything parsed from a bundle
#[derive(Debug, Default)]
pub struct ParsedBundle {
    pub records: Vec<Record>,
    pub config: Vec<ConfigEntry>,
    pub warnings: Vec<ParseWarning>,
    pub files: Vec<FileSummary>,
}

/// Output of one file
#[derive(Debug)]
struct FileOutput {
    records: Vec<Record>,
    config: Vec<ConfigEntry>,
    warnings: Vec<ParseWarning>,
    summary: FileSummary,
}

pub fn worker_count(configured: usize, jobs: usize) -> usize {
    let n = match configured {
        0 => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
        n => n,
    };
    n.min(jobs).max(1)
}

pub fn parse_bundle(bundle: &Bundle, registry: &ParserRegistry, workers: usize) -> ParsedBundle {
    let jobs: Vec<&ArtifactFile> = bundle
        .files
        .iter()
        .filter(|f| f.kind != ArtifactKind::Unknown)
        .collect();
    if jobs.is_empty() {
        return ParsedBundle::default();
    }
    let workers = worker_count(workers, jobs.len());
    tracing::info!(files = jobs.len(), workers, "parsing artifacts");

    let next = AtomicUsize::new(0);
    let next = &next;
    let jobs = jobs.as_slice();

    let mut outputs: Vec<(usize, FileOutput)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut local = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(file) = jobs.get(index) else {
                            break;
                        };
                        local.push((index, parse_file(registry, file)));
                    }
                    local
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(local) => local,
                Err(_) => {
                    tracing::error!("parse worker terminated unexpectedly");
                    Vec::new()
                }
            })
            .collect()
    });
    outputs.sort_by_key(|(index, _)| *index);

    let mut parsed = ParsedBundle::default();
    for (_, output) in outputs {
        parsed.records.extend(output.records);
        parsed.config.extend(output.config);
        parsed.warnings.extend(output.warnings);
        parsed.files.push(output.summary);
    }
    tracing::info!(
        records = parsed.records.len(),
        config_entries = parsed.config.len(),
        warnings = parsed.warnings.len(),
        "parsing finished"
    );
    parsed
}

fn parse_file(registry: &ParserRegistry, file: &ArtifactFile) -> FileOutput {
    let mut output = FileOutput {
        records: Vec::new(),
        config: Vec::new(),
        warnings: Vec::new(),
        summary: FileSummary {
            file: file.id,
            node: file.node.clone(),
            path: file.relative_path.clone(),
            kind: file.kind,
            items: 0,
            warnings: 0,
            timestamp_format: None,
        },
    };

    let stream = registry.get(file.kind).and_then(|parser| parser.open(file));
    let mut stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(path = %file.path.display(), error = %err, "cannot open artifact");
            output.warnings.push(ParseWarning {
                file: file.id,
                node: file.node.clone(),
                path: file.path.clone(),
                line: 0,
                reason: format!("cannot open file: {}", err),
            });
            output.summary.warnings = 1;
            return output;
        }
    };

    for item in stream.by_ref() {
        match item {
            ParsedItem::Record(record) => output.records.push(record),
            ParsedItem::Config(entry) => output.config.push(entry),
            ParsedItem::Warning(warning) => {
                tracing::debug!(
                    path = %file.relative_path,
                    line = warning.line,
                    reason = %warning.reason,
                    "parse warning"
                );
                output.warnings.push(warning)
            }
        }
    }

    output.summary.items = output.records.len() + output.config.len();
    output.summary.warnings = output.warnings.len();
    output.summary.timestamp_format = stream.timestamp_format().map(|f| f.as_str().to_string());
    tracing::debug!(
        node = %file.node,
        path = %file.relative_path,
        items = output.summary.items,
        lines = stream.lines_read(),
        "parsed artifact"
    );
    output
}
