// Configuration dump parsing
//
// Handles the three shapes found in diagnostic bundles:
// - cassandra.yaml / dse.yaml: full YAML via serde_yaml, nesting flattened to dotted keys
// - jvm.options: one JVM flag per line
// - *.properties: key=value

use crate::traits::{ArtifactParser, ItemSink, LineDecoder, ProbeResult, RecordStream, head_lines};
use serde::Deserialize;
use serde_yaml::Value;
use sperf_types::{ArtifactFile, ArtifactKind};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub struct ConfigDumpParser;

impl ArtifactParser for ConfigDumpParser {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Config
    }

    fn description(&self) -> &'static str {
        "Configuration dumps (cassandra.yaml, jvm.options, *.properties)"
    }

    fn probe(&self, head: &str) -> ProbeResult {
        let mut seen = 0;
        let mut matched = 0;
        for line in head_lines(head).take(10) {
            seen += 1;
            let trimmed = line.trim();
            let item = trimmed.strip_prefix("- ").unwrap_or(trimmed);
            if is_jvm_option(trimmed)
                || split_yaml(item).is_some()
                || split_property(trimmed).is_some()
                || trimmed.starts_with("- ")
            {
                matched += 1;
            }
        }
        if seen > 0 && matched == seen {
            ProbeResult::match_low()
        } else {
            ProbeResult::NoMatch
        }
    }

    fn decoder(&self) -> Box<dyn LineDecoder> {
        Box::new(ConfigDecoder::default())
    }

    fn open(&self, file: &ArtifactFile) -> crate::Result<RecordStream> {
        let handle = File::open(&file.path)?;
        Ok(RecordStream::new(
            Box::new(BufReader::new(handle)),
            Box::new(ConfigDecoder::for_path(&file.path)),
            file,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    /// Whole-file YAML document(s)
    Yaml,
    /// jvm.options and *.properties: one entry per line
    Lines,
}

#[derive(Default)]
struct ConfigDecoder {
    /// Unknown until the extension or the first meaningful line decides
    dialect: Option<Dialect>,
    /// Buffered YAML text, parsed as a whole on finish
    yaml: String,
    lines: Vec<String>,
}

impl ConfigDecoder {
    fn for_path(path: &Path) -> Self {
        let dialect = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Some(Dialect::Yaml),
            Some("options" | "properties") => Some(Dialect::Lines),
            _ => None,
        };
        Self {
            dialect,
            ..Self::default()
        }
    }

    fn detect(trimmed: &str) -> Dialect {
        if is_jvm_option(trimmed) && !trimmed.starts_with("- ") {
            return Dialect::Lines;
        }
        if split_yaml(trimmed).is_none() && split_property(trimmed).is_some() {
            return Dialect::Lines;
        }
        Dialect::Yaml
    }

    fn decode_entry(trimmed: &str, line_no: u64, sink: &mut ItemSink) {
        if is_jvm_option(trimmed) {
            let (key, value) = split_jvm_option(trimmed);
            sink.config(key, value, line_no);
            return;
        }
        if let Some((key, value)) = split_property(trimmed) {
            sink.config(key, value, line_no);
            return;
        }
        sink.warn(
            line_no,
            format!(
                "unrecognized configuration line '{}'",
                sperf_types::truncate(trimmed, 40)
            ),
        );
    }

    fn decode_yaml(&self, sink: &mut ItemSink) {
        let mut locator = LineLocator::new(&self.lines);
        for document in serde_yaml::Deserializer::from_str(&self.yaml) {
            let value = match Value::deserialize(document) {
                Ok(value) => value,
                Err(err) => {
                    let line = err.location().map(|l| l.line() as u64).unwrap_or(0);
                    sink.warn(line, format!("invalid YAML: {}", err));
                    return;
                }
            };
            match value {
                Value::Null => {}
                Value::Mapping(_) | Value::Tagged(_) => {
                    flatten(&value, "", None, &mut locator, sink)
                }
                _ => sink.warn(
                    locator.cursor_line(),
                    "YAML document is not a mapping of settings",
                ),
            }
        }
    }
}

impl LineDecoder for ConfigDecoder {
    fn decode_line(&mut self, line: &str, line_no: u64, sink: &mut ItemSink) {
        let trimmed = line.trim();
        let meaningful = !trimmed.is_empty() && !trimmed.starts_with('#') && trimmed != "---";
        if self.dialect.is_none() && meaningful {
            self.dialect = Some(Self::detect(trimmed));
        }

        match self.dialect {
            Some(Dialect::Lines) => {
                if meaningful {
                    Self::decode_entry(trimmed, line_no, sink);
                }
            }
            // Undecided lines are blank or comments; keep them so YAML line numbers hold
            Some(Dialect::Yaml) | None => {
                self.yaml.push_str(line);
                self.yaml.push('\n');
                self.lines.push(line.to_string());
            }
        }
    }

    fn finish(&mut self, sink: &mut ItemSink) {
        if self.dialect == Some(Dialect::Yaml) {
            self.decode_yaml(sink);
        }
    }
}

/// Walk a YAML value in document order, emitting one entry per scalar leaf
fn flatten(value: &Value, path: &str, inline: Option<u64>, locator: &mut LineLocator, sink: &mut ItemSink) {
    match value {
        Value::Mapping(mapping) => {
            for (key, child) in mapping {
                let Some(key) = scalar_text(key) else {
                    sink.warn(inline.unwrap_or_else(|| locator.cursor_line()), "non-scalar mapping key");
                    continue;
                };
                let line = inline.unwrap_or_else(|| locator.find_key(&key));
                let child_inline = inline.or_else(|| locator.is_flow(line).then_some(line));
                flatten(child, &join(path, &key), child_inline, locator, sink);
                if inline.is_none() {
                    locator.settle(line);
                }
            }
        }
        Value::Sequence(items) => {
            for (index, child) in items.iter().enumerate() {
                let line = inline.unwrap_or_else(|| locator.find_item());
                let child_inline = inline.or_else(|| locator.is_flow_item(line).then_some(line));
                flatten(child, &join(path, &index.to_string()), child_inline, locator, sink);
            }
        }
        Value::Tagged(tagged) => flatten(&tagged.value, path, inline, locator, sink),
        scalar => {
            if path.is_empty() {
                return;
            }
            let text = scalar_text(scalar).unwrap_or_default();
            sink.config(path, text, inline.unwrap_or_else(|| locator.cursor_line()));
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

/// Recovers source line numbers for flattened YAML entries.
///
/// serde_yaml values carry no spans, so keys and list items are matched
/// against the raw text with a cursor that only moves forward.
struct LineLocator<'a> {
    lines: &'a [String],
    /// Index of the line the last key or item was found on
    cursor: usize,
}

impl<'a> LineLocator<'a> {
    fn new(lines: &'a [String]) -> Self {
        Self { lines, cursor: 0 }
    }

    fn cursor_line(&self) -> u64 {
        self.cursor as u64 + 1
    }

    /// Line of `key:` at or after the cursor, list markers stripped
    fn find_key(&mut self, key: &str) -> u64 {
        let candidates = [format!("{}:", key), format!("\"{}\":", key), format!("'{}':", key)];
        for (i, line) in self.lines.iter().enumerate().skip(self.cursor) {
            let mut content = line.trim();
            while let Some(rest) = content.strip_prefix("- ") {
                content = rest.trim_start();
            }
            if candidates.iter().any(|c| content.starts_with(c.as_str())) {
                self.cursor = i;
                return self.cursor_line();
            }
        }
        self.cursor_line()
    }

    /// Line of the next `-` item strictly after the cursor
    fn find_item(&mut self) -> u64 {
        for (i, line) in self.lines.iter().enumerate().skip(self.cursor + 1) {
            let content = line.trim();
            if content == "-" || content.starts_with("- ") {
                self.cursor = i;
                return self.cursor_line();
            }
        }
        self.cursor_line()
    }

    /// A sibling key never sits before its predecessor's line
    fn settle(&mut self, line: u64) {
        self.cursor = self.cursor.max(line.saturating_sub(1) as usize);
    }

    /// `key: [a, b]` or `key: {a: 1}` keeps its children on one line
    fn is_flow(&self, line: u64) -> bool {
        self.text(line)
            .and_then(|text| text.split_once(": "))
            .is_some_and(|(_, value)| value.trim_start().starts_with(['[', '{']))
    }

    /// Same for a list item written as `- [a, b]` or `- {a: 1}`
    fn is_flow_item(&self, line: u64) -> bool {
        self.text(line)
            .and_then(|text| text.trim().strip_prefix("- "))
            .is_some_and(|item| item.trim_start().starts_with(['[', '{']))
    }

    fn text(&self, line: u64) -> Option<&str> {
        self.lines
            .get(line.saturating_sub(1) as usize)
            .map(String::as_str)
    }
}

fn is_jvm_option(trimmed: &str) -> bool {
    trimmed.starts_with('-') && trimmed.len() > 1 && !trimmed[1..].starts_with(char::is_whitespace)
}

/// `-Xmx8G` -> (`-Xmx`, `8G`), `-XX:+UseG1GC` -> (`-XX:UseG1GC`, `true`),
/// `-XX:MaxGCPauseMillis=500` -> (`-XX:MaxGCPauseMillis`, `500`), `-Dk=v` -> (`-Dk`, `v`)
fn split_jvm_option(option: &str) -> (String, String) {
    if let Some(flag) = option.strip_prefix("-XX:") {
        if let Some(name) = flag.strip_prefix('+') {
            return (format!("-XX:{}", name), "true".to_string());
        }
        if let Some(name) = flag.strip_prefix('-') {
            return (format!("-XX:{}", name), "false".to_string());
        }
        if let Some((name, value)) = flag.split_once('=') {
            return (format!("-XX:{}", name), value.to_string());
        }
        return (option.to_string(), "true".to_string());
    }
    for prefix in ["-Xmx", "-Xms", "-Xmn", "-Xss"] {
        if let Some(value) = option.strip_prefix(prefix) {
            return (prefix.to_string(), value.to_string());
        }
    }
    match option.split_once('=') {
        Some((key, value)) => (key.to_string(), value.to_string()),
        None => (option.to_string(), "true".to_string()),
    }
}

/// `key: value` -> (key, Some(value)), `key:` -> (key, None)
fn split_yaml(trimmed: &str) -> Option<(&str, Option<&str>)> {
    let (key, rest) = trimmed.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(is_key_char) {
        return None;
    }
    if rest.is_empty() {
        return Some((key, None));
    }
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let value = rest.trim();
    Some((key, (!value.is_empty()).then_some(value)))
}

fn split_property(trimmed: &str) -> Option<(String, String)> {
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(is_key_char) {
        return None;
    }
    Some((key.to_string(), unquote(value.trim())))
}

fn unquote(value: &str) -> String {
    let stripped = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
    stripped.unwrap_or(value).to_string()
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ParsedItem;
    use crate::traits::test_support::{artifact, parse_str, warnings};
    use sperf_types::ConfigEntry;

    fn entries(items: &[ParsedItem]) -> Vec<(String, String)> {
        configs(items)
            .into_iter()
            .map(|c| (c.key.clone(), c.value.clone()))
            .collect()
    }

    fn configs(items: &[ParsedItem]) -> Vec<&ConfigEntry> {
        items
            .iter()
            .filter_map(|i| match i {
                ParsedItem::Config(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_yaml_nesting_and_lists() {
        let content = "\
cluster_name: 'Test Cluster'
num_tokens: 16
# comment
client_encryption_options:
    enabled: false # inline comment
    keystore: conf/.keystore
seed_provider:
    - class_name: org.apache.cassandra.locator.SimpleSeedProvider
      parameters:
          - seeds: \"10.0.0.1,10.0.0.2\"
data_file_directories:
    - /var/lib/cassandra/data
    - /mnt/data
concurrent_reads: 32
";
        let items = parse_str(&ConfigDumpParser, content);
        assert!(warnings(&items).is_empty(), "{:?}", warnings(&items));
        let e = entries(&items);
        let get = |k: &str| e.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());

        assert_eq!(get("cluster_name"), Some("Test Cluster"));
        assert_eq!(get("num_tokens"), Some("16"));
        assert_eq!(get("client_encryption_options.enabled"), Some("false"));
        assert_eq!(get("client_encryption_options.keystore"), Some("conf/.keystore"));
        assert_eq!(
            get("seed_provider.0.class_name"),
            Some("org.apache.cassandra.locator.SimpleSeedProvider")
        );
        assert_eq!(
            get("seed_provider.0.parameters.0.seeds"),
            Some("10.0.0.1,10.0.0.2")
        );
        assert_eq!(get("data_file_directories.0"), Some("/var/lib/cassandra/data"));
        assert_eq!(get("data_file_directories.1"), Some("/mnt/data"));
        assert_eq!(get("concurrent_reads"), Some("32"));
    }

    #[test]
    fn test_yaml_column_zero_lists() {
        // cassandra.yaml as shipped writes list items flush with their key
        let content = "\
data_file_directories:
- /var/lib/cassandra/data
- /mnt/data
seed_provider:
- class_name: org.apache.cassandra.locator.SimpleSeedProvider
  parameters:
  - seeds: \"10.0.0.1\"
commitlog_directory: /var/lib/cassandra/commitlog
";
        let items = parse_str(&ConfigDumpParser, content);
        assert!(warnings(&items).is_empty(), "{:?}", warnings(&items));

        let found = configs(&items);
        let line_of = |k: &str| found.iter().find(|c| c.key == k).map(|c| (c.value.as_str(), c.line));
        assert_eq!(line_of("data_file_directories.0"), Some(("/var/lib/cassandra/data", 2)));
        assert_eq!(line_of("data_file_directories.1"), Some(("/mnt/data", 3)));
        assert_eq!(
            line_of("seed_provider.0.class_name"),
            Some(("org.apache.cassandra.locator.SimpleSeedProvider", 5))
        );
        assert_eq!(line_of("seed_provider.0.parameters.0.seeds"), Some(("10.0.0.1", 7)));
        assert_eq!(
            line_of("commitlog_directory"),
            Some(("/var/lib/cassandra/commitlog", 8))
        );
    }

    #[test]
    fn test_yaml_flow_collections_and_null() {
        let content = "\
hints_directory:
endpoint_snitch: GossipingPropertyFileSnitch
allocate_tokens_for_keyspace: null
authenticator: {class_name: PasswordAuthenticator}
listen_interfaces: [eth0, eth1]
";
        let items = parse_str(&ConfigDumpParser, content);
        assert!(warnings(&items).is_empty(), "{:?}", warnings(&items));
        let found = configs(&items);
        let get = |k: &str| found.iter().find(|c| c.key == k).map(|c| (c.value.as_str(), c.line));

        assert_eq!(get("hints_directory"), Some(("", 1)));
        assert_eq!(get("endpoint_snitch"), Some(("GossipingPropertyFileSnitch", 2)));
        assert_eq!(get("authenticator.class_name"), Some(("PasswordAuthenticator", 4)));
        assert_eq!(get("listen_interfaces.0"), Some(("eth0", 5)));
        assert_eq!(get("listen_interfaces.1"), Some(("eth1", 5)));
    }

    #[test]
    fn test_invalid_yaml_is_a_warning() {
        let content = "cluster_name: test\nnum_tokens: [16\nconcurrent_reads: 32\n";
        let items = parse_str(&ConfigDumpParser, content);
        let warnings = warnings(&items);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].reason.starts_with("invalid YAML"), "{}", warnings[0].reason);
        assert!(warnings[0].line >= 2);
    }

    #[test]
    fn test_jvm_options() {
        let content = "-Xmx8G\n-Xms8G\n-XX:+UseG1GC\n-XX:-UseBiasedLocking\n-XX:MaxGCPauseMillis=500\n-Dcassandra.max_queued_native_transport_requests=3072\n-ea\n";
        let e = entries(&parse_str(&ConfigDumpParser, content));
        assert!(e.contains(&("-Xmx".into(), "8G".into())));
        assert!(e.contains(&("-XX:UseG1GC".into(), "true".into())));
        assert!(e.contains(&("-XX:UseBiasedLocking".into(), "false".into())));
        assert!(e.contains(&("-XX:MaxGCPauseMillis".into(), "500".into())));
        assert!(e.contains(&(
            "-Dcassandra.max_queued_native_transport_requests".into(),
            "3072".into()
        )));
        assert!(e.contains(&("-ea".into(), "true".into())));
    }

    #[test]
    fn test_properties_and_unrecognized_line() {
        let content = "dc=dc1\nrack=rack1\nthis is not config\n";
        let items = parse_str(&ConfigDumpParser, content);
        let e = entries(&items);
        assert_eq!(e, vec![("dc".into(), "dc1".into()), ("rack".into(), "rack1".into())]);
        assert_eq!(warnings(&items).len(), 1);
        assert_eq!(warnings(&items)[0].line, 3);
    }

    #[test]
    fn test_open_picks_dialect_from_extension() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cassandra-rackdc.properties");
        // A YAML-looking first line would otherwise select YAML
        std::fs::write(&path, "prefer_local: true\ndc=dc1\n")?;

        let mut file = artifact(ArtifactKind::Config);
        file.path = path;
        let items: Vec<ParsedItem> = ConfigDumpParser.open(&file)?.collect();
        assert_eq!(entries(&items), vec![("dc".to_string(), "dc1".to_string())]);
        assert_eq!(warnings(&items).len(), 1);
        assert_eq!(warnings(&items)[0].line, 1);
        Ok(())
    }
}
