// Structured field extraction for well-known Cassandra/DSE log messages.
//
// Field names are part of the rule contract: rules read `gc_ms`, `dropped`,
// `pending`, `tombstones` and so on instead of re-matching message text.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static GC_PAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<collector>[A-Za-z0-9][A-Za-z0-9 ]*?) GC in (?P<ms>\d+)ms")
        .expect("valid gc regex")
});

static DROPPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<verb>[A-Z_]+) messages were dropped in last (?P<interval>\d+) ms: (?P<internal>\d+) internal and (?P<cross>\d+) cross node",
    )
    .expect("valid dropped regex")
});

// Cassandra 2.x wording
static DROPPED_LEGACY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<count>\d+) (?P<verb>[A-Z_]+) messages dropped in last (?P<interval>\d+)ms")
        .expect("valid legacy dropped regex")
});

static POOL_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<pool>[A-Za-z][\w-]*(?::\d+)?)\s+(?P<active>\d+)\s+(?P<pending>\d+)\s+(?P<completed>\d+)\s+(?P<blocked>\d+)\s+(?P<all_time_blocked>\d+)\s*$",
    )
    .expect("valid pool regex")
});

static TOMBSTONES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Read (?P<live>\d+) live rows and (?P<tombstones>\d+) tombstone cells")
        .expect("valid tombstone regex")
});

// MonitoringTask header in debug.log; the operations follow as continuation lines
static SLOW_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<count>\d+) operations were slow in the last (?P<interval>\d+) msecs")
        .expect("valid slow header regex")
});

// `<query>, time 573 msec - slow timeout 500 msec`
// `<query>, was slow 2 times: avg/min/max 644/567/721 msec - slow timeout 500 msec`
static SLOW_OPERATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^<(?P<query>.*)>, (?:time (?P<ms>\d+) msec|was slow \d+ times: avg/min/max \d+/\d+/(?P<max>\d+) msec) - slow timeout (?P<timeout>\d+) msec",
    )
    .expect("valid slow operation regex")
});

static JAR_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>[\w.\-]+?)-(?P<version>\d[\w.\-]*)\.jar$").expect("valid jar regex")
});

/// Extract structured fields from a message based on its component and text.
/// `detail` holds the record's continuation lines.
pub fn extract(component: &str, message: &str, detail: &[String]) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    if let Some(caps) = SLOW_HEADER.captures(message) {
        fields.insert("event".into(), "slow_queries".into());
        fields.insert("slow_ops".into(), caps["count"].to_string());
        fields.insert("interval_ms".into(), caps["interval"].to_string());
        if let Some((ms, query, timeout)) = slowest_operation(detail) {
            fields.insert("slowest_ms".into(), ms.to_string());
            fields.insert("slowest_query".into(), query.to_string());
            fields.insert("slow_timeout_ms".into(), timeout.to_string());
        }
        return fields;
    }

    if let Some(caps) = GC_PAUSE.captures(message) {
        fields.insert("event".into(), "gc_pause".into());
        fields.insert("collector".into(), caps["collector"].trim().to_string());
        fields.insert("gc_ms".into(), caps["ms"].to_string());
        return fields;
    }

    if let Some(caps) = DROPPED.captures(message) {
        let internal: u64 = caps["internal"].parse().unwrap_or(0);
        let cross: u64 = caps["cross"].parse().unwrap_or(0);
        fields.insert("event".into(), "dropped_messages".into());
        fields.insert("verb".into(), caps["verb"].to_string());
        fields.insert("interval_ms".into(), caps["interval"].to_string());
        fields.insert("dropped".into(), (internal + cross).to_string());
        return fields;
    }

    if let Some(caps) = DROPPED_LEGACY.captures(message) {
        fields.insert("event".into(), "dropped_messages".into());
        fields.insert("verb".into(), caps["verb"].to_string());
        fields.insert("interval_ms".into(), caps["interval"].to_string());
        fields.insert("dropped".into(), caps["count"].to_string());
        return fields;
    }

    if component == "StatusLogger"
        && let Some(caps) = POOL_ROW.captures(message.trim())
    {
        fields.insert("event".into(), "thread_pool".into());
        for name in [
            "pool",
            "active",
            "pending",
            "completed",
            "blocked",
            "all_time_blocked",
        ] {
            fields.insert(name.into(), caps[name].to_string());
        }
        return fields;
    }

    if let Some(caps) = TOMBSTONES.captures(message) {
        fields.insert("event".into(), "tombstone_scan".into());
        fields.insert("live_rows".into(), caps["live"].to_string());
        fields.insert("tombstones".into(), caps["tombstones"].to_string());
    }

    fields
}

/// (duration, query, timeout) of the slowest operation in a slow-query report
fn slowest_operation(detail: &[String]) -> Option<(u64, &str, u64)> {
    detail
        .iter()
        .filter_map(|line| {
            let caps = SLOW_OPERATION.captures(line.trim())?;
            let ms = caps.name("ms").or_else(|| caps.name("max"))?.as_str().parse().ok()?;
            let timeout = caps["timeout"].parse().ok()?;
            Some((ms, caps.name("query")?.as_str(), timeout))
        })
        .max_by_key(|(ms, _, _)| *ms)
}

/// Versioned jars named on a startup `Classpath:` line, as (name, version).
/// Unversioned entries and directories are skipped.
pub fn classpath_jars(message: &str) -> Vec<(String, String)> {
    let Some(classpath) = message.trim().strip_prefix("Classpath:") else {
        return Vec::new();
    };
    classpath
        .trim()
        .split(':')
        .filter_map(|entry| {
            let file = entry.rsplit('/').next()?;
            let caps = JAR_FILE.captures(file)?;
            Some((caps["name"].to_string(), caps["version"].to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gc_pause() {
        let f = extract("GCInspector", "G1 Young Generation GC in 812ms.  G1 Eden Space: 1 -> 0;", &[]);
        assert_eq!(f["event"], "gc_pause");
        assert_eq!(f["collector"], "G1 Young Generation");
        assert_eq!(f["gc_ms"], "812");
    }

    #[test]
    fn test_dropped_messages_sums_internal_and_cross_node() {
        let f = extract("MessagingService", "MUTATION messages were dropped in last 5000 ms: 41 internal and 3 cross node. Mean internal dropped latency: 2730 ms", &[]);
        assert_eq!(f["event"], "dropped_messages");
        assert_eq!(f["verb"], "MUTATION");
        assert_eq!(f["dropped"], "44");
        assert_eq!(f["interval_ms"], "5000");
    }

    #[test]
    fn test_dropped_messages_legacy_wording() {
        let f = extract("MessagingService", "12 READ messages dropped in last 5000ms", &[]);
        assert_eq!(f["verb"], "READ");
        assert_eq!(f["dropped"], "12");
    }

    #[test]
    fn test_status_logger_pool_row_only_for_status_logger() {
        let msg = "CompactionExecutor                2       150        1234         0                 0";
        let f = extract("StatusLogger", msg, &[]);
        assert_eq!(f["pool"], "CompactionExecutor");
        assert_eq!(f["pending"], "150");
        assert_eq!(f["blocked"], "0");

        assert!(extract("CompactionTask", msg, &[]).is_empty());
    }

    #[test]
    fn test_tombstones() {
        let f = extract("ReadCommand", "Read 10 live rows and 100001 tombstone cells for query SELECT * FROM ks.t", &[]);
        assert_eq!(f["tombstones"], "100001");
        assert_eq!(f["live_rows"], "10");
    }

    #[test]
    fn test_slow_query_report_takes_slowest_operation() {
        let detail = vec![
            "<SELECT * FROM ks.users LIMIT 100>, was slow 2 times: avg/min/max 644/567/721 msec - slow timeout 500 msec/cross-node".to_string(),
            "<SELECT * FROM ks.events WHERE id = 1 LIMIT 5000>, time 573 msec - slow timeout 500 msec".to_string(),
        ];
        let f = extract("MonitoringTask", "2 operations were slow in the last 5003 msecs:", &detail);
        assert_eq!(f["event"], "slow_queries");
        assert_eq!(f["slow_ops"], "2");
        assert_eq!(f["interval_ms"], "5003");
        assert_eq!(f["slowest_ms"], "721");
        assert_eq!(f["slowest_query"], "SELECT * FROM ks.users LIMIT 100");
        assert_eq!(f["slow_timeout_ms"], "500");
    }

    #[test]
    fn test_slow_query_header_without_operations() {
        let f = extract("MonitoringTask", "1 operations were slow in the last 4996 msecs:", &[]);
        assert_eq!(f["slow_ops"], "1");
        assert!(!f.contains_key("slowest_ms"));
    }

    #[test]
    fn test_classpath_jars() {
        let jars = classpath_jars(
            "Classpath: /etc/dse/cassandra:/usr/share/dse/lib/cassandra-all-3.11.10.jar:/usr/share/dse/lib/log4j-over-slf4j-1.7.25.jar:/usr/share/dse/lib/netty-all-4.0.44.Final.jar:/usr/share/dse/dse.jar",
        );
        assert_eq!(
            jars,
            vec![
                ("cassandra-all".to_string(), "3.11.10".to_string()),
                ("log4j-over-slf4j".to_string(), "1.7.25".to_string()),
                ("netty-all".to_string(), "4.0.44.Final".to_string()),
            ]
        );
        assert!(classpath_jars("JVM vendor/version: OpenJDK").is_empty());
    }

    #[test]
    fn test_plain_message_has_no_fields() {
        assert!(extract("CassandraDaemon", "JVM vendor/version: OpenJDK", &[]).is_empty());
    }
}
