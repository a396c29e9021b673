//! Artifact content generators.
//!
//! Lines follow the formats the parsers accept, so tests describe events
//! ("a 900ms GC pause at 10:00:05") rather than raw text.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// 2024-03-01 at the given UTC time
pub fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, h, m, s)
        .single()
        .expect("valid fixture time")
}

/// `at` shifted by whole seconds
pub fn plus_secs(t: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    t + Duration::seconds(secs)
}

/// One logback header line
pub fn log_line(level: &str, thread: &str, ts: DateTime<Utc>, source: &str, message: &str) -> String {
    format!(
        "{:<5} [{}] {} {}.java:{} - {}\n",
        level,
        thread,
        ts.format("%Y-%m-%d %H:%M:%S,%3f"),
        source,
        100 + source.len(),
        message
    )
}

pub fn dropped_messages(ts: DateTime<Utc>, verb: &str, internal: u64, cross: u64) -> String {
    log_line(
        "INFO",
        "ScheduledTasks:1",
        ts,
        "MessagingService",
        &format!(
            "{} messages were dropped in last 5000 ms: {} internal and {} cross node. Mean internal dropped latency: 2730 ms and Mean cross-node dropped latency: 0 ms",
            verb, internal, cross
        ),
    )
}

pub fn gc_pause(ts: DateTime<Utc>, ms: u64) -> String {
    log_line(
        "WARN",
        "Service Thread",
        ts,
        "GCInspector",
        &format!(
            "G1 Young Generation GC in {}ms.  G1 Eden Space: 1048576 -> 0; G1 Old Gen: 2097152 -> 2097152;",
            ms
        ),
    )
}

/// StatusLogger thread-pool row
pub fn pool_row(ts: DateTime<Utc>, pool: &str, active: u64, pending: u64, blocked: u64) -> String {
    log_line(
        "INFO",
        "ScheduledTasks:1",
        ts,
        "StatusLogger",
        &format!("{:<30}{:>10}{:>10}{:>12}{:>10}{:>18}", pool, active, pending, 1000, blocked, blocked),
    )
}

pub fn schema_mismatch(ts: DateTime<Utc>) -> String {
    log_line(
        "WARN",
        "MigrationStage:1",
        ts,
        "MigrationManager",
        "Schema version mismatch detected; skipping pull",
    )
}

/// Marker line used for clock alignment tests
pub fn startup_marker(ts: DateTime<Utc>) -> String {
    log_line(
        "INFO",
        "main",
        ts,
        "Server",
        "Starting listening for CQL clients on /0.0.0.0:9042 (unencrypted)...",
    )
}

/// Metrics CSV with header
pub fn metrics_csv<'a>(rows: impl IntoIterator<Item = (DateTime<Utc>, &'a str, f64)>) -> String {
    let mut out = String::from("timestamp,metric,value\n");
    for (ts, name, value) in rows {
        out.push_str(&format!("{},{},{}\n", ts.to_rfc3339(), name, value));
    }
    out
}

/// One iostat block: date line, avg-cpu section, device section
///
/// `cpu` is `[%user, %nice, %system, %iowait, %steal, %idle]`; each device
/// row carries its queue size.
pub fn iostat_block(ts: DateTime<Utc>, cpu: [f64; 6], devices: &[(&str, f64)]) -> String {
    let mut out = format!("{}\n", ts.format("%m/%d/%Y %I:%M:%S %p"));
    out.push_str("avg-cpu:  %user   %nice %system %iowait  %steal   %idle\n");
    out.push_str(&format!(
        "        {:>7.2} {:>7.2} {:>7.2} {:>7.2} {:>7.2} {:>7.2}\n\n",
        cpu[0], cpu[1], cpu[2], cpu[3], cpu[4], cpu[5]
    ));
    out.push_str("Device            r/s     w/s  aqu-sz  %util\n");
    for (device, queue) in devices {
        out.push_str(&format!(
            "{:<12} {:>7.2} {:>7.2} {:>7.2} {:>7.2}\n",
            device, 1.0, 2.0, queue, 10.0
        ));
    }
    out.push('\n');
    out
}
