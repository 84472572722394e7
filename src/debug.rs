use crate::protocol::{CacheKey, Record};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};

static DEBUG_MODE: AtomicBool = AtomicBool::new(false);
static TRACE_MODE: AtomicBool = AtomicBool::new(false);

/// Initialize debug mode from environment variables
///
/// - `DLINK_DEBUG=1`: Enable JSON pretty-printing of records as they are
///   encoded and decoded
/// - `DLINK_TRACE=1`: Enable human-readable trace logging of operations
pub fn init_debug_mode() {
    let debug = env::var("DLINK_DEBUG").is_ok();
    let trace = env::var("DLINK_TRACE").is_ok();

    DEBUG_MODE.store(debug, Ordering::Relaxed);
    TRACE_MODE.store(trace, Ordering::Relaxed);

    if debug {
        eprintln!("[delta-link] Debug mode enabled - records will be logged as JSON");
    }

    if trace {
        eprintln!("[delta-link] Trace mode enabled - human-readable operation logs");
    }
}

/// Check if debug mode is enabled
pub fn is_debug_enabled() -> bool {
    DEBUG_MODE.load(Ordering::Relaxed)
}

/// Check if trace mode is enabled
pub fn is_trace_enabled() -> bool {
    TRACE_MODE.load(Ordering::Relaxed)
}

/// Log a protocol error. Always on: these are the operator-facing log lines
/// for closed-connection misuse, truncation, unknown packets and the like.
pub fn log_error(message: &str) {
    eprintln!("[delta-link] ERROR: {}", message);
}

/// Log a record in JSON format if debug mode is enabled
pub fn log_record(direction: &str, name: &str, record: &Record) {
    if !is_debug_enabled() {
        return;
    }

    match serde_json::to_string_pretty(record) {
        Ok(json) => {
            eprintln!("\n[delta-link] {} {}:\n{}\n", direction, name, json);
        }
        Err(e) => {
            eprintln!("[delta-link] Failed to serialize record to JSON: {}", e);
        }
    }
}

/// Trace a completed send
pub fn trace_send(name: &str, key: CacheKey, bytes: usize, forced: bool) {
    if !is_trace_enabled() {
        return;
    }

    let mark = if forced { " (full snapshot)" } else { "" };
    eprintln!(
        "[delta-link] → {} {:?}: {}{}",
        name,
        key,
        format_bytes(bytes),
        mark
    );
}

/// Trace a suppressed send (no field changed)
pub fn trace_suppressed(name: &str, key: CacheKey) {
    if !is_trace_enabled() {
        return;
    }

    eprintln!("[delta-link] → {} {:?}: no change, discarded", name, key);
}

/// Trace a completed receive
pub fn trace_receive(name: &str, key: CacheKey, fresh: bool) {
    if !is_trace_enabled() {
        return;
    }

    let mark = if fresh { " (no old info)" } else { "" };
    eprintln!("[delta-link] ← {} {:?}{}", name, key, mark);
}

/// Trace a variant resolution
pub fn trace_variant(name: &str, variant_id: u16, capability: &str) {
    if !is_trace_enabled() {
        return;
    }

    eprintln!(
        "[delta-link] {}: using variant={} cap={}",
        name, variant_id, capability
    );
}

/// Format bytes in human-readable format (KB, MB, etc.)
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
