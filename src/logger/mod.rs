//! Logger module
//!
//! Provides logging utilities for the server including:
//! - Startup and shutdown notices
//! - Access logging with multiple formats
//! - Upstream reconnect and failure reporting
//! - File-based logging support

mod format;
pub mod writer;

pub use format::AccessLogEntry;

use crate::config::{Config, ForwardConfig};
use crate::upstream::ConnectionState;
use std::net::SocketAddr;

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> std::io::Result<()> {
    writer::init(
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
        config.logging.is_debug(),
    )
}

/// Write to info/access log
fn write_info(message: &str) {
    match writer::get() {
        Some(w) => w.write_info(message),
        None => println!("{message}"),
    }
}

/// Write to error log
fn write_error(message: &str) {
    match writer::get() {
        Some(w) => w.write_error(message),
        None => eprintln!("{message}"),
    }
}

fn write_debug(message: &str) {
    if let Some(w) = writer::get().filter(|w| w.debug_enabled()) {
        w.write_info(message);
    }
}

pub fn log_server_start(addr: &SocketAddr, config: &Config, forward: &ForwardConfig) {
    write_info(&format!("serving at port {}", addr.port()));
    write_debug(&format!("Listening on: http://{addr}"));
    write_debug(&format!("Static files: {}", config.files.build_dir));
    write_debug(&format!(
        "Forwarding {} -> {}://{}{}",
        forward.prefix,
        forward.transport.scheme(),
        forward.host_header(),
        forward.forward_path
    ));
    if let Some(workers) = config.server.workers {
        write_debug(&format!("Worker threads: {workers}"));
    }
}

/// Debug summary of the upstream connection at shutdown
pub fn log_upstream_summary(target: &ForwardConfig, state: ConnectionState, connects: u64, reconnects: u64) {
    write_debug(&format!(
        "[Upstream] {} was {state:?}: {connects} connection(s) opened, {reconnects} reconnect(s)",
        target.connect_addr()
    ));
}

pub fn log_server_closed() {
    write_info("server closed");
}

pub fn log_shutdown_requested(signal: &str) {
    write_info(&format!("\n[Signal] {signal} received, shutting down"));
}

/// Announce a reconnect, with the failure that caused it
pub fn log_connecting(addr: &str, reason: &impl std::fmt::Display) {
    write_info("Connecting...");
    write_debug(&format!("[Upstream] Reconnecting to {addr}: {reason}"));
}

pub fn log_forward_failure(method: &str, uri: &str, err: &impl std::fmt::Display) {
    write_error(&format!("[ERROR] Forwarding {method} {uri} failed: {err}"));
}

pub fn log_upstream_connection_error(err: &impl std::fmt::Display) {
    write_debug(&format!("[Upstream] Connection ended with error: {err}"));
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    write_debug(&format!("[Connection] Accepted from: {peer_addr}"));
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    write_error(&format!("[ERROR] Failed to serve connection: {err:?}"));
}

pub fn log_error(message: &str) {
    write_error(&format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    write_error(&format!("[WARN] {message}"));
}

pub fn log_headers_count(count: usize) {
    write_debug(&format!("[Headers] Count: {count}"));
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    write_info(&entry.format(format));
}
