//! Self-healing port allocation.
//!
//! Scans a fixed range, first skipping ports the OS reports as listening,
//! then probing candidates with a bind-and-close. Introspection can
//! under-report inside sandboxed environments, so a second pass probes
//! every port in the range unconditionally before giving up.

use std::collections::HashSet;
use std::net::TcpListener;

use anyhow::{bail, Result};
use tracing::debug;

/// First port of the allocation range.
pub const BASE_PORT: u16 = 8787;
/// Number of candidate ports: `[BASE_PORT, BASE_PORT + PORT_RANGE)`.
pub const PORT_RANGE: u16 = 256;

/// Find a free TCP port on `host` within the fixed range.
pub fn find_available_port(host: &str) -> Result<u16> {
    let used = listening_ports_in_range();
    debug!(used = used.len(), "introspected listening ports in range");

    for port in BASE_PORT..BASE_PORT + PORT_RANGE {
        if used.contains(&port) {
            continue;
        }
        if probe_bind(host, port) {
            return Ok(port);
        }
    }

    // Second pass: probe unconditionally.
    for port in BASE_PORT..BASE_PORT + PORT_RANGE {
        if probe_bind(host, port) {
            return Ok(port);
        }
    }

    bail!(
        "no available port in range {}..{}",
        BASE_PORT,
        BASE_PORT + PORT_RANGE
    )
}

/// Attempt a bind-and-immediately-close on the candidate port.
fn probe_bind(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}

/// Ask the OS which ports in our range are currently listening.
///
/// Returns an empty set on platforms without a usable introspection
/// command, or when the command fails; the probe pass still covers the
/// whole range in that case.
fn listening_ports_in_range() -> HashSet<u16> {
    introspect_listening_ports()
        .unwrap_or_default()
        .into_iter()
        .filter(|port| (BASE_PORT..BASE_PORT + PORT_RANGE).contains(port))
        .collect()
}

#[cfg(target_os = "linux")]
fn introspect_listening_ports() -> Option<Vec<u16>> {
    let output = std::process::Command::new("ss")
        .args(["-H", "-ltn"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(parse_ss_output(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(target_os = "macos")]
fn introspect_listening_ports() -> Option<Vec<u16>> {
    let output = std::process::Command::new("lsof")
        .args(["-nP", "-iTCP", "-sTCP:LISTEN"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(parse_lsof_output(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn introspect_listening_ports() -> Option<Vec<u16>> {
    None
}

/// Parse `ss -H -ltn` output; the local address column carries the port
/// after the last colon (handles both `0.0.0.0:8787` and `[::]:8787`).
#[allow(dead_code)]
fn parse_ss_output(stdout: &str) -> Vec<u16> {
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().nth(3))
        .filter_map(|addr| addr.rsplit(':').next())
        .filter_map(|port| port.parse().ok())
        .collect()
}

/// Parse `lsof -nP -iTCP -sTCP:LISTEN` output; the NAME column ends in
/// `host:port (LISTEN)`.
#[allow(dead_code)]
fn parse_lsof_output(stdout: &str) -> Vec<u16> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(8))
        .filter_map(|addr| addr.rsplit(':').next())
        .filter_map(|port| port.parse().ok())
        .collect()
}
