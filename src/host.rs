//! Host environment detection and pre-flight checks
//!
//! Probes the facts the provisioner cares about before any step runs:
//! - Network reachability of the package index host
//! - Required host binaries (`git`) present on `PATH`
//!
//! Detection is advisory: an offline host gets a loud warning, but the
//! pipeline semantics never change based on it. The spawned tools report
//! their own network failures.
//!
//! # Design
//!
//! - **Pure Rust probe**: Network check uses `TcpStream::connect_timeout`,
//!   not ping/shell
//! - **No root requirement**: installs are per-user scope; nothing here
//!   needs privileges
//! - **No `unwrap()`**: All fallible paths degrade to `Offline`

use crate::process_guard::CommandProcessGroup;
use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::process::Command;
use std::time::Duration;

/// Package index host probed for connectivity (HTTPS port, firewall-friendly).
const INDEX_PROBE_HOST: (&str, u16) = ("pypi.org", 443);

/// Network connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    /// TCP connection to the package index host succeeded
    Online,
    /// DNS resolution or TCP connection failed or timed out
    Offline,
}

impl NetworkState {
    /// Returns true if network connectivity is available.
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "Online"),
            Self::Offline => write!(f, "Offline"),
        }
    }
}

/// Aggregated host detection results.
///
/// Created via `HostInfo::detect()` at startup. Provides the provisioner
/// with facts about the environment so it can warn early (e.g., announce
/// that the install steps will fail while offline).
#[derive(Debug, Clone)]
pub struct HostInfo {
    /// Network connectivity state
    pub network: NetworkState,
}

impl HostInfo {
    /// Detect the host environment.
    ///
    /// Never panics; probe failures degrade to `Offline`.
    pub fn detect() -> Self {
        let network = detect_network();

        tracing::info!("Host detection: network={}", network);

        Self { network }
    }
}

impl fmt::Display for HostInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Network: {}", self.network)
    }
}

/// Detect network connectivity via a TCP connection to the package index host.
///
/// Uses `TcpStream::connect_timeout` with a 5-second timeout against port 443.
///
/// # Why TCP instead of ICMP/ping?
///
/// - ICMP is often blocked by firewalls
/// - `ping` requires shelling out for a probe that std covers
/// - A TCP connect to the host we actually need is the most honest test
///
/// # Failure Mode
///
/// Returns `NetworkState::Offline` if DNS resolution fails, the connection
/// times out, the connection is refused, or any other I/O error occurs.
pub fn detect_network() -> NetworkState {
    let addr = match INDEX_PROBE_HOST.to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(a) => a,
            None => {
                tracing::warn!("DNS returned no addresses for {}", INDEX_PROBE_HOST.0);
                return NetworkState::Offline;
            }
        },
        Err(e) => {
            tracing::warn!("DNS resolution failed for {}: {}", INDEX_PROBE_HOST.0, e);
            return NetworkState::Offline;
        }
    };

    let timeout = Duration::from_secs(5);

    match TcpStream::connect_timeout(&addr, timeout) {
        Ok(_stream) => {
            tracing::info!(
                "Network connectivity confirmed (TCP to {}:{})",
                INDEX_PROBE_HOST.0,
                INDEX_PROBE_HOST.1
            );
            NetworkState::Online
        }
        Err(e) => {
            tracing::warn!("Network connectivity check failed: {}", e);
            NetworkState::Offline
        }
    }
}

// ============================================================================
// Pre-flight checks
// ============================================================================

/// Result of environment verification
#[derive(Debug)]
pub struct PreflightResult {
    pub missing_binaries: Vec<String>,
}

impl PreflightResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty()
    }
}

/// Required host binaries for provisioning.
///
/// `pip` is not listed: both installs run through the selected base
/// environment's interpreter, which step 1 verifies.
const REQUIRED_BINARIES: &[&str] = &[
    "git", // Source fetch (step 3)
];

/// Check if a binary is available in PATH
fn binary_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .in_new_process_group()
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Perform all pre-flight checks and return the result
pub fn verify_environment() -> PreflightResult {
    let mut missing = Vec::new();

    for binary in REQUIRED_BINARIES {
        if !binary_exists(binary) {
            missing.push((*binary).to_string());
        }
    }

    PreflightResult {
        missing_binaries: missing,
    }
}

/// Print a pre-flight failure message to stderr and exit.
/// Runs before any step, so nothing needs cleanup.
pub fn print_error_and_exit(result: &PreflightResult) -> ! {
    eprintln!();
    eprintln!("labstrap - pre-flight check failed");
    eprintln!();

    if !result.missing_binaries.is_empty() {
        eprintln!("❌ ERROR: Missing required binaries");
        for binary in &result.missing_binaries {
            eprintln!("   • {}", binary);
        }
        eprintln!();
        eprintln!("   Solution: install the missing tools with your distribution's");
        eprintln!("   package manager and re-run.");
        eprintln!();
    }

    std::process::exit(1);
}

/// Verify the environment and exit if checks fail.
/// Call this before the first provisioning step.
pub fn run_preflight_checks() {
    tracing::debug!("Running pre-flight checks...");

    let result = verify_environment();

    if !result.is_ok() {
        print_error_and_exit(&result);
    }

    tracing::info!("Pre-flight checks passed: all required binaries present");
}
