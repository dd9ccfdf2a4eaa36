//! Process lifecycle management for child processes
//!
//! This module ensures that child tool processes (`pip`, `git`) are properly
//! terminated when the Rust parent process exits (gracefully or via
//! crash/signal).
//!
//! # Problem Solved
//! Without explicit process group management, if the provisioner crashes while
//! an install is running, the child process becomes orphaned and keeps
//! writing into the environment behind our back.
//!
//! # Solution
//! - Spawn children in their own process group
//! - Track all child PIDs in a global registry
//! - On parent exit (Drop, SIGTERM, SIGINT), send SIGTERM to all children
//! - Children get a grace period to clean up before SIGKILL
//!
//! Cancellation never rolls anything back: whatever the interrupted step had
//! already written stays on disk.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// SIGTERM-to-SIGKILL grace applied when the guard drops.
const DROP_GRACE: Duration = Duration::from_secs(5);

/// Grace applied on signal-driven shutdown.
const SIGNAL_GRACE: Duration = Duration::from_secs(3);

/// Global registry of child process IDs
/// Using OnceLock for safe lazy initialization
static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Registry tracking all spawned child processes
#[derive(Debug, Default)]
pub struct ChildRegistry {
    /// Set of child PIDs currently running
    pids: HashSet<u32>,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    /// Register a new child process
    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        tracing::debug!("Registered child process PID {}", pid);
    }

    /// Unregister a child process (called when it exits normally)
    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        tracing::debug!("Unregistered child process PID {}", pid);
    }

    /// Get count of tracked children
    ///
    /// Useful for debugging and tests to verify process registration.
    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Terminate all tracked child processes.
    ///
    /// Drains the registry, SIGTERMs every drained process group, waits up to
    /// `grace_period` for them to exit, then SIGKILLs the survivors. A second
    /// call finds the registry empty and does nothing.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        let targets: Vec<u32> = self.pids.drain().collect();
        if targets.is_empty() {
            tracing::debug!("No child processes to terminate");
            return;
        }

        tracing::info!("Terminating {} child process(es)...", targets.len());
        for &pid in &targets {
            deliver(pid, Signal::SIGTERM);
        }

        let survivors = await_exit(&targets, grace_period);
        if survivors.is_empty() {
            tracing::info!("All child processes terminated gracefully");
            return;
        }

        for pid in survivors {
            tracing::warn!("Process group {} ignored SIGTERM, sending SIGKILL", pid);
            deliver(pid, Signal::SIGKILL);
        }
        tracing::info!("Child process cleanup complete");
    }
}

/// Signal a child's process group, falling back to the child itself when the
/// group signal fails.
///
/// The group is addressed via the negative PID so pip's build backends and
/// git's remote helpers receive the signal along with their parent.
fn deliver(pid: u32, sig: Signal) {
    let group = Pid::from_raw(-(pid as i32));
    if let Err(group_err) = signal::kill(group, sig) {
        tracing::warn!("Failed to signal process group {}: {}", pid, group_err);
        if let Err(direct_err) = signal::kill(Pid::from_raw(pid as i32), sig) {
            tracing::warn!("Failed to signal PID {}: {}", pid, direct_err);
        }
    } else {
        tracing::debug!("Sent {} to process group {}", sig, pid);
    }
}

/// Poll until every PID has exited or the deadline passes; returns survivors.
fn await_exit(pids: &[u32], deadline: Duration) -> Vec<u32> {
    let start = Instant::now();
    loop {
        let alive: Vec<u32> = pids
            .iter()
            .copied()
            .filter(|&pid| is_process_alive(pid))
            .collect();
        if alive.is_empty() || start.elapsed() >= deadline {
            return alive;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Check if a process is still alive (not dead or zombie)
fn is_process_alive(pid: u32) -> bool {
    // Signal 0 probes existence without delivering anything
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // A zombie still accepts signals but will never run again. The state
    // letter follows the comm field, which is parenthesized and may itself
    // contain spaces, so scan from the closing paren.
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => {
            let state = stat
                .rfind(')')
                .and_then(|end| stat[end + 1..].split_whitespace().next());
            !matches!(state, Some("Z") | Some("X"))
        }
        // /proc unreadable, assume alive
        Err(_) => true,
    }
}

/// RAII guard that terminates all children on drop
/// Hold one in `main` to ensure cleanup on any exit path
pub struct ProcessGuard {
    registry: Arc<Mutex<ChildRegistry>>,
}

impl ProcessGuard {
    /// Create a new process guard attached to the global registry
    pub fn new() -> Self {
        Self {
            registry: ChildRegistry::global(),
        }
    }

    /// Register a child process with the guard
    ///
    /// `run_command_safe` registers through `ChildRegistry::global()` itself;
    /// this wrapper exists for callers holding a guard.
    pub fn register_child(&self, pid: u32) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.register(pid);
        }
    }

    /// Unregister a child process (call when it exits normally)
    pub fn unregister_child(&self, pid: u32) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.unregister(pid);
        }
    }

    /// Get the number of tracked children
    ///
    /// Useful for debugging and tests.
    pub fn child_count(&self) -> usize {
        self.registry.lock().map_or(0, |r| r.count())
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        tracing::debug!("ProcessGuard dropped, initiating cleanup");
        if let Ok(mut registry) = self.registry.lock() {
            registry.terminate_all(DROP_GRACE);
        }
    }
}

/// Initialize global signal handlers for graceful shutdown
/// Handles SIGINT (Ctrl+C), SIGTERM, and SIGHUP
/// Call this once at program start
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        // The handler exits the process, so one delivery is all we take
        if let Some(sig) = signals.forever().next() {
            let name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "signal",
            };
            tracing::info!("Received {}, cleaning up...", name);

            // Terminate all children; partial step effects stay on disk
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(SIGNAL_GRACE);
            }

            // Exit with the conventional code (128 + signal number)
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Configure the command to run in its own process group
    /// This allows us to kill the entire process tree with a single signal
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        unsafe {
            self.pre_exec(|| {
                // Become leader of a fresh process group so one group signal
                // reaches the whole tool subtree
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;

                // Parent death must take the child with it; an orphaned
                // install would keep mutating the environment unsupervised
                nix::sys::prctl::set_pdeathsig(Signal::SIGTERM)
                    .map_err(std::io::Error::other)?;

                Ok(())
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    /// PID above the kernel's PID_MAX_LIMIT, guaranteed never to exist.
    const IMPOSSIBLE_PID: u32 = 5_000_000;

    /// Wait for a child we spawned to exit and be reaped.
    fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
        use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};

        let deadline = Instant::now() + timeout;
        let target = Pid::from_raw(pid as i32);
        while Instant::now() < deadline {
            match waitpid(target, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => return true,
                Ok(_) => {}
                // Already reaped elsewhere; fall back to an existence probe
                Err(nix::errno::Errno::ECHILD) => return !is_process_alive(pid),
                Err(_) => {}
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_registry_counts_registrations() {
        let mut registry = ChildRegistry::default();

        registry.register(1234);
        registry.register(5678);
        assert_eq!(registry.count(), 2);

        // Double registration of the same PID is not a second entry
        registry.register(1234);
        assert_eq!(registry.count(), 2);

        registry.unregister(1234);
        assert_eq!(registry.count(), 1);
        registry.unregister(5678);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_process_guard_tracks_children() {
        let guard = ProcessGuard::new();

        guard.register_child(1111);
        guard.register_child(2222);
        assert_eq!(guard.child_count(), 2);

        guard.unregister_child(1111);
        assert_eq!(guard.child_count(), 1);
        guard.unregister_child(2222);
    }

    #[test]
    fn test_terminate_all_kills_real_process() {
        let child = Command::new("sh")
            .args(["-c", "sleep 60"])
            .spawn()
            .expect("Failed to spawn sleep process");
        let pid = child.id();

        // Use a private registry so parallel tests cannot interfere
        let mut registry = ChildRegistry::default();
        registry.register(pid);
        assert!(is_process_alive(pid), "Process should be alive after spawn");

        registry.terminate_all(Duration::from_millis(500));

        assert!(
            wait_for_exit(pid, Duration::from_secs(2)),
            "Process should be dead after terminate_all"
        );
        assert_eq!(registry.count(), 0, "terminate_all should drain the registry");
    }

    #[test]
    fn test_terminate_all_drains_and_second_call_is_noop() {
        let mut child = Command::new("sh")
            .args(["-c", "exit 0"])
            .spawn()
            .expect("Failed to spawn sh");
        let pid = child.id();

        // Reap it so the registry holds a PID that is already gone
        let _ = child.wait();

        let mut registry = ChildRegistry::default();
        registry.register(pid);

        registry.terminate_all(Duration::from_millis(100));
        assert_eq!(registry.count(), 0);

        // Nothing left to signal; must not panic or block
        registry.terminate_all(Duration::from_millis(100));
    }

    #[test]
    fn test_sigterm_is_tried_before_sigkill() {
        // The trap exits cleanly on SIGTERM; reaching that handler proves the
        // first pass was SIGTERM, not SIGKILL
        let child = Command::new("sh")
            .args(["-c", "trap 'exit 0' TERM; sleep 60"])
            .spawn()
            .expect("Failed to spawn sh with trap");
        let pid = child.id();

        let mut registry = ChildRegistry::default();
        registry.register(pid);

        // Give the shell a moment to install the trap
        std::thread::sleep(Duration::from_millis(50));

        registry.terminate_all(Duration::from_secs(2));

        assert!(
            wait_for_exit(pid, Duration::from_secs(3)),
            "Process should exit from its SIGTERM trap"
        );
    }

    #[test]
    fn test_zombie_counts_as_dead() {
        let mut child = Command::new("sh")
            .args(["-c", "exit 0"])
            .spawn()
            .expect("Failed to spawn sh");
        let pid = child.id();

        // Unreaped child becomes a zombie once it exits; poll until the
        // liveness probe reports it dead
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut seen_dead = false;
        while Instant::now() < deadline {
            if !is_process_alive(pid) {
                seen_dead = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(seen_dead, "Zombie child should not count as alive");

        let _ = child.wait();
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(IMPOSSIBLE_PID));
    }

    #[test]
    fn test_terminate_all_survives_impossible_pid() {
        let mut registry = ChildRegistry::default();
        registry.register(IMPOSSIBLE_PID);

        // Both signal paths fail with ESRCH; cleanup must still complete
        registry.terminate_all(Duration::from_millis(100));
        assert_eq!(registry.count(), 0);
    }
}
