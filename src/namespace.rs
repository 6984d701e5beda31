/// Namespace isolation for enhanced security
/// Provides PID, mount, and network namespace isolation capabilities
use crate::types::{Result, SandboxError};

#[cfg(unix)]
use nix::sched::{unshare, CloneFlags};

/// Namespace isolation controller
#[derive(Clone, Copy, Debug)]
pub struct NamespaceIsolation {
    /// Enable PID namespace isolation
    enable_pid_namespace: bool,
    /// Enable mount namespace isolation
    enable_mount_namespace: bool,
    /// Enable network namespace isolation
    enable_network_namespace: bool,
    /// Enable user namespace isolation
    enable_user_namespace: bool,
    /// Enable IPC namespace isolation
    enable_ipc_namespace: bool,
    /// Enable UTS namespace isolation
    enable_uts_namespace: bool,
}

impl NamespaceIsolation {
    /// Create a new namespace isolation controller
    pub fn new(
        enable_pid: bool,
        enable_mount: bool,
        enable_network: bool,
        enable_user: bool,
        enable_ipc: bool,
        enable_uts: bool,
    ) -> Self {
        Self {
            enable_pid_namespace: enable_pid,
            enable_mount_namespace: enable_mount,
            enable_network_namespace: enable_network,
            enable_user_namespace: enable_user,
            enable_ipc_namespace: enable_ipc,
            enable_uts_namespace: enable_uts,
        }
    }

    /// Returns a copy with network namespace isolation turned off, used
    /// when a request explicitly asks for network access.
    pub fn without_network_namespace(&self) -> Self {
        Self {
            enable_network_namespace: false,
            ..*self
        }
    }

    /// Apply namespace isolation without any logging or hostname call.
    /// Safe to invoke from a `pre_exec` hook running in the forked
    /// child between `fork` and `execve`, where allocation-heavy
    /// logging should be avoided. This must be called before exec'ing
    /// the target process.
    pub fn apply_isolation_quiet(&self) -> Result<()> {
        #[cfg(unix)]
        {
            let mut flags = CloneFlags::empty();
            if self.enable_pid_namespace {
                flags |= CloneFlags::CLONE_NEWPID;
            }
            if self.enable_mount_namespace {
                flags |= CloneFlags::CLONE_NEWNS;
            }
            if self.enable_network_namespace {
                flags |= CloneFlags::CLONE_NEWNET;
            }
            if self.enable_user_namespace {
                flags |= CloneFlags::CLONE_NEWUSER;
            }
            if self.enable_ipc_namespace {
                flags |= CloneFlags::CLONE_NEWIPC;
            }
            if self.enable_uts_namespace {
                flags |= CloneFlags::CLONE_NEWUTS;
            }

            if !flags.is_empty() {
                unshare(flags).map_err(|e| {
                    SandboxError::Namespace(format!("Failed to unshare namespaces: {}", e))
                })?;
            }
            Ok(())
        }
        #[cfg(not(unix))]
        {
            if self.is_isolation_enabled() {
                Err(SandboxError::Namespace(
                    "Namespace isolation is only supported on Unix systems".to_string(),
                ))
            } else {
                Ok(())
            }
        }
    }

    /// Check if any isolation is enabled
    pub fn is_isolation_enabled(&self) -> bool {
        self.enable_pid_namespace
            || self.enable_mount_namespace
            || self.enable_network_namespace
            || self.enable_user_namespace
            || self.enable_ipc_namespace
            || self.enable_uts_namespace
    }

    /// Get enabled namespaces as a string
    pub fn get_enabled_namespaces(&self) -> Vec<String> {
        let mut namespaces = Vec::new();

        if self.enable_pid_namespace {
            namespaces.push("PID".to_string());
        }
        if self.enable_mount_namespace {
            namespaces.push("Mount".to_string());
        }
        if self.enable_network_namespace {
            namespaces.push("Network".to_string());
        }
        if self.enable_user_namespace {
            namespaces.push("User".to_string());
        }
        if self.enable_ipc_namespace {
            namespaces.push("IPC".to_string());
        }
        if self.enable_uts_namespace {
            namespaces.push("UTS".to_string());
        }

        namespaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_creation() {
        let ns = NamespaceIsolation::new(true, true, true, false, true, true);
        assert!(ns.is_isolation_enabled());
        assert_eq!(ns.get_enabled_namespaces(), vec!["PID", "Mount", "Network", "IPC", "UTS"]);
    }

    #[test]
    fn without_network_namespace_drops_only_network() {
        let ns = NamespaceIsolation::new(true, true, true, false, true, true).without_network_namespace();
        assert_eq!(ns.get_enabled_namespaces(), vec!["PID", "Mount", "IPC", "UTS"]);
    }

    #[test]
    fn no_namespaces_enabled_means_isolation_disabled() {
        let ns = NamespaceIsolation::new(false, false, false, false, false, false);
        assert!(!ns.is_isolation_enabled());
        assert!(ns.get_enabled_namespaces().is_empty());
    }
}
