/// Syscall Policy Tables: static, per-language whitelists of x86-64
/// syscall numbers, plus a `SyscallPolicy` that applies them to the
/// current process as a seccomp-bpf filter via `libseccomp-sys`.
///
/// Because seccomp filters are append-only once the process is sealed,
/// the whole policy is assembled on the host and loaded into the child
/// right before it execs into the interpreter (see `process_runner`).
/// The concrete numbers below come from the reference service's
/// `syscalls_amd64.go` (Node.js) and an analogous hand-built table for
/// Python scoped to the CPython interpreter's own startup needs.
use crate::types::{Language, Result, SandboxError};
use libseccomp_sys::{
    scmp_filter_ctx, seccomp_init, seccomp_load, seccomp_release, seccomp_rule_add,
    SCMP_ACT_ALLOW, SCMP_ACT_ERRNO, SCMP_ACT_KILL_PROCESS,
};
use std::collections::BTreeSet;

/// Whitelisted syscalls every sandboxed Python interpreter needs.
pub const PYTHON_ALLOW: &[i32] = &[
    libc::SYS_read as i32,
    libc::SYS_write as i32,
    libc::SYS_openat as i32,
    libc::SYS_close as i32,
    libc::SYS_newfstatat as i32,
    libc::SYS_fstat as i32,
    libc::SYS_stat as i32,
    libc::SYS_lstat as i32,
    libc::SYS_ioctl as i32,
    libc::SYS_lseek as i32,
    libc::SYS_getdents64 as i32,
    libc::SYS_readlink as i32,
    libc::SYS_readlinkat as i32,
    libc::SYS_access as i32,
    libc::SYS_faccessat as i32,
    libc::SYS_futex as i32,
    libc::SYS_mmap as i32,
    libc::SYS_brk as i32,
    libc::SYS_mprotect as i32,
    libc::SYS_munmap as i32,
    libc::SYS_mremap as i32,
    libc::SYS_madvise as i32,
    libc::SYS_rt_sigreturn as i32,
    libc::SYS_rt_sigaction as i32,
    libc::SYS_rt_sigprocmask as i32,
    libc::SYS_sigaltstack as i32,
    libc::SYS_setuid as i32,
    libc::SYS_setgid as i32,
    libc::SYS_getuid as i32,
    libc::SYS_getgid as i32,
    libc::SYS_geteuid as i32,
    libc::SYS_getegid as i32,
    libc::SYS_getpid as i32,
    libc::SYS_getppid as i32,
    libc::SYS_gettid as i32,
    libc::SYS_exit as i32,
    libc::SYS_exit_group as i32,
    libc::SYS_tgkill as i32,
    libc::SYS_rt_sigsuspend as i32,
    libc::SYS_sched_yield as i32,
    libc::SYS_sched_getaffinity as i32,
    libc::SYS_set_robust_list as i32,
    libc::SYS_get_robust_list as i32,
    libc::SYS_clock_gettime as i32,
    libc::SYS_gettimeofday as i32,
    libc::SYS_nanosleep as i32,
    libc::SYS_clock_nanosleep as i32,
    libc::SYS_clock_getres as i32,
    libc::SYS_epoll_create1 as i32,
    libc::SYS_epoll_ctl as i32,
    libc::SYS_epoll_wait as i32,
    libc::SYS_epoll_pwait as i32,
    libc::SYS_poll as i32,
    libc::SYS_ppoll as i32,
    libc::SYS_select as i32,
    libc::SYS_pselect6 as i32,
    libc::SYS_dup as i32,
    libc::SYS_dup2 as i32,
    libc::SYS_dup3 as i32,
    libc::SYS_fcntl as i32,
    libc::SYS_pipe as i32,
    libc::SYS_pipe2 as i32,
    libc::SYS_getrandom as i32,
    libc::SYS_getcwd as i32,
    libc::SYS_chdir as i32,
    libc::SYS_fchdir as i32,
    libc::SYS_getrlimit as i32,
    libc::SYS_getrusage as i32,
    libc::SYS_times as i32,
    libc::SYS_uname as i32,
    libc::SYS_arch_prctl as i32,
    libc::SYS_getpgrp as i32,
    libc::SYS_getpgid as i32,
    libc::SYS_getsid as i32,
    libc::SYS_mlock as i32,
    libc::SYS_munlock as i32,
    libc::SYS_statfs as i32,
    libc::SYS_fstatfs as i32,
];

/// Python syscalls that must return `EPERM` instead of killing the
/// process — probed at interpreter startup but not load-bearing.
pub const PYTHON_ALLOW_WITH_ERRNO: &[i32] = &[
    libc::SYS_clone as i32,
    libc::SYS_mkdir as i32,
    libc::SYS_mkdirat as i32,
    libc::SYS_rmdir as i32,
    libc::SYS_unlink as i32,
    libc::SYS_unlinkat as i32,
    libc::SYS_rename as i32,
    libc::SYS_renameat as i32,
];

/// Socket-family and address-resolution syscalls, unioned into ALLOW
/// only when `enable_network` is set.
pub const PYTHON_ALLOW_NETWORK: &[i32] = &[
    libc::SYS_socket as i32,
    libc::SYS_socketpair as i32,
    libc::SYS_connect as i32,
    libc::SYS_bind as i32,
    libc::SYS_listen as i32,
    libc::SYS_accept as i32,
    libc::SYS_accept4 as i32,
    libc::SYS_sendto as i32,
    libc::SYS_recvfrom as i32,
    libc::SYS_sendmsg as i32,
    libc::SYS_recvmsg as i32,
    libc::SYS_getsockname as i32,
    libc::SYS_getpeername as i32,
    libc::SYS_setsockopt as i32,
    libc::SYS_getsockopt as i32,
    libc::SYS_shutdown as i32,
    libc::SYS_uname as i32,
];

/// The Node.js table, taken from the reference implementation's
/// `syscalls_amd64.go` (the absurd "allow every syscall 1..500" tail
/// present in that file is a debug leftover and is deliberately not
/// reproduced here — it would defeat the filter entirely).
pub const NODE_ALLOW: &[i32] = &[
    libc::SYS_open as i32,
    libc::SYS_write as i32,
    libc::SYS_close as i32,
    libc::SYS_read as i32,
    libc::SYS_openat as i32,
    libc::SYS_newfstatat as i32,
    libc::SYS_ioctl as i32,
    libc::SYS_lseek as i32,
    libc::SYS_fstat as i32,
    libc::SYS_stat as i32,
    libc::SYS_lstat as i32,
    libc::SYS_getdents64 as i32,
    libc::SYS_readlink as i32,
    libc::SYS_readlinkat as i32,
    libc::SYS_access as i32,
    libc::SYS_faccessat as i32,
    libc::SYS_mprotect as i32,
    libc::SYS_mmap as i32,
    libc::SYS_munmap as i32,
    libc::SYS_mremap as i32,
    libc::SYS_madvise as i32,
    libc::SYS_brk as i32,
    libc::SYS_rt_sigaction as i32,
    libc::SYS_rt_sigprocmask as i32,
    libc::SYS_sigaltstack as i32,
    libc::SYS_rt_sigreturn as i32,
    libc::SYS_getpid as i32,
    libc::SYS_getppid as i32,
    libc::SYS_gettid as i32,
    libc::SYS_getuid as i32,
    libc::SYS_getgid as i32,
    libc::SYS_setuid as i32,
    libc::SYS_setgid as i32,
    libc::SYS_exit as i32,
    libc::SYS_exit_group as i32,
    libc::SYS_tgkill as i32,
    libc::SYS_sched_yield as i32,
    libc::SYS_sched_getaffinity as i32,
    libc::SYS_futex as i32,
    libc::SYS_set_robust_list as i32,
    libc::SYS_get_robust_list as i32,
    334, // SYS_rseq — not named in every libc version
    libc::SYS_epoll_create1 as i32,
    libc::SYS_epoll_ctl as i32,
    libc::SYS_epoll_pwait as i32,
    libc::SYS_poll as i32,
    libc::SYS_ppoll as i32,
    libc::SYS_pselect6 as i32,
    libc::SYS_clock_gettime as i32,
    libc::SYS_gettimeofday as i32,
    libc::SYS_nanosleep as i32,
    libc::SYS_clock_nanosleep as i32,
    libc::SYS_time as i32,
    libc::SYS_fcntl as i32,
    libc::SYS_dup as i32,
    libc::SYS_dup2 as i32,
    libc::SYS_dup3 as i32,
    libc::SYS_pipe as i32,
    libc::SYS_pipe2 as i32,
    libc::SYS_getrandom as i32,
    libc::SYS_getcwd as i32,
    libc::SYS_chdir as i32,
    libc::SYS_umask as i32,
    libc::SYS_getrlimit as i32,
    libc::SYS_setrlimit as i32,
    libc::SYS_getrusage as i32,
    libc::SYS_times as i32,
    libc::SYS_uname as i32,
    libc::SYS_sysinfo as i32,
    libc::SYS_statfs as i32,
    libc::SYS_fstatfs as i32,
    libc::SYS_truncate as i32,
    libc::SYS_ftruncate as i32,
    libc::SYS_fsync as i32,
    libc::SYS_fdatasync as i32,
    libc::SYS_prctl as i32,
    libc::SYS_arch_prctl as i32,
    libc::SYS_getpgrp as i32,
    libc::SYS_getpgid as i32,
    libc::SYS_getsid as i32,
];

pub const NODE_ALLOW_WITH_ERRNO: &[i32] = &[
    libc::SYS_clone as i32,
    435, // SYS_clone3
    libc::SYS_mkdir as i32,
    libc::SYS_mkdirat as i32,
    libc::SYS_rmdir as i32,
    libc::SYS_unlink as i32,
    libc::SYS_unlinkat as i32,
    libc::SYS_rename as i32,
    libc::SYS_renameat as i32,
];

pub const NODE_ALLOW_NETWORK: &[i32] = &[
    libc::SYS_socket as i32,
    libc::SYS_socketpair as i32,
    libc::SYS_connect as i32,
    libc::SYS_bind as i32,
    libc::SYS_listen as i32,
    libc::SYS_accept as i32,
    libc::SYS_accept4 as i32,
    libc::SYS_sendto as i32,
    libc::SYS_recvfrom as i32,
    libc::SYS_sendmsg as i32,
    libc::SYS_recvmsg as i32,
    307, // SYS_sendmmsg
    libc::SYS_getsockname as i32,
    libc::SYS_getpeername as i32,
    libc::SYS_setsockopt as i32,
    libc::SYS_getsockopt as i32,
    libc::SYS_shutdown as i32,
    libc::SYS_uname as i32,
    libc::SYS_fcntl as i32,
    libc::SYS_fstatfs as i32,
];

/// Three disjoint sets of syscall numbers built for one language and
/// one request's network setting.
#[derive(Clone, Debug)]
pub struct SyscallPolicy {
    pub allow: BTreeSet<i32>,
    pub allow_with_errno: BTreeSet<i32>,
}

impl SyscallPolicy {
    /// Build the policy for `language`, unioning in `ALLOW_NETWORK` when
    /// `enable_network` is set and merging in any operator-provided
    /// extras from configuration. Extras are additive only: they may
    /// broaden the baseline but can never narrow it.
    pub fn build(language: Language, enable_network: bool, extra_allow: &[i32]) -> Self {
        let (base_allow, base_errno, base_network): (&[i32], &[i32], &[i32]) = match language {
            Language::Python => (PYTHON_ALLOW, PYTHON_ALLOW_WITH_ERRNO, PYTHON_ALLOW_NETWORK),
            Language::Node => (NODE_ALLOW, NODE_ALLOW_WITH_ERRNO, NODE_ALLOW_NETWORK),
        };

        let mut allow: BTreeSet<i32> = base_allow.iter().copied().collect();
        if enable_network {
            allow.extend(base_network.iter().copied());
        }
        allow.extend(extra_allow.iter().copied());

        Self {
            allow,
            allow_with_errno: base_errno.iter().copied().collect(),
        }
    }

    /// True iff no network syscall would be permitted by this policy.
    pub fn network_is_blocked(&self, language: Language) -> bool {
        let network_set: &[i32] = match language {
            Language::Python => PYTHON_ALLOW_NETWORK,
            Language::Node => NODE_ALLOW_NETWORK,
        };
        network_set.iter().all(|sc| !self.allow.contains(sc))
    }

    /// Install this policy as a seccomp-bpf filter on the *current*
    /// process. Must be called from inside the child, after
    /// `PR_SET_NO_NEW_PRIVS` and privilege drop, and before any user
    /// code runs — filters are append-only once sealed with
    /// `seccomp_load`, so there is no way to widen them afterward.
    pub fn apply(&self) -> Result<()> {
        unsafe {
            let ctx: scmp_filter_ctx = seccomp_init(SCMP_ACT_KILL_PROCESS);
            if ctx.is_null() {
                return Err(SandboxError::SeccompViolation(
                    "failed to initialize seccomp context".to_string(),
                ));
            }

            let result = (|| -> Result<()> {
                for &syscall in &self.allow {
                    if seccomp_rule_add(ctx, SCMP_ACT_ALLOW, syscall, 0) != 0 {
                        return Err(SandboxError::SeccompViolation(format!(
                            "failed to allow syscall {}",
                            syscall
                        )));
                    }
                }
                for &syscall in &self.allow_with_errno {
                    if seccomp_rule_add(ctx, SCMP_ACT_ERRNO(libc::EPERM as u16), syscall, 0) != 0 {
                        return Err(SandboxError::SeccompViolation(format!(
                            "failed to fake-EPERM syscall {}",
                            syscall
                        )));
                    }
                }
                if seccomp_load(ctx) != 0 {
                    return Err(SandboxError::SeccompViolation(
                        "failed to load seccomp filter into kernel".to_string(),
                    ));
                }
                Ok(())
            })();

            seccomp_release(ctx);
            result
        }
    }
}

/// Parse the `ALLOWED_SYSCALLS` configuration extra list (comma-separated
/// syscall numbers, matching the reference implementation's env-var
/// format) into numeric syscall numbers.
pub fn parse_extra_syscalls(values: &[String]) -> Vec<i32> {
    values.iter().filter_map(|s| s.trim().parse::<i32>().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_syscalls_excluded_by_default() {
        let policy = SyscallPolicy::build(Language::Python, false, &[]);
        assert!(policy.network_is_blocked(Language::Python));
        assert!(!policy.allow.contains(&(libc::SYS_socket as i32)));
    }

    #[test]
    fn network_syscalls_included_when_enabled() {
        let policy = SyscallPolicy::build(Language::Python, true, &[]);
        assert!(!policy.network_is_blocked(Language::Python));
        assert!(policy.allow.contains(&(libc::SYS_socket as i32)));
    }

    #[test]
    fn extras_only_broaden_never_narrow() {
        let baseline = SyscallPolicy::build(Language::Node, false, &[]);
        let widened = SyscallPolicy::build(Language::Node, false, &[9999]);
        assert!(widened.allow.is_superset(&baseline.allow));
        assert!(widened.allow.contains(&9999));
    }

    #[test]
    fn fake_errno_set_is_disjoint_from_allow() {
        let policy = SyscallPolicy::build(Language::Python, true, &[]);
        assert!(policy.allow.is_disjoint(&policy.allow_with_errno));
    }

    #[test]
    fn parses_comma_separated_extras() {
        let extras = parse_extra_syscalls(&["1".to_string(), "2".to_string(), "x".to_string()]);
        assert_eq!(extras, vec![1, 2]);
    }
}
