/// Seccomp filter tests that exercise the real kernel filter. These
/// require a Linux host with `CAP_SYS_ADMIN` (or an unprivileged
/// seccomp-capable kernel) and are skipped by default, matching the
/// teacher's convention of `#[ignore]`-gating privileged tests.
use sandboxd::syscall_policy::SyscallPolicy;
use sandboxd::types::Language;

#[test]
#[ignore]
fn applying_a_policy_in_a_forked_child_does_not_crash_the_test_process() {
    let policy = SyscallPolicy::build(Language::Python, false, &[]);

    match unsafe { nix::unistd::fork() } {
        Ok(nix::unistd::ForkResult::Child) => {
            let _ = policy.apply();
            std::process::exit(0);
        }
        Ok(nix::unistd::ForkResult::Parent { child }) => {
            let status = nix::sys::wait::waitpid(child, None);
            assert!(status.is_ok());
        }
        Err(e) => panic!("fork failed: {}", e),
    }
}

#[test]
fn policy_tables_never_allow_a_raw_execve() {
    let python = SyscallPolicy::build(Language::Python, true, &[]);
    let node = SyscallPolicy::build(Language::Node, true, &[]);
    assert!(!python.allow.contains(&(libc::SYS_execve as i32)));
    assert!(!node.allow.contains(&(libc::SYS_execve as i32)));
    assert!(!python.allow_with_errno.contains(&(libc::SYS_execve as i32)));
    assert!(!node.allow_with_errno.contains(&(libc::SYS_execve as i32)));
}
