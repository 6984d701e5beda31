/// Language Runner: the polymorphic seam between a `RunRequest` and the
/// staging/prelude/process-runner pipeline that actually executes it.
///
/// A closed two-variant enum dispatch rather than a trait object: the
/// set of supported interpreters is fixed by the external tool surface
/// (`run_python_code`, `run_nodejs_code`), so there is no need to pay
/// for dynamic dispatch or open the door to a third implementation that
/// would need its own security review to land safely.
use crate::config::SandboxConfig;
use crate::namespace::NamespaceIsolation;
use crate::prelude;
use crate::process_runner::{self, IsolationSpec};
use crate::stager;
use crate::syscall_policy::SyscallPolicy;
use crate::types::{Language, Result, RunRequest, RunResult, SandboxError};
use std::io::Write;
use std::sync::Arc;

/// Compiled-in unprivileged identity every sandboxed child runs as,
/// equivalent to the conventional `nobody`/`nogroup` pair. Never
/// configurable: a sandbox whose execution identity is attacker- or
/// operator-controlled stops being a sandbox.
const SANDBOX_UID: u32 = 65534;
const SANDBOX_GID: u32 = 65534;

/// Namespaces unshared for every sandboxed child. User namespace is
/// deliberately excluded: combining a user namespace with the
/// `setuid`/`setgid` drop below needs a uid/gid mapping step first, and
/// the mount+pid+net+ipc+uts set already satisfies every isolation
/// invariant this service makes. The net namespace is left unshared
/// when a request asks for network access, since a private net
/// namespace has no route to the outside world without additional
/// plumbing this service doesn't provide.
fn namespaces_for(enable_network: bool) -> NamespaceIsolation {
    let base = NamespaceIsolation::new(true, true, true, false, true, true);
    if enable_network {
        base.without_network_namespace()
    } else {
        base
    }
}

/// Runs one `RunRequest` end to end: stage a root, render the prelude,
/// exec the interpreter under isolation, and return its result.
pub fn run(config: &Arc<SandboxConfig>, request: &RunRequest) -> Result<RunResult> {
    match request.language {
        Language::Python => run_python(config, request),
        Language::Node => run_node(config, request),
    }
}

fn run_python(config: &Arc<SandboxConfig>, request: &RunRequest) -> Result<RunResult> {
    let mut required_paths = config.python.lib_paths.clone();
    required_paths.push(config.python.path.clone());

    let staged = stager::stage(Language::Python.as_str(), &required_paths)?;
    let scratch = staged.scratch_dir(Language::Python.as_str());

    let mut full_source = request.preload.clone();
    if !full_source.is_empty() {
        full_source.push(b'\n');
    }
    full_source.extend_from_slice(&request.source_code);

    let script_bytes = prelude::render_python_script(&full_source);
    let script_path = scratch.join("main.py");
    write_script(&script_path, &script_bytes)?;

    let relative_script = script_path
        .strip_prefix(staged.path())
        .unwrap_or(&script_path)
        .to_path_buf();
    let staged_script = std::path::Path::new("/").join(relative_script);

    let extra_syscalls = crate::syscall_policy::parse_extra_syscalls(&config.security.allowed_syscalls);
    let policy = SyscallPolicy::build(Language::Python, request.options.enable_network, &extra_syscalls);

    let isolation = IsolationSpec {
        staged_root: staged.path().to_path_buf(),
        namespaces: namespaces_for(request.options.enable_network),
        uid: SANDBOX_UID,
        gid: SANDBOX_GID,
        policy: Some(policy),
    };

    let program = config.python.path.clone();
    let args = vec![staged_script.to_string_lossy().into_owned()];
    let env = vec![("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string())];

    let result = process_runner::spawn_and_wait(&program, &args, &env, &isolation, request.deadline);
    staged.unstage()?;
    result
}

fn run_node(config: &Arc<SandboxConfig>, request: &RunRequest) -> Result<RunResult> {
    let mut required_paths = config.node.lib_paths.clone();
    required_paths.push(config.node.path.clone());

    let staged = stager::stage(Language::Node.as_str(), &required_paths)?;
    let scratch = staged.scratch_dir(Language::Node.as_str());

    let mut full_source = request.preload.clone();
    if !full_source.is_empty() {
        full_source.push(b'\n');
    }
    full_source.extend_from_slice(&request.source_code);

    let script_bytes = prelude::render_node_script(&full_source);
    let script_path = scratch.join("main.js");
    write_script(&script_path, &script_bytes)?;

    let relative_script = script_path
        .strip_prefix(staged.path())
        .unwrap_or(&script_path)
        .to_path_buf();
    let staged_script = std::path::Path::new("/").join(relative_script);

    let extra_syscalls = crate::syscall_policy::parse_extra_syscalls(&config.security.allowed_syscalls);
    let policy = if config.honour_nodejs_seccomp_disable() {
        log::warn!("seccomp filtering disabled for this node.js run via the non-production escape hatch");
        None
    } else {
        Some(SyscallPolicy::build(Language::Node, request.options.enable_network, &extra_syscalls))
    };

    let isolation = IsolationSpec {
        staged_root: staged.path().to_path_buf(),
        namespaces: namespaces_for(request.options.enable_network),
        uid: SANDBOX_UID,
        gid: SANDBOX_GID,
        policy,
    };

    let program = config.node.path.clone();
    let args = vec![staged_script.to_string_lossy().into_owned()];
    let env = vec![("NODE_PATH".to_string(), "/sandbox/nodejs/lib".to_string())];

    let result = process_runner::spawn_and_wait(&program, &args, &env, &isolation, request.deadline);
    staged.unstage()?;
    result
}

fn write_script(path: &std::path::Path, bytes: &[u8]) -> Result<()> {
    let mut file = std::fs::File::create(path).map_err(SandboxError::Io)?;
    file.write_all(bytes).map_err(SandboxError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_namespaces_exclude_user_namespace_but_include_pid() {
        let namespaces = namespaces_for(false);
        assert_eq!(
            namespaces.get_enabled_namespaces(),
            vec!["PID", "Mount", "Network", "IPC", "UTS"]
        );
    }

    #[test]
    fn network_enabled_request_drops_network_namespace_only() {
        let namespaces = namespaces_for(true);
        assert_eq!(
            namespaces.get_enabled_namespaces(),
            vec!["PID", "Mount", "IPC", "UTS"]
        );
    }
}
