/// CLI smoke tests driven through the compiled binary, matching the
/// teacher's use of `assert_cmd` for process-level behavior.
use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn run_once_without_a_language_flag_is_a_usage_error() {
    let mut cmd = Command::cargo_bin("sandboxd").unwrap();
    cmd.arg("run-once");
    cmd.assert().failure().stderr(predicate::str::contains("required"));
}

#[test]
#[ignore]
fn run_once_executes_trivial_python_end_to_end() {
    // Needs root (chroot + setuid) and a real python3/staged lib_paths
    // on the host; exercised manually or in a privileged CI runner.
    let mut cmd = Command::cargo_bin("sandboxd").unwrap();
    cmd.args(["run-once", "--language", "python"]);
    cmd.write_stdin("print('hello from sandboxd')\n");
    cmd.assert().success().stdout(predicate::str::contains("hello from sandboxd"));
}
