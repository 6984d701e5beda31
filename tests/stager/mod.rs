/// Integration-level checks for the filesystem stager's "no path
/// outside required_paths is visible" invariant.
use sandboxd::stager::{list_staged_paths, stage};
use std::fs;

#[test]
fn staged_root_contains_only_required_paths_and_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let required_file = dir.path().join("allowed.txt");
    fs::write(&required_file, b"hello").unwrap();

    let required = vec![required_file.to_string_lossy().to_string()];
    let staged = stage("python", &required).unwrap();

    let paths = list_staged_paths(staged.path()).unwrap();
    let relative_required = required_file.strip_prefix("/").unwrap_or(&required_file);
    assert!(paths.iter().any(|p| p == relative_required));
    assert!(paths.iter().any(|p| p.ends_with("scratch")));

    staged.unstage().unwrap();
}

#[test]
fn unstage_leaves_no_trace_on_the_host() {
    let dir = tempfile::tempdir().unwrap();
    let required_file = dir.path().join("f");
    fs::write(&required_file, b"x").unwrap();
    let required = vec![required_file.to_string_lossy().to_string()];

    let staged = stage("node", &required).unwrap();
    let root = staged.path().to_path_buf();
    assert!(root.exists());
    staged.unstage().unwrap();
    assert!(!root.exists());
}
