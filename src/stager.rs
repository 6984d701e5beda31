/// Filesystem Stager: builds a throw-away directory tree that becomes
/// the child's filesystem root, and guarantees it leaves nothing behind.
///
/// Grounded on the teacher's chroot-jail setup in its old filesystem
/// module, generalized from a fixed directory skeleton to an arbitrary
/// `required_paths` list per the staged-root contract.
use crate::types::{Result, SandboxError};
use std::fs;
use std::path::{Path, PathBuf};

/// A staged, throw-away filesystem root for exactly one request.
/// Dropping (or calling `unstage`) removes it unconditionally.
pub struct StagedRoot {
    root: PathBuf,
    torn_down: bool,
}

impl StagedRoot {
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// The single writable scratch directory for this language, where
    /// the prelude + encoded user code is written.
    pub fn scratch_dir(&self, lang: &str) -> PathBuf {
        self.root.join("sandbox").join(lang).join("scratch")
    }

    /// Idempotent: safe to call more than once, and safe to call after
    /// the directory is already gone.
    pub fn unstage(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SandboxError::Io(e)),
        }
    }
}

impl Drop for StagedRoot {
    fn drop(&mut self) {
        // Unconditional teardown on every exit path: success, timeout,
        // crash, or dispatcher cancellation all drop this value.
        let _ = self.teardown();
    }
}

/// Stage a fresh root under the system temp dir containing a read-only
/// copy of every path in `required_paths`, plus one writable scratch
/// subdirectory for `lang`. Fails with `FsMissing` if any required path
/// does not exist on the host; partial trees are never left behind.
pub fn stage(lang: &str, required_paths: &[String]) -> Result<StagedRoot> {
    let root = std::env::temp_dir().join(format!(
        "sandboxd-{}-{:x}",
        lang,
        fastrand::u64(..)
    ));

    match stage_into(&root, lang, required_paths) {
        Ok(()) => Ok(StagedRoot {
            root,
            torn_down: false,
        }),
        Err(e) => {
            let _ = fs::remove_dir_all(&root);
            Err(e)
        }
    }
}

fn stage_into(root: &Path, lang: &str, required_paths: &[String]) -> Result<()> {
    fs::create_dir_all(root)?;

    for required in required_paths {
        let host_path = Path::new(required);
        if !host_path.exists() {
            return Err(SandboxError::FsMissing(required.clone()));
        }

        let relative = host_path.strip_prefix("/").unwrap_or(host_path);
        let staged_path = root.join(relative);

        if host_path.is_dir() {
            copy_dir_recursive(host_path, &staged_path)?;
        } else {
            if let Some(parent) = staged_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(host_path, &staged_path)?;
        }
    }

    let scratch = root.join("sandbox").join(lang).join("scratch");
    fs::create_dir_all(&scratch)?;

    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dst_path = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &dst_path)?;
        } else if file_type.is_symlink() {
            if let Ok(target) = fs::read_link(entry.path()) {
                #[cfg(unix)]
                let _ = std::os::unix::fs::symlink(target, &dst_path);
            }
        } else {
            fs::copy(entry.path(), &dst_path)?;
        }
    }
    Ok(())
}

/// List every path under `root`, relative to `root`, for invariant
/// checks (`no path outside required_paths is visible`).
pub fn list_staged_paths(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    list_into(root, root, &mut out)?;
    Ok(out)
}

fn list_into(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        out.push(path.strip_prefix(root).unwrap().to_path_buf());
        if entry.file_type()?.is_dir() {
            list_into(root, &path, out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn stage_copies_required_files_and_creates_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("etc-fake-hosts");
        let mut f = fs::File::create(&src).unwrap();
        writeln!(f, "127.0.0.1 localhost").unwrap();

        let required = vec![src.to_string_lossy().to_string()];
        let staged = stage("python", &required).unwrap();

        let staged_file = staged.path().join(src.strip_prefix("/").unwrap_or(&src));
        assert!(staged_file.exists());
        assert!(staged.scratch_dir("python").exists());

        let root_path = staged.path().to_path_buf();
        staged.unstage().unwrap();
        assert!(!root_path.exists());
    }

    #[test]
    fn stage_fails_and_cleans_up_on_missing_path() {
        let required = vec!["/this/path/does/not/exist/anywhere".to_string()];
        let result = stage("python", &required);
        assert!(matches!(result, Err(SandboxError::FsMissing(_))));
    }

    #[test]
    fn unstage_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("file");
        fs::File::create(&src).unwrap();
        let required = vec![src.to_string_lossy().to_string()];
        let staged = stage("node", &required).unwrap();
        let root_path = staged.path().to_path_buf();
        drop(staged);
        assert!(!root_path.exists());
        // Dropping again (simulated) must not panic or error.
        let _ = fs::remove_dir_all(&root_path);
    }

    #[test]
    fn concurrent_stages_get_disjoint_roots() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("file");
        fs::File::create(&src).unwrap();
        let required = vec![src.to_string_lossy().to_string()];
        let a = stage("python", &required).unwrap();
        let b = stage("python", &required).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
