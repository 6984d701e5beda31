/// Output Capture: reads a child's stdout/stderr pipes on dedicated
/// threads, splits each stream at the Prescript Prelude's sentinel line,
/// and applies a backpressure cap that truncates rather than kills.
///
/// Grounded on the teacher's old io_handler reader-thread-per-pipe
/// pattern, generalized with sentinel framing (text before the sentinel
/// is prelude diagnostic output, text after is the user program's own)
/// and a hard cap on buffered bytes per stream.
use crate::prelude::SENTINEL;
use std::io::Read;
use std::thread;

/// Upper bound on buffered bytes per stream before truncation kicks in.
pub const MAX_CAPTURED_BYTES: usize = 1024 * 1024;

const TRUNCATION_MARKER: &str = "\n...[output truncated]\n";

/// Everything captured from one child's stdout+stderr, already split at
/// the sentinel and truncated to the backpressure cap.
#[derive(Debug, Default, Clone)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

struct StreamReader {
    handle: thread::JoinHandle<(Vec<u8>, bool)>,
}

fn spawn_reader<R: Read + Send + 'static>(mut stream: R) -> StreamReader {
    let handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        let mut truncated = false;
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if buf.len() + n > MAX_CAPTURED_BYTES {
                        let remaining = MAX_CAPTURED_BYTES.saturating_sub(buf.len());
                        buf.extend_from_slice(&chunk[..remaining.min(n)]);
                        truncated = true;
                        // Keep draining so the child never blocks on a full pipe,
                        // but stop accumulating once the cap is hit.
                        while stream.read(&mut chunk).map(|n| n > 0).unwrap_or(false) {}
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                Err(_) => break,
            }
        }
        (buf, truncated)
    });
    StreamReader { handle }
}

/// Split raw stdout bytes at the first sentinel line: everything before
/// it is prelude diagnostic output and gets folded into `stderr`,
/// everything after is the user program's own stdout.
fn split_at_sentinel(raw: Vec<u8>) -> (String, String) {
    let text = String::from_utf8_lossy(&raw).into_owned();
    match text.find(SENTINEL) {
        Some(idx) => {
            let before = &text[..idx];
            let after_start = idx + SENTINEL.len();
            let after = text[after_start..].trim_start_matches(['\n', '\r']);
            (before.to_string(), after.to_string())
        }
        None => {
            // Sentinel never arrived: the child died before the prelude
            // finished starting up. Treat everything as diagnostic.
            (text, String::new())
        }
    }
}

/// Spawn reader threads for both pipes. Returns a handle whose `join`
/// blocks until both streams hit EOF (i.e. the child has exited and
/// closed its descriptors).
pub struct OutputCapture {
    stdout_reader: StreamReader,
    stderr_reader: StreamReader,
}

impl OutputCapture {
    pub fn spawn<O, E>(stdout: O, stderr: E) -> Self
    where
        O: Read + Send + 'static,
        E: Read + Send + 'static,
    {
        Self {
            stdout_reader: spawn_reader(stdout),
            stderr_reader: spawn_reader(stderr),
        }
    }

    /// Block until both streams are fully drained and return the
    /// framed, truncation-capped result.
    pub fn join(self) -> CapturedOutput {
        let (stdout_raw, stdout_truncated) =
            self.stdout_reader.handle.join().unwrap_or_default();
        let (stderr_raw, stderr_truncated) =
            self.stderr_reader.handle.join().unwrap_or_default();

        let (prelude_diagnostic, user_stdout) = split_at_sentinel(stdout_raw);
        let mut stderr = String::from_utf8_lossy(&stderr_raw).into_owned();
        if !prelude_diagnostic.is_empty() {
            stderr = format!("{}{}", prelude_diagnostic, stderr);
        }

        let mut stdout = user_stdout;
        if stdout_truncated {
            stdout.push_str(TRUNCATION_MARKER);
        }
        if stderr_truncated {
            stderr.push_str(TRUNCATION_MARKER);
        }

        CapturedOutput {
            stdout,
            stderr,
            stdout_truncated,
            stderr_truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn splits_diagnostic_from_user_output_at_sentinel() {
        let raw = format!("booting up\n{}\nhello from user code\n", SENTINEL).into_bytes();
        let (before, after) = split_at_sentinel(raw);
        assert_eq!(before, "booting up\n");
        assert_eq!(after, "hello from user code\n");
    }

    #[test]
    fn missing_sentinel_treats_everything_as_diagnostic() {
        let raw = b"crashed before prelude finished".to_vec();
        let (before, after) = split_at_sentinel(raw);
        assert_eq!(before, "crashed before prelude finished");
        assert!(after.is_empty());
    }

    #[test]
    fn capture_joins_both_streams_and_frames_output() {
        let stdout = Cursor::new(format!("{}\nresult: 42\n", SENTINEL).into_bytes());
        let stderr = Cursor::new(b"warning: deprecated\n".to_vec());
        let capture = OutputCapture::spawn(stdout, stderr);
        let result = capture.join();
        assert_eq!(result.stdout, "result: 42\n");
        assert!(result.stderr.contains("warning: deprecated"));
        assert!(!result.stdout_truncated);
    }

    #[test]
    fn oversized_stream_is_truncated_not_dropped_entirely() {
        let huge = vec![b'x'; MAX_CAPTURED_BYTES + 4096];
        let mut with_sentinel = SENTINEL.as_bytes().to_vec();
        with_sentinel.push(b'\n');
        with_sentinel.extend(huge);
        let stdout = Cursor::new(with_sentinel);
        let stderr = Cursor::new(Vec::new());
        let capture = OutputCapture::spawn(stdout, stderr);
        let result = capture.join();
        assert!(result.stdout_truncated);
        assert!(result.stdout.contains("truncated"));
    }
}
