//! Process-wide output buffer mirrored into the UI.
//!
//! Everything the pipeline reports goes through [`log`]: the message is sent to
//! the console via `tracing` and appended to a single shared buffer that the
//! GUI renders in its output pane.
//!
//! Each logged line is stored as its trimmed parts separated by spaces and
//! terminated with `"  \n"` (a markdown hard line break).

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::info;

/// Line terminator appended after every logged line.
const LINE_BREAK: &str = "  \n";

static OUTPUT: OutputBuffer = OutputBuffer::new();

/// Returns the process-wide output buffer.
pub fn global() -> &'static OutputBuffer {
    &OUTPUT
}

/// Logs a message to the console and mirrors it into the global buffer.
pub fn log<I, T>(parts: I)
where
    I: IntoIterator<Item = T>,
    T: Display,
{
    let parts: Vec<String> = parts.into_iter().map(|p| p.to_string()).collect();
    info!(target: "patcher::output", "{}", parts.join(" "));
    OUTPUT.push(&parts);
}

/// Logs a single line (convenience for subprocess output).
pub fn log_line(line: &str) {
    log([line]);
}

/// Formats each argument with `Display` and passes them to [`log`].
#[macro_export]
macro_rules! plog {
    ($($arg:expr),+ $(,)?) => {
        $crate::output::log([$(::std::string::ToString::to_string(&$arg)),+])
    };
}

/// Accumulated pipeline output.
#[derive(Debug)]
pub struct OutputBuffer {
    text: Mutex<String>,
    generation: AtomicU64,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBuffer {
    /// Creates an empty buffer.
    pub const fn new() -> Self {
        Self {
            text: Mutex::new(String::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Appends one line built from `parts`.
    pub fn push<T: Display>(&self, parts: &[T]) {
        let mut text = self.lock();
        for part in parts {
            text.push_str(part.to_string().trim());
            text.push(' ');
        }
        text.push_str(LINE_BREAK);
        drop(text);
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Empties the buffer.
    pub fn clear(&self) {
        self.lock().clear();
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Returns a copy of the current contents.
    pub fn snapshot(&self) -> String {
        self.lock().clone()
    }

    /// Monotonic counter bumped on every change.
    ///
    /// Readers compare it against the last value they saw to skip copying an
    /// unchanged buffer.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        // A panic while holding the lock leaves a valid String behind.
        self.text.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_trims_parts_and_adds_line_break() {
        let buf = OutputBuffer::new();
        buf.push(&["  redirecting to ", "https://example.com\n"]);

        assert_eq!(
            buf.snapshot(),
            "redirecting to https://example.com   \n"
        );
    }

    #[test]
    fn test_push_accumulates_lines() {
        let buf = OutputBuffer::new();
        buf.push(&["first"]);
        buf.push(&["second"]);

        assert_eq!(buf.snapshot(), "first   \nsecond   \n");
    }

    #[test]
    fn test_clear_empties_buffer() {
        let buf = OutputBuffer::new();
        buf.push(&["something"]);
        assert!(!buf.is_empty());

        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.snapshot(), "");
    }

    #[test]
    fn test_generation_increases_on_change() {
        let buf = OutputBuffer::new();
        let start = buf.generation();

        buf.push(&["a"]);
        let after_push = buf.generation();
        assert!(after_push > start);

        buf.clear();
        assert!(buf.generation() > after_push);
    }

    #[test]
    fn test_push_accepts_display_values() {
        let buf = OutputBuffer::new();
        buf.push(&[42, 7]);
        assert_eq!(buf.snapshot(), "42 7   \n");
    }

    #[test]
    fn test_global_log_appends() {
        let before = global().generation();
        log(["hello", "world"]);
        // Other tests share the global buffer, so only the counter is stable.
        assert!(global().generation() > before);
    }
}
