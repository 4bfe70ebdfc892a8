//! Ring buffer of recent child output, kept for failure diagnostics.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Maximum number of lines kept per child.
pub const MAX_DIAGNOSTIC_LINES: usize = 200;

/// Lines attached to a start or spawn failure.
pub const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// Recent stderr lines of one child process.
#[derive(Debug)]
pub struct DiagnosticsBuffer {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl DiagnosticsBuffer {
    pub fn new() -> Self {
        Self::with_capacity(MAX_DIAGNOSTIC_LINES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Add a line, removing the oldest if at capacity.
    pub fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() >= self.capacity {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }

    /// The last `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| {
                let skip = lines.len().saturating_sub(n);
                lines.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().map(|lines| lines.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DiagnosticsBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_newest_lines() {
        let buffer = DiagnosticsBuffer::with_capacity(3);
        for i in 0..5 {
            buffer.push(format!("line {i}"));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.tail(2), vec!["line 3", "line 4"]);
        assert_eq!(buffer.tail(10), vec!["line 2", "line 3", "line 4"]);
    }
}
