//! Coalescing of raw subprocess output into a stable line-oriented log.
//!
//! Network operations interleave newline-terminated lines with
//! carriage-return progress updates ("Receiving objects:  50%\r"). The
//! coalescer keeps one open tail line: a `\r` marks it for overwrite, so the
//! next progress chunk replaces it instead of appending, while `\n` commits
//! the line and resets the cursor.

/// Accumulated output log for one streamed operation.
pub struct ProgressCoalescer {
    /// Committed lines plus the open tail line (always at least one entry).
    lines: Vec<String>,
    /// The tail line was terminated by `\r`; the next visible character
    /// replaces it.
    overwrite: bool,
}

impl ProgressCoalescer {
    pub fn new() -> Self {
        Self {
            lines: vec![String::new()],
            overwrite: false,
        }
    }

    /// Consume one raw chunk. Returns whether visible content changed.
    pub fn feed(&mut self, chunk: &str) -> bool {
        let mut changed = false;
        for c in chunk.chars() {
            match c {
                '\n' => {
                    self.lines.push(String::new());
                    self.overwrite = false;
                    changed = true;
                }
                '\r' => {
                    self.overwrite = true;
                }
                c => {
                    if self.overwrite {
                        if let Some(tail) = self.lines.last_mut() {
                            tail.clear();
                        }
                        self.overwrite = false;
                    }
                    if let Some(tail) = self.lines.last_mut() {
                        tail.push(c);
                    }
                    changed = true;
                }
            }
        }
        changed
    }

    /// Render the full accumulated log. Consumers replace their buffer with
    /// this wholesale; there is no incremental patch form.
    pub fn snapshot(&self) -> String {
        self.lines.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.lines.len() == 1 && self.lines[0].is_empty()
    }
}

impl Default for ProgressCoalescer {
    fn default() -> Self {
        Self::new()
    }
}
