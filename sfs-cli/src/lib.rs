//! Small helpers shared by the `mkfs` and `sfsdebug` binaries: consistent
//! error reporting and a yes/no confirmation prompt.

use std::fmt;
use std::io::{self, BufRead, Write};
use std::process::exit;

/// Writes `{bin}: error: {msg}` to stderr, then exits with status 1.
pub fn error<M: fmt::Display>(bin: &str, msg: M) -> ! {
    eprintln!("{bin}: error: {msg}");
    exit(1);
}

/// Shows `prompt`, reads a line from stdin, and returns it (trimmed of its
/// trailing newline), or `None` on EOF.
pub fn prompt(prompt: &str) -> Option<String> {
    print!("{prompt}");
    let _ = io::stdout().flush();
    io::stdin().lock().lines().next()?.ok()
}

/// Shows `prompt` and returns whether the reply (case-insensitively) was
/// `y` or `yes`.
pub fn confirm(prompt_text: &str) -> bool {
    prompt(prompt_text)
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "y" | "yes"))
        .unwrap_or(false)
}
