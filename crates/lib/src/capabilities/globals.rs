//! Script globals: `getVar` and `console`.

use std::io::Write;
use std::sync::Mutex;

use crate::vars::RuntimeVariables;

/// `getVar(key)`: the runtime variable, or `""` when unset.
pub fn get_var<'a>(vars: &'a RuntimeVariables, key: &str) -> &'a str {
    vars.get(key)
}

/// Output stream a console line went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Destination for `console.log/error/warn`.
pub trait Console: Send + Sync {
    fn write_line(&self, stream: Stream, line: &str);

    fn log(&self, line: &str) {
        self.write_line(Stream::Stdout, line);
    }

    fn error(&self, line: &str) {
        self.write_line(Stream::Stderr, line);
    }

    fn warn(&self, line: &str) {
        self.write_line(Stream::Stderr, &format!("WARNING: {}", line));
    }
}

/// The process's stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn write_line(&self, stream: Stream, line: &str) {
        // Broken pipes are ignored; the script keeps running.
        let _ = match stream {
            Stream::Stdout => writeln!(std::io::stdout().lock(), "{}", line),
            Stream::Stderr => writeln!(std::io::stderr().lock(), "{}", line),
        };
    }
}

/// Captures console lines in memory.
#[derive(Debug, Default)]
pub struct MemoryConsole {
    lines: Mutex<Vec<(Stream, String)>>,
}

impl MemoryConsole {
    pub fn lines(&self) -> Vec<(Stream, String)> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Lines written to `stream`, in order.
    pub fn stream(&self, stream: Stream) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, l)| l)
            .collect()
    }

    pub fn stdout(&self) -> Vec<String> {
        self.stream(Stream::Stdout)
    }

    pub fn stderr(&self) -> Vec<String> {
        self.stream(Stream::Stderr)
    }
}

impl Console for MemoryConsole {
    fn write_line(&self, stream: Stream, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((stream, line.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warn_is_prefixed_and_goes_to_stderr() {
        let console = MemoryConsole::default();
        console.log("out");
        console.warn("careful");
        console.error("bad");
        assert_eq!(console.stdout(), ["out"]);
        assert_eq!(console.stderr(), ["WARNING: careful", "bad"]);
    }

    #[test]
    fn get_var_defaults_to_empty() {
        let vars: RuntimeVariables = [("name", "amo")].into_iter().collect();
        assert_eq!(get_var(&vars, "name"), "amo");
        assert_eq!(get_var(&vars, "missing"), "");
    }
}
