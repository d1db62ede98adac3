//! Platform clipboard collaborator, driven through the platform's clipboard commands.
//! No shell is used; text is passed over stdin/stdout.

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};

/// Read and write the system clipboard.
pub trait Clipboard: Send + Sync {
    fn read(&self) -> Result<String>;
    fn write(&self, text: &str) -> Result<()>;
}

/// Program + args used for one clipboard direction.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ClipboardCommand {
    program: &'static str,
    args: &'static [&'static str],
}

const fn cmd(program: &'static str, args: &'static [&'static str]) -> ClipboardCommand {
    ClipboardCommand { program, args }
}

/// The clipboard of the machine amo runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    fn backend() -> Result<(ClipboardCommand, ClipboardCommand)> {
        if cfg!(target_os = "macos") {
            return Ok((cmd("pbpaste", &[]), cmd("pbcopy", &[])));
        }
        if cfg!(windows) {
            return Ok((
                cmd("powershell", &["-NoProfile", "-Command", "Get-Clipboard -Raw"]),
                cmd(
                    "powershell",
                    &["-NoProfile", "-Command", "$input | Out-String | Set-Clipboard"],
                ),
            ));
        }
        let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
        let candidates = [
            (
                wayland,
                cmd("wl-paste", &["--no-newline"]),
                cmd("wl-copy", &[]),
            ),
            (
                true,
                cmd("xclip", &["-selection", "clipboard", "-o"]),
                cmd("xclip", &["-selection", "clipboard", "-i"]),
            ),
            (
                true,
                cmd("xsel", &["--clipboard", "--output"]),
                cmd("xsel", &["--clipboard", "--input"]),
            ),
        ];
        for (usable, read, write) in candidates {
            if usable && which::which(read.program).is_ok() {
                return Ok((read, write));
            }
        }
        bail!("no clipboard utility found (install wl-clipboard, xclip, or xsel)")
    }
}

impl Clipboard for SystemClipboard {
    fn read(&self) -> Result<String> {
        let (read, _) = Self::backend()?;
        let output = Command::new(read.program)
            .args(read.args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("running {}", read.program))?;
        if !output.status.success() {
            bail!(
                "{} failed: {}",
                read.program,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn write(&self, text: &str) -> Result<()> {
        let (_, write) = Self::backend()?;
        let mut child = Command::new(write.program)
            .args(write.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("running {}", write.program))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .with_context(|| format!("writing to {}", write.program))?;
        }
        let output = child
            .wait_with_output()
            .with_context(|| format!("waiting for {}", write.program))?;
        if !output.status.success() {
            bail!(
                "{} failed: {}",
                write.program,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// In-process clipboard, for headless runs and tests.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    text: std::sync::Mutex<Option<String>>,
}

impl MemoryClipboard {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: std::sync::Mutex::new(Some(text.into())),
        }
    }
}

impl Clipboard for MemoryClipboard {
    fn read(&self) -> Result<String> {
        let guard = self.text.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(t) => Ok(t.clone()),
            None => bail!("clipboard is empty"),
        }
    }

    fn write(&self, text: &str) -> Result<()> {
        let mut guard = self.text.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(text.to_string());
        Ok(())
    }
}
