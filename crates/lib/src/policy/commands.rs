//! Command whitelist: the set of bare command names workflows may execute.
//!
//! Matching is on the base name only, so `/usr/bin/echo` and `echo` are the same command.
//! An empty whitelist denies everything.

use anyhow::Result;
use std::path::Path;

use super::listfile;
use super::PolicyError;

const HEADER: &str = "\
# Allowed CLI commands for workflows - one per line
#
# Workflows may only execute commands listed here (matched by base name).
# An empty list denies all command execution.
#
# This is not the tool installer's list: only add commands that workflows
# need to run directly.
";

/// Template written by `amo init` when no whitelist exists yet.
pub const DEFAULT_TEMPLATE: &str = "\
# Allowed CLI commands for workflows - one per line
#
# Workflows may only execute commands listed here (matched by base name).
# An empty list denies all command execution.
#
# Basic system commands
echo
#
# Media processing
ffmpeg
#
# Image processing
magick
convert
#
# Document conversion
ebook-convert
gs
pandoc
#
# OCR and text extraction
surya_ocr
doc-to-text
#
# LLM tools
llm-caller
#
# Add your own commands below:
";

/// Ordered set of allowed command base names.
#[derive(Debug, Clone, Default)]
pub struct CommandWhitelist {
    commands: Vec<String>,
}

impl CommandWhitelist {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::default();
        for c in commands {
            let c = c.into();
            let c = c.trim();
            if !c.is_empty() && !list.contains(c) {
                list.commands.push(c.to_string());
            }
        }
        list
    }

    /// Read the whitelist file. Missing file => empty (deny all).
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(listfile::read_entries(path)?))
    }

    pub fn entries(&self) -> &[String] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn contains(&self, name: &str) -> bool {
        self.commands.iter().any(|c| c == name)
    }

    /// Allow `name` if its base name is listed.
    pub fn check(&self, name: &str) -> Result<(), PolicyError> {
        let base = base_name(name);
        if base.is_empty() || !self.contains(base) {
            return Err(PolicyError::CommandNotAllowed {
                command: name.to_string(),
                base: base.to_string(),
            });
        }
        Ok(())
    }

    /// Add a command. Entries must be bare names.
    pub fn add(&mut self, name: &str) -> Result<(), PolicyError> {
        let name = validate_entry(name)?;
        if self.contains(name) {
            return Err(PolicyError::AlreadyListed(name.to_string()));
        }
        self.commands.push(name.to_string());
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<(), PolicyError> {
        let name = name.trim();
        let before = self.commands.len();
        self.commands.retain(|c| c != name);
        if self.commands.len() == before {
            return Err(PolicyError::NotListed(name.to_string()));
        }
        Ok(())
    }

    /// Rewrite the whitelist file with a comment header.
    pub fn save(&self, path: &Path) -> Result<()> {
        listfile::write_entries(path, HEADER, &self.commands)
    }
}

/// Strip any directory component (either separator style).
pub fn base_name(name: &str) -> &str {
    let name = name.trim();
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

fn validate_entry(name: &str) -> Result<&str, PolicyError> {
    let name = name.trim();
    if name.is_empty() || name.starts_with('#') || name.contains(['/', '\\']) {
        return Err(PolicyError::InvalidEntry(name.to_string()));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_whitelist_denies_everything() {
        let list = CommandWhitelist::default();
        let err = list.check("rm").unwrap_err();
        assert!(matches!(err, PolicyError::CommandNotAllowed { .. }));
    }

    #[test]
    fn base_name_is_checked_and_both_forms_reported() {
        let list = CommandWhitelist::new(["echo"]);
        assert!(list.check("echo").is_ok());
        assert!(list.check("/bin/echo").is_ok());
        let err = list.check("/usr/bin/rm").unwrap_err().to_string();
        assert!(err.contains("/usr/bin/rm"));
        assert!(err.contains("'rm'"));
    }

    #[test]
    fn windows_style_paths_are_reduced_to_base_name() {
        assert_eq!(base_name(r"C:\tools\ffmpeg"), "ffmpeg");
        assert_eq!(base_name("ffmpeg"), "ffmpeg");
    }

    #[test]
    fn add_and_remove_report_state_errors() {
        let mut list = CommandWhitelist::new(["echo"]);
        assert!(matches!(list.add("echo"), Err(PolicyError::AlreadyListed(_))));
        assert!(matches!(list.add("bin/x"), Err(PolicyError::InvalidEntry(_))));
        list.add("pandoc").unwrap();
        assert_eq!(list.entries(), ["echo", "pandoc"]);
        list.remove("echo").unwrap();
        assert!(matches!(list.remove("echo"), Err(PolicyError::NotListed(_))));
    }

    #[test]
    fn default_template_lists_echo() {
        let list = CommandWhitelist::new(listfile::parse_entries(DEFAULT_TEMPLATE));
        assert!(list.check("echo").is_ok());
        assert!(list.check("rm").is_err());
    }

    #[test]
    fn save_then_load_keeps_entries() {
        let path = std::env::temp_dir().join(format!("amo-cli-{}.txt", uuid::Uuid::new_v4()));
        CommandWhitelist::new(["echo", "gs"]).save(&path).unwrap();
        let loaded = CommandWhitelist::load(&path).unwrap();
        assert_eq!(loaded.entries(), ["echo", "gs"]);
    }
}
