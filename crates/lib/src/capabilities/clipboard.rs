//! `clipboard` namespace. Clipboard failures are common on headless machines, so they are
//! always reported as results.

use std::sync::Arc;

use super::{Outcome, Text};
use crate::clipboard::Clipboard;

#[derive(Clone)]
pub struct ClipboardCapability {
    backend: Arc<dyn Clipboard>,
}

impl ClipboardCapability {
    pub fn new(backend: Arc<dyn Clipboard>) -> Self {
        Self { backend }
    }

    pub fn read(&self) -> Outcome<Text> {
        Outcome::from_result(self.backend.read().map(|text| Text { text }))
    }

    pub fn write(&self, text: &str) -> Outcome<()> {
        Outcome::from_unit(self.backend.write(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;

    #[test]
    fn failures_become_results() {
        let cap = ClipboardCapability::new(Arc::new(MemoryClipboard::default()));
        let read = cap.read();
        assert!(!read.success);
        assert!(read.error.is_some());

        assert!(cap.write("x").success);
        assert_eq!(cap.read().data.unwrap().text, "x");
    }
}
