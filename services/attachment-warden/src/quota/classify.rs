use std::collections::BTreeSet;
use std::path::Path;

use super::event::Attachment;

pub const DEFAULT_TRACKED_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a", "aac", "opus"];

/// Decides which attachments count against a quota, by file extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentClassifier {
    extensions: BTreeSet<String>,
}

impl Default for AttachmentClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_TRACKED_EXTENSIONS.iter().copied())
    }
}

impl AttachmentClassifier {
    /// Extensions are matched case-insensitively; a leading dot is ignored.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    pub fn is_tracked(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    /// Positions of tracked attachments, in message order.
    pub fn tracked_positions(&self, attachments: &[Attachment]) -> Vec<usize> {
        attachments
            .iter()
            .enumerate()
            .filter(|(_, attachment)| self.is_tracked(&attachment.filename))
            .map(|(idx, _)| idx)
            .collect()
    }
}
