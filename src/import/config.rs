//! Import configuration

/// Extensions accepted by default (matched case-sensitively on the literal suffix)
pub const DEFAULT_EXTENSIONS: [&str; 2] = [".wav", ".mp3"];

/// How candidate files are gathered and referenced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Flat collection of files; each beat stores a copy of the bytes
    Flat,

    /// Depth-first directory walk; each beat stores a path to the original
    Recursive,
}

/// Configuration for the import process
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Accepted file name suffixes
    pub extensions: Vec<String>,

    /// Whether directory scans follow symbolic links
    pub follow_links: bool,
}

impl ImportConfig {
    /// Create a configuration accepting `.wav` and `.mp3`
    pub fn new() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            follow_links: false,
        }
    }

    /// Replace the accepted extensions
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Follow symbolic links during directory scans
    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Whether a file name passes the extension filter
    ///
    /// Matching is case-sensitive: `track.WAV` is not accepted by default.
    pub fn accepts(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::new()
    }
}
