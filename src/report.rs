use tracing::debug;

/// Ordered, append-only log of every notable step in a run. Kept alongside
/// the `tracing` output so the caller can show the operator what happened
/// when the target site's markup drifts.
#[derive(Debug, Default)]
pub struct Trace {
    lines: Vec<String>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        debug!("{}", line);
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// Aggregate result of one scrape run. Immutable once returned.
#[derive(Debug)]
pub struct RunReport {
    /// Deflate-compressed zip, one flat entry per downloaded image.
    /// May be empty (zero entries) if every item failed.
    pub zip_bytes: Vec<u8>,
    /// Every main-photo URL observed after a swatch click.
    pub found_image_urls: Vec<String>,
    /// URLs whose bytes made it into the archive.
    pub downloaded_ok: Vec<String>,
    /// Human-readable descriptors of per-item failures.
    pub downloaded_failed: Vec<String>,
    /// Step-by-step trace for operator diagnosis.
    pub debug: Vec<String>,
}
