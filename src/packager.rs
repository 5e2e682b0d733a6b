use crate::errors::Result;
use crate::report::Trace;
use crate::resolver::ResolvedImage;
use crate::session::HttpSession;
use regex::Regex;
use std::io::{Cursor, Write};
use std::sync::OnceLock;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const MAX_LABEL_LEN: usize = 120;

fn unsafe_chars_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.\-]+").expect("hardcoded pattern"))
}

fn url_ext_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.(jpg|jpeg|png|webp|gif)(\?|$)").expect("hardcoded pattern"))
}

/// Replaces anything outside `[A-Za-z0-9_.-]` with `_` and bounds the
/// length, so color labels lifted from arbitrary page text make safe
/// archive entry names.
pub fn sanitize_label(label: &str) -> String {
    let cleaned = unsafe_chars_re()
        .replace_all(label.trim(), "_")
        .into_owned();
    let cleaned: String = cleaned.chars().take(MAX_LABEL_LEN).collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Content type wins, the URL's trailing extension is the fallback, and
/// `.jpg` the default.
pub fn infer_extension(content_type: Option<&str>, url: &str) -> String {
    if let Some(ct) = content_type {
        if ct.contains("jpeg") {
            return ".jpg".to_string();
        } else if ct.contains("png") {
            return ".png".to_string();
        } else if ct.contains("webp") {
            return ".webp".to_string();
        } else if ct.contains("gif") {
            return ".gif".to_string();
        }
    }

    if let Some(caps) = url_ext_re().captures(url) {
        let ext = caps[1].to_lowercase().replace("jpeg", "jpg");
        return format!(".{}", ext);
    }

    ".jpg".to_string()
}

pub fn entry_name(sequence: usize, label: &str, ext: &str) -> String {
    format!("{:02}_{}{}", sequence, sanitize_label(label), ext)
}

/// Builds the in-memory archive one image at a time. Entries already
/// written survive any later per-item failure; the partial archive is
/// always returned.
pub struct Packager {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    ok: Vec<String>,
    failed: Vec<String>,
    entries: usize,
}

impl Packager {
    pub fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            ok: Vec::new(),
            failed: Vec::new(),
            entries: 0,
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries
    }

    pub fn record_failure(&mut self, reason: impl Into<String>) {
        self.failed.push(reason.into());
    }

    /// Downloads a resolved image (unless the resolver already has its
    /// bytes) and writes it as one flat archive entry.
    pub async fn add(
        &mut self,
        session: &HttpSession,
        sequence: usize,
        label: &str,
        resolved: ResolvedImage,
        trace: &mut Trace,
    ) {
        let outcome = match resolved.prefetched {
            Some(outcome) => outcome,
            None => match session.download(&resolved.url).await {
                Ok(outcome) => outcome,
                Err(reason) => {
                    trace.push(format!("[{}] Download failed: {} ({})", sequence, resolved.url, reason));
                    self.failed.push(format!("{} ({})", resolved.url, reason));
                    return;
                }
            },
        };

        match self.add_bytes(
            sequence,
            label,
            &resolved.url,
            &outcome.bytes,
            outcome.content_type.as_deref(),
        ) {
            Ok(name) => {
                trace.push(format!("[{}] Archived {} as {}", sequence, resolved.url, name));
            }
            Err(reason) => {
                trace.push(format!("[{}] Archive write failed: {}", sequence, reason));
            }
        }
    }

    /// Writes one entry from bytes already in hand. Split out from `add` so
    /// the archive semantics are testable without a network.
    pub fn add_bytes(
        &mut self,
        sequence: usize,
        label: &str,
        url: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> std::result::Result<String, String> {
        let ext = infer_extension(content_type, url);
        let name = entry_name(sequence, label, &ext);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let write = self
            .zip
            .start_file(&name, options)
            .map_err(|e| e.to_string())
            .and_then(|_| self.zip.write_all(bytes).map_err(|e| e.to_string()));

        match write {
            Ok(()) => {
                self.entries += 1;
                self.ok.push(url.to_string());
                Ok(name)
            }
            Err(e) => {
                let reason = format!("{} (archive write: {})", url, e);
                self.failed.push(reason.clone());
                Err(reason)
            }
        }
    }

    /// Closes the archive and hands back its bytes with the ok/failed
    /// ledgers. A zero-entry archive is still a valid archive.
    pub fn finish(mut self) -> Result<(Vec<u8>, Vec<String>, Vec<String>)> {
        let cursor = self.zip.finish()?;
        Ok((cursor.into_inner(), self.ok, self.failed))
    }
}

impl Default for Packager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn read_archive(bytes: Vec<u8>) -> ZipArchive<Cursor<Vec<u8>>> {
        ZipArchive::new(Cursor::new(bytes)).expect("valid archive")
    }

    #[test]
    fn sanitizes_labels() {
        assert_eq!(sanitize_label("Classic Red (CR)"), "Classic_Red_CR_");
        assert_eq!(sanitize_label("  Bleu/Marine  "), "Bleu_Marine");
        assert_eq!(sanitize_label(""), "file");
        assert_eq!(sanitize_label("///").len(), 1);
    }

    #[test]
    fn label_length_is_bounded() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_label(&long).len(), MAX_LABEL_LEN);
    }

    #[test]
    fn extension_from_content_type_wins() {
        assert_eq!(
            infer_extension(Some("image/png"), "https://host/a.jpg"),
            ".png"
        );
        assert_eq!(
            infer_extension(Some("image/jpeg"), "https://host/a.png"),
            ".jpg"
        );
    }

    #[test]
    fn extension_falls_back_to_url_then_default() {
        assert_eq!(infer_extension(None, "https://host/a.webp?x=1"), ".webp");
        assert_eq!(infer_extension(None, "https://host/a.JPEG"), ".jpg");
        assert_eq!(infer_extension(None, "https://host/a"), ".jpg");
        assert_eq!(infer_extension(Some("text/html"), "https://host/a"), ".jpg");
    }

    #[test]
    fn entry_names_carry_sequence_and_label() {
        assert_eq!(entry_name(3, "French Navy", ".jpg"), "03_French_Navy.jpg");
    }

    #[test]
    fn archive_round_trip() {
        let mut packager = Packager::new();
        packager
            .add_bytes(1, "CR", "https://host/cr.jpg", b"red-bytes", None)
            .unwrap();
        packager
            .add_bytes(2, "FN", "https://host/fn.png", b"navy-bytes", Some("image/png"))
            .unwrap();

        let (bytes, ok, failed) = packager.finish().unwrap();
        assert_eq!(ok.len(), 2);
        assert!(failed.is_empty());

        let mut archive = read_archive(bytes);
        assert_eq!(archive.len(), 2);

        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["01_CR.jpg", "02_FN.png"]);

        let mut content = Vec::new();
        archive
            .by_name("01_CR.jpg")
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, b"red-bytes");
    }

    #[test]
    fn failures_never_disturb_earlier_entries() {
        let mut packager = Packager::new();
        packager
            .add_bytes(1, "CR", "https://host/cr.jpg", b"red-bytes", None)
            .unwrap();
        packager.record_failure("https://host/miss.jpg (HTTP 404)");
        packager
            .add_bytes(3, "OG", "https://host/og.jpg", b"olive-bytes", None)
            .unwrap();

        let (bytes, ok, failed) = packager.finish().unwrap();
        assert_eq!(ok.len(), 2);
        assert_eq!(failed, vec!["https://host/miss.jpg (HTTP 404)".to_string()]);

        let mut archive = read_archive(bytes);
        assert_eq!(archive.len(), 2);
        let mut content = Vec::new();
        archive
            .by_name("01_CR.jpg")
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, b"red-bytes");
    }

    #[test]
    fn all_failures_still_return_an_archive() {
        let mut packager = Packager::new();
        packager.record_failure("https://host/a.jpg (HTTP 404)");
        packager.record_failure("https://host/b.jpg (HTTP 404)");
        packager.record_failure("https://host/c.jpg (HTTP 404)");

        let (bytes, ok, failed) = packager.finish().unwrap();
        assert!(ok.is_empty());
        assert_eq!(failed.len(), 3);
        assert!(failed.iter().all(|f| f.contains("HTTP 404")));

        let archive = read_archive(bytes);
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn packing_is_deterministic_for_stable_inputs() {
        let build = || {
            let mut packager = Packager::new();
            packager
                .add_bytes(1, "CR", "https://host/cr.jpg", b"red-bytes", None)
                .unwrap();
            packager
                .add_bytes(2, "FN", "https://host/fn.jpg", b"navy-bytes", None)
                .unwrap();
            packager.finish().unwrap().0
        };

        assert_eq!(build(), build());
    }
}
