use crate::report::Trace;
use crate::session::{DownloadOutcome, HttpSession};
use crate::types::ResolverMode;
use image::GenericImageView;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

fn opt_infix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/opt-\d+x\d+-").expect("hardcoded pattern"))
}

fn size_infix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/\d+x\d+-").expect("hardcoded pattern"))
}

/// The URL the resolver settled on, with bytes attached when the probing
/// strategy already had to download them.
#[derive(Debug)]
pub struct ResolvedImage {
    pub url: String,
    pub prefetched: Option<DownloadOutcome>,
}

/// Hi-res URL guesses for one gallery photo, best first.
///
/// The site's image pipeline marks resized derivatives with a sizing infix
/// in the path (`opt-490x735-` or a bare `113x40-`); the infix-free form is
/// usually the original, larger asset. The input URL always stays in the
/// list as the last resort.
pub fn hi_res_candidates(photo_url: &str) -> Vec<String> {
    if photo_url.is_empty() {
        return vec![];
    }

    let mut candidates = vec![photo_url.to_string()];

    let without_opt = opt_infix_re().replace_all(photo_url, "/").into_owned();
    if without_opt != photo_url {
        candidates.insert(0, without_opt);
    }

    let without_size = size_infix_re().replace_all(photo_url, "/").into_owned();
    if !candidates.contains(&without_size) {
        candidates.insert(0, without_size);
    }

    candidates
}

/// Existence checks the probing strategy runs against candidate URLs.
/// `HttpSession` is the real prober; tests substitute canned answers.
pub(crate) trait ImageProbe {
    async fn head_exists(&self, url: &str) -> bool;
    async fn get_exists(&self, url: &str) -> bool;
}

impl ImageProbe for HttpSession {
    async fn head_exists(&self, url: &str) -> bool {
        HttpSession::head_exists(self, url).await
    }

    async fn get_exists(&self, url: &str) -> bool {
        HttpSession::get_exists(self, url).await
    }
}

pub struct ImageResolver {
    mode: ResolverMode,
}

impl ImageResolver {
    pub fn new(mode: ResolverMode) -> Self {
        Self { mode }
    }

    /// Picks the best available URL for `photo_url`. Always returns some
    /// URL: when every probe fails, the original degrades through as-is and
    /// the download step reports whatever the server really thinks.
    pub async fn resolve(
        &self,
        session: &HttpSession,
        photo_url: &str,
        trace: &mut Trace,
    ) -> ResolvedImage {
        let candidates = hi_res_candidates(photo_url);
        debug!("hi-res candidates for {}: {:?}", photo_url, candidates);

        match self.mode {
            ResolverMode::ProbeExistence => {
                let url = Self::probe(session, &candidates, photo_url).await;
                trace.push(format!("Best candidate: {}", url));
                ResolvedImage {
                    url,
                    prefetched: None,
                }
            }
            ResolverMode::LargestPixels => {
                let resolved = Self::largest_pixels(session, &candidates, photo_url, trace).await;
                trace.push(format!("Best candidate (largest pixels): {}", resolved.url));
                resolved
            }
        }
    }

    /// Existence probe: every candidate over HEAD first, then over a
    /// streamed GET for servers that reject HEAD, then the original
    /// unconditionally.
    async fn probe<P: ImageProbe>(prober: &P, candidates: &[String], original: &str) -> String {
        for url in candidates {
            if prober.head_exists(url).await {
                return url.clone();
            }
        }

        for url in candidates {
            if prober.get_exists(url).await {
                return url.clone();
            }
        }

        candidates
            .last()
            .cloned()
            .unwrap_or_else(|| original.to_string())
    }

    /// Expensive variant: download every reachable candidate, decode its
    /// pixel dimensions, keep the largest area. The winning bytes ride along
    /// so the packager does not fetch them twice.
    async fn largest_pixels(
        session: &HttpSession,
        candidates: &[String],
        original: &str,
        trace: &mut Trace,
    ) -> ResolvedImage {
        let mut best: Option<(u64, String, DownloadOutcome)> = None;

        for url in candidates {
            let outcome = match session.download(url).await {
                Ok(o) => o,
                Err(reason) => {
                    trace.push(format!("Candidate unavailable: {} ({})", url, reason));
                    continue;
                }
            };

            let area = match image::load_from_memory(&outcome.bytes) {
                Ok(img) => {
                    let (w, h) = img.dimensions();
                    u64::from(w) * u64::from(h)
                }
                Err(e) => {
                    trace.push(format!("Candidate not decodable: {} ({})", url, e));
                    continue;
                }
            };

            if best.as_ref().map(|(a, _, _)| area > *a).unwrap_or(true) {
                best = Some((area, url.clone(), outcome));
            }
        }

        match best {
            Some((_, url, outcome)) => ResolvedImage {
                url,
                prefetched: Some(outcome),
            },
            None => ResolvedImage {
                url: candidates
                    .last()
                    .cloned()
                    .unwrap_or_else(|| original.to_string()),
                prefetched: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_opt_sizing_infix_first() {
        let cands = hi_res_candidates("https://host/media/product/opt-490x735-rj265m.jpg");
        assert_eq!(cands[0], "https://host/media/product/rj265m.jpg");
        assert_eq!(
            cands.last().unwrap(),
            "https://host/media/product/opt-490x735-rj265m.jpg"
        );
    }

    #[test]
    fn strips_bare_sizing_infix() {
        let cands = hi_res_candidates("https://host/media/113x40-thumb.jpg");
        assert_eq!(cands[0], "https://host/media/thumb.jpg");
        assert_eq!(cands.last().unwrap(), "https://host/media/113x40-thumb.jpg");
    }

    #[test]
    fn original_is_single_candidate_when_no_infix() {
        let cands = hi_res_candidates("https://host/media/rj265m.jpg");
        assert_eq!(cands, vec!["https://host/media/rj265m.jpg".to_string()]);
    }

    #[test]
    fn original_always_last() {
        let url = "https://host/a/opt-10x10-x.png";
        let cands = hi_res_candidates(url);
        assert!(cands.len() >= 2);
        assert_eq!(cands.last().unwrap(), url);
        // No duplicates.
        let mut dedup = cands.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), cands.len());
    }

    #[test]
    fn empty_url_yields_no_candidates() {
        assert!(hi_res_candidates("").is_empty());
    }

    #[test]
    fn opt_infix_not_confused_with_bare_infix() {
        // The bare-size rule requires digits right after the slash, so it
        // must not fire on the opt- form.
        let url = "https://host/media/opt-490x735-rj265m.jpg";
        let cands = hi_res_candidates(url);
        assert_eq!(cands.len(), 2);
    }

    /// Answers every existence check with "not there".
    struct NoServer;

    impl ImageProbe for NoServer {
        async fn head_exists(&self, _url: &str) -> bool {
            false
        }

        async fn get_exists(&self, _url: &str) -> bool {
            false
        }
    }

    /// Rejects HEAD outright, admits exactly one URL over GET.
    struct HeadRejecting {
        available: String,
    }

    impl ImageProbe for HeadRejecting {
        async fn head_exists(&self, _url: &str) -> bool {
            false
        }

        async fn get_exists(&self, url: &str) -> bool {
            url == self.available
        }
    }

    #[test]
    fn degrades_to_original_when_no_candidate_exists() {
        let url = "https://host/media/product/opt-490x735-rj265m.jpg";
        let cands = hi_res_candidates(url);
        let chosen = tokio_test::block_on(ImageResolver::probe(&NoServer, &cands, url));
        assert_eq!(chosen, url);
    }

    #[test]
    fn always_yields_a_url_even_without_candidates() {
        let chosen = tokio_test::block_on(ImageResolver::probe(&NoServer, &[], "https://host/x.jpg"));
        assert_eq!(chosen, "https://host/x.jpg");
    }

    #[test]
    fn falls_back_to_get_when_head_is_rejected() {
        let url = "https://host/media/opt-10x10-a.jpg";
        let cands = hi_res_candidates(url);
        let prober = HeadRejecting {
            available: cands[0].clone(),
        };
        let chosen = tokio_test::block_on(ImageResolver::probe(&prober, &cands, url));
        assert_eq!(chosen, cands[0]);
    }
}
