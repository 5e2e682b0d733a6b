use crate::browser::PageDriver;
use crate::color::ColorMatcher;
use crate::errors::{Result, ScrapeError};
use crate::report::Trace;
use crate::selectors::SiteSelectors;
use scraper::{ElementRef, Html, Selector};
use std::time::{Duration, Instant};
use tracing::warn;
use url::Url;

/// Metadata observed on one swatch control. Valid only for the current page
/// load; nothing downstream keeps these past the click-and-read step.
#[derive(Debug, Clone)]
pub struct SwatchControl {
    /// Position among all swatches in page order. Used to address the
    /// element again when clicking.
    pub page_index: usize,
    pub display_title: String,
    pub machine_code: String,
    pub secondary_code_text: String,
}

/// What one swatch click produced: the settled main-photo URL and the best
/// label we could attach to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantObservation {
    pub photo_url: String,
    pub color_label: String,
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| ScrapeError::AnyhowError(format!("bad selector '{}': {}", s, e)))
}

/// Walks ancestors of a swatch anchor looking for the wrapper that carries
/// the short color-code thumb rendered next to it.
fn nearest_code_text(
    el: ElementRef,
    wrapper_class: &str,
    code_selector: &Selector,
) -> Option<String> {
    let mut node = el.parent();
    while let Some(n) = node {
        if let Some(ancestor) = ElementRef::wrap(n) {
            if ancestor.value().classes().any(|c| c == wrapper_class) {
                if let Some(code) = ancestor.select(code_selector).next() {
                    let text = code.text().collect::<String>().trim().to_string();
                    if !text.is_empty() {
                        return Some(text);
                    }
                }
            }
        }
        node = n.parent();
    }
    None
}

/// Enumerates the swatch controls present in a page snapshot.
pub fn enumerate_swatches(html: &str, selectors: &SiteSelectors) -> Result<Vec<SwatchControl>> {
    let document = Html::parse_document(html);
    let swatch_sel = parse_selector(&selectors.swatch)?;
    let code_sel = parse_selector(&selectors.swatch_code_thumb)?;

    let mut controls = Vec::new();
    for (i, el) in document.select(&swatch_sel).enumerate() {
        let title = el.value().attr("title").unwrap_or("").trim().to_string();
        let data_color = el
            .value()
            .attr("data-color")
            .unwrap_or("")
            .trim()
            .to_string();
        let code_text = nearest_code_text(el, &selectors.swatch_wrapper_class, &code_sel)
            .unwrap_or_default();

        controls.push(SwatchControl {
            page_index: i,
            display_title: title,
            machine_code: data_color,
            secondary_code_text: code_text,
        });
    }

    Ok(controls)
}

/// Best-effort label for an observation: machine code, then the code text
/// next to the swatch, then the title, then a synthetic placeholder.
pub fn best_label(control: &SwatchControl, sequence: usize) -> String {
    if !control.machine_code.is_empty() {
        control.machine_code.clone()
    } else if !control.secondary_code_text.is_empty() {
        control.secondary_code_text.clone()
    } else if !control.display_title.is_empty() {
        control.display_title.clone()
    } else {
        format!("color_{}", sequence)
    }
}

pub struct VariantWalker<'a> {
    driver: &'a PageDriver,
    selectors: &'a SiteSelectors,
    matcher: &'a ColorMatcher,
}

impl<'a> VariantWalker<'a> {
    pub fn new(
        driver: &'a PageDriver,
        selectors: &'a SiteSelectors,
        matcher: &'a ColorMatcher,
    ) -> Self {
        Self {
            driver,
            selectors,
            matcher,
        }
    }

    /// Clicks each wanted swatch in caller order and reads the main gallery
    /// photo it settles on. Per-item problems land in `failures` and the
    /// loop continues; only losing the page entirely is an error.
    pub async fn collect(
        &self,
        wanted: &[String],
        wait_after_click: Duration,
        timeout_ms: u64,
        trace: &mut Trace,
    ) -> Result<(Vec<VariantObservation>, Vec<String>)> {
        let html = self.driver.page_source().await?;
        let controls = enumerate_swatches(&html, self.selectors)?;
        trace.push(format!("Found swatches: {}", controls.len()));

        let (selected, unmatched) = self.matcher.select_targets(&controls, wanted);
        let mut failures: Vec<String> = Vec::new();
        for w in &unmatched {
            warn!("no swatch matched '{}'", w);
            trace.push(format!("WARNING: no swatch matched '{}'", w));
            failures.push(format!("no swatch matched '{}'", w));
        }
        trace.push(format!("Swatches selected for clicking: {}", selected.len()));

        let base_url = Url::parse(&self.driver.current_url())
            .or_else(|_| Url::parse("about:blank"))
            .map_err(ScrapeError::InvalidUrl)?;

        let mut observations: Vec<VariantObservation> = Vec::new();

        for (k, &idx) in selected.iter().enumerate() {
            let k = k + 1;
            let control = &controls[idx];
            let label = best_label(control, k);

            trace.push(format!(
                "[{}] Click swatch: title='{}' code='{}' thumb='{}'",
                k, control.display_title, control.machine_code, control.secondary_code_text
            ));

            let before = self
                .read_photo_src()
                .await
                .unwrap_or(None)
                .map(|(_, src)| src);

            if let Err(e) = self
                .driver
                .click_nth(&self.selectors.swatch, control.page_index)
                .await
            {
                trace.push(format!("[{}] ERROR click: {}", k, e));
                failures.push(format!("{} (click failed: {})", label, e));
                continue;
            }

            self.wait_for_photo_change(before.as_deref(), wait_after_click, k, trace)
                .await;

            let src = match self.settled_photo_src(timeout_ms).await {
                Some((sel_idx, s)) => {
                    if sel_idx > 0 {
                        trace.push(format!(
                            "[{}] Main photo found via fallback selector '{}'",
                            k, self.selectors.main_photo[sel_idx]
                        ));
                    }
                    s
                }
                None => {
                    trace.push(format!("[{}] Main image not found", k));
                    failures.push(format!("{} (main image not found)", label));
                    continue;
                }
            };

            let photo_url = match base_url.join(&src) {
                Ok(u) => u.to_string(),
                Err(_) => src.clone(),
            };
            trace.push(format!("[{}] Main photo src: {}", k, photo_url));

            // Two differently-labeled variants may legitimately share
            // imagery, but the same URL twice in a row usually means the
            // click had no effect. Keep the observation, flag it.
            if observations
                .last()
                .map(|o| o.photo_url == photo_url)
                .unwrap_or(false)
            {
                warn!("photo URL unchanged since previous variant: {}", photo_url);
                trace.push(format!(
                    "[{}] WARNING: photo URL identical to previous observation",
                    k
                ));
            }

            observations.push(VariantObservation {
                photo_url,
                color_label: label,
            });
        }

        Ok((observations, failures))
    }

    /// Tries each main-photo selector in order; the first one yielding a
    /// non-empty src wins. Returns the cascade index that hit so the trace
    /// can say which layout the page is wearing.
    async fn read_photo_src(&self) -> Result<Option<(usize, String)>> {
        for (i, selector) in self.selectors.main_photo.iter().enumerate() {
            let src = self.driver.read_attribute(selector, "src").await?;
            if let Some(src) = src.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
                return Ok(Some((i, src)));
            }
        }
        Ok(None)
    }

    /// Bounded poll standing in for the variant-switched event the page
    /// never fires: return as soon as the photo src moves off its pre-click
    /// value, give up at the configured wait.
    async fn wait_for_photo_change(
        &self,
        before: Option<&str>,
        budget: Duration,
        k: usize,
        trace: &mut Trace,
    ) {
        let start_time = Instant::now();

        while start_time.elapsed() < budget {
            if let Ok(Some((_, current))) = self.read_photo_src().await {
                if before != Some(current.as_str()) {
                    trace.push(format!(
                        "[{}] Photo src changed after {}ms",
                        k,
                        start_time.elapsed().as_millis()
                    ));
                    return;
                }
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        trace.push(format!(
            "[{}] Photo src did not change within {}s, reading current value",
            k,
            budget.as_secs()
        ));
    }

    /// Reads the main photo src after the settle wait, giving the element a
    /// chance to (re)appear first. Polls the whole cascade rather than
    /// blocking on one selector, since the winning layout is not known
    /// up front.
    async fn settled_photo_src(&self, timeout_ms: u64) -> Option<(usize, String)> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            if let Ok(Some(hit)) = self.read_photo_src().await {
                return Some(hit);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="wrapperSwitchColore">
            <a class="js_colorswitch colorSwitch" data-color="CR" title="Classic Red (CR)"></a>
            <div class="color-code-thumb"> CR </div>
          </div>
          <div class="wrapperSwitchColore">
            <a class="js_colorswitch colorSwitch" data-color="FN" title="French Navy"></a>
            <div class="color-code-thumb">FN</div>
          </div>
          <div>
            <a class="js_colorswitch colorSwitch" title="Mystery"></a>
          </div>
          <div id="js_productMainPhoto"><img class="callToZoom" src="/media/opt-490x735-rj265m.jpg"></div>
        </body></html>
    "#;

    #[test]
    fn enumerates_swatches_with_metadata() {
        let selectors = SiteSelectors::default();
        let controls = enumerate_swatches(PAGE, &selectors).unwrap();
        assert_eq!(controls.len(), 3);

        assert_eq!(controls[0].page_index, 0);
        assert_eq!(controls[0].display_title, "Classic Red (CR)");
        assert_eq!(controls[0].machine_code, "CR");
        assert_eq!(controls[0].secondary_code_text, "CR");

        assert_eq!(controls[1].machine_code, "FN");
        assert_eq!(controls[1].secondary_code_text, "FN");

        // Third swatch has no wrapper and no data-color.
        assert_eq!(controls[2].display_title, "Mystery");
        assert_eq!(controls[2].machine_code, "");
        assert_eq!(controls[2].secondary_code_text, "");
    }

    #[test]
    fn label_precedence() {
        let mut c = SwatchControl {
            page_index: 0,
            display_title: "Classic Red".to_string(),
            machine_code: "CR".to_string(),
            secondary_code_text: "XR".to_string(),
        };
        assert_eq!(best_label(&c, 1), "CR");

        c.machine_code.clear();
        assert_eq!(best_label(&c, 1), "XR");

        c.secondary_code_text.clear();
        assert_eq!(best_label(&c, 1), "Classic Red");

        c.display_title.clear();
        assert_eq!(best_label(&c, 4), "color_4");
    }

    #[test]
    fn missing_swatches_yield_empty_list() {
        let selectors = SiteSelectors::default();
        let controls = enumerate_swatches("<html><body></body></html>", &selectors).unwrap();
        assert!(controls.is_empty());
    }
}
