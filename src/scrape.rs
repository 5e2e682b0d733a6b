use crate::browser::PageDriver;
use crate::color::{normalize, ColorMatcher, SynonymTable};
use crate::errors::Result;
use crate::login::LoginFlow;
use crate::packager::Packager;
use crate::report::{RunReport, Trace};
use crate::resolver::ImageResolver;
use crate::selectors::SiteSelectors;
use crate::session::HttpSession;
use crate::types::ScrapeConfig;
use crate::walker::VariantWalker;
use std::time::Duration;
use tracing::info;

/// Runs the whole pipeline with the default site selectors and synonym
/// table: login, walk the wanted swatches, resolve and download each main
/// photo, archive the results.
pub async fn scrape_product_images(config: &ScrapeConfig) -> Result<RunReport> {
    scrape_with(config, &SiteSelectors::default(), SynonymTable::default()).await
}

/// Same pipeline with caller-supplied selector and color-vocabulary
/// configuration, for pages whose markup or wording has drifted.
pub async fn scrape_with(
    config: &ScrapeConfig,
    selectors: &SiteSelectors,
    synonyms: SynonymTable,
) -> Result<RunReport> {
    let mut trace = Trace::new();

    let wanted_norm: Vec<String> = config
        .wanted_colors
        .iter()
        .map(|w| normalize(w))
        .filter(|w| !w.is_empty())
        .collect();
    trace.push(format!("Wanted colors (normalized): {:?}", wanted_norm));

    // Setup failures are fatal: nothing can be authenticated without them.
    let driver = PageDriver::launch(config).await?;

    let matcher = ColorMatcher::new(synonyms);
    let login = LoginFlow::new(&driver, selectors, config);
    let outcome = login.run(&mut trace).await?;
    info!("login finished: {:?}", outcome);

    let cookies = driver.cookies()?;
    trace.push(format!("Captured {} browser cookies", cookies.len()));
    let session = HttpSession::from_browser_cookies(
        &cookies,
        &config.product_url,
        config.user_agent.as_deref(),
    )?;

    let walker = VariantWalker::new(&driver, selectors, &matcher);
    let (observations, walk_failures) = walker
        .collect(
            &config.wanted_colors,
            Duration::from_secs(config.wait_after_click_secs),
            config.timeout_ms,
            &mut trace,
        )
        .await?;

    let found_image_urls: Vec<String> =
        observations.iter().map(|o| o.photo_url.clone()).collect();

    let resolver = ImageResolver::new(config.resolver_mode);
    let mut packager = Packager::new();
    for reason in walk_failures {
        packager.record_failure(reason);
    }

    for (k, obs) in observations.iter().enumerate() {
        let sequence = k + 1;
        let resolved = resolver.resolve(&session, &obs.photo_url, &mut trace).await;
        packager
            .add(&session, sequence, &obs.color_label, resolved, &mut trace)
            .await;
    }

    info!(
        "run finished: {} archived, {} found",
        packager.entry_count(),
        found_image_urls.len()
    );

    let (zip_bytes, downloaded_ok, downloaded_failed) = packager.finish()?;

    Ok(RunReport {
        zip_bytes,
        found_image_urls,
        downloaded_ok,
        downloaded_failed,
        debug: trace.into_lines(),
    })
}
