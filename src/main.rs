use clap::Parser;
use swatchgrab::{scrape_product_images, ResolverMode, ScrapeConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Download hi-res gallery photos for product color variants")]
struct Args {
    /// Product page URL
    #[arg(long)]
    url: String,

    /// Account email for the login modal
    #[arg(long)]
    email: String,

    /// Account password
    #[arg(long)]
    password: String,

    /// Color to fetch, in click order (repeatable). Omit to fetch every swatch.
    #[arg(long = "color")]
    colors: Vec<String>,

    /// Upper bound in seconds on the post-click wait for the photo swap
    #[arg(long, default_value_t = 15)]
    wait: u64,

    /// Run the browser with a visible window
    #[arg(long, default_value_t = false)]
    headed: bool,

    /// Download all hi-res candidates and keep the pixel-largest one
    #[arg(long, default_value_t = false)]
    largest_pixels: bool,

    /// Where to write the archive
    #[arg(long, default_value = "variants.zip")]
    out: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let config = ScrapeConfig {
        product_url: args.url,
        email: args.email,
        password: args.password,
        wanted_colors: args.colors,
        wait_after_click_secs: args.wait,
        headless: !args.headed,
        resolver_mode: if args.largest_pixels {
            ResolverMode::LargestPixels
        } else {
            ResolverMode::ProbeExistence
        },
        ..Default::default()
    };

    info!("Scraping {}", config.product_url);

    let report = match scrape_product_images(&config).await {
        Ok(report) => report,
        Err(e) => {
            error!("run aborted: {}", e);
            return Err(e.into());
        }
    };

    info!("Found {} main photo URLs", report.found_image_urls.len());
    for url in &report.found_image_urls {
        info!("  found: {}", url);
    }
    info!("Downloaded {} images", report.downloaded_ok.len());
    for url in &report.downloaded_ok {
        info!("  ok: {}", url);
    }
    if !report.downloaded_failed.is_empty() {
        info!("{} items failed:", report.downloaded_failed.len());
        for reason in &report.downloaded_failed {
            info!("  failed: {}", reason);
        }
    }

    std::fs::write(&args.out, &report.zip_bytes)?;
    info!("Archive written to {}", args.out);

    Ok(())
}
