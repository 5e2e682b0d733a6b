use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// How the image resolver picks among hi-res URL candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolverMode {
    /// HEAD/GET existence probe, first hit wins. Cheap, the default.
    ProbeExistence,
    /// Download every reachable candidate and keep the pixel-largest one.
    LargestPixels,
}

impl Default for ResolverMode {
    fn default() -> Self {
        ResolverMode::ProbeExistence
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    pub product_url: String,
    pub email: String,
    pub password: String,
    /// Free-text color requests, in the order the caller wants them clicked.
    /// Empty means every discovered swatch.
    pub wanted_colors: Vec<String>,
    /// Upper bound on the post-click wait for the gallery photo to swap.
    pub wait_after_click_secs: u64,
    pub headless: bool,
    pub viewport: Viewport,
    /// Per-operation timeout for navigation and selector waits.
    pub timeout_ms: u64,
    pub resolver_mode: ResolverMode,
    pub user_agent: Option<String>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            product_url: String::new(),
            email: String::new(),
            password: String::new(),
            wanted_colors: vec![],
            wait_after_click_secs: 15,
            headless: true,
            viewport: Viewport::default(),
            timeout_ms: 45_000,
            resolver_mode: ResolverMode::default(),
            user_agent: None,
        }
    }
}
