use crate::errors::{Result, ScrapeError};
use crate::types::ScrapeConfig;
use headless_chrome::protocol::cdp::Network::Cookie;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Thin wrapper over one Chrome instance and its single product-page tab.
/// Everything the pipeline needs from the browser goes through here:
/// navigate, click, fill, wait, read attribute, cookies, popup detection.
pub struct PageDriver {
    browser: Browser,
    tab: Arc<Tab>,
    timeout_ms: u64,
}

impl PageDriver {
    pub async fn launch(config: &ScrapeConfig) -> Result<Self> {
        // Create strings first to ensure they live long enough
        let window_size_arg = format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        );
        let user_agent_arg = config
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-gpu"),
            OsStr::new(&window_size_arg),
        ];

        if let Some(ref ua_arg) = user_agent_arg {
            args.push(OsStr::new(ua_arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .args(args)
            .build()
            .map_err(|e| ScrapeError::LaunchFailed(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| ScrapeError::LaunchFailed(e.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| ScrapeError::LaunchFailed(e.to_string()))?;

        Ok(Self {
            browser,
            tab,
            timeout_ms: config.timeout_ms,
        })
    }

    /// Navigates and waits for the initial document parse, not network idle.
    /// The target site keeps background connections open indefinitely in
    /// some configurations, so full idle would never come.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| ScrapeError::NavigationFailed(e.to_string()))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| ScrapeError::NavigationFailed(e.to_string()))?;

        self.wait_for_dom_parse().await
    }

    async fn wait_for_dom_parse(&self) -> Result<()> {
        let js_code = "document.readyState !== 'loading'";
        let start_time = Instant::now();
        let timeout = Duration::from_millis(self.timeout_ms);

        while start_time.elapsed() < timeout {
            let result = self
                .tab
                .evaluate(js_code, false)
                .map_err(|e| ScrapeError::JavaScriptFailed(e.to_string()))?;

            if let Some(value) = result.value {
                if value.as_bool() == Some(true) {
                    return Ok(());
                }
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Err(ScrapeError::NavigationFailed(
            "Document parse timeout".to_string(),
        ))
    }

    pub fn current_url(&self) -> String {
        self.tab.get_url()
    }

    pub async fn click(&self, css_selector: &str) -> Result<()> {
        self.click_on(&self.tab, css_selector).await
    }

    pub async fn click_on(&self, tab: &Tab, css_selector: &str) -> Result<()> {
        tab.find_element(css_selector)
            .map_err(|e| ScrapeError::ElementNotFound(e.to_string()))?
            .click()
            .map_err(|e| ScrapeError::JavaScriptFailed(e.to_string()))?;

        Ok(())
    }

    /// Scrolls the i-th match of `css_selector` into view and clicks it.
    /// Used for swatches, which share one selector and differ only by
    /// page order.
    pub async fn click_nth(&self, css_selector: &str, index: usize) -> Result<()> {
        let js_code = format!(
            r#"
            (function() {{
                const els = document.querySelectorAll('{}');
                const el = els[{}];
                if (!el) return false;
                el.scrollIntoView({{ block: 'center' }});
                el.click();
                return true;
            }})()
        "#,
            css_selector.replace('\'', "\\'"),
            index
        );

        let result = self
            .tab
            .evaluate(&js_code, false)
            .map_err(|e| ScrapeError::JavaScriptFailed(e.to_string()))?;

        if let Some(value) = result.value {
            if value.as_bool() == Some(true) {
                return Ok(());
            }
        }

        Err(ScrapeError::ElementNotFound(format!(
            "No element at index {} for selector '{}'",
            index, css_selector
        )))
    }

    pub async fn fill_on(&self, tab: &Tab, css_selector: &str, text: &str) -> Result<()> {
        let element = tab
            .find_element(css_selector)
            .map_err(|e| ScrapeError::ElementNotFound(e.to_string()))?;

        element
            .click()
            .map_err(|e| ScrapeError::JavaScriptFailed(e.to_string()))?;

        element
            .type_into(text)
            .map_err(|e| ScrapeError::JavaScriptFailed(e.to_string()))?;

        Ok(())
    }

    pub async fn wait_for_element(&self, css_selector: &str, timeout_ms: u64) -> Result<()> {
        self.wait_for_element_on(&self.tab, css_selector, timeout_ms)
            .await
    }

    pub async fn wait_for_element_on(
        &self,
        tab: &Tab,
        css_selector: &str,
        timeout_ms: u64,
    ) -> Result<()> {
        tab.wait_for_element_with_custom_timeout(css_selector, Duration::from_millis(timeout_ms))
            .map_err(|e| ScrapeError::ElementNotFound(e.to_string()))?;

        Ok(())
    }

    pub async fn read_attribute(
        &self,
        css_selector: &str,
        attribute: &str,
    ) -> Result<Option<String>> {
        let js_code = format!(
            r#"
            (function() {{
                const element = document.querySelector('{}');
                if (element) {{
                    return element.getAttribute('{}');
                }}
                return null;
            }})()
        "#,
            css_selector.replace('\'', "\\'"),
            attribute.replace('\'', "\\'")
        );

        let result = self
            .tab
            .evaluate(&js_code, false)
            .map_err(|e| ScrapeError::JavaScriptFailed(e.to_string()))?;

        Ok(result.value.and_then(|v| v.as_str().map(|s| s.to_string())))
    }

    pub async fn page_source(&self) -> Result<String> {
        let js_result = self
            .tab
            .evaluate("document.documentElement.outerHTML", false)
            .map_err(|e| ScrapeError::JavaScriptFailed(e.to_string()))?;

        js_result
            .value
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .ok_or_else(|| ScrapeError::JavaScriptFailed("Failed to get page source".to_string()))
    }

    /// True when the selector no longer matches anything, or matches only a
    /// hidden element. The login modal signals completion by detaching or
    /// going display:none, depending on site configuration.
    pub async fn is_gone_or_hidden(&self, tab: &Tab, css_selector: &str) -> Result<bool> {
        let js_code = format!(
            r#"
            (function() {{
                const element = document.querySelector('{}');
                if (!element) return true;
                const style = window.getComputedStyle(element);
                return style.display === 'none' || style.visibility === 'hidden';
            }})()
        "#,
            css_selector.replace('\'', "\\'")
        );

        let result = tab
            .evaluate(&js_code, false)
            .map_err(|e| ScrapeError::JavaScriptFailed(e.to_string()))?;

        Ok(result.value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    pub fn main_tab(&self) -> Arc<Tab> {
        self.tab.clone()
    }

    pub fn tab_count(&self) -> usize {
        self.browser
            .get_tabs()
            .lock()
            .map(|tabs| tabs.len())
            .unwrap_or(0)
    }

    /// Polls for a window/tab opened after `before` were present. Returns
    /// None when the bound elapses, which the login flow reads as "the site
    /// used an in-page modal instead of a popup".
    pub async fn wait_for_new_tab(&self, before: usize, timeout: Duration) -> Option<Arc<Tab>> {
        let start_time = Instant::now();

        while start_time.elapsed() < timeout {
            if let Ok(tabs) = self.browser.get_tabs().lock() {
                if tabs.len() > before {
                    if let Some(tab) = tabs.last() {
                        return Some(tab.clone());
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        None
    }

    pub fn cookies(&self) -> Result<Vec<Cookie>> {
        self.tab
            .get_cookies()
            .map_err(|e| ScrapeError::AnyhowError(e.to_string()))
    }
}
