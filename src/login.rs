use crate::browser::PageDriver;
use crate::errors::{Result, ScrapeError};
use crate::report::Trace;
use crate::selectors::SiteSelectors;
use crate::types::ScrapeConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Start,
    ProductLoaded,
    LoginTriggered,
    CredentialsEntered,
    Submitted,
    SessionEstablished,
}

/// Whether the completion signal actually arrived. The site sometimes keeps
/// the modal in the DOM but hidden, so a missing detach is not proof of
/// failure; the distinction stays visible for operator review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Confirmed,
    Unconfirmed,
}

/// Which surface ended up holding the credential fields.
enum LoginSurface {
    Modal,
    Popup(Arc<headless_chrome::Tab>),
}

pub struct LoginFlow<'a> {
    driver: &'a PageDriver,
    selectors: &'a SiteSelectors,
    config: &'a ScrapeConfig,
}

impl<'a> LoginFlow<'a> {
    pub fn new(
        driver: &'a PageDriver,
        selectors: &'a SiteSelectors,
        config: &'a ScrapeConfig,
    ) -> Self {
        Self {
            driver,
            selectors,
            config,
        }
    }

    /// Drives Start -> SessionEstablished. Any selector miss or timeout on
    /// the way is fatal to the whole run; nothing downstream can be
    /// authenticated without it.
    pub async fn run(&self, trace: &mut Trace) -> Result<LoginOutcome> {
        let mut state = LoginState::Start;
        let timeout_ms = self.config.timeout_ms;
        trace.push(format!("Login state: {:?}", state));

        trace.push(format!("Open product: {}", self.config.product_url));
        self.driver.navigate(&self.config.product_url).await?;
        state = LoginState::ProductLoaded;
        trace.push(format!("Login state: {:?}", state));

        let tabs_before = self.driver.tab_count();
        let mut trigger_hit = None;
        for selector in &self.selectors.login_trigger {
            if self.driver.click(selector).await.is_ok() {
                trigger_hit = Some(selector.clone());
                break;
            }
        }
        let trigger = trigger_hit.ok_or_else(|| {
            ScrapeError::LoginFailed("no login trigger selector matched".to_string())
        })?;
        trace.push(format!("Click login trigger (matched '{}')", trigger));
        state = LoginState::LoginTriggered;
        trace.push(format!("Login state: {:?}", state));

        let surface = self.detect_surface(tabs_before, trace).await?;

        let surface_tab = match &surface {
            LoginSurface::Modal => self.driver.main_tab(),
            LoginSurface::Popup(tab) => tab.clone(),
        };

        trace.push("Fill email/password".to_string());
        self.driver
            .wait_for_element_on(&surface_tab, &self.selectors.email_field, timeout_ms)
            .await
            .map_err(|e| ScrapeError::LoginFailed(format!("email field: {}", e)))?;
        self.driver
            .fill_on(&surface_tab, &self.selectors.email_field, &self.config.email)
            .await
            .map_err(|e| ScrapeError::LoginFailed(format!("email field: {}", e)))?;
        self.driver
            .fill_on(
                &surface_tab,
                &self.selectors.password_field,
                &self.config.password,
            )
            .await
            .map_err(|e| ScrapeError::LoginFailed(format!("password field: {}", e)))?;
        state = LoginState::CredentialsEntered;
        trace.push(format!("Login state: {:?}", state));

        trace.push("Submit login".to_string());
        self.driver
            .click_on(&surface_tab, &self.selectors.login_submit)
            .await
            .map_err(|e| ScrapeError::LoginFailed(format!("submit: {}", e)))?;
        state = LoginState::Submitted;
        trace.push(format!("Login state: {:?}", state));

        let outcome = self.confirm(&surface, &surface_tab, trace).await;
        state = LoginState::SessionEstablished;
        trace.push(format!("Login state: {:?}", state));

        // Small buffer for session cookies, then reload so variant markup
        // reflects the logged-in state.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        trace.push("Reload product page after login".to_string());
        self.driver.navigate(&self.config.product_url).await?;
        tokio::time::sleep(Duration::from_millis(1000)).await;

        Ok(outcome)
    }

    /// The login affordance opens either an in-page modal or a separate
    /// popup window. Wait briefly for a new window; none arriving within
    /// the bound means modal.
    async fn detect_surface(&self, tabs_before: usize, trace: &mut Trace) -> Result<LoginSurface> {
        if let Some(tab) = self
            .driver
            .wait_for_new_tab(tabs_before, Duration::from_secs(3))
            .await
        {
            info!("login opened a popup window");
            trace.push("Login surface: popup window".to_string());
            return Ok(LoginSurface::Popup(tab));
        }

        trace.push("Login surface: in-page modal".to_string());
        self.driver
            .wait_for_element(&self.selectors.login_modal_body, self.config.timeout_ms)
            .await
            .map_err(|e| ScrapeError::LoginFailed(format!("login modal: {}", e)))?;

        Ok(LoginSurface::Modal)
    }

    /// Preferred completion signal: the modal root detaches or goes hidden
    /// (for a popup, the window closing). A quiet timeout is optimistic
    /// continuation, not proof of success.
    async fn confirm(
        &self,
        surface: &LoginSurface,
        surface_tab: &headless_chrome::Tab,
        trace: &mut Trace,
    ) -> LoginOutcome {
        let deadline = Instant::now() + Duration::from_millis(self.config.timeout_ms);

        // The popup surface never held the modal root, so there the signal
        // is the credential form going away (or the window closing).
        let signal_selector = match surface {
            LoginSurface::Modal => &self.selectors.login_modal_body,
            LoginSurface::Popup(_) => &self.selectors.email_field,
        };

        while Instant::now() < deadline {
            match self
                .driver
                .is_gone_or_hidden(surface_tab, signal_selector)
                .await
            {
                Ok(true) => {
                    trace.push("Login confirmed: modal detached or hidden".to_string());
                    return LoginOutcome::Confirmed;
                }
                Ok(false) => {}
                // A popup that closed makes the tab unreachable. That is the
                // popup topology's version of detach.
                Err(_) if matches!(surface, LoginSurface::Popup(_)) => {
                    trace.push("Login confirmed: popup window closed".to_string());
                    return LoginOutcome::Confirmed;
                }
                Err(_) => break,
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        warn!("login completion signal never arrived, continuing optimistically");
        trace.push(
            "Login unconfirmed: modal still present after timeout, continuing".to_string(),
        );
        LoginOutcome::Unconfirmed
    }
}
