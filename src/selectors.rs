use serde::{Deserialize, Serialize};

/// Every CSS selector the pipeline touches, as data. When the target site's
/// markup drifts, this is the thing to edit, not the code.
///
/// The login trigger and main photo are cascades: ordered alternatives
/// tried in sequence, because the site has shipped more than one layout for
/// them. Whichever entry hits is reported in the run trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSelectors {
    /// On-page affordances that open the login surface, best guess first.
    pub login_trigger: Vec<String>,
    /// Root of the in-page login modal, when that topology is used.
    pub login_modal_body: String,
    pub email_field: String,
    pub password_field: String,
    pub login_submit: String,
    /// One swatch anchor per color variant.
    pub swatch: String,
    /// Ancestor wrapper class of a swatch, holding the code thumb.
    pub swatch_wrapper_class: String,
    /// Short color code rendered near the swatch.
    pub swatch_code_thumb: String,
    /// The main gallery photo whose src follows the active swatch, best
    /// guess first.
    pub main_photo: Vec<String>,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            login_trigger: vec![
                "a.login.js_popupLogin".to_string(),
                "a.js_popupLogin".to_string(),
            ],
            login_modal_body: "#js_popupSignInBody".to_string(),
            email_field: "#user_email".to_string(),
            password_field: "#user_password".to_string(),
            login_submit: "input.js_popupDoLogin, input[type='submit']".to_string(),
            swatch: "a.js_colorswitch.colorSwitch".to_string(),
            swatch_wrapper_class: "wrapperSwitchColore".to_string(),
            swatch_code_thumb: "div.color-code-thumb".to_string(),
            main_photo: vec![
                "#js_productMainPhoto img.callToZoom".to_string(),
                "#js_productMainPhoto img".to_string(),
            ],
        }
    }
}
