pub mod browser;
pub mod color;
pub mod errors;
pub mod login;
pub mod packager;
pub mod report;
pub mod resolver;
pub mod scrape;
pub mod selectors;
pub mod session;
pub mod types;
pub mod walker;

pub use browser::PageDriver;
pub use color::{ColorMatcher, MatchRule, SynonymTable};
pub use errors::ScrapeError;
pub use login::{LoginFlow, LoginOutcome, LoginState};
pub use report::{RunReport, Trace};
pub use resolver::{ImageResolver, ResolvedImage};
pub use scrape::{scrape_product_images, scrape_with};
pub use selectors::SiteSelectors;
pub use session::HttpSession;
pub use types::*;
pub use walker::{SwatchControl, VariantObservation, VariantWalker};
