//! dualpage — unified browser-and-HTTP page automation.
//!
//! One page abstraction with two interchangeable backends: a live
//! Chrome/Chromium tab driven over the DevTools protocol, and a
//! stateless HTTP client whose responses parse into a static element
//! tree. A program can switch between them mid-flow while keeping
//! cookies, headers, and the logical URL.
//!
//! ```no_run
//! use dualpage::{Config, DualPage, Mode, RequestOpts};
//!
//! # async fn run() -> dualpage::Result<()> {
//! let mut page = DualPage::new_static("127.0.0.1:9222", Config::load()?);
//! page.get("https://example.com/", &RequestOpts::default()).await?;
//! let _heading = page.ele("tag:h1").await?;
//!
//! // Same logical page, now in a real browser, cookies carried over.
//! page.change_mode(Mode::Live, true, true).await?;
//! let _link = page.ele("text:More information").await?;
//! # Ok(())
//! # }
//! ```
//!
//! Locators are compact strings (`#id`, `.class`, `@name=q`,
//! `tag:div@@class=a@@-hidden`, `text:Sign in`, raw `xpath:`/`css:`)
//! compiled to xpath or CSS by [`Locator::compile`].

pub mod cdp;
pub mod config;
pub mod cookies;
pub mod error;
pub mod keys;
pub mod live;
pub mod locator;
pub mod page;
pub mod statics;

pub use config::{Config, LoadStrategy, RetryConfig, Timeouts};
pub use cookies::Cookie;
pub use error::{DualError, Result};
pub use keys::Keys;
pub use live::{
    AlertState, DialogKind, FrameElement, LiveElement, LiveResult, SelectList, ShadowRootElement,
    Tab, WindowState,
};
pub use locator::{By, LocKind, Locator};
pub use page::{DualPage, Mode, PageResult};
pub use statics::{HttpPage, PostData, RequestOpts, StaticElement, StaticResult};
