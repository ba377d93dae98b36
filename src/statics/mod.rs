pub mod element;
pub mod session;
pub mod xpath;

pub use element::{StaticElement, StaticResult};
pub use session::{HttpPage, PostData, RequestOpts};
