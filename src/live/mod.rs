pub mod element;
pub mod frame;
pub mod query;
pub mod select;
pub mod tab;
pub mod waiter;

pub use element::LiveElement;
pub use frame::{FrameElement, ShadowRootElement};
pub use query::LiveResult;
pub use select::SelectList;
pub use tab::{AlertState, DialogKind, Tab, WindowState};
