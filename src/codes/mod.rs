//! Time-boxed code records and the store that keeps the newest one per site.

mod record;
mod store;

pub use record::{CodeRecord, FetchedCode, WireTimestamp};
pub use store::{CodeStore, Records};
