//! Filesystem-backed mail record store.

pub mod layout;
pub mod records;
pub mod wire;

pub use layout::Layout;
pub use records::{MailStore, Scope};
