//! `/api/data/:resource[/:id]` handlers. Every call goes through the
//! request mediator; nothing here talks to a store directly.

pub mod collection;
pub mod record;
pub mod utils;

pub use collection::{create, list};
pub use record::{delete, get, update};
