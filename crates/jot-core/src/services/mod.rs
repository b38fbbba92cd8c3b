//! Shared services used by every front end

mod items;

pub use items::{Committed, ItemService};
