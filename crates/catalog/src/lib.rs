mod catalog;
pub mod dedup;
pub mod derive;
mod search;

pub use catalog::{Catalog, CatalogStats};
pub use derive::DeriveOptions;
pub use search::{score_match, SearchOptions, TopResults};
