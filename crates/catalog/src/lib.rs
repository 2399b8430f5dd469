//! `catalog` crate — CatalogCache (C1, spec.md §4.1) and the `CatalogSource`
//! contract it reads through (§6.1). `engine` only knows the narrow
//! `WorkflowCatalog` trait; this crate is the swappable definition-source
//! concern, the way `nodes` is the swappable task-execution concern.

pub mod cache;
pub mod source;

pub use cache::{CacheChange, CatalogCache};
pub use source::{CatalogSource, StaticCatalogSource};
