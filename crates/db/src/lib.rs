//! `db` crate — the persistence layer backing `ExecutionRecorder` (C10) and
//! the optional Postgres-backed `catalog::CatalogSource` reference
//! implementation. Connection pool, typed row structs, and repository
//! functions; no business logic lives here — that's `engine`'s job.

pub mod catalog_source;
pub mod error;
pub mod models;
pub mod pool;
pub mod repository;

pub use catalog_source::PgCatalogSource;
pub use error::DbError;
pub use pool::DbPool;
pub use repository::executions::PgExecutionRecorder;
