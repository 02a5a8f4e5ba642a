//! Finite catalog of template blocks and the allocation pool over it

pub mod pool;
pub mod registry;

pub use pool::{catalog_sheet_name, parse_catalog_sheet_name, BlockHandle, BlockPool, PoolError};
pub use registry::{BlockTemplate, Catalog, CatalogError};
