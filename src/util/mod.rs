//! Shared Utilities
//!
//! Helpers used across phases:
//!
//! - [`checksum`]: md5 digests of local files
//! - [`paths`]: home expansion, lexical normalisation, relative paths
//! - [`process`]: spawning child processes with logging
//! - [`scp`]: file transfers to and from storage hosts
//! - [`table`]: string tables with CSV and parquet export

pub mod checksum;
pub mod paths;
pub mod process;
pub mod scp;
pub mod table;

pub use checksum::md5sum;
pub use scp::scp;
pub use table::Table;
