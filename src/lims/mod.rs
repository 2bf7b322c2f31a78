//! LIMS Access
//!
//! Everything the runner knows about B-Fabric goes through the
//! [`LimsClient`] trait:
//!
//! - [`client`]: the `read`/`save`/`delete` contract
//! - [`mock`]: in-process implementation for tests and the `__MOCK` profile
//! - [`entities`]: typed wrappers (Workunit, Resource, Storage, Dataset, ...)
//! - [`cache`]: bounded FIFO memoisation of id lookups
//! - [`config`]: `~/.bfabricpy.yml` environment selection

pub mod cache;
pub mod client;
pub mod config;
pub mod entities;
pub mod mock;

pub use cache::CachingClient;
pub use client::LimsClient;
pub use entities::Entity;
pub use mock::MockClient;
