//! # Core Module
//!
//! Concurrency primitives shared by the engine's main thread and its workers.
//!
//! ## Key Components
//! - `MtResource`: thread-safe reference-counted resource with read-write locking
//!
//! ## Usage
//! ```rust,ignore
//! use voxel_terrain::core::MtResource;
//!
//! let counter = MtResource::new(0);
//! *counter.get_mut() += 1;
//! assert_eq!(*counter.get(), 1);
//! ```

pub mod mt_resource;

pub use mt_resource::MtResource;
