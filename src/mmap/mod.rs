//! Memory-Mapped File Module
//!
//! Backing files and bounded views onto byte ranges of them.
//!
//! ## Responsibilities
//! - Own one backing file and its mapping object per [`MappedFile`]
//! - Map granularity-aligned windows on demand as [`MappedView`]s
//! - Keep a registry of live views keyed by mapping base address
//! - Resize / reset / close with all views unloaded first
//!
//! ## View Geometry
//! ```text
//!   file:  |......granularity......|......granularity......|
//!                                  ^ mapping_start
//!                                  |--delta--|
//!                                            ^ offset
//!                                            |----length----|
//!                                  |-------mapped_size------|
//! ```
//!
//! ## File States
//! ```text
//!   Closed ──open──▶ Open ──resize(n>0)──▶ Mapped
//!     ▲                                      │
//!     └──────────── reset / close ───────────┘   (unload_all first)
//! ```

mod file;
mod geometry;
pub mod sys;
mod view;

pub use file::MappedFile;
pub use geometry::{align_up, ViewGeometry};
pub use view::MappedView;
