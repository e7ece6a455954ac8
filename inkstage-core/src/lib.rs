//! # inkstage-core
//!
//! Data model for the inkstage canvas engine: typed ids, geometry, color, the
//! object/entity snapshot model, and the interfaces of the external collaborators
//! (state container, bitmap service). No rendering lives here.

pub mod bitmap;
pub mod color;
pub mod container;
pub mod id;
pub mod state;
pub mod units;

pub use id::Id;
