//! Spatial indices for fast raycasting.
//!
//! The mesh representation of a scene is intersected through an 8-ary bounding volume hierarchy
//! whose nodes store the boxes of their children in struct-of-arrays layout.

mod bvh;
mod bvh_builder;

pub use bvh::*;
pub use bvh_builder::*;
