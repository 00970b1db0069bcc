//! Raycasting of triangle meshes and signed distance fields.
//!
//! A mesh is either intersected directly through an 8-ary BVH or converted into a dense SDF grid
//! (voxelization followed by redistancing) and optionally into a sparse SDF octree. All
//! representations implement [`scene::Intersect`] and can be combined into a [`scene::Scene`]
//! that is drawn by the [`render::Renderer`].

mod config;
mod error;
mod executor;
mod hit;
pub mod math;
pub mod mesh;
pub mod render;
pub mod scene;
pub mod sdf;
pub mod spatial;
mod stats;

pub use config::*;
pub use error::*;
pub use executor::*;
pub use hit::*;
pub use mesh::Mesh;
pub use stats::*;
