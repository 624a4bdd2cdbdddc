//! Asset loading for the renderer.
//!
//! This crate produces CPU-side data ready for upload:
//! - RGBA8 texture data decoded with the `image` crate
//! - Indexed meshes with vertex deduplication
//! - Procedural fallbacks for both

mod error;
pub mod mesh;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use mesh::{MeshBuilder, MeshData};
pub use texture::TextureData;
