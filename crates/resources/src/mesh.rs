//! Indexed mesh data.

use std::collections::HashMap;

use glam::{Vec2, Vec3};
use tracing::debug;
use vkforge_rhi::vertex::Vertex;

use crate::error::{ResourceError, ResourceResult};

/// Vertex and `u32` index lists ready for upload.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Checks that the mesh is non-empty and every index is in range.
    pub fn validate(&self) -> ResourceResult<()> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(ResourceError::InvalidMesh("mesh has no geometry".to_string()));
        }
        if let Some(&bad) = self
            .indices
            .iter()
            .find(|&&i| i as usize >= self.vertices.len())
        {
            return Err(ResourceError::InvalidMesh(format!(
                "index {} out of range for {} vertices",
                bad,
                self.vertices.len()
            )));
        }
        Ok(())
    }

    /// Two textured quads, one at z = 0 and one at z = -0.5 behind it.
    pub fn textured_quads() -> Self {
        let corners = [
            (Vec2::new(-0.5, -0.5), Vec3::new(1.0, 0.0, 0.0), Vec2::new(0.0, 0.0)),
            (Vec2::new(0.5, -0.5), Vec3::new(0.0, 1.0, 0.0), Vec2::new(1.0, 0.0)),
            (Vec2::new(0.5, 0.5), Vec3::new(0.0, 0.0, 1.0), Vec2::new(1.0, 1.0)),
            (Vec2::new(-0.5, 0.5), Vec3::new(1.0, 1.0, 1.0), Vec2::new(0.0, 1.0)),
        ];

        let mut builder = MeshBuilder::new();
        for z in [0.0, -0.5] {
            let quad = corners.map(|(xy, color, uv)| Vertex::new(xy.extend(z), color, uv));
            builder.push_triangle([quad[0], quad[1], quad[2]]);
            builder.push_triangle([quad[2], quad[3], quad[0]]);
        }
        builder.build()
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// Accumulates vertices, assigning each distinct vertex one index.
#[derive(Debug, Default)]
pub struct MeshBuilder {
    unique: HashMap<Vertex, u32>,
    mesh: MeshData,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a vertex, reusing the index of an identical earlier one.
    pub fn push(&mut self, vertex: Vertex) -> u32 {
        let vertices = &mut self.mesh.vertices;
        let index = *self.unique.entry(vertex).or_insert_with(|| {
            vertices.push(vertex);
            (vertices.len() - 1) as u32
        });
        self.mesh.indices.push(index);
        index
    }

    pub fn push_triangle(&mut self, triangle: [Vertex; 3]) {
        for vertex in triangle {
            self.push(vertex);
        }
    }

    pub fn build(self) -> MeshData {
        debug!(
            "Mesh built: {} unique vertices, {} indices",
            self.mesh.vertices.len(),
            self.mesh.indices.len()
        );
        self.mesh
    }
}

impl Extend<Vertex> for MeshBuilder {
    fn extend<I: IntoIterator<Item = Vertex>>(&mut self, iter: I) {
        for vertex in iter {
            self.push(vertex);
        }
    }
}
