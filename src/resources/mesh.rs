//! Mesh data, primitive generators and GPU meshes

use std::f32::consts::PI;
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use crate::backend::{Device, ElementKind};
use crate::error::EngineResult;
use crate::resources::buffer::{IndexBuffer, VertexBuffer};
use crate::resources::layout::{VertexArray, VertexLayout};
use crate::resources::shader::Shader;
use crate::resources::texture::{BindMode, Texture};
use crate::scene::transform::Transform;

/// Interleaved mesh vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub tangent: Vec3,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            normal,
            uv,
            tangent: Vec3::ZERO,
        }
    }

    /// Attribute layout matching the field order
    pub fn layout() -> VertexLayout {
        let mut layout = VertexLayout::new();
        layout
            .push(ElementKind::Float, 3)
            .push(ElementKind::Float, 3)
            .push(ElementKind::Float, 2)
            .push(ElementKind::Float, 3);
        layout
    }
}

/// CPU-side indexed triangle list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Unit cube centered at the origin, four vertices per face
    pub fn cube() -> Self {
        // (normal, u axis, v axis) per face
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        ];
        let corners = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];

        let mut data = Self::default();
        for (normal, u_axis, v_axis) in faces {
            let base = data.vertices.len() as u32;
            for uv in corners {
                let position =
                    normal * 0.5 + u_axis * (uv.x - 0.5) + v_axis * (uv.y - 0.5);
                data.vertices.push(Vertex {
                    position,
                    normal,
                    uv,
                    tangent: u_axis,
                });
            }
            data.indices
                .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        data
    }

    /// Quad covering clip space, facing +Z
    pub fn screen_quad() -> Self {
        let vertices = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
            .into_iter()
            .map(|(x, y)| Vertex {
                position: Vec3::new(x, y, 0.0),
                normal: Vec3::Z,
                uv: Vec2::new((x + 1.0) * 0.5, (y + 1.0) * 0.5),
                tangent: Vec3::X,
            })
            .collect();
        Self::new(vertices, vec![0, 1, 2, 2, 3, 0])
    }

    /// Square on the XZ plane with tiled UVs
    pub fn plane(size: f32) -> Self {
        let half = size * 0.5;
        let vertices = [(-half, half), (half, half), (half, -half), (-half, -half)]
            .into_iter()
            .map(|(x, z)| Vertex {
                position: Vec3::new(x, 0.0, z),
                normal: Vec3::Y,
                uv: Vec2::new(x + half, half - z),
                tangent: Vec3::X,
            })
            .collect();
        Self::new(vertices, vec![0, 1, 2, 2, 3, 0])
    }

    /// UV sphere with `sectors` longitudes and `stacks` latitudes
    pub fn sphere(sectors: u32, stacks: u32, radius: f32) -> Self {
        let sectors = sectors.max(3);
        let stacks = stacks.max(2);
        let mut data = Self::default();

        for stack in 0..=stacks {
            let v = stack as f32 / stacks as f32;
            let polar = v * PI;
            for sector in 0..=sectors {
                let u = sector as f32 / sectors as f32;
                let azimuth = u * 2.0 * PI;
                let normal = Vec3::new(
                    polar.sin() * azimuth.cos(),
                    polar.cos(),
                    polar.sin() * azimuth.sin(),
                );
                data.vertices.push(Vertex {
                    position: normal * radius,
                    normal,
                    uv: Vec2::new(u, 1.0 - v),
                    tangent: Vec3::new(-azimuth.sin(), 0.0, azimuth.cos()),
                });
            }
        }

        let row = sectors + 1;
        for stack in 0..stacks {
            for sector in 0..sectors {
                let top = stack * row + sector;
                let bottom = top + row;
                // Poles collapse to degenerate triangles; skip them
                if stack != 0 {
                    data.indices.extend_from_slice(&[top, top + 1, bottom]);
                }
                if stack != stacks - 1 {
                    data.indices.extend_from_slice(&[top + 1, bottom + 1, bottom]);
                }
            }
        }
        data
    }

    /// Upload into a vertex array with the [`Vertex`] layout
    pub fn upload(&self, device: &Device) -> EngineResult<VertexArray> {
        let vertices = VertexBuffer::new(device, bytemuck::cast_slice(&self.vertices))?;
        let indices = if self.indices.is_empty() {
            None
        } else {
            Some(IndexBuffer::new(device, &self.indices)?)
        };
        VertexArray::new(device, vertices, indices, Vertex::layout())
    }
}

/// GPU mesh: geometry, placement and an optional shared texture set
pub struct Mesh {
    vertex_array: VertexArray,
    transform: Transform,
    texture: Option<Rc<Texture>>,
}

impl Mesh {
    pub fn new(device: &Device, data: &MeshData, texture: Option<Rc<Texture>>) -> EngineResult<Self> {
        Ok(Self {
            vertex_array: data.upload(device)?,
            transform: Transform::default(),
            texture,
        })
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    pub fn texture(&self) -> Option<&Rc<Texture>> {
        self.texture.as_ref()
    }

    pub fn set_texture(&mut self, texture: Option<Rc<Texture>>) {
        self.texture = texture;
    }

    pub fn vertex_array(&self) -> &VertexArray {
        &self.vertex_array
    }

    /// Draw with `shader`.
    ///
    /// With `fallback` set, the mesh's textures are bound first. A mesh without
    /// its own texture set binds `fallback`, which fills every material slot
    /// with defaults. Depth-only passes pass `None`.
    pub fn draw(&self, shader: &Shader, fallback: Option<&Texture>) {
        shader.bind();
        if let Some(fallback) = fallback {
            let texture = self.texture.as_deref().unwrap_or(fallback);
            texture.bind(shader, BindMode::All);
        }
        shader.set_mat4("model", self.transform.matrix());
        self.vertex_array.draw();
    }

    /// Draw geometry only, uniformly scaled about the mesh origin
    pub fn draw_scaled(&self, shader: &Shader, factor: f32) {
        shader.bind();
        shader.set_mat4(
            "model",
            self.transform.matrix() * Mat4::from_scale(Vec3::splat(factor)),
        );
        self.vertex_array.draw();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_matches_struct() {
        let layout = Vertex::layout();
        assert_eq!(layout.stride() as usize, std::mem::size_of::<Vertex>());
        assert_eq!(layout.offsets(), vec![0, 12, 24, 32]);
    }

    #[test]
    fn test_cube_faces_point_outward() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.triangle_count(), 12);
        for vertex in &cube.vertices {
            assert!((vertex.position.dot(vertex.normal) - 0.5).abs() < 1e-6);
            assert!(vertex.position.abs().max_element() <= 0.5 + 1e-6);
        }
    }

    #[test]
    fn test_sphere_vertices_lie_on_radius() {
        let sphere = MeshData::sphere(32, 18, 2.0);
        assert_eq!(sphere.vertices.len(), 33 * 19);
        // two triangles per quad minus one per pole row
        assert_eq!(sphere.triangle_count(), 32 * 18 * 2 - 2 * 32);
        for vertex in &sphere.vertices {
            assert!((vertex.position.length() - 2.0).abs() < 1e-4);
        }
        let max_index = *sphere.indices.iter().max().unwrap();
        assert!((max_index as usize) < sphere.vertices.len());
    }

    #[test]
    fn test_screen_quad_covers_clip_space() {
        let quad = MeshData::screen_quad();
        let min = quad
            .vertices
            .iter()
            .fold(Vec3::splat(f32::MAX), |acc, v| acc.min(v.position));
        assert_eq!(min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(quad.vertices[2].uv, Vec2::ONE);
    }
}
