//! Models: groups of meshes drawn together

use std::path::{Path, PathBuf};
use std::rc::Rc;

use glam::Vec3;

use crate::backend::{ClearFlags, Device, StencilState};
use crate::error::EngineResult;
use crate::resources::mesh::{Mesh, MeshData};
use crate::resources::shader::Shader;
use crate::resources::texture::{Texture, TextureCache, TextureType};

/// Scale applied to the silhouette pass of an outline
pub const OUTLINE_SCALE: f32 = 1.03;

/// Built-in primitive shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicGeom {
    Screen,
    Plane,
    Cube,
    Sphere,
}

impl BasicGeom {
    pub fn mesh_data(&self) -> MeshData {
        match self {
            BasicGeom::Screen => MeshData::screen_quad(),
            BasicGeom::Plane => MeshData::plane(1.0),
            BasicGeom::Cube => MeshData::cube(),
            BasicGeom::Sphere => MeshData::sphere(32, 18, 1.0),
        }
    }
}

/// Where an imported material texture comes from
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    /// External file, relative to the model's directory
    File,
    /// Embedded compressed image (PNG, JPEG, ...)
    Compressed(Vec<u8>),
    /// Embedded raw pixels
    Raw {
        width: u32,
        height: u32,
        channels: u32,
        bytes: Vec<u8>,
    },
}

/// A texture reference produced by a model importer
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialTexture {
    pub path: String,
    pub ty: TextureType,
    pub source: TextureSource,
}

/// One mesh as produced by a model importer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedMesh {
    pub data: MeshData,
    pub textures: Vec<MaterialTexture>,
}

/// One or more meshes sharing placement and an optional outline
pub struct Model {
    meshes: Vec<Mesh>,
    draw_outline: bool,
    outline_color: Vec3,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            meshes: Vec::new(),
            draw_outline: false,
            outline_color: Vec3::new(245.0, 203.0, 111.0) / 255.0,
        }
    }
}

impl Model {
    pub fn new(meshes: Vec<Mesh>) -> Self {
        Self {
            meshes,
            ..Default::default()
        }
    }

    /// Single-mesh model built from CPU data
    pub fn from_mesh(
        device: &Device,
        data: &MeshData,
        texture: Option<Rc<Texture>>,
    ) -> EngineResult<Self> {
        Ok(Self::new(vec![Mesh::new(device, data, texture)?]))
    }

    /// Build from importer output; file textures resolve against `directory`
    pub fn from_imported(
        device: &Device,
        cache: &Rc<TextureCache>,
        directory: &Path,
        meshes: Vec<ImportedMesh>,
    ) -> EngineResult<Self> {
        let mut model = Self::default();
        for imported in meshes {
            let mut texture = Texture::new(cache.clone());
            for material in &imported.textures {
                let loaded = match &material.source {
                    TextureSource::File => {
                        let path: PathBuf = directory.join(&material.path);
                        texture.add_image(&path, material.ty)
                    }
                    TextureSource::Compressed(bytes) => {
                        texture.add_image_from_memory(&material.path, material.ty, bytes)
                    }
                    TextureSource::Raw {
                        width,
                        height,
                        channels,
                        bytes,
                    } => texture.add_image_from_raw(
                        &material.path,
                        material.ty,
                        *width,
                        *height,
                        *channels,
                        bytes,
                    ),
                };
                if !loaded {
                    log::warn!("model texture {:?} was not loaded", material.path);
                }
            }
            let texture = (!texture.is_empty()).then(|| Rc::new(texture));
            model.meshes.push(Mesh::new(device, &imported.data, texture)?);
        }
        log::debug!("imported model with {} meshes", model.meshes.len());
        Ok(model)
    }

    /// Append a primitive mesh
    pub fn add_basic_geom(
        &mut self,
        device: &Device,
        geom: BasicGeom,
        texture: Option<Rc<Texture>>,
    ) -> EngineResult<()> {
        self.meshes.push(Mesh::new(device, &geom.mesh_data(), texture)?);
        Ok(())
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn meshes_mut(&mut self) -> &mut [Mesh] {
        &mut self.meshes
    }

    pub fn set_position(&mut self, position: Vec3) {
        for mesh in &mut self.meshes {
            mesh.transform_mut().set_position(position);
        }
    }

    /// Euler angles in degrees
    pub fn set_rotation(&mut self, rotation: Vec3) {
        for mesh in &mut self.meshes {
            mesh.transform_mut().set_rotation(rotation);
        }
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        for mesh in &mut self.meshes {
            mesh.transform_mut().set_scale(scale);
        }
    }

    pub fn set_draw_outline(&mut self, draw_outline: bool) {
        self.draw_outline = draw_outline;
    }

    pub fn draws_outline(&self) -> bool {
        self.draw_outline
    }

    pub fn set_outline_color(&mut self, color: Vec3) {
        self.outline_color = color;
    }

    pub fn outline_color(&self) -> Vec3 {
        self.outline_color
    }

    /// Draw every mesh with its textures, `fallback` filling missing ones
    pub fn draw(&self, shader: &Shader, fallback: &Texture) {
        for mesh in &self.meshes {
            mesh.draw(shader, Some(fallback));
        }
    }

    /// Draw geometry only, for depth passes
    pub fn draw_geometry(&self, shader: &Shader) {
        for mesh in &self.meshes {
            mesh.draw(shader, None);
        }
    }

    /// Stencil outline: mark the silhouette, then draw a scaled shell outside it.
    ///
    /// The shell scales each mesh in its own frame; stored transforms are untouched.
    pub fn draw_outline(&self, device: &Device, shader: &Shader) {
        if !self.draw_outline {
            return;
        }

        device.set_depth_test(false);
        device.set_stencil_write_mask(0xFF);
        device.set_stencil(Some(StencilState::write(1)));
        device.clear(ClearFlags::STENCIL);

        device.set_color_write(false);
        self.draw_geometry(shader);

        device.set_stencil(Some(StencilState::outside(1)));
        device.set_stencil_write_mask(0x00);
        device.set_color_write(true);
        shader.bind();
        shader.set_vec3("outlineColor", self.outline_color);
        for mesh in &self.meshes {
            mesh.draw_scaled(shader, OUTLINE_SCALE);
        }

        device.set_stencil_write_mask(0xFF);
        device.set_stencil(None);
        device.set_depth_test(true);
    }
}
