//! GL Render Engine - a pass-based real-time renderer over an OpenGL-class API
//!
//! A frame is an ordered list of render passes driven by the [`Renderer`]:
//! - Shadow baking for directional (2D) and point (cube) lights
//! - Forward, deferred or PBR deferred shading with SSAO
//! - Image-based lighting from an HDRI skybox
//! - Weighted-blended order-independent transparency
//! - Light markers, stencil outlines and a debug texture view
//!
//! The device is a [`backend::GraphicsBackend`] trait object. [`backend::GlBackend`]
//! wraps a `glow` context (feature `gl-backend`); [`backend::HeadlessBackend`]
//! records calls without a GPU and backs the test suite.

pub mod backend;
pub mod error;
pub mod pipeline;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod settings;

use std::path::PathBuf;

pub use error::{EngineError, EngineResult};
pub use pipeline::DebugView;
pub use renderer::Renderer;
pub use settings::Settings;

/// Which geometry/lighting pass the frame uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineKind {
    /// Lit directly into the default target
    Forward,
    /// Blinn-Phong over a G-buffer
    Deferred,
    /// Metallic/roughness over a G-buffer with image-based lighting
    #[default]
    PbrDeferred,
}

/// Configuration for initializing the renderer
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Initial screen width
    pub width: u32,
    /// Initial screen height
    pub height: u32,
    /// Shadow-casting lights allowed per type (directional, point)
    pub max_shadow_map_slots: usize,
    /// Texture units reserved for object materials
    pub max_object_texture_slots: u32,
    /// Textures of one material type a mesh may bind
    pub max_texture_slots_each_type: usize,
    /// Directory holding `<name>.shader` files
    pub shader_dir: PathBuf,
    /// Equirectangular HDR image used for the skybox and IBL
    pub skybox_hdri: PathBuf,
    /// Face size of the environment cubemap
    pub cubemap_size: u32,
    /// Side of the BRDF lookup table
    pub brdf_lut_size: u32,
    /// Hemisphere samples in the SSAO kernel
    pub ssao_kernel_size: usize,
    /// Geometry/lighting pass
    pub pipeline: PipelineKind,
    /// Draw a marker at every visible light
    pub show_lights: bool,
    /// Render the transparent bucket with OIT
    pub transparency: bool,
    /// Overlay a texture full-screen after everything else
    pub debug_view: Option<DebugView>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            max_shadow_map_slots: 4,
            max_object_texture_slots: 16,
            max_texture_slots_each_type: 2,
            shader_dir: PathBuf::from("res/shader"),
            skybox_hdri: PathBuf::from("res/HDRI.hdr"),
            cubemap_size: 1024,
            brdf_lut_size: 512,
            ssao_kernel_size: 64,
            pipeline: PipelineKind::PbrDeferred,
            show_lights: false,
            transparency: false,
            debug_view: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the integer sizing keys of `settings`.
    ///
    /// Zero or negative values keep the default.
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        let read = |key: &str| u32::try_from(settings.get_int(key)).ok().filter(|v| *v > 0);
        Self {
            width: read("SCREEN_WIDTH").unwrap_or(defaults.width),
            height: read("SCREEN_HEIGHT").unwrap_or(defaults.height),
            max_shadow_map_slots: read("MAX_SHADOW_MAP_TEXTURE_SLOTS")
                .map(|v| v as usize)
                .unwrap_or(defaults.max_shadow_map_slots),
            max_object_texture_slots: read("MAX_OBJECT_TEXTURE_SLOTS")
                .unwrap_or(defaults.max_object_texture_slots),
            max_texture_slots_each_type: read("MAX_TEXTURE_SLOTS_EACH_TYPE")
                .map(|v| v as usize)
                .unwrap_or(defaults.max_texture_slots_each_type),
            show_lights: settings.get_bool("SHOW_LIGHTS") || defaults.show_lights,
            transparency: settings.get_bool("TRANSPARENCY") || defaults.transparency,
            ..defaults
        }
    }
}
