//! Render pass pipeline
//!
//! A frame is an ordered list of [`RenderPass`] trait objects. Passes hold
//! only ids and their own configuration; everything they draw with is
//! resolved through the [`PassContext`] handed to `execute`, so a resize that
//! reallocates targets never leaves a pass with stale handles.

pub mod deferred_pass;
pub mod forward_pass;
pub mod light_pass;
pub mod pbr_pass;
pub mod shadow_pass;
pub mod skybox_pass;
pub mod ssao;
pub mod transparent_pass;
pub mod view_pass;

pub use deferred_pass::DeferredPass;
pub use forward_pass::ForwardPass;
pub use light_pass::LightMarkerPass;
pub use pbr_pass::PbrDeferredPass;
pub use shadow_pass::ShadowBakePass;
pub use skybox_pass::SkyboxPass;
pub use ssao::SsaoKernel;
pub use transparent_pass::TransparentPass;
pub use view_pass::{DebugView, TextureViewPass};

use std::collections::HashMap;
use std::path::Path;

use glam::Vec2;

use crate::backend::{ClearFlags, Device};
use crate::error::EngineResult;
use crate::resources::framebuffer::{Framebuffer, FramebufferDescriptor};
use crate::resources::layout::VertexArray;
use crate::resources::mesh::MeshData;
use crate::resources::shader::Shader;
use crate::resources::texture::{GpuTexture, Texture};
use crate::scene::{Lights, Model, RenderType, Scene};

/// One step of a frame
pub trait RenderPass {
    /// Pass name for logging
    fn name(&self) -> &str;

    /// Record the pass
    fn execute(&self, ctx: &mut PassContext);
}

/// Offscreen targets owned by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetId {
    Deferred,
    PbrDeferred,
    Oit,
    Ssao,
}

impl TargetId {
    pub const ALL: [TargetId; 4] = [
        TargetId::Deferred,
        TargetId::PbrDeferred,
        TargetId::Oit,
        TargetId::Ssao,
    ];

    fn descriptor(&self, width: u32, height: u32) -> FramebufferDescriptor {
        match self {
            TargetId::Deferred => FramebufferDescriptor::deferred(width, height),
            TargetId::PbrDeferred => FramebufferDescriptor::pbr_deferred(width, height),
            TargetId::Oit => FramebufferDescriptor::oit(width, height),
            TargetId::Ssao => FramebufferDescriptor::ssao(width, height),
        }
    }
}

/// Programs loaded from the shader directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderId {
    Forward,
    GBuffer,
    DeferredLighting,
    PbrGBuffer,
    PbrLighting,
    Ssao,
    DirectionalShadow,
    PointShadow,
    Skybox,
    LightMarker,
    Outline,
    OitAccum,
    OitComposite,
    TextureView,
}

impl ShaderId {
    pub const ALL: [ShaderId; 14] = [
        ShaderId::Forward,
        ShaderId::GBuffer,
        ShaderId::DeferredLighting,
        ShaderId::PbrGBuffer,
        ShaderId::PbrLighting,
        ShaderId::Ssao,
        ShaderId::DirectionalShadow,
        ShaderId::PointShadow,
        ShaderId::Skybox,
        ShaderId::LightMarker,
        ShaderId::Outline,
        ShaderId::OitAccum,
        ShaderId::OitComposite,
        ShaderId::TextureView,
    ];

    /// File stem under the shader directory
    pub fn file_name(&self) -> &'static str {
        match self {
            ShaderId::Forward => "forward",
            ShaderId::GBuffer => "g_buffer",
            ShaderId::DeferredLighting => "deferred",
            ShaderId::PbrGBuffer => "pbr_g_buffer",
            ShaderId::PbrLighting => "pbr_deferred",
            ShaderId::Ssao => "ssao",
            ShaderId::DirectionalShadow => "shadow_directional",
            ShaderId::PointShadow => "shadow_point",
            ShaderId::Skybox => "skybox",
            ShaderId::LightMarker => "light_marker",
            ShaderId::Outline => "single_color",
            ShaderId::OitAccum => "oit_accum",
            ShaderId::OitComposite => "oit_composite",
            ShaderId::TextureView => "texture_view",
        }
    }
}

/// Every offscreen target, allocated at the screen size
pub struct RenderTargets {
    targets: HashMap<TargetId, Framebuffer>,
}

impl RenderTargets {
    pub fn new(device: &Device, width: u32, height: u32) -> EngineResult<Self> {
        let mut targets = HashMap::new();
        for id in TargetId::ALL {
            targets.insert(id, Framebuffer::new(device, id.descriptor(width, height))?);
        }
        Ok(Self { targets })
    }

    pub fn get(&self, id: TargetId) -> Option<&Framebuffer> {
        self.targets.get(&id)
    }

    /// Resize every target; `true` if any was reallocated
    pub fn resize(&mut self, width: u32, height: u32) -> EngineResult<bool> {
        let mut resized = false;
        for framebuffer in self.targets.values_mut() {
            resized |= framebuffer.resize(width, height)?;
        }
        Ok(resized)
    }
}

/// Compiled programs by id
#[derive(Default)]
pub struct ShaderLibrary {
    shaders: HashMap<ShaderId, Shader>,
}

impl ShaderLibrary {
    /// Load `<dir>/<file_name>.shader` for every id. Failures stay in as invalid programs.
    pub fn load(device: &Device, dir: &Path) -> Self {
        let mut library = Self::default();
        for id in ShaderId::ALL {
            let path = dir.join(format!("{}.shader", id.file_name()));
            library.insert(id, Shader::from_file(device, path));
        }
        let invalid = library.shaders.values().filter(|s| !s.is_valid()).count();
        if invalid > 0 {
            log::warn!("{} of {} shaders failed to load", invalid, ShaderId::ALL.len());
        }
        library
    }

    pub fn insert(&mut self, id: ShaderId, shader: Shader) {
        self.shaders.insert(id, shader);
    }

    pub fn get(&self, id: ShaderId) -> Option<&Shader> {
        self.shaders.get(&id)
    }
}

/// Geometry and frame-global textures shared by the passes
pub struct FrameResources {
    pub cube: VertexArray,
    pub quad: VertexArray,
    pub ssao_kernel: SsaoKernel,
    /// Skybox cubemap, prefiltered map, BRDF LUT and SSAO noise
    pub environment: Texture,
    /// Empty set binding every material default
    pub fallback: Texture,
}

impl FrameResources {
    pub fn new(
        device: &Device,
        ssao_kernel: SsaoKernel,
        environment: Texture,
        fallback: Texture,
    ) -> EngineResult<Self> {
        Ok(Self {
            cube: MeshData::cube().upload(device)?,
            quad: MeshData::screen_quad().upload(device)?,
            ssao_kernel,
            environment,
            fallback,
        })
    }
}

/// Per-frame values set by the application
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameParams {
    pub width: u32,
    pub height: u32,
    pub debug_mode: i32,
    pub ssao_strength: f32,
}

impl FrameParams {
    pub fn noise_scale(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32) / ssao::NOISE_SIZE as f32
    }
}

/// Everything a pass can reach while it executes
pub struct PassContext<'a> {
    pub device: &'a Device,
    pub scene: &'a Scene,
    pub targets: &'a RenderTargets,
    pub shaders: &'a ShaderLibrary,
    pub resources: &'a FrameResources,
    pub params: FrameParams,
}

impl<'a> PassContext<'a> {
    /// Resolve a target, logging when it is missing
    pub fn target(&self, id: TargetId) -> Option<&'a Framebuffer> {
        let target = self.targets.get(id);
        if target.is_none() {
            log::warn!("render target {:?} is not allocated", id);
        }
        target
    }

    /// Resolve a program, logging when it is missing
    pub fn shader(&self, id: ShaderId) -> Option<&'a Shader> {
        let shader = self.shaders.get(id);
        if shader.is_none() {
            log::warn!("shader {:?} is not loaded", id);
        }
        shader
    }

    pub fn models(&self, render_type: RenderType) -> Vec<&'a Model> {
        self.scene.models(render_type)
    }

    pub fn lights(&self, render_type: RenderType) -> Option<&'a Lights> {
        self.scene.lights(render_type)
    }

    /// Draw the screen quad with `shader` into the bound target
    pub fn draw_fullscreen(&self, shader: &Shader) {
        shader.bind();
        self.resources.quad.draw();
    }

    /// Point `name` at `unit` and bind `texture` there
    pub fn bind_sampler(&self, shader: &Shader, name: &str, unit: u32, texture: &GpuTexture) {
        texture.bind(unit);
        shader.set_int(name, unit as i32);
    }

    /// Copy the depth of `source` (or the default target) into the default target
    pub fn blit_depth_to_default(&self, source: Option<TargetId>) {
        if let Some(framebuffer) = source.and_then(|id| self.target(id)) {
            framebuffer.blit_depth_to_default(self.params.width, self.params.height);
        }
        self.device.bind_framebuffer(None);
    }

    /// Draw outlines of every basic model that has one enabled
    pub fn draw_outlines(&self) {
        let Some(shader) = self.shader(ShaderId::Outline) else {
            return;
        };
        for model in self.models(RenderType::Basic) {
            model.draw_outline(self.device, shader);
        }
    }

    /// Return to the default target and clear its depth
    pub fn begin_default(&self) {
        self.device.bind_framebuffer(None);
        self.device.clear(ClearFlags::DEPTH);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::{FramebufferHandle, HeadlessBackend, ProgramHandle};
    use crate::resources::texture::TextureCache;
    use crate::scene::{LightConfig, LightUnit, ModelKey};
    use std::rc::Rc;

    pub(crate) const SHADER: &str = "#shader vertex\nv\n#shader fragment\nf\n";

    /// Everything a pass needs, over a 320x240 headless device
    pub(crate) struct Fixture {
        pub backend: Rc<HeadlessBackend>,
        pub device: Device,
        pub cache: Rc<TextureCache>,
        pub scene: Scene,
        pub targets: RenderTargets,
        pub shaders: ShaderLibrary,
        pub resources: FrameResources,
        pub params: FrameParams,
    }

    impl Fixture {
        pub fn new() -> Self {
            let backend = Rc::new(HeadlessBackend::new(320, 240));
            let device: Device = backend.clone();
            let cache = Rc::new(TextureCache::new(&device, 2, 16));

            let mut shaders = ShaderLibrary::default();
            for id in ShaderId::ALL {
                shaders.insert(id, Shader::from_source(&device, id.file_name(), SHADER));
            }

            let kernel = SsaoKernel::new(&device, 64).unwrap();
            let mut environment = Texture::new(cache.clone());
            environment.add_noise(&kernel);
            let resources =
                FrameResources::new(&device, kernel, environment, Texture::new(cache.clone()))
                    .unwrap();

            Self {
                targets: RenderTargets::new(&device, 320, 240).unwrap(),
                backend,
                device,
                cache,
                scene: Scene::new(),
                shaders,
                resources,
                params: FrameParams {
                    width: 320,
                    height: 240,
                    debug_mode: 0,
                    ssao_strength: 1.0,
                },
            }
        }

        pub fn add_cube(&mut self, render_type: RenderType) -> ModelKey {
            let model = Model::from_mesh(&self.device, &MeshData::cube(), None).unwrap();
            self.scene.add_model(model, render_type)
        }

        pub fn add_lights(&mut self, units: &[LightUnit]) {
            let config = LightConfig {
                screen_width: 320,
                screen_height: 240,
                ..Default::default()
            };
            let mut lights = Lights::new(&self.device, config).unwrap();
            for unit in units {
                lights.add_light(*unit).unwrap();
            }
            self.scene.set_lights(lights, RenderType::Basic);
        }

        pub fn run(&self, pass: &dyn RenderPass) {
            let mut ctx = PassContext {
                device: &self.device,
                scene: &self.scene,
                targets: &self.targets,
                shaders: &self.shaders,
                resources: &self.resources,
                params: self.params,
            };
            pass.execute(&mut ctx);
        }

        pub fn framebuffer(&self, id: TargetId) -> &Framebuffer {
            self.targets.get(id).unwrap()
        }

        pub fn target(&self, id: TargetId) -> FramebufferHandle {
            self.framebuffer(id).handle()
        }

        pub fn program(&self, id: ShaderId) -> ProgramHandle {
            self.shaders.get(id).unwrap().handle().unwrap()
        }
    }

    #[test]
    fn test_targets_resize_together() {
        let mut fixture = Fixture::new();
        assert!(!fixture.targets.resize(320, 240).unwrap());
        assert!(fixture.targets.resize(640, 480).unwrap());
        for id in TargetId::ALL {
            assert_eq!(fixture.framebuffer(id).width(), 640);
        }
    }

    #[test]
    fn test_missing_shader_directory_yields_invalid_programs() {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = Rc::new(HeadlessBackend::new(64, 64));
        let device: Device = backend.clone();
        let library = ShaderLibrary::load(&device, Path::new("/nonexistent/shaders"));
        for id in ShaderId::ALL {
            assert!(!library.get(id).unwrap().is_valid());
        }
    }
}
