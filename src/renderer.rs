//! Main renderer orchestrator
//!
//! Owns the offscreen targets, programs and frame-global resources, the
//! scene registry and the ordered pass list. The application drives it once
//! per frame:
//!
//! ```ignore
//! renderer.resize_fbo_if_needed(width, height)?;
//! renderer.render_all(&camera)?;
//! ```

use std::rc::Rc;

use crate::backend::{ClearFlags, Device, Viewport};
use crate::error::EngineResult;
use crate::pipeline::{
    DeferredPass, ForwardPass, FrameParams, FrameResources, LightMarkerPass, PassContext,
    PbrDeferredPass, RenderPass, RenderTargets, ShaderLibrary, ShadowBakePass, SkyboxPass,
    SsaoKernel, TargetId, TextureViewPass, TransparentPass,
};
use crate::resources::buffer::UniformBuffer;
use crate::resources::ibl::IblBaker;
use crate::resources::texture::{Texture, TextureCache};
use crate::scene::{
    Camera, CameraUniformData, LightConfig, Lights, Model, ModelKey, RenderType, Scene,
};
use crate::{EngineConfig, PipelineKind};

/// UBO binding point of the camera block `Matrices`
pub const CAMERA_BINDING: u32 = 0;

const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];

/// GPU state created by [`Renderer::initialize`]
struct GpuState {
    targets: RenderTargets,
    shaders: ShaderLibrary,
    resources: FrameResources,
    ibl_baker: IblBaker,
    camera_ubo: UniformBuffer,
}

/// Frame orchestrator: resources, scene and the ordered pass list
pub struct Renderer {
    device: Device,
    config: EngineConfig,
    texture_cache: Rc<TextureCache>,
    scene: Scene,
    gpu: Option<GpuState>,
    passes: Vec<Box<dyn RenderPass>>,
    params: FrameParams,
}

impl Renderer {
    /// Create a renderer; no GPU resources exist until [`Renderer::initialize`]
    pub fn new(device: Device, config: EngineConfig) -> Self {
        let texture_cache = Rc::new(TextureCache::new(
            &device,
            config.max_texture_slots_each_type,
            config.max_object_texture_slots,
        ));
        let params = FrameParams {
            width: config.width,
            height: config.height,
            debug_mode: 0,
            ssao_strength: 1.0,
        };
        Self {
            device,
            config,
            texture_cache,
            scene: Scene::new(),
            gpu: None,
            passes: Vec::new(),
            params,
        }
    }

    /// Allocate targets, load programs and bake the frame-global textures.
    ///
    /// Missing shader or image files are logged and leave invalid programs or
    /// absent textures behind; only allocation failures are returned.
    pub fn initialize(&mut self) -> EngineResult<()> {
        if self.gpu.is_some() {
            log::warn!("renderer is already initialized");
            return Ok(());
        }
        let device = &self.device;
        let (width, height) = (self.params.width, self.params.height);

        let targets = RenderTargets::new(device, width, height)?;
        let shaders = ShaderLibrary::load(device, &self.config.shader_dir);
        let ibl_baker = IblBaker::new(device, &self.config.shader_dir)?;
        let ssao_kernel = SsaoKernel::new(device, self.config.ssao_kernel_size)?;

        let mut environment = Texture::new(self.texture_cache.clone());
        environment.add_noise(&ssao_kernel);
        environment.add_hdri_cubemap(
            &ibl_baker,
            &self.config.skybox_hdri,
            self.config.cubemap_size,
            true,
        );
        environment.add_brdf_lut(&ibl_baker, self.config.brdf_lut_size);

        let resources = FrameResources::new(
            device,
            ssao_kernel,
            environment,
            Texture::new(self.texture_cache.clone()),
        )?;
        let camera_ubo = UniformBuffer::new(
            device,
            CAMERA_BINDING,
            std::mem::size_of::<CameraUniformData>(),
        )?;

        device.set_viewport(Viewport::new(width, height));
        self.gpu = Some(GpuState {
            targets,
            shaders,
            resources,
            ibl_baker,
            camera_ubo,
        });
        log::info!("renderer initialized at {}x{} on {}", width, height, device.name());
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.gpu.is_some()
    }

    /// Rebuild the ordered pass list from the configuration
    pub fn setup_render_passes(&mut self) {
        let depth_source = self.deferred_target();
        // Light sets may be registered after setup, so the bake always runs
        let mut passes: Vec<Box<dyn RenderPass>> = vec![Box::new(ShadowBakePass::new())];
        match self.config.pipeline {
            PipelineKind::Forward => passes.push(Box::new(ForwardPass::new())),
            PipelineKind::Deferred => passes.push(Box::new(DeferredPass::new())),
            PipelineKind::PbrDeferred => passes.push(Box::new(PbrDeferredPass::new())),
        }
        passes.push(Box::new(SkyboxPass::new(depth_source)));
        if self.config.show_lights {
            passes.push(Box::new(LightMarkerPass::new(depth_source)));
        }
        if self.config.transparency {
            passes.push(Box::new(TransparentPass::new(depth_source)));
        }
        if let Some(view) = self.config.debug_view {
            passes.push(Box::new(TextureViewPass::new(view)));
        }

        self.passes = passes;
        log::info!("render passes: {:?}", self.pass_names());
    }

    /// Names of the current passes in execution order
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// The G-buffer target the configured pipeline renders into
    pub fn deferred_target(&self) -> Option<TargetId> {
        match self.config.pipeline {
            PipelineKind::Forward => None,
            PipelineKind::Deferred => Some(TargetId::Deferred),
            PipelineKind::PbrDeferred => Some(TargetId::PbrDeferred),
        }
    }

    /// Track a new screen size. Returns `false` when nothing changed.
    pub fn resize_fbo_if_needed(&mut self, width: u32, height: u32) -> EngineResult<bool> {
        if (width, height) == (self.params.width, self.params.height) {
            return Ok(false);
        }
        if width == 0 || height == 0 {
            log::debug!("ignoring resize to {}x{}", width, height);
            return Ok(false);
        }

        // The new size is committed only once every reallocation succeeded
        if let Some(gpu) = &mut self.gpu {
            gpu.targets.resize(width, height)?;
        }
        for lights in self.scene.light_sets_mut() {
            lights.set_screen_size(width, height)?;
        }
        if self.gpu.is_some() {
            self.device.set_viewport(Viewport::new(width, height));
        }
        self.params.width = width;
        self.params.height = height;
        self.config.width = width;
        self.config.height = height;
        log::info!("resized render targets to {}x{}", width, height);
        Ok(true)
    }

    /// Render one frame from `camera`
    pub fn render_all(&mut self, camera: &Camera) -> EngineResult<()> {
        let Some(gpu) = &mut self.gpu else {
            log::warn!("render_all called before initialize");
            return Ok(());
        };

        gpu.camera_ubo.reset();
        gpu.camera_ubo.push_data(&camera.uniform_data())?;
        gpu.camera_ubo.bind();

        let device = &self.device;
        device.bind_framebuffer(None);
        device.set_viewport(Viewport::new(self.params.width, self.params.height));
        device.set_clear_color(CLEAR_COLOR);
        device.clear(ClearFlags::ALL);

        let mut ctx = PassContext {
            device,
            scene: &self.scene,
            targets: &gpu.targets,
            shaders: &gpu.shaders,
            resources: &gpu.resources,
            params: self.params,
        };
        for pass in &self.passes {
            pass.execute(&mut ctx);
            while let Some(code) = device.check_error() {
                log::error!("{}: GL error {:#x}", pass.name(), code);
            }
        }
        Ok(())
    }

    // Scene registration

    pub fn add_model(&mut self, model: Model, render_type: RenderType) -> ModelKey {
        self.scene.add_model(model, render_type)
    }

    pub fn model_mut(&mut self, key: ModelKey) -> Option<&mut Model> {
        self.scene.model_mut(key)
    }

    pub fn remove_model(&mut self, key: ModelKey) -> Option<Model> {
        self.scene.remove_model(key)
    }

    /// Move a model to another bucket; it leaves its previous one
    pub fn set_model_render_type(&mut self, key: ModelKey, render_type: RenderType) -> bool {
        self.scene.set_render_type(key, render_type)
    }

    /// Install the light set used by passes of `render_type`
    pub fn add_lights(&mut self, lights: Lights, render_type: RenderType) {
        if self.scene.set_lights(lights, render_type).is_some() {
            log::debug!("replaced {:?} light set", render_type);
        }
    }

    pub fn lights_mut(&mut self, render_type: RenderType) -> Option<&mut Lights> {
        self.scene.lights_mut(render_type)
    }

    /// Empty light set sized for this renderer
    pub fn new_lights(&self) -> EngineResult<Lights> {
        Lights::new(&self.device, self.light_config())
    }

    pub fn light_config(&self) -> LightConfig {
        LightConfig {
            max_shadow_map_slots: self.config.max_shadow_map_slots,
            max_object_texture_slots: self.config.max_object_texture_slots,
            screen_width: self.params.width,
            screen_height: self.params.height,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    // Material setup

    pub fn texture_cache(&self) -> &Rc<TextureCache> {
        &self.texture_cache
    }

    /// Empty texture set backed by the shared cache
    pub fn new_texture(&self) -> Texture {
        Texture::new(self.texture_cache.clone())
    }

    pub fn ibl_baker(&self) -> Option<&IblBaker> {
        self.gpu.as_ref().map(|gpu| &gpu.ibl_baker)
    }

    /// Skybox, prefilter, BRDF LUT and noise textures
    pub fn environment(&self) -> Option<&Texture> {
        self.gpu.as_ref().map(|gpu| &gpu.resources.environment)
    }

    pub fn targets(&self) -> Option<&RenderTargets> {
        self.gpu.as_ref().map(|gpu| &gpu.targets)
    }

    pub fn shaders(&self) -> Option<&ShaderLibrary> {
        self.gpu.as_ref().map(|gpu| &gpu.shaders)
    }

    // Frame parameters

    /// Value of the `debugMode` uniform
    pub fn set_debug_mode(&mut self, mode: i32) {
        self.params.debug_mode = mode;
    }

    pub fn debug_mode(&self) -> i32 {
        self.params.debug_mode
    }

    /// Value of the `ssaoStrength` uniform
    pub fn set_ssao_strength(&mut self, strength: f32) {
        self.params.ssao_strength = strength;
    }

    pub fn ssao_strength(&self) -> f32 {
        self.params.ssao_strength
    }

    pub fn size(&self) -> (u32, u32) {
        (self.params.width, self.params.height)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    fn renderer(config: EngineConfig) -> (Rc<HeadlessBackend>, Renderer) {
        let backend = Rc::new(HeadlessBackend::new(config.width, config.height));
        let renderer = Renderer::new(backend.clone(), config);
        (backend, renderer)
    }

    #[test]
    fn test_render_before_initialize_is_a_no_op() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (backend, mut renderer) = renderer(EngineConfig::default());
        renderer.setup_render_passes();
        renderer.render_all(&Camera::default()).unwrap();
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn test_deferred_target_follows_pipeline() {
        for (pipeline, expected) in [
            (PipelineKind::Forward, None),
            (PipelineKind::Deferred, Some(TargetId::Deferred)),
            (PipelineKind::PbrDeferred, Some(TargetId::PbrDeferred)),
        ] {
            let config = EngineConfig {
                pipeline,
                ..Default::default()
            };
            let (_, renderer) = renderer(config);
            assert_eq!(renderer.deferred_target(), expected);
        }
    }

    #[test]
    fn test_light_config_tracks_screen_size() {
        let (_, mut renderer) = renderer(EngineConfig::default());
        assert!(renderer.resize_fbo_if_needed(800, 600).unwrap());
        assert!(!renderer.resize_fbo_if_needed(0, 600).unwrap());

        let config = renderer.light_config();
        assert_eq!((config.screen_width, config.screen_height), (800, 600));
        assert_eq!(config.max_object_texture_slots, 16);
    }

    #[test]
    fn test_frame_parameters() {
        let (_, mut renderer) = renderer(EngineConfig::default());
        assert_eq!(renderer.ssao_strength(), 1.0);
        renderer.set_debug_mode(3);
        renderer.set_ssao_strength(0.5);
        assert_eq!(renderer.debug_mode(), 3);
        assert_eq!(renderer.ssao_strength(), 0.5);
    }
}
