//! Shared fixtures for renderer integration tests.
//!
//! Every test gets its own asset directory under the system temp dir with a
//! minimal program for each shader the renderer loads and a tiny HDRI.

use std::path::PathBuf;
use std::rc::Rc;

use gl_render_engine::backend::{Device, HeadlessBackend};
use gl_render_engine::pipeline::ShaderId;
use gl_render_engine::resources::MeshData;
use gl_render_engine::scene::Model;
use gl_render_engine::{EngineConfig, Renderer};

pub const WIDTH: u32 = 320;
pub const HEIGHT: u32 = 240;

const PROGRAM: &str = "#shader vertex\n#version 430 core\nvoid main() {}\n\
#shader fragment\n#version 430 core\nvoid main() {}\n";

const IBL_PROGRAMS: [&str; 3] = ["equirect_to_cubemap", "prefilter", "brdf"];

// ============================================================================
// Assets
// ============================================================================

/// Temp directory holding `shader/` and `HDRI.png`
pub struct Assets {
    pub root: PathBuf,
}

impl Assets {
    pub fn new(name: &str) -> Self {
        let root = std::env::temp_dir().join(format!("gl_render_engine_{}", name));
        let shader_dir = root.join("shader");
        std::fs::create_dir_all(&shader_dir).unwrap();

        let names = ShaderId::ALL
            .iter()
            .map(|id| id.file_name())
            .chain(IBL_PROGRAMS);
        for name in names {
            std::fs::write(shader_dir.join(format!("{}.shader", name)), PROGRAM).unwrap();
        }
        image::RgbImage::from_pixel(16, 8, image::Rgb([90, 160, 255]))
            .save(root.join("HDRI.png"))
            .unwrap();

        Self { root }
    }

    pub fn shader_dir(&self) -> PathBuf {
        self.root.join("shader")
    }

    pub fn hdri(&self) -> PathBuf {
        self.root.join("HDRI.png")
    }

    /// Small sizes so bakes stay cheap
    pub fn config(&self) -> EngineConfig {
        EngineConfig {
            width: WIDTH,
            height: HEIGHT,
            shader_dir: self.shader_dir(),
            skybox_hdri: self.hdri(),
            cubemap_size: 64,
            brdf_lut_size: 32,
            ..Default::default()
        }
    }
}

impl Drop for Assets {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// A headless device plus a renderer over it
pub struct TestContext {
    pub backend: Rc<HeadlessBackend>,
    pub renderer: Renderer,
    pub assets: Assets,
}

impl TestContext {
    pub fn new(name: &str, configure: impl FnOnce(&mut EngineConfig)) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let assets = Assets::new(name);
        let mut config = assets.config();
        configure(&mut config);

        let backend = Rc::new(HeadlessBackend::new(config.width, config.height));
        let renderer = Renderer::new(backend.clone(), config);
        Self {
            backend,
            renderer,
            assets,
        }
    }

    /// Context whose renderer is initialized
    pub fn initialized(name: &str, configure: impl FnOnce(&mut EngineConfig)) -> Self {
        let mut ctx = Self::new(name, configure);
        ctx.renderer.initialize().unwrap();
        ctx
    }

    pub fn device(&self) -> Device {
        self.backend.clone()
    }

    pub fn cube(&self) -> Model {
        Model::from_mesh(&self.device(), &MeshData::cube(), None).unwrap()
    }
}
