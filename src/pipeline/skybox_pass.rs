//! Environment cubemap drawn behind the scene

use crate::backend::CompareFunction;
use crate::pipeline::{PassContext, RenderPass, ShaderId, TargetId};
use crate::resources::texture::{BindMode, TextureType};

/// Draws the skybox cube at the far plane
pub struct SkyboxPass {
    /// Deferred target whose depth is copied to the screen first
    depth_source: Option<TargetId>,
}

impl SkyboxPass {
    pub fn new(depth_source: Option<TargetId>) -> Self {
        Self { depth_source }
    }
}

impl RenderPass for SkyboxPass {
    fn name(&self) -> &str {
        "Skybox Pass"
    }

    fn execute(&self, ctx: &mut PassContext) {
        ctx.blit_depth_to_default(self.depth_source);

        let Some(shader) = ctx.shader(ShaderId::Skybox) else {
            return;
        };
        let environment = &ctx.resources.environment;
        if environment.first(TextureType::Cubemap).is_none() {
            log::trace!("no skybox cubemap loaded");
            return;
        }

        ctx.device.set_depth_func(CompareFunction::LessEqual);
        environment.bind(shader, BindMode::Single { ty: TextureType::Cubemap, unit: 0 });
        shader.bind();
        ctx.resources.cube.draw();
        ctx.device.set_depth_func(CompareFunction::Less);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ClearFlags, Command, TextureDescriptor, TextureFormat, UniformValue};
    use crate::pipeline::tests::Fixture;
    use crate::resources::texture::GpuTexture;
    use std::rc::Rc;

    fn with_skybox(fixture: &mut Fixture) {
        let cubemap = GpuTexture::new(
            &fixture.device,
            TextureDescriptor::cube("sky", 16, TextureFormat::Rgb16Float),
        )
        .unwrap();
        assert!(fixture
            .resources
            .environment
            .add_texture("sky", TextureType::Cubemap, Rc::new(cubemap)));
    }

    #[test]
    fn test_blits_deferred_depth_before_drawing() {
        let mut fixture = Fixture::new();
        with_skybox(&mut fixture);

        fixture.run(&SkyboxPass::new(Some(TargetId::PbrDeferred)));

        let commands = fixture.backend.commands();
        let first_blit = commands
            .iter()
            .position(|command| {
                *command
                    == Command::Blit {
                        src: Some(fixture.target(TargetId::PbrDeferred)),
                        dst: None,
                        mask: ClearFlags::DEPTH,
                    }
            })
            .unwrap();
        let draw = commands
            .iter()
            .position(|command| matches!(command, Command::Draw { framebuffer: None, .. }))
            .unwrap();
        assert!(first_blit < draw);

        let program = fixture.program(ShaderId::Skybox);
        assert_eq!(fixture.backend.uniform(program, "skybox"), Some(UniformValue::Int(0)));
        assert_eq!(fixture.backend.depth_func(), CompareFunction::Less);
    }

    #[test]
    fn test_forward_rendering_skips_blit() {
        let mut fixture = Fixture::new();
        with_skybox(&mut fixture);
        fixture.run(&SkyboxPass::new(None));

        let commands = fixture.backend.commands();
        assert!(!commands.iter().any(|c| matches!(c, Command::Blit { .. })));
        assert_eq!(fixture.backend.draw_count(), 1);
    }

    #[test]
    fn test_missing_cubemap_draws_nothing() {
        let fixture = Fixture::new();
        fixture.run(&SkyboxPass::new(Some(TargetId::Deferred)));
        assert_eq!(fixture.backend.draw_count(), 0);
    }
}
