//! Forward shading of the basic bucket straight into the default target

use crate::backend::{ClearFlags, Viewport};
use crate::pipeline::{PassContext, RenderPass, ShaderId};
use crate::scene::RenderType;

/// Opaque forward pass: one lit draw per mesh, outlines on top
pub struct ForwardPass;

impl ForwardPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ForwardPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for ForwardPass {
    fn name(&self) -> &str {
        "Forward Pass"
    }

    fn execute(&self, ctx: &mut PassContext) {
        let Some(shader) = ctx.shader(ShaderId::Forward) else {
            return;
        };

        ctx.device.bind_framebuffer(None);
        ctx.device
            .set_viewport(Viewport::new(ctx.params.width, ctx.params.height));
        ctx.device.clear(ClearFlags::DEPTH | ClearFlags::STENCIL);

        shader.bind();
        shader.set_int("debugMode", ctx.params.debug_mode);
        match ctx.lights(RenderType::Basic) {
            Some(lights) => {
                lights.set_light_uniforms(shader);
                lights.bind_shadow(shader);
            }
            None => shader.set_int("numLights", 0),
        }

        for model in ctx.models(RenderType::Basic) {
            model.draw(shader, &ctx.resources.fallback);
        }
        ctx.draw_outlines();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, UniformValue};
    use crate::pipeline::tests::Fixture;
    use crate::scene::LightUnit;
    use glam::Vec3;

    #[test]
    fn test_draws_basic_models_on_default_target() {
        let mut fixture = Fixture::new();
        fixture.add_cube(RenderType::Basic);
        fixture.add_cube(RenderType::Basic);
        fixture.add_cube(RenderType::Transparent);

        fixture.run(&ForwardPass::new());

        let program = fixture.program(ShaderId::Forward);
        let draws: Vec<_> = fixture
            .backend
            .commands()
            .into_iter()
            .filter(|command| matches!(command, Command::Draw { .. }))
            .collect();
        assert_eq!(draws.len(), 2);
        for draw in draws {
            assert!(matches!(
                draw,
                Command::Draw { framebuffer: None, program: Some(p), .. } if p == program
            ));
        }
    }

    #[test]
    fn test_binds_lights_and_shadow_units() {
        let mut fixture = Fixture::new();
        fixture.add_lights(&[
            LightUnit::directional(Vec3::NEG_Y, Vec3::ONE),
            LightUnit::point(Vec3::Y, Vec3::ONE),
        ]);
        fixture.run(&ForwardPass::new());

        let program = fixture.program(ShaderId::Forward);
        let backend = &fixture.backend;
        assert_eq!(backend.uniform(program, "numLights"), Some(UniformValue::Int(2)));
        assert_eq!(
            backend.uniform(program, "shadowMaps"),
            Some(UniformValue::IntArray(vec![16, 17, 18, 19]))
        );
        assert_eq!(
            backend.uniform(program, "shadowCubeMaps"),
            Some(UniformValue::IntArray(vec![20, 21, 22, 23]))
        );

        let lights = fixture.scene.lights(RenderType::Basic).unwrap();
        assert_eq!(
            backend.bound_texture(20),
            Some(lights.shadow_maps()[1].texture().handle())
        );
    }

    #[test]
    fn test_outlined_model_draws_twice_more() {
        let mut fixture = Fixture::new();
        let key = fixture.add_cube(RenderType::Basic);
        fixture.scene.model_mut(key).unwrap().set_draw_outline(true);

        fixture.run(&ForwardPass::new());
        assert_eq!(fixture.backend.draw_count(), 3);
        assert_eq!(fixture.backend.stencil(), None);
    }
}
