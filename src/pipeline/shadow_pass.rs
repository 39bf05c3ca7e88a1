//! Shadow map baking

use crate::pipeline::{PassContext, RenderPass, ShaderId};
use crate::scene::RenderType;

/// Renders every light set's shadow maps from the basic bucket
pub struct ShadowBakePass;

impl ShadowBakePass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ShadowBakePass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for ShadowBakePass {
    fn name(&self) -> &str {
        "Shadow Bake Pass"
    }

    fn execute(&self, ctx: &mut PassContext) {
        let (Some(directional), Some(point)) = (
            ctx.shader(ShaderId::DirectionalShadow),
            ctx.shader(ShaderId::PointShadow),
        ) else {
            return;
        };

        let models = ctx.models(RenderType::Basic);
        for (render_type, lights) in ctx.scene.light_sets() {
            log::trace!("baking {} shadow maps for {:?}", lights.len(), render_type);
            lights.bake_shadows(directional, point, &models);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, Viewport};
    use crate::pipeline::tests::Fixture;
    use crate::scene::LightUnit;
    use glam::Vec3;

    #[test]
    fn test_bakes_each_shadow_map_and_restores_viewport() {
        let mut fixture = Fixture::new();
        fixture.add_cube(RenderType::Basic);
        fixture.add_cube(RenderType::Transparent);
        fixture.add_lights(&[
            LightUnit::directional(Vec3::new(0.0, -1.0, -1.0), Vec3::ONE),
            LightUnit::point(Vec3::new(0.0, 2.0, 0.0), Vec3::ONE),
        ]);
        let saved = fixture.device.viewport();

        fixture.run(&ShadowBakePass::new());

        let lights = fixture.scene.lights(RenderType::Basic).unwrap();
        let targets: Vec<_> = fixture
            .backend
            .commands()
            .into_iter()
            .filter_map(|command| match command {
                Command::Draw { framebuffer, .. } => framebuffer,
                _ => None,
            })
            .collect();
        // only the basic cube is a shadow caster
        assert_eq!(
            targets,
            vec![lights.shadow_maps()[0].framebuffer(), lights.shadow_maps()[1].framebuffer()]
        );
        assert_eq!(fixture.device.viewport(), saved);
        assert!(fixture
            .backend
            .commands()
            .contains(&Command::SetViewport(Viewport::new(1024, 1024))));
    }

    #[test]
    fn test_without_lights_draws_nothing() {
        let mut fixture = Fixture::new();
        fixture.add_cube(RenderType::Basic);
        fixture.run(&ShadowBakePass::new());
        assert_eq!(fixture.backend.draw_count(), 0);
    }
}
