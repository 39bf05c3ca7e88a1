//! Deferred shading: G-buffer, SSAO, then a full-screen lighting resolve

use crate::backend::{ClearFlags, Viewport};
use crate::pipeline::{PassContext, RenderPass, ShaderId, TargetId};
use crate::resources::framebuffer::Framebuffer;
use crate::resources::shader::Shader;
use crate::resources::texture::TextureType;
use crate::scene::RenderType;

/// Blinn-Phong deferred pass over a three-attachment G-buffer
pub struct DeferredPass {
    target: TargetId,
}

impl DeferredPass {
    pub fn new() -> Self {
        Self {
            target: TargetId::Deferred,
        }
    }

    pub fn target(&self) -> TargetId {
        self.target
    }
}

impl Default for DeferredPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for DeferredPass {
    fn name(&self) -> &str {
        "Deferred Pass"
    }

    fn execute(&self, ctx: &mut PassContext) {
        let Some(gbuffer) = ctx.target(self.target) else {
            return;
        };

        if let Some(shader) = ctx.shader(ShaderId::GBuffer) {
            geometry_phase(ctx, gbuffer, shader);
        }
        ssao_phase(ctx, gbuffer);

        let (Some(shader), Some(ssao)) = (
            ctx.shader(ShaderId::DeferredLighting),
            ctx.target(TargetId::Ssao),
        ) else {
            return;
        };
        begin_lighting(ctx, shader);
        for (unit, name) in ["gPosition", "gNormal", "gAlbedoSpec"].into_iter().enumerate() {
            if let Some(texture) = gbuffer.texture(unit) {
                ctx.bind_sampler(shader, name, unit as u32, texture);
            }
        }
        if let Some(texture) = ssao.texture(0) {
            ctx.bind_sampler(shader, "ssao", 3, texture);
        }
        finish_lighting(ctx, shader);
    }
}

/// Clear the G-buffer and draw every basic model into it
pub(crate) fn geometry_phase(ctx: &PassContext, gbuffer: &Framebuffer, shader: &Shader) {
    ctx.device
        .set_viewport(Viewport::new(ctx.params.width, ctx.params.height));
    gbuffer.clear_attachments();
    for model in ctx.models(RenderType::Basic) {
        model.draw(shader, &ctx.resources.fallback);
    }
    gbuffer.unbind();
}

/// Occlusion from G-buffer positions and normals into the SSAO target
pub(crate) fn ssao_phase(ctx: &PassContext, gbuffer: &Framebuffer) {
    let (Some(shader), Some(target)) = (ctx.shader(ShaderId::Ssao), ctx.target(TargetId::Ssao))
    else {
        return;
    };
    let kernel = &ctx.resources.ssao_kernel;

    target.bind();
    ctx.device.clear(ClearFlags::COLOR);
    shader.bind();
    for (unit, name) in ["gPosition", "gNormal"].into_iter().enumerate() {
        if let Some(texture) = gbuffer.texture(unit) {
            ctx.bind_sampler(shader, name, unit as u32, texture);
        }
    }
    ctx.bind_sampler(shader, &TextureType::Noise.sampler_name(0), 2, &kernel.noise());
    shader.set_vec3_array("samples", kernel.samples());
    shader.set_float("ssaoStrength", ctx.params.ssao_strength);
    shader.set_vec2("noiseScale", ctx.params.noise_scale());
    ctx.draw_fullscreen(shader);
    target.unbind();
}

/// Default target with cleared depth, frame uniforms and the basic light set
pub(crate) fn begin_lighting(ctx: &PassContext, shader: &Shader) {
    ctx.device.bind_framebuffer(None);
    ctx.device.clear(ClearFlags::DEPTH);
    shader.bind();
    shader.set_int("debugMode", ctx.params.debug_mode);
    match ctx.lights(RenderType::Basic) {
        Some(lights) => {
            lights.set_light_uniforms(shader);
            lights.bind_shadow(shader);
        }
        None => shader.set_int("numLights", 0),
    }
}

/// Resolve the lighting over the screen, then draw outlines on top
pub(crate) fn finish_lighting(ctx: &PassContext, shader: &Shader) {
    ctx.draw_fullscreen(shader);
    ctx.draw_outlines();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, HeadlessBackend, UniformValue};
    use crate::pipeline::tests::Fixture;

    #[test]
    fn test_deferred_phases_in_order() {
        let mut fixture = Fixture::new();
        fixture.add_cube(RenderType::Basic);
        fixture.backend.clear_commands();

        fixture.run(&DeferredPass::new());

        let gbuffer = fixture.target(TargetId::Deferred);
        let ssao = fixture.target(TargetId::Ssao);
        let draws: Vec<_> = fixture
            .backend
            .commands()
            .into_iter()
            .filter_map(|command| match command {
                Command::Draw { framebuffer, .. } => Some(framebuffer),
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![Some(gbuffer), Some(ssao), None]);
    }

    #[test]
    fn test_gbuffer_is_cleared_to_zero() {
        let fixture = Fixture::new();
        fixture.run(&DeferredPass::new());

        let gbuffer = fixture.target(TargetId::Deferred);
        let cleared: Vec<u32> = fixture
            .backend
            .commands()
            .into_iter()
            .filter_map(|command| match command {
                Command::ClearAttachment {
                    framebuffer,
                    index,
                    value,
                } if framebuffer == Some(gbuffer) && value == [0.0; 4] => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(cleared, vec![0, 1, 2]);
    }

    #[test]
    fn test_lighting_samples_gbuffer_and_ssao() {
        let fixture = Fixture::new();
        fixture.run(&DeferredPass::new());

        let program = fixture.program(ShaderId::DeferredLighting);
        let backend: &HeadlessBackend = &fixture.backend;
        assert_eq!(backend.uniform(program, "gPosition"), Some(UniformValue::Int(0)));
        assert_eq!(backend.uniform(program, "gAlbedoSpec"), Some(UniformValue::Int(2)));
        assert_eq!(backend.uniform(program, "ssao"), Some(UniformValue::Int(3)));
        assert_eq!(backend.uniform(program, "numLights"), Some(UniformValue::Int(0)));

        let ssao = fixture.framebuffer(TargetId::Ssao).texture(0).unwrap().handle();
        assert_eq!(backend.bound_texture(3), Some(ssao));
    }

    #[test]
    fn test_ssao_uniforms() {
        let fixture = Fixture::new();
        fixture.run(&DeferredPass::new());

        let program = fixture.program(ShaderId::Ssao);
        let backend = &fixture.backend;
        assert_eq!(backend.uniform(program, "texNoise"), Some(UniformValue::Int(2)));
        assert_eq!(backend.uniform(program, "ssaoStrength"), Some(UniformValue::Float(1.0)));
        match backend.uniform(program, "samples") {
            Some(UniformValue::Vec3Array(samples)) => assert_eq!(samples.len(), 64),
            other => panic!("unexpected samples uniform {:?}", other),
        }
        assert_eq!(
            backend.uniform(program, "noiseScale"),
            Some(UniformValue::Vec2(glam::Vec2::new(80.0, 60.0)))
        );
    }
}
