//! Metallic/roughness deferred shading with image-based lighting

use crate::pipeline::deferred_pass::{begin_lighting, finish_lighting, geometry_phase, ssao_phase};
use crate::pipeline::{PassContext, RenderPass, ShaderId, TargetId};
use crate::resources::texture::{BindMode, TextureType};

const GBUFFER_SAMPLERS: [&str; 4] = ["gPosition", "gNormal", "gAlbedo", "gMetallicRoughnessAO"];

/// Deferred PBR over a four-attachment G-buffer
pub struct PbrDeferredPass {
    target: TargetId,
}

impl PbrDeferredPass {
    pub fn new() -> Self {
        Self {
            target: TargetId::PbrDeferred,
        }
    }

    pub fn target(&self) -> TargetId {
        self.target
    }
}

impl Default for PbrDeferredPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for PbrDeferredPass {
    fn name(&self) -> &str {
        "PBR Deferred Pass"
    }

    fn execute(&self, ctx: &mut PassContext) {
        let Some(gbuffer) = ctx.target(self.target) else {
            return;
        };

        if let Some(shader) = ctx.shader(ShaderId::PbrGBuffer) {
            geometry_phase(ctx, gbuffer, shader);
        }
        ssao_phase(ctx, gbuffer);

        let Some(shader) = ctx.shader(ShaderId::PbrLighting) else {
            return;
        };
        begin_lighting(ctx, shader);
        for (unit, name) in GBUFFER_SAMPLERS.into_iter().enumerate() {
            if let Some(texture) = gbuffer.texture(unit) {
                ctx.bind_sampler(shader, name, unit as u32, texture);
            }
        }
        if let Some(texture) = ctx.target(TargetId::Ssao).and_then(|ssao| ssao.texture(0)) {
            ctx.bind_sampler(shader, "ssao", 4, texture);
        }
        let environment = &ctx.resources.environment;
        environment.bind(shader, BindMode::Single { ty: TextureType::Brdf, unit: 5 });
        environment.bind(shader, BindMode::Single { ty: TextureType::Prefilter, unit: 6 });
        finish_lighting(ctx, shader);
    }
}
