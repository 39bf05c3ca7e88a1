//! Weighted-blended order-independent transparency

use crate::backend::{BlendState, ClearFlags};
use crate::pipeline::{PassContext, RenderPass, ShaderId, TargetId};
use crate::resources::framebuffer::Framebuffer;
use crate::scene::RenderType;

/// Accumulates the transparent bucket, then composites it over the screen
pub struct TransparentPass {
    target: TargetId,
    /// Target holding the opaque depth; `None` reads the default target
    depth_source: Option<TargetId>,
}

impl TransparentPass {
    pub fn new(depth_source: Option<TargetId>) -> Self {
        Self {
            target: TargetId::Oit,
            depth_source,
        }
    }

    fn copy_opaque_depth(&self, ctx: &PassContext, oit: &Framebuffer) {
        match self.depth_source.and_then(|id| ctx.target(id)) {
            Some(source) => source.blit_depth_to(oit),
            None => ctx.device.blit_framebuffer(
                None,
                Some(oit.handle()),
                (ctx.params.width, ctx.params.height),
                (oit.width(), oit.height()),
                ClearFlags::DEPTH,
            ),
        }
    }
}

impl RenderPass for TransparentPass {
    fn name(&self) -> &str {
        "Transparent Pass"
    }

    fn execute(&self, ctx: &mut PassContext) {
        let Some(oit) = ctx.target(self.target) else {
            return;
        };
        let (Some(accum), Some(composite)) = (
            ctx.shader(ShaderId::OitAccum),
            ctx.shader(ShaderId::OitComposite),
        ) else {
            return;
        };

        self.copy_opaque_depth(ctx, oit);

        oit.bind();
        ctx.device.set_blend(Some(BlendState::additive()));
        ctx.device.clear_color_attachment(0, [0.0; 4]);
        ctx.device.clear_color_attachment(1, [0.0; 4]);
        ctx.device.set_depth_write(false);
        for model in ctx.models(RenderType::Transparent) {
            model.draw(accum, &ctx.resources.fallback);
        }
        ctx.device.set_depth_write(true);

        ctx.device.bind_framebuffer(None);
        ctx.device.set_blend(Some(BlendState::alpha_blending()));
        composite.bind();
        for (unit, name) in ["accum_texture", "alpha_texture"].into_iter().enumerate() {
            if let Some(texture) = oit.texture(unit) {
                ctx.bind_sampler(composite, name, unit as u32, texture);
            }
        }
        ctx.draw_fullscreen(composite);
        ctx.device.set_blend(None);
    }
}
