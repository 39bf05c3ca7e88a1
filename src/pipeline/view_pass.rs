//! Full-screen texture overlay for inspecting intermediate results

use crate::pipeline::{PassContext, RenderPass, ShaderId, TargetId};
use crate::resources::texture::{GpuTexture, TextureType};

/// Texture shown by [`TextureViewPass`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugView {
    /// Color attachment `index` of an offscreen target
    Attachment { target: TargetId, index: usize },
    BrdfLut,
    SsaoNoise,
}

/// Draws one texture over the whole screen
pub struct TextureViewPass {
    view: DebugView,
}

impl TextureViewPass {
    pub fn new(view: DebugView) -> Self {
        Self { view }
    }

    fn resolve<'a>(&self, ctx: &PassContext<'a>) -> Option<&'a GpuTexture> {
        let resources = ctx.resources;
        match self.view {
            DebugView::Attachment { target, index } => ctx.target(target)?.texture(index),
            DebugView::BrdfLut => resources
                .environment
                .first(TextureType::Brdf)
                .map(|slot| slot.texture.as_ref()),
            DebugView::SsaoNoise => resources
                .environment
                .first(TextureType::Noise)
                .map(|slot| slot.texture.as_ref()),
        }
    }
}

impl RenderPass for TextureViewPass {
    fn name(&self) -> &str {
        "Texture View Pass"
    }

    fn execute(&self, ctx: &mut PassContext) {
        let Some(shader) = ctx.shader(ShaderId::TextureView) else {
            return;
        };
        let Some(texture) = self.resolve(ctx) else {
            log::warn!("nothing to show for {:?}", self.view);
            return;
        };

        ctx.device.bind_framebuffer(None);
        ctx.device.set_depth_test(false);
        shader.bind();
        ctx.bind_sampler(shader, "texture0", 0, texture);
        ctx.draw_fullscreen(shader);
        ctx.device.set_depth_test(true);
    }
}
