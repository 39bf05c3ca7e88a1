//! Light position markers

use crate::pipeline::{PassContext, RenderPass, ShaderId, TargetId};

/// Small unlit cubes at every visible light
pub struct LightMarkerPass {
    depth_source: Option<TargetId>,
}

impl LightMarkerPass {
    pub fn new(depth_source: Option<TargetId>) -> Self {
        Self { depth_source }
    }
}

impl RenderPass for LightMarkerPass {
    fn name(&self) -> &str {
        "Light Marker Pass"
    }

    fn execute(&self, ctx: &mut PassContext) {
        ctx.blit_depth_to_default(self.depth_source);
        let Some(shader) = ctx.shader(ShaderId::LightMarker) else {
            return;
        };
        for (_, lights) in ctx.scene.light_sets() {
            lights.draw_markers(shader);
        }
    }
}
