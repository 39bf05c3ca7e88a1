//! Off-screen render targets.

use crate::backend::{
    AddressMode, Attachment, ClearFlags, Device, FilterMode, FramebufferHandle, FramebufferStatus,
    RenderbufferHandle, TextureDescriptor, TextureFormat, TextureKind,
};
use crate::error::EngineResult;
use crate::resources::texture::GpuTexture;

/// Format of one color attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentConfig {
    pub format: TextureFormat,
    pub filter: FilterMode,
}

impl AttachmentConfig {
    pub fn new(format: TextureFormat) -> Self {
        Self {
            format,
            filter: FilterMode::Nearest,
        }
    }

    pub fn linear(format: TextureFormat) -> Self {
        Self {
            format,
            filter: FilterMode::Linear,
        }
    }
}

/// Framebuffer layout, fixed for the lifetime of the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferDescriptor {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub color_attachments: Vec<AttachmentConfig>,
    /// Attach a DEPTH24_STENCIL8 renderbuffer
    pub depth_stencil: bool,
}

impl FramebufferDescriptor {
    pub fn new(label: &str, width: u32, height: u32) -> Self {
        Self {
            label: label.to_string(),
            width,
            height,
            color_attachments: Vec::new(),
            depth_stencil: false,
        }
    }

    pub fn with_color(mut self, attachment: AttachmentConfig) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_depth_stencil(mut self) -> Self {
        self.depth_stencil = true;
        self
    }

    /// Position, normal and albedo/specular G-buffer
    pub fn deferred(width: u32, height: u32) -> Self {
        Self::new("deferred gbuffer", width, height)
            .with_color(AttachmentConfig::new(TextureFormat::Rgba16Float))
            .with_color(AttachmentConfig::new(TextureFormat::Rgb16Float))
            .with_color(AttachmentConfig::new(TextureFormat::Rgba16Float))
            .with_depth_stencil()
    }

    /// Position, normal, albedo and metallic/roughness/AO G-buffer
    pub fn pbr_deferred(width: u32, height: u32) -> Self {
        Self::new("pbr gbuffer", width, height)
            .with_color(AttachmentConfig::new(TextureFormat::Rgba16Float))
            .with_color(AttachmentConfig::new(TextureFormat::Rgb16Float))
            .with_color(AttachmentConfig::new(TextureFormat::Rgb16Float))
            .with_color(AttachmentConfig::new(TextureFormat::Rgb16Float))
            .with_depth_stencil()
    }

    /// Accumulation and revealage targets for weighted-blended transparency
    pub fn oit(width: u32, height: u32) -> Self {
        Self::new("oit", width, height)
            .with_color(AttachmentConfig::linear(TextureFormat::Rgba16Float))
            .with_color(AttachmentConfig::linear(TextureFormat::R16Float))
            .with_depth_stencil()
    }

    /// Single-channel occlusion target
    pub fn ssao(width: u32, height: u32) -> Self {
        Self::new("ssao", width, height).with_color(AttachmentConfig::new(TextureFormat::R16Float))
    }
}

struct Storage {
    colors: Vec<GpuTexture>,
    depth_stencil: Option<RenderbufferHandle>,
}

/// Framebuffer owning its color textures and depth/stencil renderbuffer
pub struct Framebuffer {
    device: Device,
    handle: FramebufferHandle,
    desc: FramebufferDescriptor,
    storage: Storage,
}

impl Framebuffer {
    pub fn new(device: &Device, desc: FramebufferDescriptor) -> EngineResult<Self> {
        let handle = device.create_framebuffer()?;
        device.bind_framebuffer(Some(handle));
        let storage = Self::allocate(device, &desc);
        device.bind_framebuffer(None);
        let storage = storage?;

        log::debug!(
            "framebuffer {:?}: {}x{}, {} color attachments{}",
            desc.label,
            desc.width,
            desc.height,
            desc.color_attachments.len(),
            if desc.depth_stencil { " + depth/stencil" } else { "" }
        );

        Ok(Self {
            device: device.clone(),
            handle,
            desc,
            storage,
        })
    }

    /// Create and attach storage to the bound framebuffer
    fn allocate(device: &Device, desc: &FramebufferDescriptor) -> EngineResult<Storage> {
        let mut colors = Vec::with_capacity(desc.color_attachments.len());
        for (index, config) in desc.color_attachments.iter().enumerate() {
            let tex_desc = TextureDescriptor::d2(
                &format!("{} color {}", desc.label, index),
                desc.width,
                desc.height,
                config.format,
            )
            .with_filter(config.filter, config.filter)
            .with_address_mode(AddressMode::ClampToEdge);
            let texture = GpuTexture::new(device, tex_desc)?;
            device.attach_texture(
                Attachment::Color(index as u32),
                texture.handle(),
                TextureKind::D2,
                None,
                0,
            );
            colors.push(texture);
        }
        device.set_draw_buffers(colors.len() as u32);

        let depth_stencil = if desc.depth_stencil {
            let rb = device.create_renderbuffer(
                TextureFormat::Depth24PlusStencil8,
                desc.width,
                desc.height,
            )?;
            device.attach_renderbuffer(Attachment::DepthStencil, rb);
            Some(rb)
        } else {
            None
        };

        if let FramebufferStatus::Incomplete(code) = device.framebuffer_status() {
            log::error!("framebuffer {:?} is incomplete (status {:#x})", desc.label, code);
        }

        Ok(Storage {
            colors,
            depth_stencil,
        })
    }

    /// Re-attach existing storage to the bound framebuffer
    fn attach(device: &Device, storage: &Storage) {
        for (index, texture) in storage.colors.iter().enumerate() {
            device.attach_texture(
                Attachment::Color(index as u32),
                texture.handle(),
                TextureKind::D2,
                None,
                0,
            );
        }
        device.set_draw_buffers(storage.colors.len() as u32);
        if let Some(rb) = storage.depth_stencil {
            device.attach_renderbuffer(Attachment::DepthStencil, rb);
        }
    }

    /// Reallocate every attachment at a new size.
    ///
    /// Returns `false` when the size is unchanged and nothing was done.
    pub fn resize(&mut self, width: u32, height: u32) -> EngineResult<bool> {
        if self.desc.width == width && self.desc.height == height {
            return Ok(false);
        }
        let mut desc = self.desc.clone();
        desc.width = width;
        desc.height = height;

        self.device.bind_framebuffer(Some(self.handle));
        let storage = match Self::allocate(&self.device, &desc) {
            Ok(storage) => storage,
            Err(err) => {
                // Partial replacements are gone; put the old attachments back
                Self::attach(&self.device, &self.storage);
                self.device.bind_framebuffer(None);
                return Err(err);
            }
        };
        self.device.bind_framebuffer(None);
        if let Some(rb) = self.storage.depth_stencil.take() {
            self.device.delete_renderbuffer(rb);
        }
        self.storage = storage;
        self.desc = desc;
        log::debug!("framebuffer {:?} resized to {}x{}", self.desc.label, width, height);
        Ok(true)
    }

    pub fn bind(&self) {
        self.device.bind_framebuffer(Some(self.handle));
    }

    pub fn unbind(&self) {
        self.device.bind_framebuffer(None);
    }

    /// Bind and clear every color attachment to zero, plus depth/stencil
    pub fn clear_attachments(&self) {
        self.bind();
        for index in 0..self.storage.colors.len() {
            self.device.clear_color_attachment(index as u32, [0.0; 4]);
        }
        if self.storage.depth_stencil.is_some() {
            self.device.clear(ClearFlags::DEPTH | ClearFlags::STENCIL);
        }
    }

    /// Copy this target's depth into the default framebuffer, leaving it bound
    pub fn blit_depth_to_default(&self, width: u32, height: u32) {
        self.device.blit_framebuffer(
            Some(self.handle),
            None,
            (self.desc.width, self.desc.height),
            (width, height),
            ClearFlags::DEPTH,
        );
        self.device.bind_framebuffer(None);
    }

    /// Copy this target's depth into another target, leaving `dst` bound
    pub fn blit_depth_to(&self, dst: &Framebuffer) {
        self.device.blit_framebuffer(
            Some(self.handle),
            Some(dst.handle),
            (self.desc.width, self.desc.height),
            (dst.desc.width, dst.desc.height),
            ClearFlags::DEPTH,
        );
        self.device.bind_framebuffer(Some(dst.handle));
    }

    /// Color attachment texture by index
    pub fn texture(&self, index: usize) -> Option<&GpuTexture> {
        self.storage.colors.get(index)
    }

    pub fn color_count(&self) -> usize {
        self.storage.colors.len()
    }

    pub fn has_depth_stencil(&self) -> bool {
        self.storage.depth_stencil.is_some()
    }

    pub fn handle(&self) -> FramebufferHandle {
        self.handle
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn descriptor(&self) -> &FramebufferDescriptor {
        &self.desc
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        if let Some(rb) = self.storage.depth_stencil.take() {
            self.device.delete_renderbuffer(rb);
        }
        self.device.delete_framebuffer(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use std::rc::Rc;

    fn device() -> (Rc<HeadlessBackend>, Device) {
        let backend = Rc::new(HeadlessBackend::new(800, 600));
        let device: Device = backend.clone();
        (backend, device)
    }

    #[test]
    fn test_gbuffer_layouts() {
        let (backend, device) = device();
        let deferred = Framebuffer::new(&device, FramebufferDescriptor::deferred(800, 600)).unwrap();
        let pbr = Framebuffer::new(&device, FramebufferDescriptor::pbr_deferred(800, 600)).unwrap();
        let ssao = Framebuffer::new(&device, FramebufferDescriptor::ssao(800, 600)).unwrap();

        assert_eq!(deferred.color_count(), 3);
        assert_eq!(pbr.color_count(), 4);
        assert!(!ssao.has_depth_stencil());
        assert_eq!(backend.draw_buffer_count(pbr.handle()), 4);

        let position = deferred.texture(0).unwrap();
        let desc = backend.texture_descriptor(position.handle()).unwrap();
        assert_eq!(desc.format, TextureFormat::Rgba16Float);
        assert_eq!(desc.min_filter, FilterMode::Nearest);
        assert_eq!(
            backend.attachment(deferred.handle(), Attachment::Color(0)),
            Some(position.handle().0.get())
        );
        assert!(backend
            .attachment(deferred.handle(), Attachment::DepthStencil)
            .is_some());
    }

    #[test]
    fn test_resize_to_same_size_is_noop() {
        let (backend, device) = device();
        let mut fb = Framebuffer::new(&device, FramebufferDescriptor::deferred(800, 600)).unwrap();
        let before = fb.texture(0).unwrap().handle();

        assert!(fb.resize(1024, 768).unwrap());
        let after = fb.texture(0).unwrap().handle();
        assert_ne!(before, after);

        assert!(!fb.resize(1024, 768).unwrap());
        assert_eq!(fb.texture(0).unwrap().handle(), after);

        // Only the live attachment set remains
        assert_eq!(backend.live_textures(), 3);
        assert_eq!(backend.live_renderbuffers(), 1);
        let desc = backend.texture_descriptor(after).unwrap();
        assert_eq!((desc.width, desc.height), (1024, 768));
    }

    #[test]
    fn test_failed_resize_keeps_old_attachments() {
        let (backend, device) = device();
        let mut fb = Framebuffer::new(&device, FramebufferDescriptor::deferred(800, 600)).unwrap();
        let position = fb.texture(0).unwrap().handle();

        backend.set_fail_allocation(true);
        assert!(fb.resize(1024, 768).is_err());
        assert_eq!((fb.width(), fb.height()), (800, 600));
        assert_eq!(fb.texture(0).unwrap().handle(), position);
        assert_eq!(
            backend.attachment(fb.handle(), Attachment::Color(0)),
            Some(position.0.get())
        );
        assert_eq!(backend.live_textures(), 3);
        assert_eq!(backend.live_renderbuffers(), 1);

        // The same size is retried once allocation works again
        backend.set_fail_allocation(false);
        assert!(fb.resize(1024, 768).unwrap());
        assert_eq!((fb.width(), fb.height()), (1024, 768));
        assert_eq!(backend.live_textures(), 3);
    }

    #[test]
    fn test_depth_blits() {
        let (backend, device) = device();
        let gbuffer = Framebuffer::new(&device, FramebufferDescriptor::deferred(800, 600)).unwrap();
        let oit = Framebuffer::new(&device, FramebufferDescriptor::oit(800, 600)).unwrap();

        gbuffer.blit_depth_to(&oit);
        assert_eq!(backend.bound_framebuffer(), Some(oit.handle()));

        gbuffer.blit_depth_to_default(800, 600);
        assert_eq!(backend.bound_framebuffer(), None);

        let blits: Vec<_> = backend
            .commands()
            .into_iter()
            .filter(|c| matches!(c, crate::backend::headless::Command::Blit { .. }))
            .collect();
        assert_eq!(blits.len(), 2);
    }

    #[test]
    fn test_drop_releases_everything() {
        let (backend, device) = device();
        {
            let _fb = Framebuffer::new(&device, FramebufferDescriptor::oit(64, 64)).unwrap();
            assert_eq!(backend.live_framebuffers(), 1);
        }
        assert_eq!(backend.live_framebuffers(), 0);
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(backend.live_renderbuffers(), 0);
    }
}
