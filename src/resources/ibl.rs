//! Image-based lighting bakes
//!
//! Every bake is a GPU round-trip: the equirectangular HDRI is rendered onto
//! the six faces of a cubemap, the cubemap is convolved into a roughness mip
//! chain, and the split-sum BRDF is rendered into a 2D lookup table.

use std::path::Path;

use glam::{Mat4, Vec3};

use crate::backend::{
    AddressMode, Attachment, ClearFlags, CubeFace, Device, FilterMode, FramebufferHandle,
    FramebufferStatus, PixelType, RenderbufferHandle, TextureDescriptor, TextureFormat,
    TextureKind, Viewport,
};
use crate::error::EngineResult;
use crate::resources::layout::VertexArray;
use crate::resources::mesh::MeshData;
use crate::resources::shader::Shader;
use crate::resources::texture::GpuTexture;

/// Mip levels of a prefiltered environment map
pub const PREFILTER_MIP_LEVELS: u32 = 5;

/// Projection shared by every cube-face capture
fn capture_projection() -> Mat4 {
    Mat4::perspective_rh_gl(90.0f32.to_radians(), 1.0, 0.1, 10.0)
}

fn capture_view(face: CubeFace) -> Mat4 {
    let (direction, up) = face.view_basis();
    Mat4::look_at_rh(Vec3::ZERO, direction, up)
}

/// Offscreen framebuffer with a resizable depth renderbuffer
struct CaptureTarget {
    device: Device,
    framebuffer: FramebufferHandle,
    depth: Option<RenderbufferHandle>,
}

impl CaptureTarget {
    fn new(device: &Device) -> EngineResult<Self> {
        let framebuffer = device.create_framebuffer()?;
        Ok(Self {
            device: device.clone(),
            framebuffer,
            depth: None,
        })
    }

    /// Bind and give the target a depth buffer of `size`
    fn bind(&mut self, size: u32) -> EngineResult<()> {
        self.device.bind_framebuffer(Some(self.framebuffer));
        if let Some(old) = self.depth.take() {
            self.device.delete_renderbuffer(old);
        }
        let depth = self
            .device
            .create_renderbuffer(TextureFormat::Depth32Float, size, size)?;
        self.device.attach_renderbuffer(Attachment::Depth, depth);
        self.depth = Some(depth);
        self.device.set_viewport(Viewport::new(size, size));
        Ok(())
    }

    fn attach(&self, texture: &GpuTexture, face: Option<CubeFace>, level: u32) {
        self.device
            .attach_texture(Attachment::Color(0), texture.handle(), texture.kind(), face, level);
        self.device.set_draw_buffers(1);
        if let FramebufferStatus::Incomplete(code) = self.device.framebuffer_status() {
            log::error!("IBL capture target is incomplete (status {:#x})", code);
        }
    }
}

impl Drop for CaptureTarget {
    fn drop(&mut self) {
        if let Some(depth) = self.depth.take() {
            self.device.delete_renderbuffer(depth);
        }
        self.device.delete_framebuffer(self.framebuffer);
    }
}

/// Renders IBL inputs: environment cubemaps, prefiltered maps and the BRDF LUT
pub struct IblBaker {
    device: Device,
    equirect_to_cubemap: Shader,
    prefilter: Shader,
    brdf: Shader,
    cube: VertexArray,
    quad: VertexArray,
}

impl IblBaker {
    /// Load the bake programs from `<shader_dir>/{equirect_to_cubemap,prefilter,brdf}.shader`
    pub fn new(device: &Device, shader_dir: &Path) -> EngineResult<Self> {
        Self::from_shaders(
            device,
            Shader::from_file(device, shader_dir.join("equirect_to_cubemap.shader")),
            Shader::from_file(device, shader_dir.join("prefilter.shader")),
            Shader::from_file(device, shader_dir.join("brdf.shader")),
        )
    }

    pub fn from_shaders(
        device: &Device,
        equirect_to_cubemap: Shader,
        prefilter: Shader,
        brdf: Shader,
    ) -> EngineResult<Self> {
        Ok(Self {
            device: device.clone(),
            equirect_to_cubemap,
            prefilter,
            brdf,
            cube: MeshData::cube().upload(device)?,
            quad: MeshData::screen_quad().upload(device)?,
        })
    }

    /// Project an equirectangular HDR image onto a cubemap of `size` with a full mip chain
    pub fn hdri_to_cubemap(&self, path: &Path, size: u32) -> EngineResult<GpuTexture> {
        let image = image::open(path)?.flipv().into_rgb32f();
        let (width, height) = image.dimensions();
        let hdri = GpuTexture::with_data(
            &self.device,
            TextureDescriptor::d2("hdri", width, height, TextureFormat::Rgb16Float)
                .with_address_mode(AddressMode::ClampToEdge),
            PixelType::F32,
            bytemuck::cast_slice(image.as_raw()),
        )?;
        log::debug!("HDRI {} decoded ({}x{})", path.display(), width, height);

        let cubemap = GpuTexture::new(
            &self.device,
            TextureDescriptor::cube("environment cubemap", size, TextureFormat::Rgb16Float)
                .with_mip_levels(TextureDescriptor::full_mip_count(size, size))
                .with_filter(FilterMode::LinearMipmapLinear, FilterMode::Linear),
        )?;

        let saved = self.device.viewport();
        let mut target = CaptureTarget::new(&self.device)?;

        let shader = &self.equirect_to_cubemap;
        shader.bind();
        shader.set_int("equirectangularMap", 0);
        shader.set_mat4("projection", capture_projection());
        hdri.bind(0);

        target.bind(size)?;
        for face in CubeFace::ALL {
            shader.set_mat4("view", capture_view(face));
            target.attach(&cubemap, Some(face), 0);
            self.device.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
            self.cube.draw();
        }
        self.device.bind_framebuffer(None);
        self.device.generate_mipmaps(cubemap.handle(), TextureKind::Cube);
        self.device.set_viewport(saved);

        Ok(cubemap)
    }

    /// Convolve `environment` into a roughness chain: mip `m` holds roughness `m / 4`
    pub fn prefilter(&self, environment: &GpuTexture, size: u32) -> EngineResult<GpuTexture> {
        let base = (size / 8).max(16);
        let prefiltered = GpuTexture::new(
            &self.device,
            TextureDescriptor::cube("prefilter map", base, TextureFormat::Rgb16Float)
                .with_mip_levels(PREFILTER_MIP_LEVELS)
                .with_filter(FilterMode::LinearMipmapLinear, FilterMode::Linear),
        )?;

        let saved = self.device.viewport();
        let mut target = CaptureTarget::new(&self.device)?;

        let shader = &self.prefilter;
        shader.bind();
        shader.set_int("environmentMap", 0);
        shader.set_mat4("projection", capture_projection());
        environment.bind(0);

        for mip in 0..PREFILTER_MIP_LEVELS {
            let mip_size = (base >> mip).max(1);
            target.bind(mip_size)?;
            shader.set_float("roughness", mip as f32 / (PREFILTER_MIP_LEVELS - 1) as f32);
            for face in CubeFace::ALL {
                shader.set_mat4("view", capture_view(face));
                target.attach(&prefiltered, Some(face), mip);
                self.device.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
                self.cube.draw();
            }
        }
        self.device.bind_framebuffer(None);
        self.device.set_viewport(saved);

        log::debug!("prefiltered environment map ({} base, {} mips)", base, PREFILTER_MIP_LEVELS);
        Ok(prefiltered)
    }

    /// Render the split-sum BRDF integration into an RG16F table
    pub fn bake_brdf_lut(&self, size: u32) -> EngineResult<GpuTexture> {
        let lut = GpuTexture::new(
            &self.device,
            TextureDescriptor::d2("brdf lut", size, size, TextureFormat::Rg16Float)
                .with_address_mode(AddressMode::ClampToEdge),
        )?;

        let saved = self.device.viewport();
        let mut target = CaptureTarget::new(&self.device)?;
        target.bind(size)?;
        target.attach(&lut, None, 0);
        self.device.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
        self.brdf.bind();
        self.quad.draw();
        self.device.bind_framebuffer(None);
        self.device.set_viewport(saved);

        log::debug!("BRDF LUT baked ({}x{})", size, size);
        Ok(lut)
    }
}
