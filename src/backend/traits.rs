//! Core backend abstraction traits
//!
//! The interface mirrors immediate-mode OpenGL: global binding state, texture
//! units, framebuffer blits. Every method takes `&self` because a GL context is
//! a single-threaded state machine that is shared by every resource wrapper.

use crate::backend::types::*;
use std::num::NonZeroU32;
use std::rc::Rc;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create vertex array: {0}")]
    VertexArrayCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Failed to create renderbuffer: {0}")]
    RenderbufferCreationFailed(String),
    #[error("Failed to compile {stage} shader: {log}")]
    ShaderCompilationFailed { stage: &'static str, log: String },
    #[error("Failed to link program: {0}")]
    ProgramLinkFailed(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Shared handle to the active graphics device
pub type Device = Rc<dyn GraphicsBackend>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) NonZeroU32);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) NonZeroU32);

/// Handle to a framebuffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) NonZeroU32);

/// Handle to a renderbuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderbufferHandle(pub(crate) NonZeroU32);

/// Handle to a linked shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) NonZeroU32);

/// Handle to a vertex array object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexArrayHandle(pub(crate) NonZeroU32);

/// Location of a uniform inside a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub(crate) u32);

/// Main graphics backend trait
pub trait GraphicsBackend {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    // Buffers

    /// Create a buffer of `size` bytes, optionally filled with `data`
    fn create_buffer(
        &self,
        target: BufferTarget,
        size: usize,
        data: Option<&[u8]>,
        usage: BufferUsage,
    ) -> BackendResult<BufferHandle>;

    /// Write data into a buffer at a byte offset
    fn write_buffer(&self, target: BufferTarget, buffer: BufferHandle, offset: usize, data: &[u8]);

    /// Bind a buffer to its target (`None` unbinds)
    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferHandle>);

    /// Bind a buffer to an indexed binding point (UBO/SSBO)
    fn bind_buffer_base(&self, target: BufferTarget, index: u32, buffer: BufferHandle);

    /// Destroy a buffer
    fn delete_buffer(&self, buffer: BufferHandle);

    // Vertex arrays

    /// Create a vertex array object
    fn create_vertex_array(&self) -> BackendResult<VertexArrayHandle>;

    /// Bind a vertex array (`None` unbinds)
    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayHandle>);

    /// Enable and describe one attribute of the bound vertex array
    fn set_vertex_attribute(&self, attribute: &VertexAttribute);

    /// Destroy a vertex array
    fn delete_vertex_array(&self, vertex_array: VertexArrayHandle);

    // Textures

    /// Create a texture and allocate storage for every mip level
    fn create_texture(&self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Upload pixels into one level (and face) of a texture
    fn upload_texture(&self, texture: TextureHandle, kind: TextureKind, upload: &TextureUpload);

    /// Regenerate the mip chain from level 0
    fn generate_mipmaps(&self, texture: TextureHandle, kind: TextureKind);

    /// Bind a texture to a texture unit (`None` unbinds)
    fn bind_texture(&self, unit: u32, kind: TextureKind, texture: Option<TextureHandle>);

    /// Destroy a texture
    fn delete_texture(&self, texture: TextureHandle);

    // Renderbuffers and framebuffers

    /// Create a renderbuffer with storage
    fn create_renderbuffer(
        &self,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> BackendResult<RenderbufferHandle>;

    /// Destroy a renderbuffer
    fn delete_renderbuffer(&self, renderbuffer: RenderbufferHandle);

    /// Create a framebuffer object
    fn create_framebuffer(&self) -> BackendResult<FramebufferHandle>;

    /// Bind a framebuffer for drawing and reading (`None` selects the default target)
    fn bind_framebuffer(&self, framebuffer: Option<FramebufferHandle>);

    /// Attach a texture level to the bound framebuffer.
    /// `face: None` on a cubemap attaches every face (layered rendering).
    fn attach_texture(
        &self,
        attachment: Attachment,
        texture: TextureHandle,
        kind: TextureKind,
        face: Option<CubeFace>,
        level: u32,
    );

    /// Attach a renderbuffer to the bound framebuffer
    fn attach_renderbuffer(&self, attachment: Attachment, renderbuffer: RenderbufferHandle);

    /// Select the color outputs of the bound framebuffer (0 disables color)
    fn set_draw_buffers(&self, count: u32);

    /// Completeness of the bound framebuffer
    fn framebuffer_status(&self) -> FramebufferStatus;

    /// Copy a region between framebuffers (`None` is the default target)
    fn blit_framebuffer(
        &self,
        src: Option<FramebufferHandle>,
        dst: Option<FramebufferHandle>,
        src_size: (u32, u32),
        dst_size: (u32, u32),
        mask: ClearFlags,
    );

    /// Destroy a framebuffer
    fn delete_framebuffer(&self, framebuffer: FramebufferHandle);

    // Programs

    /// Compile every stage and link a program
    fn create_program(&self, sources: &ShaderSources) -> BackendResult<ProgramHandle>;

    /// Make a program current (`None` unbinds)
    fn use_program(&self, program: Option<ProgramHandle>);

    /// Look up a uniform by name
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    /// Assign a uniform of the current program
    fn set_uniform(&self, location: UniformLocation, value: &UniformValue);

    /// Destroy a program
    fn delete_program(&self, program: ProgramHandle);

    // Fixed-function state

    /// Set viewport
    fn set_viewport(&self, viewport: Viewport);

    /// Get the current viewport
    fn viewport(&self) -> Viewport;

    /// Set the color used by `clear`
    fn set_clear_color(&self, color: [f32; 4]);

    /// Clear buffers of the bound framebuffer
    fn clear(&self, flags: ClearFlags);

    /// Clear one color attachment of the bound framebuffer to a value
    fn clear_color_attachment(&self, index: u32, value: [f32; 4]);

    /// Enable or disable blending
    fn set_blend(&self, blend: Option<BlendState>);

    /// Enable or disable depth testing
    fn set_depth_test(&self, enabled: bool);

    /// Enable or disable depth writes
    fn set_depth_write(&self, enabled: bool);

    /// Set the depth comparison function
    fn set_depth_func(&self, func: CompareFunction);

    /// Enable or disable the stencil test
    fn set_stencil(&self, stencil: Option<StencilState>);

    /// Set the stencil write mask
    fn set_stencil_write_mask(&self, mask: u32);

    /// Enable or disable writes to every color channel
    fn set_color_write(&self, enabled: bool);

    // Draw calls

    /// Draw indexed primitives from the bound vertex array (u32 indices)
    fn draw_elements(&self, topology: PrimitiveTopology, count: u32);

    /// Draw non-indexed primitives from the bound vertex array
    fn draw_arrays(&self, topology: PrimitiveTopology, first: u32, count: u32);

    /// Pop the oldest pending API error code, if any
    fn check_error(&self) -> Option<u32>;
}
