//! Headless recording backend.
//!
//! This backend performs no GPU work. It hands out handles, tracks the
//! binding state a GL context would hold and records every state-changing
//! call, so the engine can run end-to-end without a window or driver.
//! Tests inspect the recorded state to verify what a frame did.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::num::NonZeroU32;

use crate::backend::traits::*;
use crate::backend::types::*;

/// A recorded call that changes what ends up in a render target
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Clear {
        framebuffer: Option<FramebufferHandle>,
        flags: ClearFlags,
    },
    ClearAttachment {
        framebuffer: Option<FramebufferHandle>,
        index: u32,
        value: [f32; 4],
    },
    Draw {
        framebuffer: Option<FramebufferHandle>,
        program: Option<ProgramHandle>,
        vertex_array: Option<VertexArrayHandle>,
        count: u32,
        indexed: bool,
    },
    Blit {
        src: Option<FramebufferHandle>,
        dst: Option<FramebufferHandle>,
        mask: ClearFlags,
    },
    SetViewport(Viewport),
}

#[derive(Debug, Default)]
struct ProgramState {
    sources: ShaderSources,
    locations: Vec<String>,
    uniforms: HashMap<String, UniformValue>,
}

#[derive(Debug, Default)]
struct FramebufferState {
    attachments: HashMap<Attachment, u32>,
    draw_buffers: u32,
}

#[derive(Debug)]
struct State {
    viewport: Viewport,
    clear_color: [f32; 4],
    framebuffer: Option<FramebufferHandle>,
    program: Option<ProgramHandle>,
    vertex_array: Option<VertexArrayHandle>,
    texture_units: HashMap<u32, (TextureKind, TextureHandle)>,
    blend: Option<BlendState>,
    depth_test: bool,
    depth_write: bool,
    depth_func: CompareFunction,
    stencil: Option<StencilState>,
    stencil_write_mask: u32,
    color_write: bool,
    buffers: HashMap<BufferHandle, (BufferTarget, Vec<u8>)>,
    vertex_arrays: HashMap<VertexArrayHandle, Vec<VertexAttribute>>,
    textures: HashMap<TextureHandle, TextureDescriptor>,
    texture_uploads: HashMap<TextureHandle, u32>,
    renderbuffers: HashMap<RenderbufferHandle, (TextureFormat, u32, u32)>,
    framebuffers: HashMap<FramebufferHandle, FramebufferState>,
    programs: HashMap<ProgramHandle, ProgramState>,
    commands: Vec<Command>,
    errors: Vec<u32>,
}

/// Recording backend that runs without a GPU
pub struct HeadlessBackend {
    state: RefCell<State>,
    next_id: Cell<u32>,
    fail_compilation: Cell<bool>,
    fail_allocation: Cell<bool>,
}

impl HeadlessBackend {
    /// Create a backend whose default target has the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: RefCell::new(State {
                viewport: Viewport::new(width, height),
                clear_color: [0.0; 4],
                framebuffer: None,
                program: None,
                vertex_array: None,
                texture_units: HashMap::new(),
                blend: None,
                depth_test: true,
                depth_write: true,
                depth_func: CompareFunction::Less,
                stencil: None,
                stencil_write_mask: 0xFF,
                color_write: true,
                buffers: HashMap::new(),
                vertex_arrays: HashMap::new(),
                textures: HashMap::new(),
                texture_uploads: HashMap::new(),
                renderbuffers: HashMap::new(),
                framebuffers: HashMap::new(),
                programs: HashMap::new(),
                commands: Vec::new(),
                errors: Vec::new(),
            }),
            next_id: Cell::new(0),
            fail_compilation: Cell::new(false),
            fail_allocation: Cell::new(false),
        }
    }

    /// Make every subsequent `create_program` fail with a compile error
    pub fn set_fail_compilation(&self, fail: bool) {
        self.fail_compilation.set(fail);
    }

    /// Make every subsequent texture and renderbuffer creation fail
    pub fn set_fail_allocation(&self, fail: bool) {
        self.fail_allocation.set(fail);
    }

    /// Queue an API error code to be returned by `check_error`
    pub fn push_error(&self, code: u32) {
        self.state.borrow_mut().errors.push(code);
    }

    fn next(&self) -> NonZeroU32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NonZeroU32::MIN.saturating_add(id)
    }

    fn record(&self, command: Command) {
        self.state.borrow_mut().commands.push(command);
    }

    // Inspection

    /// Commands recorded so far
    pub fn commands(&self) -> Vec<Command> {
        self.state.borrow().commands.clone()
    }

    /// Forget recorded commands
    pub fn clear_commands(&self) {
        self.state.borrow_mut().commands.clear();
    }

    /// Number of draw calls recorded so far
    pub fn draw_count(&self) -> usize {
        self.state
            .borrow()
            .commands
            .iter()
            .filter(|c| matches!(c, Command::Draw { .. }))
            .count()
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.state.borrow().framebuffer
    }

    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.state.borrow().program
    }

    pub fn bound_texture(&self, unit: u32) -> Option<TextureHandle> {
        self.state.borrow().texture_units.get(&unit).map(|(_, t)| *t)
    }

    pub fn bound_texture_kind(&self, unit: u32) -> Option<TextureKind> {
        self.state.borrow().texture_units.get(&unit).map(|(k, _)| *k)
    }

    pub fn blend(&self) -> Option<BlendState> {
        self.state.borrow().blend
    }

    pub fn depth_write(&self) -> bool {
        self.state.borrow().depth_write
    }

    pub fn depth_func(&self) -> CompareFunction {
        self.state.borrow().depth_func
    }

    pub fn stencil(&self) -> Option<StencilState> {
        self.state.borrow().stencil
    }

    pub fn color_write(&self) -> bool {
        self.state.borrow().color_write
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<TextureDescriptor> {
        self.state.borrow().textures.get(&texture).cloned()
    }

    /// Number of uploads performed into a texture
    pub fn texture_upload_count(&self, texture: TextureHandle) -> u32 {
        self.state
            .borrow()
            .texture_uploads
            .get(&texture)
            .copied()
            .unwrap_or(0)
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state.borrow().buffers.get(&buffer).map(|(_, d)| d.clone())
    }

    pub fn vertex_attributes(&self, vertex_array: VertexArrayHandle) -> Vec<VertexAttribute> {
        self.state
            .borrow()
            .vertex_arrays
            .get(&vertex_array)
            .cloned()
            .unwrap_or_default()
    }

    /// Value last assigned to a uniform of a program
    pub fn uniform(&self, program: ProgramHandle, name: &str) -> Option<UniformValue> {
        self.state
            .borrow()
            .programs
            .get(&program)
            .and_then(|p| p.uniforms.get(name).cloned())
    }

    pub fn program_sources(&self, program: ProgramHandle) -> Option<ShaderSources> {
        self.state
            .borrow()
            .programs
            .get(&program)
            .map(|p| p.sources.clone())
    }

    /// Raw id of the texture attached at a point of a framebuffer
    pub fn attachment(&self, framebuffer: FramebufferHandle, attachment: Attachment) -> Option<u32> {
        self.state
            .borrow()
            .framebuffers
            .get(&framebuffer)
            .and_then(|f| f.attachments.get(&attachment).copied())
    }

    pub fn draw_buffer_count(&self, framebuffer: FramebufferHandle) -> u32 {
        self.state
            .borrow()
            .framebuffers
            .get(&framebuffer)
            .map(|f| f.draw_buffers)
            .unwrap_or(0)
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.state.borrow().vertex_arrays.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_renderbuffers(&self) -> usize {
        self.state.borrow().renderbuffers.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state.borrow().framebuffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "Headless Backend"
    }

    fn create_buffer(
        &self,
        target: BufferTarget,
        size: usize,
        data: Option<&[u8]>,
        _usage: BufferUsage,
    ) -> BackendResult<BufferHandle> {
        let handle = BufferHandle(self.next());
        log::trace!("HeadlessBackend: creating {:?} buffer {:?} (size: {})", target, handle, size);
        let mut contents = vec![0u8; size];
        if let Some(data) = data {
            let len = data.len().min(size);
            contents[..len].copy_from_slice(&data[..len]);
        }
        self.state.borrow_mut().buffers.insert(handle, (target, contents));
        Ok(handle)
    }

    fn write_buffer(&self, _target: BufferTarget, buffer: BufferHandle, offset: usize, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        let Some((_, contents)) = state.buffers.get_mut(&buffer) else {
            log::warn!("HeadlessBackend: write to unknown buffer {:?}", buffer);
            return;
        };
        let end = offset + data.len();
        if end > contents.len() {
            contents.resize(end, 0);
        }
        contents[offset..end].copy_from_slice(data);
    }

    fn bind_buffer(&self, _target: BufferTarget, _buffer: Option<BufferHandle>) {}

    fn bind_buffer_base(&self, target: BufferTarget, index: u32, buffer: BufferHandle) {
        log::trace!("HeadlessBackend: binding {:?} {:?} to point {}", target, buffer, index);
    }

    fn delete_buffer(&self, buffer: BufferHandle) {
        self.state.borrow_mut().buffers.remove(&buffer);
    }

    fn create_vertex_array(&self) -> BackendResult<VertexArrayHandle> {
        let handle = VertexArrayHandle(self.next());
        self.state.borrow_mut().vertex_arrays.insert(handle, Vec::new());
        Ok(handle)
    }

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayHandle>) {
        self.state.borrow_mut().vertex_array = vertex_array;
    }

    fn set_vertex_attribute(&self, attribute: &VertexAttribute) {
        let mut state = self.state.borrow_mut();
        let Some(vao) = state.vertex_array else {
            log::warn!("HeadlessBackend: vertex attribute set without a bound vertex array");
            return;
        };
        if let Some(attributes) = state.vertex_arrays.get_mut(&vao) {
            attributes.push(*attribute);
        }
    }

    fn delete_vertex_array(&self, vertex_array: VertexArrayHandle) {
        let mut state = self.state.borrow_mut();
        state.vertex_arrays.remove(&vertex_array);
        if state.vertex_array == Some(vertex_array) {
            state.vertex_array = None;
        }
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if self.fail_allocation.get() {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: headless allocation failure",
                desc.label
            )));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero size",
                desc.label
            )));
        }
        let handle = TextureHandle(self.next());
        log::trace!(
            "HeadlessBackend: creating texture {:?} ({}x{}, {:?}, {} mips)",
            desc.label,
            desc.width,
            desc.height,
            desc.kind,
            desc.mip_levels
        );
        self.state.borrow_mut().textures.insert(handle, desc.clone());
        Ok(handle)
    }

    fn upload_texture(&self, texture: TextureHandle, _kind: TextureKind, upload: &TextureUpload) {
        let expected = upload.width as usize
            * upload.height as usize
            * upload.format.channel_count() as usize
            * upload.pixel_type.size();
        if upload.data.len() < expected {
            log::warn!(
                "HeadlessBackend: upload into {:?} is {} bytes, expected {}",
                texture,
                upload.data.len(),
                expected
            );
        }
        *self.state.borrow_mut().texture_uploads.entry(texture).or_insert(0) += 1;
    }

    fn generate_mipmaps(&self, texture: TextureHandle, kind: TextureKind) {
        log::trace!("HeadlessBackend: generating mipmaps for {:?} {:?}", kind, texture);
    }

    fn bind_texture(&self, unit: u32, kind: TextureKind, texture: Option<TextureHandle>) {
        let mut state = self.state.borrow_mut();
        match texture {
            Some(texture) => {
                state.texture_units.insert(unit, (kind, texture));
            }
            None => {
                state.texture_units.remove(&unit);
            }
        }
    }

    fn delete_texture(&self, texture: TextureHandle) {
        let mut state = self.state.borrow_mut();
        state.textures.remove(&texture);
        state.texture_units.retain(|_, (_, t)| *t != texture);
    }

    fn create_renderbuffer(
        &self,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> BackendResult<RenderbufferHandle> {
        if self.fail_allocation.get() {
            return Err(BackendError::RenderbufferCreationFailed(
                "headless allocation failure".to_string(),
            ));
        }
        let handle = RenderbufferHandle(self.next());
        self.state
            .borrow_mut()
            .renderbuffers
            .insert(handle, (format, width, height));
        Ok(handle)
    }

    fn delete_renderbuffer(&self, renderbuffer: RenderbufferHandle) {
        self.state.borrow_mut().renderbuffers.remove(&renderbuffer);
    }

    fn create_framebuffer(&self) -> BackendResult<FramebufferHandle> {
        let handle = FramebufferHandle(self.next());
        self.state
            .borrow_mut()
            .framebuffers
            .insert(handle, FramebufferState { draw_buffers: 1, ..Default::default() });
        Ok(handle)
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferHandle>) {
        self.state.borrow_mut().framebuffer = framebuffer;
    }

    fn attach_texture(
        &self,
        attachment: Attachment,
        texture: TextureHandle,
        _kind: TextureKind,
        _face: Option<CubeFace>,
        _level: u32,
    ) {
        let mut state = self.state.borrow_mut();
        let Some(fb) = state.framebuffer else {
            log::warn!("HeadlessBackend: attaching {:?} to the default framebuffer", texture);
            return;
        };
        if let Some(fb) = state.framebuffers.get_mut(&fb) {
            fb.attachments.insert(attachment, texture.0.get());
        }
    }

    fn attach_renderbuffer(&self, attachment: Attachment, renderbuffer: RenderbufferHandle) {
        let mut state = self.state.borrow_mut();
        let Some(fb) = state.framebuffer else {
            return;
        };
        if let Some(fb) = state.framebuffers.get_mut(&fb) {
            fb.attachments.insert(attachment, renderbuffer.0.get());
        }
    }

    fn set_draw_buffers(&self, count: u32) {
        let mut state = self.state.borrow_mut();
        let Some(fb) = state.framebuffer else {
            return;
        };
        if let Some(fb) = state.framebuffers.get_mut(&fb) {
            fb.draw_buffers = count;
        }
    }

    fn framebuffer_status(&self) -> FramebufferStatus {
        let state = self.state.borrow();
        match state.framebuffer.and_then(|fb| state.framebuffers.get(&fb)) {
            Some(fb) if fb.attachments.is_empty() => FramebufferStatus::Incomplete(0x8CD7),
            _ => FramebufferStatus::Complete,
        }
    }

    fn blit_framebuffer(
        &self,
        src: Option<FramebufferHandle>,
        dst: Option<FramebufferHandle>,
        _src_size: (u32, u32),
        _dst_size: (u32, u32),
        mask: ClearFlags,
    ) {
        self.state.borrow_mut().framebuffer = dst;
        self.record(Command::Blit { src, dst, mask });
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferHandle) {
        let mut state = self.state.borrow_mut();
        state.framebuffers.remove(&framebuffer);
        if state.framebuffer == Some(framebuffer) {
            state.framebuffer = None;
        }
    }

    fn create_program(&self, sources: &ShaderSources) -> BackendResult<ProgramHandle> {
        if self.fail_compilation.get() {
            return Err(BackendError::ShaderCompilationFailed {
                stage: ShaderStage::Vertex.name(),
                log: "headless compilation failure".to_string(),
            });
        }
        if sources.vertex.trim().is_empty() || sources.fragment.trim().is_empty() {
            return Err(BackendError::ProgramLinkFailed(
                "program needs vertex and fragment stages".to_string(),
            ));
        }
        let handle = ProgramHandle(self.next());
        self.state.borrow_mut().programs.insert(
            handle,
            ProgramState {
                sources: sources.clone(),
                ..Default::default()
            },
        );
        Ok(handle)
    }

    fn use_program(&self, program: Option<ProgramHandle>) {
        self.state.borrow_mut().program = program;
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let mut state = self.state.borrow_mut();
        let program = state.programs.get_mut(&program)?;
        let index = match program.locations.iter().position(|n| n == name) {
            Some(index) => index,
            None => {
                program.locations.push(name.to_string());
                program.locations.len() - 1
            }
        };
        Some(UniformLocation(index as u32))
    }

    fn set_uniform(&self, location: UniformLocation, value: &UniformValue) {
        let mut state = self.state.borrow_mut();
        let Some(current) = state.program else {
            log::warn!("HeadlessBackend: uniform set without a current program");
            return;
        };
        let Some(program) = state.programs.get_mut(&current) else {
            return;
        };
        if let Some(name) = program.locations.get(location.0 as usize).cloned() {
            program.uniforms.insert(name, value.clone());
        }
    }

    fn delete_program(&self, program: ProgramHandle) {
        let mut state = self.state.borrow_mut();
        state.programs.remove(&program);
        if state.program == Some(program) {
            state.program = None;
        }
    }

    fn set_viewport(&self, viewport: Viewport) {
        self.state.borrow_mut().viewport = viewport;
        self.record(Command::SetViewport(viewport));
    }

    fn viewport(&self) -> Viewport {
        self.state.borrow().viewport
    }

    fn set_clear_color(&self, color: [f32; 4]) {
        self.state.borrow_mut().clear_color = color;
    }

    fn clear(&self, flags: ClearFlags) {
        let framebuffer = self.state.borrow().framebuffer;
        self.record(Command::Clear { framebuffer, flags });
    }

    fn clear_color_attachment(&self, index: u32, value: [f32; 4]) {
        let framebuffer = self.state.borrow().framebuffer;
        self.record(Command::ClearAttachment {
            framebuffer,
            index,
            value,
        });
    }

    fn set_blend(&self, blend: Option<BlendState>) {
        self.state.borrow_mut().blend = blend;
    }

    fn set_depth_test(&self, enabled: bool) {
        self.state.borrow_mut().depth_test = enabled;
    }

    fn set_depth_write(&self, enabled: bool) {
        self.state.borrow_mut().depth_write = enabled;
    }

    fn set_depth_func(&self, func: CompareFunction) {
        self.state.borrow_mut().depth_func = func;
    }

    fn set_stencil(&self, stencil: Option<StencilState>) {
        self.state.borrow_mut().stencil = stencil;
    }

    fn set_stencil_write_mask(&self, mask: u32) {
        self.state.borrow_mut().stencil_write_mask = mask;
    }

    fn set_color_write(&self, enabled: bool) {
        self.state.borrow_mut().color_write = enabled;
    }

    fn draw_elements(&self, _topology: PrimitiveTopology, count: u32) {
        let (framebuffer, program, vertex_array) = {
            let state = self.state.borrow();
            (state.framebuffer, state.program, state.vertex_array)
        };
        self.record(Command::Draw {
            framebuffer,
            program,
            vertex_array,
            count,
            indexed: true,
        });
    }

    fn draw_arrays(&self, _topology: PrimitiveTopology, _first: u32, count: u32) {
        let (framebuffer, program, vertex_array) = {
            let state = self.state.borrow();
            (state.framebuffer, state.program, state.vertex_array)
        };
        self.record(Command::Draw {
            framebuffer,
            program,
            vertex_array,
            count,
            indexed: false,
        });
    }

    fn check_error(&self) -> Option<u32> {
        let mut state = self.state.borrow_mut();
        if state.errors.is_empty() {
            None
        } else {
            Some(state.errors.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique_and_released() {
        let backend = HeadlessBackend::new(64, 64);
        let a = backend
            .create_buffer(BufferTarget::Vertex, 16, None, BufferUsage::Static)
            .unwrap();
        let b = backend
            .create_buffer(BufferTarget::Vertex, 16, None, BufferUsage::Static)
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(backend.live_buffers(), 2);

        backend.delete_buffer(a);
        assert_eq!(backend.live_buffers(), 1);
    }

    #[test]
    fn test_uniforms_are_recorded_per_program() {
        let backend = HeadlessBackend::new(64, 64);
        let program = backend
            .create_program(&ShaderSources {
                vertex: "void main() {}".into(),
                fragment: "void main() {}".into(),
                geometry: None,
            })
            .unwrap();

        backend.use_program(Some(program));
        let location = backend.uniform_location(program, "numLights").unwrap();
        backend.set_uniform(location, &UniformValue::Int(3));

        assert_eq!(backend.uniform(program, "numLights"), Some(UniformValue::Int(3)));
        assert_eq!(backend.uniform(program, "missing"), None);
    }

    #[test]
    fn test_compilation_failure_toggle() {
        let backend = HeadlessBackend::new(64, 64);
        backend.set_fail_compilation(true);
        let result = backend.create_program(&ShaderSources {
            vertex: "v".into(),
            fragment: "f".into(),
            geometry: None,
        });
        assert!(matches!(result, Err(BackendError::ShaderCompilationFailed { .. })));
    }

    #[test]
    fn test_framebuffer_without_attachments_is_incomplete() {
        let backend = HeadlessBackend::new(64, 64);
        let fb = backend.create_framebuffer().unwrap();
        backend.bind_framebuffer(Some(fb));
        assert!(matches!(backend.framebuffer_status(), FramebufferStatus::Incomplete(_)));
    }
}
