//! OpenGL backend implemented over `glow`.
//!
//! Requires a 4.3+ core context (SSBOs and geometry shaders). The context is
//! created by the application and handed over already current.

use glow::HasContext;

use crate::backend::traits::*;
use crate::backend::types::*;

/// OpenGL backend
pub struct GlBackend {
    gl: glow::Context,
}

impl GlBackend {
    /// Wrap a current GL context and set the engine's baseline state
    pub fn new(gl: glow::Context) -> Self {
        unsafe {
            gl.enable(glow::DEPTH_TEST);
            gl.enable(glow::TEXTURE_CUBE_MAP_SEAMLESS);
            gl.depth_func(glow::LESS);
        }
        log::info!("GlBackend: {}", unsafe { gl.get_parameter_string(glow::VERSION) });
        Self { gl }
    }

    /// Raw context access for integrations (UI overlays, captures)
    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }
}

fn buffer_target(target: BufferTarget) -> u32 {
    match target {
        BufferTarget::Vertex => glow::ARRAY_BUFFER,
        BufferTarget::Index => glow::ELEMENT_ARRAY_BUFFER,
        BufferTarget::Uniform => glow::UNIFORM_BUFFER,
        BufferTarget::Storage => glow::SHADER_STORAGE_BUFFER,
    }
}

fn buffer_usage(usage: BufferUsage) -> u32 {
    match usage {
        BufferUsage::Static => glow::STATIC_DRAW,
        BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
    }
}

fn texture_target(kind: TextureKind) -> u32 {
    match kind {
        TextureKind::D2 => glow::TEXTURE_2D,
        TextureKind::Cube => glow::TEXTURE_CUBE_MAP,
    }
}

/// (internal format, pixel format, allocation component type)
fn format_info(format: TextureFormat) -> (u32, u32, u32) {
    match format {
        TextureFormat::R8Unorm => (glow::R8, glow::RED, glow::UNSIGNED_BYTE),
        TextureFormat::Rgb8Unorm => (glow::RGB8, glow::RGB, glow::UNSIGNED_BYTE),
        TextureFormat::Rgba8Unorm => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
        TextureFormat::R16Float => (glow::R16F, glow::RED, glow::FLOAT),
        TextureFormat::Rg16Float => (glow::RG16F, glow::RG, glow::FLOAT),
        TextureFormat::Rgb16Float => (glow::RGB16F, glow::RGB, glow::FLOAT),
        TextureFormat::Rgba16Float => (glow::RGBA16F, glow::RGBA, glow::FLOAT),
        TextureFormat::Rgb32Float => (glow::RGB32F, glow::RGB, glow::FLOAT),
        TextureFormat::Rgba32Float => (glow::RGBA32F, glow::RGBA, glow::FLOAT),
        TextureFormat::Depth32Float => (glow::DEPTH_COMPONENT32F, glow::DEPTH_COMPONENT, glow::FLOAT),
        TextureFormat::Depth24PlusStencil8 => {
            (glow::DEPTH24_STENCIL8, glow::DEPTH_STENCIL, glow::UNSIGNED_INT_24_8)
        }
    }
}

fn pixel_type(pixel_type: PixelType) -> u32 {
    match pixel_type {
        PixelType::U8 => glow::UNSIGNED_BYTE,
        PixelType::F32 => glow::FLOAT,
    }
}

fn filter(mode: FilterMode) -> i32 {
    (match mode {
        FilterMode::Nearest => glow::NEAREST,
        FilterMode::Linear => glow::LINEAR,
        FilterMode::LinearMipmapLinear => glow::LINEAR_MIPMAP_LINEAR,
    }) as i32
}

fn address_mode(mode: AddressMode) -> i32 {
    (match mode {
        AddressMode::ClampToEdge => glow::CLAMP_TO_EDGE,
        AddressMode::ClampToBorder => glow::CLAMP_TO_BORDER,
        AddressMode::Repeat => glow::REPEAT,
        AddressMode::MirrorRepeat => glow::MIRRORED_REPEAT,
    }) as i32
}

fn attachment_point(attachment: Attachment) -> u32 {
    match attachment {
        Attachment::Color(index) => glow::COLOR_ATTACHMENT0 + index,
        Attachment::Depth => glow::DEPTH_ATTACHMENT,
        Attachment::DepthStencil => glow::DEPTH_STENCIL_ATTACHMENT,
    }
}

fn compare_function(func: CompareFunction) -> u32 {
    match func {
        CompareFunction::Never => glow::NEVER,
        CompareFunction::Less => glow::LESS,
        CompareFunction::Equal => glow::EQUAL,
        CompareFunction::LessEqual => glow::LEQUAL,
        CompareFunction::Greater => glow::GREATER,
        CompareFunction::NotEqual => glow::NOTEQUAL,
        CompareFunction::GreaterEqual => glow::GEQUAL,
        CompareFunction::Always => glow::ALWAYS,
    }
}

fn stencil_op(op: StencilOp) -> u32 {
    match op {
        StencilOp::Keep => glow::KEEP,
        StencilOp::Zero => glow::ZERO,
        StencilOp::Replace => glow::REPLACE,
    }
}

fn blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::OneMinusSrcColor => glow::ONE_MINUS_SRC_COLOR,
    }
}

fn topology(topology: PrimitiveTopology) -> u32 {
    match topology {
        PrimitiveTopology::Lines => glow::LINES,
        PrimitiveTopology::Triangles => glow::TRIANGLES,
        PrimitiveTopology::TriangleStrip => glow::TRIANGLE_STRIP,
    }
}

fn clear_mask(flags: ClearFlags) -> u32 {
    let mut mask = 0;
    if flags.contains(ClearFlags::COLOR) {
        mask |= glow::COLOR_BUFFER_BIT;
    }
    if flags.contains(ClearFlags::DEPTH) {
        mask |= glow::DEPTH_BUFFER_BIT;
    }
    if flags.contains(ClearFlags::STENCIL) {
        mask |= glow::STENCIL_BUFFER_BIT;
    }
    mask
}

fn native_buffer(buffer: BufferHandle) -> glow::NativeBuffer {
    glow::NativeBuffer(buffer.0)
}

fn native_texture(texture: TextureHandle) -> glow::NativeTexture {
    glow::NativeTexture(texture.0)
}

fn native_framebuffer(framebuffer: FramebufferHandle) -> glow::NativeFramebuffer {
    glow::NativeFramebuffer(framebuffer.0)
}

fn native_program(program: ProgramHandle) -> glow::NativeProgram {
    glow::NativeProgram(program.0)
}

impl GlBackend {
    fn compile_stage(&self, stage: ShaderStage, source: &str) -> BackendResult<glow::NativeShader> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
            ShaderStage::Geometry => glow::GEOMETRY_SHADER,
        };
        unsafe {
            let shader = self
                .gl
                .create_shader(kind)
                .map_err(|log| BackendError::ShaderCompilationFailed { stage: stage.name(), log })?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if !self.gl.get_shader_compile_status(shader) {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                return Err(BackendError::ShaderCompilationFailed { stage: stage.name(), log });
            }
            Ok(shader)
        }
    }
}

impl GraphicsBackend for GlBackend {
    fn name(&self) -> &'static str {
        "OpenGL Backend"
    }

    fn create_buffer(
        &self,
        target: BufferTarget,
        size: usize,
        data: Option<&[u8]>,
        usage: BufferUsage,
    ) -> BackendResult<BufferHandle> {
        let gl_target = buffer_target(target);
        unsafe {
            let buffer = self
                .gl
                .create_buffer()
                .map_err(BackendError::BufferCreationFailed)?;
            self.gl.bind_buffer(gl_target, Some(buffer));
            match data {
                Some(data) if data.len() == size => {
                    self.gl.buffer_data_u8_slice(gl_target, data, buffer_usage(usage))
                }
                Some(data) => {
                    self.gl.buffer_data_size(gl_target, size as i32, buffer_usage(usage));
                    self.gl.buffer_sub_data_u8_slice(gl_target, 0, data);
                }
                None => self.gl.buffer_data_size(gl_target, size as i32, buffer_usage(usage)),
            }
            Ok(BufferHandle(buffer.0))
        }
    }

    fn write_buffer(&self, target: BufferTarget, buffer: BufferHandle, offset: usize, data: &[u8]) {
        let gl_target = buffer_target(target);
        unsafe {
            self.gl.bind_buffer(gl_target, Some(native_buffer(buffer)));
            self.gl.buffer_sub_data_u8_slice(gl_target, offset as i32, data);
        }
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferHandle>) {
        unsafe {
            self.gl.bind_buffer(buffer_target(target), buffer.map(native_buffer));
        }
    }

    fn bind_buffer_base(&self, target: BufferTarget, index: u32, buffer: BufferHandle) {
        unsafe {
            self.gl
                .bind_buffer_base(buffer_target(target), index, Some(native_buffer(buffer)));
        }
    }

    fn delete_buffer(&self, buffer: BufferHandle) {
        unsafe { self.gl.delete_buffer(native_buffer(buffer)) }
    }

    fn create_vertex_array(&self) -> BackendResult<VertexArrayHandle> {
        unsafe {
            let vao = self
                .gl
                .create_vertex_array()
                .map_err(BackendError::VertexArrayCreationFailed)?;
            Ok(VertexArrayHandle(vao.0))
        }
    }

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayHandle>) {
        unsafe {
            self.gl
                .bind_vertex_array(vertex_array.map(|v| glow::NativeVertexArray(v.0)));
        }
    }

    fn set_vertex_attribute(&self, attribute: &VertexAttribute) {
        unsafe {
            self.gl.enable_vertex_attrib_array(attribute.location);
            match attribute.kind {
                ElementKind::UnsignedInt => self.gl.vertex_attrib_pointer_i32(
                    attribute.location,
                    attribute.components as i32,
                    glow::UNSIGNED_INT,
                    attribute.stride as i32,
                    attribute.offset as i32,
                ),
                ElementKind::Float | ElementKind::UnsignedByte => {
                    let data_type = if attribute.kind == ElementKind::Float {
                        glow::FLOAT
                    } else {
                        glow::UNSIGNED_BYTE
                    };
                    self.gl.vertex_attrib_pointer_f32(
                        attribute.location,
                        attribute.components as i32,
                        data_type,
                        attribute.normalized,
                        attribute.stride as i32,
                        attribute.offset as i32,
                    )
                }
            }
        }
    }

    fn delete_vertex_array(&self, vertex_array: VertexArrayHandle) {
        unsafe { self.gl.delete_vertex_array(glow::NativeVertexArray(vertex_array.0)) }
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let target = texture_target(desc.kind);
        let (internal, format, ty) = format_info(desc.format);
        unsafe {
            let texture = self
                .gl
                .create_texture()
                .map_err(BackendError::TextureCreationFailed)?;
            self.gl.bind_texture(target, Some(texture));

            for level in 0..desc.mip_levels {
                let width = (desc.width >> level).max(1) as i32;
                let height = (desc.height >> level).max(1) as i32;
                let faces: &[u32] = match desc.kind {
                    TextureKind::D2 => &[glow::TEXTURE_2D],
                    TextureKind::Cube => &[
                        glow::TEXTURE_CUBE_MAP_POSITIVE_X,
                        glow::TEXTURE_CUBE_MAP_NEGATIVE_X,
                        glow::TEXTURE_CUBE_MAP_POSITIVE_Y,
                        glow::TEXTURE_CUBE_MAP_NEGATIVE_Y,
                        glow::TEXTURE_CUBE_MAP_POSITIVE_Z,
                        glow::TEXTURE_CUBE_MAP_NEGATIVE_Z,
                    ],
                };
                for &face in faces {
                    self.gl.tex_image_2d(
                        face,
                        level as i32,
                        internal as i32,
                        width,
                        height,
                        0,
                        format,
                        ty,
                        None,
                    );
                }
            }

            self.gl
                .tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, filter(desc.min_filter));
            self.gl
                .tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, filter(desc.mag_filter));
            let wrap = address_mode(desc.address_mode);
            self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, wrap);
            self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, wrap);
            if desc.kind == TextureKind::Cube {
                self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_R, wrap);
            }
            if let Some(color) = desc.border_color {
                self.gl
                    .tex_parameter_f32_slice(target, glow::TEXTURE_BORDER_COLOR, &color);
            }
            self.gl.tex_parameter_i32(
                target,
                glow::TEXTURE_MAX_LEVEL,
                desc.mip_levels.saturating_sub(1) as i32,
            );
            self.gl.bind_texture(target, None);

            log::debug!(
                "GlBackend: created texture {:?} ({}x{}, {:?})",
                desc.label,
                desc.width,
                desc.height,
                desc.format
            );
            Ok(TextureHandle(texture.0))
        }
    }

    fn upload_texture(&self, texture: TextureHandle, kind: TextureKind, upload: &TextureUpload) {
        let target = texture_target(kind);
        let (internal, format, _) = format_info(upload.format);
        let image_target = match upload.face {
            Some(face) => glow::TEXTURE_CUBE_MAP_POSITIVE_X + face.index(),
            None => glow::TEXTURE_2D,
        };
        unsafe {
            self.gl.bind_texture(target, Some(native_texture(texture)));
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            self.gl.tex_image_2d(
                image_target,
                upload.level as i32,
                internal as i32,
                upload.width as i32,
                upload.height as i32,
                0,
                format,
                pixel_type(upload.pixel_type),
                Some(upload.data),
            );
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 4);
            self.gl.bind_texture(target, None);
        }
    }

    fn generate_mipmaps(&self, texture: TextureHandle, kind: TextureKind) {
        let target = texture_target(kind);
        unsafe {
            self.gl.bind_texture(target, Some(native_texture(texture)));
            self.gl.generate_mipmap(target);
            self.gl.bind_texture(target, None);
        }
    }

    fn bind_texture(&self, unit: u32, kind: TextureKind, texture: Option<TextureHandle>) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl
                .bind_texture(texture_target(kind), texture.map(native_texture));
        }
    }

    fn delete_texture(&self, texture: TextureHandle) {
        unsafe { self.gl.delete_texture(native_texture(texture)) }
    }

    fn create_renderbuffer(
        &self,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> BackendResult<RenderbufferHandle> {
        let (internal, _, _) = format_info(format);
        unsafe {
            let renderbuffer = self
                .gl
                .create_renderbuffer()
                .map_err(BackendError::RenderbufferCreationFailed)?;
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, Some(renderbuffer));
            self.gl
                .renderbuffer_storage(glow::RENDERBUFFER, internal, width as i32, height as i32);
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
            Ok(RenderbufferHandle(renderbuffer.0))
        }
    }

    fn delete_renderbuffer(&self, renderbuffer: RenderbufferHandle) {
        unsafe {
            self.gl
                .delete_renderbuffer(glow::NativeRenderbuffer(renderbuffer.0))
        }
    }

    fn create_framebuffer(&self) -> BackendResult<FramebufferHandle> {
        unsafe {
            let framebuffer = self
                .gl
                .create_framebuffer()
                .map_err(BackendError::FramebufferCreationFailed)?;
            Ok(FramebufferHandle(framebuffer.0))
        }
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferHandle>) {
        unsafe {
            self.gl
                .bind_framebuffer(glow::FRAMEBUFFER, framebuffer.map(native_framebuffer));
        }
    }

    fn attach_texture(
        &self,
        attachment: Attachment,
        texture: TextureHandle,
        kind: TextureKind,
        face: Option<CubeFace>,
        level: u32,
    ) {
        let point = attachment_point(attachment);
        let texture = Some(native_texture(texture));
        unsafe {
            match (kind, face) {
                (TextureKind::Cube, None) => {
                    self.gl
                        .framebuffer_texture(glow::FRAMEBUFFER, point, texture, level as i32)
                }
                (TextureKind::Cube, Some(face)) => self.gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    point,
                    glow::TEXTURE_CUBE_MAP_POSITIVE_X + face.index(),
                    texture,
                    level as i32,
                ),
                (TextureKind::D2, _) => self.gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    point,
                    glow::TEXTURE_2D,
                    texture,
                    level as i32,
                ),
            }
        }
    }

    fn attach_renderbuffer(&self, attachment: Attachment, renderbuffer: RenderbufferHandle) {
        unsafe {
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                attachment_point(attachment),
                glow::RENDERBUFFER,
                Some(glow::NativeRenderbuffer(renderbuffer.0)),
            );
        }
    }

    fn set_draw_buffers(&self, count: u32) {
        unsafe {
            if count == 0 {
                self.gl.draw_buffer(glow::NONE);
                self.gl.read_buffer(glow::NONE);
            } else {
                let buffers: Vec<u32> = (0..count).map(|i| glow::COLOR_ATTACHMENT0 + i).collect();
                self.gl.draw_buffers(&buffers);
            }
        }
    }

    fn framebuffer_status(&self) -> FramebufferStatus {
        let status = unsafe { self.gl.check_framebuffer_status(glow::FRAMEBUFFER) };
        if status == glow::FRAMEBUFFER_COMPLETE {
            FramebufferStatus::Complete
        } else {
            FramebufferStatus::Incomplete(status)
        }
    }

    fn blit_framebuffer(
        &self,
        src: Option<FramebufferHandle>,
        dst: Option<FramebufferHandle>,
        src_size: (u32, u32),
        dst_size: (u32, u32),
        mask: ClearFlags,
    ) {
        unsafe {
            self.gl
                .bind_framebuffer(glow::READ_FRAMEBUFFER, src.map(native_framebuffer));
            self.gl
                .bind_framebuffer(glow::DRAW_FRAMEBUFFER, dst.map(native_framebuffer));
            self.gl.blit_framebuffer(
                0,
                0,
                src_size.0 as i32,
                src_size.1 as i32,
                0,
                0,
                dst_size.0 as i32,
                dst_size.1 as i32,
                clear_mask(mask),
                glow::NEAREST,
            );
            self.gl
                .bind_framebuffer(glow::FRAMEBUFFER, dst.map(native_framebuffer));
        }
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferHandle) {
        unsafe { self.gl.delete_framebuffer(native_framebuffer(framebuffer)) }
    }

    fn create_program(&self, sources: &ShaderSources) -> BackendResult<ProgramHandle> {
        let mut stages = vec![
            self.compile_stage(ShaderStage::Vertex, &sources.vertex)?,
            self.compile_stage(ShaderStage::Fragment, &sources.fragment)?,
        ];
        if let Some(geometry) = &sources.geometry {
            stages.push(self.compile_stage(ShaderStage::Geometry, geometry)?);
        }

        unsafe {
            let program = self
                .gl
                .create_program()
                .map_err(BackendError::ProgramLinkFailed)?;
            for &stage in &stages {
                self.gl.attach_shader(program, stage);
            }
            self.gl.link_program(program);
            let linked = self.gl.get_program_link_status(program);
            for &stage in &stages {
                self.gl.detach_shader(program, stage);
                self.gl.delete_shader(stage);
            }
            if !linked {
                let log = self.gl.get_program_info_log(program);
                self.gl.delete_program(program);
                return Err(BackendError::ProgramLinkFailed(log));
            }
            Ok(ProgramHandle(program.0))
        }
    }

    fn use_program(&self, program: Option<ProgramHandle>) {
        unsafe { self.gl.use_program(program.map(native_program)) }
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        unsafe {
            self.gl
                .get_uniform_location(native_program(program), name)
                .map(|location| UniformLocation(location.0))
        }
    }

    fn set_uniform(&self, location: UniformLocation, value: &UniformValue) {
        let location = glow::NativeUniformLocation(location.0);
        let location = Some(&location);
        unsafe {
            match value {
                UniformValue::Int(v) => self.gl.uniform_1_i32(location, *v),
                UniformValue::Float(v) => self.gl.uniform_1_f32(location, *v),
                UniformValue::Vec2(v) => self.gl.uniform_2_f32(location, v.x, v.y),
                UniformValue::Vec3(v) => self.gl.uniform_3_f32(location, v.x, v.y, v.z),
                UniformValue::Vec4(v) => self.gl.uniform_4_f32(location, v.x, v.y, v.z, v.w),
                UniformValue::Mat4(m) => {
                    self.gl
                        .uniform_matrix_4_f32_slice(location, false, &m.to_cols_array())
                }
                UniformValue::IntArray(values) => self.gl.uniform_1_i32_slice(location, values),
                UniformValue::Vec3Array(values) => {
                    let flat: Vec<f32> = values.iter().flat_map(|v| v.to_array()).collect();
                    self.gl.uniform_3_f32_slice(location, &flat)
                }
            }
        }
    }

    fn delete_program(&self, program: ProgramHandle) {
        unsafe { self.gl.delete_program(native_program(program)) }
    }

    fn set_viewport(&self, viewport: Viewport) {
        unsafe {
            self.gl.viewport(
                viewport.x,
                viewport.y,
                viewport.width as i32,
                viewport.height as i32,
            );
        }
    }

    fn viewport(&self) -> Viewport {
        let mut values = [0i32; 4];
        unsafe {
            self.gl.get_parameter_i32_slice(glow::VIEWPORT, &mut values);
        }
        Viewport {
            x: values[0],
            y: values[1],
            width: values[2].max(0) as u32,
            height: values[3].max(0) as u32,
        }
    }

    fn set_clear_color(&self, color: [f32; 4]) {
        unsafe { self.gl.clear_color(color[0], color[1], color[2], color[3]) }
    }

    fn clear(&self, flags: ClearFlags) {
        unsafe { self.gl.clear(clear_mask(flags)) }
    }

    fn clear_color_attachment(&self, index: u32, value: [f32; 4]) {
        unsafe { self.gl.clear_buffer_f32_slice(glow::COLOR, index, &value) }
    }

    fn set_blend(&self, blend: Option<BlendState>) {
        unsafe {
            match blend {
                Some(state) => {
                    self.gl.enable(glow::BLEND);
                    self.gl
                        .blend_func(blend_factor(state.src_factor), blend_factor(state.dst_factor));
                }
                None => self.gl.disable(glow::BLEND),
            }
        }
    }

    fn set_depth_test(&self, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(glow::DEPTH_TEST);
            } else {
                self.gl.disable(glow::DEPTH_TEST);
            }
        }
    }

    fn set_depth_write(&self, enabled: bool) {
        unsafe { self.gl.depth_mask(enabled) }
    }

    fn set_depth_func(&self, func: CompareFunction) {
        unsafe { self.gl.depth_func(compare_function(func)) }
    }

    fn set_stencil(&self, stencil: Option<StencilState>) {
        unsafe {
            match stencil {
                Some(state) => {
                    self.gl.enable(glow::STENCIL_TEST);
                    self.gl.stencil_func(
                        compare_function(state.compare),
                        state.reference,
                        state.read_mask,
                    );
                    self.gl.stencil_op(
                        stencil_op(state.fail),
                        stencil_op(state.depth_fail),
                        stencil_op(state.pass),
                    );
                }
                None => self.gl.disable(glow::STENCIL_TEST),
            }
        }
    }

    fn set_stencil_write_mask(&self, mask: u32) {
        unsafe { self.gl.stencil_mask(mask) }
    }

    fn set_color_write(&self, enabled: bool) {
        unsafe { self.gl.color_mask(enabled, enabled, enabled, enabled) }
    }

    fn draw_elements(&self, primitive: PrimitiveTopology, count: u32) {
        unsafe {
            self.gl
                .draw_elements(topology(primitive), count as i32, glow::UNSIGNED_INT, 0)
        }
    }

    fn draw_arrays(&self, primitive: PrimitiveTopology, first: u32, count: u32) {
        unsafe {
            self.gl
                .draw_arrays(topology(primitive), first as i32, count as i32)
        }
    }

    fn check_error(&self) -> Option<u32> {
        let error = unsafe { self.gl.get_error() };
        (error != glow::NO_ERROR).then_some(error)
    }
}
