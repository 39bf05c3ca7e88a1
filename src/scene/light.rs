//! Lights, their GPU array and their shadow maps

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::backend::{
    Attachment, ClearFlags, CubeFace, Device, FilterMode, FramebufferHandle, FramebufferStatus,
    TextureDescriptor, TextureFormat, Viewport,
};
use crate::error::EngineResult;
use crate::resources::buffer::StorageBuffer;
use crate::resources::layout::VertexArray;
use crate::resources::mesh::MeshData;
use crate::resources::shader::Shader;
use crate::resources::texture::GpuTexture;
use crate::scene::model::Model;

/// SSBO binding point of the light array
pub const LIGHT_BINDING: u32 = 1;
/// Distance directional lights are pushed back along their direction
pub const BACK_DIST: f32 = 10.0;
/// Directional shadow map resolution relative to the screen
pub const SHADOW_RATE: u32 = 1;
/// Edge length of point light shadow cubemaps
pub const CUBE_SHADOW_SIZE: u32 = 1024;
/// Half extent of the directional shadow frustum
pub const ORTHO_SIZE: f32 = 15.0;
/// Far plane of point light shadow projections
pub const POINT_FAR_PLANE: f32 = 20.0;
const POINT_NEAR_PLANE: f32 = 1.0;
const MARKER_SCALE: f32 = 0.1;

/// A light as configured by the application
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightUnit {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    /// Ambient, diffuse and specular strength
    pub intensity: Vec3,
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
    pub visible: bool,
    pub directional: bool,
}

impl Default for LightUnit {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
            intensity: Vec3::new(0.2, 0.5, 0.5),
            constant: 1.0,
            linear: 0.14,
            quadratic: 0.07,
            visible: true,
            directional: false,
        }
    }
}

impl LightUnit {
    pub fn point(position: Vec3, color: Vec3) -> Self {
        Self {
            position,
            color,
            ..Default::default()
        }
    }

    pub fn directional(direction: Vec3, color: Vec3) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            color,
            directional: true,
            ..Default::default()
        }
    }

    pub fn to_gpu(&self) -> GpuLight {
        GpuLight {
            position: self.position.extend(0.0),
            direction: self.direction.extend(0.0),
            color: self.color.extend(0.0),
            intensity: self.intensity.extend(0.0),
            constant: self.constant,
            linear: self.linear,
            quadratic: self.quadratic,
            visibility: self.visible as i32,
            is_directional: self.directional as i32,
            _padding: [0.0; 3],
        }
    }
}

/// std430 light record
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuLight {
    pub position: Vec4,
    pub direction: Vec4,
    pub color: Vec4,
    pub intensity: Vec4,
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
    pub visibility: i32,
    pub is_directional: i32,
    pub _padding: [f32; 3],
}

/// Limits and sizes shared by every light container of a renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightConfig {
    /// Cap on directional lights, and separately on point lights
    pub max_shadow_map_slots: usize,
    /// First texture unit used for shadow maps
    pub max_object_texture_slots: u32,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            max_shadow_map_slots: 4,
            max_object_texture_slots: 16,
            screen_width: 1280,
            screen_height: 720,
        }
    }
}

/// Depth target of one light
pub struct ShadowMap {
    device: Device,
    is_directional: bool,
    framebuffer: FramebufferHandle,
    texture: GpuTexture,
    width: u32,
    height: u32,
}

impl ShadowMap {
    /// Screen-sized 2D depth map with a white border
    pub fn directional(device: &Device, width: u32, height: u32) -> EngineResult<Self> {
        let desc = TextureDescriptor::d2("directional shadow", width, height, TextureFormat::Depth32Float)
            .with_filter(FilterMode::Nearest, FilterMode::Nearest)
            .with_border_color([1.0; 4]);
        Self::new(device, desc, true)
    }

    /// Depth cubemap rendered in one layered pass
    pub fn point(device: &Device, size: u32) -> EngineResult<Self> {
        let desc = TextureDescriptor::cube("point shadow", size, TextureFormat::Depth32Float)
            .with_filter(FilterMode::Nearest, FilterMode::Nearest);
        Self::new(device, desc, false)
    }

    fn new(device: &Device, desc: TextureDescriptor, is_directional: bool) -> EngineResult<Self> {
        let (width, height, kind) = (desc.width, desc.height, desc.kind);
        let texture = GpuTexture::new(device, desc)?;
        let framebuffer = device.create_framebuffer()?;
        device.bind_framebuffer(Some(framebuffer));
        device.attach_texture(Attachment::Depth, texture.handle(), kind, None, 0);
        device.set_draw_buffers(0);
        if let FramebufferStatus::Incomplete(code) = device.framebuffer_status() {
            log::error!(
                "{} shadow framebuffer is incomplete (status {:#x})",
                if is_directional { "directional" } else { "point" },
                code
            );
        }
        device.bind_framebuffer(None);

        Ok(Self {
            device: device.clone(),
            is_directional,
            framebuffer,
            texture,
            width,
            height,
        })
    }

    pub fn is_directional(&self) -> bool {
        self.is_directional
    }

    pub fn framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    pub fn texture(&self) -> &GpuTexture {
        &self.texture
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Drop for ShadowMap {
    fn drop(&mut self) {
        self.device.delete_framebuffer(self.framebuffer);
    }
}

/// Parse `#RRGGBB`, `RRGGBB`, `#RGB` or `RGB` into a 0..1 color.
///
/// Malformed input yields black.
pub fn hex_to_vec3(hex: &str) -> Vec3 {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Vec3::ZERO;
    }
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return Vec3::ZERO,
    };
    let channel = |i: usize| {
        expanded
            .get(i..i + 2)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
    };
    match (channel(0), channel(2), channel(4)) {
        (Some(r), Some(g), Some(b)) => Vec3::new(r as f32, g as f32, b as f32) / 255.0,
        _ => Vec3::ZERO,
    }
}

/// Light set with one shadow map per accepted light
pub struct Lights {
    device: Device,
    config: LightConfig,
    lights: Vec<LightUnit>,
    shadow_maps: Vec<ShadowMap>,
    ssbo: StorageBuffer<GpuLight>,
    marker: VertexArray,
    directional_count: usize,
    point_count: usize,
    light_projection: Mat4,
}

impl Lights {
    pub fn new(device: &Device, config: LightConfig) -> EngineResult<Self> {
        let ssbo = StorageBuffer::new(device, LIGHT_BINDING, config.max_shadow_map_slots * 2)?;
        Ok(Self {
            device: device.clone(),
            config,
            lights: Vec::new(),
            shadow_maps: Vec::new(),
            ssbo,
            marker: MeshData::cube().upload(device)?,
            directional_count: 0,
            point_count: 0,
            light_projection: Mat4::orthographic_rh_gl(
                -ORTHO_SIZE,
                ORTHO_SIZE,
                -ORTHO_SIZE,
                ORTHO_SIZE,
                0.1,
                100.0,
            ),
        })
    }

    /// Register a light and allocate its shadow map.
    ///
    /// Returns `Ok(None)` when the light's type is already at its cap.
    pub fn add_light(&mut self, mut unit: LightUnit) -> EngineResult<Option<usize>> {
        let max = self.config.max_shadow_map_slots;
        if unit.directional {
            if self.directional_count >= max {
                log::warn!("directional lights exceed the max slots ({})", max);
                return Ok(None);
            }
            unit.position = -unit.direction * BACK_DIST;
        } else if self.point_count >= max {
            log::warn!("point lights exceed the max slots ({})", max);
            return Ok(None);
        }

        let shadow_map = if unit.directional {
            ShadowMap::directional(
                &self.device,
                self.config.screen_width * SHADOW_RATE,
                self.config.screen_height * SHADOW_RATE,
            )?
        } else {
            ShadowMap::point(&self.device, CUBE_SHADOW_SIZE)?
        };

        self.lights.push(unit);
        let gpu: Vec<GpuLight> = self.lights.iter().map(LightUnit::to_gpu).collect();
        if let Err(err) = self.ssbo.update(&gpu) {
            self.lights.pop();
            return Err(err);
        }
        self.shadow_maps.push(shadow_map);
        if unit.directional {
            self.directional_count += 1;
        } else {
            self.point_count += 1;
        }
        log::debug!(
            "added {} light {}",
            if unit.directional { "directional" } else { "point" },
            self.lights.len() - 1
        );
        Ok(Some(self.lights.len() - 1))
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn lights(&self) -> &[LightUnit] {
        &self.lights
    }

    pub fn shadow_maps(&self) -> &[ShadowMap] {
        &self.shadow_maps
    }

    pub fn directional_count(&self) -> usize {
        self.directional_count
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn config(&self) -> &LightConfig {
        &self.config
    }

    /// Track a new screen size; directional maps are reallocated to match
    pub fn set_screen_size(&mut self, width: u32, height: u32) -> EngineResult<()> {
        if self.config.screen_width == width && self.config.screen_height == height {
            return Ok(());
        }
        for shadow in self.shadow_maps.iter_mut().filter(|s| s.is_directional) {
            *shadow = ShadowMap::directional(&self.device, width * SHADOW_RATE, height * SHADOW_RATE)?;
        }
        self.config.screen_width = width;
        self.config.screen_height = height;
        Ok(())
    }

    /// Orthographic light-space matrix of a directional light
    pub fn light_space_matrix(&self, light: &LightUnit) -> Mat4 {
        let up = if light.direction.normalize_or_zero().dot(Vec3::Y).abs() > 0.99 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(light.position, light.position + light.direction, up);
        self.light_projection * view
    }

    /// Six face matrices of a point light, in cubemap face order
    pub fn point_shadow_matrices(position: Vec3) -> [Mat4; 6] {
        let projection = Mat4::perspective_rh_gl(
            90.0f32.to_radians(),
            1.0,
            POINT_NEAR_PLANE,
            POINT_FAR_PLANE,
        );
        CubeFace::ALL.map(|face| {
            let (direction, up) = face.view_basis();
            projection * Mat4::look_at_rh(position, position + direction, up)
        })
    }

    /// Render every shadow map from `models`, restoring the viewport afterwards
    pub fn bake_shadows(&self, directional_shader: &Shader, point_shader: &Shader, models: &[&Model]) {
        let saved = self.device.viewport();

        for (light, shadow) in self.lights.iter().zip(&self.shadow_maps) {
            let shader = if shadow.is_directional {
                directional_shader.bind();
                directional_shader.set_mat4("lightSpaceMatrix", self.light_space_matrix(light));
                directional_shader
            } else {
                point_shader.bind();
                for (i, matrix) in Self::point_shadow_matrices(light.position).into_iter().enumerate() {
                    point_shader.set_mat4(&format!("shadowMatrices[{}]", i), matrix);
                }
                point_shader.set_float("far_plane", POINT_FAR_PLANE);
                point_shader.set_vec3("lightPos", light.position);
                point_shader
            };

            self.device.set_viewport(Viewport::new(shadow.width, shadow.height));
            self.device.bind_framebuffer(Some(shadow.framebuffer));
            self.device.clear(ClearFlags::DEPTH);
            for model in models {
                model.draw_geometry(shader);
            }
            self.device.bind_framebuffer(None);
        }

        self.device.set_viewport(saved);
    }

    /// Bind shadow maps after the object texture units.
    ///
    /// The n-th directional map sits at `start + n` and the n-th point map at
    /// `start + max + n`, where `start` is the object slot count.
    pub fn bind_shadow(&self, shader: &Shader) {
        let start = self.config.max_object_texture_slots;
        let max = self.config.max_shadow_map_slots as u32;

        shader.bind();
        shader.set_mat4("lightProjection", self.light_projection);
        shader.set_float("farPlane", POINT_FAR_PLANE);

        let directional_units: Vec<i32> = (0..max).map(|i| (start + i) as i32).collect();
        let cube_units: Vec<i32> = (0..max).map(|i| (start + max + i) as i32).collect();
        shader.set_int_array("shadowMaps", &directional_units);
        shader.set_int_array("shadowCubeMaps", &cube_units);

        let (mut directional, mut point) = (0, 0);
        for shadow in &self.shadow_maps {
            if shadow.is_directional {
                shadow.texture.bind(start + directional);
                directional += 1;
            } else {
                shadow.texture.bind(start + max + point);
                point += 1;
            }
        }
    }

    pub fn set_light_uniforms(&self, shader: &Shader) {
        shader.bind();
        shader.set_int("numLights", self.lights.len() as i32);
    }

    /// Draw a small cube at every visible light
    pub fn draw_markers(&self, shader: &Shader) {
        shader.bind();
        for light in self.lights.iter().filter(|light| light.visible) {
            shader.set_vec3("lightColor", light.color);
            shader.set_mat4(
                "model",
                Mat4::from_scale_rotation_translation(
                    Vec3::splat(MARKER_SCALE),
                    glam::Quat::IDENTITY,
                    light.position,
                ),
            );
            self.marker.draw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessBackend, TextureKind, UniformValue};
    use rstest::rstest;
    use std::rc::Rc;

    const SHADER: &str = "#shader vertex\nv\n#shader fragment\nf\n";

    fn lights(max: usize) -> (Rc<HeadlessBackend>, Lights) {
        let backend = Rc::new(HeadlessBackend::new(800, 600));
        let device: Device = backend.clone();
        let config = LightConfig {
            max_shadow_map_slots: max,
            max_object_texture_slots: 16,
            screen_width: 800,
            screen_height: 600,
        };
        (backend, Lights::new(&device, config).unwrap())
    }

    #[test]
    fn test_gpu_light_layout() {
        assert_eq!(std::mem::size_of::<GpuLight>(), 96);
        assert_eq!(std::mem::align_of::<GpuLight>(), 16);
        let gpu = LightUnit::default().to_gpu();
        assert_eq!(gpu.visibility, 1);
        assert_eq!(gpu.is_directional, 0);
    }

    #[rstest]
    #[case::long_with_hash("#FF00FF", Vec3::new(1.0, 0.0, 1.0))]
    #[case::short("F0F", Vec3::new(1.0, 0.0, 1.0))]
    #[case::short_with_hash("#fff", Vec3::ONE)]
    #[case::bad_digit("#GG0000", Vec3::ZERO)]
    #[case::bad_length("#12345", Vec3::ZERO)]
    #[case::signed_pair("+12345", Vec3::ZERO)]
    #[case::signed_short("#+ff", Vec3::ZERO)]
    #[case::empty("", Vec3::ZERO)]
    fn test_hex_to_vec3(#[case] input: &str, #[case] expected: Vec3) {
        assert_eq!(hex_to_vec3(input), expected);
    }

    #[test]
    fn test_add_light_grows_lights_and_shadow_maps_together() {
        let (_, mut lights) = lights(2);
        let index = lights
            .add_light(LightUnit::point(Vec3::new(1.0, 2.0, 3.0), Vec3::ONE))
            .unwrap();
        assert_eq!(index, Some(0));
        assert_eq!(lights.len(), 1);
        assert_eq!(lights.shadow_maps().len(), 1);
        assert!(!lights.shadow_maps()[0].is_directional());
        assert_eq!(lights.shadow_maps()[0].width(), CUBE_SHADOW_SIZE);
    }

    #[test]
    fn test_cap_is_checked_per_type_before_counting() {
        let (_, mut lights) = lights(1);
        let sun = LightUnit::directional(Vec3::new(0.0, -1.0, 1.0), Vec3::ONE);

        assert_eq!(lights.add_light(sun).unwrap(), Some(0));
        assert_eq!(lights.add_light(sun).unwrap(), None);
        assert_eq!(lights.add_light(sun).unwrap(), None);
        assert_eq!(lights.directional_count(), 1);

        // The other type has its own budget
        assert_eq!(lights.add_light(LightUnit::default()).unwrap(), Some(1));
        assert_eq!(lights.len(), 2);
        assert_eq!(lights.shadow_maps().len(), 2);
        assert_eq!(lights.point_count(), 1);
    }

    #[test]
    fn test_directional_light_is_pushed_back() {
        let (_, mut lights) = lights(1);
        lights
            .add_light(LightUnit::directional(Vec3::NEG_Y, Vec3::ONE))
            .unwrap();
        assert_eq!(lights.lights()[0].position, Vec3::new(0.0, BACK_DIST, 0.0));
        let shadow = &lights.shadow_maps()[0];
        assert_eq!((shadow.width(), shadow.height()), (800, 600));
    }

    #[test]
    fn test_vertical_light_uses_z_up() {
        let (_, lights) = lights(1);
        let light = LightUnit {
            position: Vec3::new(0.0, 10.0, 0.0),
            ..LightUnit::directional(Vec3::NEG_Y, Vec3::ONE)
        };
        let matrix = lights.light_space_matrix(&light);
        assert!(matrix.is_finite());
    }

    #[test]
    fn test_bake_shadows_restores_viewport() {
        let (backend, mut lights) = lights(2);
        let device: Device = backend.clone();
        lights
            .add_light(LightUnit::directional(Vec3::new(-0.2, -1.0, -0.3), Vec3::ONE))
            .unwrap();
        lights
            .add_light(LightUnit::point(Vec3::new(0.0, 2.0, 0.0), Vec3::ONE))
            .unwrap();

        let kinds: Vec<_> = lights
            .shadow_maps()
            .iter()
            .map(|s| backend.texture_descriptor(s.texture().handle()).unwrap().kind)
            .collect();
        assert_eq!(kinds, vec![TextureKind::D2, TextureKind::Cube]);

        let directional = Shader::from_source(&device, "shadow", SHADER);
        let point = Shader::from_source(&device, "point shadow", SHADER);
        let model = Model::from_mesh(&device, &MeshData::cube(), None).unwrap();

        device.set_viewport(Viewport::new(640, 480));
        lights.bake_shadows(&directional, &point, &[&model]);

        assert_eq!(device.viewport(), Viewport::new(640, 480));
        assert_eq!(backend.bound_framebuffer(), None);
        assert_eq!(backend.draw_count(), 2);
        assert!(backend
            .uniform(point.handle().unwrap(), "shadowMatrices[5]")
            .is_some());
        assert_eq!(
            backend.uniform(point.handle().unwrap(), "far_plane"),
            Some(UniformValue::Float(POINT_FAR_PLANE))
        );
    }

    #[test]
    fn test_bind_shadow_uses_per_type_units() {
        let (backend, mut lights) = lights(2);
        let device: Device = backend.clone();
        lights.add_light(LightUnit::default()).unwrap();
        lights
            .add_light(LightUnit::directional(Vec3::NEG_Z, Vec3::ONE))
            .unwrap();

        let shader = Shader::from_source(&device, "lighting", SHADER);
        lights.bind_shadow(&shader);

        let directional = lights.shadow_maps()[1].texture().handle();
        let point = lights.shadow_maps()[0].texture().handle();
        assert_eq!(backend.bound_texture(16), Some(directional));
        assert_eq!(backend.bound_texture(18), Some(point));
        assert_eq!(
            backend.uniform(shader.handle().unwrap(), "shadowCubeMaps"),
            Some(UniformValue::IntArray(vec![18, 19]))
        );
    }

    #[test]
    fn test_markers_skip_hidden_lights() {
        let (backend, mut lights) = lights(4);
        let device: Device = backend.clone();
        lights.add_light(LightUnit::default()).unwrap();
        lights
            .add_light(LightUnit {
                visible: false,
                ..LightUnit::default()
            })
            .unwrap();

        let shader = Shader::from_source(&device, "marker", SHADER);
        backend.clear_commands();
        lights.draw_markers(&shader);
        assert_eq!(backend.draw_count(), 1);
    }
}
