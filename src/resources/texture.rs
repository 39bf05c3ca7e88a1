//! Texture loading, caching and binding

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use image::DynamicImage;

use crate::backend::{
    Device, FilterMode, PixelType, TextureDescriptor, TextureFormat, TextureHandle, TextureKind,
    TextureUpload,
};
use crate::error::EngineResult;
use crate::pipeline::SsaoKernel;
use crate::resources::ibl::IblBaker;
use crate::resources::shader::Shader;

/// GPU texture owning its handle
pub struct GpuTexture {
    device: Device,
    handle: TextureHandle,
    desc: TextureDescriptor,
}

impl GpuTexture {
    /// Allocate storage without uploading anything
    pub fn new(device: &Device, desc: TextureDescriptor) -> EngineResult<Self> {
        let handle = device.create_texture(&desc)?;
        Ok(Self {
            device: device.clone(),
            handle,
            desc,
        })
    }

    /// Allocate a 2D texture, upload level 0 and build the rest of the mip chain
    pub fn with_data(
        device: &Device,
        desc: TextureDescriptor,
        pixel_type: PixelType,
        data: &[u8],
    ) -> EngineResult<Self> {
        let texture = Self::new(device, desc)?;
        device.upload_texture(
            texture.handle,
            texture.desc.kind,
            &TextureUpload {
                face: None,
                level: 0,
                width: texture.desc.width,
                height: texture.desc.height,
                format: texture.desc.format,
                pixel_type,
                data,
            },
        );
        if texture.desc.mip_levels > 1 {
            device.generate_mipmaps(texture.handle, texture.desc.kind);
        }
        Ok(texture)
    }

    /// 1x1 RGBA texture of a single color
    pub fn solid_color(device: &Device, label: &str, color: [u8; 4]) -> EngineResult<Self> {
        let desc = TextureDescriptor::d2(label, 1, 1, TextureFormat::Rgba8Unorm);
        Self::with_data(device, desc, PixelType::U8, &color)
    }

    pub fn bind(&self, unit: u32) {
        self.device.bind_texture(unit, self.desc.kind, Some(self.handle));
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn kind(&self) -> TextureKind {
        self.desc.kind
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.desc
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        self.device.delete_texture(self.handle);
    }
}

/// Role of a texture in a material or in the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureType {
    Diffuse,
    Specular,
    Normal,
    Metallic,
    Roughness,
    Ao,
    Height,
    Hdri,
    Cubemap,
    Noise,
    Brdf,
    Prefilter,
}

impl TextureType {
    /// Per-object material types, in binding order
    pub const MATERIAL: [TextureType; 7] = [
        TextureType::Diffuse,
        TextureType::Specular,
        TextureType::Normal,
        TextureType::Metallic,
        TextureType::Roughness,
        TextureType::Ao,
        TextureType::Height,
    ];

    pub fn is_material(&self) -> bool {
        Self::MATERIAL.contains(self)
    }

    /// Sampler uniform for the `index`-th texture of this type
    pub fn sampler_name(&self, index: usize) -> String {
        let array = match self {
            TextureType::Diffuse => "diffuseTextures",
            TextureType::Specular => "specularTextures",
            TextureType::Normal => "normalTextures",
            TextureType::Metallic => "metallicTextures",
            TextureType::Roughness => "roughnessTextures",
            TextureType::Ao => "aoTextures",
            TextureType::Height => "heightTextures",
            TextureType::Hdri => return "hdriMap".to_string(),
            TextureType::Cubemap => return "skybox".to_string(),
            TextureType::Noise => return "texNoise".to_string(),
            TextureType::Brdf => return "brdfLUT".to_string(),
            TextureType::Prefilter => return "prefilterMap".to_string(),
        };
        format!("{}[{}]", array, index)
    }

    /// Neutral texel used when a material lacks this type
    pub fn default_color(&self) -> Option<[u8; 4]> {
        match self {
            TextureType::Diffuse | TextureType::Ao => Some([255, 255, 255, 255]),
            TextureType::Specular | TextureType::Roughness => Some([128, 128, 128, 255]),
            TextureType::Normal => Some([128, 128, 255, 255]),
            TextureType::Metallic | TextureType::Height => Some([0, 0, 0, 255]),
            _ => None,
        }
    }
}

/// Shared, content-addressed texture store
///
/// Keys are file paths or synthetic tags. A key is decoded and uploaded once;
/// later requests hand out the same `Rc`.
pub struct TextureCache {
    device: Device,
    entries: RefCell<HashMap<String, Rc<GpuTexture>>>,
    defaults: RefCell<HashMap<TextureType, Rc<GpuTexture>>>,
    max_each_type: usize,
    max_object_slots: u32,
}

impl TextureCache {
    pub fn new(device: &Device, max_each_type: usize, max_object_slots: u32) -> Self {
        Self {
            device: device.clone(),
            entries: RefCell::new(HashMap::new()),
            defaults: RefCell::new(HashMap::new()),
            max_each_type,
            max_object_slots,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn max_each_type(&self) -> usize {
        self.max_each_type
    }

    pub fn max_object_slots(&self) -> u32 {
        self.max_object_slots
    }

    pub fn get(&self, key: &str) -> Option<Rc<GpuTexture>> {
        self.entries.borrow().get(key).cloned()
    }

    /// Register an externally created texture under `key`
    pub fn insert(&self, key: &str, texture: Rc<GpuTexture>) {
        self.entries.borrow_mut().insert(key.to_string(), texture);
    }

    /// Decode an image file (flipped for GL) and upload it with mipmaps
    pub fn load_file(&self, path: &Path) -> EngineResult<Rc<GpuTexture>> {
        let key = path.display().to_string();
        if let Some(texture) = self.get(&key) {
            return Ok(texture);
        }
        let bytes = std::fs::read(path)?;
        let image = image::load_from_memory(&bytes)?;
        self.upload_image(&key, image)
    }

    /// Decode an embedded compressed image
    pub fn load_memory(&self, tag: &str, bytes: &[u8]) -> EngineResult<Rc<GpuTexture>> {
        if let Some(texture) = self.get(tag) {
            return Ok(texture);
        }
        let image = image::load_from_memory(bytes)?;
        self.upload_image(tag, image)
    }

    /// Upload raw 8-bit pixels as-is
    pub fn load_raw(
        &self,
        tag: &str,
        width: u32,
        height: u32,
        channels: u32,
        bytes: &[u8],
    ) -> EngineResult<Rc<GpuTexture>> {
        if let Some(texture) = self.get(tag) {
            return Ok(texture);
        }
        let format = TextureFormat::from_channels(channels).unwrap_or(TextureFormat::Rgba8Unorm);
        let texture = Rc::new(GpuTexture::with_data(
            &self.device,
            Self::material_descriptor(tag, width, height, format),
            PixelType::U8,
            bytes,
        )?);
        self.insert(tag, texture.clone());
        Ok(texture)
    }

    fn upload_image(&self, key: &str, image: DynamicImage) -> EngineResult<Rc<GpuTexture>> {
        let image = image.flipv();
        let (width, height) = (image.width(), image.height());
        let (format, pixels) = match image.color().channel_count() {
            1 => (TextureFormat::R8Unorm, image.into_luma8().into_raw()),
            3 => (TextureFormat::Rgb8Unorm, image.into_rgb8().into_raw()),
            _ => (TextureFormat::Rgba8Unorm, image.into_rgba8().into_raw()),
        };
        let texture = Rc::new(GpuTexture::with_data(
            &self.device,
            Self::material_descriptor(key, width, height, format),
            PixelType::U8,
            &pixels,
        )?);
        log::debug!("texture {:?} loaded ({}x{}, {:?})", key, width, height, format);
        self.insert(key, texture.clone());
        Ok(texture)
    }

    fn material_descriptor(
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> TextureDescriptor {
        TextureDescriptor::d2(label, width, height, format)
            .with_mip_levels(TextureDescriptor::full_mip_count(width, height))
            .with_filter(FilterMode::LinearMipmapLinear, FilterMode::Linear)
    }

    /// Neutral texture of a material type, created on first use
    pub fn default_texture(&self, ty: TextureType) -> Option<Rc<GpuTexture>> {
        if let Some(texture) = self.defaults.borrow().get(&ty) {
            return Some(texture.clone());
        }
        let color = ty.default_color()?;
        match GpuTexture::solid_color(&self.device, &format!("default {:?}", ty), color) {
            Ok(texture) => {
                let texture = Rc::new(texture);
                self.defaults.borrow_mut().insert(ty, texture.clone());
                Some(texture)
            }
            Err(err) => {
                log::error!("failed to create default {:?} texture: {}", ty, err);
                None
            }
        }
    }

    /// Drop entries no `Texture` references any more; returns how many went
    pub fn purge_unused(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|_, texture| Rc::strong_count(texture) > 1);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

/// One texture held by a [`Texture`] container
#[derive(Clone)]
pub struct TextureSlot {
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub texture: Rc<GpuTexture>,
    pub ty: TextureType,
}

/// How [`Texture::bind`] assigns units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// Every material type from unit 0, padded with defaults, then globals
    All,
    /// The first texture of one type at a fixed unit
    Single { ty: TextureType, unit: u32 },
}

/// Ordered set of textures used by one mesh or pass
pub struct Texture {
    cache: Rc<TextureCache>,
    slots: Vec<TextureSlot>,
}

impl Texture {
    pub fn new(cache: Rc<TextureCache>) -> Self {
        Self {
            cache,
            slots: Vec::new(),
        }
    }

    fn has_room(&self, ty: TextureType, key: &str) -> bool {
        if self.count(ty) >= self.cache.max_each_type() {
            log::warn!(
                "texture set already holds {} {:?} textures, skipping {:?}",
                self.cache.max_each_type(),
                ty,
                key
            );
            return false;
        }
        true
    }

    /// Add an already uploaded texture
    pub fn add_texture(&mut self, key: &str, ty: TextureType, texture: Rc<GpuTexture>) -> bool {
        if !self.has_room(ty, key) {
            return false;
        }
        self.slots.push(TextureSlot {
            key: key.to_string(),
            width: texture.width(),
            height: texture.height(),
            channels: texture.format().channel_count(),
            texture,
            ty,
        });
        true
    }

    /// Load an image file into the next slot of `ty`
    pub fn add_image(&mut self, path: impl AsRef<Path>, ty: TextureType) -> bool {
        let path = path.as_ref();
        let key = path.display().to_string();
        if !self.has_room(ty, &key) {
            return false;
        }
        match self.cache.load_file(path) {
            Ok(texture) => self.add_texture(&key, ty, texture),
            Err(err) => {
                log::error!("failed to load texture {}: {}", key, err);
                false
            }
        }
    }

    /// Add an embedded compressed image (PNG, JPEG, ...)
    pub fn add_image_from_memory(&mut self, tag: &str, ty: TextureType, bytes: &[u8]) -> bool {
        if !self.has_room(ty, tag) {
            return false;
        }
        match self.cache.load_memory(tag, bytes) {
            Ok(texture) => self.add_texture(tag, ty, texture),
            Err(err) => {
                log::error!("failed to decode embedded texture {:?}: {}", tag, err);
                false
            }
        }
    }

    /// Add raw 8-bit pixels
    pub fn add_image_from_raw(
        &mut self,
        tag: &str,
        ty: TextureType,
        width: u32,
        height: u32,
        channels: u32,
        bytes: &[u8],
    ) -> bool {
        if !self.has_room(ty, tag) {
            return false;
        }
        match self.cache.load_raw(tag, width, height, channels, bytes) {
            Ok(texture) => self.add_texture(tag, ty, texture),
            Err(err) => {
                log::error!("failed to upload raw texture {:?}: {}", tag, err);
                false
            }
        }
    }

    /// Add the SSAO rotation noise
    pub fn add_noise(&mut self, kernel: &SsaoKernel) -> bool {
        self.add_texture("ssao noise", TextureType::Noise, kernel.noise())
    }

    /// Bake (or reuse) a BRDF lookup table
    pub fn add_brdf_lut(&mut self, baker: &IblBaker, size: u32) -> bool {
        let key = format!("brdf lut {}", size);
        if let Some(texture) = self.cache.get(&key) {
            return self.add_texture(&key, TextureType::Brdf, texture);
        }
        match baker.bake_brdf_lut(size) {
            Ok(texture) => {
                let texture = Rc::new(texture);
                self.cache.insert(&key, texture.clone());
                self.add_texture(&key, TextureType::Brdf, texture)
            }
            Err(err) => {
                log::error!("failed to bake BRDF LUT: {}", err);
                false
            }
        }
    }

    /// Convert an equirectangular HDRI into a cubemap, plus its prefiltered chain
    pub fn add_hdri_cubemap(
        &mut self,
        baker: &IblBaker,
        path: impl AsRef<Path>,
        size: u32,
        prefilter: bool,
    ) -> bool {
        let path = path.as_ref();
        let key = format!("{} cubemap {}", path.display(), size);
        let cubemap = match self.cache.get(&key) {
            Some(cubemap) => cubemap,
            None => match baker.hdri_to_cubemap(path, size) {
                Ok(cubemap) => {
                    let cubemap = Rc::new(cubemap);
                    self.cache.insert(&key, cubemap.clone());
                    cubemap
                }
                Err(err) => {
                    log::error!("failed to convert HDRI {}: {}", path.display(), err);
                    return false;
                }
            },
        };
        if !self.add_texture(&key, TextureType::Cubemap, cubemap.clone()) {
            return false;
        }
        if !prefilter {
            return true;
        }

        let prefilter_key = format!("{} prefilter", key);
        if let Some(texture) = self.cache.get(&prefilter_key) {
            return self.add_texture(&prefilter_key, TextureType::Prefilter, texture);
        }
        match baker.prefilter(&cubemap, size) {
            Ok(texture) => {
                let texture = Rc::new(texture);
                self.cache.insert(&prefilter_key, texture.clone());
                self.add_texture(&prefilter_key, TextureType::Prefilter, texture)
            }
            Err(err) => {
                log::error!("failed to prefilter {}: {}", path.display(), err);
                false
            }
        }
    }

    /// Number of slots of one type
    pub fn count(&self, ty: TextureType) -> usize {
        self.slots.iter().filter(|slot| slot.ty == ty).count()
    }

    pub fn first(&self, ty: TextureType) -> Option<&TextureSlot> {
        self.slots.iter().find(|slot| slot.ty == ty)
    }

    pub fn slots(&self) -> &[TextureSlot] {
        &self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bind textures and point their sampler uniforms at the units used.
    ///
    /// Returns the number of units bound.
    pub fn bind(&self, shader: &Shader, mode: BindMode) -> u32 {
        shader.bind();
        match mode {
            BindMode::Single { ty, unit } => {
                let texture = match self.first(ty) {
                    Some(slot) => Some(slot.texture.clone()),
                    None => self.cache.default_texture(ty),
                };
                let Some(texture) = texture else {
                    log::warn!("no {:?} texture to bind at unit {}", ty, unit);
                    return 0;
                };
                texture.bind(unit);
                shader.set_int(&ty.sampler_name(0), unit as i32);
                1
            }
            BindMode::All => self.bind_all(shader),
        }
    }

    fn bind_all(&self, shader: &Shader) -> u32 {
        let max_units = self.cache.max_object_slots();
        let mut unit = 0;

        for ty in TextureType::MATERIAL {
            let mut slots = self.slots.iter().filter(|slot| slot.ty == ty);
            for index in 0..self.cache.max_each_type() {
                let texture = match slots.next() {
                    Some(slot) => Some(slot.texture.clone()),
                    None => self.cache.default_texture(ty),
                };
                let Some(texture) = texture else {
                    continue;
                };
                if unit >= max_units {
                    log::warn!("out of object texture units ({}), stopping at {:?}", max_units, ty);
                    return unit;
                }
                texture.bind(unit);
                shader.set_int(&ty.sampler_name(index), unit as i32);
                unit += 1;
            }
        }

        for slot in self.slots.iter().filter(|slot| !slot.ty.is_material()) {
            if unit >= max_units {
                log::warn!("out of object texture units ({}), skipping {:?}", max_units, slot.key);
                break;
            }
            slot.texture.bind(unit);
            shader.set_int(&slot.ty.sampler_name(0), unit as i32);
            unit += 1;
        }
        unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessBackend, UniformValue};

    const SHADER: &str = "#shader vertex\nv\n#shader fragment\nf\n";

    fn setup(max_each_type: usize, max_object_slots: u32) -> (Rc<HeadlessBackend>, Rc<TextureCache>) {
        let backend = Rc::new(HeadlessBackend::new(64, 64));
        let device: Device = backend.clone();
        let cache = Rc::new(TextureCache::new(&device, max_each_type, max_object_slots));
        (backend, cache)
    }

    #[test]
    fn test_sampler_names() {
        assert_eq!(TextureType::Diffuse.sampler_name(1), "diffuseTextures[1]");
        assert_eq!(TextureType::Ao.sampler_name(0), "aoTextures[0]");
        assert_eq!(TextureType::Brdf.sampler_name(3), "brdfLUT");
        assert_eq!(TextureType::Cubemap.sampler_name(0), "skybox");
    }

    #[test]
    fn test_cap_per_type() {
        let (_, cache) = setup(2, 16);
        let mut texture = Texture::new(cache);
        let pixel = [255u8; 4];

        assert!(texture.add_image_from_raw("a", TextureType::Diffuse, 1, 1, 4, &pixel));
        assert!(texture.add_image_from_raw("b", TextureType::Diffuse, 1, 1, 4, &pixel));
        assert!(!texture.add_image_from_raw("c", TextureType::Diffuse, 1, 1, 4, &pixel));
        assert!(texture.add_image_from_raw("d", TextureType::Normal, 1, 1, 4, &pixel));
        assert_eq!(texture.count(TextureType::Diffuse), 2);
        assert_eq!(texture.slots().len(), 3);
    }

    #[test]
    fn test_cache_shares_uploads() {
        let (backend, cache) = setup(2, 16);
        let mut first = Texture::new(cache.clone());
        let mut second = Texture::new(cache.clone());
        let pixels = [10u8, 20, 30];

        assert!(first.add_image_from_raw("shared", TextureType::Diffuse, 1, 1, 3, &pixels));
        assert!(second.add_image_from_raw("shared", TextureType::Diffuse, 1, 1, 3, &pixels));
        assert_eq!(backend.live_textures(), 1);
        assert!(Rc::ptr_eq(
            &first.slots()[0].texture,
            &second.slots()[0].texture
        ));
        assert_eq!(first.slots()[0].channels, 3);

        drop(first);
        drop(second);
        assert_eq!(cache.purge_unused(), 1);
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_bind_all_fills_missing_slots_with_defaults() {
        let (backend, cache) = setup(2, 16);
        let device: Device = backend.clone();
        let shader = Shader::from_source(&device, "mesh", SHADER);
        let mut texture = Texture::new(cache.clone());
        assert!(texture.add_image_from_raw("albedo", TextureType::Diffuse, 1, 1, 4, &[255; 4]));

        let units = texture.bind(&shader, BindMode::All);
        assert_eq!(units, 14);

        let own = texture.first(TextureType::Diffuse).unwrap().texture.handle();
        let default = cache.default_texture(TextureType::Diffuse).unwrap().handle();
        assert_eq!(backend.bound_texture(0), Some(own));
        assert_eq!(backend.bound_texture(1), Some(default));

        let program = shader.handle().unwrap();
        assert_eq!(
            backend.uniform(program, "diffuseTextures[1]"),
            Some(UniformValue::Int(1))
        );
        assert_eq!(
            backend.uniform(program, "heightTextures[1]"),
            Some(UniformValue::Int(13))
        );
    }

    #[test]
    fn test_bind_all_stops_before_unit_limit() {
        let (backend, cache) = setup(2, 5);
        let device: Device = backend.clone();
        let shader = Shader::from_source(&device, "mesh", SHADER);
        let texture = Texture::new(cache);

        assert_eq!(texture.bind(&shader, BindMode::All), 5);
        assert_eq!(backend.bound_texture(5), None);
    }

    #[test]
    fn test_bind_single() {
        let (backend, cache) = setup(2, 16);
        let device: Device = backend.clone();
        let shader = Shader::from_source(&device, "quad", SHADER);
        let mut texture = Texture::new(cache);
        assert!(texture.add_image_from_raw("lut", TextureType::Brdf, 2, 2, 4, &[0; 16]));

        let bound = texture.bind(
            &shader,
            BindMode::Single {
                ty: TextureType::Brdf,
                unit: 5,
            },
        );
        assert_eq!(bound, 1);
        assert_eq!(
            backend.bound_texture(5),
            Some(texture.slots()[0].texture.handle())
        );
        assert_eq!(
            backend.uniform(shader.handle().unwrap(), "brdfLUT"),
            Some(UniformValue::Int(5))
        );
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let (_, cache) = setup(2, 16);
        let mut texture = Texture::new(cache);
        assert!(!texture.add_image("no/such/texture.png", TextureType::Diffuse));
        assert!(texture.is_empty());
    }
}
