//! SSAO sample kernel and rotation noise

use std::rc::Rc;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backend::{AddressMode, Device, FilterMode, PixelType, TextureDescriptor, TextureFormat};
use crate::error::EngineResult;
use crate::resources::texture::GpuTexture;

/// Side of the square rotation noise texture
pub const NOISE_SIZE: u32 = 4;

const KERNEL_SEED: u64 = 0x55A0;

/// Hemisphere samples plus the tiled noise that rotates them per pixel
pub struct SsaoKernel {
    samples: Vec<Vec3>,
    noise: Rc<GpuTexture>,
}

impl SsaoKernel {
    pub fn new(device: &Device, size: usize) -> EngineResult<Self> {
        let mut rng = StdRng::seed_from_u64(KERNEL_SEED);
        let samples = Self::generate_samples(&mut rng, size);

        let rotations: Vec<f32> = (0..NOISE_SIZE * NOISE_SIZE)
            .flat_map(|_| [rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0), 0.0f32])
            .collect();
        let noise = GpuTexture::with_data(
            device,
            TextureDescriptor::d2("ssao noise", NOISE_SIZE, NOISE_SIZE, TextureFormat::Rgb16Float)
                .with_filter(FilterMode::Nearest, FilterMode::Nearest)
                .with_address_mode(AddressMode::Repeat),
            PixelType::F32,
            bytemuck::cast_slice(&rotations),
        )?;

        log::debug!("SSAO kernel with {} samples", samples.len());
        Ok(Self {
            samples,
            noise: Rc::new(noise),
        })
    }

    /// Samples in the +Z hemisphere, denser near the origin
    fn generate_samples(rng: &mut StdRng, size: usize) -> Vec<Vec3> {
        (0..size)
            .map(|i| {
                let direction = Vec3::new(
                    rng.gen_range(-1.0..=1.0),
                    rng.gen_range(-1.0..=1.0),
                    rng.gen_range(0.0..=1.0),
                )
                .try_normalize()
                .unwrap_or(Vec3::Z);
                let t = i as f32 / size as f32;
                let scale = 0.1 + (1.0 - 0.1) * t * t;
                direction * rng.gen_range(0.0..=1.0f32) * scale
            })
            .collect()
    }

    pub fn samples(&self) -> &[Vec3] {
        &self.samples
    }

    pub fn noise(&self) -> Rc<GpuTexture> {
        self.noise.clone()
    }
}
