//! GPU buffer wrappers
//!
//! Each wrapper owns exactly one buffer handle and releases it on drop.

use std::marker::PhantomData;

use bytemuck::Pod;

use crate::backend::{BufferHandle, BufferTarget, BufferUsage, Device};
use crate::error::{EngineError, EngineResult};

/// Immutable vertex data
pub struct VertexBuffer {
    device: Device,
    handle: BufferHandle,
    size: usize,
}

impl VertexBuffer {
    pub fn new(device: &Device, data: &[u8]) -> EngineResult<Self> {
        let handle =
            device.create_buffer(BufferTarget::Vertex, data.len(), Some(data), BufferUsage::Static)?;
        Ok(Self {
            device: device.clone(),
            handle,
            size: data.len(),
        })
    }

    pub fn bind(&self) {
        self.device.bind_buffer(BufferTarget::Vertex, Some(self.handle));
    }

    pub fn unbind(&self) {
        self.device.bind_buffer(BufferTarget::Vertex, None);
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        self.device.delete_buffer(self.handle);
    }
}

/// 32-bit index data
pub struct IndexBuffer {
    device: Device,
    handle: BufferHandle,
    count: u32,
}

impl IndexBuffer {
    pub fn new(device: &Device, indices: &[u32]) -> EngineResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        let handle =
            device.create_buffer(BufferTarget::Index, bytes.len(), Some(bytes), BufferUsage::Static)?;
        Ok(Self {
            device: device.clone(),
            handle,
            count: indices.len() as u32,
        })
    }

    pub fn bind(&self) {
        self.device.bind_buffer(BufferTarget::Index, Some(self.handle));
    }

    pub fn unbind(&self) {
        self.device.bind_buffer(BufferTarget::Index, None);
    }

    /// Number of indices
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }
}

impl Drop for IndexBuffer {
    fn drop(&mut self) {
        self.device.delete_buffer(self.handle);
    }
}

/// Uniform block buffer with append-only, 16-byte aligned writes
///
/// Values are written back to back starting at offset 0. Every write advances
/// the cursor by the value's size rounded up to a multiple of
/// [`UniformBuffer::ALIGNMENT`], which matches the std140 rule for `vec4`-sized
/// members. Call [`UniformBuffer::reset`] at the start of each update.
pub struct UniformBuffer {
    device: Device,
    handle: BufferHandle,
    binding: u32,
    capacity: usize,
    offset: usize,
}

impl UniformBuffer {
    pub const ALIGNMENT: usize = 16;

    pub fn new(device: &Device, binding: u32, capacity: usize) -> EngineResult<Self> {
        let handle =
            device.create_buffer(BufferTarget::Uniform, capacity, None, BufferUsage::Dynamic)?;
        device.bind_buffer_base(BufferTarget::Uniform, binding, handle);
        log::debug!("uniform buffer at binding {} ({} bytes)", binding, capacity);
        Ok(Self {
            device: device.clone(),
            handle,
            binding,
            capacity,
            offset: 0,
        })
    }

    /// Append a value; returns the offset it was written at
    pub fn push_data<T: Pod>(&mut self, value: &T) -> EngineResult<usize> {
        self.push_bytes(bytemuck::bytes_of(value))
    }

    /// Append raw bytes; returns the offset they were written at
    pub fn push_bytes(&mut self, bytes: &[u8]) -> EngineResult<usize> {
        let start = self.offset;
        if start + bytes.len() > self.capacity {
            return Err(EngineError::BufferOverflow {
                buffer: "uniform buffer",
                requested: start + bytes.len(),
                capacity: self.capacity,
            });
        }
        self.device
            .write_buffer(BufferTarget::Uniform, self.handle, start, bytes);
        self.offset = start + bytes.len().next_multiple_of(Self::ALIGNMENT);
        Ok(start)
    }

    /// Rewind the write cursor to the start of the block
    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// Re-attach to the binding point
    pub fn bind(&self) {
        self.device
            .bind_buffer_base(BufferTarget::Uniform, self.binding, self.handle);
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn binding(&self) -> u32 {
        self.binding
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }
}

impl Drop for UniformBuffer {
    fn drop(&mut self) {
        self.device.delete_buffer(self.handle);
    }
}

/// Shader storage buffer holding up to `capacity` elements of `T`
///
/// Updates always overwrite the whole array from element 0.
pub struct StorageBuffer<T: Pod> {
    device: Device,
    handle: BufferHandle,
    binding: u32,
    capacity: usize,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> StorageBuffer<T> {
    pub fn new(device: &Device, binding: u32, capacity: usize) -> EngineResult<Self> {
        let size = capacity * std::mem::size_of::<T>();
        let handle = device.create_buffer(BufferTarget::Storage, size, None, BufferUsage::Dynamic)?;
        device.bind_buffer_base(BufferTarget::Storage, binding, handle);
        Ok(Self {
            device: device.clone(),
            handle,
            binding,
            capacity,
            len: 0,
            _marker: PhantomData,
        })
    }

    /// Replace the buffer contents with `data`
    pub fn update(&mut self, data: &[T]) -> EngineResult<()> {
        if data.len() > self.capacity {
            let element = std::mem::size_of::<T>();
            return Err(EngineError::BufferOverflow {
                buffer: "storage buffer",
                requested: data.len() * element,
                capacity: self.capacity * element,
            });
        }
        self.device.write_buffer(
            BufferTarget::Storage,
            self.handle,
            0,
            bytemuck::cast_slice(data),
        );
        self.device
            .bind_buffer_base(BufferTarget::Storage, self.binding, self.handle);
        self.len = data.len();
        Ok(())
    }

    /// Number of elements written by the last update
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }
}

impl<T: Pod> Drop for StorageBuffer<T> {
    fn drop(&mut self) {
        self.device.delete_buffer(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use glam::{Mat4, Vec3};
    use std::rc::Rc;

    fn device() -> (Rc<HeadlessBackend>, Device) {
        let backend = Rc::new(HeadlessBackend::new(64, 64));
        let device: Device = backend.clone();
        (backend, device)
    }

    #[test]
    fn test_push_data_advances_to_alignment() {
        let (_, device) = device();
        let mut ubo = UniformBuffer::new(&device, 0, 256).unwrap();

        assert_eq!(ubo.push_data(&Vec3::new(1.0, 2.0, 3.0)).unwrap(), 0);
        assert_eq!(ubo.offset(), 16);
        assert_eq!(ubo.push_data(&Vec3::ONE).unwrap(), 16);
        assert_eq!(ubo.offset(), 32);

        // Already aligned values advance by their own size
        assert_eq!(ubo.push_data(&Mat4::IDENTITY).unwrap(), 32);
        assert_eq!(ubo.offset(), 96);
    }

    #[test]
    fn test_push_past_capacity_is_an_error() {
        let (_, device) = device();
        let mut ubo = UniformBuffer::new(&device, 0, 64).unwrap();
        ubo.push_data(&Mat4::IDENTITY).unwrap();

        let err = ubo.push_data(&1.0f32).unwrap_err();
        assert!(matches!(
            err,
            EngineError::BufferOverflow { requested: 68, capacity: 64, .. }
        ));
        // cursor is untouched by the failed write
        assert_eq!(ubo.offset(), 64);

        ubo.reset();
        assert_eq!(ubo.push_data(&1.0f32).unwrap(), 0);
    }

    #[test]
    fn test_storage_buffer_overwrites_whole_array() {
        let (backend, device) = device();
        let mut ssbo = StorageBuffer::<[f32; 4]>::new(&device, 1, 3).unwrap();

        ssbo.update(&[[1.0; 4], [2.0; 4]]).unwrap();
        ssbo.update(&[[3.0; 4]]).unwrap();
        assert_eq!(ssbo.len(), 1);

        let contents = backend.buffer_contents(ssbo.handle()).unwrap();
        let values: &[[f32; 4]] = bytemuck::cast_slice(&contents);
        assert_eq!(values[0], [3.0; 4]);
        // The trailing element keeps stale data but is outside `len`
        assert_eq!(values[1], [2.0; 4]);
    }

    #[test]
    fn test_storage_buffer_rejects_overflow() {
        let (_, device) = device();
        let mut ssbo = StorageBuffer::<u32>::new(&device, 1, 2).unwrap();
        assert!(ssbo.update(&[1, 2, 3]).is_err());
        assert!(ssbo.is_empty());
    }

    #[test]
    fn test_buffers_release_on_drop() {
        let (backend, device) = device();
        {
            let _vb = VertexBuffer::new(&device, &[0u8; 64]).unwrap();
            let ib = IndexBuffer::new(&device, &[0, 1, 2]).unwrap();
            assert_eq!(ib.count(), 3);
            assert_eq!(backend.live_buffers(), 2);
        }
        assert_eq!(backend.live_buffers(), 0);
    }
}
