//! Vertex layout description and the vertex array that binds it.
//!
//! A [`VertexLayout`] is an ordered list of elements. Attribute `i` of the
//! shader reads element `i`, starting at the running byte offset of the
//! preceding elements. The stride is the sum of every element's size.
//!
//! ```
//! use gl_render_engine::resources::VertexLayout;
//! use gl_render_engine::backend::ElementKind;
//!
//! let mut layout = VertexLayout::new();
//! layout.push(ElementKind::Float, 3); // position
//! layout.push(ElementKind::Float, 2); // uv
//! assert_eq!(layout.stride(), 20);
//! ```

use crate::backend::{
    Device, ElementKind, PrimitiveTopology, VertexArrayHandle, VertexAttribute,
};
use crate::error::EngineResult;
use crate::resources::buffer::{IndexBuffer, VertexBuffer};

/// One element of a vertex layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutElement {
    pub kind: ElementKind,
    pub count: u32,
    pub normalized: bool,
}

impl LayoutElement {
    /// Size of the element in bytes
    pub fn size(&self) -> u32 {
        self.kind.size() * self.count
    }
}

/// Ordered vertex attribute layout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexLayout {
    elements: Vec<LayoutElement>,
    stride: u32,
}

impl VertexLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `count` components of `kind`
    pub fn push(&mut self, kind: ElementKind, count: u32) -> &mut Self {
        let element = LayoutElement {
            kind,
            count,
            normalized: kind.normalized(),
        };
        self.stride += element.size();
        self.elements.push(element);
        self
    }

    pub fn elements(&self) -> &[LayoutElement] {
        &self.elements
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Byte offset of every element, in order
    pub fn offsets(&self) -> Vec<u32> {
        self.elements
            .iter()
            .scan(0, |offset, element| {
                let current = *offset;
                *offset += element.size();
                Some(current)
            })
            .collect()
    }

    /// Attribute pointers describing this layout
    pub fn attributes(&self) -> Vec<VertexAttribute> {
        self.elements
            .iter()
            .zip(self.offsets())
            .enumerate()
            .map(|(location, (element, offset))| VertexAttribute {
                location: location as u32,
                kind: element.kind,
                components: element.count,
                normalized: element.normalized,
                stride: self.stride,
                offset,
            })
            .collect()
    }
}

/// Vertex array object owning its vertex and index buffers
pub struct VertexArray {
    device: Device,
    handle: VertexArrayHandle,
    vertices: VertexBuffer,
    indices: Option<IndexBuffer>,
    layout: VertexLayout,
    vertex_count: u32,
}

impl VertexArray {
    /// Record the layout of `vertices` (and the index binding) into a new VAO
    pub fn new(
        device: &Device,
        vertices: VertexBuffer,
        indices: Option<IndexBuffer>,
        layout: VertexLayout,
    ) -> EngineResult<Self> {
        let handle = device.create_vertex_array()?;
        device.bind_vertex_array(Some(handle));
        vertices.bind();
        for attribute in layout.attributes() {
            device.set_vertex_attribute(&attribute);
        }
        if let Some(indices) = &indices {
            indices.bind();
        }
        device.bind_vertex_array(None);

        let vertex_count = match layout.stride() {
            0 => 0,
            stride => (vertices.size() / stride as usize) as u32,
        };

        Ok(Self {
            device: device.clone(),
            handle,
            vertices,
            indices,
            layout,
            vertex_count,
        })
    }

    pub fn bind(&self) {
        self.device.bind_vertex_array(Some(self.handle));
    }

    pub fn unbind(&self) {
        self.device.bind_vertex_array(None);
    }

    /// Bind and issue one draw call over the whole array
    pub fn draw(&self) {
        self.bind();
        match &self.indices {
            Some(indices) => self
                .device
                .draw_elements(PrimitiveTopology::Triangles, indices.count()),
            None => self
                .device
                .draw_arrays(PrimitiveTopology::Triangles, 0, self.vertex_count),
        }
        self.unbind();
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    pub fn handle(&self) -> VertexArrayHandle {
        self.handle
    }

    pub fn vertex_buffer(&self) -> &VertexBuffer {
        &self.vertices
    }

    pub fn index_count(&self) -> Option<u32> {
        self.indices.as_ref().map(IndexBuffer::count)
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

impl Drop for VertexArray {
    fn drop(&mut self) {
        self.device.delete_vertex_array(self.handle);
    }
}
