//! GPU resource wrappers
//!
//! Each wrapper owns its backend handles and releases them on drop.

pub mod buffer;
pub mod framebuffer;
pub mod ibl;
pub mod layout;
pub mod mesh;
pub mod shader;
pub mod texture;

pub use buffer::*;
pub use framebuffer::*;
pub use ibl::*;
pub use layout::*;
pub use mesh::*;
pub use shader::*;
pub use texture::*;
