//! Shader programs loaded from `#shader` section files.
//!
//! A shader file holds every stage of one program. Lines following a
//! `#shader vertex`, `#shader fragment` or `#shader geometry` marker belong
//! to that stage until the next marker:
//!
//! ```text
//! #shader vertex
//! #version 430 core
//! void main() { ... }
//!
//! #shader fragment
//! #version 430 core
//! void main() { ... }
//! ```
//!
//! Compilation failures never abort the caller. They are logged with the
//! driver's info log and the shader becomes an invalid program whose binds
//! and uniform writes are ignored.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use glam::{Mat4, Vec2, Vec3};

use crate::backend::{
    Device, ProgramHandle, ShaderSources, ShaderStage, UniformLocation, UniformValue,
};

/// Split a shader file into its stages
pub fn parse_shader_source(source: &str) -> ShaderSources {
    let mut sources = ShaderSources::default();
    let mut geometry = String::new();
    let mut current: Option<ShaderStage> = None;

    for line in source.lines() {
        if let Some(marker) = line.trim_start().strip_prefix("#shader") {
            current = match marker.trim() {
                "vertex" => Some(ShaderStage::Vertex),
                "fragment" => Some(ShaderStage::Fragment),
                "geometry" => Some(ShaderStage::Geometry),
                other => {
                    log::warn!("unknown shader stage marker {:?}", other);
                    None
                }
            };
            continue;
        }

        let target = match current {
            Some(ShaderStage::Vertex) => &mut sources.vertex,
            Some(ShaderStage::Fragment) => &mut sources.fragment,
            Some(ShaderStage::Geometry) => &mut geometry,
            None => continue,
        };
        target.push_str(line);
        target.push('\n');
    }

    if !geometry.is_empty() {
        sources.geometry = Some(geometry);
    }
    sources
}

/// A linked program plus its uniform location cache
pub struct Shader {
    device: Device,
    name: String,
    program: Option<ProgramHandle>,
    locations: RefCell<HashMap<String, Option<UniformLocation>>>,
}

impl Shader {
    /// Load and compile a shader file
    pub fn from_file(device: &Device, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path.display().to_string();
        match std::fs::read_to_string(path) {
            Ok(source) => Self::from_source(device, &name, &source),
            Err(err) => {
                log::error!("failed to read shader {}: {}", name, err);
                Self::invalid(device, name)
            }
        }
    }

    /// Compile a shader from in-memory `#shader` text
    pub fn from_source(device: &Device, name: &str, source: &str) -> Self {
        let sources = parse_shader_source(source);
        Self::from_sources(device, name, &sources)
    }

    /// Compile already separated stages
    pub fn from_sources(device: &Device, name: &str, sources: &ShaderSources) -> Self {
        match device.create_program(sources) {
            Ok(program) => {
                log::debug!("shader {:?} linked", name);
                Self {
                    device: device.clone(),
                    name: name.to_string(),
                    program: Some(program),
                    locations: RefCell::new(HashMap::new()),
                }
            }
            Err(err) => {
                log::error!("shader {:?}: {}", name, err);
                Self::invalid(device, name.to_string())
            }
        }
    }

    fn invalid(device: &Device, name: String) -> Self {
        Self {
            device: device.clone(),
            name,
            program: None,
            locations: RefCell::new(HashMap::new()),
        }
    }

    /// Whether the program compiled and linked
    pub fn is_valid(&self) -> bool {
        self.program.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> Option<ProgramHandle> {
        self.program
    }

    pub fn bind(&self) {
        self.device.use_program(self.program);
    }

    pub fn unbind(&self) {
        self.device.use_program(None);
    }

    fn location(&self, name: &str) -> Option<UniformLocation> {
        let program = self.program?;
        if let Some(location) = self.locations.borrow().get(name) {
            return *location;
        }
        let location = self.device.uniform_location(program, name);
        if location.is_none() {
            log::warn!("uniform {:?} does not exist in shader {:?}", name, self.name);
        }
        self.locations.borrow_mut().insert(name.to_string(), location);
        location
    }

    /// Assign a uniform of this program. The program must be bound.
    pub fn set_uniform(&self, name: &str, value: UniformValue) {
        if let Some(location) = self.location(name) {
            self.device.set_uniform(location, &value);
        }
    }

    pub fn set_int(&self, name: &str, value: i32) {
        self.set_uniform(name, UniformValue::Int(value));
    }

    pub fn set_float(&self, name: &str, value: f32) {
        self.set_uniform(name, UniformValue::Float(value));
    }

    pub fn set_vec2(&self, name: &str, value: Vec2) {
        self.set_uniform(name, UniformValue::Vec2(value));
    }

    pub fn set_vec3(&self, name: &str, value: Vec3) {
        self.set_uniform(name, UniformValue::Vec3(value));
    }

    pub fn set_mat4(&self, name: &str, value: Mat4) {
        self.set_uniform(name, UniformValue::Mat4(value));
    }

    pub fn set_int_array(&self, name: &str, values: &[i32]) {
        self.set_uniform(name, UniformValue::IntArray(values.to_vec()));
    }

    pub fn set_vec3_array(&self, name: &str, values: &[Vec3]) {
        self.set_uniform(name, UniformValue::Vec3Array(values.to_vec()));
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        if let Some(program) = self.program.take() {
            self.device.delete_program(program);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use std::rc::Rc;

    const SOURCE: &str = "\
// leading comment is dropped
#shader vertex
#version 430 core
void main() {}
#shader fragment
#version 430 core
out vec4 color;
void main() {}
";

    #[test]
    fn test_parse_splits_stages() {
        let sources = parse_shader_source(SOURCE);
        assert_eq!(sources.vertex, "#version 430 core\nvoid main() {}\n");
        assert!(sources.fragment.contains("out vec4 color;"));
        assert!(!sources.vertex.contains("leading comment"));
        assert_eq!(sources.geometry, None);
    }

    #[test]
    fn test_parse_geometry_and_unknown_markers() {
        let sources = parse_shader_source(
            "#shader vertex\nv\n#shader tessellation\nskipped\n#shader geometry\ng\n#shader fragment\nf\n",
        );
        assert_eq!(sources.vertex, "v\n");
        assert_eq!(sources.geometry.as_deref(), Some("g\n"));
        assert_eq!(sources.fragment, "f\n");
    }

    #[test]
    fn test_uniforms_go_to_bound_program() {
        let backend = Rc::new(HeadlessBackend::new(64, 64));
        let device: Device = backend.clone();
        let shader = Shader::from_source(&device, "test", SOURCE);
        assert!(shader.is_valid());

        shader.bind();
        shader.set_float("ssaoStrength", 2.5);
        shader.set_int_array("shadowMaps", &[16, 17]);
        let program = shader.handle().unwrap();
        assert_eq!(
            backend.uniform(program, "ssaoStrength"),
            Some(UniformValue::Float(2.5))
        );
        assert_eq!(
            backend.uniform(program, "shadowMaps"),
            Some(UniformValue::IntArray(vec![16, 17]))
        );
    }

    #[test]
    fn test_failed_compile_is_an_inert_shader() {
        let backend = Rc::new(HeadlessBackend::new(64, 64));
        let device: Device = backend.clone();
        backend.set_fail_compilation(true);

        let shader = Shader::from_source(&device, "broken", SOURCE);
        assert!(!shader.is_valid());
        shader.bind();
        shader.set_int("debugMode", 1);
        assert_eq!(backend.current_program(), None);

        let missing = Shader::from_file(&device, "does/not/exist.shader");
        assert!(!missing.is_valid());
    }

    #[test]
    fn test_drop_deletes_program() {
        let backend = Rc::new(HeadlessBackend::new(64, 64));
        let device: Device = backend.clone();
        {
            let _shader = Shader::from_source(&device, "test", SOURCE);
            assert_eq!(backend.live_programs(), 1);
        }
        assert_eq!(backend.live_programs(), 0);
    }
}
