//! Scene management
//!
//! Models live in a slotmap arena and are referenced from render-type
//! buckets by key. A model is in at most one bucket at a time.

pub mod camera;
pub mod light;
pub mod model;
pub mod transform;

pub use camera::*;
pub use light::*;
pub use model::*;
pub use transform::*;

use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle to a model registered with a [`Scene`]
    pub struct ModelKey;
}

/// Which passes draw a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderType {
    /// Opaque geometry: shadows, forward or deferred lighting
    Basic,
    /// Weighted-blended transparency
    Transparent,
}

/// Registered models, their buckets and the light sets
#[derive(Default)]
pub struct Scene {
    models: SlotMap<ModelKey, Model>,
    buckets: HashMap<RenderType, Vec<ModelKey>>,
    lights: HashMap<RenderType, Lights>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model in a bucket
    pub fn add_model(&mut self, model: Model, render_type: RenderType) -> ModelKey {
        let key = self.models.insert(model);
        self.buckets.entry(render_type).or_default().push(key);
        key
    }

    /// Move a model to another bucket; returns `false` for unknown keys
    pub fn set_render_type(&mut self, key: ModelKey, render_type: RenderType) -> bool {
        if !self.models.contains_key(key) {
            return false;
        }
        self.detach(key);
        self.buckets.entry(render_type).or_default().push(key);
        true
    }

    pub fn remove_model(&mut self, key: ModelKey) -> Option<Model> {
        self.detach(key);
        self.models.remove(key)
    }

    fn detach(&mut self, key: ModelKey) {
        for keys in self.buckets.values_mut() {
            keys.retain(|k| *k != key);
        }
    }

    pub fn model(&self, key: ModelKey) -> Option<&Model> {
        self.models.get(key)
    }

    pub fn model_mut(&mut self, key: ModelKey) -> Option<&mut Model> {
        self.models.get_mut(key)
    }

    /// Bucket the model is currently in
    pub fn render_type(&self, key: ModelKey) -> Option<RenderType> {
        self.buckets
            .iter()
            .find(|(_, keys)| keys.contains(&key))
            .map(|(render_type, _)| *render_type)
    }

    /// Models of a bucket in registration order
    pub fn models(&self, render_type: RenderType) -> Vec<&Model> {
        self.buckets
            .get(&render_type)
            .map(|keys| keys.iter().filter_map(|k| self.models.get(*k)).collect())
            .unwrap_or_default()
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Install the light set of a render type, replacing any previous one
    pub fn set_lights(&mut self, lights: Lights, render_type: RenderType) -> Option<Lights> {
        self.lights.insert(render_type, lights)
    }

    pub fn lights(&self, render_type: RenderType) -> Option<&Lights> {
        self.lights.get(&render_type)
    }

    pub fn lights_mut(&mut self, render_type: RenderType) -> Option<&mut Lights> {
        self.lights.get_mut(&render_type)
    }

    /// Every light set with its render type
    pub fn light_sets(&self) -> impl Iterator<Item = (RenderType, &Lights)> {
        self.lights.iter().map(|(render_type, lights)| (*render_type, lights))
    }

    pub fn light_sets_mut(&mut self) -> impl Iterator<Item = &mut Lights> {
        self.lights.values_mut()
    }

    pub fn has_lights(&self) -> bool {
        self.lights.values().any(|lights| !lights.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Device, HeadlessBackend};
    use crate::resources::MeshData;
    use std::rc::Rc;

    fn cube(device: &Device) -> Model {
        Model::from_mesh(device, &MeshData::cube(), None).unwrap()
    }

    #[test]
    fn test_model_is_in_one_bucket() {
        let backend = Rc::new(HeadlessBackend::new(64, 64));
        let device: Device = backend.clone();
        let mut scene = Scene::new();

        let a = scene.add_model(cube(&device), RenderType::Basic);
        let b = scene.add_model(cube(&device), RenderType::Basic);
        assert_eq!(scene.models(RenderType::Basic).len(), 2);

        assert!(scene.set_render_type(a, RenderType::Transparent));
        assert!(scene.set_render_type(a, RenderType::Transparent));
        assert_eq!(scene.models(RenderType::Basic).len(), 1);
        assert_eq!(scene.models(RenderType::Transparent).len(), 1);
        assert_eq!(scene.render_type(a), Some(RenderType::Transparent));
        assert_eq!(scene.render_type(b), Some(RenderType::Basic));
    }

    #[test]
    fn test_remove_releases_gpu_resources() {
        let backend = Rc::new(HeadlessBackend::new(64, 64));
        let device: Device = backend.clone();
        let mut scene = Scene::new();

        let key = scene.add_model(cube(&device), RenderType::Basic);
        assert!(scene.remove_model(key).is_some());
        assert!(scene.models(RenderType::Basic).is_empty());
        assert!(!scene.set_render_type(key, RenderType::Basic));
        assert_eq!(backend.live_vertex_arrays(), 0);
    }
}
