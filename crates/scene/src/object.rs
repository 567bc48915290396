//! Scene object arena.
//!
//! Objects live in a slot map owned by the [`Scene`]; an [`ObjectId`] is an
//! arena key, so id issuance, reuse, and invalidation on removal are all
//! explicit; there is no global counter anywhere.

use glam::Vec3;
use slotmap::{SlotMap, new_key_type};

use crate::transform::Transform;

new_key_type! {
    /// Handle to a scene object; invalidated when the object is removed.
    pub struct ObjectId;
}

/// One renderable object: a mesh reference, a flat color, and a transform.
#[derive(Clone, Copy, Debug)]
pub struct SceneObject {
    /// Index into the renderer's mesh list.
    pub mesh: usize,
    /// Flat object color, multiplied with vertex color in the shader.
    pub color: Vec3,
    /// Object transform.
    pub transform: Transform,
}

impl SceneObject {
    /// Creates an object using mesh slot `mesh` with default transform and
    /// white color.
    pub fn new(mesh: usize) -> Self {
        Self {
            mesh,
            color: Vec3::ONE,
            transform: Transform::default(),
        }
    }
}

/// Collection of scene objects.
#[derive(Default)]
pub struct Scene {
    objects: SlotMap<ObjectId, SceneObject>,
}

impl Scene {
    /// Creates an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object, returning its id.
    pub fn insert(&mut self, object: SceneObject) -> ObjectId {
        self.objects.insert(object)
    }

    /// Removes an object; returns it if the id was still valid.
    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject> {
        self.objects.remove(id)
    }

    /// Looks up an object.
    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(id)
    }

    /// Looks up an object mutably.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(id)
    }

    /// Iterates over all objects.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &SceneObject)> {
        self.objects.iter()
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the scene is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut scene = Scene::new();
        let id = scene.insert(SceneObject::new(0));
        assert_eq!(scene.len(), 1);
        assert_eq!(scene.get(id).unwrap().mesh, 0);
    }

    #[test]
    fn removed_id_is_invalid() {
        let mut scene = Scene::new();
        let id = scene.insert(SceneObject::new(0));
        assert!(scene.remove(id).is_some());
        assert!(scene.get(id).is_none());
        assert!(scene.remove(id).is_none());
    }

    #[test]
    fn slot_reuse_issues_fresh_ids() {
        let mut scene = Scene::new();
        let first = scene.insert(SceneObject::new(0));
        scene.remove(first);

        // The slot may be reused, but the stale id must not resolve
        let second = scene.insert(SceneObject::new(1));
        assert_ne!(first, second);
        assert!(scene.get(first).is_none());
        assert_eq!(scene.get(second).unwrap().mesh, 1);
    }

    #[test]
    fn iteration_covers_all_objects() {
        let mut scene = Scene::new();
        scene.insert(SceneObject::new(0));
        scene.insert(SceneObject::new(1));
        scene.insert(SceneObject::new(2));
        assert_eq!(scene.iter().count(), 3);
    }
}
