//! Scene collaborator
//!
//! The compositor does not manage scene content. A workspace only needs to
//! know the scene's identity, its cameras and how many lights cast shadows.
//! Scenes are shared as `Rc<Scene>` and workspaces keep a weak reference, so
//! camera state lives behind a `RefCell` and can change between frames.

mod camera;

pub use camera::*;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::id::IdString;

/// The scene a workspace renders
#[derive(Debug)]
pub struct Scene {
    name: String,
    id: IdString,
    cameras: RefCell<HashMap<IdString, Camera>>,
    shadow_casting_lights: Cell<usize>,
}

impl Scene {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: IdString::new(name),
            cameras: RefCell::new(HashMap::new()),
            shadow_casting_lights: Cell::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> IdString {
        self.id
    }

    /// Add or replace a camera
    pub fn set_camera(&self, camera: Camera) {
        self.cameras.borrow_mut().insert(camera.name, camera);
    }

    pub fn remove_camera(&self, name: IdString) -> Option<Camera> {
        self.cameras.borrow_mut().remove(&name)
    }

    /// Snapshot of a camera
    pub fn camera(&self, name: IdString) -> Option<Camera> {
        self.cameras.borrow().get(&name).cloned()
    }

    pub fn has_camera(&self, name: IdString) -> bool {
        self.cameras.borrow().contains_key(&name)
    }

    /// Number of lights that currently cast shadows
    pub fn shadow_casting_lights(&self) -> usize {
        self.shadow_casting_lights.get()
    }

    pub fn set_shadow_casting_lights(&self, count: usize) {
        self.shadow_casting_lights.set(count);
    }
}
