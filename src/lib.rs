//! RedLilium Compositor - A render-graph compositor for real-time renderers
//!
//! The compositor turns declarative definitions (nodes, shadow nodes and
//! workspaces) into live render pipelines that run once per frame against
//! render targets owned by a [`RenderSystem`](backend::RenderSystem).
//!
//! # Features
//! - Node graph with typed input/output channels and topological execution
//! - Workspace-global textures shared between nodes (`global_` prefix)
//! - Shadow nodes executed on demand by scene passes, once per frame and camera
//! - Lazy validation of attachments, cameras and resolves
//! - Headless `dummy` render system that records every command
//!
//! # Example
//!
//! ```ignore
//! use redlilium_compositor::*;
//!
//! let mut rs = DummyRenderSystem::new();
//! let window = rs.create_render_target(&RenderTargetDesc::new(1280, 720, TextureFormat::Bgra8Unorm))?;
//! let mut manager = CompositorManager::new(rs, CompositorConfig::default())?;
//! manager.create_basic_workspace_def("main", glam::Vec4::ZERO, None)?;
//! manager.add_workspace(&scene, window, Some(IdString::new("main_camera")), "main", true)?;
//! manager.update()?;
//! manager.swap_all_final_targets()?;
//! ```

pub mod backend;
pub mod compositor;
pub mod error;
pub mod id;
pub mod scene;

pub use backend::*;
pub use compositor::*;
pub use error::{CompositorError, CompositorResult};
pub use id::IdString;
pub use scene::{Camera, Projection, Scene};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration for a [`CompositorManager`]
#[derive(Debug, Clone)]
pub struct CompositorConfig {
    /// Width and height of null shadow textures
    pub null_shadow_texture_size: u32,
    /// Validate nodes in `add_workspace` instead of on the first update
    pub eager_validation: bool,
    /// Label prefix of the shared fullscreen geometry
    pub fullscreen_geometry_label: String,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            null_shadow_texture_size: 1,
            eager_validation: false,
            fullscreen_geometry_label: "Compositor/Fullscreen".to_string(),
        }
    }
}

impl CompositorConfig {
    pub fn with_null_shadow_texture_size(mut self, size: u32) -> Self {
        self.null_shadow_texture_size = size;
        self
    }

    pub fn with_eager_validation(mut self, eager: bool) -> Self {
        self.eager_validation = eager;
        self
    }

    pub fn with_fullscreen_geometry_label(mut self, label: impl Into<String>) -> Self {
        self.fullscreen_geometry_label = label.into();
        self
    }
}
