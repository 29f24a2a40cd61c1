//! Render-graph compositor
//!
//! Definitions are immutable templates registered with the
//! [`CompositorManager`]:
//! - [`NodeDefinition`]: input/output channels, local textures and targets
//!   holding ordered passes
//! - [`ShadowNodeDefinition`]: a node without inputs that renders shadow maps
//!   for the scene passes naming it
//! - [`WorkspaceDefinition`]: connections between node channels (including
//!   shadow node outputs), the final output route and `global_` textures
//!
//! Instances ([`Workspace`], [`NodeInstance`], [`ShadowNodeInstance`]) bind
//! definitions to render targets and are executed once per frame by
//! [`CompositorManager::update`].
//!
//! # Example
//!
//! ```ignore
//! let mut manager = CompositorManager::new(DummyRenderSystem::new(), CompositorConfig::default())?;
//! manager.create_basic_workspace_def("main", Vec4::new(0.2, 0.4, 0.6, 1.0), None)?;
//! let workspace = manager.add_workspace(&scene, window_target, Some(camera), "main", true)?;
//!
//! loop {
//!     manager.update()?;
//!     manager.swap_all_final_targets()?;
//! }
//! ```

mod binder;
mod manager;
mod node;
mod node_def;
mod pass;
mod shadow_node;
mod shadow_node_def;
mod texture;
mod workspace;
mod workspace_def;

pub use binder::{topological_order, GraphOrderError, ResourceBinder, TexturePool};
pub use manager::CompositorManager;
pub use node::{NodeInstance, SharedGeometry, ValidationState};
pub use node_def::{NodeDefinition, TextureSource};
pub use pass::{PassDefinition, PassKind, PassType, TargetDefinition};
pub use shadow_node::{ShadowNodeInstance, ShadowNodeSet};
pub use shadow_node_def::{ShadowMapDefinition, ShadowNodeDefinition};
pub use texture::{is_global_name, TextureDefinition, TextureName, TextureSize, GLOBAL_PREFIX};
pub use workspace::{Workspace, WorkspaceId, WorkspaceState};
pub use workspace_def::{ChannelRoute, OutputRoute, ShadowRoute, WorkspaceDefinition};
