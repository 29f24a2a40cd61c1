//! Compositor manager
//!
//! The manager is the entry point of the crate. It owns the render system,
//! the definition registries and the live workspaces, and drives the
//! per-frame update/present cycle.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use glam::Vec4;

use crate::backend::{
    ClearBuffers, ClearValue, FullscreenGeometry, GeometryHandle, RenderSystem,
    RenderTargetDesc, RenderTargetHandle, TextureFormat,
};
use crate::compositor::node::SharedGeometry;
use crate::compositor::node_def::NodeDefinition;
use crate::compositor::pass::PassDefinition;
use crate::compositor::shadow_node_def::ShadowNodeDefinition;
use crate::compositor::workspace::{Workspace, WorkspaceId, WorkspaceSetup};
use crate::compositor::workspace_def::WorkspaceDefinition;
use crate::error::{CompositorError, CompositorResult};
use crate::id::IdString;
use crate::scene::Scene;
use crate::CompositorConfig;

/// Registry of compositor definitions and owner of live workspaces
pub struct CompositorManager<R: RenderSystem> {
    render_system: R,
    config: CompositorConfig,
    node_definitions: HashMap<IdString, Rc<NodeDefinition>>,
    shadow_node_definitions: HashMap<IdString, Rc<ShadowNodeDefinition>>,
    unfinished_shadow_nodes: Vec<IdString>,
    workspace_definitions: HashMap<IdString, Rc<WorkspaceDefinition>>,
    workspaces: Vec<Workspace>,
    next_workspace_id: u64,
    frame_count: u64,
    null_textures: HashMap<TextureFormat, RenderTargetHandle>,
    geometry: SharedGeometry,
}

impl<R: RenderSystem> CompositorManager<R> {
    /// Create a manager and the shared fullscreen geometry
    pub fn new(mut render_system: R, config: CompositorConfig) -> CompositorResult<Self> {
        let label = &config.fullscreen_geometry_label;
        let triangle = render_system
            .create_fullscreen_geometry(FullscreenGeometry::Triangle, &format!("{label}Triangle"))?;
        let quad = match render_system
            .create_fullscreen_geometry(FullscreenGeometry::Quad, &format!("{label}Quad"))
        {
            Ok(quad) => quad,
            Err(err) => {
                render_system.destroy_fullscreen_geometry(triangle);
                return Err(err.into());
            }
        };
        log::info!(
            "Compositor manager created on the {} render system",
            render_system.name()
        );
        Ok(Self {
            render_system,
            config,
            node_definitions: HashMap::new(),
            shadow_node_definitions: HashMap::new(),
            unfinished_shadow_nodes: Vec::new(),
            workspace_definitions: HashMap::new(),
            workspaces: Vec::new(),
            next_workspace_id: 0,
            frame_count: 0,
            null_textures: HashMap::new(),
            geometry: SharedGeometry { triangle, quad },
        })
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn render_system(&self) -> &R {
        &self.render_system
    }

    pub fn render_system_mut(&mut self) -> &mut R {
        &mut self.render_system
    }

    // Node definitions

    pub fn add_node_definition(&mut self, name: &str) -> CompositorResult<&mut NodeDefinition> {
        let id = IdString::new(name);
        if self.node_definitions.contains_key(&id) {
            return Err(CompositorError::DuplicateName {
                kind: "node",
                name: name.to_string(),
            });
        }
        log::debug!("Added node definition '{}'", name);
        self.node_definitions
            .insert(id, Rc::new(NodeDefinition::new(name)));
        self.node_definition_mut(id)
    }

    pub fn node_definition(&self, name: impl Into<IdString>) -> CompositorResult<&NodeDefinition> {
        let name = name.into();
        self.node_definitions
            .get(&name)
            .map(Rc::as_ref)
            .ok_or_else(|| CompositorError::not_found("node definition", name))
    }

    /// Mutable access while no live node shares the definition
    pub fn node_definition_mut(
        &mut self,
        name: impl Into<IdString>,
    ) -> CompositorResult<&mut NodeDefinition> {
        let name = name.into();
        let definition = self
            .node_definitions
            .get_mut(&name)
            .ok_or_else(|| CompositorError::not_found("node definition", name))?;
        let label = definition.label().to_string();
        Rc::get_mut(definition).ok_or(CompositorError::DefinitionInUse {
            kind: "node",
            name: label,
        })
    }

    pub fn has_node_definition(&self, name: impl Into<IdString>) -> bool {
        self.node_definitions.contains_key(&name.into())
    }

    /// Every registered node definition, in no particular order
    pub fn node_definitions(&self) -> impl Iterator<Item = &NodeDefinition> {
        self.node_definitions.values().map(Rc::as_ref)
    }

    /// Drop every node definition; live workspaces keep theirs alive
    pub fn remove_all_node_definitions(&mut self) {
        self.node_definitions.clear();
    }

    // Shadow node definitions

    pub fn add_shadow_node_definition(
        &mut self,
        name: &str,
    ) -> CompositorResult<&mut ShadowNodeDefinition> {
        let id = IdString::new(name);
        if self.shadow_node_definitions.contains_key(&id) {
            return Err(CompositorError::DuplicateName {
                kind: "shadow node",
                name: name.to_string(),
            });
        }
        log::debug!("Added shadow node definition '{}'", name);
        self.shadow_node_definitions
            .insert(id, Rc::new(ShadowNodeDefinition::new(name)));
        self.unfinished_shadow_nodes.push(id);
        self.shadow_node_definition_mut(id)
    }

    pub fn shadow_node_definition(
        &self,
        name: impl Into<IdString>,
    ) -> CompositorResult<&ShadowNodeDefinition> {
        let name = name.into();
        self.shadow_node_definitions
            .get(&name)
            .map(Rc::as_ref)
            .ok_or_else(|| CompositorError::not_found("shadow node definition", name))
    }

    /// Mutable access while no live shadow node shares the definition.
    ///
    /// The definition goes back to the unfinished list and is validated
    /// again before its next use.
    pub fn shadow_node_definition_mut(
        &mut self,
        name: impl Into<IdString>,
    ) -> CompositorResult<&mut ShadowNodeDefinition> {
        let name = name.into();
        let definition = self
            .shadow_node_definitions
            .get_mut(&name)
            .ok_or_else(|| CompositorError::not_found("shadow node definition", name))?;
        let label = definition.label().to_string();
        let definition = Rc::get_mut(definition).ok_or(CompositorError::DefinitionInUse {
            kind: "shadow node",
            name: label,
        })?;
        if !self.unfinished_shadow_nodes.contains(&name) {
            self.unfinished_shadow_nodes.push(name);
        }
        Ok(definition)
    }

    pub fn has_shadow_node_definition(&self, name: impl Into<IdString>) -> bool {
        self.shadow_node_definitions.contains_key(&name.into())
    }

    pub fn shadow_node_definitions(&self) -> impl Iterator<Item = &ShadowNodeDefinition> {
        self.shadow_node_definitions.values().map(Rc::as_ref)
    }

    pub fn remove_all_shadow_node_definitions(&mut self) {
        self.shadow_node_definitions.clear();
        self.unfinished_shadow_nodes.clear();
    }

    /// Shadow node definitions that still need [`Self::finish_shadow_node_definitions`]
    pub fn unfinished_shadow_node_definitions(&self) -> &[IdString] {
        &self.unfinished_shadow_nodes
    }

    /// Validate and finish every unfinished shadow node definition.
    ///
    /// Stops at the first failure; that definition and the ones after it
    /// stay on the unfinished list.
    pub fn finish_shadow_node_definitions(&mut self) -> CompositorResult<()> {
        let pending = std::mem::take(&mut self.unfinished_shadow_nodes);
        for (position, name) in pending.iter().enumerate() {
            let Some(definition) = self.shadow_node_definitions.get_mut(name) else {
                continue;
            };
            let Some(definition) = Rc::get_mut(definition) else {
                continue;
            };
            if let Err(err) = definition.validate_and_finish() {
                self.unfinished_shadow_nodes = pending[position..].to_vec();
                return Err(err);
            }
        }
        Ok(())
    }

    // Workspace definitions

    pub fn add_workspace_definition(
        &mut self,
        name: &str,
    ) -> CompositorResult<&mut WorkspaceDefinition> {
        let id = IdString::new(name);
        if self.workspace_definitions.contains_key(&id) {
            return Err(CompositorError::DuplicateName {
                kind: "workspace",
                name: name.to_string(),
            });
        }
        log::debug!("Added workspace definition '{}'", name);
        self.workspace_definitions
            .insert(id, Rc::new(WorkspaceDefinition::new(name)));
        self.workspace_definition_mut(id)
    }

    pub fn workspace_definition(
        &self,
        name: impl Into<IdString>,
    ) -> CompositorResult<&WorkspaceDefinition> {
        let name = name.into();
        self.workspace_definitions
            .get(&name)
            .map(Rc::as_ref)
            .ok_or_else(|| CompositorError::not_found("workspace definition", name))
    }

    /// Mutable access while no live workspace shares the definition
    pub fn workspace_definition_mut(
        &mut self,
        name: impl Into<IdString>,
    ) -> CompositorResult<&mut WorkspaceDefinition> {
        let name = name.into();
        let definition = self
            .workspace_definitions
            .get_mut(&name)
            .ok_or_else(|| CompositorError::not_found("workspace definition", name))?;
        let label = definition.label().to_string();
        Rc::get_mut(definition).ok_or(CompositorError::DefinitionInUse {
            kind: "workspace",
            name: label,
        })
    }

    pub fn has_workspace_definition(&self, name: impl Into<IdString>) -> bool {
        self.workspace_definitions.contains_key(&name.into())
    }

    pub fn workspace_definitions(&self) -> impl Iterator<Item = &WorkspaceDefinition> {
        self.workspace_definitions.values().map(Rc::as_ref)
    }

    pub fn remove_all_workspace_definitions(&mut self) {
        self.workspace_definitions.clear();
    }

    /// Register a workspace with one node that clears the final target and
    /// renders the scene through the default camera.
    ///
    /// The node definition is named `<name>/Node`. Both names must be free.
    pub fn create_basic_workspace_def(
        &mut self,
        name: &str,
        background: Vec4,
        shadow_node: Option<IdString>,
    ) -> CompositorResult<()> {
        let node_name = format!("{name}/Node");
        if self.has_workspace_definition(name) {
            return Err(CompositorError::DuplicateName {
                kind: "workspace",
                name: name.to_string(),
            });
        }
        if self.has_node_definition(node_name.as_str()) {
            return Err(CompositorError::DuplicateName {
                kind: "node",
                name: node_name,
            });
        }

        let node = self.add_node_definition(&node_name)?;
        node.add_input_channel("final")?;
        let mut scene = PassDefinition::scene();
        if let Some(shadow_node) = shadow_node {
            scene = scene.with_shadow_node(shadow_node);
        }
        node.add_target("final")
            .add_pass(PassDefinition::clear(ClearValue {
                colour: background,
                ..Default::default()
            }))
            .add_pass(scene);

        let workspace = self.add_workspace_definition(name)?;
        workspace
            .connect_output(node_name.as_str(), 0)
            .set_shadow_node(shadow_node);
        Ok(())
    }

    // Shared resources

    /// Texture that always reads as "not in shadow", one per format.
    ///
    /// Created on first request and kept until the manager is dropped.
    pub fn null_shadow_texture(&mut self, format: TextureFormat) -> CompositorResult<RenderTargetHandle> {
        if let Some(&handle) = self.null_textures.get(&format) {
            return Ok(handle);
        }
        let size = self.config.null_shadow_texture_size.max(1);
        let desc = RenderTargetDesc::new(size, size, format)
            .with_label(format!("NullShadowTexture/{format:?}"));
        let handle = self.render_system.create_render_target(&desc)?;
        let buffers = if format.is_depth() {
            ClearBuffers::DEPTH
        } else {
            ClearBuffers::COLOUR
        };
        let cleared = self.render_system.bind_render_target(&[handle]).map(|_| {
            self.render_system.clear(
                buffers,
                &ClearValue {
                    colour: Vec4::ONE,
                    depth: 1.0,
                    stencil: 0,
                },
            )
        });
        if let Err(err) = cleared {
            self.render_system.destroy_render_target(handle);
            return Err(err.into());
        }
        log::debug!("Created null shadow texture {:?} for {:?}", handle, format);
        self.null_textures.insert(format, handle);
        Ok(handle)
    }

    pub fn shared_fullscreen_triangle(&self) -> GeometryHandle {
        self.geometry.triangle
    }

    pub fn shared_fullscreen_quad(&self) -> GeometryHandle {
        self.geometry.quad
    }

    // Workspaces

    /// Instantiate a workspace definition against `scene`, rendering into
    /// `final_target`.
    ///
    /// Unfinished shadow node definitions are finished first. A failed build
    /// leaves no render targets behind apart from shared null textures.
    pub fn add_workspace(
        &mut self,
        scene: &Rc<Scene>,
        final_target: RenderTargetHandle,
        default_camera: Option<IdString>,
        definition: impl Into<IdString>,
        enabled: bool,
    ) -> CompositorResult<WorkspaceId> {
        let name = definition.into();
        let definition = self
            .workspace_definitions
            .get(&name)
            .cloned()
            .ok_or_else(|| CompositorError::not_found("workspace definition", name))?;
        self.finish_shadow_node_definitions()?;

        for format in self.shadow_map_formats(&definition) {
            self.null_shadow_texture(format)?;
        }

        let id = WorkspaceId::from_raw(self.next_workspace_id);
        let mut workspace = Workspace::build(
            WorkspaceSetup {
                id,
                definition,
                node_definitions: &self.node_definitions,
                shadow_definitions: &self.shadow_node_definitions,
                null_textures: &self.null_textures,
                scene,
                final_target,
                default_camera,
                enabled,
            },
            &mut self.render_system,
        )?;

        if self.config.eager_validation {
            if let Err(err) = workspace.validate_all_nodes(&mut self.render_system, self.geometry) {
                workspace.destroy(&mut self.render_system);
                return Err(err);
            }
        }

        self.next_workspace_id += 1;
        log::debug!(
            "Added workspace {:?} '{}' (enabled: {})",
            id,
            workspace.definition().label(),
            enabled
        );
        self.workspaces.push(workspace);
        Ok(id)
    }

    /// Formats of every shadow map reachable from `definition`
    fn shadow_map_formats(&self, definition: &WorkspaceDefinition) -> Vec<TextureFormat> {
        let mut shadow_nodes: Vec<IdString> = definition
            .nodes()
            .iter()
            .filter_map(|name| self.node_definitions.get(name))
            .flat_map(|node| node.shadow_nodes())
            .collect();
        shadow_nodes.extend(definition.shadow_node());
        shadow_nodes.extend(definition.shadow_routes().iter().map(|route| route.shadow_node));

        let mut formats = Vec::new();
        for shadow in shadow_nodes
            .iter()
            .filter_map(|name| self.shadow_node_definitions.get(name))
        {
            for map in shadow.shadow_maps() {
                let format = shadow
                    .node()
                    .local_textures()
                    .iter()
                    .find(|texture| texture.name == map.texture)
                    .map(|texture| texture.format);
                if let Some(format) = format {
                    if !formats.contains(&format) {
                        formats.push(format);
                    }
                }
            }
        }
        formats
    }

    pub fn remove_workspace(&mut self, id: WorkspaceId) -> CompositorResult<()> {
        let position = self
            .workspaces
            .iter()
            .position(|w| w.id() == id)
            .ok_or_else(|| CompositorError::NotFound {
                kind: "workspace",
                name: format!("{id:?}"),
            })?;
        let mut workspace = self.workspaces.remove(position);
        workspace.destroy(&mut self.render_system);
        Ok(())
    }

    /// Destroy every workspace; the frame count is kept
    pub fn remove_all_workspaces(&mut self) {
        for mut workspace in self.workspaces.drain(..) {
            workspace.destroy(&mut self.render_system);
        }
    }

    pub fn workspace(&self, id: WorkspaceId) -> Option<&Workspace> {
        self.workspaces.iter().find(|w| w.id() == id)
    }

    pub fn workspace_mut(&mut self, id: WorkspaceId) -> Option<&mut Workspace> {
        self.workspaces.iter_mut().find(|w| w.id() == id)
    }

    /// Workspaces in insertion order
    pub fn workspaces(&self) -> impl Iterator<Item = &Workspace> {
        self.workspaces.iter()
    }

    pub fn workspace_count(&self) -> usize {
        self.workspaces.len()
    }

    // Frame driver

    /// Validate every node of every workspace that is not validated yet
    pub fn validate_all_nodes(&mut self) -> CompositorResult<()> {
        for workspace in &mut self.workspaces {
            workspace.validate_all_nodes(&mut self.render_system, self.geometry)?;
        }
        Ok(())
    }

    /// Advance the frame counter and render every enabled workspace
    pub fn update(&mut self) -> CompositorResult<()> {
        self.frame_count += 1;
        for workspace in &mut self.workspaces {
            workspace.update(&mut self.render_system, self.geometry, self.frame_count)?;
        }
        Ok(())
    }

    /// Present the final target of every enabled workspace, each target once
    pub fn swap_all_final_targets(&mut self) -> CompositorResult<()> {
        let mut presented = HashSet::new();
        for workspace in self.workspaces.iter().filter(|w| w.is_enabled()) {
            if presented.insert(workspace.final_target()) {
                self.render_system.swap_buffers(workspace.final_target())?;
            }
        }
        Ok(())
    }

    /// Number of completed [`Self::update`] calls
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl<R: RenderSystem> Drop for CompositorManager<R> {
    fn drop(&mut self) {
        self.remove_all_workspaces();
        for (_, handle) in self.null_textures.drain() {
            self.render_system.destroy_render_target(handle);
        }
        self.render_system
            .destroy_fullscreen_geometry(self.geometry.triangle);
        self.render_system.destroy_fullscreen_geometry(self.geometry.quad);
        log::debug!("Compositor manager destroyed");
    }
}
