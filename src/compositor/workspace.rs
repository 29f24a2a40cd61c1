//! Live workspaces
//!
//! A workspace instantiates a workspace definition against a scene and a
//! final render target. Nodes are kept in an arena indexed like the
//! definition's node list and executed in a cached topological order.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::backend::{RenderSystem, RenderTargetHandle, RenderTargetInfo, TextureFormat};
use crate::compositor::binder::{ResourceBinder, TexturePool};
use crate::compositor::node::{NodeInstance, PassContext, SharedGeometry, ValidationState};
use crate::compositor::node_def::NodeDefinition;
use crate::compositor::shadow_node::{ShadowNodeInstance, ShadowNodeSet};
use crate::compositor::shadow_node_def::ShadowNodeDefinition;
use crate::compositor::texture::TextureName;
use crate::compositor::workspace_def::WorkspaceDefinition;
use crate::error::{CompositorError, CompositorResult};
use crate::id::IdString;
use crate::scene::Scene;

/// Identifier handed out by the manager for each workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkspaceId(u64);

impl WorkspaceId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Coarse state of a workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceState {
    /// Skipped by updates and presentation
    Disabled,
    /// Runs on update; some nodes still need validation
    Enabled,
    /// Runs on update; every node is validated
    Validated,
}

/// Inputs for [`Workspace::build`]
pub(crate) struct WorkspaceSetup<'a> {
    pub id: WorkspaceId,
    pub definition: Rc<WorkspaceDefinition>,
    pub node_definitions: &'a HashMap<IdString, Rc<NodeDefinition>>,
    pub shadow_definitions: &'a HashMap<IdString, Rc<ShadowNodeDefinition>>,
    pub null_textures: &'a HashMap<TextureFormat, RenderTargetHandle>,
    pub scene: &'a Rc<Scene>,
    pub final_target: RenderTargetHandle,
    pub default_camera: Option<IdString>,
    pub enabled: bool,
}

/// A workspace definition instantiated against a scene and final target
#[derive(Debug)]
pub struct Workspace {
    id: WorkspaceId,
    definition: Rc<WorkspaceDefinition>,
    scene: Weak<Scene>,
    default_camera: Option<IdString>,
    final_target: RenderTargetHandle,
    globals: TexturePool,
    nodes: Vec<NodeInstance>,
    node_index: HashMap<IdString, usize>,
    execution_order: Vec<usize>,
    shadow_nodes: ShadowNodeSet,
    enabled: bool,
    frames_rendered: u64,
    last_frame: Option<u64>,
}

impl Workspace {
    /// Instantiate a workspace definition.
    ///
    /// Connections and the graph are checked before anything is allocated.
    /// If a later step fails, every render target created so far is
    /// destroyed again.
    pub(crate) fn build<R: RenderSystem>(
        setup: WorkspaceSetup<'_>,
        rs: &mut R,
    ) -> CompositorResult<Self> {
        let definition = Rc::clone(&setup.definition);
        let binder = ResourceBinder::new(&definition, |name| {
            setup.node_definitions.get(&name).cloned()
        })?;
        let execution_order = binder.execution_order()?;
        let shadow_definitions = Self::shadow_definitions(&binder, &definition, setup.shadow_definitions)?;
        let final_info = rs.target_info(setup.final_target)?;

        let mut workspace = Self {
            id: setup.id,
            definition: setup.definition,
            scene: Rc::downgrade(setup.scene),
            default_camera: setup.default_camera,
            final_target: setup.final_target,
            globals: TexturePool::new(),
            nodes: Vec::with_capacity(binder.node_definitions().len()),
            node_index: HashMap::new(),
            execution_order,
            shadow_nodes: ShadowNodeSet::default(),
            enabled: setup.enabled,
            frames_rendered: 0,
            last_frame: None,
        };

        if let Err(err) = workspace.populate(
            &binder,
            shadow_definitions,
            setup.null_textures,
            &final_info,
            rs,
        ) {
            log::warn!(
                "Workspace '{}' failed to build: {}",
                definition.label(),
                err
            );
            workspace.destroy(rs);
            return Err(err);
        }

        log::info!(
            "Workspace '{}' built: {} nodes, {} shadow nodes, {} global textures",
            definition.label(),
            workspace.nodes.len(),
            workspace.shadow_nodes.len(),
            workspace.globals.len()
        );
        Ok(workspace)
    }

    /// Shadow node definitions referenced by the workspace, checked to exist
    /// and to have the output channels its shadow routes read
    fn shadow_definitions(
        binder: &ResourceBinder<'_>,
        definition: &WorkspaceDefinition,
        registry: &HashMap<IdString, Rc<ShadowNodeDefinition>>,
    ) -> CompositorResult<Vec<Rc<ShadowNodeDefinition>>> {
        let mut names: Vec<IdString> = Vec::new();
        let referenced = binder
            .node_definitions()
            .iter()
            .flat_map(|node| node.shadow_nodes())
            .chain(definition.shadow_node())
            .chain(definition.shadow_routes().iter().map(|route| route.shadow_node));
        for name in referenced {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        names
            .into_iter()
            .map(|name| {
                let shadow = registry
                    .get(&name)
                    .ok_or_else(|| CompositorError::not_found("shadow node definition", name))?;
                if !shadow.is_finished() {
                    return Err(CompositorError::IncompleteDefinition {
                        name: shadow.label().to_string(),
                        reason: "not finished".to_string(),
                    });
                }
                let outputs = shadow.node().num_outputs();
                let missing = definition
                    .shadow_routes()
                    .iter()
                    .find(|r| r.shadow_node == name && r.out_channel >= outputs);
                if let Some(route) = missing {
                    return Err(CompositorError::validation(
                        definition.label(),
                        format!(
                            "shadow node '{}' has no output channel {}",
                            shadow.label(),
                            route.out_channel
                        ),
                    ));
                }
                Ok(Rc::clone(shadow))
            })
            .collect()
    }

    fn populate<R: RenderSystem>(
        &mut self,
        binder: &ResourceBinder<'_>,
        shadow_definitions: Vec<Rc<ShadowNodeDefinition>>,
        null_textures: &HashMap<TextureFormat, RenderTargetHandle>,
        final_info: &RenderTargetInfo,
        rs: &mut R,
    ) -> CompositorResult<()> {
        self.globals
            .create(self.definition.global_textures(), final_info, rs)?;

        for (index, definition) in binder.node_definitions().iter().enumerate() {
            self.node_index.insert(definition.name(), index);
            self.nodes
                .push(NodeInstance::new(Rc::clone(definition), final_info, rs)?);
        }

        for definition in shadow_definitions {
            self.shadow_nodes.push(ShadowNodeInstance::new(
                definition,
                final_info,
                null_textures,
                rs,
            )?);
        }

        binder.bind_output(&mut self.nodes, self.final_target)?;
        for &node in &self.execution_order {
            binder.bind_inputs(node, &mut self.nodes, &self.shadow_nodes)?;
        }
        Ok(())
    }

    pub fn id(&self) -> WorkspaceId {
        self.id
    }

    pub fn definition(&self) -> &Rc<WorkspaceDefinition> {
        &self.definition
    }

    pub fn final_target(&self) -> RenderTargetHandle {
        self.final_target
    }

    /// The scene, if it is still alive
    pub fn scene(&self) -> Option<Rc<Scene>> {
        self.scene.upgrade()
    }

    pub fn default_camera(&self) -> Option<IdString> {
        self.default_camera
    }

    pub fn set_default_camera(&mut self, camera: Option<IdString>) {
        self.default_camera = camera;
        self.invalidate();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn state(&self) -> WorkspaceState {
        if !self.enabled {
            WorkspaceState::Disabled
        } else if self.is_validated() {
            WorkspaceState::Validated
        } else {
            WorkspaceState::Enabled
        }
    }

    /// Whether every node and shadow node passed validation
    pub fn is_validated(&self) -> bool {
        self.nodes
            .iter()
            .all(|n| n.state() == ValidationState::Validated)
            && self
                .shadow_nodes
                .iter()
                .all(|n| n.state() == ValidationState::Validated)
    }

    /// Node indices in execution order
    pub fn execution_order(&self) -> &[usize] {
        &self.execution_order
    }

    /// Node names in execution order
    pub fn execution_order_names(&self) -> Vec<IdString> {
        self.execution_order
            .iter()
            .map(|&index| self.nodes[index].name())
            .collect()
    }

    pub fn nodes(&self) -> &[NodeInstance] {
        &self.nodes
    }

    pub fn node(&self, name: impl Into<IdString>) -> Option<&NodeInstance> {
        let index = *self.node_index.get(&name.into())?;
        self.nodes.get(index)
    }

    pub fn shadow_nodes(&self) -> &ShadowNodeSet {
        &self.shadow_nodes
    }

    pub fn shadow_node(&self, name: impl Into<IdString>) -> Option<&ShadowNodeInstance> {
        self.shadow_nodes.get(name.into())
    }

    pub fn global_texture(&self, name: &str) -> Option<RenderTargetHandle> {
        let name = TextureName::new(name);
        if !name.global {
            return None;
        }
        self.globals.get(name.id)
    }

    /// Frames this workspace rendered
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Manager frame count of the last update that rendered this workspace
    pub fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }

    fn invalidate(&mut self) {
        for node in &mut self.nodes {
            node.invalidate();
        }
        for node in self.shadow_nodes.iter_mut() {
            node.invalidate();
        }
    }

    /// Validate every node that is not validated yet, in execution order
    pub(crate) fn validate_all_nodes<R: RenderSystem>(
        &mut self,
        rs: &mut R,
        geometry: SharedGeometry,
    ) -> CompositorResult<()> {
        let scene = self.scene.upgrade().ok_or_else(|| CompositorError::SceneDropped {
            workspace: self.definition.label().to_string(),
        })?;
        let ctx = PassContext {
            globals: &self.globals,
            scene: &scene,
            default_camera: self.default_camera,
            frame: self.frames_rendered,
            manager_frame: self.last_frame.unwrap_or(0),
            geometry,
        };

        for node in self.shadow_nodes.iter_mut() {
            if node.state() != ValidationState::Validated {
                node.validate_and_finish(rs, &ctx)?;
            }
        }
        for &index in &self.execution_order {
            let node = &mut self.nodes[index];
            if node.state() != ValidationState::Validated {
                node.validate_and_finish(rs, &ctx, &self.shadow_nodes)?;
            }
        }
        Ok(())
    }

    /// Render one frame if enabled, validating lazily first
    pub(crate) fn update<R: RenderSystem>(
        &mut self,
        rs: &mut R,
        geometry: SharedGeometry,
        frame: u64,
    ) -> CompositorResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if !self.is_validated() {
            self.validate_all_nodes(rs, geometry)?;
        }

        let scene = self.scene.upgrade().ok_or_else(|| CompositorError::SceneDropped {
            workspace: self.definition.label().to_string(),
        })?;
        let ctx = PassContext {
            globals: &self.globals,
            scene: &scene,
            default_camera: self.default_camera,
            frame: self.frames_rendered,
            manager_frame: frame,
            geometry,
        };
        log::trace!(
            "Workspace '{}': frame {} ({} nodes)",
            self.definition.label(),
            frame,
            self.execution_order.len()
        );
        for &index in &self.execution_order {
            self.nodes[index].execute(rs, &ctx, &mut self.shadow_nodes)?;
        }
        self.frames_rendered += 1;
        self.last_frame = Some(frame);
        Ok(())
    }

    /// Release every render target the workspace created.
    ///
    /// The final target is owned by the caller and left alone.
    pub(crate) fn destroy<R: RenderSystem>(&mut self, rs: &mut R) {
        for node in &mut self.nodes {
            node.destroy(rs);
        }
        self.nodes.clear();
        self.node_index.clear();
        self.shadow_nodes.destroy(rs);
        self.globals.destroy(rs);
        log::debug!("Workspace '{}' destroyed", self.definition.label());
    }
}
