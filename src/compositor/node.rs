//! Live compositor nodes
//!
//! A [`NodeInstance`] is a node definition bound to real render targets: the
//! textures it creates for itself and the handles wired into its input
//! channels. Target validation and pass execution are shared with shadow
//! nodes through [`validate_targets`] and [`execute_targets`].

use std::rc::Rc;

use crate::backend::{
    FullscreenGeometry, GeometryHandle, QuadDraw, RenderSystem, RenderTargetHandle,
    RenderTargetInfo, SceneDraw,
};
use crate::compositor::binder::TexturePool;
use crate::compositor::node_def::{NodeDefinition, TextureSource};
use crate::compositor::pass::{PassKind, TargetDefinition};
use crate::compositor::shadow_node::ShadowNodeSet;
use crate::compositor::texture::{TextureDefinition, TextureName};
use crate::error::{CompositorError, CompositorResult};
use crate::id::IdString;
use crate::scene::{Camera, Scene};

/// Where a node is in its validation life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationState {
    #[default]
    Unvalidated,
    Validated,
    /// Validation failed; retried on the next update
    Invalid,
}

/// Fullscreen geometry shared by every quad pass of a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedGeometry {
    pub triangle: GeometryHandle,
    pub quad: GeometryHandle,
}

impl SharedGeometry {
    pub fn get(&self, kind: FullscreenGeometry) -> GeometryHandle {
        match kind {
            FullscreenGeometry::Triangle => self.triangle,
            FullscreenGeometry::Quad => self.quad,
        }
    }
}

/// Everything a pass needs besides its own node
#[derive(Clone, Copy)]
pub(crate) struct PassContext<'a> {
    pub globals: &'a TexturePool,
    pub scene: &'a Scene,
    pub default_camera: Option<IdString>,
    /// Frames the workspace rendered before this one
    pub frame: u64,
    /// Manager frame being rendered; shadow nodes key their reuse on it
    pub manager_frame: u64,
    pub geometry: SharedGeometry,
}

impl PassContext<'_> {
    /// Camera of a scene pass, falling back to the default camera
    pub fn camera(&self, node: &str, camera: Option<IdString>) -> CompositorResult<Camera> {
        let name = camera.or(self.default_camera).ok_or_else(|| {
            CompositorError::validation(node, "scene pass has no camera and no default camera is set")
        })?;
        self.scene
            .camera(name)
            .ok_or_else(|| CompositorError::not_found("camera", name))
    }
}

/// Create the local textures of a definition.
///
/// On failure the textures created so far are destroyed again.
pub(crate) fn create_locals<R: RenderSystem>(
    textures: &[TextureDefinition],
    final_target: &RenderTargetInfo,
    rs: &mut R,
) -> CompositorResult<Vec<RenderTargetHandle>> {
    let mut handles = Vec::with_capacity(textures.len());
    for texture in textures {
        match rs.create_render_target(&texture.descriptor(final_target)) {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                for handle in handles {
                    rs.destroy_render_target(handle);
                }
                return Err(err.into());
            }
        }
    }
    Ok(handles)
}

fn resolve_attachments(
    node: &str,
    target: &TargetDefinition,
    resolve: &dyn Fn(TextureName) -> Option<RenderTargetHandle>,
) -> CompositorResult<Vec<RenderTargetHandle>> {
    target
        .attachments()
        .map(|name| {
            resolve(name).ok_or_else(|| {
                CompositorError::validation(
                    node,
                    format!("target '{}' attachment {} is not bound", target.label, name.id),
                )
            })
        })
        .collect()
}

fn resolve_read(
    node: &str,
    target: &TargetDefinition,
    name: TextureName,
    resolve: &dyn Fn(TextureName) -> Option<RenderTargetHandle>,
) -> CompositorResult<RenderTargetHandle> {
    resolve(name).ok_or_else(|| {
        CompositorError::validation(
            node,
            format!("texture {} read on target '{}' is not bound", name.id, target.label),
        )
    })
}

/// Check every target of a node against the live render targets.
///
/// Attaches declared depth buffers and returns the targets that received
/// one. On failure the depth buffers attached so far are detached again.
/// `shadows` is `None` for shadow nodes, whose camera-less scene passes
/// borrow the camera of the pass that triggered them.
pub(crate) fn validate_targets<R: RenderSystem>(
    node: &str,
    targets: &[TargetDefinition],
    resolve: &dyn Fn(TextureName) -> Option<RenderTargetHandle>,
    rs: &mut R,
    ctx: &PassContext<'_>,
    shadows: Option<&ShadowNodeSet>,
) -> CompositorResult<Vec<RenderTargetHandle>> {
    let mut depth_attached = Vec::new();
    match check_targets(node, targets, resolve, rs, ctx, shadows, &mut depth_attached) {
        Ok(()) => Ok(depth_attached),
        Err(err) => {
            for target in depth_attached {
                rs.detach_depth_buffer(target);
            }
            Err(err)
        }
    }
}

fn check_targets<R: RenderSystem>(
    node: &str,
    targets: &[TargetDefinition],
    resolve: &dyn Fn(TextureName) -> Option<RenderTargetHandle>,
    rs: &mut R,
    ctx: &PassContext<'_>,
    shadows: Option<&ShadowNodeSet>,
    depth_attached: &mut Vec<RenderTargetHandle>,
) -> CompositorResult<()> {
    for target in targets {
        let attachments = resolve_attachments(node, target, resolve)?;
        let primary = rs.target_info(attachments[0])?;
        for (index, &attachment) in attachments.iter().enumerate().skip(1) {
            let info = rs.target_info(attachment)?;
            if !primary.is_attachment_compatible(&info) {
                return Err(CompositorError::validation(
                    node,
                    format!(
                        "target '{}' attachment {index} is {}x{} {:?}, attachment 0 is {}x{} {:?}",
                        target.label,
                        info.width,
                        info.height,
                        info.format,
                        primary.width,
                        primary.height,
                        primary.format
                    ),
                ));
            }
        }

        if let Some(depth) = target.depth {
            let handle = resolve_read(node, target, depth, resolve)?;
            rs.attach_depth_buffer(attachments[0], handle)?;
            depth_attached.push(attachments[0]);
        }

        for pass in &target.passes {
            match &pass.kind {
                PassKind::Scene {
                    camera,
                    shadow_node,
                    ..
                } => {
                    if shadows.is_some() || camera.is_some() {
                        ctx.camera(node, *camera)?;
                    }
                    if let (Some(shadow), Some(set)) = (shadow_node, shadows) {
                        if !set.contains(*shadow) {
                            return Err(CompositorError::not_found("shadow node", *shadow));
                        }
                    }
                }
                PassKind::Quad { inputs, .. } => {
                    for input in inputs {
                        resolve_read(node, target, *input, resolve)?;
                    }
                }
                PassKind::Resolve { source } => {
                    let handle = resolve_read(node, target, *source, resolve)?;
                    let info = rs.target_info(handle)?;
                    if !info.is_multisampled() {
                        return Err(CompositorError::validation(
                            node,
                            format!(
                                "resolve source {} of target '{}' is not multisampled",
                                source.id, target.label
                            ),
                        ));
                    }
                    if primary.is_multisampled() || !info.is_attachment_compatible(&primary) {
                        return Err(CompositorError::validation(
                            node,
                            format!(
                                "target '{}' cannot receive a resolve from {}",
                                target.label, source.id
                            ),
                        ));
                    }
                }
                PassKind::Clear { .. } | PassKind::Stencil { .. } => {}
            }
        }
    }
    Ok(())
}

/// Run every target of a node in order.
///
/// `shadows` is `None` when executing a shadow node; its scene passes cannot
/// trigger further shadow nodes.
pub(crate) fn execute_targets<R: RenderSystem>(
    node: &str,
    targets: &[TargetDefinition],
    resolve: &dyn Fn(TextureName) -> Option<RenderTargetHandle>,
    rs: &mut R,
    ctx: &PassContext<'_>,
    mut shadows: Option<&mut ShadowNodeSet>,
) -> CompositorResult<()> {
    for target in targets {
        if !target.passes.iter().any(|p| p.runs_on_frame(ctx.frame)) {
            continue;
        }
        let attachments = resolve_attachments(node, target, resolve)?;
        rs.bind_render_target(&attachments)?;

        for pass in target.passes.iter().filter(|p| p.runs_on_frame(ctx.frame)) {
            log::trace!(
                "Node '{}': {:?} pass on target '{}'",
                node,
                pass.pass_type(),
                target.label
            );
            match &pass.kind {
                PassKind::Scene {
                    camera,
                    shadow_node,
                    first_render_queue,
                    last_render_queue,
                    visibility_mask,
                } => {
                    let camera = ctx.camera(node, *camera)?;
                    let aspect = rs.target_info(attachments[0])?.aspect_ratio();
                    let mut shadow_textures = Vec::new();
                    if let Some(shadow) = shadow_node {
                        let set = shadows.as_deref_mut().ok_or_else(|| {
                            CompositorError::validation(node, "shadow nodes cannot run shadow nodes")
                        })?;
                        let instance = set
                            .get_mut(*shadow)
                            .ok_or_else(|| CompositorError::not_found("shadow node", *shadow))?;
                        instance.execute(rs, ctx, &camera)?;
                        shadow_textures = instance.shadow_textures(ctx.scene);
                        // the shadow node left its own target bound
                        rs.bind_render_target(&attachments)?;
                    }
                    rs.render_scene(&SceneDraw {
                        scene: ctx.scene.id(),
                        camera: camera.name,
                        view_projection: camera.view_projection(aspect),
                        first_render_queue: *first_render_queue,
                        last_render_queue: *last_render_queue,
                        visibility_mask: *visibility_mask,
                        shadow_textures,
                    });
                }
                PassKind::Quad {
                    material,
                    geometry,
                    inputs,
                } => {
                    let textures = inputs
                        .iter()
                        .map(|input| resolve_read(node, target, *input, resolve))
                        .collect::<CompositorResult<Vec<_>>>()?;
                    rs.draw_fullscreen(&QuadDraw {
                        geometry: ctx.geometry.get(*geometry),
                        material: *material,
                        textures,
                    });
                }
                PassKind::Clear { buffers, value } => rs.clear(*buffers, value),
                PassKind::Stencil { state } => rs.set_stencil_state(state),
                PassKind::Resolve { source } => {
                    let handle = resolve_read(node, target, *source, resolve)?;
                    rs.resolve(handle, attachments[0])?;
                }
            }
        }
    }
    Ok(())
}

/// A node definition bound to live render targets
#[derive(Debug)]
pub struct NodeInstance {
    definition: Rc<NodeDefinition>,
    inputs: Vec<Option<RenderTargetHandle>>,
    locals: Vec<RenderTargetHandle>,
    depth_attached: Vec<RenderTargetHandle>,
    state: ValidationState,
}

impl NodeInstance {
    /// Create the node's local textures; inputs start unbound
    pub(crate) fn new<R: RenderSystem>(
        definition: Rc<NodeDefinition>,
        final_target: &RenderTargetInfo,
        rs: &mut R,
    ) -> CompositorResult<Self> {
        let locals = create_locals(definition.local_textures(), final_target, rs)?;
        log::debug!(
            "Node '{}' created with {} local textures",
            definition.label(),
            locals.len()
        );
        Ok(Self {
            inputs: vec![None; definition.num_inputs()],
            definition,
            locals,
            depth_attached: Vec::new(),
            state: ValidationState::Unvalidated,
        })
    }

    pub fn definition(&self) -> &Rc<NodeDefinition> {
        &self.definition
    }

    pub fn name(&self) -> IdString {
        self.definition.name()
    }

    pub fn state(&self) -> ValidationState {
        self.state
    }

    /// Handle bound to input channel `channel`
    pub fn input(&self, channel: usize) -> Option<RenderTargetHandle> {
        self.inputs.get(channel).copied().flatten()
    }

    /// Handle of local texture `index`
    pub fn local(&self, index: usize) -> Option<RenderTargetHandle> {
        self.locals.get(index).copied()
    }

    pub fn locals(&self) -> &[RenderTargetHandle] {
        &self.locals
    }

    /// Handle published on output channel `channel`
    pub fn output(&self, channel: usize) -> Option<RenderTargetHandle> {
        match self.definition.output_source(channel)? {
            TextureSource::Input(index) => self.input(index),
            TextureSource::Local(index) => self.local(index),
            TextureSource::Global(_) => None,
        }
    }

    pub(crate) fn connect_input(
        &mut self,
        channel: usize,
        handle: RenderTargetHandle,
    ) -> CompositorResult<()> {
        let slot = self.inputs.get_mut(channel).ok_or_else(|| {
            CompositorError::validation(
                self.definition.label(),
                format!("no input channel {channel}"),
            )
        })?;
        *slot = Some(handle);
        self.state = ValidationState::Unvalidated;
        Ok(())
    }

    /// Handle a texture name used by this node resolves to
    pub fn texture(&self, name: TextureName, globals: &TexturePool) -> Option<RenderTargetHandle> {
        match self.definition.resolve_texture(name)? {
            TextureSource::Input(index) => self.input(index),
            TextureSource::Local(index) => self.local(index),
            TextureSource::Global(id) => globals.get(id),
        }
    }

    /// Check the node can run and mark it validated.
    ///
    /// Depth buffers from an earlier validation are detached first. A
    /// failure leaves the node [`ValidationState::Invalid`] with no depth
    /// buffer attached.
    pub(crate) fn validate_and_finish<R: RenderSystem>(
        &mut self,
        rs: &mut R,
        ctx: &PassContext<'_>,
        shadows: &ShadowNodeSet,
    ) -> CompositorResult<()> {
        for target in self.depth_attached.drain(..) {
            rs.detach_depth_buffer(target);
        }
        let label = self.definition.label();
        let result = match self.inputs.iter().position(Option::is_none) {
            Some(channel) => Err(CompositorError::validation(
                label,
                format!(
                    "input channel {channel} {} is not connected",
                    self.definition.inputs()[channel]
                ),
            )),
            None => validate_targets(
                label,
                self.definition.targets(),
                &|name| self.texture(name, ctx.globals),
                rs,
                ctx,
                Some(shadows),
            ),
        };
        match result {
            Ok(attached) => {
                self.depth_attached = attached;
                self.state = ValidationState::Validated;
                log::debug!("Node '{}' validated", self.definition.label());
                Ok(())
            }
            Err(err) => {
                self.state = ValidationState::Invalid;
                log::warn!("Node '{}' failed validation: {}", self.definition.label(), err);
                Err(err)
            }
        }
    }

    pub(crate) fn execute<R: RenderSystem>(
        &self,
        rs: &mut R,
        ctx: &PassContext<'_>,
        shadows: &mut ShadowNodeSet,
    ) -> CompositorResult<()> {
        execute_targets(
            self.definition.label(),
            self.definition.targets(),
            &|name| self.texture(name, ctx.globals),
            rs,
            ctx,
            Some(shadows),
        )
    }

    /// Force validation to run again before the next execution
    pub(crate) fn invalidate(&mut self) {
        if self.state == ValidationState::Validated {
            self.state = ValidationState::Unvalidated;
        }
    }

    /// Release the node's local textures
    pub(crate) fn destroy<R: RenderSystem>(&mut self, rs: &mut R) {
        for target in self.depth_attached.drain(..) {
            rs.detach_depth_buffer(target);
        }
        for handle in self.locals.drain(..) {
            rs.destroy_render_target(handle);
        }
        self.inputs.iter_mut().for_each(|input| *input = None);
        self.state = ValidationState::Unvalidated;
    }
}
