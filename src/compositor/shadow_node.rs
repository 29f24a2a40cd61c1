//! Live shadow nodes
//!
//! Shadow node instances belong to a workspace and are shared by every scene
//! pass that names them. They render at most once per frame and camera; a
//! shadow map whose light does not exist in the scene is replaced by the
//! manager's null shadow texture of the same format. Output channels feed
//! regular nodes through the workspace's shadow routes.

use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::{RenderSystem, RenderTargetHandle, RenderTargetInfo, TextureFormat};
use crate::compositor::node::{
    create_locals, execute_targets, validate_targets, PassContext, ValidationState,
};
use crate::compositor::node_def::TextureSource;
use crate::compositor::shadow_node_def::ShadowNodeDefinition;
use crate::compositor::texture::TextureName;
use crate::error::{CompositorError, CompositorResult};
use crate::id::IdString;
use crate::scene::{Camera, Scene};

/// A shadow node definition bound to live render targets
#[derive(Debug)]
pub struct ShadowNodeInstance {
    definition: Rc<ShadowNodeDefinition>,
    locals: Vec<RenderTargetHandle>,
    /// Per shadow map: the local texture and its null substitute
    maps: Vec<(RenderTargetHandle, RenderTargetHandle)>,
    depth_attached: Vec<RenderTargetHandle>,
    last_execution: Option<(u64, IdString)>,
    executions: u64,
    state: ValidationState,
}

impl ShadowNodeInstance {
    /// Create the shadow node's textures.
    ///
    /// `null_textures` must hold a null shadow texture for the format of
    /// every shadow map of the definition.
    pub(crate) fn new<R: RenderSystem>(
        definition: Rc<ShadowNodeDefinition>,
        final_target: &RenderTargetInfo,
        null_textures: &HashMap<TextureFormat, RenderTargetHandle>,
        rs: &mut R,
    ) -> CompositorResult<Self> {
        let node = definition.node();
        let mut maps = Vec::with_capacity(definition.shadow_maps().len());
        for map in definition.shadow_maps() {
            let Some(TextureSource::Local(index)) = node.resolve_texture(TextureName {
                id: map.texture,
                global: false,
            }) else {
                return Err(CompositorError::validation(
                    definition.label(),
                    format!("shadow map {} is not a local texture", map.texture),
                ));
            };
            let format = node.local_textures()[index].format;
            let null = null_textures.get(&format).copied().ok_or_else(|| {
                CompositorError::validation(
                    definition.label(),
                    format!("no null shadow texture for {format:?}"),
                )
            })?;
            maps.push((index, null));
        }

        let locals = create_locals(node.local_textures(), final_target, rs)?;
        let maps = maps
            .into_iter()
            .map(|(index, null)| (locals[index], null))
            .collect();
        log::debug!(
            "Shadow node '{}' created with {} local textures",
            definition.label(),
            locals.len()
        );
        Ok(Self {
            definition,
            locals,
            maps,
            depth_attached: Vec::new(),
            last_execution: None,
            executions: 0,
            state: ValidationState::Unvalidated,
        })
    }

    pub fn definition(&self) -> &Rc<ShadowNodeDefinition> {
        &self.definition
    }

    pub fn name(&self) -> IdString {
        self.definition.name()
    }

    pub fn state(&self) -> ValidationState {
        self.state
    }

    pub fn locals(&self) -> &[RenderTargetHandle] {
        &self.locals
    }

    /// Handle published on output channel `channel`
    pub fn output(&self, channel: usize) -> Option<RenderTargetHandle> {
        match self.definition.node().output_source(channel)? {
            TextureSource::Local(index) => self.locals.get(index).copied(),
            TextureSource::Input(_) | TextureSource::Global(_) => None,
        }
    }

    /// How many times the shadow node actually rendered
    pub fn executions(&self) -> u64 {
        self.executions
    }

    /// Manager frame and camera of the most recent execution
    pub fn last_execution(&self) -> Option<(u64, IdString)> {
        self.last_execution
    }

    /// Texture handed to scene passes for each shadow map.
    ///
    /// Maps whose light index is not below the scene's shadow casting light
    /// count report the null shadow texture instead.
    pub fn shadow_textures(&self, scene: &Scene) -> Vec<RenderTargetHandle> {
        let lights = scene.shadow_casting_lights();
        self.definition
            .shadow_maps()
            .iter()
            .zip(&self.maps)
            .map(|(map, &(texture, null))| {
                if map.light_index < lights {
                    texture
                } else {
                    null
                }
            })
            .collect()
    }

    fn texture(&self, name: TextureName, ctx: &PassContext<'_>) -> Option<RenderTargetHandle> {
        match self.definition.node().resolve_texture(name)? {
            TextureSource::Local(index) => self.locals.get(index).copied(),
            TextureSource::Global(id) => ctx.globals.get(id),
            TextureSource::Input(_) => None,
        }
    }

    pub(crate) fn validate_and_finish<R: RenderSystem>(
        &mut self,
        rs: &mut R,
        ctx: &PassContext<'_>,
    ) -> CompositorResult<()> {
        for target in self.depth_attached.drain(..) {
            rs.detach_depth_buffer(target);
        }
        let result = validate_targets(
            self.definition.label(),
            self.definition.node().targets(),
            &|name| self.texture(name, ctx),
            rs,
            ctx,
            None,
        );
        match result {
            Ok(attached) => {
                self.depth_attached = attached;
                self.state = ValidationState::Validated;
                Ok(())
            }
            Err(err) => {
                self.state = ValidationState::Invalid;
                log::warn!(
                    "Shadow node '{}' failed validation: {}",
                    self.definition.label(),
                    err
                );
                Err(err)
            }
        }
    }

    pub(crate) fn invalidate(&mut self) {
        if self.state == ValidationState::Validated {
            self.state = ValidationState::Unvalidated;
        }
    }

    /// Render the shadow maps for `camera`, once per frame and camera
    pub(crate) fn execute<R: RenderSystem>(
        &mut self,
        rs: &mut R,
        ctx: &PassContext<'_>,
        camera: &Camera,
    ) -> CompositorResult<()> {
        let stamp = (ctx.manager_frame, camera.name);
        if self.last_execution == Some(stamp) {
            return Ok(());
        }
        let shadow_ctx = PassContext {
            default_camera: Some(camera.name),
            ..*ctx
        };
        execute_targets(
            self.definition.label(),
            self.definition.node().targets(),
            &|name| self.texture(name, &shadow_ctx),
            rs,
            &shadow_ctx,
            None,
        )?;
        self.last_execution = Some(stamp);
        self.executions += 1;
        Ok(())
    }

    pub(crate) fn destroy<R: RenderSystem>(&mut self, rs: &mut R) {
        for target in self.depth_attached.drain(..) {
            rs.detach_depth_buffer(target);
        }
        for handle in self.locals.drain(..) {
            rs.destroy_render_target(handle);
        }
        // null textures belong to the manager
        self.maps.clear();
        self.state = ValidationState::Unvalidated;
    }
}

/// Shadow node instances of one workspace
#[derive(Debug, Default)]
pub struct ShadowNodeSet {
    nodes: Vec<ShadowNodeInstance>,
}

impl ShadowNodeSet {
    pub(crate) fn push(&mut self, node: ShadowNodeInstance) {
        self.nodes.push(node);
    }

    pub fn contains(&self, name: IdString) -> bool {
        self.nodes.iter().any(|n| n.name() == name)
    }

    pub fn get(&self, name: IdString) -> Option<&ShadowNodeInstance> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    pub(crate) fn get_mut(&mut self, name: IdString) -> Option<&mut ShadowNodeInstance> {
        self.nodes.iter_mut().find(|n| n.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShadowNodeInstance> {
        self.nodes.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ShadowNodeInstance> {
        self.nodes.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn destroy<R: RenderSystem>(&mut self, rs: &mut R) {
        for node in &mut self.nodes {
            node.destroy(rs);
        }
        self.nodes.clear();
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::{DummyRenderSystem, GeometryHandle, RenderCommand, RenderTargetDesc};
    use crate::compositor::binder::TexturePool;
    use crate::compositor::node::SharedGeometry;
    use crate::compositor::pass::PassDefinition;
    use crate::compositor::texture::{TextureDefinition, TextureSize};
    use glam::Vec3;

    fn definition() -> Rc<ShadowNodeDefinition> {
        let mut def = ShadowNodeDefinition::new("shadows");
        for (i, name) in ["map0", "map1"].iter().enumerate() {
            def.add_shadow_map(
                TextureDefinition::new(name, TextureFormat::Depth32Float, TextureSize::absolute(256, 256)),
                i,
            )
            .unwrap();
            def.add_target(name).add_pass(PassDefinition::scene());
        }
        def.validate_and_finish().unwrap();
        Rc::new(def)
    }

    fn setup(rs: &mut DummyRenderSystem) -> (ShadowNodeInstance, RenderTargetHandle) {
        let null = rs
            .create_render_target(&RenderTargetDesc::new(1, 1, TextureFormat::Depth32Float))
            .unwrap();
        let nulls = HashMap::from([(TextureFormat::Depth32Float, null)]);
        let info = RenderTargetInfo {
            width: 800,
            height: 600,
            format: TextureFormat::Rgba8Unorm,
            samples: 1,
        };
        (
            ShadowNodeInstance::new(definition(), &info, &nulls, rs).unwrap(),
            null,
        )
    }

    #[test]
    fn test_missing_lights_use_null_texture() {
        let mut rs = DummyRenderSystem::new();
        let (node, null) = setup(&mut rs);
        let scene = Scene::new("scene");
        scene.set_shadow_casting_lights(1);
        assert_eq!(node.shadow_textures(&scene), vec![node.locals()[0], null]);
        scene.set_shadow_casting_lights(0);
        assert_eq!(node.shadow_textures(&scene), vec![null, null]);
    }

    #[test]
    fn test_missing_null_texture_rejected() {
        let mut rs = DummyRenderSystem::new();
        let info = RenderTargetInfo {
            width: 800,
            height: 600,
            format: TextureFormat::Rgba8Unorm,
            samples: 1,
        };
        let err = ShadowNodeInstance::new(definition(), &info, &HashMap::new(), &mut rs).unwrap_err();
        assert!(matches!(err, CompositorError::Validation { .. }));
        assert_eq!(rs.live_target_count(), 0);
    }

    #[test]
    fn test_executes_once_per_frame_and_camera() {
        let mut rs = DummyRenderSystem::new();
        let (mut node, _) = setup(&mut rs);
        let scene = Scene::new("scene");
        let main = Camera::new("main", Vec3::Z, Vec3::ZERO);
        let other = Camera::new("other", Vec3::X, Vec3::ZERO);
        scene.set_camera(main.clone());
        scene.set_camera(other.clone());
        let globals = TexturePool::new();
        let mut ctx = PassContext {
            globals: &globals,
            scene: &scene,
            default_camera: None,
            frame: 0,
            manager_frame: 1,
            geometry: SharedGeometry {
                triangle: GeometryHandle::from_raw(1),
                quad: GeometryHandle::from_raw(2),
            },
        };
        node.validate_and_finish(&mut rs, &ctx).unwrap();

        node.execute(&mut rs, &ctx, &main).unwrap();
        node.execute(&mut rs, &ctx, &main).unwrap();
        assert_eq!(node.executions(), 1);
        node.execute(&mut rs, &ctx, &other).unwrap();
        assert_eq!(node.executions(), 2);
        ctx.manager_frame = 2;
        node.execute(&mut rs, &ctx, &other).unwrap();
        assert_eq!(node.executions(), 3);
        assert_eq!(node.last_execution(), Some((2, other.name)));

        let scene_draws = rs
            .commands()
            .iter()
            .filter(|c| matches!(c, RenderCommand::RenderScene { .. }))
            .count();
        assert_eq!(scene_draws, 6);
    }

    #[test]
    fn test_destroy_detaches_depth_from_global_target() {
        let mut rs = DummyRenderSystem::new();
        let (_, null) = setup(&mut rs);
        let nulls = HashMap::from([(TextureFormat::Depth32Float, null)]);
        let info = RenderTargetInfo {
            width: 800,
            height: 600,
            format: TextureFormat::Rgba8Unorm,
            samples: 1,
        };
        let mut globals = TexturePool::new();
        globals
            .create(
                &[TextureDefinition::new(
                    "global_flux",
                    TextureFormat::Rgba8Unorm,
                    TextureSize::absolute(256, 256),
                )],
                &info,
                &mut rs,
            )
            .unwrap();
        let flux = globals.get(IdString::new("global_flux")).unwrap();

        let mut def = ShadowNodeDefinition::new("rsm");
        def.add_shadow_map(
            TextureDefinition::new("map0", TextureFormat::Depth32Float, TextureSize::absolute(256, 256)),
            0,
        )
        .unwrap();
        def.add_target("global_flux")
            .set_depth("map0")
            .add_pass(PassDefinition::scene());
        def.validate_and_finish().unwrap();
        let mut node = ShadowNodeInstance::new(Rc::new(def), &info, &nulls, &mut rs).unwrap();

        let scene = Scene::new("scene");
        let ctx = PassContext {
            globals: &globals,
            scene: &scene,
            default_camera: None,
            frame: 0,
            manager_frame: 1,
            geometry: SharedGeometry {
                triangle: GeometryHandle::from_raw(1),
                quad: GeometryHandle::from_raw(2),
            },
        };
        node.validate_and_finish(&mut rs, &ctx).unwrap();
        assert_eq!(rs.depth_buffer(flux), Some(node.locals()[0]));

        node.destroy(&mut rs);
        assert_eq!(rs.depth_buffer(flux), None);
        assert!(rs.is_live(flux));
    }
}
