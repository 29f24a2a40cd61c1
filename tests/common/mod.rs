//! Shared setup for compositor integration tests.

use std::rc::Rc;

use glam::Vec3;

use redlilium_compositor::{
    Camera, CompositorConfig, CompositorManager, DummyRenderSystem, IdString, PassDefinition,
    RenderCommand, RenderSystem, RenderTargetDesc, RenderTargetHandle, Scene, TextureDefinition,
    TextureFormat, TextureSize,
};

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 600;
pub const WINDOW_FORMAT: TextureFormat = TextureFormat::Bgra8Unorm;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Manager on a dummy render system, a scene with a "main" camera and a window
pub struct TestContext {
    pub manager: CompositorManager<DummyRenderSystem>,
    pub scene: Rc<Scene>,
    pub window: RenderTargetHandle,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(CompositorConfig::default())
    }

    pub fn with_config(config: CompositorConfig) -> Self {
        init_logging();
        let mut manager = CompositorManager::new(DummyRenderSystem::new(), config)
            .expect("manager creation");
        let window = create_target(manager.render_system_mut(), WIDTH, HEIGHT, WINDOW_FORMAT);
        let scene = Rc::new(Scene::new("test_scene"));
        scene.set_camera(Camera::new("main", Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO));
        Self {
            manager,
            scene,
            window,
        }
    }

    pub fn main_camera() -> Option<IdString> {
        Some(IdString::new("main"))
    }

    pub fn rs(&self) -> &DummyRenderSystem {
        self.manager.render_system()
    }

    /// Recorded commands, drained
    pub fn take_commands(&mut self) -> Vec<RenderCommand> {
        self.manager.render_system_mut().take_commands()
    }

    pub fn live_targets(&self) -> usize {
        self.rs().live_target_count()
    }
}

pub fn create_target(
    rs: &mut DummyRenderSystem,
    width: u32,
    height: u32,
    format: TextureFormat,
) -> RenderTargetHandle {
    rs.create_render_target(&RenderTargetDesc::new(width, height, format))
        .expect("target creation")
}

/// Node that samples input 0 into its own texture and outputs it.
///
/// The quad pass material is named after the node, so draw order is easy to
/// read back from the recorded commands.
pub fn add_filter_node(manager: &mut CompositorManager<DummyRenderSystem>, name: &str) {
    let node = manager.add_node_definition(name).unwrap();
    node.add_input_channel("in").unwrap();
    node.add_texture_definition(TextureDefinition::new(
        "rt",
        TextureFormat::Rgba16Float,
        TextureSize::default(),
    ))
    .unwrap();
    node.add_output_channel("rt").unwrap();
    node.add_target("rt")
        .add_pass(PassDefinition::quad(name).with_input("in"));
}

/// Node that renders the scene into its own texture and outputs it
pub fn add_source_node(manager: &mut CompositorManager<DummyRenderSystem>, name: &str) {
    let node = manager.add_node_definition(name).unwrap();
    node.add_texture_definition(TextureDefinition::new(
        "rt",
        TextureFormat::Rgba16Float,
        TextureSize::default(),
    ))
    .unwrap();
    node.add_output_channel("rt").unwrap();
    node.add_target("rt")
        .add_pass(PassDefinition::quad(name));
}

/// Node that copies input 0 into the final target bound on input 1
pub fn add_final_node(manager: &mut CompositorManager<DummyRenderSystem>, name: &str) {
    let node = manager.add_node_definition(name).unwrap();
    node.add_input_channel("in").unwrap();
    node.add_input_channel("final").unwrap();
    node.add_target("final")
        .add_pass(PassDefinition::quad(name).with_input("in"));
}

/// Materials of fullscreen draws, in submission order
pub fn drawn_materials(commands: &[RenderCommand]) -> Vec<IdString> {
    commands
        .iter()
        .filter_map(|command| match command {
            RenderCommand::DrawFullscreen { draw, .. } => Some(draw.material),
            _ => None,
        })
        .collect()
}

pub fn ids(names: &[&str]) -> Vec<IdString> {
    names.iter().map(|name| IdString::new(name)).collect()
}
