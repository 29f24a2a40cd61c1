//! Pass and target definitions
//!
//! A node definition holds an ordered list of [`TargetDefinition`]s, each of
//! which holds an ordered list of [`PassDefinition`]s executed against that
//! target.

use crate::backend::{ClearBuffers, ClearValue, FullscreenGeometry, StencilState};
use crate::compositor::texture::TextureName;
use crate::id::IdString;

/// Type of pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassType {
    /// Render scene geometry through a camera
    Scene,
    /// Fullscreen draw with a material
    Quad,
    /// Clear colour/depth/stencil
    Clear,
    /// Change stencil state for the following passes
    Stencil,
    /// Resolve a multisampled texture into the target
    Resolve,
}

/// What a pass does
#[derive(Debug, Clone, PartialEq)]
pub enum PassKind {
    Scene {
        /// Camera name; `None` uses the workspace default camera
        camera: Option<IdString>,
        /// Shadow node executed before this pass
        shadow_node: Option<IdString>,
        first_render_queue: u8,
        last_render_queue: u8,
        visibility_mask: u32,
    },
    Quad {
        material: IdString,
        geometry: FullscreenGeometry,
        /// Textures sampled by the material, in texture-unit order
        inputs: Vec<TextureName>,
    },
    Clear {
        buffers: ClearBuffers,
        value: ClearValue,
    },
    Stencil {
        state: StencilState,
    },
    Resolve {
        /// Multisampled texture resolved into the target
        source: TextureName,
    },
}

/// A single operation inside a target
#[derive(Debug, Clone, PartialEq)]
pub struct PassDefinition {
    pub kind: PassKind,
    pub identifier: Option<IdString>,
    /// Only execute during the first `num_initial` frames; 0 = every frame
    pub num_initial: u32,
}

impl PassDefinition {
    fn from_kind(kind: PassKind) -> Self {
        Self {
            kind,
            identifier: None,
            num_initial: 0,
        }
    }

    pub fn scene() -> Self {
        Self::from_kind(PassKind::Scene {
            camera: None,
            shadow_node: None,
            first_render_queue: 0,
            last_render_queue: u8::MAX,
            visibility_mask: u32::MAX,
        })
    }

    pub fn quad(material: &str) -> Self {
        Self::from_kind(PassKind::Quad {
            material: IdString::new(material),
            geometry: FullscreenGeometry::Triangle,
            inputs: Vec::new(),
        })
    }

    pub fn clear(value: ClearValue) -> Self {
        Self::from_kind(PassKind::Clear {
            buffers: ClearBuffers::ALL,
            value,
        })
    }

    pub fn stencil(state: StencilState) -> Self {
        Self::from_kind(PassKind::Stencil { state })
    }

    pub fn resolve(source: &str) -> Self {
        Self::from_kind(PassKind::Resolve {
            source: TextureName::new(source),
        })
    }

    pub fn pass_type(&self) -> PassType {
        match self.kind {
            PassKind::Scene { .. } => PassType::Scene,
            PassKind::Quad { .. } => PassType::Quad,
            PassKind::Clear { .. } => PassType::Clear,
            PassKind::Stencil { .. } => PassType::Stencil,
            PassKind::Resolve { .. } => PassType::Resolve,
        }
    }

    pub fn with_identifier(mut self, identifier: &str) -> Self {
        self.identifier = Some(IdString::new(identifier));
        self
    }

    pub fn with_num_initial(mut self, num_initial: u32) -> Self {
        self.num_initial = num_initial;
        self
    }

    /// Set the camera of a scene pass
    pub fn with_camera(mut self, name: &str) -> Self {
        if let PassKind::Scene { camera, .. } = &mut self.kind {
            *camera = Some(IdString::new(name));
        }
        self
    }

    /// Set the shadow node of a scene pass
    pub fn with_shadow_node(mut self, name: impl Into<IdString>) -> Self {
        if let PassKind::Scene { shadow_node, .. } = &mut self.kind {
            *shadow_node = Some(name.into());
        }
        self
    }

    /// Restrict a scene pass to a render-queue range (inclusive)
    pub fn with_render_queues(mut self, first: u8, last: u8) -> Self {
        if let PassKind::Scene {
            first_render_queue,
            last_render_queue,
            ..
        } = &mut self.kind
        {
            *first_render_queue = first;
            *last_render_queue = last;
        }
        self
    }

    pub fn with_visibility_mask(mut self, mask: u32) -> Self {
        if let PassKind::Scene {
            visibility_mask, ..
        } = &mut self.kind
        {
            *visibility_mask = mask;
        }
        self
    }

    /// Add a sampled texture to a quad pass
    pub fn with_input(mut self, texture: &str) -> Self {
        if let PassKind::Quad { inputs, .. } = &mut self.kind {
            inputs.push(TextureName::new(texture));
        }
        self
    }

    pub fn with_geometry(mut self, kind: FullscreenGeometry) -> Self {
        if let PassKind::Quad { geometry, .. } = &mut self.kind {
            *geometry = kind;
        }
        self
    }

    /// Choose which buffers a clear pass touches
    pub fn with_buffers(mut self, which: ClearBuffers) -> Self {
        if let PassKind::Clear { buffers, .. } = &mut self.kind {
            *buffers = which;
        }
        self
    }

    /// Shadow node this pass depends on
    pub fn shadow_node(&self) -> Option<IdString> {
        match &self.kind {
            PassKind::Scene { shadow_node, .. } => *shadow_node,
            _ => None,
        }
    }

    /// Whether the pass runs on the given frame of its workspace (0-based)
    pub fn runs_on_frame(&self, frame: u64) -> bool {
        self.num_initial == 0 || frame < u64::from(self.num_initial)
    }

    /// Textures read by the pass
    pub fn texture_reads(&self) -> Vec<TextureName> {
        match &self.kind {
            PassKind::Quad { inputs, .. } => inputs.clone(),
            PassKind::Resolve { source } => vec![*source],
            _ => Vec::new(),
        }
    }
}

/// A render target of a node and the passes executed against it
#[derive(Debug, Clone, PartialEq)]
pub struct TargetDefinition {
    pub name: TextureName,
    pub label: String,
    /// Additional colour attachments bound together with `name`
    pub colour_attachments: Vec<TextureName>,
    /// Depth/stencil texture attached to `name`
    pub depth: Option<TextureName>,
    pub passes: Vec<PassDefinition>,
}

impl TargetDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: TextureName::new(name),
            label: name.to_string(),
            colour_attachments: Vec::new(),
            depth: None,
            passes: Vec::new(),
        }
    }

    pub fn add_pass(&mut self, pass: PassDefinition) -> &mut Self {
        self.passes.push(pass);
        self
    }

    pub fn add_colour_attachment(&mut self, name: &str) -> &mut Self {
        self.colour_attachments.push(TextureName::new(name));
        self
    }

    pub fn set_depth(&mut self, name: &str) -> &mut Self {
        self.depth = Some(TextureName::new(name));
        self
    }

    /// Primary target followed by the extra colour attachments
    pub fn attachments(&self) -> impl Iterator<Item = TextureName> + '_ {
        std::iter::once(self.name).chain(self.colour_attachments.iter().copied())
    }

    /// Every texture name this target touches
    pub fn referenced_textures(&self) -> Vec<TextureName> {
        let mut names: Vec<TextureName> = self.attachments().collect();
        names.extend(self.depth);
        for pass in &self.passes {
            names.extend(pass.texture_reads());
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_pass_builder() {
        let pass = PassDefinition::scene()
            .with_camera("main")
            .with_shadow_node("sun_shadows")
            .with_render_queues(10, 20)
            .with_visibility_mask(0x1);
        assert_eq!(pass.pass_type(), PassType::Scene);
        assert_eq!(pass.shadow_node(), Some(IdString::new("sun_shadows")));
        match pass.kind {
            PassKind::Scene {
                camera,
                first_render_queue,
                last_render_queue,
                visibility_mask,
                ..
            } => {
                assert_eq!(camera, Some(IdString::new("main")));
                assert_eq!((first_render_queue, last_render_queue), (10, 20));
                assert_eq!(visibility_mask, 0x1);
            }
            _ => panic!("expected scene pass"),
        }
    }

    #[test]
    fn test_builders_ignore_other_kinds() {
        let pass = PassDefinition::clear(ClearValue::default()).with_camera("main");
        assert_eq!(pass.pass_type(), PassType::Clear);
        assert_eq!(pass.shadow_node(), None);
    }

    #[test]
    fn test_num_initial() {
        let always = PassDefinition::quad("blit");
        assert!(always.runs_on_frame(1000));

        let once = PassDefinition::quad("blit").with_num_initial(1);
        assert!(once.runs_on_frame(0));
        assert!(!once.runs_on_frame(1));
    }

    #[test]
    fn test_referenced_textures() {
        let mut target = TargetDefinition::new("rt0");
        target.add_colour_attachment("rt1").set_depth("depth");
        target
            .add_pass(PassDefinition::quad("combine").with_input("in0").with_input("in1"))
            .add_pass(PassDefinition::resolve("msaa"));
        let names = target.referenced_textures();
        for expected in ["rt0", "rt1", "depth", "in0", "in1", "msaa"] {
            assert!(names.contains(&TextureName::new(expected)), "{expected} missing");
        }
    }
}
