//! Shadow node definitions
//!
//! A shadow node is a node without inputs that renders shadow maps. It is
//! never wired into a workspace connection graph; scene passes name it and it
//! runs right before them.

use crate::compositor::node_def::NodeDefinition;
use crate::compositor::pass::TargetDefinition;
use crate::compositor::texture::TextureDefinition;
use crate::error::{CompositorError, CompositorResult};
use crate::id::IdString;

/// A shadow map texture and the light it renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowMapDefinition {
    /// Local texture of the shadow node holding the map
    pub texture: IdString,
    /// Index into the scene's shadow casting lights
    pub light_index: usize,
}

/// Immutable template for a shadow node
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowNodeDefinition {
    base: NodeDefinition,
    shadow_maps: Vec<ShadowMapDefinition>,
    finished: bool,
}

impl ShadowNodeDefinition {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            base: NodeDefinition::new(name),
            shadow_maps: Vec::new(),
            finished: false,
        }
    }

    pub fn name(&self) -> IdString {
        self.base.name()
    }

    pub fn label(&self) -> &str {
        self.base.label()
    }

    /// The node part of the definition (outputs, locals, targets)
    pub fn node(&self) -> &NodeDefinition {
        &self.base
    }

    /// Shadow nodes cannot consume external input; always fails.
    pub fn add_input_channel(&mut self, name: &str) -> CompositorResult<usize> {
        Err(CompositorError::ShadowNodeInput {
            node: self.base.label().to_string(),
            channel: name.to_string(),
        })
    }

    /// Expose a local texture (usually a shadow map) to other nodes
    pub fn add_output_channel(&mut self, name: &str) -> CompositorResult<usize> {
        self.finished = false;
        self.base.add_output_channel(name)
    }

    pub fn add_texture_definition(&mut self, texture: TextureDefinition) -> CompositorResult<usize> {
        self.finished = false;
        self.base.add_texture_definition(texture)
    }

    /// Declare a local texture as the shadow map of light `light_index`
    pub fn add_shadow_map(
        &mut self,
        texture: TextureDefinition,
        light_index: usize,
    ) -> CompositorResult<usize> {
        let name = texture.name;
        self.add_texture_definition(texture)?;
        self.shadow_maps.push(ShadowMapDefinition {
            texture: name,
            light_index,
        });
        Ok(self.shadow_maps.len() - 1)
    }

    pub fn add_target(&mut self, name: &str) -> &mut TargetDefinition {
        self.finished = false;
        self.base.add_target(name)
    }

    pub fn shadow_maps(&self) -> &[ShadowMapDefinition] {
        &self.shadow_maps
    }

    /// Whether [`Self::validate_and_finish`] succeeded since the last change
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Check the definition is complete and usable, then mark it finished.
    pub fn validate_and_finish(&mut self) -> CompositorResult<()> {
        let label = self.base.label();
        if self.base.targets().is_empty() {
            return Err(CompositorError::IncompleteDefinition {
                name: label.to_string(),
                reason: "no targets".to_string(),
            });
        }
        if let Some(target) = self.base.targets().iter().find(|t| t.passes.is_empty()) {
            return Err(CompositorError::IncompleteDefinition {
                name: label.to_string(),
                reason: format!("target '{}' has no passes", target.label),
            });
        }
        if !self.base.shadow_nodes().is_empty() {
            return Err(CompositorError::validation(
                label,
                "shadow nodes cannot reference other shadow nodes",
            ));
        }
        self.base.validate()?;
        self.finished = true;
        log::debug!("Shadow node definition '{}' finished", label);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ClearValue, TextureFormat};
    use crate::compositor::pass::PassDefinition;
    use crate::compositor::texture::TextureSize;

    fn shadow_map(name: &str) -> TextureDefinition {
        TextureDefinition::new(name, TextureFormat::Depth32Float, TextureSize::absolute(1024, 1024))
    }

    #[test]
    fn test_inputs_rejected() {
        let mut def = ShadowNodeDefinition::new("shadows");
        assert!(matches!(
            def.add_input_channel("scene"),
            Err(CompositorError::ShadowNodeInput { .. })
        ));
        assert_eq!(def.node().num_inputs(), 0);
    }

    #[test]
    fn test_outputs_allowed() {
        let mut def = ShadowNodeDefinition::new("shadows");
        def.add_shadow_map(shadow_map("map0"), 0).unwrap();
        assert_eq!(def.add_output_channel("map0").unwrap(), 0);
        def.add_target("map0")
            .add_pass(PassDefinition::clear(ClearValue::default()))
            .add_pass(PassDefinition::scene());
        def.validate_and_finish().unwrap();
        assert!(def.is_finished());
        assert_eq!(def.shadow_maps()[0].texture, IdString::new("map0"));
    }

    #[test]
    fn test_unfinished_without_targets() {
        let mut def = ShadowNodeDefinition::new("shadows");
        assert!(matches!(
            def.validate_and_finish(),
            Err(CompositorError::IncompleteDefinition { .. })
        ));

        def.add_shadow_map(shadow_map("map0"), 0).unwrap();
        def.add_target("map0");
        assert!(matches!(
            def.validate_and_finish(),
            Err(CompositorError::IncompleteDefinition { .. })
        ));
        assert!(!def.is_finished());
    }

    #[test]
    fn test_nested_shadow_node_rejected() {
        let mut def = ShadowNodeDefinition::new("shadows");
        def.add_shadow_map(shadow_map("map0"), 0).unwrap();
        def.add_target("map0")
            .add_pass(PassDefinition::scene().with_shadow_node("other"));
        assert!(matches!(
            def.validate_and_finish(),
            Err(CompositorError::Validation { .. })
        ));
    }

    #[test]
    fn test_change_resets_finished() {
        let mut def = ShadowNodeDefinition::new("shadows");
        def.add_shadow_map(shadow_map("map0"), 0).unwrap();
        def.add_target("map0").add_pass(PassDefinition::scene());
        def.validate_and_finish().unwrap();
        def.add_target("map0");
        assert!(!def.is_finished());
    }
}
