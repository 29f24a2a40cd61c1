//! Node definitions
//!
//! A node definition is the immutable template for a unit of rendering work:
//! which textures come in, which go out, which it creates for itself and the
//! targets/passes that write them. Live nodes share the definition through an
//! `Rc`; the registry only hands out mutable access while no instance exists.

use std::collections::HashMap;

use crate::compositor::pass::{PassKind, TargetDefinition};
use crate::compositor::texture::{check_not_global, TextureDefinition, TextureName};
use crate::error::{CompositorError, CompositorResult};
use crate::id::IdString;

/// Where a texture name used inside a node comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSource {
    /// Bound through input channel `n`
    Input(usize),
    /// Created by the node, index into its local textures
    Local(usize),
    /// Looked up in the workspace global pool
    Global(IdString),
}

/// Immutable template for a compositor node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDefinition {
    name: IdString,
    label: String,
    inputs: Vec<IdString>,
    outputs: Vec<IdString>,
    local_textures: Vec<TextureDefinition>,
    targets: Vec<TargetDefinition>,
    sources: HashMap<IdString, TextureSource>,
}

impl NodeDefinition {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: IdString::new(name),
            label: name.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            local_textures: Vec::new(),
            targets: Vec::new(),
            sources: HashMap::new(),
        }
    }

    pub fn name(&self) -> IdString {
        self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn declare(&mut self, name: &str, source: TextureSource) -> CompositorResult<()> {
        let id = IdString::new(name);
        if self.sources.contains_key(&id) {
            return Err(CompositorError::DuplicateName {
                kind: "texture",
                name: format!("{}/{}", self.label, name),
            });
        }
        self.sources.insert(id, source);
        Ok(())
    }

    /// Declare the next input channel; returns its index.
    ///
    /// The name becomes usable by targets and passes of this node.
    pub fn add_input_channel(&mut self, name: &str) -> CompositorResult<usize> {
        check_not_global(name, "node input channel")?;
        let index = self.inputs.len();
        self.declare(name, TextureSource::Input(index))?;
        self.inputs.push(IdString::new(name));
        Ok(index)
    }

    /// Declare the next output channel; returns its index.
    ///
    /// `name` must be an input channel or local texture of this node. Passing
    /// an input through to an output is allowed.
    pub fn add_output_channel(&mut self, name: &str) -> CompositorResult<usize> {
        check_not_global(name, "node output channel")?;
        let index = self.outputs.len();
        self.outputs.push(IdString::new(name));
        Ok(index)
    }

    /// Declare a texture created and owned by each instance of this node
    pub fn add_texture_definition(&mut self, texture: TextureDefinition) -> CompositorResult<usize> {
        check_not_global(&texture.label, "local texture")?;
        let index = self.local_textures.len();
        self.declare(&texture.label, TextureSource::Local(index))?;
        self.local_textures.push(texture);
        Ok(index)
    }

    /// Append a target; `name` may be an input, a local or a global texture
    pub fn add_target(&mut self, name: &str) -> &mut TargetDefinition {
        self.targets.push(TargetDefinition::new(name));
        let last = self.targets.len() - 1;
        &mut self.targets[last]
    }

    pub fn inputs(&self) -> &[IdString] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[IdString] {
        &self.outputs
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn local_textures(&self) -> &[TextureDefinition] {
        &self.local_textures
    }

    pub fn targets(&self) -> &[TargetDefinition] {
        &self.targets
    }

    /// Resolve a texture reference used by a target or pass
    pub fn resolve_texture(&self, name: TextureName) -> Option<TextureSource> {
        if name.global {
            return Some(TextureSource::Global(name.id));
        }
        self.sources.get(&name.id).copied()
    }

    /// Where output channel `index` reads its texture from
    pub fn output_source(&self, index: usize) -> Option<TextureSource> {
        let name = self.outputs.get(index)?;
        self.sources.get(name).copied()
    }

    /// Shadow nodes referenced by scene passes, in first-use order
    pub fn shadow_nodes(&self) -> Vec<IdString> {
        let mut names = Vec::new();
        for pass in self.targets.iter().flat_map(|t| t.passes.iter()) {
            if let Some(shadow) = pass.shadow_node() {
                if !names.contains(&shadow) {
                    names.push(shadow);
                }
            }
        }
        names
    }

    /// Check the definition is internally consistent.
    ///
    /// Reserved names were already rejected when they were declared; this
    /// checks that every output and every texture touched by a target
    /// resolves.
    pub fn validate(&self) -> CompositorResult<()> {
        for (index, output) in self.outputs.iter().enumerate() {
            if !self.sources.contains_key(output) {
                return Err(CompositorError::validation(
                    &self.label,
                    format!("output channel {index} {output} is neither an input nor a local texture"),
                ));
            }
        }
        for target in &self.targets {
            for name in target.referenced_textures() {
                if self.resolve_texture(name).is_none() {
                    return Err(CompositorError::validation(
                        &self.label,
                        format!("target '{}' uses unknown texture {}", target.label, name.id),
                    ));
                }
            }
            for pass in &target.passes {
                if let PassKind::Resolve { source } = &pass.kind {
                    if *source == target.name {
                        return Err(CompositorError::validation(
                            &self.label,
                            format!("target '{}' resolves into itself", target.label),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ClearValue, TextureFormat};
    use crate::compositor::pass::PassDefinition;
    use crate::compositor::texture::TextureSize;

    fn local(name: &str) -> TextureDefinition {
        TextureDefinition::new(name, TextureFormat::Rgba8Unorm, TextureSize::default())
    }

    #[test]
    fn test_channels_and_locals() {
        let mut def = NodeDefinition::new("bloom");
        assert_eq!(def.add_input_channel("scene").unwrap(), 0);
        assert_eq!(def.add_texture_definition(local("blur")).unwrap(), 0);
        assert_eq!(def.add_output_channel("blur").unwrap(), 0);
        assert_eq!(def.add_output_channel("scene").unwrap(), 1);

        assert_eq!(def.output_source(0), Some(TextureSource::Local(0)));
        assert_eq!(def.output_source(1), Some(TextureSource::Input(0)));
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_reserved_prefix_rejected() {
        let mut def = NodeDefinition::new("node");
        assert!(matches!(
            def.add_input_channel("global_in"),
            Err(CompositorError::ReservedName { .. })
        ));
        assert!(matches!(
            def.add_output_channel("global_out"),
            Err(CompositorError::ReservedName { .. })
        ));
        assert!(matches!(
            def.add_texture_definition(local("global_rt")),
            Err(CompositorError::ReservedName { .. })
        ));
        assert_eq!(def.num_inputs(), 0);
        assert_eq!(def.num_outputs(), 0);
        assert!(def.local_textures().is_empty());
    }

    #[test]
    fn test_duplicate_texture_name() {
        let mut def = NodeDefinition::new("node");
        def.add_input_channel("rt").unwrap();
        assert!(matches!(
            def.add_texture_definition(local("rt")),
            Err(CompositorError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_global_target_resolves_without_declaration() {
        let mut def = NodeDefinition::new("node");
        def.add_target("global_hdr")
            .add_pass(PassDefinition::clear(ClearValue::default()));
        assert_eq!(
            def.resolve_texture(TextureName::new("global_hdr")),
            Some(TextureSource::Global(IdString::new("global_hdr")))
        );
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_unknown_texture_fails_validation() {
        let mut def = NodeDefinition::new("node");
        def.add_target("missing");
        assert!(matches!(
            def.validate(),
            Err(CompositorError::Validation { .. })
        ));

        let mut def = NodeDefinition::new("node");
        def.add_output_channel("nowhere").unwrap();
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_shadow_nodes_deduplicated() {
        let mut def = NodeDefinition::new("node");
        def.add_texture_definition(local("rt")).unwrap();
        def.add_target("rt")
            .add_pass(PassDefinition::scene().with_shadow_node("sun"))
            .add_pass(PassDefinition::scene().with_shadow_node("sun"))
            .add_pass(PassDefinition::scene().with_shadow_node("spot"));
        assert_eq!(
            def.shadow_nodes(),
            vec![IdString::new("sun"), IdString::new("spot")]
        );
    }
}
