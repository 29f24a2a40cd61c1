//! Workspace definitions
//!
//! A workspace definition wires node definitions together: which output
//! channel feeds which input channel, which node receives the final render
//! target, and which textures are shared by every node as globals.

use crate::compositor::texture::{is_global_name, TextureDefinition};
use crate::error::{CompositorError, CompositorResult};
use crate::id::IdString;

/// Connection from an output channel of one node to an input channel of another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelRoute {
    pub out_node: IdString,
    pub out_channel: usize,
    pub in_node: IdString,
    pub in_channel: usize,
}

/// Connection from an output channel of a shadow node to a regular node.
///
/// The shadow node renders when a scene pass referencing it runs, so the
/// consumer is ordered after every node with such a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShadowRoute {
    pub shadow_node: IdString,
    pub out_channel: usize,
    pub in_node: IdString,
    pub in_channel: usize,
}

/// Input channel that receives the externally supplied final target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputRoute {
    pub node: IdString,
    pub in_channel: usize,
}

/// Immutable template for a workspace
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceDefinition {
    name: IdString,
    label: String,
    nodes: Vec<IdString>,
    routes: Vec<ChannelRoute>,
    shadow_routes: Vec<ShadowRoute>,
    output: Option<OutputRoute>,
    global_textures: Vec<TextureDefinition>,
    shadow_node: Option<IdString>,
}

impl WorkspaceDefinition {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: IdString::new(name),
            label: name.to_string(),
            nodes: Vec::new(),
            routes: Vec::new(),
            shadow_routes: Vec::new(),
            output: None,
            global_textures: Vec::new(),
            shadow_node: None,
        }
    }

    pub fn name(&self) -> IdString {
        self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Include a node even if nothing connects to it
    pub fn add_node(&mut self, node: impl Into<IdString>) -> &mut Self {
        let node = node.into();
        if !self.nodes.contains(&node) {
            self.nodes.push(node);
        }
        self
    }

    /// Feed `out_channel` of `out_node` into `in_channel` of `in_node`.
    ///
    /// Node definitions must exist by the time a workspace is built from
    /// this definition, not when the connection is declared.
    pub fn connect(
        &mut self,
        out_node: impl Into<IdString>,
        out_channel: usize,
        in_node: impl Into<IdString>,
        in_channel: usize,
    ) -> &mut Self {
        let out_node = out_node.into();
        let in_node = in_node.into();
        self.add_node(out_node);
        self.add_node(in_node);
        self.routes.push(ChannelRoute {
            out_node,
            out_channel,
            in_node,
            in_channel,
        });
        self
    }

    /// Feed `out_channel` of shadow node `shadow_node` into `in_channel` of
    /// `in_node`, e.g. for post-processing reflective shadow maps.
    pub fn connect_shadow_output(
        &mut self,
        shadow_node: impl Into<IdString>,
        out_channel: usize,
        in_node: impl Into<IdString>,
        in_channel: usize,
    ) -> &mut Self {
        let in_node = in_node.into();
        self.add_node(in_node);
        self.shadow_routes.push(ShadowRoute {
            shadow_node: shadow_node.into(),
            out_channel,
            in_node,
            in_channel,
        });
        self
    }

    /// Bind the final render target to `in_channel` of `node`
    pub fn connect_output(&mut self, node: impl Into<IdString>, in_channel: usize) -> &mut Self {
        let node = node.into();
        self.add_node(node);
        self.output = Some(OutputRoute { node, in_channel });
        self
    }

    /// Declare a texture visible to every node of the workspace.
    ///
    /// The name must carry the `global_` prefix.
    pub fn add_global_texture(&mut self, texture: TextureDefinition) -> CompositorResult<usize> {
        if !is_global_name(&texture.label) {
            return Err(CompositorError::GlobalPrefixRequired {
                name: texture.label,
            });
        }
        if self.global_textures.iter().any(|t| t.name == texture.name) {
            return Err(CompositorError::DuplicateName {
                kind: "global texture",
                name: texture.label,
            });
        }
        self.global_textures.push(texture);
        Ok(self.global_textures.len() - 1)
    }

    /// Shadow node used by helpers such as the basic workspace
    pub fn set_shadow_node(&mut self, shadow_node: Option<IdString>) -> &mut Self {
        self.shadow_node = shadow_node;
        self
    }

    pub fn shadow_node(&self) -> Option<IdString> {
        self.shadow_node
    }

    /// Nodes in the order they were first mentioned
    pub fn nodes(&self) -> &[IdString] {
        &self.nodes
    }

    pub fn routes(&self) -> &[ChannelRoute] {
        &self.routes
    }

    pub fn shadow_routes(&self) -> &[ShadowRoute] {
        &self.shadow_routes
    }

    pub fn output(&self) -> Option<OutputRoute> {
        self.output
    }

    pub fn global_textures(&self) -> &[TextureDefinition] {
        &self.global_textures
    }

    /// Drop every node-to-node and shadow connection, keeping nodes and the
    /// output route
    pub fn clear_connections(&mut self) {
        self.routes.clear();
        self.shadow_routes.clear();
    }
}
