//! Resource binding for workspace construction
//!
//! The binder turns a workspace definition into concrete wiring: it checks
//! every connection against the node definitions, orders the node graph and
//! hands each node input the handle produced by the node feeding it. Global
//! textures live in a [`TexturePool`] owned by the workspace.

use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::backend::{RenderSystem, RenderTargetHandle, RenderTargetInfo};
use crate::compositor::node::NodeInstance;
use crate::compositor::node_def::NodeDefinition;
use crate::compositor::shadow_node::ShadowNodeSet;
use crate::compositor::texture::TextureDefinition;
use crate::compositor::workspace_def::WorkspaceDefinition;
use crate::error::{CompositorError, CompositorResult};
use crate::id::IdString;

/// Global textures of a workspace, created at build time and destroyed with it
#[derive(Debug, Default)]
pub struct TexturePool {
    textures: HashMap<IdString, RenderTargetHandle>,
    order: Vec<IdString>,
}

impl TexturePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create every texture in `definitions`, sized against `final_target`
    pub fn create<R: RenderSystem>(
        &mut self,
        definitions: &[TextureDefinition],
        final_target: &RenderTargetInfo,
        rs: &mut R,
    ) -> CompositorResult<()> {
        for definition in definitions {
            let handle = rs.create_render_target(&definition.descriptor(final_target))?;
            log::debug!("Created global texture '{}' {:?}", definition.label, handle);
            self.textures.insert(definition.name, handle);
            self.order.push(definition.name);
        }
        Ok(())
    }

    pub fn get(&self, name: IdString) -> Option<RenderTargetHandle> {
        self.textures.get(&name).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Textures in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (IdString, RenderTargetHandle)> + '_ {
        self.order.iter().map(move |name| (*name, self.textures[name]))
    }

    pub fn destroy<R: RenderSystem>(&mut self, rs: &mut R) {
        for name in self.order.drain(..) {
            if let Some(handle) = self.textures.remove(&name) {
                rs.destroy_render_target(handle);
            }
        }
    }
}

/// Why [`topological_order`] could not order a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GraphOrderError {
    #[error("edge {from} -> {to} is outside a graph of {node_count} nodes")]
    EdgeOutOfRange {
        from: usize,
        to: usize,
        node_count: usize,
    },
    /// `node` is the lowest index that could not be scheduled
    #[error("node {node} is part of a cycle")]
    Cycle { node: usize },
}

/// Topological order of `node_count` nodes given `(from, to)` edges.
///
/// Kahn's algorithm; among ready nodes the lowest index goes first, so the
/// result is deterministic and keeps declaration order where the graph
/// allows it.
pub fn topological_order(
    node_count: usize,
    edges: &[(usize, usize)],
) -> Result<Vec<usize>, GraphOrderError> {
    let mut in_degree = vec![0usize; node_count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for &(from, to) in edges {
        if from >= node_count || to >= node_count {
            return Err(GraphOrderError::EdgeOutOfRange {
                from,
                to,
                node_count,
            });
        }
        in_degree[to] += 1;
        dependents[from].push(to);
    }

    let mut ready: Vec<usize> = (0..node_count).filter(|&n| in_degree[n] == 0).collect();
    let mut order = Vec::with_capacity(node_count);

    while !ready.is_empty() {
        let next = ready.remove(0);
        order.push(next);
        for &dependent in &dependents[next] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                let position = ready.partition_point(|&n| n < dependent);
                ready.insert(position, dependent);
            }
        }
    }

    if order.len() != node_count {
        let node = (0..node_count).find(|n| in_degree[*n] > 0).unwrap_or(0);
        return Err(GraphOrderError::Cycle { node });
    }
    Ok(order)
}

/// Resolves a workspace definition's connections against node definitions
pub struct ResourceBinder<'a> {
    workspace: &'a WorkspaceDefinition,
    nodes: Vec<Rc<NodeDefinition>>,
    index: HashMap<IdString, usize>,
}

impl<'a> ResourceBinder<'a> {
    /// Look up every node of `workspace` and check all connections.
    ///
    /// Fails with `NotFound` for unknown nodes and `Validation` for channel
    /// indices out of range or an input channel fed twice.
    pub fn new(
        workspace: &'a WorkspaceDefinition,
        lookup: impl Fn(IdString) -> Option<Rc<NodeDefinition>>,
    ) -> CompositorResult<Self> {
        let mut nodes = Vec::with_capacity(workspace.nodes().len());
        let mut index = HashMap::new();
        for (i, name) in workspace.nodes().iter().enumerate() {
            let definition =
                lookup(*name).ok_or_else(|| CompositorError::not_found("node definition", *name))?;
            definition.validate()?;
            index.insert(*name, i);
            nodes.push(definition);
        }

        let binder = Self {
            workspace,
            nodes,
            index,
        };
        binder.check_routes()?;
        Ok(binder)
    }

    fn check_routes(&self) -> CompositorResult<()> {
        let mut fed: HashMap<(usize, usize), usize> = HashMap::new();
        for (route_index, route) in self.workspace.routes().iter().enumerate() {
            let source = &self.nodes[self.index[&route.out_node]];
            let destination = &self.nodes[self.index[&route.in_node]];
            if route.out_channel >= source.num_outputs() {
                return Err(CompositorError::validation(
                    self.workspace.label(),
                    format!(
                        "connection {route_index}: node '{}' has no output channel {}",
                        source.label(),
                        route.out_channel
                    ),
                ));
            }
            if route.in_channel >= destination.num_inputs() {
                return Err(CompositorError::validation(
                    self.workspace.label(),
                    format!(
                        "connection {route_index}: node '{}' has no input channel {}",
                        destination.label(),
                        route.in_channel
                    ),
                ));
            }
            let key = (self.index[&route.in_node], route.in_channel);
            if let Some(previous) = fed.insert(key, route_index) {
                return Err(CompositorError::validation(
                    self.workspace.label(),
                    format!(
                        "input channel {} of node '{}' is fed by connections {previous} and {route_index}",
                        route.in_channel,
                        destination.label()
                    ),
                ));
            }
        }

        for route in self.workspace.shadow_routes() {
            let destination = &self.nodes[self.index[&route.in_node]];
            if route.in_channel >= destination.num_inputs() {
                return Err(CompositorError::validation(
                    self.workspace.label(),
                    format!(
                        "shadow node {} feeds missing input channel {} of node '{}'",
                        route.shadow_node,
                        route.in_channel,
                        destination.label()
                    ),
                ));
            }
            let key = (self.index[&route.in_node], route.in_channel);
            if fed.insert(key, usize::MAX).is_some() {
                return Err(CompositorError::validation(
                    self.workspace.label(),
                    format!(
                        "input channel {} of node '{}' is fed by more than one source",
                        route.in_channel,
                        destination.label()
                    ),
                ));
            }
        }

        if let Some(output) = self.workspace.output() {
            let node = &self.nodes[self.index[&output.node]];
            if output.in_channel >= node.num_inputs() {
                return Err(CompositorError::validation(
                    self.workspace.label(),
                    format!(
                        "final target goes to missing input channel {} of node '{}'",
                        output.in_channel,
                        node.label()
                    ),
                ));
            }
            let key = (self.index[&output.node], output.in_channel);
            if fed.contains_key(&key) {
                return Err(CompositorError::validation(
                    self.workspace.label(),
                    format!(
                        "input channel {} of node '{}' is fed by both a connection and the final target",
                        output.in_channel,
                        node.label()
                    ),
                ));
            }
        } else {
            log::warn!(
                "Workspace definition '{}' has no output connection",
                self.workspace.label()
            );
        }
        Ok(())
    }

    /// Node definitions, indexed like `WorkspaceDefinition::nodes`
    pub fn node_definitions(&self) -> &[Rc<NodeDefinition>] {
        &self.nodes
    }

    pub fn node_index(&self, name: IdString) -> Option<usize> {
        self.index.get(&name).copied()
    }

    /// Order in which nodes must execute so every input is written first.
    ///
    /// A node reading a shadow node output runs after every other node whose
    /// scene passes trigger that shadow node.
    pub fn execution_order(&self) -> CompositorResult<Vec<usize>> {
        let mut edges: Vec<(usize, usize)> = self
            .workspace
            .routes()
            .iter()
            .map(|route| (self.index[&route.out_node], self.index[&route.in_node]))
            .collect();
        for route in self.workspace.shadow_routes() {
            let consumer = self.index[&route.in_node];
            for (producer, node) in self.nodes.iter().enumerate() {
                if producer != consumer && node.shadow_nodes().contains(&route.shadow_node) {
                    edges.push((producer, consumer));
                }
            }
        }
        topological_order(self.nodes.len(), &edges).map_err(|err| match err {
            GraphOrderError::Cycle { node } => CompositorError::CyclicGraph {
                workspace: self.workspace.label().to_string(),
                node: self.nodes[node].label().to_string(),
            },
            GraphOrderError::EdgeOutOfRange { .. } => {
                CompositorError::validation(self.workspace.label(), err.to_string())
            }
        })
    }

    /// Bind the final render target to the output route, if any
    pub fn bind_output(
        &self,
        nodes: &mut [NodeInstance],
        final_target: RenderTargetHandle,
    ) -> CompositorResult<()> {
        if let Some(output) = self.workspace.output() {
            let node = self.index[&output.node];
            nodes[node].connect_input(output.in_channel, final_target)?;
        }
        Ok(())
    }

    /// Bind every input of `node` from the connections feeding it.
    ///
    /// Sources must already be bound, which holds when nodes are visited in
    /// [`Self::execution_order`] after the shadow nodes were created.
    pub fn bind_inputs(
        &self,
        node: usize,
        nodes: &mut [NodeInstance],
        shadows: &ShadowNodeSet,
    ) -> CompositorResult<()> {
        for route in self.workspace.shadow_routes() {
            if self.index[&route.in_node] != node {
                continue;
            }
            let handle = shadows
                .get(route.shadow_node)
                .ok_or_else(|| CompositorError::not_found("shadow node", route.shadow_node))?
                .output(route.out_channel)
                .ok_or_else(|| {
                    CompositorError::validation(
                        self.workspace.label(),
                        format!(
                            "shadow node {} has no texture on output channel {}",
                            route.shadow_node, route.out_channel
                        ),
                    )
                })?;
            nodes[node].connect_input(route.in_channel, handle)?;
        }
        for route in self.workspace.routes() {
            if self.index[&route.in_node] != node {
                continue;
            }
            let source = self.index[&route.out_node];
            let handle = nodes[source].output(route.out_channel).ok_or_else(|| {
                CompositorError::validation(
                    self.nodes[source].label(),
                    format!("output channel {} has no texture bound", route.out_channel),
                )
            })?;
            nodes[node].connect_input(route.in_channel, handle)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_order() {
        let order = topological_order(3, &[(0, 1), (1, 2)]).unwrap();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_reverse_declaration() {
        // c -> b -> a declared in reverse
        let order = topological_order(3, &[(2, 1), (1, 0)]).unwrap();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_diamond() {
        let order = topological_order(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]).unwrap();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_independent_nodes_keep_declaration_order() {
        let order = topological_order(3, &[]).unwrap();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_cycle_detected() {
        assert_eq!(
            topological_order(2, &[(0, 1), (1, 0)]),
            Err(GraphOrderError::Cycle { node: 0 })
        );
        assert_eq!(
            topological_order(3, &[(0, 1), (1, 2), (2, 1)]),
            Err(GraphOrderError::Cycle { node: 1 })
        );
    }

    #[test]
    fn test_edge_out_of_range() {
        assert_eq!(
            topological_order(2, &[(0, 1), (1, 5)]),
            Err(GraphOrderError::EdgeOutOfRange {
                from: 1,
                to: 5,
                node_count: 2
            })
        );
        assert!(topological_order(0, &[(0, 0)]).is_err());
    }

    #[test]
    fn test_self_loop_detected() {
        assert!(topological_order(1, &[(0, 0)]).is_err());
    }
}
