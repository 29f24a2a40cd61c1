//! Dummy render system for testing and headless runs.
//!
//! This render system doesn't touch a GPU. It keeps descriptors for every
//! target it hands out, enforces the same attachment rules a framebuffer
//! backend does, and records every command so callers can inspect what a
//! frame did.

use std::collections::HashMap;

use crate::backend::traits::{BackendError, BackendResult, RenderSystem};
use crate::backend::types::*;

/// A command recorded by [`DummyRenderSystem`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Bind {
        attachments: Vec<RenderTargetHandle>,
    },
    Clear {
        target: Option<RenderTargetHandle>,
        buffers: ClearBuffers,
        value: ClearValue,
    },
    SetStencil {
        target: Option<RenderTargetHandle>,
        state: StencilState,
    },
    DrawFullscreen {
        target: Option<RenderTargetHandle>,
        draw: QuadDraw,
    },
    RenderScene {
        target: Option<RenderTargetHandle>,
        draw: SceneDraw,
    },
    Resolve {
        source: RenderTargetHandle,
        destination: RenderTargetHandle,
    },
    Swap {
        target: RenderTargetHandle,
    },
}

impl RenderCommand {
    /// Target the command wrote to, if it wrote to one.
    pub fn target(&self) -> Option<RenderTargetHandle> {
        match self {
            Self::Bind { attachments } => attachments.first().copied(),
            Self::Clear { target, .. }
            | Self::SetStencil { target, .. }
            | Self::DrawFullscreen { target, .. }
            | Self::RenderScene { target, .. } => *target,
            Self::Resolve { destination, .. } => Some(*destination),
            Self::Swap { target } => Some(*target),
        }
    }
}

#[derive(Debug)]
struct DummyTarget {
    desc: RenderTargetDesc,
    depth: Option<RenderTargetHandle>,
}

/// Dummy render system.
#[derive(Debug, Default)]
pub struct DummyRenderSystem {
    next_handle: u64,
    targets: HashMap<RenderTargetHandle, DummyTarget>,
    geometries: HashMap<GeometryHandle, FullscreenGeometry>,
    bound: Option<RenderTargetHandle>,
    commands: Vec<RenderCommand>,
    swaps: HashMap<RenderTargetHandle, usize>,
    created_targets: usize,
}

impl DummyRenderSystem {
    /// Create a new dummy render system.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_raw(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn target(&self, handle: RenderTargetHandle) -> BackendResult<&DummyTarget> {
        self.targets
            .get(&handle)
            .ok_or(BackendError::InvalidHandle(handle))
    }

    /// Every command recorded since creation or the last [`Self::take_commands`].
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    /// Drain the recorded commands.
    pub fn take_commands(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.commands)
    }

    /// How many times `target` was presented.
    pub fn swap_count(&self, target: RenderTargetHandle) -> usize {
        self.swaps.get(&target).copied().unwrap_or(0)
    }

    /// Label the target was created with.
    pub fn target_label(&self, target: RenderTargetHandle) -> Option<&str> {
        self.targets.get(&target)?.desc.label.as_deref()
    }

    /// Whether the target is still alive.
    pub fn is_live(&self, target: RenderTargetHandle) -> bool {
        self.targets.contains_key(&target)
    }

    /// Number of targets currently alive.
    pub fn live_target_count(&self) -> usize {
        self.targets.len()
    }

    /// Number of targets created over the lifetime of this render system.
    pub fn created_target_count(&self) -> usize {
        self.created_targets
    }

    /// Number of fullscreen geometries currently alive.
    pub fn live_geometry_count(&self) -> usize {
        self.geometries.len()
    }

    /// Depth buffer attached to `target`.
    pub fn depth_buffer(&self, target: RenderTargetHandle) -> Option<RenderTargetHandle> {
        self.targets.get(&target)?.depth
    }

    /// Primary attachment of the last bind.
    pub fn bound_target(&self) -> Option<RenderTargetHandle> {
        self.bound
    }
}

impl RenderSystem for DummyRenderSystem {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> BackendResult<RenderTargetHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TargetCreationFailed(format!(
                "{:?} has zero extent {}x{}",
                desc.label, desc.width, desc.height
            )));
        }
        let handle = RenderTargetHandle::from_raw(self.next_raw());
        log::trace!(
            "DummyRenderSystem: creating target {:?} ({}x{} {:?} x{})",
            desc.label,
            desc.width,
            desc.height,
            desc.format,
            desc.samples
        );
        self.targets.insert(
            handle,
            DummyTarget {
                desc: desc.clone(),
                depth: None,
            },
        );
        self.created_targets += 1;
        Ok(handle)
    }

    fn destroy_render_target(&mut self, target: RenderTargetHandle) {
        if self.targets.remove(&target).is_none() {
            log::warn!("DummyRenderSystem: destroying unknown target {:?}", target);
        }
        if self.bound == Some(target) {
            self.bound = None;
        }
    }

    fn target_info(&self, target: RenderTargetHandle) -> BackendResult<RenderTargetInfo> {
        let desc = &self.target(target)?.desc;
        Ok(RenderTargetInfo {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            samples: desc.samples,
        })
    }

    fn bind_render_target(&mut self, attachments: &[RenderTargetHandle]) -> BackendResult<()> {
        let Some(&primary) = attachments.first() else {
            return Err(BackendError::IncompatibleAttachment {
                attachment: 0,
                reason: "attachment 0 must have a surface attached".to_string(),
            });
        };
        let base = self.target_info(primary)?;
        for (index, &attachment) in attachments.iter().enumerate().skip(1) {
            let info = self.target_info(attachment)?;
            if info.width != base.width || info.height != base.height {
                return Err(BackendError::IncompatibleAttachment {
                    attachment: index,
                    reason: format!(
                        "size {}x{} differs from attachment 0 size {}x{}",
                        info.width, info.height, base.width, base.height
                    ),
                });
            }
            if info.format != base.format {
                return Err(BackendError::IncompatibleAttachment {
                    attachment: index,
                    reason: format!("format {:?} differs from {:?}", info.format, base.format),
                });
            }
        }
        self.bound = Some(primary);
        self.commands.push(RenderCommand::Bind {
            attachments: attachments.to_vec(),
        });
        Ok(())
    }

    fn attach_depth_buffer(
        &mut self,
        target: RenderTargetHandle,
        depth: RenderTargetHandle,
    ) -> BackendResult<()> {
        let colour = self.target_info(target)?;
        let depth_info = self.target_info(depth)?;
        if !depth_info.format.is_depth() {
            return Err(BackendError::IncompatibleAttachment {
                attachment: 0,
                reason: format!("{:?} is not a depth format", depth_info.format),
            });
        }
        if depth_info.width != colour.width
            || depth_info.height != colour.height
            || depth_info.samples != colour.samples
        {
            return Err(BackendError::IncompatibleAttachment {
                attachment: 0,
                reason: format!(
                    "depth buffer {}x{} x{} does not match target {}x{} x{}",
                    depth_info.width,
                    depth_info.height,
                    depth_info.samples,
                    colour.width,
                    colour.height,
                    colour.samples
                ),
            });
        }
        if let Some(entry) = self.targets.get_mut(&target) {
            entry.depth = Some(depth);
        }
        Ok(())
    }

    fn detach_depth_buffer(&mut self, target: RenderTargetHandle) {
        if let Some(entry) = self.targets.get_mut(&target) {
            entry.depth = None;
        }
    }

    fn resolve(
        &mut self,
        source: RenderTargetHandle,
        destination: RenderTargetHandle,
    ) -> BackendResult<()> {
        let src = self.target_info(source)?;
        let dst = self.target_info(destination)?;
        if !src.is_multisampled() || dst.is_multisampled() {
            return Err(BackendError::ResolveFailed(format!(
                "cannot resolve x{} into x{}",
                src.samples, dst.samples
            )));
        }
        if !src.is_attachment_compatible(&dst) {
            return Err(BackendError::ResolveFailed(format!(
                "source {}x{} {:?} does not match destination {}x{} {:?}",
                src.width, src.height, src.format, dst.width, dst.height, dst.format
            )));
        }
        self.commands.push(RenderCommand::Resolve {
            source,
            destination,
        });
        Ok(())
    }

    fn swap_buffers(&mut self, target: RenderTargetHandle) -> BackendResult<()> {
        let info = self.target_info(target)?;
        log::trace!(
            "DummyRenderSystem: presenting {:?} ({}x{})",
            target,
            info.width,
            info.height
        );
        *self.swaps.entry(target).or_insert(0) += 1;
        self.commands.push(RenderCommand::Swap { target });
        Ok(())
    }

    fn create_fullscreen_geometry(
        &mut self,
        kind: FullscreenGeometry,
        label: &str,
    ) -> BackendResult<GeometryHandle> {
        let handle = GeometryHandle::from_raw(self.next_raw());
        log::trace!("DummyRenderSystem: creating {:?} geometry '{}'", kind, label);
        self.geometries.insert(handle, kind);
        Ok(handle)
    }

    fn destroy_fullscreen_geometry(&mut self, geometry: GeometryHandle) {
        self.geometries.remove(&geometry);
    }

    fn clear(&mut self, buffers: ClearBuffers, value: &ClearValue) {
        self.commands.push(RenderCommand::Clear {
            target: self.bound,
            buffers,
            value: *value,
        });
    }

    fn set_stencil_state(&mut self, state: &StencilState) {
        self.commands.push(RenderCommand::SetStencil {
            target: self.bound,
            state: *state,
        });
    }

    fn draw_fullscreen(&mut self, draw: &QuadDraw) {
        self.commands.push(RenderCommand::DrawFullscreen {
            target: self.bound,
            draw: draw.clone(),
        });
    }

    fn render_scene(&mut self, draw: &SceneDraw) {
        self.commands.push(RenderCommand::RenderScene {
            target: self.bound,
            draw: draw.clone(),
        });
    }
}
