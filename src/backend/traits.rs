//! Render system abstraction
//!
//! The compositor never talks to a graphics API directly. Everything it needs
//! from the GPU side goes through [`RenderSystem`].

use crate::backend::types::*;
use thiserror::Error;

/// Render system error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create render target: {0}")]
    TargetCreationFailed(String),
    #[error("Failed to create fullscreen geometry: {0}")]
    GeometryCreationFailed(String),
    #[error("Invalid render target handle {0:?}")]
    InvalidHandle(RenderTargetHandle),
    #[error("Attachment {attachment} is incompatible: {reason}")]
    IncompatibleAttachment { attachment: usize, reason: String },
    #[error("Failed to resolve: {0}")]
    ResolveFailed(String),
    #[error("Failed to present: {0}")]
    PresentFailed(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Render target capability the compositor drives.
///
/// Implementations own every target and geometry they hand out; the
/// compositor only keeps handles and returns them through the `destroy_*`
/// methods. All calls happen on the render thread.
pub trait RenderSystem {
    /// Name used in log output
    fn name(&self) -> &str;

    // Targets

    /// Create a render target
    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> BackendResult<RenderTargetHandle>;

    /// Destroy a render target
    fn destroy_render_target(&mut self, target: RenderTargetHandle);

    /// Report width, height, format and sample count of a target
    fn target_info(&self, target: RenderTargetHandle) -> BackendResult<RenderTargetInfo>;

    /// Bind colour attachments as the active draw destination.
    ///
    /// Attachment 0 is the primary target. Every further attachment must
    /// match its width, height and format, otherwise
    /// [`BackendError::IncompatibleAttachment`] is returned.
    fn bind_render_target(&mut self, attachments: &[RenderTargetHandle]) -> BackendResult<()>;

    /// Attach an external depth/stencil buffer to a target
    fn attach_depth_buffer(
        &mut self,
        target: RenderTargetHandle,
        depth: RenderTargetHandle,
    ) -> BackendResult<()>;

    /// Detach the depth/stencil buffer of a target, if any
    fn detach_depth_buffer(&mut self, target: RenderTargetHandle);

    /// Resolve a multisampled target into a single-sampled one
    fn resolve(
        &mut self,
        source: RenderTargetHandle,
        destination: RenderTargetHandle,
    ) -> BackendResult<()>;

    /// Present the target (swap front and back buffers)
    fn swap_buffers(&mut self, target: RenderTargetHandle) -> BackendResult<()>;

    // Geometry

    /// Create geometry covering the whole viewport
    fn create_fullscreen_geometry(
        &mut self,
        kind: FullscreenGeometry,
        label: &str,
    ) -> BackendResult<GeometryHandle>;

    /// Destroy fullscreen geometry
    fn destroy_fullscreen_geometry(&mut self, geometry: GeometryHandle);

    // Commands recorded against the bound target

    /// Clear the bound target
    fn clear(&mut self, buffers: ClearBuffers, value: &ClearValue);

    /// Set stencil state for subsequent draws
    fn set_stencil_state(&mut self, state: &StencilState);

    /// Draw fullscreen geometry
    fn draw_fullscreen(&mut self, draw: &QuadDraw);

    /// Render a scene through a camera
    fn render_scene(&mut self, draw: &SceneDraw);
}
