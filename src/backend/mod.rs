//! Render system abstraction layer
//!
//! The compositor schedules work; a [`RenderSystem`] owns the GPU targets and
//! turns the recorded commands into API calls.
//!
//! # Available render systems
//!
//! - `dummy` (default feature): records commands without touching a GPU

pub mod traits;
pub mod types;

#[cfg(feature = "dummy")]
pub mod dummy;

pub use traits::*;
pub use types::*;

#[cfg(feature = "dummy")]
pub use dummy::{DummyRenderSystem, RenderCommand};
