//! Types shared between the compositor and render system implementations

use bitflags::bitflags;
use glam::{Mat4, Vec4};

use crate::id::IdString;

/// Pixel format of a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    R32Float,
    Rg32Float,
    Depth16Unorm,
    Depth32Float,
    Depth24PlusStencil8,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth16Unorm
                | TextureFormat::Depth32Float
                | TextureFormat::Depth24PlusStencil8
        )
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, TextureFormat::Depth24PlusStencil8)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Depth16Unorm => 2,
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Depth32Float
            | TextureFormat::Depth24PlusStencil8
            | TextureFormat::R32Float => 4,
            TextureFormat::Rgba16Float | TextureFormat::Rg32Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

/// Handle to a render target owned by a render system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderTargetHandle(u64);

impl RenderTargetHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Handle to fullscreen geometry owned by a render system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryHandle(u64);

impl GeometryHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Shape used to cover the whole viewport in quad passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FullscreenGeometry {
    /// Single oversized triangle; cheapest when no per-corner data is needed
    #[default]
    Triangle,
    /// Two-triangle quad; needed when corners carry camera frustum rays
    Quad,
}

/// Render target descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDesc {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub samples: u32,
}

impl RenderTargetDesc {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: None,
            width,
            height,
            format,
            samples: 1,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples.max(1);
        self
    }
}

/// Properties a render system reports for a live target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetInfo {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub samples: u32,
}

impl RenderTargetInfo {
    pub fn is_multisampled(&self) -> bool {
        self.samples > 1
    }

    /// Width over height; 1.0 for a degenerate target
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Whether two targets can be bound together as colour attachments
    pub fn is_attachment_compatible(&self, other: &RenderTargetInfo) -> bool {
        self.width == other.width && self.height == other.height && self.format == other.format
    }
}

bitflags! {
    /// Buffers affected by a clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearBuffers: u32 {
        const COLOUR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
        const ALL = Self::COLOUR.bits() | Self::DEPTH.bits() | Self::STENCIL.bits();
    }
}

/// Values written by a clear
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValue {
    pub colour: Vec4,
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearValue {
    fn default() -> Self {
        Self {
            colour: Vec4::new(0.2, 0.4, 0.6, 1.0),
            depth: 1.0,
            stencil: 0,
        }
    }
}

impl ClearValue {
    pub fn colour(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self {
            colour: Vec4::new(r, g, b, a),
            ..Default::default()
        }
    }
}

/// Comparison used by stencil tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

/// Operation applied to the stencil buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StencilOperation {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

/// Stencil state set by stencil passes; stays active for the following passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilState {
    pub enabled: bool,
    pub reference: u32,
    pub read_mask: u32,
    pub write_mask: u32,
    pub compare: CompareFunction,
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            enabled: false,
            reference: 0,
            read_mask: 0xFFFF_FFFF,
            write_mask: 0xFFFF_FFFF,
            compare: CompareFunction::Always,
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
        }
    }
}

/// Fullscreen draw issued by a quad pass into the bound target
#[derive(Debug, Clone, PartialEq)]
pub struct QuadDraw {
    pub geometry: GeometryHandle,
    pub material: IdString,
    pub textures: Vec<RenderTargetHandle>,
}

/// Scene draw issued by a scene pass into the bound target
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDraw {
    pub scene: IdString,
    pub camera: IdString,
    pub view_projection: Mat4,
    pub first_render_queue: u8,
    pub last_render_queue: u8,
    pub visibility_mask: u32,
    pub shadow_textures: Vec<RenderTargetHandle>,
}
