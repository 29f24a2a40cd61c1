//! Texture declarations and the naming rules that scope them

use crate::backend::{RenderTargetDesc, RenderTargetInfo, TextureFormat};
use crate::error::{CompositorError, CompositorResult};
use crate::id::IdString;

/// Prefix reserved for textures declared at workspace scope
pub const GLOBAL_PREFIX: &str = "global_";

/// Whether `name` refers to a workspace-global texture
pub fn is_global_name(name: &str) -> bool {
    name.starts_with(GLOBAL_PREFIX)
}

/// Reject `name` if it uses the global prefix in a node-local role
pub(crate) fn check_not_global(name: &str, usage: &'static str) -> CompositorResult<()> {
    if is_global_name(name) {
        return Err(CompositorError::ReservedName {
            name: name.to_string(),
            usage,
        });
    }
    Ok(())
}

/// A texture reference from a target or pass.
///
/// Identifiers drop the original string, so whether the name carried the
/// global prefix is recorded when the reference is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureName {
    pub id: IdString,
    pub global: bool,
}

impl TextureName {
    pub fn new(name: &str) -> Self {
        Self {
            id: IdString::new(name),
            global: is_global_name(name),
        }
    }
}

impl From<&str> for TextureName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Describes texture dimensions that can be relative to the final target
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureSize {
    /// Absolute size in pixels
    Absolute { width: u32, height: u32 },
    /// Relative to the final target size (1.0 = same size)
    Relative { width_scale: f32, height_scale: f32 },
}

impl Default for TextureSize {
    fn default() -> Self {
        TextureSize::Relative {
            width_scale: 1.0,
            height_scale: 1.0,
        }
    }
}

impl TextureSize {
    pub fn absolute(width: u32, height: u32) -> Self {
        TextureSize::Absolute { width, height }
    }

    pub fn relative(width_scale: f32, height_scale: f32) -> Self {
        TextureSize::Relative {
            width_scale,
            height_scale,
        }
    }

    /// Resolve to pixels; never returns a zero extent
    pub fn resolve(&self, final_width: u32, final_height: u32) -> (u32, u32) {
        let (width, height) = match self {
            TextureSize::Absolute { width, height } => (*width, *height),
            TextureSize::Relative {
                width_scale,
                height_scale,
            } => (
                ((final_width as f32) * width_scale) as u32,
                ((final_height as f32) * height_scale) as u32,
            ),
        };
        (width.max(1), height.max(1))
    }
}

/// A render target a node or workspace creates for itself
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDefinition {
    pub name: IdString,
    pub label: String,
    pub format: TextureFormat,
    pub size: TextureSize,
    pub samples: u32,
}

impl TextureDefinition {
    pub fn new(name: &str, format: TextureFormat, size: TextureSize) -> Self {
        Self {
            name: IdString::new(name),
            label: name.to_string(),
            format,
            size,
            samples: 1,
        }
    }

    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples.max(1);
        self
    }

    /// Descriptor for creating this texture next to `final_target`
    pub fn descriptor(&self, final_target: &RenderTargetInfo) -> RenderTargetDesc {
        let (width, height) = self.size.resolve(final_target.width, final_target.height);
        RenderTargetDesc::new(width, height, self.format)
            .with_label(self.label.clone())
            .with_samples(self.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_prefix() {
        assert!(is_global_name("global_shadow"));
        assert!(!is_global_name("myglobal_shadow"));
        assert!(check_not_global("rt0", "local texture").is_ok());
        assert!(matches!(
            check_not_global("global_rt", "local texture"),
            Err(CompositorError::ReservedName { .. })
        ));
    }

    #[test]
    fn test_texture_name_records_scope() {
        assert!(TextureName::new("global_gbuffer").global);
        assert!(!TextureName::from("gbuffer").global);
        assert_eq!(TextureName::new("rt").id, IdString::new("rt"));
    }

    #[test]
    fn test_relative_size() {
        let size = TextureSize::relative(0.5, 0.25);
        assert_eq!(size.resolve(1920, 1080), (960, 270));
        assert_eq!(TextureSize::relative(0.0, 0.0).resolve(100, 100), (1, 1));
        assert_eq!(TextureSize::absolute(512, 512).resolve(1920, 1080), (512, 512));
    }

    #[test]
    fn test_descriptor() {
        let final_target = RenderTargetInfo {
            width: 800,
            height: 600,
            format: TextureFormat::Bgra8Unorm,
            samples: 1,
        };
        let desc = TextureDefinition::new("half", TextureFormat::Rgba16Float, TextureSize::relative(0.5, 0.5))
            .with_samples(4)
            .descriptor(&final_target);
        assert_eq!((desc.width, desc.height), (400, 300));
        assert_eq!(desc.format, TextureFormat::Rgba16Float);
        assert_eq!(desc.samples, 4);
        assert_eq!(desc.label.as_deref(), Some("half"));
    }
}
