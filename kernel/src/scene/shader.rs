//! Shader table

use crate::film::hash_name_float;
use crate::math::*;
use crate::shader::ShaderFlags;

/// Per-closure-category counts used for sample and bounce hints.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClosureCounts {
    /// Diffuse closures.
    pub diffuse: u32,

    /// Glossy closures.
    pub glossy: u32,

    /// Transmission closures.
    pub transmission: u32,
}

impl ClosureCounts {
    /// Returns counts with every category set to `n`.
    ///
    /// * `n` - Count.
    pub const fn uniform(n: u32) -> Self {
        Self {
            diffuse: n,
            glossy: n,
            transmission: n,
        }
    }
}

/// Constant per-shader parameters read by the kernel.
#[derive(Clone, Debug, PartialEq)]
pub struct KernelShader {
    /// Name of the shader.
    pub name: String,

    /// Shader flags.
    pub flags: ShaderFlags,

    /// Material pass index.
    pub pass_id: u32,

    /// Alpha used by ambient occlusion rays.
    pub ao_alpha: Float,

    /// Alpha used by shadow rays.
    pub shadow_alpha: Float,

    /// Sample count hints.
    pub samples: ClosureCounts,

    /// Bounce limits used with `ShaderFlags::OVERRIDE_BOUNCES`.
    pub bounces: ClosureCounts,

    /// Cryptomatte identifier derived from the name.
    pub cryptomatte_id: Float,

    /// Scale applied to volume velocity motion blur.
    pub velocity_scale: Float,
}

impl KernelShader {
    /// Create a shader entry.
    ///
    /// * `name`  - Shader name.
    /// * `flags` - Shader flags.
    pub fn new(name: &str, flags: ShaderFlags) -> Self {
        Self {
            name: String::from(name),
            flags,
            pass_id: 0,
            ao_alpha: 1.0,
            shadow_alpha: 1.0,
            samples: ClosureCounts::uniform(1),
            bounces: ClosureCounts::uniform(0),
            cryptomatte_id: hash_name_float(name),
            velocity_scale: 1.0,
        }
    }
}
