//! CPU kernel selection
//!
//! The kernels are compiled once per instruction set tier. The widest tier
//! the CPU supports is bound when the first device is created and stays
//! bound for the rest of the process.
//!
//! The kernel entry points are `#[inline]` so their bodies are generated
//! inside each tier's `target_feature` wrapper. Functions they call that are
//! not inlined run the baseline build on every tier.

use crate::error::DeviceError;
use half::f16;
use kernel::integrator::{path_trace, shader_eval, ShaderEvalType, ShaderInput, ThreadContext};
use kernel::math::Float;
use kernel::scene::KernelGlobals;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Instruction set tiers, narrowest first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KernelIsa {
    Scalar,
    Sse2,
    Sse3,
    Sse41,
    Avx,
    Avx2,
}

impl KernelIsa {
    /// All tiers, widest first.
    pub const PRIORITY: [KernelIsa; 6] = [Self::Avx2, Self::Avx, Self::Sse41, Self::Sse3, Self::Sse2, Self::Scalar];

    /// Returns true if the running CPU can execute this tier.
    pub fn is_supported(&self) -> bool {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            match self {
                Self::Scalar => true,
                Self::Sse2 => is_x86_feature_detected!("sse2"),
                Self::Sse3 => is_x86_feature_detected!("sse3"),
                Self::Sse41 => is_x86_feature_detected!("sse4.1"),
                Self::Avx => is_x86_feature_detected!("avx"),
                Self::Avx2 => is_x86_feature_detected!("avx2"),
            }
        }
        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
        {
            *self == Self::Scalar
        }
    }

    /// Widest tier the running CPU supports.
    pub fn detect() -> Self {
        Self::PRIORITY
            .into_iter()
            .find(|isa| isa.is_supported())
            .unwrap_or(Self::Scalar)
    }
}

impl fmt::Display for KernelIsa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scalar => "scalar",
            Self::Sse2 => "SSE2",
            Self::Sse3 => "SSE3",
            Self::Sse41 => "SSE4.1",
            Self::Avx => "AVX",
            Self::Avx2 => "AVX2",
        };
        write!(f, "{name}")
    }
}

impl FromStr for KernelIsa {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scalar" | "none" => Ok(Self::Scalar),
            "sse2" => Ok(Self::Sse2),
            "sse3" => Ok(Self::Sse3),
            "sse41" | "sse4.1" => Ok(Self::Sse41),
            "avx" => Ok(Self::Avx),
            "avx2" => Ok(Self::Avx2),
            _ => Err(format!("unknown instruction set '{s}'")),
        }
    }
}

/// Kernels of one instruction set tier.
pub trait CpuKernels: Send + Sync {
    /// Tier the kernels were compiled for.
    fn isa(&self) -> KernelIsa;

    /// Trace one sample of one pixel.
    ///
    /// * `kg`        - Kernel globals.
    /// * `ctx`       - Thread context.
    /// * `buffer`    - Tile render buffer.
    /// * `rng_state` - Tile seeds.
    /// * `sample`    - Sample index.
    /// * `x`         - Pixel x.
    /// * `y`         - Pixel y.
    /// * `offset`    - Tile buffer offset.
    /// * `stride`    - Tile buffer stride.
    #[allow(clippy::too_many_arguments)]
    fn path_trace(
        &self,
        kg: &KernelGlobals,
        ctx: &mut ThreadContext,
        buffer: &mut [Float],
        rng_state: &mut [u32],
        sample: u32,
        x: usize,
        y: usize,
        offset: isize,
        stride: usize,
    );

    /// Convert an accumulated pixel to sRGB bytes.
    fn convert_to_byte(&self, rgba: &[Float], sample_scale: Float, exposure: Float) -> [u8; 4];

    /// Convert an accumulated pixel to half floats.
    fn convert_to_half_float(&self, rgba: &[Float], sample_scale: Float, exposure: Float) -> [f16; 4];

    /// Evaluate one shader input.
    fn shader(
        &self,
        kg: &KernelGlobals,
        eval_type: ShaderEvalType,
        input: &ShaderInput,
        output: &mut [Float; 4],
        sample: u32,
    );
}

/// Portable kernels.
struct ScalarKernels;

impl CpuKernels for ScalarKernels {
    fn isa(&self) -> KernelIsa {
        KernelIsa::Scalar
    }

    fn path_trace(
        &self,
        kg: &KernelGlobals,
        ctx: &mut ThreadContext,
        buffer: &mut [Float],
        rng_state: &mut [u32],
        sample: u32,
        x: usize,
        y: usize,
        offset: isize,
        stride: usize,
    ) {
        path_trace(kg, ctx, buffer, rng_state, sample, x, y, offset, stride);
    }

    fn convert_to_byte(&self, rgba: &[Float], sample_scale: Float, exposure: Float) -> [u8; 4] {
        kernel::film::convert_to_byte(rgba, sample_scale, exposure)
    }

    fn convert_to_half_float(&self, rgba: &[Float], sample_scale: Float, exposure: Float) -> [f16; 4] {
        kernel::film::convert_to_half_float(rgba, sample_scale, exposure)
    }

    fn shader(
        &self,
        kg: &KernelGlobals,
        eval_type: ShaderEvalType,
        input: &ShaderInput,
        output: &mut [Float; 4],
        sample: u32,
    ) {
        shader_eval(kg, eval_type, input, output, sample);
    }
}

/// Kernels for one x86 tier. Entry points are compiled with the tier's
/// target features; they are only reachable through `kernels_for`, which
/// checks the CPU first.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
macro_rules! x86_kernels {
    ($name:ident, $isa:expr, $feature:literal) => {
        struct $name;

        impl $name {
            #[target_feature(enable = $feature)]
            #[allow(clippy::too_many_arguments)]
            unsafe fn path_trace_impl(
                kg: &KernelGlobals,
                ctx: &mut ThreadContext,
                buffer: &mut [Float],
                rng_state: &mut [u32],
                sample: u32,
                x: usize,
                y: usize,
                offset: isize,
                stride: usize,
            ) {
                path_trace(kg, ctx, buffer, rng_state, sample, x, y, offset, stride);
            }

            #[target_feature(enable = $feature)]
            unsafe fn convert_to_byte_impl(rgba: &[Float], sample_scale: Float, exposure: Float) -> [u8; 4] {
                kernel::film::convert_to_byte(rgba, sample_scale, exposure)
            }

            #[target_feature(enable = $feature)]
            unsafe fn convert_to_half_float_impl(rgba: &[Float], sample_scale: Float, exposure: Float) -> [f16; 4] {
                kernel::film::convert_to_half_float(rgba, sample_scale, exposure)
            }

            #[target_feature(enable = $feature)]
            unsafe fn shader_impl(
                kg: &KernelGlobals,
                eval_type: ShaderEvalType,
                input: &ShaderInput,
                output: &mut [Float; 4],
                sample: u32,
            ) {
                shader_eval(kg, eval_type, input, output, sample);
            }
        }

        impl CpuKernels for $name {
            fn isa(&self) -> KernelIsa {
                $isa
            }

            fn path_trace(
                &self,
                kg: &KernelGlobals,
                ctx: &mut ThreadContext,
                buffer: &mut [Float],
                rng_state: &mut [u32],
                sample: u32,
                x: usize,
                y: usize,
                offset: isize,
                stride: usize,
            ) {
                // SAFETY: only constructed once the CPU reported the feature.
                unsafe { Self::path_trace_impl(kg, ctx, buffer, rng_state, sample, x, y, offset, stride) }
            }

            fn convert_to_byte(&self, rgba: &[Float], sample_scale: Float, exposure: Float) -> [u8; 4] {
                // SAFETY: only constructed once the CPU reported the feature.
                unsafe { Self::convert_to_byte_impl(rgba, sample_scale, exposure) }
            }

            fn convert_to_half_float(&self, rgba: &[Float], sample_scale: Float, exposure: Float) -> [f16; 4] {
                // SAFETY: only constructed once the CPU reported the feature.
                unsafe { Self::convert_to_half_float_impl(rgba, sample_scale, exposure) }
            }

            fn shader(
                &self,
                kg: &KernelGlobals,
                eval_type: ShaderEvalType,
                input: &ShaderInput,
                output: &mut [Float; 4],
                sample: u32,
            ) {
                // SAFETY: only constructed once the CPU reported the feature.
                unsafe { Self::shader_impl(kg, eval_type, input, output, sample) }
            }
        }
    };
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
x86_kernels!(Sse2Kernels, KernelIsa::Sse2, "sse2");
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
x86_kernels!(Sse3Kernels, KernelIsa::Sse3, "sse3");
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
x86_kernels!(Sse41Kernels, KernelIsa::Sse41, "sse4.1");
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
x86_kernels!(AvxKernels, KernelIsa::Avx, "avx");
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
x86_kernels!(Avx2Kernels, KernelIsa::Avx2, "avx2");

/// Kernels for a tier, if the running CPU supports it.
///
/// * `isa` - Tier.
pub fn kernels_for(isa: KernelIsa) -> Result<&'static dyn CpuKernels, DeviceError> {
    if !isa.is_supported() {
        return Err(DeviceError::UnsupportedIsa(isa));
    }
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        let kernels: &'static dyn CpuKernels = match isa {
            KernelIsa::Scalar => &ScalarKernels,
            KernelIsa::Sse2 => &Sse2Kernels,
            KernelIsa::Sse3 => &Sse3Kernels,
            KernelIsa::Sse41 => &Sse41Kernels,
            KernelIsa::Avx => &AvxKernels,
            KernelIsa::Avx2 => &Avx2Kernels,
        };
        Ok(kernels)
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        Ok(&ScalarKernels)
    }
}

static KERNELS: OnceLock<&'static dyn CpuKernels> = OnceLock::new();

/// Bind the process wide kernels. Without `force` the widest supported
/// tier is used. Later calls return the bound kernels, or an error if they
/// force a different tier.
///
/// * `force` - Tier to use instead of the detected one.
pub fn init_kernels(force: Option<KernelIsa>) -> Result<&'static dyn CpuKernels, DeviceError> {
    if let Some(bound) = KERNELS.get() {
        return match force {
            Some(requested) if requested != bound.isa() => Err(DeviceError::KernelsBound {
                bound: bound.isa(),
                requested,
            }),
            _ => Ok(*bound),
        };
    }

    let isa = force.unwrap_or_else(KernelIsa::detect);
    let selected = kernels_for(isa)?;
    let bound = *KERNELS.get_or_init(|| selected);
    info!("Using {} CPU kernels", bound.isa());
    Ok(bound)
}

/// The bound kernels.
pub fn bound_kernels() -> Result<&'static dyn CpuKernels, DeviceError> {
    KERNELS.get().copied().ok_or(DeviceError::KernelsUnbound)
}
