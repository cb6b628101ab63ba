//! Node shaders
//!
//! A small fixed-function shader graph: every shader is a list of weighted
//! closure nodes for the surface, another for the volume and an optional
//! displacement height. Inputs are constant colours, image textures or a
//! procedural checker.

use super::*;
use crate::closure::*;
use crate::geometry::*;
use crate::math::*;
use crate::path_state::{PathRayFlags, PathState};
use crate::scene::KernelGlobals;
use crate::spectrum::*;
use crate::texture::TextureLookup;

/// Colour input of a node.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ColorInput {
    /// Constant colour.
    Constant(Spectrum),

    /// Image texture looked up with the mesh texture coordinates, or the
    /// barycentric coordinates when the mesh has none.
    Image { slot: usize },

    /// 3D checker pattern in world space.
    Checker { a: Spectrum, b: Spectrum, scale: Float },
}

impl From<Spectrum> for ColorInput {
    fn from(c: Spectrum) -> Self {
        Self::Constant(c)
    }
}

impl ColorInput {
    /// Evaluate the input at a shading point.
    ///
    /// * `kg` - Kernel globals.
    /// * `sd` - Shading point.
    pub fn eval(&self, kg: &KernelGlobals, sd: &ShaderData) -> Spectrum {
        match *self {
            Self::Constant(c) => c,
            Self::Image { slot } => {
                let (st, footprint) = texture_coordinate(kg, sd);
                let [r, g, b, _] = kg.lookup(slot, st.x, st.y, footprint);
                Spectrum::from([r, g, b])
            }
            Self::Checker { a, b, scale } => {
                let p = sd.p * scale;
                let parity = p.x.floor() as i64 + p.y.floor() as i64 + p.z.floor() as i64;
                if parity.rem_euclid(2) == 0 {
                    a
                } else {
                    b
                }
            }
        }
    }
}

/// Texture coordinate of a shading point and its screen footprint.
fn texture_coordinate(kg: &KernelGlobals, sd: &ShaderData) -> (Point2f, Float) {
    let uv = sd
        .prim
        .and_then(|prim| kg.data.prim_triangle(prim))
        .and_then(|(mesh, tri)| mesh.uv(tri, sd.u, sd.v));
    match uv {
        Some((st, dst_du, dst_dv)) => {
            let dx = dst_du * sd.du.dx + dst_dv * sd.dv.dx;
            let dy = dst_du * sd.du.dy + dst_dv * sd.dv.dy;
            let footprint = (dx.x * dx.x + dx.y * dx.y)
                .sqrt()
                .max((dy.x * dy.x + dy.y * dy.y).sqrt());
            (st, footprint)
        }
        None => {
            let footprint = sd.du.dx.abs().max(sd.du.dy.abs()).max(sd.dv.dx.abs().max(sd.dv.dy.abs()));
            (Point2f::new(sd.u, sd.v), footprint)
        }
    }
}

/// Dielectric Fresnel reflectance for unpolarized light.
///
/// * `cosi` - Cosine between the incoming direction and the normal.
/// * `eta`  - Relative index of refraction.
fn fresnel_dielectric_cos(cosi: Float, eta: Float) -> Float {
    let c = cosi.abs();
    let g = eta * eta - 1.0 + c * c;
    if g <= 0.0 {
        return 1.0;
    }
    let g = g.sqrt();
    let a = (g - c) / (g + c);
    let b = (c * (g + c) - 1.0) / (c * (g - c) + 1.0);
    0.5 * a * a * (1.0 + b * b)
}

/// A node that produces closures.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ClosureNode {
    /// Diffuse reflection; Oren-Nayar when rough.
    Diffuse { color: ColorInput, roughness: Float },

    /// Diffuse transmission.
    Translucent { color: ColorInput },

    /// Glossy reflection; a mirror when the roughness is 0.
    Glossy { color: ColorInput, roughness: Float },

    /// Refraction only.
    Refraction { color: ColorInput, roughness: Float, ior: Float },

    /// Reflection and refraction split by Fresnel.
    Glass { color: ColorInput, roughness: Float, ior: Float },

    /// Transparency.
    Transparent { color: ColorInput },

    /// Subsurface scattering.
    Subsurface {
        color: ColorInput,
        radius: Spectrum,
        texture_blur: Float,
    },

    /// Emission.
    Emission { color: ColorInput, strength: Float },

    /// World background.
    Background { color: ColorInput, strength: Float },

    /// Holdout.
    Holdout,

    /// Ambient occlusion.
    AmbientOcclusion { color: ColorInput },

    /// Scattering volume.
    VolumeScatter {
        color: ColorInput,
        density: Float,
        anisotropy: Float,
    },

    /// Absorbing volume.
    VolumeAbsorption { color: ColorInput, density: Float },
}

impl ClosureNode {
    /// Add the node's closures to a shading point.
    ///
    /// * `kg`  - Kernel globals.
    /// * `sd`  - Shading point.
    /// * `fac` - Weight of the node.
    fn apply(&self, kg: &KernelGlobals, sd: &mut ShaderData, fac: Float) {
        let n = sd.n;
        match *self {
            Self::Diffuse { color, roughness } => {
                let model = if roughness <= 0.0 {
                    Closure::Diffuse { n }
                } else {
                    Closure::oren_nayar(n, roughness)
                };
                let weight = color.eval(kg, sd) * fac;
                sd.add_closure(model, weight);
            }
            Self::Translucent { color } => {
                let weight = color.eval(kg, sd) * fac;
                sd.add_closure(Closure::Translucent { n }, weight);
            }
            Self::Glossy { color, roughness } => {
                let model = if roughness <= 0.0 {
                    Closure::Reflection { n }
                } else {
                    Closure::microfacet(n, roughness)
                };
                let weight = color.eval(kg, sd) * fac;
                sd.add_closure(model, weight);
            }
            Self::Refraction { color, roughness, ior } => {
                let weight = color.eval(kg, sd) * fac;
                sd.add_closure(refraction_model(sd, roughness, ior), weight);
            }
            Self::Glass { color, roughness, ior } => {
                let weight = color.eval(kg, sd) * fac;
                let eta = relative_ior(sd, ior);
                let fresnel = fresnel_dielectric_cos(n.dot(&sd.i), eta);
                let reflection = if roughness <= 0.0 {
                    Closure::Reflection { n }
                } else {
                    Closure::microfacet(n, roughness)
                };
                sd.add_closure(reflection, weight * fresnel);
                sd.add_closure(refraction_model(sd, roughness, ior), weight * (1.0 - fresnel));
            }
            Self::Transparent { color } => {
                let weight = color.eval(kg, sd) * fac;
                sd.add_closure(Closure::Transparent, weight);
            }
            Self::Subsurface {
                color,
                radius,
                texture_blur,
            } => {
                let weight = color.eval(kg, sd) * fac;
                sd.add_closure(
                    Closure::Subsurface {
                        n,
                        radius,
                        texture_blur,
                    },
                    weight,
                );
            }
            Self::Emission { color, strength } => {
                let weight = color.eval(kg, sd) * (strength * fac);
                sd.add_closure(Closure::Emission, weight);
            }
            Self::Background { color, strength } => {
                let weight = color.eval(kg, sd) * (strength * fac);
                sd.add_closure(Closure::Background, weight);
            }
            Self::Holdout => {
                sd.add_closure(Closure::Holdout, Spectrum::new(fac));
            }
            Self::AmbientOcclusion { color } => {
                let weight = color.eval(kg, sd) * fac;
                sd.add_closure(Closure::AmbientOcclusion, weight);
            }
            Self::VolumeScatter {
                color,
                density,
                anisotropy,
            } => {
                let weight = color.eval(kg, sd) * (density.max(0.0) * fac);
                let g = clamp(anisotropy, -0.99, 0.99);
                sd.add_closure(Closure::VolumeHenyeyGreenstein { g }, weight);
            }
            Self::VolumeAbsorption { color, density } => {
                let weight = (Spectrum::one() - color.eval(kg, sd)).clamp(0.0, 1.0) * (density.max(0.0) * fac);
                sd.add_closure(Closure::VolumeAbsorption, weight);
            }
        }
    }
}

/// Index of refraction relative to the side the ray arrives from.
fn relative_ior(sd: &ShaderData, ior: Float) -> Float {
    let ior = ior.max(1e-5);
    if sd.is_backfacing() {
        1.0 / ior
    } else {
        ior
    }
}

fn refraction_model(sd: &ShaderData, roughness: Float, ior: Float) -> Closure {
    let n = sd.n;
    let ior = relative_ior(sd, ior);
    if roughness <= 0.0 {
        Closure::Refraction { n, ior }
    } else {
        Closure::MicrofacetRefraction {
            n,
            alpha: saturate(roughness) * saturate(roughness),
            ior,
        }
    }
}

/// The nodes of one shader.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShaderRecipe {
    /// Surface nodes and their weights.
    pub surface: Vec<(Float, ClosureNode)>,

    /// Volume nodes and their weights.
    pub volume: Vec<(Float, ClosureNode)>,

    /// Displacement along the normal.
    pub displacement: Option<Float>,
}

impl ShaderRecipe {
    /// A surface with a single node.
    ///
    /// * `node` - Surface node.
    pub fn surface(node: ClosureNode) -> Self {
        Self {
            surface: vec![(1.0, node)],
            ..Self::default()
        }
    }

    /// A volume with a single node and no surface.
    ///
    /// * `node` - Volume node.
    pub fn volume(node: ClosureNode) -> Self {
        Self {
            volume: vec![(1.0, node)],
            ..Self::default()
        }
    }

    /// Blend two shaders: `fac` = 0 gives `a`, `fac` = 1 gives `b`.
    ///
    /// * `fac` - Blend factor.
    /// * `a`   - First shader.
    /// * `b`   - Second shader.
    pub fn mix(fac: Float, a: Self, b: Self) -> Self {
        let fac = saturate(fac);
        let scaled = |nodes: Vec<(Float, ClosureNode)>, s: Float| {
            nodes.into_iter().map(move |(w, node)| (w * s, node))
        };
        Self {
            surface: scaled(a.surface, 1.0 - fac).chain(scaled(b.surface, fac)).collect(),
            volume: scaled(a.volume, 1.0 - fac).chain(scaled(b.volume, fac)).collect(),
            displacement: match (a.displacement, b.displacement) {
                (None, None) => None,
                (da, db) => Some(lerp(fac, da.unwrap_or(0.0), db.unwrap_or(0.0))),
            },
        }
    }
}

/// Evaluates `ShaderRecipe`s indexed by shader.
#[derive(Clone, Debug, Default)]
pub struct NodeGraphEvaluator {
    recipes: Vec<ShaderRecipe>,
}

impl NodeGraphEvaluator {
    /// Create an evaluator.
    ///
    /// * `recipes` - One recipe per shader index.
    pub fn new(recipes: Vec<ShaderRecipe>) -> Self {
        Self { recipes }
    }

    /// Returns the recipe of a shader.
    ///
    /// * `shader` - Shader index.
    pub fn recipe(&self, shader: usize) -> Option<&ShaderRecipe> {
        self.recipes.get(shader)
    }
}

impl ShaderEvaluator for NodeGraphEvaluator {
    fn evaluate(
        &self,
        kg: &KernelGlobals,
        sd: &mut ShaderData,
        _state: Option<&PathState>,
        shader_type: ShaderType,
        _path_flag: PathRayFlags,
    ) {
        let Some(recipe) = sd.shader.and_then(|s| self.recipe(s)) else {
            return;
        };
        match shader_type {
            ShaderType::Surface | ShaderType::AoSurface => {
                for (fac, node) in recipe.surface.iter() {
                    node.apply(kg, sd, *fac);
                }
            }
            ShaderType::Volume => {
                for (fac, node) in recipe.volume.iter() {
                    node.apply(kg, sd, *fac);
                }
            }
            ShaderType::Displacement => {
                if let Some(height) = recipe.displacement {
                    let n = sd.n;
                    sd.p += n * height;
                }
            }
        }
    }
}
