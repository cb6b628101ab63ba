//! Demo scene

use super::*;
use crate::geometry::*;
use crate::shader::{ClosureNode, ColorInput, NodeGraphEvaluator, ShaderFlags, ShaderRecipe};
use crate::spectrum::Spectrum;

/// Build a diffuse sphere on a floor lit by an area light, with a camera
/// looking at the sphere. Integrator and film settings are left to the
/// caller.
///
/// * `width`         - Image width.
/// * `height`        - Image height.
/// * `floor_texture` - Texture slot used for the floor colour instead of a
///                     checker pattern.
pub fn demo_scene(width: usize, height: usize, floor_texture: Option<usize>) -> (SceneBuilder, NodeGraphEvaluator) {
    let mut builder = SceneBuilder::new();
    let sphere_shader = builder.add_shader(KernelShader::new("sphere", ShaderFlags::empty()));
    let floor_shader = builder.add_shader(KernelShader::new("floor", ShaderFlags::empty()));
    let lamp_shader = builder.add_shader(KernelShader::new("lamp", ShaderFlags::HAS_EMISSION));
    let world_shader = builder.add_shader(KernelShader::new("world", ShaderFlags::empty()));

    let sphere = builder.add_geometry(Geometry::Mesh(TriangleMesh::uv_sphere(1.0, 48, 24, sphere_shader)));
    builder.add_object(ObjectData::new("sphere", sphere, IDENTITY_TRANSFORM));

    let floor = TriangleMesh::quad(
        Point3f::new(-10.0, -1.0, -10.0),
        Vector3f::new(0.0, 0.0, 20.0),
        Vector3f::new(20.0, 0.0, 0.0),
        floor_shader,
    );
    let floor = builder.add_geometry(Geometry::Mesh(floor));
    builder.add_object(ObjectData::new("floor", floor, IDENTITY_TRANSFORM));

    let lamp = TriangleMesh::quad(
        Point3f::new(-1.0, 3.0, -1.0),
        Vector3f::new(2.0, 0.0, 0.0),
        Vector3f::new(0.0, 0.0, 2.0),
        lamp_shader,
    );
    let lamp = builder.add_geometry(Geometry::Mesh(lamp));
    builder.add_object(ObjectData::new("lamp", lamp, IDENTITY_TRANSFORM));

    builder
        .camera(CameraSettings::look_at(
            Point3f::new(0.0, 0.5, -5.0),
            Point3f::zero(),
            Vector3f::new(0.0, 1.0, 0.0),
            0.8,
            width,
            height,
        ))
        .background(BackgroundSettings {
            shader: Some(world_shader),
            ..Default::default()
        });

    let floor_color = match floor_texture {
        Some(slot) => ColorInput::Image { slot },
        None => ColorInput::Checker {
            a: Spectrum::new(0.8),
            b: Spectrum::new(0.2),
            scale: 2.0,
        },
    };
    let sphere = ShaderRecipe::mix(
        0.2,
        ShaderRecipe::surface(ClosureNode::Diffuse {
            color: Spectrum::rgb(0.8, 0.3, 0.2).into(),
            roughness: 0.0,
        }),
        ShaderRecipe::surface(ClosureNode::Glossy {
            color: Spectrum::one().into(),
            roughness: 0.2,
        }),
    );
    let evaluator = NodeGraphEvaluator::new(vec![
        sphere,
        ShaderRecipe::surface(ClosureNode::Diffuse {
            color: floor_color,
            roughness: 0.0,
        }),
        ShaderRecipe::surface(ClosureNode::Emission {
            color: Spectrum::one().into(),
            strength: 10.0,
        }),
        ShaderRecipe::surface(ClosureNode::Background {
            color: Spectrum::rgb(0.05, 0.05, 0.08).into(),
            strength: 1.0,
        }),
    ]);

    (builder, evaluator)
}
