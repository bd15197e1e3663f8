//! Render settings expressed as wgpu pipeline state.
//!
//! The packed [`RenderState`](lumen_core::RenderState) words suit backends
//! that take state per draw; wgpu bakes the same choices into the render
//! pipeline instead. Stencil reference values are dynamic in wgpu and are
//! returned separately for `RenderPass::set_stencil_reference`.

use lumen_core::state::{BlendMode, CullMode, DepthFunction, StencilFunction, StencilOp};
use lumen_core::RenderSettings;

use crate::shader::ProgramVariant;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    pub primitive: wgpu::PrimitiveState,
    pub blend: Option<wgpu::BlendState>,
    pub depth_stencil: Option<wgpu::DepthStencilState>,
    pub stencil_reference: u32,
}

pub fn pipeline_state(
    settings: &RenderSettings,
    depth_format: Option<wgpu::TextureFormat>,
) -> PipelineState {
    let primitive = wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        strip_index_format: None,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: cull_face(settings.cull_mode),
        polygon_mode: wgpu::PolygonMode::Fill,
        unclipped_depth: false,
        conservative: false,
    };

    let depth_stencil = depth_format.map(|format| {
        let (depth_compare, depth_write_enabled) = match settings.depth_function {
            DepthFunction::Off => (wgpu::CompareFunction::Always, false),
            func => (compare_depth(func), settings.depth_write),
        };
        wgpu::DepthStencilState {
            format,
            depth_write_enabled,
            depth_compare,
            stencil: stencil_state(settings),
            bias: wgpu::DepthBiasState::default(),
        }
    });

    PipelineState {
        primitive,
        blend: blend_state(settings.blend_mode),
        depth_stencil,
        stencil_reference: settings.stencil_func_ref.unwrap_or(0),
    }
}

impl ProgramVariant {
    pub fn pipeline_state(&self, depth_format: Option<wgpu::TextureFormat>) -> PipelineState {
        pipeline_state(&self.settings, depth_format)
    }
}

// Clockwise culling removes clockwise triangles, which are back faces
// under a counter-clockwise front face.
fn cull_face(mode: CullMode) -> Option<wgpu::Face> {
    match mode {
        CullMode::None => None,
        CullMode::Clockwise => Some(wgpu::Face::Back),
        CullMode::CounterClockwise => Some(wgpu::Face::Front),
    }
}

fn blend_state(mode: BlendMode) -> Option<wgpu::BlendState> {
    let component = |src_factor, dst_factor| wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    };
    match mode {
        BlendMode::Replace => Some(wgpu::BlendState::REPLACE),
        BlendMode::Add => {
            let c = component(wgpu::BlendFactor::One, wgpu::BlendFactor::One);
            Some(wgpu::BlendState { color: c, alpha: c })
        }
        BlendMode::Multiply => {
            let c = component(wgpu::BlendFactor::Dst, wgpu::BlendFactor::Zero);
            Some(wgpu::BlendState { color: c, alpha: c })
        }
        BlendMode::Alpha => Some(wgpu::BlendState {
            color: component(
                wgpu::BlendFactor::SrcAlpha,
                wgpu::BlendFactor::OneMinusSrcAlpha,
            ),
            alpha: component(wgpu::BlendFactor::SrcAlpha, wgpu::BlendFactor::One),
        }),
    }
}

fn compare_depth(func: DepthFunction) -> wgpu::CompareFunction {
    match func {
        DepthFunction::Less => wgpu::CompareFunction::Less,
        DepthFunction::LessOrEqual => wgpu::CompareFunction::LessEqual,
        DepthFunction::Equal => wgpu::CompareFunction::Equal,
        DepthFunction::GreaterOrEqual => wgpu::CompareFunction::GreaterEqual,
        DepthFunction::Greater => wgpu::CompareFunction::Greater,
        DepthFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        DepthFunction::Never => wgpu::CompareFunction::Never,
        DepthFunction::Always | DepthFunction::Off => wgpu::CompareFunction::Always,
    }
}

fn compare_stencil(func: StencilFunction) -> wgpu::CompareFunction {
    match func {
        StencilFunction::Less => wgpu::CompareFunction::Less,
        StencilFunction::LessOrEqual => wgpu::CompareFunction::LessEqual,
        StencilFunction::Equal => wgpu::CompareFunction::Equal,
        StencilFunction::GreaterOrEqual => wgpu::CompareFunction::GreaterEqual,
        StencilFunction::Greater => wgpu::CompareFunction::Greater,
        StencilFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        StencilFunction::Never => wgpu::CompareFunction::Never,
        StencilFunction::Always => wgpu::CompareFunction::Always,
    }
}

fn stencil_operation(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::Incr => wgpu::StencilOperation::IncrementWrap,
        StencilOp::IncrSat => wgpu::StencilOperation::IncrementClamp,
        StencilOp::Decr => wgpu::StencilOperation::DecrementWrap,
        StencilOp::DecrSat => wgpu::StencilOperation::DecrementClamp,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
    }
}

fn stencil_state(settings: &RenderSettings) -> wgpu::StencilState {
    let Some(func) = settings.stencil_function else {
        return wgpu::StencilState::default();
    };
    let op = |op: Option<StencilOp>| op.map(stencil_operation).unwrap_or(wgpu::StencilOperation::Keep);
    let face = wgpu::StencilFaceState {
        compare: compare_stencil(func),
        fail_op: op(settings.stencil_op_fail_s),
        depth_fail_op: op(settings.stencil_op_fail_z),
        pass_op: op(settings.stencil_op_pass_z),
    };
    let mask = settings.stencil_mask.unwrap_or(0xff);
    wgpu::StencilState {
        front: face,
        back: face,
        read_mask: mask,
        write_mask: mask,
    }
}
