//! Fixed-function render state: the typed fields a pass's tags configure and
//! their encoding into a bgfx-compatible state word.

use serde::{Deserialize, Serialize};

/// Bit layout of the 64-bit state word and the 32-bit stencil word.
pub mod bits {
    pub const WRITE_R: u64 = 0x0000_0000_0000_0001;
    pub const WRITE_G: u64 = 0x0000_0000_0000_0002;
    pub const WRITE_B: u64 = 0x0000_0000_0000_0004;
    pub const WRITE_A: u64 = 0x0000_0000_0000_0008;
    pub const WRITE_Z: u64 = 0x0000_0040_0000_0000;
    pub const WRITE_RGB: u64 = WRITE_R | WRITE_G | WRITE_B;

    pub const DEPTH_TEST_LESS: u64 = 0x0000_0000_0000_0010;
    pub const DEPTH_TEST_LEQUAL: u64 = 0x0000_0000_0000_0020;
    pub const DEPTH_TEST_EQUAL: u64 = 0x0000_0000_0000_0030;
    pub const DEPTH_TEST_GEQUAL: u64 = 0x0000_0000_0000_0040;
    pub const DEPTH_TEST_GREATER: u64 = 0x0000_0000_0000_0050;
    pub const DEPTH_TEST_NOTEQUAL: u64 = 0x0000_0000_0000_0060;
    pub const DEPTH_TEST_NEVER: u64 = 0x0000_0000_0000_0070;
    pub const DEPTH_TEST_ALWAYS: u64 = 0x0000_0000_0000_0080;
    pub const DEPTH_TEST_MASK: u64 = 0x0000_0000_0000_00f0;

    pub const BLEND_ZERO: u64 = 0x0000_0000_0000_1000;
    pub const BLEND_ONE: u64 = 0x0000_0000_0000_2000;
    pub const BLEND_SRC_ALPHA: u64 = 0x0000_0000_0000_5000;
    pub const BLEND_INV_SRC_ALPHA: u64 = 0x0000_0000_0000_6000;
    pub const BLEND_DST_COLOR: u64 = 0x0000_0000_0000_9000;
    pub const BLEND_MASK: u64 = 0x0000_0000_0fff_f000;

    pub const CULL_CW: u64 = 0x0000_0010_0000_0000;
    pub const CULL_CCW: u64 = 0x0000_0020_0000_0000;
    pub const CULL_MASK: u64 = 0x0000_0030_0000_0000;

    pub const MSAA: u64 = 0x0100_0000_0000_0000;

    pub const DEFAULT: u64 = WRITE_RGB | WRITE_A | WRITE_Z | DEPTH_TEST_LESS | CULL_CW | MSAA;

    pub const fn blend_func_separate(src_rgb: u64, dst_rgb: u64, src_a: u64, dst_a: u64) -> u64 {
        (src_rgb | (dst_rgb << 4)) | ((src_a | (dst_a << 4)) << 8)
    }

    pub const fn blend_func(src: u64, dst: u64) -> u64 {
        blend_func_separate(src, dst, src, dst)
    }

    pub const BLEND_ADD: u64 = blend_func(BLEND_ONE, BLEND_ONE);
    pub const BLEND_MULTIPLY: u64 = blend_func(BLEND_DST_COLOR, BLEND_ZERO);
    pub const BLEND_ALPHA: u64 =
        blend_func_separate(BLEND_SRC_ALPHA, BLEND_INV_SRC_ALPHA, BLEND_SRC_ALPHA, BLEND_ONE);

    pub const STENCIL_FUNC_REF_SHIFT: u32 = 0;
    pub const STENCIL_FUNC_REF_MASK: u32 = 0x0000_00ff;
    pub const STENCIL_FUNC_RMASK_SHIFT: u32 = 8;
    pub const STENCIL_FUNC_RMASK_MASK: u32 = 0x0000_ff00;

    pub const STENCIL_TEST_LESS: u32 = 0x0001_0000;
    pub const STENCIL_TEST_LEQUAL: u32 = 0x0002_0000;
    pub const STENCIL_TEST_EQUAL: u32 = 0x0003_0000;
    pub const STENCIL_TEST_GEQUAL: u32 = 0x0004_0000;
    pub const STENCIL_TEST_GREATER: u32 = 0x0005_0000;
    pub const STENCIL_TEST_NOTEQUAL: u32 = 0x0006_0000;
    pub const STENCIL_TEST_NEVER: u32 = 0x0007_0000;
    pub const STENCIL_TEST_ALWAYS: u32 = 0x0008_0000;
    pub const STENCIL_TEST_MASK: u32 = 0x000f_0000;

    pub const STENCIL_OP_FAIL_S_SHIFT: u32 = 20;
    pub const STENCIL_OP_FAIL_S_MASK: u32 = 0x00f0_0000;
    pub const STENCIL_OP_FAIL_Z_SHIFT: u32 = 24;
    pub const STENCIL_OP_FAIL_Z_MASK: u32 = 0x0f00_0000;
    pub const STENCIL_OP_PASS_Z_SHIFT: u32 = 28;
    pub const STENCIL_OP_PASS_Z_MASK: u32 = 0xf000_0000;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CullMode {
    None,
    #[default]
    Clockwise,
    CounterClockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Replace,
    Add,
    Multiply,
    Alpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IterationMode {
    #[default]
    Default,
    PerLight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DepthFunction {
    Less,
    #[default]
    LessOrEqual,
    Equal,
    GreaterOrEqual,
    Greater,
    NotEqual,
    Never,
    Always,
    Off,
}

/// Comparison used by the stencil test. `Off` is not a valid value here;
/// an unset stencil function is expressed as `None` on [`RenderSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StencilFunction {
    Less,
    LessOrEqual,
    Equal,
    GreaterOrEqual,
    Greater,
    NotEqual,
    Never,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StencilOp {
    Zero,
    Keep,
    Replace,
    Incr,
    IncrSat,
    Decr,
    DecrSat,
    Invert,
}

impl CullMode {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "off" => Some(Self::None),
            "cw" => Some(Self::Clockwise),
            "ccw" => Some(Self::CounterClockwise),
            _ => None,
        }
    }
}

impl BlendMode {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "replace" => Some(Self::Replace),
            "add" => Some(Self::Add),
            "multiply" => Some(Self::Multiply),
            "alpha" => Some(Self::Alpha),
            _ => None,
        }
    }
}

impl IterationMode {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "default" => Some(Self::Default),
            "per_light" => Some(Self::PerLight),
            _ => None,
        }
    }
}

impl DepthFunction {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "always" => Some(Self::Always),
            "equal" => Some(Self::Equal),
            "greater" => Some(Self::Greater),
            "gequal" => Some(Self::GreaterOrEqual),
            "less" => Some(Self::Less),
            "lequal" => Some(Self::LessOrEqual),
            "never" => Some(Self::Never),
            "notequal" => Some(Self::NotEqual),
            "off" => Some(Self::Off),
            _ => None,
        }
    }

    fn state_bits(self) -> u64 {
        match self {
            Self::Less => bits::DEPTH_TEST_LESS,
            Self::LessOrEqual => bits::DEPTH_TEST_LEQUAL,
            Self::Equal => bits::DEPTH_TEST_EQUAL,
            Self::GreaterOrEqual => bits::DEPTH_TEST_GEQUAL,
            Self::Greater => bits::DEPTH_TEST_GREATER,
            Self::NotEqual => bits::DEPTH_TEST_NOTEQUAL,
            Self::Never => bits::DEPTH_TEST_NEVER,
            Self::Always => bits::DEPTH_TEST_ALWAYS,
            Self::Off => 0,
        }
    }
}

impl StencilFunction {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "always" => Some(Self::Always),
            "equal" => Some(Self::Equal),
            "greater" => Some(Self::Greater),
            "gequal" => Some(Self::GreaterOrEqual),
            "less" => Some(Self::Less),
            "lequal" => Some(Self::LessOrEqual),
            "never" => Some(Self::Never),
            "notequal" => Some(Self::NotEqual),
            _ => None,
        }
    }

    fn stencil_bits(self) -> u32 {
        match self {
            Self::Less => bits::STENCIL_TEST_LESS,
            Self::LessOrEqual => bits::STENCIL_TEST_LEQUAL,
            Self::Equal => bits::STENCIL_TEST_EQUAL,
            Self::GreaterOrEqual => bits::STENCIL_TEST_GEQUAL,
            Self::Greater => bits::STENCIL_TEST_GREATER,
            Self::NotEqual => bits::STENCIL_TEST_NOTEQUAL,
            Self::Never => bits::STENCIL_TEST_NEVER,
            Self::Always => bits::STENCIL_TEST_ALWAYS,
        }
    }
}

impl StencilOp {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "replace" => Some(Self::Replace),
            "keep" => Some(Self::Keep),
            "incr" => Some(Self::Incr),
            "incrsat" => Some(Self::IncrSat),
            "decr" => Some(Self::Decr),
            "decrsat" => Some(Self::DecrSat),
            "invert" => Some(Self::Invert),
            "zero" => Some(Self::Zero),
            _ => None,
        }
    }

    /// Field value before shifting into one of the three op slots.
    fn code(self) -> u32 {
        match self {
            Self::Zero => 0,
            Self::Keep => 1,
            Self::Replace => 2,
            Self::Incr => 3,
            Self::IncrSat => 4,
            Self::Decr => 5,
            Self::DecrSat => 6,
            Self::Invert => 7,
        }
    }
}

/// A state word pair handed to the backend with a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderState {
    pub state: u64,
    pub stencil: u32,
}

impl RenderState {
    pub const DEFAULT: RenderState = RenderState {
        state: bits::DEFAULT,
        stencil: 0,
    };

    pub fn new(state: u64, stencil: u32) -> Self {
        Self { state, stencil }
    }
}

/// Render-state fields of one compiled program variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    pub blend_mode: BlendMode,
    pub cull_mode: CullMode,
    pub depth_write: bool,
    pub depth_function: DepthFunction,
    pub iteration_mode: IterationMode,
    pub stencil_function: Option<StencilFunction>,
    pub stencil_func_ref: Option<u32>,
    pub stencil_mask: Option<u32>,
    pub stencil_op_fail_s: Option<StencilOp>,
    pub stencil_op_fail_z: Option<StencilOp>,
    pub stencil_op_pass_z: Option<StencilOp>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            blend_mode: BlendMode::Replace,
            cull_mode: CullMode::Clockwise,
            depth_write: true,
            depth_function: DepthFunction::LessOrEqual,
            iteration_mode: IterationMode::Default,
            stencil_function: None,
            stencil_func_ref: None,
            stencil_mask: None,
            stencil_op_fail_s: None,
            stencil_op_fail_z: None,
            stencil_op_pass_z: None,
        }
    }
}

impl RenderSettings {
    /// Derive the draw state from a caller-supplied baseline.
    ///
    /// Fields left at their unset sentinel keep the baseline's bits, so a
    /// renderer-wide stencil configuration survives passes that never
    /// mention stencil.
    pub fn render_state(&self, baseline: RenderState) -> RenderState {
        let mut state = baseline.state;
        let mut stencil = baseline.stencil;

        match self.blend_mode {
            BlendMode::Replace => {}
            BlendMode::Add => state = (state & !bits::BLEND_MASK) | bits::BLEND_ADD,
            BlendMode::Alpha => state = (state & !bits::BLEND_MASK) | bits::BLEND_ALPHA,
            BlendMode::Multiply => state = (state & !bits::BLEND_MASK) | bits::BLEND_MULTIPLY,
        }

        if !self.depth_write {
            state &= !bits::WRITE_Z;
        }

        match self.cull_mode {
            CullMode::Clockwise => {}
            CullMode::None => state &= !bits::CULL_MASK,
            CullMode::CounterClockwise => state = (state & !bits::CULL_CW) | bits::CULL_CCW,
        }

        state = (state & !bits::DEPTH_TEST_MASK) | self.depth_function.state_bits();

        if let Some(func) = self.stencil_function {
            stencil = (stencil & !bits::STENCIL_TEST_MASK) | func.stencil_bits();
        }
        if let Some(reference) = self.stencil_func_ref {
            stencil = (stencil & !bits::STENCIL_FUNC_REF_MASK)
                | ((reference << bits::STENCIL_FUNC_REF_SHIFT) & bits::STENCIL_FUNC_REF_MASK);
        }
        if let Some(mask) = self.stencil_mask {
            stencil = (stencil & !bits::STENCIL_FUNC_RMASK_MASK)
                | ((mask << bits::STENCIL_FUNC_RMASK_SHIFT) & bits::STENCIL_FUNC_RMASK_MASK);
        }

        let ops = [
            (self.stencil_op_fail_s, bits::STENCIL_OP_FAIL_S_SHIFT, bits::STENCIL_OP_FAIL_S_MASK),
            (self.stencil_op_fail_z, bits::STENCIL_OP_FAIL_Z_SHIFT, bits::STENCIL_OP_FAIL_Z_MASK),
            (self.stencil_op_pass_z, bits::STENCIL_OP_PASS_Z_SHIFT, bits::STENCIL_OP_PASS_Z_MASK),
        ];
        for (op, shift, mask) in ops {
            if let Some(op) = op {
                stencil = (stencil & !mask) | ((op.code() << shift) & mask);
            }
        }

        RenderState { state, stencil }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_keep_baseline_except_depth() {
        let settings = RenderSettings::default();
        let out = settings.render_state(RenderState::DEFAULT);
        // Default depth function is less-equal; baseline used less.
        assert_eq!(out.state & bits::DEPTH_TEST_MASK, bits::DEPTH_TEST_LEQUAL);
        assert_eq!(out.state & !bits::DEPTH_TEST_MASK, bits::DEFAULT & !bits::DEPTH_TEST_MASK);
        assert_eq!(out.stencil, 0);
    }

    #[test]
    fn test_blend_modes() {
        let mut settings = RenderSettings::default();
        settings.blend_mode = BlendMode::Alpha;
        let out = settings.render_state(RenderState::DEFAULT);
        assert_eq!(out.state & bits::BLEND_MASK, bits::BLEND_ALPHA);

        settings.blend_mode = BlendMode::Add;
        let out = settings.render_state(RenderState::DEFAULT);
        assert_eq!(out.state & bits::BLEND_MASK, bits::BLEND_ADD);

        settings.blend_mode = BlendMode::Multiply;
        let out = settings.render_state(RenderState::DEFAULT);
        assert_eq!(out.state & bits::BLEND_MASK, bits::BLEND_MULTIPLY);
    }

    #[test]
    fn test_cull_and_depth_write() {
        let mut settings = RenderSettings::default();
        settings.cull_mode = CullMode::None;
        settings.depth_write = false;
        let out = settings.render_state(RenderState::DEFAULT);
        assert_eq!(out.state & bits::CULL_MASK, 0);
        assert_eq!(out.state & bits::WRITE_Z, 0);

        settings.cull_mode = CullMode::CounterClockwise;
        let out = settings.render_state(RenderState::DEFAULT);
        assert_eq!(out.state & bits::CULL_MASK, bits::CULL_CCW);
    }

    #[test]
    fn test_depth_off_clears_test() {
        let mut settings = RenderSettings::default();
        settings.depth_function = DepthFunction::Off;
        let out = settings.render_state(RenderState::DEFAULT);
        assert_eq!(out.state & bits::DEPTH_TEST_MASK, 0);

        settings.depth_function = DepthFunction::Greater;
        let out = settings.render_state(RenderState::DEFAULT);
        assert_eq!(out.state & bits::DEPTH_TEST_MASK, bits::DEPTH_TEST_GREATER);
    }

    #[test]
    fn test_unset_stencil_preserves_baseline() {
        let baseline = RenderState::new(bits::DEFAULT, bits::STENCIL_TEST_EQUAL | 0x0000_ff01);
        let out = RenderSettings::default().render_state(baseline);
        assert_eq!(out.stencil, baseline.stencil);
    }

    #[test]
    fn test_stencil_fields_encode() {
        let mut settings = RenderSettings::default();
        settings.stencil_function = Some(StencilFunction::Always);
        settings.stencil_func_ref = Some(1);
        settings.stencil_mask = Some(0xff);
        settings.stencil_op_fail_s = Some(StencilOp::Keep);
        settings.stencil_op_fail_z = Some(StencilOp::Zero);
        settings.stencil_op_pass_z = Some(StencilOp::Replace);

        let baseline = RenderState::new(bits::DEFAULT, 0x0f00_0000);
        let out = settings.render_state(baseline);
        assert_eq!(out.stencil & bits::STENCIL_TEST_MASK, bits::STENCIL_TEST_ALWAYS);
        assert_eq!(out.stencil & bits::STENCIL_FUNC_REF_MASK, 1);
        assert_eq!(out.stencil & bits::STENCIL_FUNC_RMASK_MASK, 0xff00);
        assert_eq!(out.stencil & bits::STENCIL_OP_FAIL_S_MASK, 0x0010_0000);
        // `zero` must clear whatever the baseline had in the slot.
        assert_eq!(out.stencil & bits::STENCIL_OP_FAIL_Z_MASK, 0);
        assert_eq!(out.stencil & bits::STENCIL_OP_PASS_Z_MASK, 0x2000_0000);
    }
}
