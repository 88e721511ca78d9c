//! 学习模型控制器外壳
//!
//! 模型输入为 `224 × 224 × 3` 的 CHW 浮点图像（`[0, 1]`，双线性缩放）加上荷电状态，
//! 共 `150_529` 个 `f32`；输出为左右轮扭矩。权重加载与推理后端不在本 crate 内，
//! 由调用方实现 [`TorqueModel`]。

use crate::controller::{ControlInput, Controller};
use crate::error::ControlError;
use crate::vision::decode_jpeg;
use image::RgbImage;
use image::imageops::{self, FilterType};
use racelink_protocol::TorqueCommand;

/// 模型输入边长
pub const INPUT_SIZE: u32 = 224;

/// 模型输入长度（图像 + SOC）
pub const INPUT_LEN: usize = (INPUT_SIZE * INPUT_SIZE * 3) as usize + 1;

/// 扭矩预测模型
pub trait TorqueModel: Send {
    /// `input.len() == INPUT_LEN`，返回 `[left, right]`（未钳位）
    fn predict(&mut self, input: &[f32]) -> Result<[f32; 2], ControlError>;
}

/// 把图像与荷电状态编码为模型输入
pub fn encode_input(image: &RgbImage, charge: f64, out: &mut Vec<f32>) {
    out.clear();
    out.reserve(INPUT_LEN);

    let resized = if image.dimensions() == (INPUT_SIZE, INPUT_SIZE) {
        image.clone()
    } else {
        imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
    };

    for channel in 0..3 {
        out.extend(
            resized
                .pixels()
                .map(|pixel| pixel.0[channel] as f32 / 255.0),
        );
    }
    out.push(charge as f32);
}

pub struct InferenceController<M> {
    model: M,
    buffer: Vec<f32>,
}

impl<M: TorqueModel> InferenceController<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            buffer: Vec::with_capacity(INPUT_LEN),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M: TorqueModel> Controller for InferenceController<M> {
    fn name(&self) -> &str {
        "ai"
    }

    fn tick(&mut self, input: &ControlInput) -> Result<TorqueCommand, ControlError> {
        let Some(frame) = input.frame.as_ref() else {
            return Ok(TorqueCommand::ZERO);
        };

        let image = decode_jpeg(frame.image())?;
        encode_input(&image, input.charge, &mut self.buffer);
        let [left, right] = self.model.predict(&self.buffer)?;
        Ok(TorqueCommand::new(left as f64, right as f64))
    }
}
