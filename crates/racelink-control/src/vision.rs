//! 图像解码与灰度值

use crate::error::ControlError;
use image::{ImageFormat, RgbImage};

/// 灰度权重（ITU-R BT.601）
const GRAY_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// 解码 JPEG 为 RGB 图像
pub fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage, ControlError> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?;
    Ok(image.to_rgb8())
}

/// 单像素灰度值
#[inline]
pub fn luma(pixel: &image::Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    let value = GRAY_WEIGHTS[0] * r as f32 + GRAY_WEIGHTS[1] * g as f32 + GRAY_WEIGHTS[2] * b as f32;
    value.round().clamp(0.0, 255.0) as u8
}
