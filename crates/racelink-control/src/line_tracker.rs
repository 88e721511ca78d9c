//! 视觉循线
//!
//! 单帧计算，无状态：
//!
//! 1. 荷电状态低于阈值 → `(0, 0)`，不处理图像
//! 2. 灰度化，截取画面高度 40%–90% 的前视区域，阈值 200 二值化
//! 3. 线像素少于 5 个 → `(0.5, 0.5)`（丢线，低速前进）
//! 4. 计算线像素质心 `(x_c, y_c)`，并对 `(x, y)` 做一次最小二乘拟合，`theta = atan(slope)`
//! 5. 横向偏差与航向偏差等权混合为转向量：
//!
//! ```text
//! deviation  = (x_c - W/2) / (W/2)
//! theta_norm = theta / 45°
//! turn       = gain * (0.5 * deviation + 0.5 * theta_norm)
//! left       = clamp(FORWARD - turn),  right = clamp(FORWARD + turn)
//! ```
//!
//! 纯比例控制：`kp`/`ki`/`kd` 保留在配置中，但不参与输出计算。

use crate::error::ControlError;
use crate::vision::{decode_jpeg, luma};
use image::RgbImage;
use racelink_protocol::TorqueCommand;
use tracing::{trace, warn};

/// 循线参数
#[derive(Debug, Clone, PartialEq)]
pub struct LineTrackerConfig {
    /// 基础前进扭矩
    pub forward: f64,
    /// 转向增益
    pub turn_gain: f64,
    /// 横向偏差权重
    pub deviation_weight: f64,
    /// 航向偏差权重
    pub heading_weight: f64,
    /// 航向归一化角度（弧度）
    pub heading_scale: f64,
    /// 前视区域上边界（画面高度比例）
    pub roi_top: f64,
    /// 前视区域下边界（画面高度比例）
    pub roi_bottom: f64,
    /// 线像素灰度阈值（不含）
    pub threshold: u8,
    /// 最少线像素数
    pub min_pixels: usize,
    /// 丢线时的输出
    pub lost_line_output: (f64, f64),
    /// 低电量截止
    pub low_charge_cutoff: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for LineTrackerConfig {
    fn default() -> Self {
        Self {
            forward: 0.3,
            turn_gain: 1.0,
            deviation_weight: 0.5,
            heading_weight: 0.5,
            heading_scale: 45f64.to_radians(),
            roi_top: 0.4,
            roi_bottom: 0.9,
            threshold: 200,
            min_pixels: 5,
            lost_line_output: (0.5, 0.5),
            low_charge_cutoff: 0.2,
            kp: 0.005,
            ki: 0.0,
            kd: 0.001,
        }
    }
}

/// 线拟合结果（整幅画面坐标）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub centroid_x: f64,
    pub centroid_y: f64,
    /// `atan(slope)`（弧度）
    pub angle: f64,
    /// `y = slope * x + intercept`
    pub slope: f64,
    pub intercept: f64,
    pub pixel_count: usize,
}

/// 单帧循线结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackOutcome {
    /// 荷电状态过低，未处理图像
    LowCharge,
    /// 线像素不足
    LineLost { pixel_count: usize },
    /// 正常跟踪
    Tracking {
        fit: LineFit,
        deviation: f64,
        heading: f64,
    },
}

/// 视觉循线器
#[derive(Debug, Clone, Default)]
pub struct LineTracker {
    config: LineTrackerConfig,
}

impl LineTracker {
    pub fn new(config: LineTrackerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LineTrackerConfig {
        &self.config
    }

    /// 计算左右轮扭矩
    pub fn track(&self, charge: f64, image: &RgbImage) -> TorqueCommand {
        self.track_detailed(charge, image).0
    }

    /// 对 JPEG 字节循线；低电量时不解码
    pub fn track_jpeg(&self, charge: f64, jpeg: &[u8]) -> Result<TorqueCommand, ControlError> {
        if self.is_low_charge(charge) {
            return Ok(TorqueCommand::ZERO);
        }
        let image = decode_jpeg(jpeg)?;
        Ok(self.track(charge, &image))
    }

    /// 计算扭矩，同时返回中间结果
    pub fn track_detailed(&self, charge: f64, image: &RgbImage) -> (TorqueCommand, TrackOutcome) {
        if self.is_low_charge(charge) {
            trace!("Line tracker: low charge {:.3}, stopping", charge);
            return (TorqueCommand::ZERO, TrackOutcome::LowCharge);
        }

        let (width, height) = image.dimensions();
        let stats = self.scan(image);
        let fit = match stats.fit(self.config.min_pixels) {
            Some(fit) if width >= 2 => fit,
            _ => {
                warn!(
                    "Line tracker: line lost ({} pixels in {}x{} frame)",
                    stats.count, width, height
                );
                let (left, right) = self.config.lost_line_output;
                return (
                    TorqueCommand::new(left, right),
                    TrackOutcome::LineLost {
                        pixel_count: stats.count,
                    },
                );
            },
        };

        let center = (width / 2) as f64;
        let deviation = (fit.centroid_x - center) / center;
        let heading = fit.angle / self.config.heading_scale;
        let correction =
            self.config.deviation_weight * deviation + self.config.heading_weight * heading;
        let turn = self.config.turn_gain * correction;

        let command = TorqueCommand::new(self.config.forward - turn, self.config.forward + turn);
        trace!(
            "Line tracker: xc={:.1} dev={:.3} theta={:.3} -> L={:.3} R={:.3}",
            fit.centroid_x,
            deviation,
            heading,
            command.left(),
            command.right()
        );

        (
            command,
            TrackOutcome::Tracking {
                fit,
                deviation,
                heading,
            },
        )
    }

    /// 在前视区域内提取线像素并拟合；像素不足返回 `None`
    pub fn fit(&self, image: &RgbImage) -> Option<LineFit> {
        self.scan(image).fit(self.config.min_pixels)
    }

    /// 前视区域内阈值以上像素的累加量（整幅画面坐标）
    fn scan(&self, image: &RgbImage) -> PixelStats {
        let (width, height) = image.dimensions();
        let roi_top = (height as f64 * self.config.roi_top) as u32;
        let roi_bottom = ((height as f64 * self.config.roi_bottom) as u32).min(height);

        let mut stats = PixelStats::default();
        for y in roi_top..roi_bottom {
            for x in 0..width {
                if luma(image.get_pixel(x, y)) > self.config.threshold {
                    stats.push(x as f64, y as f64);
                }
            }
        }
        stats
    }

    fn is_low_charge(&self, charge: f64) -> bool {
        charge < self.config.low_charge_cutoff
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PixelStats {
    count: usize,
    sum_x: f64,
    sum_y: f64,
    sum_xx: f64,
    sum_xy: f64,
}

impl PixelStats {
    fn push(&mut self, x: f64, y: f64) {
        self.count += 1;
        self.sum_x += x;
        self.sum_y += y;
        self.sum_xx += x * x;
        self.sum_xy += x * y;
    }

    fn fit(&self, min_pixels: usize) -> Option<LineFit> {
        if self.count == 0 || self.count < min_pixels {
            return None;
        }

        let n = self.count as f64;
        let centroid_x = self.sum_x / n;
        let centroid_y = self.sum_y / n;

        // 最小二乘：slope = Sxy / Sxx
        // 所有像素同列（x = c）时 Sxx = 0，方程欠定：这里取零斜率、截距 ȳ。
        // numpy polyfit 的列缩放最小范数解是 slope = ȳ / 2c，heading 项会与之不同，
        // 偏差项不受影响。
        let sxx = self.sum_xx - n * centroid_x * centroid_x;
        let sxy = self.sum_xy - n * centroid_x * centroid_y;
        let slope = if sxx.abs() > f64::EPSILON * n {
            sxy / sxx
        } else {
            0.0
        };
        let intercept = centroid_y - slope * centroid_x;

        Some(LineFit {
            centroid_x,
            centroid_y,
            angle: slope.atan(),
            slope,
            intercept,
            pixel_count: self.count,
        })
    }
}
