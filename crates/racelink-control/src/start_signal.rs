//! 发车信号检测
//!
//! 画面顶部 20% 高度内有三组信号灯，分别位于宽度的 35–50%、55–70%、75–90%。
//! 每组区域中"红色"像素占比超过阈值即视为点亮。
//!
//! 检测器带迟滞：
//!
//! | 观测 | `armed` | 动作 |
//! |---|---|---|
//! | 三灯全亮 | 任意 | `armed = true`，不发车 |
//! | 三灯全灭 | `true` | `armed = false`，发车（仅此一次） |
//! | 其他 | 不变 | 不发车 |
//!
//! 因此只有"全亮 → 全灭"的跳变会触发发车，部分点亮的状态被忽略。

use image::{Rgb, RgbImage};
use tracing::{debug, info};

/// 单个信号灯区域（按画面宽度比例）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LampBand {
    pub x_start: f64,
    pub x_end: f64,
}

/// 检测参数
#[derive(Debug, Clone, PartialEq)]
pub struct StartSignalConfig {
    /// 信号灯所在的顶部区域高度（画面高度比例）
    pub top_fraction: f64,
    /// 三个信号灯区域
    pub bands: [LampBand; 3],
    /// 红色判定：R 下限（不含）
    pub red_min_r: u8,
    /// 红色判定：G 上限（不含）
    pub red_max_g: u8,
    /// 红色判定：B 上限（不含）
    pub red_max_b: u8,
    /// 点亮判定：红色像素占比下限（不含）
    pub lit_ratio: f64,
}

impl Default for StartSignalConfig {
    fn default() -> Self {
        Self {
            top_fraction: 0.2,
            bands: [
                LampBand {
                    x_start: 0.35,
                    x_end: 0.50,
                },
                LampBand {
                    x_start: 0.55,
                    x_end: 0.70,
                },
                LampBand {
                    x_start: 0.75,
                    x_end: 0.90,
                },
            ],
            red_min_r: 140,
            red_max_g: 130,
            red_max_b: 130,
            lit_ratio: 0.03,
        }
    }
}

/// 单帧信号灯观测结果（不持久化）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LampObservation {
    pub lit: [bool; 3],
}

impl LampObservation {
    pub fn new(lit: [bool; 3]) -> Self {
        Self { lit }
    }

    pub fn lit_count(&self) -> usize {
        self.lit.iter().filter(|&&lit| lit).count()
    }

    pub fn all_lit(&self) -> bool {
        self.lit_count() == 3
    }

    pub fn none_lit(&self) -> bool {
        self.lit_count() == 0
    }
}

/// 发车信号检测器（每个会话一个实例）
#[derive(Debug, Clone, Default)]
pub struct StartSignalDetector {
    config: StartSignalConfig,
    armed: bool,
}

impl StartSignalDetector {
    pub fn new(config: StartSignalConfig) -> Self {
        Self {
            config,
            armed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn config(&self) -> &StartSignalConfig {
        &self.config
    }

    /// 观测一帧，返回是否发车
    ///
    /// 灯区为空（图像过小）时没有观测结果，不发车，`armed` 保持不变。
    pub fn observe(&mut self, image: &RgbImage) -> bool {
        match self.observe_lamps(image) {
            Some(observation) => self.update(observation),
            None => {
                debug!("Start lamp region is empty, skipping frame");
                false
            },
        }
    }

    /// 按迟滞规则更新 `armed`，返回是否发车
    pub fn update(&mut self, observation: LampObservation) -> bool {
        if observation.all_lit() {
            if !self.armed {
                debug!("Start lamps all lit, armed");
            }
            self.armed = true;
            return false;
        }

        if observation.none_lit() && self.armed {
            self.armed = false;
            info!("Start lamps went dark: GO");
            return true;
        }

        false
    }

    /// 计算三个区域的点亮状态；任一区域为空时返回 `None`
    pub fn observe_lamps(&self, image: &RgbImage) -> Option<LampObservation> {
        let (width, height) = image.dimensions();
        let top = (height as f64 * self.config.top_fraction) as u32;

        let mut lit = [false; 3];
        for (slot, band) in lit.iter_mut().zip(self.config.bands.iter()) {
            let x0 = (width as f64 * band.x_start) as u32;
            let x1 = ((width as f64 * band.x_end) as u32).min(width);
            *slot = self.red_ratio(image, x0, x1, top)? > self.config.lit_ratio;
        }

        Some(LampObservation { lit })
    }

    /// 区域 `[x0, x1) × [0, y1)` 内的红色像素占比（空区域为 `None`）
    fn red_ratio(&self, image: &RgbImage, x0: u32, x1: u32, y1: u32) -> Option<f64> {
        if x1 <= x0 || y1 == 0 {
            return None;
        }

        let mut red = 0usize;
        for y in 0..y1 {
            for x in x0..x1 {
                if self.is_red(image.get_pixel(x, y)) {
                    red += 1;
                }
            }
        }

        let total = ((x1 - x0) as usize) * (y1 as usize);
        Some(red as f64 / total as f64)
    }

    #[inline]
    fn is_red(&self, pixel: &Rgb<u8>) -> bool {
        let [r, g, b] = pixel.0;
        r > self.config.red_min_r && g < self.config.red_max_g && b < self.config.red_max_b
    }
}
