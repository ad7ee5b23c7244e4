// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 模型输入帧定义
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::{
  Rgb, RgbImage,
  imageops::{self, FilterType},
};
use ndarray::Array4;

const RGB_CHANNELS: usize = 3;
const LETTERBOX_FILL: [u8; 3] = [114, 114, 114];

/// 按比例缩放并填充为正方形的 NCHW 输入帧，像素归一化到 [0, 1]
#[derive(Debug, Clone)]
pub struct LetterboxFrame {
  data: Array4<f32>,
  scale: f32,
  pad_x: f32,
  pad_y: f32,
  source_width: u32,
  source_height: u32,
}

impl LetterboxFrame {
  pub fn from_rgb_image(image: &RgbImage, size: u32) -> Self {
    let (source_width, source_height) = image.dimensions();
    let size = size.max(1);

    let scale =
      (size as f32 / source_width.max(1) as f32).min(size as f32 / source_height.max(1) as f32);
    let new_w = ((source_width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((source_height as f32 * scale).round() as u32).clamp(1, size);

    // 与 Ultralytics 相同的取整方式，保证坐标还原一致
    let left = ((size - new_w) as f32 / 2.0 - 0.1).round().max(0.0) as u32;
    let top = ((size - new_h) as f32 / 2.0 - 0.1).round().max(0.0) as u32;

    let resized = if (new_w, new_h) == (source_width, source_height) {
      image.clone()
    } else {
      imageops::resize(image, new_w, new_h, FilterType::Triangle)
    };

    let mut canvas = RgbImage::from_pixel(size, size, Rgb(LETTERBOX_FILL));
    imageops::replace(&mut canvas, &resized, left as i64, top as i64);

    let side = size as usize;
    let mut data = Array4::<f32>::zeros((1, RGB_CHANNELS, side, side));
    for (x, y, pixel) in canvas.enumerate_pixels() {
      for c in 0..RGB_CHANNELS {
        data[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
      }
    }

    Self {
      data,
      scale,
      pad_x: left as f32,
      pad_y: top as f32,
      source_width,
      source_height,
    }
  }

  pub fn as_nchw(&self) -> &Array4<f32> {
    &self.data
  }

  /// 将模型输入空间下的 [x_min, y_min, x_max, y_max] 还原到原图坐标并裁剪到图像范围内
  pub fn restore_bbox(&self, bbox: [f32; 4]) -> [f32; 4] {
    let w = self.source_width as f32;
    let h = self.source_height as f32;
    [
      ((bbox[0] - self.pad_x) / self.scale).clamp(0.0, w),
      ((bbox[1] - self.pad_y) / self.scale).clamp(0.0, h),
      ((bbox[2] - self.pad_x) / self.scale).clamp(0.0, w),
      ((bbox[3] - self.pad_y) / self.scale).clamp(0.0, h),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_letterbox_wide_image() {
    let image = RgbImage::from_pixel(200, 100, Rgb([255, 0, 0]));
    let frame = LetterboxFrame::from_rgb_image(&image, 64);

    assert_eq!(frame.as_nchw().shape(), &[1, 3, 64, 64]);
    assert!((frame.scale - 0.32).abs() < 1e-6);

    // 上方填充区域为灰色，中间为原图内容
    let data = frame.as_nchw();
    assert!((data[[0, 0, 0, 0]] - 114.0 / 255.0).abs() < 1e-6);
    assert!((data[[0, 0, 32, 32]] - 1.0).abs() < 1e-6);
    assert!(data[[0, 1, 32, 32]].abs() < 1e-6);
  }

  #[test]
  fn test_restore_bbox_roundtrip() {
    let image = RgbImage::new(200, 100);
    let frame = LetterboxFrame::from_rgb_image(&image, 64);

    // 原图 (50, 25) - (150, 75) 在输入空间中为 (16, 24) - (48, 40)
    let restored = frame.restore_bbox([16.0, 24.0, 48.0, 40.0]);
    assert!((restored[0] - 50.0).abs() < 1e-3);
    assert!((restored[1] - 25.0).abs() < 1e-3);
    assert!((restored[2] - 150.0).abs() < 1e-3);
    assert!((restored[3] - 75.0).abs() < 1e-3);
  }

  #[test]
  fn test_restore_bbox_clamps() {
    let image = RgbImage::new(100, 100);
    let frame = LetterboxFrame::from_rgb_image(&image, 100);

    let restored = frame.restore_bbox([-10.0, -5.0, 120.0, 130.0]);
    assert_eq!(restored, [0.0, 0.0, 100.0, 100.0]);
    assert_eq!((frame.source_width, frame.source_height), (100, 100));
  }
}
