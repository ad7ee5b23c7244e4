// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::{
  model::{DetectItem, DetectResult},
  output::RenderError,
};

static FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 12.0;
const LABEL_OFFSET_Y: i32 = 10; // 标签位于边框上方
const BOX_LINE_WIDTH: i32 = 3;
const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色

pub struct Draw {
  font: FontArc,
  font_scale: PxScale,
  line_width: i32,
  color: Rgb<u8>,
}

impl Draw {
  pub fn new() -> Result<Self, RenderError> {
    let font = FontArc::try_from_slice(FONT_DATA)?;

    Ok(Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      line_width: BOX_LINE_WIDTH,
      color: Rgb(BOX_COLOR),
    })
  }

  pub fn with_line_width(mut self, line_width: i32) -> Self {
    self.line_width = line_width.max(1);
    self
  }

  pub fn label_text(item: &DetectItem) -> String {
    format!("Class {}: {:.2}", item.class_id, item.score)
  }

  // 边框向内加粗，bbox 为原图像素坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox(&self, image: &mut RgbImage, bbox: &[f32; 4]) {
    let x_min = bbox[0] as i32;
    let y_min = bbox[1] as i32;
    let x_max = bbox[2] as i32;
    let y_max = bbox[3] as i32;

    for inset in 0..self.line_width {
      let left = x_min + inset;
      let top = y_min + inset;
      let right = x_max - inset;
      let bottom = y_max - inset;
      if left > right || top > bottom {
        break;
      }

      let rect =
        Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
      draw_hollow_rect_mut(image, rect, self.color);
    }
  }

  fn draw_label(&self, image: &mut RgbImage, item: &DetectItem) {
    let label = Self::label_text(item);
    draw_text_mut(
      image,
      self.color,
      item.bbox[0] as i32,
      item.bbox[1] as i32 - LABEL_OFFSET_Y,
      self.font_scale,
      &self.font,
      &label,
    );
  }
}

pub trait DrawDetectionOnImage {
  fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult);
}

impl DrawDetectionOnImage for Draw {
  fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult) {
    // 保持模型输出顺序
    for item in result.items.iter() {
      self.draw_bbox(image, &item.bbox);
      self.draw_label(image, item);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  #[test]
  fn test_label_text() {
    assert_eq!(Draw::label_text(&item(3, 0.899, [0.0; 4])), "Class 3: 0.90");
    assert_eq!(Draw::label_text(&item(0, 1.0, [0.0; 4])), "Class 0: 1.00");
  }

  #[test]
  fn test_draw_box_outline() {
    let draw = Draw::new().unwrap();
    let mut image = RgbImage::new(100, 100);
    let result = DetectResult::from(vec![item(0, 0.9, [10.0, 30.0, 60.0, 80.0])]);

    draw.draw_detections_on_image(&mut image, &result);

    let red = Rgb(BOX_COLOR);
    assert_eq!(*image.get_pixel(10, 50), red);
    assert_eq!(*image.get_pixel(12, 50), red);
    assert_eq!(*image.get_pixel(60, 50), red);
    assert_eq!(*image.get_pixel(35, 80), red);
    // 线宽为 3，框内部保持不变
    assert_eq!(*image.get_pixel(13, 50), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(35, 55), Rgb([0, 0, 0]));
  }

  #[test]
  fn test_draw_label_above_box() {
    let draw = Draw::new().unwrap();
    let mut image = RgbImage::new(120, 100);
    let result = DetectResult::from(vec![item(7, 0.5, [10.0, 40.0, 100.0, 90.0])]);

    draw.draw_detections_on_image(&mut image, &result);

    let label_pixels = (30..40u32)
      .flat_map(|y| (10..100u32).map(move |x| (x, y)))
      .filter(|&(x, y)| image.get_pixel(x, y)[0] > 0)
      .count();
    assert!(label_pixels > 0);
  }

  #[test]
  fn test_degenerate_and_out_of_bounds_boxes() {
    let draw = Draw::new().unwrap().with_line_width(5);
    let mut image = RgbImage::new(20, 20);
    let result = DetectResult::from(vec![
      item(0, 0.5, [5.0, 5.0, 5.0, 5.0]),
      item(1, 0.5, [0.0, 0.0, 40.0, 40.0]),
    ]);

    draw.draw_detections_on_image(&mut image, &result);
    assert_eq!(*image.get_pixel(0, 10), Rgb(BOX_COLOR));
    assert_eq!(*image.get_pixel(19, 10), Rgb([0, 0, 0]));
  }
}
