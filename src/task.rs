// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 单次检测任务
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

use std::time::Instant;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  model::{DetectItem, Model, ModelError, SharedModel},
  output::{Render, RenderError, SaveImageFileOutput},
};

/// 单个检测结果，坐标为整数像素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
  pub x1: i64,
  pub y1: i64,
  pub x2: i64,
  pub y2: i64,
  pub confidence: f64,
  #[serde(rename = "class")]
  pub class_id: i64,
}

impl From<&DetectItem> for DetectionRecord {
  fn from(item: &DetectItem) -> Self {
    // 坐标向零截断
    Self {
      x1: item.bbox[0] as i64,
      y1: item.bbox[1] as i64,
      x2: item.bbox[2] as i64,
      y2: item.bbox[3] as i64,
      confidence: item.score as f64,
      class_id: item.class_id as i64,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectResponse {
  pub detections: Vec<DetectionRecord>,
  pub image_url: String,
}

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("Failed to decode image: {0}")]
  Decode(image::ImageError),
  #[error("Inference failed: {0}")]
  Inference(#[from] ModelError),
  #[error("Failed to render result: {0}")]
  Render(#[from] RenderError),
  #[error("Detection worker failed: {0}")]
  Worker(String),
}

impl DetectError {
  /// 是否由客户端输入导致
  pub fn is_bad_input(&self) -> bool {
    matches!(self, DetectError::Decode(_))
  }
}

pub fn decode_image(data: &[u8]) -> Result<RgbImage, DetectError> {
  let image = image::load_from_memory(data).map_err(DetectError::Decode)?;
  Ok(image.to_rgb8())
}

/// 解码 -> 推理 -> 绘制保存 -> 组装响应
pub struct DetectTask {
  model: SharedModel,
  output: SaveImageFileOutput,
}

impl DetectTask {
  pub fn new(model: SharedModel, output: SaveImageFileOutput) -> Self {
    Self { model, output }
  }

  pub fn run_task(&self, data: &[u8]) -> Result<DetectResponse, DetectError> {
    let now = Instant::now();
    let frame = decode_image(data)?;
    debug!(
      "图像解码完成: {}x{}, {} 字节",
      frame.width(),
      frame.height(),
      data.len()
    );

    let result = self.model.infer(&frame)?;
    let infer_elapsed = now.elapsed();
    if result.is_empty() {
      debug!("未检测到对象");
    }

    let saved = self.output.render_result(&frame, &result)?;
    info!(
      "检测完成: {} 个对象，推理耗时: {:.2?}，总耗时: {:.2?}，输出: {}",
      result.len(),
      infer_elapsed,
      now.elapsed(),
      saved.file_name
    );

    Ok(DetectResponse {
      detections: result.items.iter().map(DetectionRecord::from).collect(),
      image_url: saved.url,
    })
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;
  use std::sync::Arc;

  use super::*;
  use crate::model::DetectResult;

  struct FixedModel(Vec<DetectItem>);

  impl Model for FixedModel {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = ModelError;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      Ok(DetectResult::from(self.0.clone()))
    }
  }

  struct FailingModel;

  impl Model for FailingModel {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = ModelError;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      Err(ModelError::InvalidOutput("boom".to_string()))
    }
  }

  fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    RgbImage::new(width, height)
      .write_to(&mut buffer, image::ImageFormat::Png)
      .unwrap();
    buffer.into_inner()
  }

  fn task(model: SharedModel, dir: &tempfile::TempDir) -> DetectTask {
    let output = SaveImageFileOutput::new(dir.path(), "/static/output").unwrap();
    DetectTask::new(model, output)
  }

  #[test]
  fn test_record_truncates_coordinates() {
    let record = DetectionRecord::from(&DetectItem {
      class_id: 5,
      score: 0.5,
      bbox: [10.9, 0.2, 99.99, 50.5],
    });
    assert_eq!((record.x1, record.y1, record.x2, record.y2), (10, 0, 99, 50));
    assert_eq!(record.confidence, 0.5);
    assert_eq!(record.class_id, 5);

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["class"], 5);
    assert!(json.get("class_id").is_none());
  }

  #[test]
  fn test_run_task_keeps_engine_order() {
    let dir = tempfile::tempdir().unwrap();
    let items = vec![
      DetectItem {
        class_id: 1,
        score: 0.3,
        bbox: [1.0, 1.0, 10.0, 10.0],
      },
      DetectItem {
        class_id: 0,
        score: 0.9,
        bbox: [5.0, 5.0, 20.0, 20.0],
      },
    ];
    let task = task(Arc::new(FixedModel(items)), &dir);

    let response = task.run_task(&png_bytes(32, 32)).unwrap();
    assert_eq!(response.detections.len(), 2);
    assert_eq!(response.detections[0].class_id, 1);
    assert_eq!(response.detections[1].class_id, 0);

    let file_name = response.image_url.strip_prefix("/static/output/").unwrap();
    assert!(dir.path().join(file_name).is_file());
  }

  #[test]
  fn test_run_task_rejects_non_image() {
    let dir = tempfile::tempdir().unwrap();
    let task = task(Arc::new(FixedModel(vec![])), &dir);

    let err = task.run_task(b"definitely not an image").unwrap_err();
    assert!(err.is_bad_input());
    assert!(!err.to_string().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
  }

  #[test]
  fn test_run_task_inference_failure() {
    let dir = tempfile::tempdir().unwrap();
    let task = task(Arc::new(FailingModel), &dir);

    let err = task.run_task(&png_bytes(8, 8)).unwrap_err();
    assert!(matches!(err, DetectError::Inference(_)));
    assert!(!err.is_bad_input());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
  }

  #[test]
  fn test_decode_normalizes_to_rgb() {
    let mut buffer = Cursor::new(Vec::new());
    image::GrayImage::new(4, 3)
      .write_to(&mut buffer, image::ImageFormat::Png)
      .unwrap();

    let frame = decode_image(buffer.get_ref()).unwrap();
    assert_eq!(frame.dimensions(), (4, 3));
  }
}
