// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolo.rs - YOLO ONNX 模型
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

use std::path::PathBuf;
use std::sync::Mutex;

use image::RgbImage;
use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2};
#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Value;
use tracing::{debug, error, info};

use crate::{
  frame::LetterboxFrame,
  model::{DetectItem, DetectResult, Model, ModelError},
};

const YOLO_INPUT_SIZE: u32 = 640;
const YOLO_CONFIDENCE: f32 = 0.25;
const YOLO_IOU_THRESHOLD: f32 = 0.7;
const YOLO_MAX_DETECTIONS: usize = 300;
pub const YOLO_INTRA_THREADS: usize = 4;
const YOLO_DEFAULT_INPUT_NAME: &str = "images";
// 端到端导出（如 YOLO26）每行为 [x1, y1, x2, y2, score, class]
const YOLO_END2END_ROW: usize = 6;

/// 后处理参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloParams {
  pub confidence: f32,
  pub iou_threshold: f32,
  pub image_size: u32,
  pub max_detections: usize,
}

impl Default for YoloParams {
  fn default() -> Self {
    Self {
      confidence: YOLO_CONFIDENCE,
      iou_threshold: YOLO_IOU_THRESHOLD,
      image_size: YOLO_INPUT_SIZE,
      max_detections: YOLO_MAX_DETECTIONS,
    }
  }
}

pub struct Yolo {
  session: Mutex<Session>,
  input_name: String,
  params: YoloParams,
}

impl std::fmt::Debug for Yolo {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Yolo")
      .field("input_name", &self.input_name)
      .field("params", &self.params)
      .finish_non_exhaustive()
  }
}

pub struct YoloBuilder {
  model_path: PathBuf,
  params: YoloParams,
  intra_threads: usize,
}

impl YoloBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      params: YoloParams::default(),
      intra_threads: YOLO_INTRA_THREADS,
    }
  }

  pub fn confidence(mut self, confidence: f32) -> Self {
    self.params.confidence = confidence.clamp(0.0, 1.0);
    self
  }

  pub fn iou_threshold(mut self, iou_threshold: f32) -> Self {
    self.params.iou_threshold = iou_threshold.clamp(0.0, 1.0);
    self
  }

  pub fn image_size(mut self, image_size: u32) -> Self {
    self.params.image_size = image_size.max(32);
    self
  }

  pub fn max_detections(mut self, max_detections: usize) -> Self {
    self.params.max_detections = max_detections;
    self
  }

  pub fn intra_threads(mut self, intra_threads: usize) -> Self {
    self.intra_threads = intra_threads.max(1);
    self
  }

  pub fn build(self) -> Result<Yolo, ModelError> {
    if !self.model_path.is_file() {
      error!("模型文件不存在: {}", self.model_path.display());
      return Err(ModelError::NotFound(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let model_size = std::fs::metadata(&self.model_path)?.len();
    debug!("模型文件大小: {:.2} MB", model_size as f64 / (1024.0 * 1024.0));

    info!("创建 ONNX Runtime 推理会话");
    let session = self.create_session()?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .unwrap_or_else(|| YOLO_DEFAULT_INPUT_NAME.to_string());
    debug!("模型输入: {}", input_name);
    for output in session.outputs.iter() {
      debug!("模型输出: {}", output.name);
    }

    info!("模型加载完成，参数: {:?}", self.params);

    Ok(Yolo {
      session: Mutex::new(session),
      input_name,
      params: self.params,
    })
  }

  fn create_session(&self) -> Result<Session, ModelError> {
    #[allow(unused_mut)]
    let mut builder = Session::builder().map_err(session_error)?;

    #[cfg(feature = "cuda")]
    {
      // 注册失败时 ONNX Runtime 会自动回退到 CPU
      builder = builder
        .with_execution_providers([CUDAExecutionProvider::default().build()])
        .map_err(session_error)?;
    }

    builder
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(session_error)?
      .with_intra_threads(self.intra_threads)
      .map_err(session_error)?
      .commit_from_file(&self.model_path)
      .map_err(session_error)
  }
}

fn session_error(e: impl std::fmt::Display) -> ModelError {
  ModelError::Session(e.to_string())
}

impl Model for Yolo {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入");
    let frame = LetterboxFrame::from_rgb_image(input, self.params.image_size);
    let tensor = Value::from_array(frame.as_nchw().to_owned())?;

    let mut session = self.session.lock().map_err(|_| ModelError::Poisoned)?;

    debug!("执行模型推理");
    let outputs = session.run(ort::inputs![self.input_name.as_str() => tensor])?;

    debug!("后处理模型输出");
    let output = outputs[0].try_extract_array::<f32>()?;
    let items = postprocess(output, &frame, &self.params)?;

    debug!("检测到 {} 个物体", items.len());
    Ok(DetectResult::from(items))
  }
}

/// 解码模型输出，结果按置信度降序排列，坐标还原到原图
pub(crate) fn postprocess(
  output: ArrayViewD<'_, f32>,
  frame: &LetterboxFrame,
  params: &YoloParams,
) -> Result<Vec<DetectItem>, ModelError> {
  let shape = output.shape().to_vec();
  if shape.len() != 3 || shape[0] != 1 {
    return Err(ModelError::InvalidOutput(format!(
      "expected output shape [1, C, N], got {:?}",
      shape
    )));
  }

  let table = output
    .index_axis(Axis(0), 0)
    .into_dimensionality::<Ix2>()
    .map_err(|e| ModelError::InvalidOutput(e.to_string()))?;

  let items = if shape[2] == YOLO_END2END_ROW && shape[1] != YOLO_END2END_ROW {
    decode_end_to_end(table, params)
  } else {
    let candidates = decode_raw(table, params)?;
    nms(candidates, params.iou_threshold, params.max_detections)
  };

  Ok(
    items
      .into_iter()
      .map(|item| DetectItem {
        bbox: frame.restore_bbox(item.bbox),
        ..item
      })
      .collect(),
  )
}

/// 原始输出布局 [4 + 类别数, 候选框数]，前四行为 cx, cy, w, h
fn decode_raw(
  table: ArrayView2<'_, f32>,
  params: &YoloParams,
) -> Result<Vec<DetectItem>, ModelError> {
  let (rows, columns) = table.dim();
  if rows <= 4 {
    return Err(ModelError::InvalidOutput(format!(
      "expected at least 5 rows per candidate, got {}",
      rows
    )));
  }

  let mut items = Vec::new();
  for i in 0..columns {
    let (class_id, score) = (4..rows)
      .map(|row| (row - 4, table[[row, i]]))
      .fold((0usize, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

    if score <= params.confidence {
      continue;
    }

    let cx = table[[0, i]];
    let cy = table[[1, i]];
    let w = table[[2, i]];
    let h = table[[3, i]];

    items.push(DetectItem {
      class_id: class_id as u32,
      score,
      bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
    });
  }

  debug!("置信度过滤后候选框数量: {}", items.len());
  Ok(items)
}

fn decode_end_to_end(table: ArrayView2<'_, f32>, params: &YoloParams) -> Vec<DetectItem> {
  table
    .outer_iter()
    .filter(|row| row[4] > params.confidence)
    .take(params.max_detections)
    .map(|row| DetectItem {
      class_id: row[5].max(0.0) as u32,
      score: row[4],
      bbox: [row[0], row[1], row[2], row[3]],
    })
    .collect()
}

/// 按类别分别做非极大值抑制
fn nms(
  mut candidates: Vec<DetectItem>,
  iou_threshold: f32,
  max_detections: usize,
) -> Vec<DetectItem> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<DetectItem> = Vec::new();
  for candidate in candidates {
    if kept.len() >= max_detections {
      break;
    }
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold);
    if !suppressed {
      kept.push(candidate);
    }
  }
  kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}
