// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use shanan_api::{
  config::{BIND_ADDR, Config, MAX_UPLOAD_BYTES, MODEL_PATH, STATIC_DIR},
  model::{YOLO_INTRA_THREADS, YoloBuilder, YoloParams},
};

/// Shanan 目标检测 HTTP 服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型文件路径
  #[arg(long, value_name = "FILE", default_value = MODEL_PATH)]
  pub model: PathBuf,

  /// 静态文件目录，标注图片写入其下的 output 子目录
  #[arg(long, value_name = "DIR", default_value = STATIC_DIR)]
  pub static_dir: PathBuf,

  /// 监听地址
  #[arg(long, value_name = "ADDR", default_value = BIND_ADDR)]
  pub bind: SocketAddr,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD", default_value_t = YoloParams::default().confidence)]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD", default_value_t = YoloParams::default().iou_threshold)]
  pub iou_threshold: f32,

  /// 模型输入边长
  #[arg(long, value_name = "PIXELS", default_value_t = YoloParams::default().image_size)]
  pub image_size: u32,

  /// 单张图片最多返回的检测数
  #[arg(long, value_name = "COUNT", default_value_t = YoloParams::default().max_detections)]
  pub max_detections: usize,

  /// ONNX Runtime 单次推理使用的线程数
  #[arg(long, value_name = "COUNT", default_value_t = YOLO_INTRA_THREADS)]
  pub intra_threads: usize,

  /// 上传大小上限（字节）
  #[arg(long, value_name = "BYTES", default_value_t = MAX_UPLOAD_BYTES)]
  pub max_upload_bytes: usize,
}

impl Args {
  pub fn config(&self) -> Config {
    Config {
      static_dir: self.static_dir.clone(),
      model_path: self.model.clone(),
      bind: self.bind,
      max_upload_bytes: self.max_upload_bytes,
      ..Config::default()
    }
  }

  pub fn model_builder(&self) -> YoloBuilder {
    YoloBuilder::new(&self.model)
      .confidence(self.confidence)
      .iou_threshold(self.iou_threshold)
      .image_size(self.image_size)
      .max_detections(self.max_detections)
      .intra_threads(self.intra_threads)
  }
}
