// 该文件是 Shanan （山南西风） 项目的一部分。
// src/server.rs - HTTP 接口
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
use std::sync::Arc;

use axum::{
  Json, Router,
  body::Bytes,
  extract::{
    DefaultBodyLimit, Multipart, State,
    multipart::{MultipartError, MultipartRejection},
  },
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
  config::Config,
  model::{ModelError, YoloBuilder},
  output::{RenderError, SaveImageFileOutput},
  task::{DetectError, DetectResponse, DetectTask},
};

pub const ROOT_MESSAGE: &str = "YOLO Object Detection API is Running";
const UPLOAD_FIELD: &str = "file";

/// 各请求共享的状态
#[derive(Clone)]
pub struct AppState {
  task: Arc<DetectTask>,
}

impl AppState {
  pub fn new(task: DetectTask) -> Self {
    Self {
      task: Arc::new(task),
    }
  }
}

#[derive(Error, Debug)]
pub enum StartupError {
  #[error("Failed to create output directory {}: {source}", .path.display())]
  OutputDir {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("Failed to load model: {0}")]
  Model(#[from] ModelError),
  #[error("Failed to initialize output: {0}")]
  Render(#[from] RenderError),
}

/// 创建输出目录并加载模型；模型缺失时不会得到可用的服务状态
pub fn prepare(config: &Config, builder: YoloBuilder) -> Result<AppState, StartupError> {
  let output_dir = config.output_dir();
  std::fs::create_dir_all(&output_dir).map_err(|source| StartupError::OutputDir {
    path: output_dir.clone(),
    source,
  })?;
  info!("输出目录: {}", output_dir.display());

  info!("正在加载模型...");
  let model = builder.build()?;
  let output = SaveImageFileOutput::from_config(config)?;

  Ok(AppState::new(DetectTask::new(Arc::new(model), output)))
}

/// GET / 响应
#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
  pub message: String,
}

/// 错误响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
  pub error: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
  #[error("{0}")]
  Rejection(#[from] MultipartRejection),
  #[error("{0}")]
  Upload(#[from] MultipartError),
  #[error("missing '{0}' field")]
  MissingField(&'static str),
  #[error("{0}")]
  Detect(#[from] DetectError),
}

impl ApiError {
  fn status(&self) -> StatusCode {
    match self {
      ApiError::Rejection(rejection) => rejection.status(),
      ApiError::Upload(e) => e.status(),
      ApiError::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
      // 输入错误与内部错误对外统一为 500
      ApiError::Detect(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    match &self {
      ApiError::Detect(e) if !e.is_bad_input() => error!(error = %e, "检测失败"),
      _ => warn!(error = %self, "请求无效"),
    }

    (
      status,
      Json(ErrorResponse {
        error: self.to_string(),
      }),
    )
      .into_response()
  }
}

pub fn create_router(state: AppState, config: &Config) -> Router {
  let static_prefix = format!("/{}", config.static_url_prefix.trim_matches('/'));

  Router::new()
    .route("/", get(root))
    .route("/detect/", post(detect))
    .route("/detect", post(detect))
    .nest_service(&static_prefix, ServeDir::new(&config.static_dir))
    .layer(DefaultBodyLimit::max(config.max_upload_bytes))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// GET / - 服务存活确认
async fn root() -> Json<RootResponse> {
  Json(RootResponse {
    message: ROOT_MESSAGE.to_string(),
  })
}

/// POST /detect/ - 上传图片并返回检测结果与标注图地址
async fn detect(
  State(state): State<AppState>,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectResponse>, ApiError> {
  let data = read_upload(multipart?).await?;

  let task = state.task.clone();
  let response = tokio::task::spawn_blocking(move || task.run_task(&data))
    .await
    .map_err(|e| DetectError::Worker(e.to_string()))??;

  Ok(Json(response))
}

async fn read_upload(mut multipart: Multipart) -> Result<Bytes, ApiError> {
  while let Some(field) = multipart.next_field().await? {
    if field.name() == Some(UPLOAD_FIELD) {
      return Ok(field.bytes().await?);
    }
  }
  Err(ApiError::MissingField(UPLOAD_FIELD))
}
