// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 服务配置
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

/// 静态文件根目录
pub const STATIC_DIR: &str = "app/static";
/// 标注图片输出子目录（位于静态目录下）
pub const OUTPUT_SUBDIR: &str = "output";
/// 静态文件的 URL 前缀
pub const STATIC_URL_PREFIX: &str = "/static";
/// 模型文件路径
pub const MODEL_PATH: &str = "app/model/best.onnx";
/// 监听地址
pub const BIND_ADDR: &str = "0.0.0.0:8000";
/// 上传大小上限（字节）
pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// 服务运行配置
#[derive(Debug, Clone)]
pub struct Config {
  pub static_dir: PathBuf,
  pub output_subdir: String,
  pub static_url_prefix: String,
  pub model_path: PathBuf,
  pub bind: SocketAddr,
  pub max_upload_bytes: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      static_dir: PathBuf::from(STATIC_DIR),
      output_subdir: OUTPUT_SUBDIR.to_string(),
      static_url_prefix: STATIC_URL_PREFIX.to_string(),
      model_path: PathBuf::from(MODEL_PATH),
      bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
      max_upload_bytes: MAX_UPLOAD_BYTES,
    }
  }
}

impl Config {
  /// 标注图片的落盘目录
  pub fn output_dir(&self) -> PathBuf {
    self.static_dir.join(&self.output_subdir)
  }

  /// 标注图片的 URL 前缀，例如 `/static/output`
  pub fn output_url_prefix(&self) -> String {
    format!(
      "{}/{}",
      self.static_url_prefix.trim_end_matches('/'),
      self.output_subdir.trim_matches('/')
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_paths() {
    let config = Config::default();
    assert_eq!(config.output_dir(), PathBuf::from("app/static/output"));
    assert_eq!(config.model_path, PathBuf::from(MODEL_PATH));
    assert_eq!(config.bind, BIND_ADDR.parse::<SocketAddr>().unwrap());
  }

  #[test]
  fn test_output_url_prefix() {
    let mut config = Config::default();
    assert_eq!(config.output_url_prefix(), "/static/output");

    config.static_url_prefix = "/static/".to_string();
    config.output_subdir = "/output/".to_string();
    assert_eq!(config.output_url_prefix(), "/static/output");
  }
}
