// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像文件
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::debug;
use uuid::Uuid;

use crate::{
  config::Config,
  model::DetectResult,
  output::{
    Render, RenderError,
    draw::{Draw, DrawDetectionOnImage},
  },
};

const OUTPUT_EXTENSION: &str = "jpg";

/// 已写入磁盘的标注图像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
  pub file_name: String,
  pub path: PathBuf,
  pub url: String,
}

/// 将标注后的图像以随机文件名写入输出目录
pub struct SaveImageFileOutput {
  directory: PathBuf,
  url_prefix: String,
  draw: Draw,
}

impl SaveImageFileOutput {
  pub fn new(
    directory: impl Into<PathBuf>,
    url_prefix: impl Into<String>,
  ) -> Result<Self, RenderError> {
    Ok(Self {
      directory: directory.into(),
      url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
      draw: Draw::new()?,
    })
  }

  pub fn from_config(config: &Config) -> Result<Self, RenderError> {
    Self::new(config.output_dir(), config.output_url_prefix())
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn unique_file_name() -> String {
    format!("{}.{}", Uuid::new_v4().simple(), OUTPUT_EXTENSION)
  }

  fn save_image(&self, image: &RgbImage) -> Result<SavedImage, RenderError> {
    std::fs::create_dir_all(&self.directory)?;

    let file_name = Self::unique_file_name();
    let path = self.directory.join(&file_name);
    image.save(&path)?;

    debug!("保存图像到文件: {}", path.display());

    Ok(SavedImage {
      url: format!("{}/{}", self.url_prefix, file_name),
      file_name,
      path,
    })
  }
}

impl Render<RgbImage, DetectResult> for SaveImageFileOutput {
  type Artifact = SavedImage;
  type Error = RenderError;

  fn render_result(
    &self,
    frame: &RgbImage,
    result: &DetectResult,
  ) -> Result<Self::Artifact, Self::Error> {
    let mut image = frame.clone();
    self.draw.draw_detections_on_image(&mut image, result);
    self.save_image(&image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;

  #[test]
  fn test_render_writes_unique_files() {
    let dir = tempfile::tempdir().unwrap();
    let output = SaveImageFileOutput::new(dir.path().join("output"), "/static/output/").unwrap();

    let frame = RgbImage::new(64, 48);
    let result = DetectResult::from(vec![DetectItem {
      class_id: 2,
      score: 0.75,
      bbox: [4.0, 14.0, 40.0, 40.0],
    }]);

    let first = output.render_result(&frame, &result).unwrap();
    let second = output.render_result(&frame, &result).unwrap();

    assert_ne!(first.file_name, second.file_name);
    for saved in [&first, &second] {
      let stem = saved.file_name.strip_suffix(".jpg").unwrap();
      assert_eq!(stem.len(), 32);
      assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
      assert_eq!(saved.url, format!("/static/output/{}", saved.file_name));
      assert!(saved.path.is_file());

      let reloaded = image::open(&saved.path).unwrap();
      assert_eq!((reloaded.width(), reloaded.height()), (64, 48));
    }
  }

  #[test]
  fn test_from_config() {
    let config = Config::default();
    let output = SaveImageFileOutput::from_config(&config).unwrap();
    assert_eq!(output.directory(), config.output_dir().as_path());
    assert_eq!(output.url_prefix, "/static/output");
  }
}
