use std::path::{Path, PathBuf};

use crate::{
    errors::{ObjSpeedError, Result},
    layout::LayoutHint,
    tensor::{Tensor, TensorElement},
    traits::{EngineLoader, InferenceEngine},
};
use image::{imageops, imageops::FilterType, DynamicImage};
use log::{debug, info};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
    tensor::TensorElementType,
    value::{DynValue, TensorRef, ValueType},
};
use parking_lot::Mutex;

/// 入力形状が動的な場合に使う入力サイズ
pub const DEFAULT_INPUT_SIZE: u32 = 640;

fn ort_error<E>(operation: impl Into<String>) -> impl FnOnce(E) -> ObjSpeedError
where
    E: Into<ort::Error>,
{
    let operation = operation.into();
    move |err| ObjSpeedError::Model {
        operation,
        source: Box::new(err.into()),
    }
}

/// ONNX Runtime で動くセグメンテーションモデル
pub struct OnnxModel {
    name: String,
    input_size: u32,
    input_name: String,
    output_name: String,
    layout_hint: Option<LayoutHint>,
    session: Mutex<Session>,
}

impl OnnxModel {
    pub fn load(model_path: &Path, device_id: i32, layout_hint: Option<LayoutHint>) -> Result<Self> {
        if !model_path.is_file() {
            return Err(ObjSpeedError::FileSystem {
                path: model_path.to_path_buf(),
                operation: "model lookup".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "model file does not exist",
                ),
            });
        }

        let mut session = SessionBuilder::new()
            .map_err(ort_error("session builder initialisation"))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(ort_error("execution provider setup"))?
            .with_memory_pattern(true)
            .map_err(ort_error("memory pattern setup"))?
            .commit_from_file(model_path)
            .map_err(ort_error(format!(
                "model load: {}",
                model_path.display()
            )))?;

        let input = session.inputs.first().ok_or_else(|| ObjSpeedError::Model {
            operation: "model input lookup".to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "model declares no inputs",
            )),
        })?;
        let input_name = input.name.clone();
        let input_size = input
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .and_then(|size| u32::try_from(size).ok())
            .filter(|&size| size > 0)
            .unwrap_or(DEFAULT_INPUT_SIZE);

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| ObjSpeedError::Model {
                operation: "model output lookup".to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "model declares no outputs",
                )),
            })?;

        // Warm-up run; the first real inference should not include graph setup.
        let data = Array4::<f32>::zeros((1, 3, input_size as usize, input_size as usize));
        session
            .run(ort::inputs![input_name.as_str() => TensorRef::from_array_view(&data)
                .map_err(ort_error("warm-up tensor creation"))?])
            .map_err(ort_error("warm-up run"))?;

        let name = model_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| model_path.display().to_string());
        info!(
            "loaded {} (input {}x{}, output `{}`)",
            name, input_size, input_size, output_name
        );

        Ok(Self {
            name,
            input_size,
            input_name,
            output_name,
            layout_hint,
            session: Mutex::new(session),
        })
    }
}

impl InferenceEngine for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn layout_hint(&self) -> Option<LayoutHint> {
        self.layout_hint
    }

    fn infer(&self, image: &DynamicImage) -> Result<Option<Tensor>> {
        let input = preprocess(image, self.input_size);

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => TensorRef::from_array_view(&input.as_standard_layout())
                .map_err(ort_error("input tensor creation"))?])
            .map_err(ort_error("inference"))?;

        let Some(value) = outputs.get(self.output_name.as_str()) else {
            debug!("{} produced no `{}` output", self.name, self.output_name);
            return Ok(None);
        };
        output_to_tensor(value).map(Some)
    }
}

/// Copy an ort output into a [`Tensor`], keeping its element type.
fn output_to_tensor(value: &DynValue) -> Result<Tensor> {
    match value.dtype() {
        ValueType::Tensor { ty, .. } => match ty {
            TensorElementType::Float32 => extract::<f32>(value),
            TensorElementType::Float64 => extract::<f64>(value),
            TensorElementType::Float16 => extract::<half::f16>(value),
            TensorElementType::Int32 => extract::<i32>(value),
            TensorElementType::Int64 => extract::<i64>(value),
            TensorElementType::Int8 => extract::<i8>(value),
            TensorElementType::Uint8 => extract::<u8>(value),
            other => Err(ObjSpeedError::Model {
                operation: "output extraction".to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unsupported output element type {:?}", other),
                )),
            }),
        },
        other => Err(ObjSpeedError::Model {
            operation: "output extraction".to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("output is not a tensor: {:?}", other),
            )),
        }),
    }
}

fn extract<T>(value: &DynValue) -> Result<Tensor>
where
    T: TensorElement + ort::tensor::PrimitiveTensorElementType + std::fmt::Debug,
{
    let array = value.try_extract_array::<T>()?;
    Tensor::from_array(array)
}

/// 画像をモデル入力の `1x3xSxS` テンソル（値域 0〜1）に変換
pub fn preprocess(image: &DynamicImage, input_size: u32) -> Array4<f32> {
    let rgb = imageops::resize(&image.to_rgb8(), input_size, input_size, FilterType::Triangle);
    rgb.as_ndarray3()
        .insert_axis(Axis(0))
        .mapv(|v| f32::from(v) / 255.0)
}

/// モデルファイルのパスをキーに [`OnnxModel`] を読み込む
#[derive(Debug, Clone)]
pub struct OnnxLoader {
    device_id: i32,
    layout_hint: Option<LayoutHint>,
}

impl OnnxLoader {
    pub const fn new(device_id: i32, layout_hint: Option<LayoutHint>) -> Self {
        Self {
            device_id,
            layout_hint,
        }
    }
}

impl EngineLoader for OnnxLoader {
    type Engine = OnnxModel;

    fn load(&self, model: &str) -> Result<OnnxModel> {
        OnnxModel::load(&PathBuf::from(model), self.device_id, self.layout_hint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_preprocess_shape_and_range() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 20, Rgb([255, 0, 51])));
        let tensor = preprocess(&image, 16);

        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
        assert!((tensor[[0, 0, 5, 5]] - 1.0).abs() < 5e-3);
        assert!(tensor[[0, 1, 5, 5]].abs() < 5e-3);
        assert!((tensor[[0, 2, 5, 5]] - 0.2).abs() < 5e-3);
    }

    #[test]
    fn test_ort_error_keeps_source() {
        let err = ort_error("warm-up run")(ort::Error::new("no kernel for op"));
        assert!(matches!(&err, ObjSpeedError::Model { operation, .. } if operation == "warm-up run"));

        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert!(source.is_some_and(|s| s.contains("no kernel for op")));
    }

    #[test]
    fn test_missing_model_file() {
        let err = OnnxLoader::new(0, None)
            .load("definitely/not/here.onnx")
            .err()
            .unwrap();
        assert!(matches!(err, ObjSpeedError::FileSystem { .. }));
    }
}
