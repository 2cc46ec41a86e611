use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::{ObjSpeedError, Result};
use crate::layout::LayoutHint;
use crate::tensor::Tensor;
use crate::traits::{EngineLoader, InferenceEngine};
use image::DynamicImage;

/// テスト用のモック推論エンジン
///
/// 入力画像に関係なく、保持しているテンソルをそのまま返す
#[derive(Debug, Clone)]
pub struct MockEngine {
    pub name: String,
    pub input_size: u32,
    pub tensor: Option<Tensor>,
    pub layout_hint: Option<LayoutHint>,
}

impl MockEngine {
    pub fn new(name: impl Into<String>, tensor: Option<Tensor>) -> Self {
        Self {
            name: name.into(),
            input_size: 640,
            tensor,
            layout_hint: None,
        }
    }

    pub const fn with_layout_hint(mut self, hint: LayoutHint) -> Self {
        self.layout_hint = Some(hint);
        self
    }
}

impl InferenceEngine for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn layout_hint(&self) -> Option<LayoutHint> {
        self.layout_hint
    }

    fn infer(&self, _image: &DynamicImage) -> Result<Option<Tensor>> {
        Ok(self.tensor.clone())
    }
}

/// テスト用のモックローダー
///
/// 登録済みのモデル名に対してだけ [`MockEngine`] を返し、読み込み回数を数える
#[derive(Debug, Default)]
pub struct MockLoader {
    engines: HashMap<String, MockEngine>,
    loads: AtomicUsize,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 常に `tensor` を返すモデルを登録
    pub fn with_model(mut self, name: &str, tensor: Option<Tensor>) -> Self {
        self.engines
            .insert(name.to_string(), MockEngine::new(name, tensor));
        self
    }

    pub fn with_engine(mut self, engine: MockEngine) -> Self {
        self.engines.insert(engine.name.clone(), engine);
        self
    }

    /// エンジン名とは別のキー（モデルのパスなど）で登録
    pub fn with_engine_at(mut self, key: &str, engine: MockEngine) -> Self {
        self.engines.insert(key.to_string(), engine);
        self
    }

    /// これまでに `load` が成功した回数
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl EngineLoader for MockLoader {
    type Engine = MockEngine;

    fn load(&self, model: &str) -> Result<MockEngine> {
        let engine = self
            .engines
            .get(model)
            .cloned()
            .ok_or_else(|| ObjSpeedError::Model {
                operation: format!("mock load: {}", model),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "モデルが登録されていません",
                )),
            })?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(engine)
    }
}

/// 2x2 の CHW スコアテンソル。右上と左下が前景になる
pub fn checker_scores() -> Result<Tensor> {
    #[rustfmt::skip]
    let scores = [
        // チャンネル 0（背景）
        1.0f32, 0.0,
        0.0, 1.0,
        // チャンネル 1
        0.0, 1.0,
        1.0, 0.0,
    ];
    // 形状 [2, 2, 2] はヒューリスティックでは HWC と判定されるため、
    // 呼び出し側で ChannelsFirst ヒントを与えること
    Tensor::from_elements(vec![2, 2, 2], vec![4, 2, 1], &scores)
}
