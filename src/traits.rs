use crate::errors::Result;
use crate::layout::LayoutHint;
use crate::mask::ClassMask;
use crate::overlay::OverlayStyle;
use crate::tensor::Tensor;
use image::{DynamicImage, RgbaImage};

/// セグメンテーション推論エンジンの抽象化
///
/// 生の出力テンソルを返すだけで、マスクへの変換はデコーダが担当する
pub trait InferenceEngine: Send + Sync {
    /// ベンチマーク結果に表示するモデル名
    fn name(&self) -> &str;

    /// モデルの入力画像サイズを取得
    fn input_size(&self) -> u32;

    /// 出力テンソルのチャンネル配置が既知であれば返す
    fn layout_hint(&self) -> Option<LayoutHint> {
        None
    }

    /// 推論を実行する。結果が得られない場合は `Ok(None)`
    fn infer(&self, image: &DynamicImage) -> Result<Option<Tensor>>;
}

/// モデル識別子からエンジンを読み込む
///
/// 読み込み結果は `ModelCache` に保持されるため、呼び出しはモデルごとに一度だけ
pub trait EngineLoader: Send + Sync {
    type Engine: InferenceEngine;

    fn load(&self, model: &str) -> Result<Self::Engine>;
}

/// デコード済みマスクをキャンバスに描画する
///
/// 255 のセルを塗り、0 のセルは透明のまま残す
pub trait OverlayRenderer: Send + Sync {
    fn render(
        &self,
        mask: &ClassMask,
        canvas: (u32, u32),
        style: &OverlayStyle,
    ) -> Result<RgbaImage>;
}
