use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::benchmark::{BenchmarkOptions, DEFAULT_CACHE_CAPACITY, DEFAULT_CANVAS_SIZE};
use crate::decoder::DecoderOptions;
use crate::errors::Result;
use crate::layout::LayoutHint;
use crate::overlay::OverlayStyle;

/// 出力テンソルのチャンネル配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    /// 形状から推定する
    Auto,
    /// CHW / NCHW
    ChannelsFirst,
    /// HWC / NHWC
    ChannelsLast,
}

#[derive(Parser, Clone, Debug)]
#[command(version, about = "Benchmark segmentation models and draw their masks", long_about = None)]
pub struct Config {
    pub input_dir: PathBuf,

    #[arg(default_value = "output")]
    pub output_dir: PathBuf,

    /// ONNX モデルのパス（複数指定可）
    #[arg(short, long = "model", required = true)]
    pub models: Vec<PathBuf>,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    #[arg(long, default_value_t = DEFAULT_CANVAS_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
    pub canvas_size: u32,

    #[arg(long, default_value_t = 0.35, value_parser = check_opacity)]
    pub opacity: f32,

    /// オーバーレイの色（16 進 RGB）
    #[arg(long, default_value = "34c759", value_parser = parse_tint)]
    pub tint: [u8; 3],

    /// マスクの行バイト数をこの倍数に揃える
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub row_alignment: u64,

    #[arg(long, value_enum, default_value_t = LayoutArg::Auto)]
    pub layout: LayoutArg,

    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY)]
    pub cache_capacity: usize,

    /// 180 度回転を行わない
    #[arg(long)]
    pub no_rotate: bool,

    /// rayon のスレッド数（省略時は論理コア数）
    #[arg(short, long)]
    pub threads: Option<usize>,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    pub fn new() -> Self {
        Self::parse()
    }

    pub const fn layout_hint(&self) -> Option<LayoutHint> {
        match self.layout {
            LayoutArg::Auto => None,
            LayoutArg::ChannelsFirst => Some(LayoutHint::ChannelsFirst),
            LayoutArg::ChannelsLast => Some(LayoutHint::ChannelsLast),
        }
    }

    /// モデル識別子としてのパス文字列
    pub fn model_names(&self) -> Vec<String> {
        self.models
            .iter()
            .map(|path| path.display().to_string())
            .collect()
    }

    pub fn benchmark_options(&self) -> Result<BenchmarkOptions> {
        let row_alignment = usize::try_from(self.row_alignment).map_err(|_| {
            crate::errors::ObjSpeedError::validation("row_alignment", "does not fit in usize")
        })?;

        Ok(BenchmarkOptions {
            canvas_size: self.canvas_size,
            style: OverlayStyle::new(self.tint, self.opacity)?,
            decoder: DecoderOptions::default()
                .with_layout_hint(self.layout_hint())
                .with_row_alignment(row_alignment),
            cache_capacity: self.cache_capacity,
            rotate: !self.no_rotate,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn check_opacity(s: &str) -> std::result::Result<f32, String> {
    let opacity: f32 = s
        .parse()
        .map_err(|_| format!("{} is not a number", s))?;
    if !(0.0..=1.0).contains(&opacity) {
        return Err(format!("{} is outside 0.0..=1.0", s));
    }
    Ok(opacity)
}

fn parse_tint(s: &str) -> std::result::Result<[u8; 3], String> {
    let hex = s.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(format!("{} is not a 6-digit hex colour", s));
    }

    let mut rgb = [0u8; 3];
    for (i, channel) in rgb.iter_mut().enumerate() {
        *channel = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| format!("{} is not a 6-digit hex colour", s))?;
    }
    Ok(rgb)
}
