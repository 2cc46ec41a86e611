use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::{imageops::FilterType, DynamicImage, RgbaImage};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::cache::{Lookup, ModelCache};
use crate::decoder::{DecoderOptions, TensorMaskDecoder};
use crate::errors::{ObjSpeedError, Result};
use crate::overlay::{composite, OverlayStyle, TintOverlay};
use crate::timing::{format_seconds, time_stage, PreparationTimings, Stage, StageTimer};
use crate::traits::{EngineLoader, InferenceEngine, OverlayRenderer};

pub const DEFAULT_CANVAS_SIZE: u32 = 640;
pub const DEFAULT_CACHE_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkOptions {
    /// Side of the square the input is fitted to and overlays are drawn on.
    pub canvas_size: u32,
    pub style: OverlayStyle,
    pub decoder: DecoderOptions,
    pub cache_capacity: usize,
    /// Rotate inputs by 180° before resizing.
    pub rotate: bool,
}

impl Default for BenchmarkOptions {
    fn default() -> Self {
        Self {
            canvas_size: DEFAULT_CANVAS_SIZE,
            style: OverlayStyle::default(),
            decoder: DecoderOptions::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            rotate: true,
        }
    }
}

/// Outcome of running one model on one image.
///
/// A failed run keeps zero durations, no overlay and a region count of 0.
#[derive(Debug, Clone)]
pub struct ModelPrediction {
    /// The model's label, also used in the overlay file name.
    pub model_name: String,
    /// Zero when the model came from the cache.
    pub model_load_time: Duration,
    pub inference_time: Duration,
    pub decode_time: Duration,
    pub overlay: Option<RgbaImage>,
    pub region_count: usize,
}

impl ModelPrediction {
    pub fn failed(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model_load_time: Duration::ZERO,
            inference_time: Duration::ZERO,
            decode_time: Duration::ZERO,
            overlay: None,
            region_count: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.overlay.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLoadResult {
    pub model_name: String,
    /// Zero when the model was already cached or failed to load.
    pub load_time: Duration,
    pub loaded: bool,
    /// Square input side the engine expects, when it loaded.
    pub input_size: Option<u32>,
}

/// Everything measured for one input image.
#[derive(Debug, Clone)]
pub struct ImageReport {
    /// The rotated and resized image every model ran on.
    pub image: RgbaImage,
    pub timings: PreparationTimings,
    pub predictions: Vec<ModelPrediction>,
}

impl ImageReport {
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "rotate {} resize {}",
            format_seconds(self.timings.rotate),
            format_seconds(self.timings.resize)
        );
        for prediction in &self.predictions {
            if prediction.succeeded() {
                line.push_str(&format!(
                    " | {}: load {} inference {} decode {} regions {}",
                    prediction.model_name,
                    format_seconds(prediction.model_load_time),
                    format_seconds(prediction.inference_time),
                    format_seconds(prediction.decode_time),
                    prediction.region_count
                ));
            } else {
                line.push_str(&format!(" | {}: failed", prediction.model_name));
            }
        }
        line
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BenchmarkSummary {
    pub images: usize,
    pub predictions: usize,
    pub failures: usize,
}

/// Runs every configured segmentation model over prepared images.
///
/// Loaded engines live in a [`ModelCache`] owned by the runner, so each model
/// is loaded once and shared by all images processed in parallel.
pub struct BenchmarkRunner<L: EngineLoader, R: OverlayRenderer = TintOverlay> {
    loader: L,
    renderer: R,
    models: Vec<String>,
    labels: Vec<String>,
    cache: ModelCache<String, L::Engine>,
    options: BenchmarkOptions,
}

impl<L: EngineLoader> BenchmarkRunner<L, TintOverlay> {
    pub fn new(loader: L, models: Vec<String>, options: BenchmarkOptions) -> Result<Self> {
        if models.is_empty() {
            return Err(ObjSpeedError::validation("models", "must name at least one model"));
        }
        if options.canvas_size == 0 {
            return Err(ObjSpeedError::validation("canvas_size", "must be at least 1"));
        }

        Ok(Self {
            loader,
            renderer: TintOverlay,
            labels: model_labels(&models),
            models,
            cache: ModelCache::new(options.cache_capacity)?,
            options,
        })
    }
}

impl<L: EngineLoader, R: OverlayRenderer> BenchmarkRunner<L, R> {
    pub fn with_renderer<R2: OverlayRenderer>(self, renderer: R2) -> BenchmarkRunner<L, R2> {
        BenchmarkRunner {
            loader: self.loader,
            renderer,
            models: self.models,
            labels: self.labels,
            cache: self.cache,
            options: self.options,
        }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Unique per-model labels, in the same order as [`Self::models`].
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub const fn options(&self) -> &BenchmarkOptions {
        &self.options
    }

    pub const fn cache(&self) -> &ModelCache<String, L::Engine> {
        &self.cache
    }

    /// Load every model into the cache up front.
    ///
    /// A model that fails to load is reported and skipped; it is retried when
    /// an image needs it.
    pub fn preload(&self) -> Vec<ModelLoadResult> {
        self.models
            .iter()
            .zip(&self.labels)
            .map(|(model, label)| match self.load_engine(model, label) {
                Ok((engine, load_time)) => ModelLoadResult {
                    model_name: label.clone(),
                    load_time,
                    loaded: true,
                    input_size: Some(engine.input_size()),
                },
                Err(e) => {
                    warn!("failed to load {}: {}", model, e);
                    ModelLoadResult {
                        model_name: label.clone(),
                        load_time: Duration::ZERO,
                        loaded: false,
                        input_size: None,
                    }
                }
            })
            .collect()
    }

    fn load_engine(
        &self,
        model: &str,
        label: &str,
    ) -> Result<(std::sync::Arc<L::Engine>, Duration)> {
        let timer = StageTimer::start(Stage::ModelLoad, label);
        let (engine, lookup) = self
            .cache
            .get_or_try_insert_with(model.to_string(), || self.loader.load(model))?;
        let elapsed = timer.finish();

        let load_time = match lookup {
            Lookup::Loaded => elapsed,
            Lookup::Cached => Duration::ZERO,
        };
        Ok((engine, load_time))
    }

    /// Rotate (when enabled) and fit the image to the square canvas, cropping the
    /// overflow around the centre.
    pub fn prepare(&self, image: &DynamicImage) -> (DynamicImage, PreparationTimings) {
        let size = self.options.canvas_size;

        let (rotated, rotate) = if self.options.rotate {
            time_stage(Stage::Rotate, "input", || image.rotate180())
        } else {
            (image.clone(), Duration::ZERO)
        };
        let (resized, resize) = time_stage(Stage::Resize, "input", || {
            rotated.resize_to_fill(size, size, FilterType::Triangle)
        });

        (resized, PreparationTimings { rotate, resize })
    }

    /// Run one model on a prepared image. Failures are logged and recorded as a
    /// failed prediction; they never abort the benchmark.
    pub fn predict(&self, model: &str, image: &DynamicImage) -> ModelPrediction {
        let label = self
            .models
            .iter()
            .position(|m| m == model)
            .map(|i| self.labels[i].clone())
            .unwrap_or_else(|| model_stem(model));
        self.predict_labelled(model, &label, image)
    }

    fn predict_labelled(&self, model: &str, label: &str, image: &DynamicImage) -> ModelPrediction {
        self.try_predict(model, label, image).unwrap_or_else(|e| {
            warn!("{} failed: {}", model, e);
            ModelPrediction::failed(label)
        })
    }

    fn try_predict(
        &self,
        model: &str,
        label: &str,
        image: &DynamicImage,
    ) -> Result<ModelPrediction> {
        let (engine, model_load_time) = self.load_engine(model, label)?;
        let name = label.to_string();
        debug!("{} runs engine {}", name, engine.name());

        let (output, inference_time) =
            time_stage(Stage::Inference, &name, || engine.infer(image));
        let tensor = output?.ok_or_else(|| ObjSpeedError::Model {
            operation: format!("inference with {}", name),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "model produced no segmentation output",
            )),
        })?;

        let mut options = self.options.decoder;
        if let Some(hint) = engine.layout_hint() {
            options.layout_hint = Some(hint);
        }
        let decoder = TensorMaskDecoder::new(options);
        let (mask, decode_time) = time_stage(Stage::Decode, &name, || decoder.decode(&tensor));
        let mask = mask?;

        let size = self.options.canvas_size;
        let (overlay, _) = time_stage(Stage::Render, &name, || {
            self.renderer.render(&mask, (size, size), &self.options.style)
        });

        Ok(ModelPrediction {
            model_name: name,
            model_load_time,
            inference_time,
            decode_time,
            overlay: Some(overlay?),
            region_count: mask.region_count(),
        })
    }

    /// Prepare the image once and run every model on it in order.
    pub fn run_image(&self, image: &DynamicImage) -> ImageReport {
        let (prepared, timings) = self.prepare(image);
        let predictions = self
            .models
            .iter()
            .zip(&self.labels)
            .map(|(model, label)| self.predict_labelled(model, label, &prepared))
            .collect();

        ImageReport {
            image: prepared.to_rgba8(),
            timings,
            predictions,
        }
    }

    /// Benchmark every image under `input_dir`, writing one composited overlay
    /// per successful prediction to `output_dir` as `<stem>_<label>.png`.
    pub fn process_directory(&self, input_dir: &Path, output_dir: &Path) -> Result<BenchmarkSummary> {
        if !input_dir.exists() {
            return Err(ObjSpeedError::FileSystem {
                path: input_dir.to_path_buf(),
                operation: "input directory lookup".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "input directory does not exist",
                ),
            });
        }

        fs::create_dir_all(output_dir).map_err(|e| ObjSpeedError::FileSystem {
            path: output_dir.to_path_buf(),
            operation: "output directory creation".to_string(),
            source: e,
        })?;

        let image_files = collect_image_files(input_dir);
        if image_files.is_empty() {
            info!("no images found in {}", input_dir.display());
            return Ok(BenchmarkSummary::default());
        }

        let pb = ProgressBar::new(image_files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .map_err(|e| ObjSpeedError::Configuration {
                    message: format!("progress bar template: {}", e),
                })?
                .progress_chars("#>-"),
        );

        let summaries = image_files
            .par_iter()
            .map(|input_file| -> Result<BenchmarkSummary> {
                let summary = self.process_single_image(input_file, input_dir, output_dir)?;
                pb.inc(1);
                Ok(summary)
            })
            .collect::<Result<Vec<_>>>()?;

        pb.finish_with_message("done");

        let summary = summaries
            .into_iter()
            .fold(BenchmarkSummary::default(), |acc, s| BenchmarkSummary {
                images: acc.images + s.images,
                predictions: acc.predictions + s.predictions,
                failures: acc.failures + s.failures,
            });
        info!(
            "benchmarked {} images: {} predictions, {} failures",
            summary.images, summary.predictions, summary.failures
        );
        Ok(summary)
    }

    fn process_single_image(
        &self,
        input_file: &Path,
        input_dir: &Path,
        output_dir: &Path,
    ) -> Result<BenchmarkSummary> {
        let image = image::open(input_file).map_err(|e| ObjSpeedError::ImageProcessing {
            path: input_file.display().to_string(),
            operation: "image load".to_string(),
            source: Box::new(e),
        })?;

        let report = self.run_image(&image);
        info!("{}: {}", input_file.display(), report.summary_line());

        let relative = relative_path(input_file, input_dir)?;
        let target_dir = output_dir.join(relative.parent().unwrap_or_else(|| Path::new("")));
        fs::create_dir_all(&target_dir).map_err(|e| ObjSpeedError::FileSystem {
            path: target_dir.clone(),
            operation: "output directory creation".to_string(),
            source: e,
        })?;
        let stem = input_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut summary = BenchmarkSummary {
            images: 1,
            ..BenchmarkSummary::default()
        };
        for prediction in &report.predictions {
            let Some(overlay) = &prediction.overlay else {
                summary.failures += 1;
                continue;
            };
            summary.predictions += 1;

            let output_file =
                target_dir.join(format!("{}_{}.png", stem, prediction.model_name));
            composite(&report.image, overlay)?
                .save(&output_file)
                .map_err(|e| ObjSpeedError::ImageProcessing {
                    path: output_file.display().to_string(),
                    operation: "overlay save".to_string(),
                    source: Box::new(e),
                })?;
            debug!("wrote {}", output_file.display());
        }
        Ok(summary)
    }
}

/// Image files under `input_dir`, sorted so runs are reproducible.
pub fn collect_image_files(input_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|path| path.is_file() && is_supported_image_format(path))
        .collect();
    files.sort();
    files
}

pub fn is_supported_image_format(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            matches!(
                ext.to_lowercase().as_str(),
                "jpg" | "jpeg" | "png" | "webp" | "bmp" | "gif" | "tiff" | "avif"
            )
        })
}

fn model_stem(model: &str) -> String {
    Path::new(model)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| model.to_string())
}

/// One label per model: the file stem, numbered by position when stems collide.
fn model_labels(models: &[String]) -> Vec<String> {
    let stems: Vec<String> = models.iter().map(|m| model_stem(m)).collect();
    let mut used = HashSet::new();

    stems
        .iter()
        .enumerate()
        .map(|(i, stem)| {
            let shared = stems.iter().filter(|s| *s == stem).count() > 1;
            let mut n = i + 1;
            let mut label = if shared {
                format!("{}_{}", stem, n)
            } else {
                stem.clone()
            };
            while used.contains(&label) {
                n += 1;
                label = format!("{}_{}", stem, n);
            }
            used.insert(label.clone());
            label
        })
        .collect()
}

fn relative_path(input_file: &Path, input_dir: &Path) -> Result<PathBuf> {
    input_file
        .strip_prefix(input_dir)
        .map(Path::to_path_buf)
        .map_err(|_| ObjSpeedError::FileSystem {
            path: input_file.to_path_buf(),
            operation: "relative path".to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "input file is outside the input directory",
            ),
        })
}
