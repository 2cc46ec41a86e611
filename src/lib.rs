pub mod benchmark;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod errors;
pub mod layout;
pub mod mask;
pub mod model;
pub mod overlay;
pub mod tensor;
pub mod timing;
pub mod traits;

pub mod mocks;

use log::LevelFilter;

pub use benchmark::{
    BenchmarkOptions, BenchmarkRunner, BenchmarkSummary, ImageReport, ModelLoadResult,
    ModelPrediction,
};
pub use cache::{Lookup, ModelCache};
pub use config::Config;
pub use decoder::{decode, DecoderOptions, TensorMaskDecoder};
pub use errors::{ObjSpeedError, Result};
pub use layout::{AxisMap, Layout, LayoutHint};
pub use mask::ClassMask;
pub use model::{OnnxLoader, OnnxModel};
pub use overlay::{composite, OverlayStyle, TintOverlay};
pub use tensor::{ElementType, Tensor, TensorElement};
pub use traits::*;

/// Initialise `env_logger`, honouring `RUST_LOG` and falling back to `info`
/// (`debug` when `verbose`). Stage timings are only shown at debug level.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    if verbose {
        builder.filter_module("objspeed::timing", LevelFilter::Debug);
    }

    // A logger may already be installed, e.g. by a test harness.
    let _ = builder.try_init();
}
