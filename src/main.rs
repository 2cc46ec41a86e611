use anyhow::{ensure, Context, Result};
use log::info;
use rayon::ThreadPoolBuilder;

use objspeed_rs::{init_logging, timing::format_seconds, BenchmarkRunner, Config, OnnxLoader};

fn main() -> Result<()> {
    let config = Config::new();
    init_logging(config.verbose);

    for model in &config.models {
        ensure!(model.exists(), "Model path does not exist: {}", model.display());
    }
    ensure!(
        config.input_dir.exists(),
        "Input directory does not exist: {}",
        config.input_dir.display()
    );

    if let Some(threads) = config.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure the rayon thread pool")?;
    }

    let options = config.benchmark_options()?;
    let loader = OnnxLoader::new(config.device_id, config.layout_hint());
    let runner = BenchmarkRunner::new(loader, config.model_names(), options)?;

    for load in runner.preload() {
        if load.loaded {
            info!(
                "{} ready in {} (input {}px)",
                load.model_name,
                format_seconds(load.load_time),
                load.input_size.unwrap_or_default()
            );
        }
    }

    let summary = runner
        .process_directory(&config.input_dir, &config.output_dir)
        .with_context(|| format!("Failed to benchmark {}", config.input_dir.display()))?;

    info!(
        "wrote {} overlays to {} ({} failed predictions)",
        summary.predictions,
        config.output_dir.display(),
        summary.failures
    );
    Ok(())
}
