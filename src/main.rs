use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use pecha_ocr::batch::{load_page, BatchEvent, BatchRunner, CancelToken, PageJob};
use pecha_ocr::config::{Config, OcrOptions, TpsMode};
use pecha_ocr::models::{RecognizerConfig, SegmenterConfig};
use pecha_ocr::{server, OcrPipeline};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pecha-ocr")]
#[command(about = "OCR for Tibetan pecha pages")]
#[command(version)]
pub struct Args {
    /// Line segmentation model config (JSON)
    #[arg(long, env = "OCR_LINE_MODEL")]
    pub line_model: Option<PathBuf>,

    /// Layout segmentation model config (JSON)
    #[arg(long, env = "OCR_LAYOUT_MODEL")]
    pub layout_model: Option<PathBuf>,

    /// Line recognition model config (JSON)
    #[arg(long, env = "OCR_MODEL")]
    pub ocr_model: PathBuf,

    /// Initial dilation multiplier for per-line extraction
    #[arg(long, env = "OCR_K_FACTOR", default_value_t = 1.7)]
    pub k_factor: f64,

    /// Max crop height as a multiple of the line height
    #[arg(long, env = "OCR_BBOX_TOLERANCE", default_value_t = 3.0)]
    pub bbox_tolerance: f64,

    /// Merge fragments of the same band into one line
    #[arg(long, env = "OCR_MERGE_LINES", default_value_t = true, action = ArgAction::Set)]
    pub merge_lines: bool,

    /// Dewarp curved lines
    #[arg(long, env = "OCR_USE_TPS")]
    pub use_tps: bool,

    /// Dewarping mode (global, local)
    #[arg(long, env = "OCR_TPS_MODE", default_value = "global")]
    pub tps_mode: TpsMode,

    /// Fraction of warped lines that triggers dewarping
    #[arg(long, env = "OCR_TPS_THRESHOLD", default_value_t = 0.25)]
    pub tps_threshold: f64,

    /// Rotation search window in degrees
    #[arg(long, env = "OCR_MAX_ANGLE", default_value_t = 5.0)]
    pub max_angle: f64,

    /// Override the segmenter's class probability threshold
    #[arg(long, env = "OCR_CLASS_THRESHOLD")]
    pub class_threshold: Option<f32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// OCR a single page and print the JSON result
    Page {
        image: PathBuf,

        /// Write the result here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// OCR many pages, one JSON file per page
    Batch {
        #[arg(required = true)]
        images: Vec<PathBuf>,

        #[arg(long, env = "OCR_WORKERS", default_value_t = 2)]
        workers: usize,

        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Serve OCR over HTTP
    Serve {
        /// Host address to bind to
        #[arg(long, env = "OCR_HOST", default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(long, env = "OCR_PORT", default_value = "9292")]
        port: u16,

        /// Maximum file size in bytes (default: 50MB)
        #[arg(long, env = "OCR_MAX_FILE_SIZE", default_value = "52428800")]
        max_file_size: usize,
    },
}

impl Args {
    fn options(&self) -> OcrOptions {
        OcrOptions {
            k_factor: self.k_factor,
            bbox_tolerance: self.bbox_tolerance,
            merge_lines: self.merge_lines,
            use_tps: self.use_tps,
            tps_mode: self.tps_mode,
            tps_threshold: self.tps_threshold,
            max_angle: self.max_angle,
        }
    }

    fn load_pipeline(&self) -> anyhow::Result<OcrPipeline> {
        let (segmenter_path, layout) = match (&self.line_model, &self.layout_model) {
            (Some(path), None) => (path, false),
            (None, Some(path)) => (path, true),
            (Some(_), Some(_)) => bail!("--line-model and --layout-model are mutually exclusive"),
            (None, None) => bail!("one of --line-model or --layout-model is required"),
        };

        let segmenter = SegmenterConfig::from_file(segmenter_path)?;
        let recognizer = RecognizerConfig::from_file(&self.ocr_model)?;
        Ok(OcrPipeline::load(&segmenter, layout, recognizer, self.class_threshold)?)
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}

fn run_page(pipeline: &OcrPipeline, options: &OcrOptions, image: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let job = PageJob::from_path(image);
    let page = load_page(&job.path)?;
    let result = pipeline.run_ocr(&job.page_id, &page, options)?;

    match output {
        Some(path) => write_json(path, &result)?,
        None => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}

fn run_batch(
    pipeline: &OcrPipeline,
    options: &OcrOptions,
    images: Vec<PathBuf>,
    workers: usize,
    output_dir: &Path,
    cancel: &CancelToken,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let jobs: Vec<PageJob> = images.into_iter().map(PageJob::from_path).collect();
    let runner = BatchRunner::new(workers);
    let (tx, rx) = crossbeam_channel::unbounded();

    std::thread::scope(|scope| {
        scope.spawn(move || runner.run(pipeline, jobs, options, cancel, &tx));

        for event in rx {
            match event {
                BatchEvent::Page {
                    page_id,
                    outcome: Ok(result),
                } => {
                    let path = output_dir.join(format!("{}.json", page_id));
                    if let Err(e) = write_json(&path, &result) {
                        tracing::error!("Failed to write {}: {:#}", path.display(), e);
                    }
                }
                BatchEvent::Page {
                    page_id,
                    outcome: Err(e),
                } => {
                    tracing::error!("Page {} failed [{}]: {}", page_id, e.code(), e);
                }
                BatchEvent::Finished {
                    processed,
                    failed,
                    cancelled,
                } => {
                    tracing::info!(
                        "Batch summary: processed={} failed={} cancelled={}",
                        processed,
                        failed,
                        cancelled
                    );
                }
            }
        }
    });

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting pecha-ocr v{}", env!("CARGO_PKG_VERSION"));

    let options = args.options();
    options.validate().map_err(anyhow::Error::msg)?;
    let pipeline = args.load_pipeline()?;

    match args.command {
        Command::Page { image, output } => tokio::task::spawn_blocking(move || {
            run_page(&pipeline, &options, &image, output.as_deref())
        })
        .await?,
        Command::Batch {
            images,
            workers,
            output_dir,
        } => {
            let cancel = CancelToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, finishing pages in flight");
                    on_signal.cancel();
                }
            });

            tokio::task::spawn_blocking(move || {
                run_batch(&pipeline, &options, images, workers, &output_dir, &cancel)
            })
            .await?
        }
        Command::Serve {
            host,
            port,
            max_file_size,
        } => {
            let config = Config {
                host,
                port,
                max_file_size,
            };
            tracing::info!("Binding to {}:{}", config.host, config.port);
            server::run(config, pipeline, options).await
        }
    }
}
