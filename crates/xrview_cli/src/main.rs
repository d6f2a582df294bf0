//! xrview CLI: run finding-review sessions from the terminal.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;

use xrview_core::{Seed, SessionId};
use xrview_data::{AccessKey, LocalObjectStore, MetadataStore, ObjectFeedbackSink, ObjectStore};
use xrview_explain::{AggregatorConfig, CamMethod, ExplanationAggregator};
use xrview_model::{ConvClassifierConfig, ModelAdapter, XRV_LABELS};
use xrview_review::{
    submit_and_flush, FeedbackSelection, FeedbackStore, Progress, ReviewSession,
};

/// Backend used for review inference and gradient capture.
type ReviewBackend = Autodiff<NdArray>;

#[derive(Parser)]
#[command(name = "xrview")]
#[command(author, version)]
#[command(about = "Review classifier findings on chest X-rays with CAM explanation grids")]
#[command(long_about = "xrview: human review of classifier findings with CAM explanations.

EXAMPLES:
  # List the supported attribution methods
  xrview methods

  # Show the queue a session would review
  xrview catalog --data-dir ./data --access-key KEY --n-images 10 --seed 42

  # Run a review session, writing explanation grids to ./grids
  xrview review --data-dir ./data --access-key KEY --out ./grids")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the attribution methods the grid can render
    Methods,
    /// Show the sampled review queue
    Catalog {
        /// Root directory of the image/feedback store
        #[arg(long, value_name = "DIR")]
        data_dir: PathBuf,

        /// Access credential for the store
        #[arg(long, value_name = "KEY")]
        access_key: String,

        /// Queue size
        #[arg(long, default_value = "10", value_name = "N")]
        n_images: usize,

        /// Random seed for the queue sample
        #[arg(long, default_value = "42", value_name = "SEED")]
        seed: u64,

        /// Only sample images with this stored label
        #[arg(long, value_name = "LABEL")]
        filter_label: Option<String>,
    },
    /// Run a review session
    Review {
        /// Root directory of the image/feedback store
        #[arg(long, value_name = "DIR")]
        data_dir: PathBuf,

        /// Access credential for the store
        #[arg(long, value_name = "KEY")]
        access_key: String,

        /// Directory explanation grids are written to
        #[arg(long, default_value = "./grids", value_name = "DIR")]
        out: PathBuf,

        /// Queue size
        #[arg(long, default_value = "10", value_name = "N")]
        n_images: usize,

        /// Findings reviewed per image (K)
        #[arg(long, default_value = "3", value_name = "K")]
        num_findings: usize,

        /// Random seed for the queue sample
        #[arg(long, default_value = "42", value_name = "SEED")]
        seed: u64,

        /// Comma-separated method names (default: all eight)
        #[arg(long, value_name = "METHODS")]
        methods: Option<String>,

        /// Session identifier (default: derived from entropy)
        #[arg(long, value_name = "ID")]
        session_id: Option<String>,

        /// Only sample images with this stored label
        #[arg(long, value_name = "LABEL")]
        filter_label: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    match cli.command {
        Commands::Methods => handle_methods(),
        Commands::Catalog {
            data_dir,
            access_key,
            n_images,
            seed,
            filter_label,
        } => handle_catalog(data_dir, access_key, n_images, seed, filter_label),
        Commands::Review {
            data_dir,
            access_key,
            out,
            n_images,
            num_findings,
            seed,
            methods,
            session_id,
            filter_label,
        } => handle_review(
            data_dir,
            access_key,
            out,
            n_images,
            num_findings,
            seed,
            methods,
            session_id,
            filter_label,
        ),
    }
}

fn handle_methods() -> Result<()> {
    println!("Supported CAM methods:\n");
    for method in CamMethod::ALL {
        println!("  {method}");
    }
    println!("\nPass a subset with: xrview review --methods GradCAM,LayerCAM");
    Ok(())
}

fn open_store(data_dir: PathBuf, access_key: String) -> Result<LocalObjectStore> {
    let key = AccessKey::new(access_key)
        .context("an access key is required for image and feedback storage")?;
    LocalObjectStore::new(data_dir, Some(key)).context("failed to open the object store")
}

fn sample_queue(
    catalog: &MetadataStore,
    n_images: usize,
    seed: u64,
    filter_label: Option<&str>,
) -> Vec<xrview_review::ImageRecord> {
    match filter_label {
        Some(label) => catalog.sample_filtered(n_images, label, Seed::new(seed)),
        None => catalog.sample(n_images, Seed::new(seed)),
    }
}

fn handle_catalog(
    data_dir: PathBuf,
    access_key: String,
    n_images: usize,
    seed: u64,
    filter_label: Option<String>,
) -> Result<()> {
    let store = open_store(data_dir, access_key)?;
    let catalog = MetadataStore::from_store(&store).context("failed to load the catalog")?;

    println!("Catalog: {} images, {} labels", catalog.len(), catalog.unique_labels().len());
    println!("─────────────────────────────────────────");

    let queue = sample_queue(&catalog, n_images, seed, filter_label.as_deref());
    if queue.is_empty() {
        println!("No images match the requested sample.");
        return Ok(());
    }
    for (idx, record) in queue.iter().enumerate() {
        println!("  {:>3}  {:<40} {}", idx, record.filename, record.label);
    }
    Ok(())
}

fn parse_methods(methods: Option<&str>) -> Result<Vec<CamMethod>> {
    match methods {
        None => Ok(CamMethod::ALL.to_vec()),
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                CamMethod::from_name(name)
                    .with_context(|| format!("unknown method '{name}'; see 'xrview methods'"))
            })
            .collect(),
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_review(
    data_dir: PathBuf,
    access_key: String,
    out: PathBuf,
    n_images: usize,
    num_findings: usize,
    seed: u64,
    methods: Option<String>,
    session_id: Option<String>,
    filter_label: Option<String>,
) -> Result<()> {
    let mut store = open_store(data_dir, access_key)?;
    let catalog = MetadataStore::from_store(&store).context("failed to load the catalog")?;
    let queue = sample_queue(&catalog, n_images, seed, filter_label.as_deref());
    if queue.is_empty() {
        bail!("the catalog sample is empty; nothing to review");
    }

    let session_id = match session_id {
        Some(id) => SessionId::new(id).context("invalid --session-id")?,
        None => SessionId::from_entropy(),
    };

    let cam_methods = parse_methods(methods.as_deref())?;
    let aggregator = ExplanationAggregator::new(AggregatorConfig {
        methods: cam_methods.clone(),
        ..AggregatorConfig::default()
    })
    .context("invalid aggregator configuration")?;

    let device = burn_ndarray::NdArrayDevice::Cpu;
    let model = ConvClassifierConfig::new(XRV_LABELS.len()).init::<ReviewBackend>(&device);
    let labels: Vec<String> = XRV_LABELS.iter().map(|s| (*s).to_string()).collect();
    let adapter = ModelAdapter::new(model, labels, device)
        .context("the classifier is unusable for review")?;

    std::fs::create_dir_all(&out)
        .with_context(|| format!("failed to create output directory {}", out.display()))?;

    let mut session =
        ReviewSession::new(queue, num_findings).context("invalid session configuration")?;
    let mut feedback = FeedbackStore::new();

    println!("=== xrview review session {session_id} ===");
    println!(
        "Queue: {} images, {} findings each, {} methods per grid\n",
        session.queue_len(),
        session.num_findings(),
        cam_methods.len()
    );

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    while let Progress::Reviewing {
        image_index,
        finding_rank,
    } = session.progress()
    {
        let image = session.current().expect("reviewing implies an image").clone();

        let selection = match review_finding(
            &store,
            &adapter,
            &aggregator,
            &out,
            &image,
            image_index,
            finding_rank,
            session.num_findings(),
            &cam_methods,
            &mut lines,
        ) {
            Ok(selection) => selection,
            Err(error) => {
                // Fetch/compute problems are recoverable: show them and
                // let the reviewer retry the same finding.
                eprintln!("\nerror: {error:#}");
                if prompt_yes_no(&mut lines, "Retry this finding? [y/N] ")? {
                    continue;
                }
                bail!("review aborted at image {image_index}, finding {finding_rank}");
            }
        };

        let mut sink = ObjectFeedbackSink::new(&mut store);
        let outcome = submit_and_flush(
            &mut session,
            &mut feedback,
            selection,
            &session_id,
            &mut sink,
        )
        .context("failed to record feedback")?;

        if outcome.flush_triggered {
            println!("Feedback for {} persisted.\n", image.filename);
        }
    }

    println!("No more images to diagnose");
    println!("Session {session_id} reviewed {} images.", session.queue_len());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn review_finding(
    store: &LocalObjectStore,
    adapter: &ModelAdapter<ReviewBackend, xrview_model::ConvClassifier<ReviewBackend>>,
    aggregator: &ExplanationAggregator,
    out: &PathBuf,
    image: &xrview_review::ImageRecord,
    image_index: usize,
    finding_rank: usize,
    num_findings: usize,
    cam_methods: &[CamMethod],
    lines: &mut std::io::Lines<std::io::StdinLock<'_>>,
) -> Result<FeedbackSelection> {
    let bytes = store
        .get(&image.filename)
        .with_context(|| format!("failed to fetch '{}'", image.filename))?;
    let (display, input) = adapter
        .preprocess(&bytes)
        .with_context(|| format!("failed to preprocess '{}'", image.filename))?;

    let probs = adapter.infer(input.clone()).context("inference failed")?;
    let findings = adapter
        .findings(&probs, num_findings)
        .context("finding selection failed")?;
    let finding = &findings[finding_rank];

    println!("─────────────────────────────────────────");
    println!("Image {}: {} (store label: {})", image_index + 1, image.filename, image.label);
    println!(
        "Finding: {} ({}/{})  probability {:.2}%",
        finding.label,
        finding_rank + 1,
        num_findings,
        finding.probability * 100.0
    );

    let grid = aggregator.compute_grid(adapter.model(), &input, &display, finding.class_id);
    if grid.available() < grid.len() {
        println!(
            "Note: {}/{} methods unavailable for this finding.",
            grid.len() - grid.available(),
            grid.len()
        );
    }

    let stem = image.filename.replace(['/', '\\'], "_");
    let grid_path = out.join(format!("{stem}_r{finding_rank}.png"));
    grid.compose()
        .save(&grid_path)
        .with_context(|| format!("failed to write {}", grid_path.display()))?;
    println!("Explanation grid written to {}", grid_path.display());

    let confirm = prompt_yes_no(lines, "Confirm finding? [y/N] ")?;
    let comment = prompt_line(lines, "Comment (empty for none): ")?;
    let best = prompt_best_method(lines, cam_methods)?;

    let mut selection = if confirm {
        FeedbackSelection::confirmed()
    } else {
        FeedbackSelection::rejected()
    };
    selection.comment = comment;
    selection.best_cam_method = best;
    Ok(selection)
}

fn prompt_line(
    lines: &mut std::io::Lines<std::io::StdinLock<'_>>,
    prompt: &str,
) -> Result<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    match lines.next() {
        Some(line) => Ok(line?.trim().to_string()),
        None => bail!("stdin closed"),
    }
}

fn prompt_yes_no(
    lines: &mut std::io::Lines<std::io::StdinLock<'_>>,
    prompt: &str,
) -> Result<bool> {
    let answer = prompt_line(lines, prompt)?;
    Ok(matches!(answer.as_str(), "y" | "Y" | "yes"))
}

fn prompt_best_method(
    lines: &mut std::io::Lines<std::io::StdinLock<'_>>,
    cam_methods: &[CamMethod],
) -> Result<Option<String>> {
    loop {
        let answer = prompt_line(lines, "Best CAM method (empty for none): ")?;
        if answer.is_empty() {
            return Ok(None);
        }
        match CamMethod::from_name(&answer) {
            Ok(method) if cam_methods.contains(&method) => {
                return Ok(Some(method.name().to_string()))
            }
            Ok(_) => println!("'{answer}' is not in this session's grid; pick a shown method."),
            Err(_) => println!("Unknown method '{answer}'; see 'xrview methods'."),
        }
    }
}
