use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facewatch_core::reference::{ImageAssetSource, ReferenceSetBuilder, ReferenceSpec};
use facewatch_core::status::LogStatus;
use facewatch_core::types::Expression;
use facewatch_core::{
    AssetLocation, BoundingBox, FaceAnalyzer, FaceMatcher, Identity, MatchResult, MatchStrategy,
    Matcher, ModelSet, OnnxFaceAnalyzer,
};
use facewatch_hw::Camera;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facewatch", about = "Facewatch reference set and matching diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the reference set and report how tight each identity is
    References(ReferenceArgs),
    /// Label every face in the given images
    Match {
        #[command(flatten)]
        reference: ReferenceArgs,

        /// Distance above which a face is unknown
        #[arg(long, default_value = "0.6")]
        threshold: f32,

        /// nearest or mean
        #[arg(long, default_value = "nearest")]
        strategy: MatchStrategy,

        /// Images to analyze
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// List V4L2 capture devices
    Devices,
}

#[derive(Args)]
struct ReferenceArgs {
    /// Model directory or URL prefix
    #[arg(long, default_value = "models")]
    models: String,

    /// Reference image directory or URL prefix
    #[arg(long, default_value = "images")]
    images_from: String,

    /// Known labels (comma-separated)
    #[arg(long, value_delimiter = ',', default_values = ["Adi Martha", "Seno", "Wendy"])]
    labels: Vec<String>,

    /// Reference images per label
    #[arg(long, default_value = "2")]
    per_label: usize,
}

impl ReferenceArgs {
    fn load(&self) -> Result<(OnnxFaceAnalyzer, Vec<Identity>)> {
        let models = ModelSet::resolve(&AssetLocation::parse(&self.models))
            .context("resolving models")?;
        let mut analyzer = OnnxFaceAnalyzer::load(&models).context("loading models")?;

        let spec = ReferenceSpec {
            labels: self.labels.iter().map(|l| l.trim().to_string()).collect(),
            images_per_label: self.per_label,
        };
        let source = ImageAssetSource::new(AssetLocation::parse(&self.images_from));
        let identities = ReferenceSetBuilder::new(&spec, &source, &LogStatus)
            .build(&mut analyzer)
            .context("building reference set")?;
        Ok((analyzer, identities))
    }
}

#[derive(Serialize)]
struct IdentityReport {
    label: String,
    descriptors: usize,
    /// Largest distance between two of this identity's references.
    max_internal_distance: Option<f32>,
}

#[derive(Serialize)]
struct ImageReport {
    image: PathBuf,
    faces: Vec<FaceReport>,
}

#[derive(Serialize)]
struct FaceReport {
    bbox: BoundingBox,
    score: f32,
    #[serde(flatten)]
    result: MatchResult,
    expression: Option<Expression>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::References(args) => {
            let (_, identities) = args.load()?;
            let report: Vec<_> = identities
                .iter()
                .map(|identity| IdentityReport {
                    label: identity.label.clone(),
                    descriptors: identity.descriptors.len(),
                    max_internal_distance: identity.max_internal_distance(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Match {
            reference,
            threshold,
            strategy,
            images,
        } => {
            let (mut analyzer, identities) = reference.load()?;
            let matcher = FaceMatcher::with_strategy(identities, threshold, strategy)
                .context("creating face matcher")?;

            let mut reports = Vec::with_capacity(images.len());
            for path in images {
                let image = image::open(&path)
                    .with_context(|| format!("opening {}", path.display()))?
                    .to_luma8();
                let faces: Vec<_> = analyzer
                    .detect_all(&image)
                    .with_context(|| format!("analyzing {}", path.display()))?
                    .into_iter()
                    .map(|face| FaceReport {
                        bbox: face.detection.bbox,
                        score: face.detection.score,
                        result: matcher.find_best_match(&face.descriptor),
                        expression: face.expressions.map(|e| e.dominant().0),
                    })
                    .collect();
                tracing::info!(image = %path.display(), faces = faces.len(), "analyzed");
                reports.push(ImageReport { image: path, faces });
            }
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                eprintln!("no V4L2 capture devices found");
            }
            println!("{}", serde_json::to_string_pretty(&devices)?);
        }
    }

    Ok(())
}
