//! qkmeans CLI - cluster data with swap-test distances on the local simulator

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

use qkmeans::{MapType, QKMeansConfig, QKMeansError, QuantumKMeans, ShotMode, SwapTestSimulator};

#[derive(Parser)]
#[command(name = "qkmeans")]
#[command(about = "k-means clustering with quantum swap-test distances", long_about = None)]
struct Cli {
    /// Circuits per simulator job
    #[arg(long, global = true, default_value_t = 300)]
    max_job_size: usize,

    /// Sample shots with this seed instead of using expected counts
    #[arg(long, global = true)]
    shot_seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster synthetic 2D blobs
    Demo {
        /// Points per blob
        #[arg(short, long, default_value_t = 20)]
        points: usize,

        /// Number of blobs (and clusters)
        #[arg(short, long, default_value_t = 2)]
        clusters: usize,

        /// Encoding: angle or probability
        #[arg(short, long, default_value = "angle")]
        map_type: String,

        #[arg(short, long, default_value_t = 42)]
        seed: u64,
    },
    /// Cluster rows read from a file (comma or whitespace separated)
    Fit {
        #[arg(short, long)]
        input: PathBuf,

        /// JSON configuration; missing fields take defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Overrides n_clusters from the config
        #[arg(short = 'k', long)]
        clusters: Option<usize>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let backend = match cli.shot_seed {
        Some(seed) => SwapTestSimulator::new(cli.max_job_size, ShotMode::Sampled { seed }),
        None => SwapTestSimulator::exact(cli.max_job_size),
    };

    let result = match cli.command {
        Commands::Demo {
            points,
            clusters,
            map_type,
            seed,
        } => run_demo(backend, points, clusters, &map_type, seed),
        Commands::Fit {
            input,
            config,
            clusters,
        } => run_fit(backend, &input, config.as_deref(), clusters),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_demo(
    backend: SwapTestSimulator,
    per_blob: usize,
    clusters: usize,
    map_type: &str,
    seed: u64,
) -> Result<(), QKMeansError> {
    let map_type: MapType = map_type.parse()?;
    let mut rng = StdRng::seed_from_u64(seed);

    // blobs spread on a circle so both encodings can separate them
    let mut data = Vec::with_capacity(per_blob * clusters);
    let mut truth = Vec::with_capacity(per_blob * clusters);
    for c in 0..clusters {
        let t = c as f64 / clusters as f64 * std::f64::consts::TAU;
        let (cx, cy) = (10.0 * t.cos() + 12.0, 10.0 * t.sin() + 12.0);
        for _ in 0..per_blob {
            data.push(vec![cx + rng.gen_range(-0.5..0.5), cy + rng.gen_range(-0.5..0.5)]);
            truth.push(c);
        }
    }

    println!(
        "Clustering {} points into {} clusters with {} encoding...",
        data.len(),
        clusters,
        map_type
    );

    let config = QKMeansConfig::new(clusters)
        .with_map_type(map_type)
        .with_max_iter(50)
        .with_random_state(seed);
    let mut model = QuantumKMeans::new(backend, config);

    let start = Instant::now();
    model.fit(&data)?;
    let duration = start.elapsed();

    println!("Finished in {:?} after {} iterations ({:?})", duration, model.n_iter(), model.termination());
    for (i, center) in model.cluster_centers().iter().enumerate() {
        let size = model.labels().iter().filter(|&&l| l == i).count();
        println!("  cluster {}: {} points, center {:?}", i, size, center);
    }

    // a blob is pure when all of its points share one label
    let pure = (0..clusters)
        .filter(|&c| {
            let labels: Vec<usize> = truth
                .iter()
                .zip(model.labels())
                .filter(|(t, _)| **t == c)
                .map(|(_, &l)| l)
                .collect();
            labels.windows(2).all(|w| w[0] == w[1])
        })
        .count();
    println!("{}/{} blobs recovered intact", pure, clusters);
    Ok(())
}

fn run_fit(
    backend: SwapTestSimulator,
    input: &std::path::Path,
    config_path: Option<&std::path::Path>,
    clusters: Option<usize>,
) -> Result<(), QKMeansError> {
    let mut config = match config_path {
        Some(path) => QKMeansConfig::from_json_file(path)?,
        None => QKMeansConfig::default(),
    };
    if let Some(k) = clusters {
        config.n_clusters = k;
    }

    let data = read_rows(input)?;
    println!("Loaded {} rows from {}", data.len(), input.display());

    let mut model = QuantumKMeans::new(backend, config);
    let labels = model.fit_predict(&data)?;

    println!("Iterations: {} ({:?})", model.n_iter(), model.termination());
    for (row, label) in labels.iter().enumerate() {
        println!("{}\t{}", row, label);
    }
    Ok(())
}

/// One vector per non-empty line; `#` starts a comment
fn read_rows(path: &std::path::Path) -> Result<Vec<Vec<f64>>, QKMeansError> {
    let text = fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let row = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<f64>().map_err(|e| {
                    QKMeansError::InvalidConfig(format!("line {}: '{}': {}", n + 1, s, e))
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;
        rows.push(row);
    }
    Ok(rows)
}
