use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use log::info;

use rsimp::exchange;
use rsimp::simplify;

struct Args {
    input: PathBuf,
    fraction: f64,
    blocks: usize,
    threads: usize,
}

fn parse_args(argv: &[String]) -> Option<Args> {
    let [_, input, fraction, blocks, threads] = argv else {
        return None;
    };
    let fraction: f64 = fraction.parse().ok()?;
    let blocks: usize = blocks.parse().ok()?;
    let threads: usize = threads.parse().ok()?;
    if blocks == 0 || threads == 0 {
        return None;
    }
    Some(Args {
        input: PathBuf::from(input),
        fraction,
        blocks,
        threads,
    })
}

fn output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("mesh");
    input.with_file_name(format!("{stem}_simplified.off"))
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stdout)
        .init();

    let argv: Vec<String> = std::env::args().collect();
    let Some(args) = parse_args(&argv) else {
        eprintln!("Usage: rsimp <input file> <simplification fraction> <no of blocks> <no of threads>");
        process::exit(1);
    };
    if args.fraction >= 1.0 {
        eprintln!("Error: simplification fraction must be less than 1.0");
        process::exit(2);
    }

    info!("input file    : {}", args.input.display());
    info!("fraction      : {}", args.fraction);
    info!("blocks        : {}", args.blocks);
    info!("threads       : {}", args.threads);

    let started = Instant::now();

    let mut mesh = match exchange::load_mesh_file(&args.input) {
        Ok(mesh) => mesh,
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(err.exit_code());
        }
    };

    info!(
        "{} vertex(s), {} face(s), {} edge(s)",
        mesh.live_vertices(),
        mesh.live_faces(),
        mesh.live_edges()
    );
    let dims = mesh.volume.dimensions();
    info!("volume dimensions : [{}, {}, {}]", dims.x, dims.y, dims.z);

    let report = simplify::simplify(&mut mesh, args.fraction, args.threads);

    let output = output_path(&args.input);
    info!("saving mesh to {}", output.display());
    if let Err(err) = exchange::save_mesh_file(&mesh, &output) {
        eprintln!("Error: {err}");
        process::exit(err.exit_code());
    }

    info!(
        "done: {} collapse(s), {} failure(s), {} ms",
        report.collapsed,
        report.failures,
        started.elapsed().as_millis()
    );
}
