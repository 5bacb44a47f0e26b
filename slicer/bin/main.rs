use std::{
    fs::File,
    io::{stdout, BufReader, BufWriter, Write},
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

use common::misc::human_duration;
use slicer::{
    format::svg::SvgFile,
    mesh::load_mesh,
    slicer::Slicer,
    toolpath::{emit_motion, stack_records},
};

mod args;
use args::Args;

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = filter::Targets::new()
        .with_default(LevelFilter::OFF)
        .with_target("slicer", args.log_level)
        .with_target("common", args.log_level);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = args.toolpath_config()?;

    let mut slicers = Vec::new();
    for path in &args.mesh {
        let ext = path
            .extension()
            .map(|x| x.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = File::open(path).with_context(|| format!("Can't open `{}`", path.display()))?;
        let mesh = load_mesh(BufReader::new(file), &ext)?;

        let (min, max) = mesh.bounds();
        info!(
            "Loaded `{}`. {{ faces: {}, z: {:.3}..{:.3} }}",
            path.display(),
            mesh.face_count(),
            min.z,
            max.z
        );

        slicers.push(Slicer::new(mesh, config.slice.clone())?);
    }

    let now = Instant::now();
    let progress = slicers.iter().map(Slicer::progress).collect::<Vec<_>>();
    let job = thread::spawn(move || {
        slicers
            .into_par_iter()
            .map(|slicer| slicer.slice(|_| {}))
            .collect::<Vec<_>>()
    });

    while !job.is_finished() {
        let (done, total) = progress
            .iter()
            .fold((0, 0), |(d, t), x| (d + x.completed(), t + x.total()));
        print!("\rLayer: {done}/{total}");
        stdout().flush()?;
        thread::sleep(Duration::from_millis(50));
    }
    println!();

    let stacks = job
        .join()
        .map_err(|_| anyhow::anyhow!("Slicing thread panicked"))?;

    for (index, stack) in stacks.iter().enumerate() {
        let records = stack_records(stack, &config, args.start);
        let motions = emit_motion(&config.emit, &records);

        let path = args.numbered(&args.output, index);
        let mut out = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut out, &motions)?;
        out.flush()?;
        info!(
            "Wrote {} motions for {} layers to `{}`",
            motions.len(),
            stack.len(),
            path.display()
        );

        if let Some(svg) = &args.svg {
            let path = args.numbered(svg, index);
            SvgFile::from_stack(stack).write(BufWriter::new(File::create(&path)?))?;
            info!("Wrote slices to `{}`", path.display());
        }
    }

    println!("Done. Elapsed: {}", human_duration(now.elapsed()));
    Ok(())
}
