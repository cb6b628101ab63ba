#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate log;

mod options;

use crossbeam_channel::{bounded, RecvTimeoutError};
use device::*;
use indicatif::{ProgressBar, ProgressStyle};
use kernel::film::{CryptomatteFlags, FilmSettings};
use kernel::scene::{demo_scene, IntegratorSettings};
use kernel::texture::{write_image, Extension, Interpolation};
use options::*;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

fn main() {
    init_logger();

    if let Err(e) = render() {
        error!("{e}");
        std::process::exit(1);
    }
}

/// Initialize `env_logger`. `--log-level` overrides `RUST_LOG`.
fn init_logger() {
    let default_level = if OPTIONS.quiet { "error" } else { "info" };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    if let Some(level) = OPTIONS.log_level {
        builder.filter_level(level);
    }
    builder.init();
}

fn render() -> Result<(), String> {
    let options = &*OPTIONS;

    let params = SessionParams {
        samples: options.samples,
        tile_size: options.tile_size,
        device: DeviceConfig {
            num_threads: options.threads(),
            isa: options.isa,
        },
        need_finish_queue: false,
    };
    let mut session = Session::new(params).map_err(|e| e.to_string())?;

    let floor_texture = match options.texture.as_deref() {
        Some(path) => Some(
            session
                .add_image(path, Interpolation::Linear, Extension::Repeat)
                .map_err(|e| e.to_string())?,
        ),
        None => None,
    };

    let Resolution { width, height } = options.resolution;
    let (mut builder, evaluator) = demo_scene(width, height, floor_texture);
    let cryptomatte = if options.cryptomatte_depth > 0 {
        CryptomatteFlags::OBJECT | CryptomatteFlags::MATERIAL
    } else {
        CryptomatteFlags::empty()
    };
    builder
        .integrator(IntegratorSettings {
            aa_samples: options.samples,
            max_bounce: options.max_bounce,
            min_bounce: options.min_bounce.min(options.max_bounce),
            ..Default::default()
        })
        .film(FilmSettings {
            use_depth: true,
            use_denoising: options.denoising_passes,
            use_light_passes: options.light_passes,
            cryptomatte,
            cryptomatte_depth: options.cryptomatte_depth,
            ..Default::default()
        });
    session.scene_update(Arc::new(builder.build()), Some(Arc::new(evaluator)));

    let progress = session.progress();
    let bar = progress_bar(options.quiet)?;
    let b = bar.clone();
    progress.set_update_callback(Box::new(move |p: &Progress| {
        b.set_length(p.total_pixel_samples());
        b.set_position(p.pixel_samples());
    }));

    // Dropping the sender stops the watchdog.
    let (done_tx, done_rx) = bounded::<()>(0);
    let watchdog: Option<JoinHandle<()>> = match options.time_limit {
        Some(seconds) if seconds > 0.0 => {
            let handle = session.cancel_handle();
            let limit = Duration::from_secs_f64(seconds);
            let thread = std::thread::Builder::new()
                .name(String::from("watchdog"))
                .spawn(move || {
                    if let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(limit) {
                        info!("Time limit of {seconds}s reached");
                        handle.cancel("Time limit reached");
                    }
                })
                .map_err(|e| format!("Unable to start watchdog: {e}"))?;
            Some(thread)
        }
        _ => None,
    };

    let output = session.render();
    drop(done_tx);
    if let Some(watchdog) = watchdog {
        if watchdog.join().is_err() {
            warn!("Watchdog thread panicked");
        }
    }
    let output = output.map_err(|e| e.to_string())?;
    bar.finish_and_clear();

    if !options.quiet {
        let stats = &output.stats;
        info!(
            "{} paths, {} samples per pixel, {} invalid samples, {} dropped closures",
            stats.paths, output.samples, stats.nan_samples, stats.dropped_closures
        );
    }

    // Film rows start at the bottom; image files start at the top.
    let rgba = output.rgba();
    let pixels: Vec<[kernel::math::Float; 4]> = rgba.chunks(output.width).rev().flatten().copied().collect();
    write_image(&options.image_file, &pixels, output.width, output.height).map_err(|e| e.to_string())?;
    info!("Wrote {}", options.image_file);
    Ok(())
}

/// Progress bar over pixel samples, hidden when `quiet`.
fn progress_bar(quiet: bool) -> Result<ProgressBar, String> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{bar:40} {percent}% {elapsed_precise} ETA: {eta}")
        .map_err(|e| format!("Invalid progress bar template: {e}"))?;
    bar.set_style(style);
    Ok(bar)
}
