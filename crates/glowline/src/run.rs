use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glowconfig::AppConfig;
use glowpipe::{
    GpuExecutor, LinePipeline, PassExecutor, PipelineError, Polyline, SoftwareExecutor,
    SurfaceError, Target, TargetImage, Viewport,
};
use hershey::Font;
use tracing_subscriber::EnvFilter;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use crate::cli::Args;
use crate::mainloop::{FixedStep, Tick};
use crate::scene::{text_shapes, Scene};

pub fn run(args: Args) -> Result<()> {
    initialise_tracing();

    let config = load_config(&args)?;
    let viewport = Viewport::new(config.window.width, config.window.height);
    let text = load_text(&args, viewport)?;
    let scene = Scene::new(&config.layer_names(), text, viewport);

    if args.headless {
        run_headless(&args, &config, scene)
    } else {
        if args.software {
            tracing::warn!("--software only applies to headless runs; using the GPU");
        }
        run_window(&config, scene)
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => {
            let config = AppConfig::load(path)
                .with_context(|| format!("failed to load configuration {}", path.display()))?;
            tracing::info!(
                config = %path.display(),
                layers = config.layers.len(),
                "loaded configuration"
            );
            config
        }
        None => {
            tracing::debug!("no configuration given; using built-in defaults");
            AppConfig::default()
        }
    };

    if let Some((width, height)) = args.size {
        config.window.width = width;
        config.window.height = height;
    }
    if let Some(after_glow) = args.after_glow {
        config.after_glow = after_glow;
    }
    config.validate().context("invalid command-line overrides")?;
    Ok(config)
}

fn load_text(args: &Args, viewport: Viewport) -> Result<Option<Vec<Polyline>>> {
    let (Some(text), Some(path)) = (args.text.as_deref(), args.font.as_deref()) else {
        if args.font.is_some() {
            tracing::warn!("--font given without --text; nothing to lay out");
        }
        return Ok(None);
    };

    let font =
        Font::load(path).with_context(|| format!("failed to load font {}", path.display()))?;
    let shapes = text_shapes(&font, text, viewport);
    tracing::info!(
        font = font.name(),
        glyphs = font.glyph_count(),
        strokes = shapes.len(),
        "laid out text"
    );
    Ok(Some(shapes))
}

fn run_headless(args: &Args, config: &AppConfig, mut scene: Scene) -> Result<()> {
    let viewport = Viewport::new(config.window.width, config.window.height);
    let executor: Box<dyn PassExecutor> = if args.software {
        Box::new(SoftwareExecutor::new(viewport))
    } else {
        Box::new(
            GpuExecutor::headless(viewport)
                .context("failed to initialise headless GPU renderer (try --software)")?,
        )
    };
    let mut pipeline = LinePipeline::new(&config.layer_names(), executor)?;
    let layer_params = config.layer_params();
    let frame_params = config.frame_params();

    // Headless frames are exactly one simulation step apart.
    let mut clock = FixedStep::new(config.timing.step, config.timing.max_updates_per_frame);
    let started = Instant::now();
    let mut last = None;
    for frame in 0..args.frames {
        apply_tick(clock.advance(clock.step()), &mut scene);
        let params = frame_params.for_frame(u64::from(frame));
        last = Some(pipeline.draw(scene.sprites(), &layer_params, &params)?);
    }

    if let Some(stats) = last {
        tracing::info!(
            frames = args.frames,
            width = stats.viewport.width,
            height = stats.viewport.height,
            vertices = stats.total_vertices(),
            passes = stats.passes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "headless run finished"
        );
    }

    if let Some(path) = args.output.as_deref() {
        let image = pipeline.read_target(Target::Screen)?;
        save_png(&image, path)?;
        tracing::info!(path = %path.display(), "wrote final frame");
    }
    Ok(())
}

fn apply_tick(tick: Tick, scene: &mut Scene) {
    for _ in 0..tick.updates {
        scene.update();
    }
    if tick.panicked {
        tracing::warn!(
            updates = tick.updates,
            discarded_ms = tick.discarded.as_secs_f64() * 1000.0,
            "simulation fell behind; discarded accumulated time"
        );
    }
}

fn save_png(image: &TargetImage, path: &Path) -> Result<()> {
    let buffer = image::RgbaImage::from_raw(image.width, image.height, image.pixels.clone())
        .ok_or_else(|| {
            anyhow!(
                "read back image does not match its {}x{} size",
                image.width,
                image.height
            )
        })?;
    buffer
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn run_window(config: &AppConfig, mut scene: Scene) -> Result<()> {
    let event_loop =
        EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(config.window.title.as_str())
        .with_inner_size(PhysicalSize::new(config.window.width, config.window.height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let size_source = Arc::clone(&window);
    let executor = GpuExecutor::windowed(Arc::clone(&window), move || {
        let size = size_source.inner_size();
        Viewport::new(size.width, size.height)
    })
    .context("failed to initialise GPU renderer")?;
    let mut pipeline = LinePipeline::new(&config.layer_names(), executor)?;
    let layer_params = config.layer_params();
    let frame_params = config.frame_params();
    let mut clock = FixedStep::new(config.timing.step, config.timing.max_updates_per_frame);
    let mut frame = 0u64;
    let mut failure: Option<anyhow::Error> = None;

    tracing::info!(title = %config.window.title, "window ready");
    event_loop
        .run(|event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                WindowEvent::KeyboardInput { event, .. }
                    if event.state == ElementState::Pressed
                        && event.logical_key == Key::Named(NamedKey::Escape) =>
                {
                    elwt.exit();
                }
                WindowEvent::RedrawRequested => {
                    apply_tick(clock.tick(Instant::now()), &mut scene);
                    let params = frame_params.for_frame(frame);
                    frame += 1;
                    match pipeline.draw(scene.sprites(), &layer_params, &params) {
                        Ok(_) => {}
                        Err(PipelineError::Surface(SurfaceError::Lost | SurfaceError::Outdated)) => {
                            tracing::warn!("surface lost or outdated; reconfiguring");
                            pipeline.executor_mut().reconfigure_surface();
                        }
                        Err(PipelineError::Surface(SurfaceError::OutOfMemory)) => {
                            failure = Some(anyhow!("surface out of memory"));
                            elwt.exit();
                        }
                        Err(PipelineError::Surface(SurfaceError::Timeout)) => {
                            tracing::warn!("surface timeout; retrying next frame");
                        }
                        Err(PipelineError::Surface(other)) => {
                            tracing::warn!(error = ?other, "surface error; retrying next frame");
                        }
                        Err(err) => {
                            failure = Some(anyhow::Error::new(err).context("failed to draw frame"));
                            elwt.exit();
                        }
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            }
            _ => {}
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))?;

    match failure {
        Some(err) => Err(err),
        None => {
            tracing::info!("window closed");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["glowline"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn overrides_apply_on_top_of_the_config() {
        let config = load_config(&args(&["--size", "64x48", "--after-glow", "0.4"])).unwrap();
        assert_eq!((config.window.width, config.window.height), (64, 48));
        assert_eq!(config.frame_params().after_glow, 0.4);
    }

    #[test]
    fn negative_after_glow_is_rejected() {
        assert!(load_config(&args(&["--after-glow=-1"])).is_err());
    }

    #[test]
    fn config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glowline.toml");
        std::fs::write(&path, "version = 1\n[[layers]]\nname = \"only\"\n").unwrap();
        let config = load_config(&args(&["--config", path.to_str().unwrap()])).unwrap();
        assert_eq!(config.layer_names(), vec!["only"]);
    }

    #[test]
    fn software_headless_run_writes_a_png() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("frame.png");
        let args = args(&[
            "--headless",
            "--software",
            "--frames",
            "2",
            "--size",
            "48x32",
            "--output",
            output.to_str().unwrap(),
        ]);
        let config = load_config(&args).unwrap();
        let scene = Scene::new(&config.layer_names(), None, Viewport::new(48, 32));
        run_headless(&args, &config, scene).unwrap();

        let written = image::open(&output).unwrap().to_rgba8();
        assert_eq!(written.dimensions(), (48, 32));
    }

    #[test]
    fn save_png_round_trips_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        let image = TargetImage {
            width: 2,
            height: 1,
            pixels: vec![255, 0, 0, 255, 0, 0, 255, 128],
        };
        save_png(&image, &path).unwrap();

        let written = image::open(&path).unwrap().to_rgba8();
        assert_eq!(written.get_pixel(1, 0).0, [0, 0, 255, 128]);
    }
}
