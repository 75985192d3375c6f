// =============================================================================
// VULKAN TRIANGLE - three programs, one initialization sequence
// =============================================================================
//
// Each binary under src/demo runs the same code up to a different stage:
//
//   1-instance    window + instance (+ validation)
//   2-swapchain   + surface, device, swapchain
//   3-triangle    + render pass, pipeline, per-frame drawing
//
// Exit codes: 0 clean shutdown, 1 setup error, 2 Vulkan call failed.
//
// =============================================================================

pub mod app;
pub mod backend;
pub mod config;
pub mod error;

pub use app::Stage;

use anyhow::{Context, Result};
use app::App;
use config::Config;
use std::process::ExitCode;
use winit::event_loop::EventLoop;

/// Run one program to completion and turn the outcome into an exit code.
pub fn run(stage: Stage) -> ExitCode {
    let config = Config::load();
    init_logging(&config);

    log::info!(
        "Window: {}x{} \"{}\"",
        config.window.width,
        config.window.height,
        config.window.title
    );
    log::info!(
        "Validation layers: {}",
        if config.validation_enabled() { "on" } else { "off" }
    );

    match run_app(stage, config) {
        Ok(()) => ExitCode::from(error::EXIT_OK),
        Err(e) => {
            log::error!("{:?}", e);
            ExitCode::from(error::exit_code(&e))
        }
    }
}

fn run_app(stage: Stage, config: Config) -> Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(stage, config);
    event_loop
        .run_app(&mut app)
        .context("Event loop terminated abnormally")?;
    app.finish()
}

/// RUST_LOG overrides the level from config.toml.
fn init_logging(config: &Config) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.log_level());
    builder.parse_default_env();
    builder.init();
}
