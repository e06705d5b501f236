// src/main.rs

use std::path::PathBuf;

use anyhow::{bail, Result};
use log::info;

use hugo_shell::config::Settings;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let game_path = match std::env::args_os().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => bail!("usage: hugo-shell <game-file>"),
    };

    let settings = Settings::load_or_default(None);
    info!("starting hugo-shell with {}", game_path.display());
    run(settings, game_path)
}

#[cfg(feature = "hugo-engine")]
fn run(settings: Settings, game_path: PathBuf) -> Result<()> {
    use anyhow::Context;
    use hugo_shell::backend::{Driver, XDriver};
    use hugo_shell::engine::ffi::HugoEngine;
    use hugo_shell::engine::session::Interpreter;
    use hugo_shell::shell::Shell;

    let mut driver = XDriver::new(&settings).context("initializing the X11 driver")?;
    if settings.appearance.start_fullscreen {
        driver.set_fullscreen(true);
    }
    let mut shell = Shell::new(Box::new(driver), settings);
    shell.set_interpreter_factory(|| Box::new(HugoEngine::new()) as Box<dyn Interpreter>);
    shell.request_game(game_path)?;
    shell.run()
}

#[cfg(not(feature = "hugo-engine"))]
fn run(_settings: Settings, _game_path: PathBuf) -> Result<()> {
    bail!("this build links no interpreter; rebuild with the `hugo-engine` feature")
}
