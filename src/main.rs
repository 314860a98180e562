mod app;
mod backdrop;
mod config;
mod debug;
mod grid;
mod highlight;
mod project;
mod render;
mod trail;
mod util;

fn main() {
    env_logger::init();
    log::info!("gridglow starting up");

    if let Err(e) = app::run() {
        log::error!("Fatal error: {e}");
        std::process::exit(1);
    }
}
