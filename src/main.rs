#[macro_use]
extern crate log;

use fanping::{cli::App, engine::Engine};

fn main() {
    let config = match App::parse_args() {
        Ok(config) => config,
        Err(e) => {
            // Help and version requests end up here as well
            if let Some(clap_error) = e.downcast_ref::<clap::Error>() {
                clap_error.exit();
            }
            error!("Could not parse provided argument: {}", e);
            std::process::exit(1);
        }
    };
    let wants_summary = config.wants_summary();

    trace!("Set up new engine");

    let engine = Engine::new(config);
    let interrupt = engine.interrupt_signal();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        trace!("Registered signal interrupt -- Signalling shut down to systems");
        interrupt.trigger();
    }) {
        warn!("Could not register Ctrl+C handler: {}", e);
    }

    trace!("Start ping run");

    let summary = match engine.ping() {
        Ok(summary) => summary,
        Err(e) => {
            error!("An error occurred during the ping run: {}", e);
            std::process::exit(1);
        }
    };

    trace!("Successfully ended ping run");

    if wants_summary {
        summary.tally();
    }

    trace!("Shutting down...");
}
