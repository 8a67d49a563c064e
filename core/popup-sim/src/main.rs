//! popup-sim: run the storefront popup engine outside a browser.
//!
//! Drives `popup-core` in virtual time against a JSON page fixture and a
//! file-backed store, so a payload can be checked end to end from a terminal.
//!
//! ## Subcommands
//!
//! - `run`: simulate one page view and print the timeline
//! - `render`: print the popup markup for every activity in a payload
//! - `status`: show the stored dismissal count
//! - `clear`: reset the stored dismissal count

mod logging;
mod options;
mod run;
mod store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use popup_core::{load_config, BadgeView, PopupView, VisualState};

#[derive(Parser)]
#[command(name = "popup-sim")]
#[command(about = "Storefront sales popup simulator")]
#[command(version)]
struct Cli {
    /// Engine options file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    options: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate one page view in virtual time
    Run {
        /// Configuration payload (JSON)
        #[arg(long, value_name = "FILE")]
        config: PathBuf,

        /// Page fixture (JSON); defaults to an empty page with a popup container
        #[arg(long, value_name = "FILE")]
        page: Option<PathBuf>,

        /// Storage file; defaults to the platform data dir
        #[arg(long, value_name = "FILE")]
        storage: Option<PathBuf>,

        /// Seconds of virtual time to simulate
        #[arg(long, default_value = "30", value_parser = run::parse_secs)]
        duration: Duration,

        /// Instants (seconds) at which the shopper clicks close
        #[arg(long, value_delimiter = ',', value_parser = run::parse_secs)]
        dismiss_at: Vec<Duration>,

        /// Instant (seconds) at which the counter badge scrolls into view
        #[arg(long, value_parser = run::parse_secs)]
        visible_at: Option<Duration>,
    },

    /// Print popup markup for each activity in a payload
    Render {
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Show the stored dismissal count
    Status {
        #[arg(long, value_name = "FILE")]
        storage: Option<PathBuf>,
    },

    /// Clear the stored dismissal count
    Clear {
        #[arg(long, value_name = "FILE")]
        storage: Option<PathBuf>,
    },
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();
    let engine_options = options::load_options_or_default(cli.options.as_deref());

    let result = match cli.command {
        Commands::Run {
            config,
            page,
            storage,
            duration,
            dismiss_at,
            visible_at,
        } => run::run(&run::RunArgs {
            config,
            page,
            storage,
            options: engine_options,
            duration,
            dismiss_at,
            visible_at,
        })
        .map(|_| ()),
        Commands::Render { config } => render(&config, &engine_options),
        Commands::Status { storage } => {
            let status = store::status(storage.as_deref(), &engine_options);
            println!(
                "dismissals: {}/{} ({})",
                status.dismissals,
                status.threshold,
                if status.popups_allowed {
                    "popups allowed"
                } else {
                    "popups stopped"
                }
            );
            Ok(())
        }
        Commands::Clear { storage } => store::clear(storage.as_deref(), &engine_options),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "popup-sim failed");
        std::process::exit(1);
    }
}

fn render(path: &std::path::Path, engine_options: &popup_core::EngineOptions) -> Result<(), String> {
    let raw = fs_err::read_to_string(path)
        .map_err(|err| format!("Failed to read config {}: {}", path.display(), err))?;
    let config = load_config(&raw).map_err(String::from)?;

    for activity in &config.activities {
        let view = PopupView::from_activity(activity, config.settings.popup_position);
        println!("{}", view.to_html(VisualState::Visible));
    }

    if let Some(count) = config.purchase_count.filter(|count| *count > 0) {
        let label = config
            .settings
            .counter_label
            .as_deref()
            .unwrap_or(engine_options.counter_label.as_str());
        println!("{}", BadgeView::new(label).to_html(count, true));
    }
    Ok(())
}
