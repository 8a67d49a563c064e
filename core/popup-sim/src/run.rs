//! `popup-sim run`: drive one page view in virtual time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use popup_core::{
    EngineOptions, FileStore, KeyValueStore, PopupEngine, SchedulerState, StorageConfig,
    VirtualPage,
};

/// Inputs for one simulated page view.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub config: PathBuf,
    pub page: Option<PathBuf>,
    pub storage: Option<PathBuf>,
    pub options: EngineOptions,
    pub duration: Duration,
    pub dismiss_at: Vec<Duration>,
    pub visible_at: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Dismiss,
    BadgeVisible,
}

/// What happened during the run, for the summary line and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub booted: bool,
    pub shown: Vec<(Duration, String)>,
    pub dismissals_applied: u32,
    pub final_state: Option<SchedulerState>,
    pub badge_value: Option<u64>,
    pub stored_dismissals: u32,
}

pub fn run(args: &RunArgs) -> Result<RunReport, String> {
    let payload = fs_err::read_to_string(&args.config)
        .map_err(|err| format!("Failed to read config {}: {}", args.config.display(), err))?;
    let page = load_page(args.page.as_deref())?;
    let store = match &args.storage {
        Some(path) => FileStore::open_path(path),
        None => FileStore::open(&StorageConfig::default()),
    };
    tracing::debug!(storage = %store.path().display(), "Using storage file");

    Ok(simulate(&payload, page, store, args))
}

fn load_page(path: Option<&Path>) -> Result<VirtualPage, String> {
    let Some(path) = path else {
        return Ok(VirtualPage::blank());
    };
    let content = fs_err::read_to_string(path)
        .map_err(|err| format!("Failed to read page {}: {}", path.display(), err))?;
    VirtualPage::from_json(&content)
        .map_err(|err| format!("Failed to parse page {}: {}", path.display(), err))
}

pub fn simulate<K: KeyValueStore>(
    payload: &str,
    page: VirtualPage,
    store: K,
    args: &RunArgs,
) -> RunReport {
    let mut report = RunReport::default();
    let Some(mut engine) = PopupEngine::boot(payload, page, store, &args.options) else {
        return report;
    };
    report.booted = true;

    let mut actions: Vec<(Duration, Action)> = args
        .dismiss_at
        .iter()
        .map(|at| (*at, Action::Dismiss))
        .chain(args.visible_at.map(|at| (at, Action::BadgeVisible)))
        .filter(|(at, _)| *at <= args.duration)
        .collect();
    actions.sort_by_key(|(at, _)| *at);
    let mut actions = actions.into_iter().peekable();

    let mut state = engine.scheduler_state();
    let mut current = current_title(&engine);
    println!("{:>9}  {}", format_secs(engine.now()), state);

    loop {
        let next_action = actions.peek().map(|(at, _)| *at);
        let step = [engine.next_deadline(), next_action, Some(args.duration)]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(args.duration)
            .min(args.duration);

        engine.advance_to(step);

        while let Some((_, action)) = actions.next_if(|(at, _)| *at <= step) {
            match action {
                Action::Dismiss => {
                    if engine.dismiss() {
                        report.dismissals_applied += 1;
                        println!("{:>9}  dismissed", format_secs(step));
                    } else {
                        println!("{:>9}  dismiss ignored (nothing showing)", format_secs(step));
                    }
                }
                Action::BadgeVisible => {
                    if engine.on_badge_visibility(1.0) {
                        println!("{:>9}  badge visible, counting up", format_secs(step));
                    }
                }
            }
        }

        let now_state = engine.scheduler_state();
        let now_current = current_title(&engine);
        if now_state != state || now_current != current {
            match (&now_current, now_state) {
                (Some(title), SchedulerState::Showing) => {
                    println!("{:>9}  {}  {}", format_secs(step), now_state, title);
                    report.shown.push((step, title.clone()));
                }
                _ => println!("{:>9}  {}", format_secs(step), now_state),
            }
            state = now_state;
            current = now_current;
        }

        if step >= args.duration {
            break;
        }
    }

    report.final_state = Some(engine.scheduler_state());
    report.badge_value = engine.surface().badge().map(|_| engine.badge().displayed_value());
    report.stored_dismissals = engine.dismissals().current_count();

    if let Some((_, text, _)) = engine.surface().badge() {
        println!("{:>9}  badge: {}", format_secs(engine.now()), text);
    }
    engine.destroy();
    println!(
        "{} popups shown, {} dismissals stored",
        report.shown.len(),
        report.stored_dismissals
    );
    report
}

fn current_title<K: KeyValueStore>(engine: &PopupEngine<VirtualPage, K>) -> Option<String> {
    engine
        .current_popup()
        .map(|popup| popup.activity.product_title.clone())
}

fn format_secs(at: Duration) -> String {
    format!("{:.3}s", at.as_secs_f64())
}

/// Parses a seconds value from the command line.
pub fn parse_secs(raw: &str) -> Result<Duration, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("not a number of seconds: {}", raw))?;
    Duration::try_from_secs_f64(value).map_err(|_| format!("not a usable duration: {}", raw))
}
