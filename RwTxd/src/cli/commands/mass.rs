//! CLI command for mass conversion

use std::path::Path;
use std::sync::{Arc, Once};
use std::time::Instant;

use anyhow::Context;
use indicatif::ProgressBar;
use parking_lot::Mutex;

use crate::batch::{MassConvConfig, MassConvReport, MassConverter};
use crate::cli::progress::{DISK, GEAR, LOOKING_GLASS, hidden_bar, print_done, print_step, simple_bar};
use crate::scheduler::{ActionFailure, ActionHost, ActionSystem, CancelHandle};

/// Shows the running file on the bar and keeps the failure, if any.
struct MassConvHost {
    bar: ProgressBar,
    failure: Mutex<Option<String>>,
}

impl ActionHost for MassConvHost {
    fn on_update_status_message(&self, message: &str) {
        self.bar.set_prefix(message.to_string());
    }

    fn report_exception(&self, name: &str, failure: &ActionFailure) {
        tracing::error!("{}: {}", name, failure);
        *self.failure.lock() = Some(failure.to_string());
    }
}

/// The run Ctrl-C cancels. Empty between runs.
static INTERRUPT_TARGET: Mutex<Option<CancelHandle>> = Mutex::new(None);
static INTERRUPT_HANDLER: Once = Once::new();

/// Route Ctrl-C to `handle` so partial outputs are cleaned up on the way out.
fn install_interrupt(handle: CancelHandle) {
    *INTERRUPT_TARGET.lock() = Some(handle);
    INTERRUPT_HANDLER.call_once(|| {
        let installed = ctrlc::set_handler(|| match INTERRUPT_TARGET.lock().as_ref() {
            Some(handle) => {
                eprintln!("Interrupted, cancelling...");
                handle.cancel();
            }
            None => std::process::exit(130),
        });
        if let Err(err) = installed {
            tracing::warn!("failed to install the Ctrl-C handler: {}", err);
        }
    });
}

/// Run `converter` as one action. `on_started` receives a handle that
/// cancels the run.
fn run_converter(
    converter: MassConverter,
    bar: &ProgressBar,
    on_started: impl FnOnce(CancelHandle),
) -> anyhow::Result<MassConvReport> {
    let host = Arc::new(MassConvHost {
        bar: bar.clone(),
        failure: Mutex::new(None),
    });
    let system = ActionSystem::new(converter.engine().clone(), host.clone())?;

    let result: Arc<Mutex<Option<MassConvReport>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&result);
    let action_bar = bar.clone();
    system.launch_action("mass conversion", move |ctx| {
        let report = converter.run(&|step| {
            action_bar.set_length(step.total as u64);
            action_bar.set_position(step.current as u64 - 1);
            ctx.update_status(&step.path.display().to_string());
        })?;
        action_bar.set_position(report.files.len() as u64);
        *slot.lock() = Some(report);
        Ok(())
    });
    on_started(system.cancel_handle());
    let idle = system.wait_for_idle();
    system.shutdown();
    idle?;

    if let Some(failure) = host.failure.lock().take() {
        anyhow::bail!("mass conversion did not finish: {failure}");
    }
    let report = result
        .lock()
        .take()
        .context("mass conversion ended without a report")?;
    Ok(report)
}

pub fn execute(config_path: &Path, report_path: Option<&Path>, progress: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let steps = if report_path.is_some() { 3 } else { 2 };

    print_step(1, steps, LOOKING_GLASS, "Reading configuration...");
    let config = MassConvConfig::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    for key in &config.unknown_keys {
        println!("  ignoring unknown key '{key}'");
    }
    println!(
        "  {} -> {} ({}, {})",
        config.game_root.display(),
        config.output_root.display(),
        config.target_platform,
        config.target_version
    );

    let converter = MassConverter::new(config);
    // Fail before starting the worker when the game root is unusable.
    let total = converter.collect_files()?.len();

    print_step(2, steps, GEAR, "Converting files...");
    let bar = if progress {
        simple_bar(total as u64, "Converting")
    } else {
        hidden_bar()
    };
    let report = run_converter(converter, &bar, install_interrupt);
    INTERRUPT_TARGET.lock().take();
    bar.finish_and_clear();
    let report = report?;

    println!(
        "  {} converted, {} copied, {} failed",
        report.converted_count(),
        report.copied_count(),
        report.failed_count()
    );

    if let Some(path) = report_path {
        print_step(3, steps, DISK, "Writing report...");
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    print_done(start.elapsed());
    Ok(())
}
