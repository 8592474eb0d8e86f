//! `yascheduler` daemon entry point: loads configuration, wires up the
//! controller, and runs the pass loop until a termination signal arrives.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Result, WrapErr};
use serde_json::Value;
use tracing::info;

use yascheduler::cli::{Opts, SubCommand};
use yascheduler_common::{init_logging, load_config};
use yascheduler_engines::EngineRepository;

fn main() -> Result<()> {
    let opts = Opts::parse();
    init_logging(opts.verbose);

    match &opts.subcmd {
        SubCommand::Version => {
            println!("{} {}", clap::crate_name!(), clap::crate_version!());
            Ok(())
        }
        SubCommand::Config => cmd_config(&opts),
        SubCommand::Submit(submit_opts) => cmd_submit(&opts, submit_opts),
        SubCommand::Run(run_opts) => cmd_run(&opts, run_opts),
    }
}

fn cmd_config(opts: &Opts) -> Result<()> {
    let cfg = load_config(&opts.config).wrap_err("loading configuration")?;
    println!("{cfg:#?}");
    Ok(())
}

fn cmd_submit(opts: &Opts, submit_opts: &yascheduler::cli::SubmitOpts) -> Result<()> {
    let cfg = load_config(&opts.config).wrap_err("loading configuration")?;
    let engines = EngineRepository::from_sections(&cfg.engine_sections)?;
    let metadata_text =
        fs::read_to_string(&submit_opts.metadata).wrap_err("reading metadata file")?;
    let metadata: Value = serde_json::from_str(&metadata_text).wrap_err("parsing metadata JSON")?;

    let mut controller = yascheduler::build_controller(&cfg)?;
    let task_id = yascheduler_scheduler::submit_task(
        controller.storage_mut(),
        &engines,
        &cfg.remote.tasks_dir.display().to_string(),
        &submit_opts.label,
        metadata,
        &submit_opts.engine,
    )?;
    println!("submitted task {task_id}");
    Ok(())
}

fn cmd_run(opts: &Opts, run_opts: &yascheduler::cli::RunOpts) -> Result<()> {
    let cfg = load_config(&opts.config).wrap_err("loading configuration")?;
    let controller = yascheduler::build_controller(&cfg)?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        info!("termination signal received, finishing current pass...");
        stop_handler.store(true, Ordering::SeqCst);
    })
    .wrap_err("installing signal handler")?;

    yascheduler::run_loop(controller, Duration::from_secs(run_opts.interval), move || {
        stop.load(Ordering::SeqCst)
    });
    Ok(())
}
