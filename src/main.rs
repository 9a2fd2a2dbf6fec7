use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use vnf_cg_scheduler::logger;
use vnf_cg_scheduler::report::{append_result, write_batch_table};
use vnf_cg_scheduler::schedule_from_files;

/// Schedules service function chains onto a VNF substrate by column generation.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON file with machines, VNFs and links
    #[arg(short, long)]
    network: String,

    /// JSON file with the service set
    #[arg(short, long)]
    services: String,

    /// JSON run configuration, defaults are used if omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Result table the run is appended to
    #[arg(short, long, default_value = "results.csv")]
    report: PathBuf,

    /// Optional per-batch table
    #[arg(short, long)]
    batch_report: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init();

    let output = schedule_from_files(&args.network, &args.services, args.config.as_deref())
        .with_context(|| format!("scheduling '{}' on '{}' failed", args.services, args.network))?;

    append_result(&args.report, &output.result).with_context(|| format!("writing '{}' failed", args.report.display()))?;
    if let Some(path) = &args.batch_report {
        write_batch_table(path, &output.summary.batches).with_context(|| format!("writing '{}' failed", path.display()))?;
    }

    for service in output.services.iter().filter(|s| s.is_admitted()) {
        log::debug!("Service {} completes at slot {:?}", service.id, service.completion_time);
    }
    log::info!("{} of {} services admitted", output.result.admitted, output.result.service_count);
    Ok(())
}
