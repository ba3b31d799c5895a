mod opt_merge;

use crate::opt_merge::Opt;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use gammajet::{
    merge::MergeError,
    prelude::*,
    progress_bar::{Progress, ProgressBar},
    GIT_BRANCH, GIT_REV, VERSION,
};
use log::{debug, info, warn};

fn main() -> Result<()> {
    let args = argfile::expand_args_from(
        std::env::args_os(),
        argfile::parse_fromfile,
        argfile::PREFIX,
    )
    .with_context(|| "Failed to read argument file")?;
    let opt = Opt::parse_from(args);

    let env = Env::default().filter_or("GAMMAJET_LOG", &opt.loglevel);
    env_logger::init_from_env(env);

    if let (Some(rev), Some(branch)) = (GIT_REV, GIT_BRANCH) {
        info!("gammajet-merge {VERSION} rev {rev} ({branch})");
    } else {
        info!("gammajet-merge {VERSION}");
    }
    debug!("settings: {:#?}", opt);

    let merger = merge(&opt)?;
    info!("Merged {} machines", merger.len());

    let mut out = ObjectFile::create(&opt.outfile).with_compression(opt.compression);
    merger.write_to(&mut out)?;
    out.save()?;
    info!("Wrote {:?}", opt.outfile);
    Ok(())
}

fn merge(opt: &Opt) -> Result<Merger> {
    let mut merger = Merger::new()
        .with_name(opt.name.clone())
        .with_precision(opt.precision);
    let mut no_machines = Vec::new();
    let progress = ProgressBar::new(opt.infiles.len() as u64, "files merged:");
    let res = opt.infiles.iter().try_for_each(|infile| {
        if merger.add_file(infile)? == 0 {
            no_machines.push(infile);
        }
        progress.inc(1);
        Ok::<_, MergeError>(())
    });
    progress.finish();
    // logging is suspended while the progress bar is shown
    for infile in no_machines {
        warn!("No machines found in {infile:?}");
    }
    res?;
    if opt.compute_sub {
        merger.compute_sub()?;
    }
    Ok(merger)
}
