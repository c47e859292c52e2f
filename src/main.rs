#[macro_use]
extern crate log;
extern crate simplelog;

use byte_unit::Byte;
use flashsim::config::{CacheConfig, Config, CACHE_ENTRIES, ENTRY_NODE_BYTES};
use flashsim::error::Result;
use flashsim::ftl::{build_ftl, Ftl, FtlKind};
use rand::prelude::*;
use simplelog::{ConfigBuilder, LevelFilter, SimpleLogger};
use time::macros::format_description;

const ROUNDS: usize = 4;

/// Log and swallow what the simulation can carry on from.
fn tolerate(res: Result<()>) -> Result<()> {
    match res {
        Err(e) if !e.is_fatal() => {
            warn!("{}", e);
            Ok(())
        }
        other => other,
    }
}

fn run(kind: FtlKind, conf: &Config) -> Result<()> {
    let mut fw = build_ftl(kind, conf)?;
    let max_lpn = fw.max_lpn();

    info!(
        "{}: physical capacity {}, user capacity {}",
        fw.name(),
        Byte::from(conf.total_pages() * conf.page_size).get_appropriate_unit(true),
        Byte::from(conf.logical_pages() * conf.page_size).get_appropriate_unit(true)
    );

    for lpn in 0..=max_lpn {
        tolerate(fw.lba_write(lpn, None))?;
    }
    info!("Drive preconditioned");

    let mut rng: SmallRng = SmallRng::seed_from_u64(7);

    for c in 0..ROUNDS {
        for _ in 0..=max_lpn {
            let lpn = rng.gen_range(0..=max_lpn);
            tolerate(fw.lba_write(lpn, None))?;
        }
        info!("Capacity {} randomly written, WAF {:.3}", c, fw.write_amplification());
    }

    let wear = fw.block_pool().wear_stats();
    info!(
        "erase counts: min {} max {} avg {:.2} gap {}",
        wear.min, wear.max, wear.avg, wear.gap
    );
    info!("{}", fw.describe(conf.page_size));
    debug!("erase count distribution: {:?}", fw.erasure_count_distribution());
    println!("{}", fw.recorder());
    Ok(())
}

fn main() {
    let log_cfg = ConfigBuilder::new()
        .set_time_format_custom(format_description!("[hour]:[minute]:[second].[subsecond]"))
        .build();

    if SimpleLogger::init(LevelFilter::Info, log_cfg).is_err() {
        eprintln!("logger already initialised");
    }

    let conf = Config::default().with_cache(CacheConfig::two_level(CACHE_ENTRIES * ENTRY_NODE_BYTES));

    for kind in [FtlKind::PageMapped, FtlKind::BlockMapped] {
        if let Err(e) = run(kind, &conf) {
            error!("{:?} simulation aborted: {}", kind, e);
            std::process::exit(1);
        }
    }
}
