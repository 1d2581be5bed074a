//! # blocklog-tool — offline block log maintenance
//!
//! Runs the block log's offline operations against a blocks directory. All
//! operations require exclusive access: stop the node first.
//!
//! ## Commands
//!
//! ```text
//! construct-index <dir>            Rebuild blocks.index from blocks.log
//! repair <dir> [stop_block]        Rewrite the log up to its last valid entry
//! trim-front <dir> <temp> <block>  Drop all blocks before <block>
//! trim-end <dir> <block>           Drop all blocks after <block>
//! smoke-test <dir> [interval]      Light-validate entries at a stride
//! chain-id <dir>                   Print the chain id
//! genesis <dir>                    Print the embedded genesis state
//! ```
//!
//! ## Configuration
//!
//! ```text
//! BLOCKLOG_LOG   tracing env-filter (default: "info")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ blocklog-tool smoke-test /var/lib/node/blocks
//! $ blocklog-tool trim-front /var/lib/node/blocks /tmp/trim 1000
//! ```

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let filter = std::env::var("BLOCKLOG_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        print_usage();
        bail!("missing command");
    };

    match command.as_str() {
        "construct-index" => {
            let dir = dir_arg(rest, 0)?;
            blocklog::construct_index(
                dir.join(blocklog::LOG_FILENAME),
                dir.join(blocklog::INDEX_FILENAME),
            )?;
        }
        "repair" => {
            let dir = dir_arg(rest, 0)?;
            let stop = opt_num_arg(rest, 1)?;
            let backup = blocklog::repair_log(&dir, stop)?;
            println!("backup written to {}", backup.display());
        }
        "trim-front" => {
            let dir = dir_arg(rest, 0)?;
            let temp = dir_arg(rest, 1)?;
            let block = num_arg(rest, 2, "first kept block")?;
            if !blocklog::trim_front(&dir, &temp, block)? {
                println!("nothing to trim");
            }
        }
        "trim-end" => {
            let dir = dir_arg(rest, 0)?;
            let block = num_arg(rest, 1, "last kept block")?;
            if !blocklog::trim_end(&dir, block)? {
                println!("nothing to trim");
            }
        }
        "smoke-test" => {
            let dir = dir_arg(rest, 0)?;
            let interval = opt_num_arg(rest, 1)?.unwrap_or(0);
            blocklog::smoke_test(&dir, interval)?;
            println!("ok");
        }
        "chain-id" => {
            let dir = dir_arg(rest, 0)?;
            println!("{}", blocklog::extract_chain_id(&dir)?);
        }
        "genesis" => {
            let dir = dir_arg(rest, 0)?;
            match blocklog::extract_genesis_state(&dir)? {
                Some(genesis) => println!(
                    "network: {}\ntimestamp: {}\nproducer: {}\nchain id: {}",
                    genesis.network_name,
                    genesis.initial_timestamp,
                    genesis.initial_producer,
                    genesis.compute_chain_id()
                ),
                None => println!("no genesis state embedded in this block log"),
            }
        }
        other => {
            print_usage();
            bail!("unknown command '{}'", other);
        }
    }
    Ok(())
}

fn print_usage() {
    eprintln!(
        "usage: blocklog-tool <command> [args]\n\
         \n\
         commands:\n\
         \x20 construct-index <dir>\n\
         \x20 repair <dir> [stop_block]\n\
         \x20 trim-front <dir> <temp_dir> <first_kept_block>\n\
         \x20 trim-end <dir> <last_kept_block>\n\
         \x20 smoke-test <dir> [interval]\n\
         \x20 chain-id <dir>\n\
         \x20 genesis <dir>"
    );
}

fn dir_arg(args: &[String], n: usize) -> Result<PathBuf> {
    let raw = args
        .get(n)
        .with_context(|| format!("missing directory argument {}", n + 1))?;
    Ok(Path::new(raw).to_path_buf())
}

fn num_arg(args: &[String], n: usize, what: &str) -> Result<u32> {
    args.get(n)
        .with_context(|| format!("missing {} argument", what))?
        .parse()
        .with_context(|| format!("{} must be a block number", what))
}

fn opt_num_arg(args: &[String], n: usize) -> Result<Option<u32>> {
    args.get(n)
        .map(|raw| raw.parse().context("argument must be a block number"))
        .transpose()
}
