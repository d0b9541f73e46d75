#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::doc_markdown, clippy::if_not_else, clippy::non_ascii_literal)]

#[macro_use]
extern crate log;

use sshscan::input::{Config, Opts};
use sshscan::scanner::ssh::SshProber;
use sshscan::scanner::{Credentials, HostTable, ScanObserver, Scanner};
use sshscan::tui::{print_opening, ProgressObserver};
use sshscan::{detail, output, warning};

use anyhow::Context;
use dialoguer::{Input, Password};
use std::process;
use std::sync::Arc;
use std::time::Duration;

// Used for the ulimit fallback when the OS won't tell us.
const DEFAULT_FILE_DESCRIPTORS_LIMIT: u64 = 8000;
// File descriptors kept free for the runtime and the terminal.
const RESERVED_FILE_DESCRIPTORS: u64 = 100;

fn main() {
    env_logger::init();

    let mut opts: Opts = Opts::read();
    let config = match Config::read(opts.config_path.clone()) {
        Ok(config) => config,
        Err(e) => {
            println!("Found {e} in configuration file.\nAborting scan.\n");
            process::exit(1);
        }
    };
    opts.merge(&config);

    debug!("Main() `opts` arguments are {opts:?}");

    if !opts.no_banner {
        print_opening(opts.greppable, opts.accessible);
    }

    if let Err(e) = run(&opts) {
        eprintln!("sshscan: {e:#}");
        process::exit(1);
    }
}

fn run(opts: &Opts) -> anyhow::Result<()> {
    let credentials = read_credentials(opts.username.as_deref())?;

    let ulimit = adjust_ulimit_size(opts);
    let batch_size = infer_batch_size(opts, ulimit);

    let total = u64::try_from(opts.subnet.len()).unwrap_or(u64::MAX);
    let progress = Arc::new(if opts.greppable || opts.accessible {
        ProgressObserver::hidden()
    } else {
        ProgressObserver::new(total)
    });

    let prober = SshProber::new(Duration::from_millis(opts.timeout), opts.host_key_policy());
    let scanner = Scanner::new(
        opts.subnet.clone(),
        credentials,
        opts.command_line(),
        prober,
    )
    .with_port(opts.port)
    .with_delay(Duration::from_millis(opts.delay))
    .with_batch_size(batch_size)
    .with_observer(Arc::clone(&progress) as Arc<dyn ScanObserver>);

    detail!(
        format!("Scanning {} ({} addresses)...", opts.subnet.cidr(), total),
        opts.greppable,
        opts.accessible
    );

    let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;
    let hosts = runtime.block_on(scanner.run());
    progress.finish();

    print_hosts(&hosts, opts);
    Ok(())
}

/// Asks for whatever part of the credentials the options don't carry. The
/// password is always prompted for, masked.
fn read_credentials(username: Option<&str>) -> anyhow::Result<Credentials> {
    let username = match username {
        Some(username) => username.to_owned(),
        None => Input::<String>::new()
            .with_prompt("username")
            .interact_text()
            .context("failed to read username")?,
    };

    let password = Password::new()
        .with_prompt("password")
        .allow_empty_password(true)
        .interact()
        .context("failed to read password")?;

    Ok(Credentials::new(username, password))
}

fn print_hosts(hosts: &HostTable, opts: &Opts) {
    if opts.greppable {
        hosts.for_each(|addr, _| println!("{addr}"));
        return;
    }

    if hosts.is_empty() {
        warning!("No host accepted the credentials.", opts.greppable, opts.accessible);
        return;
    }

    detail!("Accessible hosts:", opts.greppable, opts.accessible);
    let with_command = !opts.command_line().trim().is_empty();

    hosts.for_each(|addr, out| {
        if with_command {
            output!(format!("{addr}:"), opts.greppable, opts.accessible);
            print!("{out}");
            if !out.is_empty() && !out.ends_with('\n') {
                println!();
            }
        } else {
            output!(addr, opts.greppable, opts.accessible);
        }
    });
}

#[cfg(unix)]
fn adjust_ulimit_size(opts: &Opts) -> u64 {
    use rlimit::Resource;

    if let Some(limit) = opts.ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            detail!(
                format!("Automatically increasing ulimit value to {limit}."),
                opts.greppable,
                opts.accessible
            );
        } else {
            warning!("ERROR. Failed to set ulimit value.", opts.greppable, opts.accessible);
        }
    }

    let (soft, _) = Resource::NOFILE
        .get()
        .unwrap_or((DEFAULT_FILE_DESCRIPTORS_LIMIT, DEFAULT_FILE_DESCRIPTORS_LIMIT));
    soft
}

#[cfg(not(unix))]
fn adjust_ulimit_size(_opts: &Opts) -> u64 {
    DEFAULT_FILE_DESCRIPTORS_LIMIT
}

/// An explicit batch size always wins. Otherwise the scan stays unbounded
/// unless the subnet has more hosts than we have file descriptors to spare.
fn infer_batch_size(opts: &Opts, ulimit: u64) -> Option<usize> {
    if opts.batch_size.is_some() {
        return opts.batch_size;
    }

    let available = ulimit.saturating_sub(RESERVED_FILE_DESCRIPTORS).max(1);
    if opts.subnet.len() <= u128::from(available) {
        return None;
    }

    warning!(
        format!(
            "{} has more hosts than the open file limit ({ulimit}) allows in flight, capping at {available}.",
            opts.subnet.cidr()
        ),
        opts.greppable,
        opts.accessible
    );
    detail!(
        "Raise it with --ulimit or pick a value with --batch-size.",
        opts.greppable,
        opts.accessible
    );

    Some(usize::try_from(available).unwrap_or(usize::MAX))
}
