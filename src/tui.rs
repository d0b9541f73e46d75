//! Utilities for terminal output during scanning.

use std::net::IpAddr;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::scanner::{ProbeOutcome, ScanObserver};

/// Prints a warning unless in greppable mode.
#[macro_export]
macro_rules! warning {
    ($name:expr) => {
        println!("{} {}", colored::Colorize::bold(colored::Colorize::red("[!]")), $name);
    };
    ($name:expr, $greppable:expr, $accessible:expr) => {
        if !$greppable {
            if $accessible {
                println!("{}", $name);
            } else {
                println!("{} {}", colored::Colorize::bold(colored::Colorize::red("[!]")), $name);
            }
        }
    };
}

/// Prints an informational line unless in greppable mode.
#[macro_export]
macro_rules! detail {
    ($name:expr) => {
        println!("{} {}", colored::Colorize::bold(colored::Colorize::blue("[~]")), $name);
    };
    ($name:expr, $greppable:expr, $accessible:expr) => {
        if !$greppable {
            if $accessible {
                println!("{}", $name);
            } else {
                println!("{} {}", colored::Colorize::bold(colored::Colorize::blue("[~]")), $name);
            }
        }
    };
}

/// Prints a result line unless in greppable mode.
#[macro_export]
macro_rules! output {
    ($name:expr) => {
        println!("{} {}", colored::Colorize::bold(colored::Colorize::green("[>]")), $name);
    };
    ($name:expr, $greppable:expr, $accessible:expr) => {
        if !$greppable {
            if $accessible {
                println!("{}", $name);
            } else {
                println!("{} {}", colored::Colorize::bold(colored::Colorize::green("[>]")), $name);
            }
        }
    };
}

/// Banner shown before a scan.
pub fn print_opening(greppable: bool, accessible: bool) {
    if greppable || accessible {
        return;
    }

    let banner = r"
 ___ ___| |__  ___  ___ __ _ _ __
/ __/ __| '_ \/ __|/ __/ _` | '_ \
\__ \__ \ | | \__ \ (_| (_| | | | |
|___/___/_| |_|___/\___\__,_|_| |_|";

    println!("{}", banner.cyan());
    println!("{}\n", "Credentials go to every host that answers. Scan networks you own.".dimmed());
}

/// Drives a progress bar from probe launches and completions.
#[derive(Debug)]
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.blue} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} hosts {msg}",
        ) {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.enable_steady_tick(Duration::from_millis(120));

        Self { bar }
    }

    /// A bar that never draws, for greppable and accessible runs.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ScanObserver for ProgressObserver {
    fn on_launch(&self, addr: IpAddr) {
        self.bar.set_message(addr.to_string());
    }

    fn on_finish(&self, addr: IpAddr, outcome: &ProbeOutcome) {
        if outcome.is_ok() {
            self.bar.println(format!("Accessible {}", addr.to_string().purple()));
        }
        self.bar.inc(1);
    }
}
