//! This crate exposes the internal functionality of the `sshscan`
//! credential scanner.
//!
//! sshscan takes a subnet, a username and a password, and tries to log in
//! over SSH to every address in the subnet. Hosts that accept the
//! credentials are reported, optionally together with the output of one
//! command run on each of them.
//!
//! ## Architecture Overview
//!
//! The core scanning behaviour is managed by
//! [`Scanner`](crate::scanner::Scanner) which walks an
//! [`AddressRange`](crate::address::AddressRange) and hands every address to
//! a [`Probe`](crate::scanner::Probe):
//!
//! 1. **Input Processing**: the subnet is parsed into an address range
//! 2. **Launching**: one tokio task per address, launched in ascending
//!    order with a fixed delay between launches
//! 3. **Probing**: each task connects, logs in and runs the command, all
//!    against one deadline
//! 4. **Collection**: hosts that let us in land in a
//!    [`HostTable`](crate::scanner::HostTable), which is handed back once
//!    every task has finished
//!
//! Failed hosts are silently left out. A
//! [`ScanObserver`](crate::scanner::ScanObserver) can be attached to see why.
//!
//! ## Basic Usage Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use sshscan::address::AddressRange;
//! use sshscan::scanner::ssh::{HostKeyPolicy, SshProber};
//! use sshscan::scanner::{Credentials, Scanner};
//!
//! #[tokio::main]
//! async fn main() {
//!     let range: AddressRange = "192.168.1.0/24".parse().unwrap();
//!     let prober = SshProber::new(Duration::from_secs(3), HostKeyPolicy::AcceptAny);
//!
//!     let scanner = Scanner::new(range, Credentials::new("pi", "raspberry"), "uname -a", prober)
//!         .with_delay(Duration::from_millis(30))
//!         .with_batch_size(Some(128));
//!
//!     let hosts = scanner.run().await;
//!     hosts.for_each(|addr, output| print!("{addr}: {output}"));
//! }
//! ```
//!
//! ## Security
//!
//! By default the key presented by a host is not checked, so the password is
//! sent to anything that answers on the port. Use
//! [`HostKeyPolicy::KnownHosts`](crate::scanner::ssh::HostKeyPolicy) when the
//! network is not fully trusted.
#![allow(clippy::needless_doctest_main)]

pub mod tui;

pub mod input;

pub mod scanner;

pub mod address;
