//! Core functionality for actual scanning behaviour.
use crate::address::AddressRange;
use futures::future::join_all;
use log::debug;

mod probe;
mod results;
pub mod ssh;

pub use probe::{Credentials, Probe, ProbeError, ProbeOutcome, ScanJob, DEFAULT_PORT};
pub use results::HostTable;

use std::{
    fmt,
    net::IpAddr,
    num::NonZeroUsize,
    sync::Arc,
    time::Duration,
};
use tokio::{sync::Semaphore, task::JoinHandle, time};

/// Pause between two consecutive probe launches.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(30);

/// Hook for watching a scan as it happens.
///
/// Failures are otherwise silent: a host that refuses, times out or rejects
/// the credentials simply does not show up in the [`HostTable`].
pub trait ScanObserver: Send + Sync {
    /// Called from the scanner right after the probe for `addr` is spawned.
    fn on_launch(&self, _addr: IpAddr) {}

    /// Called exactly once per launched probe, from the probe's task.
    fn on_finish(&self, addr: IpAddr, outcome: &ProbeOutcome);
}

/// Walks an [`AddressRange`] and tries the same credentials on every host.
///
/// Probes are launched in ascending address order with a fixed delay between
/// launches. Each one runs in its own tokio task, and [`Scanner::run`] only
/// returns once all of them have finished. Without a batch size nothing caps
/// the number of probes in flight, so a /16 means 65,536 sockets.
pub struct Scanner {
    range: AddressRange,
    credentials: Arc<Credentials>,
    command: Arc<str>,
    port: u16,
    delay: Duration,
    batch_size: Option<NonZeroUsize>,
    prober: Arc<dyn Probe>,
    observer: Option<Arc<dyn ScanObserver>>,
}

impl Scanner {
    pub fn new<P>(
        range: AddressRange,
        credentials: Credentials,
        command: impl Into<String>,
        prober: P,
    ) -> Self
    where
        P: Probe + 'static,
    {
        Self {
            range,
            credentials: Arc::new(credentials),
            command: Arc::from(command.into()),
            port: DEFAULT_PORT,
            delay: DEFAULT_DELAY,
            batch_size: None,
            prober: Arc::new(prober),
            observer: None,
        }
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Caps how many probes may be in flight at once. `None` or `Some(0)`
    /// leaves the scan unbounded.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: Option<usize>) -> Self {
        self.batch_size = batch_size.and_then(NonZeroUsize::new);
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Runs the scan to completion and returns the hosts that let us in.
    pub async fn run(&self) -> HostTable {
        let results = Arc::new(HostTable::new());
        let limiter = self
            .batch_size
            .map(|size| Arc::new(Semaphore::new(size.get().min(Semaphore::MAX_PERMITS))));

        debug!(
            "Start scanning hosts.\nRange {}\nNumber of hosts {}\nPort {}\nDelay {:?}\nBatch size {:?}",
            self.range.cidr(),
            self.range.len(),
            self.port,
            self.delay,
            self.batch_size,
        );

        let mut launched: Vec<(IpAddr, JoinHandle<()>)> = Vec::new();

        for (index, addr) in self.range.clone().enumerate() {
            if index > 0 {
                time::sleep(self.delay).await;
            }

            let permit = match &limiter {
                Some(limiter) => match Arc::clone(limiter).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(e) => {
                        debug!("Launch limiter closed, stopping at {addr}: {e}");
                        break;
                    }
                },
                None => None,
            };

            let job = ScanJob {
                addr,
                port: self.port,
                credentials: Arc::clone(&self.credentials),
                command: Arc::clone(&self.command),
            };
            let prober = Arc::clone(&self.prober);
            let results = Arc::clone(&results);
            let observer = self.observer.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let outcome = prober.probe(&job).await;
                record(&results, job.addr, outcome, observer.as_deref());
            });

            if let Some(observer) = &self.observer {
                observer.on_launch(addr);
            }
            launched.push((addr, handle));
        }

        let (addrs, handles): (Vec<_>, Vec<_>) = launched.into_iter().unzip();
        let joined = join_all(handles).await;

        for (addr, result) in addrs.into_iter().zip(joined) {
            let Err(e) = result else { continue };
            debug!("Probe task for {addr} did not finish cleanly: {e}");
            if let Some(observer) = &self.observer {
                observer.on_finish(addr, &Err(ProbeError::Panicked));
            }
        }

        debug!("Accessible hosts found: {}", results.len());

        Arc::try_unwrap(results).unwrap_or_else(|shared| (*shared).clone())
    }
}

impl fmt::Debug for Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("range", &self.range)
            .field("credentials", &self.credentials)
            .field("command", &self.command)
            .field("port", &self.port)
            .field("delay", &self.delay)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// Stores a successful outcome and reports every outcome to the observer.
fn record(
    results: &HostTable,
    addr: IpAddr,
    outcome: ProbeOutcome,
    observer: Option<&dyn ScanObserver>,
) {
    match &outcome {
        Ok(output) => {
            results.store(addr, output.clone());
        }
        Err(e) => debug!("{addr} excluded: {e}"),
    }

    if let Some(observer) = observer {
        observer.on_finish(addr, &outcome);
    }
}
