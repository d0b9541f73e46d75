//! Password login over SSH, built on the `russh` client.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use russh::client;
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};

use super::probe::{Probe, ProbeError, ProbeOutcome, ScanJob};

/// Default deadline for a whole probe. Connect, handshake and login must all
/// finish inside it; the command gets whatever time is left.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// SSH extended-data stream number carrying stderr.
const STDERR_STREAM: u32 = 1;

/// What to do with the key a host presents during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Trust whatever key the host presents. Credentials are sent to any
    /// machine answering on the port, so only use this on networks you own.
    #[default]
    AcceptAny,
    /// Only talk to hosts whose key is already in `~/.ssh/known_hosts`.
    KnownHosts,
}

/// Connects to port 22 (or the job's port), logs in with a password and
/// optionally runs one command.
#[derive(Clone)]
pub struct SshProber {
    timeout: Duration,
    host_keys: HostKeyPolicy,
    config: Arc<client::Config>,
}

impl SshProber {
    pub fn new(timeout: Duration, host_keys: HostKeyPolicy) -> Self {
        Self {
            timeout,
            host_keys,
            config: Arc::new(client::Config::default()),
        }
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn login(&self, job: &ScanJob) -> Result<client::Handle<KeyCheck>, ProbeError> {
        let stream = TcpStream::connect(job.socket())
            .await
            .map_err(ProbeError::Connect)?;

        let handler = KeyCheck {
            policy: self.host_keys,
            host: job.addr.to_string(),
            port: job.port,
        };
        let mut session =
            client::connect_stream(Arc::clone(&self.config), stream, handler).await?;

        let accepted = session
            .authenticate_password(
                job.credentials.username.as_str(),
                job.credentials.password.as_str(),
            )
            .await?;
        if !accepted {
            return Err(ProbeError::Rejected);
        }

        Ok(session)
    }
}

impl fmt::Debug for SshProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshProber")
            .field("timeout", &self.timeout)
            .field("host_keys", &self.host_keys)
            .finish_non_exhaustive()
    }
}

impl Default for SshProber {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, HostKeyPolicy::default())
    }
}

#[async_trait]
impl Probe for SshProber {
    async fn probe(&self, job: &ScanJob) -> ProbeOutcome {
        let socket = job.socket();
        let deadline = Instant::now() + self.timeout;

        let session = time::timeout_at(deadline, self.login(job))
            .await
            .unwrap_or(Err(ProbeError::Timeout(self.timeout)))?;

        // Past this point the host accepted us, so it is reported whatever
        // the command does.
        let output = if job.has_command() {
            match time::timeout_at(deadline, run_command(&session, &job.command)).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    debug!("Command on {socket} failed after login: {e}");
                    String::new()
                }
                Err(_) => {
                    debug!("Command on {socket} still running after {:?}", self.timeout);
                    String::new()
                }
            }
        } else {
            String::new()
        };

        if let Err(e) = session
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!("Disconnect from {socket} failed: {e}");
        }

        Ok(output)
    }
}

/// Runs `command` on a fresh session channel and returns stdout and stderr
/// interleaved in arrival order. A refused exec request yields no output.
///
/// Stdin is closed straight after the exec request so commands that read it
/// see end of input instead of waiting forever.
async fn run_command(
    session: &client::Handle<KeyCheck>,
    command: &str,
) -> Result<String, russh::Error> {
    let mut channel = session.channel_open_session().await?;
    channel.exec(true, command).await?;
    channel.eof().await?;

    let mut combined = Vec::new();
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => combined.extend_from_slice(data),
            ChannelMsg::ExtendedData { ref data, ext } if ext == STDERR_STREAM => {
                combined.extend_from_slice(data);
            }
            ChannelMsg::Failure | ChannelMsg::Close => break,
            _ => {}
        }
    }

    Ok(String::from_utf8_lossy(&combined).into_owned())
}

struct KeyCheck {
    policy: HostKeyPolicy,
    host: String,
    port: u16,
}

#[async_trait]
impl client::Handler for KeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        match self.policy {
            HostKeyPolicy::AcceptAny => Ok(true),
            HostKeyPolicy::KnownHosts => {
                let known =
                    russh_keys::check_known_hosts(&self.host, self.port, server_public_key)
                        .unwrap_or_else(|e| {
                            debug!("Host key of {}:{} rejected: {e}", self.host, self.port);
                            false
                        });
                Ok(known)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::probe::Credentials;
    use russh::server::{self, Auth, Msg, Session};
    use russh::{Channel, ChannelId, CryptoVec};
    use russh_keys::key::KeyPair;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const PASSWORD: &str = "pw";

    fn job(port: u16) -> ScanJob {
        login_job(port, "toor", "")
    }

    fn login_job(port: u16, password: &str, command: &str) -> ScanJob {
        ScanJob {
            addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            credentials: Arc::new(Credentials::new("root", password)),
            command: Arc::from(command),
        }
    }

    /// Minimal SSH server that accepts [`PASSWORD`] and knows a handful of
    /// commands:
    ///
    /// * `echo ok` prints `ok`
    /// * `mixed` writes to stdout and stderr alternately
    /// * `cat` answers once the client closes stdin
    /// * `sleep` never answers
    ///
    /// Any other exec request is refused.
    #[derive(Default)]
    struct FakeHost {
        reading_stdin: Vec<ChannelId>,
    }

    #[async_trait]
    impl server::Handler for FakeHost {
        type Error = russh::Error;

        async fn auth_password(&mut self, _user: &str, password: &str) -> Result<Auth, Self::Error> {
            if password == PASSWORD {
                Ok(Auth::Accept)
            } else {
                Ok(Auth::Reject {
                    proceed_with_methods: None,
                })
            }
        }

        async fn channel_open_session(
            &mut self,
            _channel: Channel<Msg>,
            _session: &mut Session,
        ) -> Result<bool, Self::Error> {
            Ok(true)
        }

        async fn exec_request(
            &mut self,
            channel: ChannelId,
            data: &[u8],
            session: &mut Session,
        ) -> Result<(), Self::Error> {
            match data {
                b"echo ok" => {
                    session.channel_success(channel);
                    session.data(channel, CryptoVec::from_slice(b"ok\n"));
                    exit(session, channel);
                }
                b"mixed" => {
                    session.channel_success(channel);
                    session.data(channel, CryptoVec::from_slice(b"out 1\n"));
                    session.extended_data(channel, STDERR_STREAM, CryptoVec::from_slice(b"err 1\n"));
                    session.data(channel, CryptoVec::from_slice(b"out 2\n"));
                    exit(session, channel);
                }
                b"cat" => {
                    session.channel_success(channel);
                    self.reading_stdin.push(channel);
                }
                b"sleep" => session.channel_success(channel),
                _ => session.channel_failure(channel),
            }
            Ok(())
        }

        async fn channel_eof(
            &mut self,
            channel: ChannelId,
            session: &mut Session,
        ) -> Result<(), Self::Error> {
            if self.reading_stdin.contains(&channel) {
                session.data(channel, CryptoVec::from_slice(b"end of input\n"));
                exit(session, channel);
            }
            Ok(())
        }
    }

    fn exit(session: &mut Session, channel: ChannelId) {
        session.exit_status_request(channel, 0);
        session.eof(channel);
        session.close(channel);
    }

    /// Serves [`FakeHost`] on an ephemeral localhost port.
    async fn fake_host() -> (u16, JoinHandle<()>) {
        let config = Arc::new(server::Config {
            keys: vec![KeyPair::generate_ed25519().unwrap()],
            auth_rejection_time: Duration::ZERO,
            auth_rejection_time_initial: Some(Duration::ZERO),
            ..Default::default()
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    if let Ok(session) = server::run_stream(config, stream, FakeHost::default()).await {
                        let _ = session.await;
                    }
                });
            }
        });

        (port, server)
    }

    fn prober(timeout: Duration) -> SshProber {
        SshProber::new(timeout, HostKeyPolicy::AcceptAny)
    }

    #[tokio::test]
    async fn refused_connection_is_excluded() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let prober = SshProber::new(Duration::from_secs(5), HostKeyPolicy::AcceptAny);
        let outcome = prober.probe(&job(port)).await;

        assert!(matches!(outcome, Err(ProbeError::Connect(_))), "{outcome:?}");
    }

    #[tokio::test]
    async fn stalled_host_is_abandoned_at_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Accept and hold the socket open without ever sending a banner.
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let timeout = Duration::from_millis(300);
        let prober = SshProber::new(timeout, HostKeyPolicy::AcceptAny);

        let started = std::time::Instant::now();
        let outcome = prober.probe(&job(port)).await;
        let elapsed = started.elapsed();

        assert!(matches!(outcome, Err(ProbeError::Timeout(t)) if t == timeout));
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_secs(2), "took {elapsed:?}");

        server.abort();
    }

    #[tokio::test]
    async fn non_ssh_speaker_is_excluded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            let _ = socket.shutdown().await;
        });

        let prober = SshProber::new(Duration::from_secs(5), HostKeyPolicy::AcceptAny);
        let outcome = prober.probe(&job(port)).await;

        assert!(outcome.is_err());
        assert!(!matches!(outcome, Err(ProbeError::Timeout(_))), "{outcome:?}");
    }

    #[tokio::test]
    async fn login_without_command_gives_empty_output() {
        let (port, server) = fake_host().await;

        let outcome = prober(Duration::from_secs(5))
            .probe(&login_job(port, PASSWORD, ""))
            .await;

        assert_eq!(outcome.unwrap(), "");
        server.abort();
    }

    #[tokio::test]
    async fn command_output_is_returned() {
        let (port, server) = fake_host().await;

        let outcome = prober(Duration::from_secs(5))
            .probe(&login_job(port, PASSWORD, "echo ok"))
            .await;

        assert_eq!(outcome.unwrap(), "ok\n");
        server.abort();
    }

    #[tokio::test]
    async fn stderr_is_interleaved_with_stdout() {
        let (port, server) = fake_host().await;

        let outcome = prober(Duration::from_secs(5))
            .probe(&login_job(port, PASSWORD, "mixed"))
            .await;

        assert_eq!(outcome.unwrap(), "out 1\nerr 1\nout 2\n");
        server.abort();
    }

    #[tokio::test]
    async fn refused_exec_still_counts_as_reachable() {
        let (port, server) = fake_host().await;

        let outcome = prober(Duration::from_secs(5))
            .probe(&login_job(port, PASSWORD, "no-such-command"))
            .await;

        assert_eq!(outcome.unwrap(), "");
        server.abort();
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let (port, server) = fake_host().await;

        let outcome = prober(Duration::from_secs(5))
            .probe(&login_job(port, "not-the-password", "echo ok"))
            .await;

        assert!(matches!(outcome, Err(ProbeError::Rejected)), "{outcome:?}");
        server.abort();
    }

    #[tokio::test]
    async fn command_reading_stdin_sees_end_of_input() {
        let (port, server) = fake_host().await;
        let timeout = Duration::from_secs(5);

        let started = std::time::Instant::now();
        let outcome = prober(timeout).probe(&login_job(port, PASSWORD, "cat")).await;

        assert_eq!(outcome.unwrap(), "end of input\n");
        assert!(started.elapsed() < timeout);
        server.abort();
    }

    #[tokio::test]
    async fn hung_command_keeps_host_with_empty_output() {
        let (port, server) = fake_host().await;
        let timeout = Duration::from_millis(500);

        let started = std::time::Instant::now();
        let outcome = prober(timeout).probe(&login_job(port, PASSWORD, "sleep")).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome.unwrap(), "");
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_secs(2), "took {elapsed:?}");
        server.abort();
    }

    #[test]
    fn default_policy_accepts_any_key() {
        let prober = SshProber::default();

        assert_eq!(prober.host_keys, HostKeyPolicy::AcceptAny);
        assert_eq!(prober.timeout(), DEFAULT_TIMEOUT);
    }
}
