//! Console chat client
//!
//! Relays lines between a local console and the server. A single NUL byte is
//! written on every heartbeat tick; the server strips it, and a failed write
//! is how the client notices that the server went away.

use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{ChatError, Result};

/// Shown when the server stops accepting heartbeats or input
pub const LOST_CONNECTION: &str = "Lost connection! Please try again later.";

const HEARTBEAT: &[u8] = b"\0";

/// Why a relay ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// The server closed the connection
    ServerClosed,
    /// The console input reached end of file
    InputClosed,
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    config: ClientConfig,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn connect(&self) -> Result<TcpStream> {
        let address = self.config.address();
        let stream = TcpStream::connect(&address).await.map_err(|e| {
            debug!("Connecting to {} failed: {}", address, e);
            ChatError::connection(format!("Unable to connect to {}", address))
        })?;
        info!("Connected to {}", address);
        Ok(stream)
    }

    /// Connect, announce the connection on `output`, then relay until either
    /// side ends
    pub async fn run<I, O>(&self, input: I, mut output: O) -> Result<Disconnect>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let stream = self.connect().await?;
        let host = stream
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|_| self.config.host.clone());
        write_line(
            &mut output,
            &format!("Connected to HOST: '{}' on PORT: {}", host, self.config.port),
        )
        .await?;

        self.relay(stream, input, output).await
    }

    /// Print server lines to `output`, forward `input` lines to the server
    /// and keep the heartbeat going
    pub async fn relay<S, I, O>(&self, stream: S, input: I, mut output: O) -> Result<Disconnect>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let (read_half, mut write_half) = io::split(stream);
        let mut server_lines = BufReader::new(read_half).lines();
        let mut input_lines = input.lines();

        let period = self.config.heartbeat;
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                line = server_lines.next_line() => match line {
                    Ok(Some(line)) => write_line(&mut output, &line).await?,
                    Ok(None) => {
                        debug!("Server closed the connection");
                        return Ok(Disconnect::ServerClosed);
                    }
                    Err(e) => {
                        debug!("Read from server failed: {}", e);
                        return Err(ChatError::network(LOST_CONNECTION));
                    }
                },
                line = input_lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Err(e) = write_line(&mut write_half, &line).await {
                            debug!("Forwarding input failed: {}", e);
                            return Err(ChatError::network(LOST_CONNECTION));
                        }
                    }
                    Ok(None) => return Ok(Disconnect::InputClosed),
                    Err(e) => return Err(ChatError::internal(format!("Console input failed: {}", e))),
                },
                _ = heartbeat.tick() => {
                    let sent = async {
                        write_half.write_all(HEARTBEAT).await?;
                        write_half.flush().await
                    }
                    .await;
                    if let Err(e) = sent {
                        debug!("Heartbeat failed: {}", e);
                        return Err(ChatError::network(LOST_CONNECTION));
                    }
                }
            }
        }
    }
}

async fn write_line<W>(writer: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::protocol::clean_line;
    use crate::server::ChatServer;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn client(port: u16, heartbeat: Duration) -> ChatClient {
        ChatClient::new(ClientConfig {
            host: "127.0.0.1".to_string(),
            port,
            heartbeat,
        })
    }

    #[tokio::test]
    async fn test_relay_both_directions() {
        let (local, mut remote) = io::duplex(1024);
        let (mut console, console_in) = io::duplex(1024);
        let client = client(0, Duration::from_secs(60));

        let relay = tokio::spawn(async move {
            let mut output = Vec::new();
            let exit = client
                .relay(local, BufReader::new(console_in), &mut output)
                .await;
            (exit, output)
        });

        remote.write_all(b"Hi Guest 1\n").await.unwrap();
        console.write_all(b"hello there\n").await.unwrap();

        let mut received = Vec::new();
        timeout(WAIT, async {
            let mut byte = [0u8; 1];
            while received.last() != Some(&b'\n') {
                remote.read_exact(&mut byte).await.unwrap();
                received.push(byte[0]);
            }
        })
        .await
        .unwrap();
        assert_eq!(clean_line(&received), "hello there");

        drop(remote);
        let (exit, output) = timeout(WAIT, relay).await.unwrap().unwrap();
        assert_eq!(exit.unwrap(), Disconnect::ServerClosed);
        assert_eq!(String::from_utf8(output).unwrap(), "Hi Guest 1\n");
    }

    #[tokio::test]
    async fn test_heartbeat_sends_nul() {
        let (local, mut remote) = io::duplex(64);
        let (_console, console_in) = io::duplex(64);
        let client = client(0, Duration::from_millis(20));

        let relay = tokio::spawn(async move {
            client
                .relay(local, BufReader::new(console_in), io::sink())
                .await
        });

        let mut beats = [0xffu8; 2];
        timeout(WAIT, remote.read_exact(&mut beats))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(beats, [0, 0]);
        relay.abort();
    }

    #[tokio::test]
    async fn test_input_eof_ends_relay() {
        let (local, _remote) = io::duplex(64);
        let client = client(0, Duration::from_secs(60));
        let exit = timeout(WAIT, client.relay(local, &b""[..], io::sink()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, Disconnect::InputClosed);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = client(port, Duration::from_secs(1))
            .run(&b""[..], io::sink())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ChatError::Connection(format!("Unable to connect to 127.0.0.1:{}", port))
        );
    }

    #[tokio::test]
    async fn test_session_against_server() {
        let server = ChatServer::bind(ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..ServerConfig::default()
        })
        .await
        .unwrap();
        let port = server.local_addr().unwrap().port();
        let (_stop, stopped) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(server.run(async move {
            let _ = stopped.await;
        }));

        let (mut console, console_in) = io::duplex(256);
        let client = client(port, Duration::from_secs(60));
        let session = tokio::spawn(async move {
            let mut output = Vec::new();
            let exit = client.run(BufReader::new(console_in), &mut output).await;
            (exit, output)
        });

        console.write_all(b"/q\n").await.unwrap();

        let (exit, output) = timeout(WAIT, session).await.unwrap().unwrap();
        assert_eq!(exit.unwrap(), Disconnect::ServerClosed);

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines[0],
            format!("Connected to HOST: '127.0.0.1' on PORT: {}", port)
        );
        assert_eq!(lines[1], "Hi Guest 1");
        assert_eq!(lines.last(), Some(&"You're being disconnected..."));
    }
}
