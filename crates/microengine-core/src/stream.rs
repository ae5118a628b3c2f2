//! Websocket plumbing: the gateway event feed and the transaction-signing bridge.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::events::Event;
use crate::wait::{until_ready, ReadyPolicy, WaitError};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("websocket {url} unavailable: {source}")]
    Unavailable {
        url: String,
        #[source]
        source: WaitError,
    },
}

/// Source of decoded gateway events.
#[async_trait]
pub trait EventSource: Send {
    /// Next event. Malformed frames come back as [`Event::Malformed`]; an
    /// error means the feed is gone for good.
    async fn next_event(&mut self) -> Result<Event, StreamError>;
}

async fn dial(url: &str, policy: ReadyPolicy) -> Result<Socket, StreamError> {
    let socket = until_ready(url, policy, || async {
        connect_async(url).await.map(|(socket, _response)| socket)
    })
    .await
    .map_err(|source| StreamError::Unavailable {
        url: url.to_string(),
        source,
    })?;

    info!(url, "websocket connected");
    Ok(socket)
}

/// Event feed over the gateway's `/events/home` websocket.
///
/// A read error or a closed connection triggers a reconnect with the same
/// readiness policy used at startup, reported as [`Event::Reconnected`].
pub struct EventStream {
    url: String,
    policy: ReadyPolicy,
    socket: Socket,
}

impl EventStream {
    pub async fn connect(url: impl Into<String>, policy: ReadyPolicy) -> Result<Self, StreamError> {
        let url = url.into();
        let socket = dial(&url, policy).await?;
        Ok(Self {
            url,
            policy,
            socket,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn reconnect(&mut self) -> Result<(), StreamError> {
        self.socket = dial(&self.url, self.policy).await?;
        Ok(())
    }
}

#[async_trait]
impl EventSource for EventStream {
    async fn next_event(&mut self) -> Result<Event, StreamError> {
        loop {
            match self.socket.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Event::decode(&text)),
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(Event::decode(&String::from_utf8_lossy(&bytes)))
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!(url = %self.url, ?frame, "event stream closed by gateway, reconnecting");
                    self.reconnect().await?;
                    return Ok(Event::Reconnected);
                }
                None => {
                    warn!(url = %self.url, "event stream ended, reconnecting");
                    self.reconnect().await?;
                    return Ok(Event::Reconnected);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(url = %self.url, error = %e, "event stream read failed, reconnecting");
                    self.reconnect().await?;
                    return Ok(Event::Reconnected);
                }
            }
        }
    }
}

/// Pumps frames between the gateway's `/transactions` websocket and the
/// signer's channels. Holds no key material.
pub struct TransactionBridge {
    url: String,
    policy: ReadyPolicy,
    requests: mpsc::Sender<String>,
    responses: mpsc::Receiver<String>,
}

impl TransactionBridge {
    pub fn new(
        url: impl Into<String>,
        policy: ReadyPolicy,
        requests: mpsc::Sender<String>,
        responses: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            url: url.into(),
            policy,
            requests,
            responses,
        }
    }

    /// Run until the signer goes away. Fails only when the socket cannot be
    /// (re-)established within the readiness policy.
    pub async fn run(mut self) -> Result<(), StreamError> {
        let mut socket = dial(&self.url, self.policy).await?;

        loop {
            tokio::select! {
                frame = socket.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if self.requests.send(text).await.is_err() {
                            debug!("signer stopped, closing transaction bridge");
                            return Ok(());
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!(url = %self.url, "transaction socket closed, reconnecting");
                        socket = dial(&self.url, self.policy).await?;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(url = %self.url, error = %e, "transaction socket read failed, reconnecting");
                        socket = dial(&self.url, self.policy).await?;
                    }
                },
                response = self.responses.recv() => match response {
                    Some(text) => {
                        if let Err(e) = socket.send(Message::Text(text)).await {
                            warn!(url = %self.url, error = %e, "signed transaction dropped, reconnecting");
                            socket = dial(&self.url, self.policy).await?;
                        }
                    }
                    None => {
                        debug!("signer stopped, closing transaction bridge");
                        let _ = socket.close(None).await;
                        return Ok(());
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BlockEvent;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn fast() -> ReadyPolicy {
        ReadyPolicy::new(Duration::from_millis(20), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_event_stream_decodes_and_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/events/home", listener.local_addr().unwrap());

        tokio::spawn(async move {
            // First connection: one block, one garbage frame, then hang up.
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"event":"block","data":{"number":1}}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text("garbage".into())).await.unwrap();
            ws.close(None).await.unwrap();
            drop(ws);

            // Second connection after the client reconnects.
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"event":"block","data":{"number":2}}"#.into()))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let mut stream = EventStream::connect(&url, fast()).await.unwrap();
        assert_eq!(
            stream.next_event().await.unwrap(),
            Event::Block(BlockEvent { block_number: 1 })
        );
        assert!(matches!(
            stream.next_event().await.unwrap(),
            Event::Malformed { .. }
        ));
        assert_eq!(stream.next_event().await.unwrap(), Event::Reconnected);
        assert_eq!(
            stream.next_event().await.unwrap(),
            Event::Block(BlockEvent { block_number: 2 })
        );
    }

    #[tokio::test]
    async fn test_event_stream_reconnect_timeout_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/events/home", listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.close(None).await.unwrap();
            // listener dropped: reconnects are refused
        });

        let policy = ReadyPolicy::new(Duration::from_millis(20), Duration::from_millis(200));
        let mut stream = EventStream::connect(&url, policy).await.unwrap();
        assert!(matches!(
            stream.next_event().await,
            Err(StreamError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_unreachable_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/events/home", listener.local_addr().unwrap());
        drop(listener);

        let policy = ReadyPolicy::new(Duration::from_millis(20), Duration::from_millis(100));
        assert!(EventStream::connect(url, policy).await.is_err());
    }

    #[tokio::test]
    async fn test_transaction_bridge_pumps_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/transactions", listener.local_addr().unwrap());

        let gateway = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"id":1}"#.into())).await.unwrap();
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(reply))) => return (reply, ws),
                    Some(Ok(_)) => continue,
                    other => panic!("gateway socket ended early: {:?}", other),
                }
            }
        });

        let (req_tx, mut req_rx) = mpsc::channel(4);
        let (resp_tx, resp_rx) = mpsc::channel(4);
        let bridge = tokio::spawn(TransactionBridge::new(url, fast(), req_tx, resp_rx).run());

        let request = req_rx.recv().await.unwrap();
        assert_eq!(request, r#"{"id":1}"#);
        resp_tx.send(r#"{"id":1,"chainId":1337,"data":"f8"}"#.to_string()).await.unwrap();

        let (reply, _ws) = gateway.await.unwrap();
        assert!(reply.contains("\"chainId\":1337"));

        drop(resp_tx);
        assert!(bridge.await.unwrap().is_ok());
    }
}
