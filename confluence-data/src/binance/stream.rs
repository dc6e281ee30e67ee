use super::model::BinanceKlineEvent;
use confluence_core::Candle;
use futures::{SinkExt, StreamExt};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

/// Default interval between client pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default delay before reconnecting a dropped stream.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Kline stream connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineStreamConfig {
    pub url: Url,
    pub ping_interval: Duration,
    pub reconnect_delay: Duration,
}

impl KlineStreamConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            ping_interval: DEFAULT_PING_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Outcome of handling one text frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Frame {
    Candle(Candle),
    Ignored,
}

/// Parse a kline stream text frame. Anything that is not a kline event (eg/ a
/// subscription ack) is ignored.
pub(crate) fn parse_frame(text: &str) -> Frame {
    match serde_json::from_str::<BinanceKlineEvent>(text) {
        Ok(event) => Frame::Candle(Candle::from(event.kline)),
        Err(error) => {
            debug!(%error, payload = text, "ignoring non-kline frame");
            Frame::Ignored
        }
    }
}

/// Stream klines from `config.url` into `candle_tx`, reconnecting until the receiver is
/// dropped or the owning task is aborted.
pub(crate) async fn run_kline_loop(
    config: KlineStreamConfig,
    candle_tx: mpsc::UnboundedSender<Candle>,
    connected: Arc<AtomicBool>,
) {
    info!(url = %config.url, "starting kline stream");

    loop {
        match connect_async(config.url.as_str()).await {
            Ok((websocket, _)) => {
                info!(url = %config.url, "kline stream connected");
                connected.store(true, Ordering::Release);

                let (mut write, mut read) = websocket.split();

                let ping_interval = config.ping_interval;
                let (ping_shutdown_tx, mut ping_shutdown_rx) = mpsc::channel::<()>(1);
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(ping_interval);
                    loop {
                        tokio::select! {
                            _ = interval.tick() => {
                                if write.send(Message::Ping(vec![].into())).await.is_err() {
                                    debug!("failed to send ping, connection likely dead");
                                    break;
                                }
                            }
                            _ = ping_shutdown_rx.recv() => break,
                        }
                    }
                });

                let mut receiver_dropped = false;
                while let Some(message) = read.next().await {
                    match message {
                        Ok(Message::Text(text)) => {
                            if let Frame::Candle(candle) = parse_frame(&text) {
                                if candle_tx.send(candle).is_err() {
                                    receiver_dropped = true;
                                    break;
                                }
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            info!(url = %config.url, ?frame, "kline stream closed by venue");
                            break;
                        }
                        Ok(_) => {}
                        Err(error) => {
                            error!(url = %config.url, %error, "kline stream error");
                            break;
                        }
                    }
                }

                let _ = ping_shutdown_tx.send(()).await;
                connected.store(false, Ordering::Release);

                if receiver_dropped {
                    info!(url = %config.url, "kline receiver dropped, stopping stream");
                    return;
                }
                warn!(url = %config.url, "kline stream disconnected, will reconnect");
            }
            Err(error) => {
                error!(url = %config.url, %error, "failed to connect kline stream");
            }
        }

        if candle_tx.is_closed() {
            return;
        }

        debug!(delay = ?config.reconnect_delay, "waiting before reconnecting");
        tokio::time::sleep(config.reconnect_delay).await;
    }
}
