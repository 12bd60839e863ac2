#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::future;

use futures::{SinkExt as _, StreamExt as _};
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::codec;
use super::config::Config;
use super::dispatch::EventDispatchTable;
use super::error::GatewayError;
use super::session::{ConnectionState, Heartbeat, Session, SessionContext, Step};
use crate::Result;
use crate::auth::Token;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Header carrying the resume token when reconnecting.
pub const LAST_MESSAGE_ID_HEADER: HeaderName = HeaderName::from_static("guilded-last-message-id");

/// Requests from the [`Gateway`](super::Gateway) handle to its session task.
#[derive(Debug)]
pub(crate) enum Command {
    Close,
}

/// Everything the session task shares with the outside world.
#[derive(Debug)]
pub(crate) struct Link {
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub dispatch: std::sync::Arc<EventDispatchTable>,
    pub state_tx: watch::Sender<ConnectionState>,
    pub context_tx: watch::Sender<SessionContext>,
}

impl Link {
    /// Publishes the session's state and context to watchers, notifying only on change.
    pub fn publish(&self, session: &Session) {
        self.state_tx.send_if_modified(|state| {
            let changed = *state != session.state();
            if changed {
                #[cfg(feature = "tracing")]
                tracing::debug!(from = %state, to = %session.state(), "Session state changed");
                *state = session.state();
            }
            changed
        });
        self.context_tx.send_if_modified(|context| {
            let changed = context != session.context();
            if changed {
                context.clone_from(session.context());
            }
            changed
        });
    }
}

/// Why a transport stopped being driven.
#[derive(Debug)]
pub(crate) enum Disconnect {
    /// The handle asked to close, or was dropped
    Requested,
    /// Closed by the peer, errored, went silent, or never greeted us
    Lost,
    /// The server refused to resume; reconnect fresh straight away
    Restart,
    /// No resume acknowledgement in time; reconnect fresh straight away
    ResumeTimedOut,
    /// The session is over
    Fatal(GatewayError),
}

/// Opens the transport, presenting `resume_token` when there is one.
pub(crate) async fn open(endpoint: &Url, token: &Token, resume_token: Option<&str>) -> Result<WsStream> {
    let mut request = endpoint.as_str().into_client_request()?;
    let headers = request.headers_mut();

    headers.insert(AUTHORIZATION, token.bearer()?);
    if let Some(resume_token) = resume_token {
        #[cfg(feature = "tracing")]
        tracing::debug!(token = resume_token, "Requesting replay");
        headers.insert(LAST_MESSAGE_ID_HEADER, HeaderValue::from_str(resume_token)?);
    }

    let (stream, _response) = connect_async(request).await?;
    Ok(stream)
}

/// Drives one open transport until it ends.
///
/// The first frame must arrive before `handshake_deadline`, counted from when the connection
/// attempt started.
///
/// Reading, heartbeats, the resume deadline, the handshake deadline and commands from the
/// handle all run in this one loop, so the session is only ever touched from here.
pub(crate) async fn drive(
    stream: WsStream,
    handshake_deadline: Instant,
    session: &mut Session,
    link: &mut Link,
    config: &Config,
) -> Disconnect {
    let (mut write, mut read) = stream.split();
    let mut greeted = false;
    let mut heartbeat: Option<Interval> = None;

    loop {
        if heartbeat.is_none()
            && matches!(
                session.state(),
                ConnectionState::Active | ConnectionState::Resuming
            )
            && let Some(period) = session.context().heartbeat_interval
        {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            heartbeat = Some(ticker);
        }
        let resume_deadline = session.resume_deadline(config.resume_timeout);
        let handshake_deadline = (!greeted).then_some(handshake_deadline);

        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    greeted = true;
                    #[cfg(feature = "tracing")]
                    tracing::trace!(%text, "Received gateway frame");

                    match codec::decode(text.as_bytes()) {
                        Ok(envelope) => {
                            let step = session.receive(&envelope);
                            link.publish(session);
                            match step {
                                Step::Dispatch => {
                                    link.dispatch.dispatch(envelope);
                                }
                                Step::Restart => return Disconnect::Restart,
                                Step::Close(e) => return Disconnect::Fatal(e),
                                Step::Continue => {}
                            }
                        }
                        Err(e) => {
                            session.traffic();
                            #[cfg(feature = "tracing")]
                            tracing::warn!(%text, error = %e, "Failed to decode gateway frame, skipping it");
                            #[cfg(not(feature = "tracing"))]
                            let _ = (&text, &e);
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!(?frame, "Gateway closed the connection");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &frame;
                    return lost(session, link);
                }
                None => return lost(session, link),
                Some(Err(e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "Gateway connection failed");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                    return lost(session, link);
                }
                Some(Ok(_)) => session.traffic(),
            },

            command = link.commands.recv() => match command {
                Some(Command::Close) | None => {
                    _ = write.send(Message::Close(None)).await;
                    return Disconnect::Requested;
                }
            },

            () = tick(heartbeat.as_mut()) => match session.heartbeat_due(Instant::now()) {
                Heartbeat::Ping => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Sending heartbeat ping");
                    if write.send(Message::Ping(Default::default())).await.is_err() {
                        return lost(session, link);
                    }
                }
                Heartbeat::Dead => {
                    link.publish(session);
                    return Disconnect::Lost;
                }
            },

            () = sleep_until_some(resume_deadline) => {
                session.resume_timed_out();
                link.publish(session);
                return Disconnect::ResumeTimedOut;
            }

            () = sleep_until_some(handshake_deadline) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(timeout = ?config.handshake_timeout, "No frame received before the handshake deadline");
                return lost(session, link);
            }
        }
    }
}

fn lost(session: &mut Session, link: &Link) -> Disconnect {
    session.transport_lost(Instant::now());
    link.publish(session);
    Disconnect::Lost
}

async fn tick(heartbeat: Option<&mut Interval>) {
    match heartbeat {
        Some(heartbeat) => {
            heartbeat.tick().await;
        }
        None => future::pending().await,
    }
}

/// Sleeps until `deadline`, or forever without one.
pub(crate) async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}
