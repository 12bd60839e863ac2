use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::config::Config;
use super::connection::{Command, Link};
use super::dispatch::EventDispatchTable;
use super::error::GatewayError;
use super::session::{ConnectionState, Session, SessionContext};
use super::supervisor;
use crate::Result;
use crate::auth::Token;
use crate::endpoints::Endpoints;
use crate::error::{Error, Kind};

/// A gateway session: one logical connection that survives transport drops by resuming.
///
/// Register handlers on [`Gateway::events`] before calling [`Gateway::connect`]; events that
/// arrive for a name nobody listens to are dropped.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use guilded_client_sdk::gateway::{Config, Gateway};
/// use guilded_client_sdk::models::ChatMessageCreated;
/// use guilded_client_sdk::{Endpoints, Token};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let gateway = Gateway::new(&Endpoints::default(), Token::from("gapi_..."), Config::default());
///
///     gateway.events().on(|event: Arc<ChatMessageCreated>| async move {
///         println!("{:?}", event.message.content);
///     });
///
///     gateway.connect()?;
///     gateway.wait().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Gateway {
    endpoints: Endpoints,
    token: Token,
    config: Config,
    dispatch: Arc<EventDispatchTable>,
    state_rx: watch::Receiver<ConnectionState>,
    context_rx: watch::Receiver<SessionContext>,
    command_tx: mpsc::UnboundedSender<Command>,
    /// Handed to the session task by `connect`
    pending: Mutex<Option<Link>>,
    task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Gateway {
    /// Creates a disconnected session. Must be called within a Tokio runtime.
    #[must_use]
    pub fn new(endpoints: &Endpoints, token: Token, config: Config) -> Self {
        let dispatch = Arc::new(EventDispatchTable::new());
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (context_tx, context_rx) = watch::channel(SessionContext::default());

        let link = Link {
            commands,
            dispatch: Arc::clone(&dispatch),
            state_tx,
            context_tx,
        };

        Self {
            endpoints: endpoints.clone(),
            token,
            config,
            dispatch,
            state_rx,
            context_rx,
            command_tx,
            pending: Mutex::new(Some(link)),
            task: Mutex::new(None),
        }
    }

    /// Starts the session in a background task.
    ///
    /// A session connects once; after it closes, create a new [`Gateway`].
    pub fn connect(&self) -> Result<()> {
        let link = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::from(GatewayError::SessionClosed))?;

        let task = tokio::spawn(supervisor::run(
            Session::new(),
            link,
            self.endpoints.gateway.clone(),
            self.token.clone(),
            self.config.clone(),
        ));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        Ok(())
    }

    /// Subscribers of this session's events.
    #[must_use]
    pub fn events(&self) -> &EventDispatchTable {
        &self.dispatch
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Heartbeat interval, resume token and attempt count as last published by the session.
    #[must_use]
    pub fn context(&self) -> SessionContext {
        self.context_rx.borrow().clone()
    }

    /// Asks the session to close. Events already received are still delivered.
    pub fn close(&self) {
        _ = self.command_tx.send(Command::Close);

        // Never connected: there is no session task to wind things down.
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(link) = pending {
            link.state_tx.send_replace(ConnectionState::Closed);
            self.dispatch.close();
        }
    }

    /// Waits for the session to end.
    ///
    /// Returns `Ok(())` after [`Gateway::close`], or the terminal error that ended it: a
    /// protocol violation, a server error, or an exhausted reconnect budget. Only the first
    /// caller observes the outcome; later calls return immediately.
    pub async fn wait(&self) -> Result<()> {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(task) = task else {
            return Ok(());
        };

        task.await
            .map_err(|e| Error::with_source(Kind::Internal, e))?
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        _ = self.command_tx.send(Command::Close);
    }
}
