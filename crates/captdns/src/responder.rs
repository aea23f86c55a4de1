//! The UDP listener and its start / stop lifecycle.
//!
//! A `CaptiveDns` owns at most one serving task.  The task binds the
//! socket (retrying until it succeeds or is told to stop), then polls
//! it with a short timeout, checking for a stop request between polls.
//! `stop` sends the request and then waits for the task to finish, so
//! once it returns the socket is closed.
//!
//! Each `start` begins a new generation of the published state.  Only
//! the current generation may change it, so a task that is still
//! shutting down cannot overwrite the state of the one that replaced
//! it.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::handler;
use crate::net_util::*;
use crate::scope::InterfaceInfo;
use crate::settings::Settings;

const MUTEX_POISON_MESSAGE: &str =
    "[INTERNAL ERROR] responder mutex poisoned, cannot recover from this - aborting";

/// Where the listener is in its lifecycle.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ListenerState {
    /// Never started.
    Idle,

    /// Trying to bind the socket.
    Binding,

    /// Answering queries on this address.
    Serving(SocketAddr),

    /// `stop` has been called and the task has not finished yet.
    StopRequested,

    /// The task has finished and the socket is closed.  The listener
    /// can be started again.
    Stopped,
}

/// A captive portal DNS responder.
///
/// There is no global state: any number of these can exist, as long
/// as they bind different ports.  Dropping one stops its task, but
/// without waiting for the socket to close; call `stop` for that.
#[derive(Debug)]
pub struct CaptiveDns {
    settings: Settings,
    state: Arc<StatePublisher>,
    running: Mutex<Option<Running>>,
}

#[derive(Debug)]
struct Running {
    generation: u64,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// The published `ListenerState`, tagged with the generation allowed
/// to change it.
#[derive(Debug)]
struct StatePublisher {
    tx: watch::Sender<ListenerState>,
    // only changed while holding the watch lock, in `begin`
    generation: AtomicU64,
}

impl StatePublisher {
    fn new() -> Self {
        Self {
            tx: watch::Sender::new(ListenerState::Idle),
            generation: AtomicU64::new(0),
        }
    }

    /// Start a new generation in the `Binding` state.  Older
    /// generations can no longer change the state after this.
    fn begin(&self) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|s| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *s = ListenerState::Binding;
        });
        generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Apply `modify` if `generation` is still current, notifying
    /// watchers if it returns `true`.
    fn update(&self, generation: u64, modify: impl FnOnce(&mut ListenerState) -> bool) -> bool {
        self.tx
            .send_if_modified(|s| self.is_current(generation) && modify(s))
    }

    fn set(&self, generation: u64, state: ListenerState) {
        self.update(generation, |s| {
            *s = state;
            true
        });
    }
}

impl CaptiveDns {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            state: Arc::new(StatePublisher::new()),
            running: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Watch the lifecycle state.
    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.tx.subscribe()
    }

    /// Start answering queries on behalf of `interface`, returning the
    /// bound address once the socket is up.  If binding fails, it is
    /// retried until it works or `stop` is called.
    ///
    /// # Errors
    ///
    /// If this responder is already running, or `stop` was called
    /// before the socket could be bound.
    ///
    /// # Panics
    ///
    /// If the mutex has been poisoned.
    pub async fn start(&self, interface: InterfaceInfo) -> Result<SocketAddr, StartError> {
        let (generation, mut state_rx) = {
            let mut running = self.running.lock().expect(MUTEX_POISON_MESSAGE);
            if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
                return Err(StartError::AlreadyRunning);
            }

            tracing::info!(%interface, address = %self.settings.socket_address(), "starting captive dns");

            let generation = self.state.begin();
            let state_rx = self.state.tx.subscribe();

            let (stop_tx, stop_rx) = oneshot::channel();
            let task = tokio::spawn(serve(
                self.settings,
                interface,
                stop_rx,
                self.state.clone(),
                generation,
            ));
            *running = Some(Running {
                generation,
                stop_tx,
                task,
            });

            (generation, state_rx)
        };

        let outcome = state_rx
            .wait_for(|s| {
                !self.state.is_current(generation)
                    || matches!(s, ListenerState::Serving(_) | ListenerState::Stopped)
            })
            .await
            .map(|s| *s);

        match outcome {
            Ok(ListenerState::Serving(addr)) if self.state.is_current(generation) => Ok(addr),
            _ => Err(StartError::Cancelled),
        }
    }

    /// Stop answering queries.  Returns once the socket is closed, which
    /// may take up to the poll interval.  Does nothing if not running.
    ///
    /// # Panics
    ///
    /// If the mutex has been poisoned.
    pub async fn stop(&self) {
        let running = self.running.lock().expect(MUTEX_POISON_MESSAGE).take();
        let Some(running) = running else {
            return;
        };

        tracing::info!("signalling captive dns to stop");
        self.state.update(running.generation, |s| {
            if matches!(s, ListenerState::Stopped) {
                false
            } else {
                *s = ListenerState::StopRequested;
                true
            }
        });

        // the task may already have exited, dropping the receiver
        let _ = running.stop_tx.send(());
        if let Err(error) = running.task.await {
            tracing::error!(?error, "captive dns task failed");
        }

        self.state.set(running.generation, ListenerState::Stopped);
        tracing::info!("captive dns stopped");
    }
}

/// Errors that can arise when starting a `CaptiveDns`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StartError {
    AlreadyRunning,
    Cancelled,
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StartError::AlreadyRunning => write!(f, "captive dns is already running"),
            StartError::Cancelled => write!(f, "stopped before the socket was bound"),
        }
    }
}

impl std::error::Error for StartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// Whether the stop channel says to stop.  A dropped sender counts,
/// since then nobody can stop us any other way.
fn stop_requested(stop_rx: &mut oneshot::Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty))
}

async fn bind(settings: Settings, stop_rx: &mut oneshot::Receiver<()>) -> Option<UdpSocket> {
    let address = settings.socket_address();

    loop {
        match UdpSocket::bind(address).await {
            Ok(sock) => return Some(sock),
            Err(error) => {
                tracing::warn!(%address, ?error, retry_in = ?settings.bind_retry_interval, "could not bind socket");
            }
        }

        tokio::select! {
            _ = &mut *stop_rx => return None,
            () = sleep(settings.bind_retry_interval) => (),
        }
    }
}

async fn serve(
    settings: Settings,
    interface: InterfaceInfo,
    mut stop_rx: oneshot::Receiver<()>,
    state: Arc<StatePublisher>,
    generation: u64,
) {
    if let Some(sock) = bind(settings, &mut stop_rx).await {
        listen_udp(settings, interface, &mut stop_rx, &state, generation, sock).await;
    } else {
        tracing::info!("stop requested while binding");
    }

    state.set(generation, ListenerState::Stopped);
}

async fn listen_udp(
    settings: Settings,
    interface: InterfaceInfo,
    stop_rx: &mut oneshot::Receiver<()>,
    state: &StatePublisher,
    generation: u64,
    sock: UdpSocket,
) {
    let local = match sock.local_addr() {
        Ok(local) => local,
        Err(error) => {
            tracing::error!(?error, "could not get bound address");
            return;
        }
    };

    // a stop which raced with binding wins
    let serving = state.update(generation, |s| {
        if matches!(s, ListenerState::Binding) {
            *s = ListenerState::Serving(local);
            true
        } else {
            false
        }
    });
    if serving {
        tracing::info!(%local, "captive dns serving");
    }

    let mut buf = vec![0u8; RECV_BUFFER_LEN];

    while !stop_requested(stop_rx) {
        let received = recv_udp_bytes_from(&sock, &mut buf, settings.poll_interval).await;
        let Some((size, peer)) = received_datagram(received, settings.poll_interval).await else {
            continue;
        };

        let span = tracing::error_span!("datagram", %peer, size);
        let Some(response) = span.in_scope(|| handler::reply_to(&interface, peer, &buf[..size]))
        else {
            continue;
        };

        if let Err(error) = send_udp_bytes_to(&sock, peer, &response).await {
            tracing::warn!(%peer, ?error, "udp send error");
        }
    }

    tracing::info!(%local, "closing captive dns socket");
}

/// Unpack one poll of the socket.  An error waits out a poll interval
/// before returning, so a socket that keeps failing does not spin.
async fn received_datagram(
    received: Result<Option<(usize, SocketAddr)>, io::Error>,
    poll_interval: Duration,
) -> Option<(usize, SocketAddr)> {
    match received {
        Ok(received) => received,
        Err(error) => {
            tracing::warn!(?error, retry_in = ?poll_interval, "udp recv error");
            sleep(poll_interval).await;
            None
        }
    }
}
