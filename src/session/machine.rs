//! Single-writer reducer behind the authorization view.
//!
//! All mutation goes through one task per signed-in user: identity events and
//! profile-listener events arrive on one channel and are folded into an
//! [`AuthorizationView`] published over a watch channel. Precedence rule:
//! identity events win; a profile event carrying a uid that is no longer the
//! current session is dropped on the floor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::AuthorizationView;
use crate::identity::Session;
use crate::store::{ProfileStore, ProfileUpdate, UserProfile};

#[derive(Debug)]
enum AuthEvent {
    SignedIn(Session),
    /// Terminal: the reducer publishes an anonymous view and exits.
    SignedOut,
    Profile {
        uid: String,
        profile: Option<UserProfile>,
    },
    ProfileLost {
        uid: String,
        reason: String,
    },
}

/// Handle to one user's reducer. Cheap to clone; all clones feed the same
/// task and observe the same view.
#[derive(Clone)]
pub struct AuthMachine {
    events: mpsc::UnboundedSender<AuthEvent>,
    view: watch::Receiver<AuthorizationView>,
}

impl AuthMachine {
    #[must_use]
    pub fn spawn(store: Arc<dyn ProfileStore>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(AuthorizationView {
            loading: true,
            ..AuthorizationView::default()
        });

        tokio::spawn(run(store, events_tx.clone(), events_rx, view_tx));

        Self {
            events: events_tx,
            view: view_rx,
        }
    }

    pub fn signed_in(&self, session: Session) {
        let _ = self.events.send(AuthEvent::SignedIn(session));
    }

    pub fn signed_out(&self) {
        let _ = self.events.send(AuthEvent::SignedOut);
    }

    #[must_use]
    pub fn view(&self) -> AuthorizationView {
        self.view.borrow().clone()
    }

    /// Watch the view; the receiver sees every published state, most recent
    /// value semantics.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthorizationView> {
        self.view.clone()
    }
}

async fn run(
    store: Arc<dyn ProfileStore>,
    events_tx: mpsc::UnboundedSender<AuthEvent>,
    mut events_rx: mpsc::UnboundedReceiver<AuthEvent>,
    view_tx: watch::Sender<AuthorizationView>,
) {
    let mut state = AuthorizationView {
        loading: true,
        ..AuthorizationView::default()
    };
    let mut forwarder: Option<JoinHandle<()>> = None;

    while let Some(event) = events_rx.recv().await {
        match event {
            AuthEvent::SignedIn(session) => {
                if let Some(task) = forwarder.take() {
                    task.abort();
                }

                let uid = session.uid.clone();
                state.session = Some(session);
                state.loading = false;
                state.profile = None;
                state.profile_loading = true;

                // Every session change re-subscribes the profile listener;
                // the old watch is cancelled by the abort above.
                forwarder = Some(spawn_forwarder(&store, events_tx.clone(), uid));
            }
            AuthEvent::SignedOut => {
                if let Some(task) = forwarder.take() {
                    task.abort();
                }
                state = AuthorizationView::default();
                let _ = view_tx.send(state);
                return;
            }
            AuthEvent::Profile { uid, profile } => {
                if current_uid(&state) == Some(uid.as_str()) {
                    state.profile = profile;
                    state.profile_loading = false;
                } else {
                    debug!("dropping stale profile event for {uid}");
                }
            }
            AuthEvent::ProfileLost { uid, reason } => {
                if current_uid(&state) == Some(uid.as_str()) {
                    // Degrade to no data; a fresh login is required to
                    // re-subscribe, there is no automatic retry.
                    warn!("profile listener lost for {uid}: {reason}");
                    state.profile = None;
                    state.profile_loading = false;
                }
            }
        }

        if view_tx.send(state.clone()).is_err() {
            return;
        }
    }
}

fn current_uid(state: &AuthorizationView) -> Option<&str> {
    state.session.as_ref().map(|session| session.uid.as_str())
}

fn spawn_forwarder(
    store: &Arc<dyn ProfileStore>,
    events: mpsc::UnboundedSender<AuthEvent>,
    uid: String,
) -> JoinHandle<()> {
    let mut profile_watch = store.watch(&uid);
    tokio::spawn(async move {
        while let Some(update) = profile_watch.changed().await {
            let event = match update {
                ProfileUpdate::Snapshot(profile) => AuthEvent::Profile {
                    uid: uid.clone(),
                    profile,
                },
                ProfileUpdate::Lost(reason) => {
                    let _ = events.send(AuthEvent::ProfileLost {
                        uid: uid.clone(),
                        reason,
                    });
                    return;
                }
                ProfileUpdate::Pending => continue,
            };
            if events.send(event).is_err() {
                return;
            }
        }
    })
}

/// Process-wide map of uid → running reducer.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn ProfileStore>,
    machines: Arc<Mutex<HashMap<String, AuthMachine>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self {
            store,
            machines: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start (or refresh) the reducer for a signed-in session.
    pub fn attach(&self, session: Session) -> AuthMachine {
        let mut machines = self.machines.lock().expect("machines lock poisoned");
        let machine = machines
            .entry(session.uid.clone())
            .or_insert_with(|| AuthMachine::spawn(self.store.clone()))
            .clone();
        drop(machines);

        machine.signed_in(session);
        machine
    }

    /// Tear down the reducer for `uid`. Safe to call when absent.
    pub fn detach(&self, uid: &str) {
        let machine = self
            .machines
            .lock()
            .expect("machines lock poisoned")
            .remove(uid);
        if let Some(machine) = machine {
            machine.signed_out();
        }
    }

    #[must_use]
    pub fn view(&self, uid: &str) -> Option<AuthorizationView> {
        self.machines
            .lock()
            .expect("machines lock poisoned")
            .get(uid)
            .map(AuthMachine::view)
    }
}
