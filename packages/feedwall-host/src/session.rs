//! Session lifecycle: create → tick → stop → complete → destroy.
//!
//! One [`SessionController`] owns at most one live module session. State is
//! an explicit [`SessionState`]; the loop that drives it (see `app`) only
//! calls [`SessionController::checkpoint`] and reacts to the outcome.

use thiserror::Error;

use crate::bridge::BridgeError;
use crate::display::{BoundSlot, DisplaySurface};
use crate::feed::{FeedModule, Person, SessionConfig, SessionHandle, TickResult};
use crate::layout::LayoutSlot;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("feed module refused to create a session")]
    CreateFailed,

    #[error("a session is still alive; destroy it first")]
    SessionAlive,

    #[error("no active session")]
    NoSession,

    #[error("tick returned {got} entries for {expected} slots")]
    Integrity { expected: usize, got: usize },

    #[error("malformed tick payload")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode session config")]
    Encode(#[source] serde_json::Error),

    #[error("completion requested before any tick was applied")]
    NoTick,

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Created,
    Ticking,
    StopRequested,
    Completed,
    /// A tick or completion failed; the loop is halted until the next
    /// layout selection replaces the session.
    Failed { reason: String },
    Destroyed,
}

/// What a layout selection did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Created(SessionHandle),
    /// The loop was running; nothing changed.
    Ignored,
}

/// Outcome of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// A tick was applied; schedule the next one.
    Continue,
    /// The pending stop was honored; schedule nothing.
    Completed,
    /// Nothing to drive in the current state.
    Idle,
}

struct Session {
    handle: SessionHandle,
    slots: Vec<BoundSlot>,
    last_tick: Option<Vec<Person>>,
}

pub struct SessionController<M, D> {
    module: M,
    surface: D,
    state: SessionState,
    session: Option<Session>,
}

impl<M: FeedModule, D: DisplaySurface> SessionController<M, D> {
    pub fn new(module: M, surface: D) -> Self {
        Self {
            module,
            surface,
            state: SessionState::Uninitialized,
            session: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn handle(&self) -> Option<SessionHandle> {
        self.session.as_ref().map(|s| s.handle)
    }

    pub fn slots(&self) -> &[BoundSlot] {
        self.session
            .as_ref()
            .map(|s| s.slots.as_slice())
            .unwrap_or_default()
    }

    pub fn last_tick(&self) -> Option<&[Person]> {
        self.session.as_ref()?.last_tick.as_deref()
    }

    /// True while the tick loop owns the session.
    pub fn is_running(&self) -> bool {
        matches!(
            self.state,
            SessionState::Ticking | SessionState::StopRequested
        )
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn surface(&self) -> &D {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut D {
        &mut self.surface
    }

    /// Replace the current session with one bound to `layout`.
    ///
    /// Ignored while the loop is running. Otherwise the old session is
    /// destroyed before the new one is created.
    pub fn select_layout(
        &mut self,
        layout: Vec<LayoutSlot>,
        people: &[Person],
    ) -> Result<Selection, SessionError> {
        if self.is_running() {
            tracing::debug!(state = ?self.state, "layout selection ignored while running");
            return Ok(Selection::Ignored);
        }
        self.destroy()?;
        self.create(layout, people).map(Selection::Created)
    }

    pub fn create(
        &mut self,
        layout: Vec<LayoutSlot>,
        people: &[Person],
    ) -> Result<SessionHandle, SessionError> {
        if self.session.is_some() {
            return Err(SessionError::SessionAlive);
        }

        let config = SessionConfig {
            batch_size: layout.len(),
            people,
        };
        let json = serde_json::to_string(&config).map_err(SessionError::Encode)?;
        let Some(handle) = self.module.session_create(&json)? else {
            tracing::warn!(slots = layout.len(), people = people.len(), "session creation refused");
            return Err(SessionError::CreateFailed);
        };

        let slots: Vec<BoundSlot> = layout.into_iter().map(BoundSlot::new).collect();
        self.surface.mount(&slots);
        tracing::info!(%handle, slots = slots.len(), "session created");

        self.session = Some(Session {
            handle,
            slots,
            last_tick: None,
        });
        self.state = SessionState::Created;
        Ok(handle)
    }

    /// Fetch one tick and apply it to every slot, or to none.
    pub fn update_once(&mut self) -> Result<(), SessionError> {
        let session = self.session.as_mut().ok_or(SessionError::NoSession)?;

        // The module's string is already released here, decoded or not.
        let raw = self.module.session_tick(session.handle)?;
        let tick: TickResult = serde_json::from_str(&raw).map_err(SessionError::Decode)?;
        tracing::trace!(entries = tick.current.len(), preload = tick.preload_images.len(), "tick");

        self.surface.preload(&tick.preload_images);

        if tick.current.len() != session.slots.len() {
            return Err(SessionError::Integrity {
                expected: session.slots.len(),
                got: tick.current.len(),
            });
        }

        for (slot, person) in session.slots.iter_mut().zip(&tick.current) {
            slot.image = Some(person.avatar.clone());
        }
        session.last_tick = Some(tick.current);
        self.surface.render(&session.slots);
        Ok(())
    }

    /// Label every slot with the person it showed last.
    pub fn complete(&mut self) -> Result<(), SessionError> {
        let session = self.session.as_mut().ok_or(SessionError::NoSession)?;
        let last = session.last_tick.as_ref().ok_or(SessionError::NoTick)?;
        for (slot, person) in session.slots.iter_mut().zip(last) {
            slot.labels.push(person.label());
        }
        self.surface.render(&session.slots);
        tracing::info!(handle = %session.handle, "session completed");
        Ok(())
    }

    /// Ask the loop to finish. Only meaningful while ticking; returns whether
    /// the request was recorded.
    pub fn request_stop(&mut self) -> bool {
        if self.state == SessionState::Ticking {
            self.state = SessionState::StopRequested;
            tracing::debug!("stop requested");
            true
        } else {
            false
        }
    }

    /// One iteration of the tick loop.
    ///
    /// A pending stop is honored here and nowhere else: the session completes
    /// and no further tick is wanted. Errors move the controller to
    /// [`SessionState::Failed`].
    pub fn checkpoint(&mut self) -> Result<Checkpoint, SessionError> {
        let result = match self.state {
            SessionState::StopRequested => self.complete().map(|()| {
                self.state = SessionState::Completed;
                Checkpoint::Completed
            }),
            SessionState::Created | SessionState::Ticking => self.update_once().map(|()| {
                self.state = SessionState::Ticking;
                Checkpoint::Continue
            }),
            _ => Ok(Checkpoint::Idle),
        };

        if let Err(err) = &result {
            tracing::error!(error = %err, "session loop halted");
            self.surface.show_error(&err.to_string());
            self.state = SessionState::Failed {
                reason: err.to_string(),
            };
        }
        result
    }

    /// Release the module session and everything bound to it. A no-op
    /// without a live session.
    pub fn destroy(&mut self) -> Result<(), SessionError> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        let released = self.module.session_destroy(session.handle);
        self.surface.clear();
        self.state = SessionState::Destroyed;
        tracing::info!(handle = %session.handle, "session destroyed");
        released.map_err(SessionError::from)
    }

    pub fn seed_description(&mut self) -> Result<String, SessionError> {
        let seed = self.module.seed_description()?;
        Ok(seed.trim().to_string())
    }
}
