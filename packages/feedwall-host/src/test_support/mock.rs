use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::bridge::BridgeError;
use crate::display::{BoundSlot, DisplaySurface};
use crate::feed::{FeedModule, Person, SessionHandle};

#[derive(Default)]
struct MockState {
    next_handle: i32,
    refuse_create: bool,
    ticks: VecDeque<String>,
    repeating_tick: Option<String>,
    seed: String,
    created: Vec<String>,
    tick_calls: usize,
    destroyed: Vec<SessionHandle>,
}

/// Scripted feed module. Clones share state, so a test can keep one clone
/// and inspect calls after handing the other to a controller.
#[derive(Clone)]
pub struct MockModule {
    state: Rc<RefCell<MockState>>,
}

impl MockModule {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(MockState {
                next_handle: 1,
                seed: "mock seed".into(),
                ..MockState::default()
            })),
        }
    }

    pub fn refusing_create(self) -> Self {
        self.state.borrow_mut().refuse_create = true;
        self
    }

    /// Queue one tick payload.
    pub fn with_tick(self, json: impl Into<String>) -> Self {
        self.state.borrow_mut().ticks.push_back(json.into());
        self
    }

    /// Payload returned once the queue is empty.
    pub fn with_repeating_tick(self, json: impl Into<String>) -> Self {
        self.state.borrow_mut().repeating_tick = Some(json.into());
        self
    }

    pub fn with_seed(self, seed: &str) -> Self {
        self.state.borrow_mut().seed = seed.into();
        self
    }

    pub fn created_configs(&self) -> Vec<String> {
        self.state.borrow().created.clone()
    }

    pub fn tick_calls(&self) -> usize {
        self.state.borrow().tick_calls
    }

    pub fn destroyed(&self) -> Vec<SessionHandle> {
        self.state.borrow().destroyed.clone()
    }
}

impl FeedModule for MockModule {
    fn session_create(&mut self, config_json: &str) -> Result<Option<SessionHandle>, BridgeError> {
        let mut state = self.state.borrow_mut();
        state.created.push(config_json.to_string());
        if state.refuse_create {
            return Ok(None);
        }
        let handle = SessionHandle::from_raw(state.next_handle);
        state.next_handle += 1;
        Ok(handle)
    }

    fn session_tick(&mut self, _handle: SessionHandle) -> Result<String, BridgeError> {
        let mut state = self.state.borrow_mut();
        state.tick_calls += 1;
        match state.ticks.pop_front() {
            Some(tick) => Ok(tick),
            None => state
                .repeating_tick
                .clone()
                .ok_or(BridgeError::NullString { op: "fs_tick" }),
        }
    }

    fn session_destroy(&mut self, handle: SessionHandle) -> Result<(), BridgeError> {
        self.state.borrow_mut().destroyed.push(handle);
        Ok(())
    }

    fn seed_description(&mut self) -> Result<String, BridgeError> {
        Ok(self.state.borrow().seed.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Mount(usize),
    Render(Vec<BoundSlot>),
    Clear,
    Preload(Vec<String>),
    Seed(String),
    Error(String),
}

#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub events: Vec<SurfaceEvent>,
}

impl RecordingSurface {
    pub fn renders(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SurfaceEvent::Render(_)))
            .count()
    }

    pub fn last_render(&self) -> Option<&[BoundSlot]> {
        self.events.iter().rev().find_map(|e| match e {
            SurfaceEvent::Render(slots) => Some(slots.as_slice()),
            _ => None,
        })
    }
}

impl DisplaySurface for RecordingSurface {
    fn mount(&mut self, slots: &[BoundSlot]) {
        self.events.push(SurfaceEvent::Mount(slots.len()));
    }

    fn render(&mut self, slots: &[BoundSlot]) {
        self.events.push(SurfaceEvent::Render(slots.to_vec()));
    }

    fn clear(&mut self) {
        self.events.push(SurfaceEvent::Clear);
    }

    fn preload(&mut self, urls: &[String]) {
        self.events.push(SurfaceEvent::Preload(urls.to_vec()));
    }

    fn show_seed(&mut self, seed: &str) {
        self.events.push(SurfaceEvent::Seed(seed.into()));
    }

    fn show_error(&mut self, message: &str) {
        self.events.push(SurfaceEvent::Error(message.into()));
    }
}

/// `n` people: `avatars/<i>.jpg`, id `S<iii>`, name `Student <i>`.
pub fn roster(n: usize) -> Vec<Person> {
    (0..n)
        .map(|i| Person {
            avatar: format!("avatars/{i}.jpg"),
            student_id: Some(format!("S{i:03}")),
            student_name: Some(format!("Student {i}")),
        })
        .collect()
}

pub fn tick_json(current: &[Person], preload: &[&str]) -> String {
    serde_json::json!({
        "current": current,
        "preload_images": preload,
    })
    .to_string()
}
