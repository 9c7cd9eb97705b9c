//! Typed seam over the feed module's session exports.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::bridge::{BridgeError, MemoryBridge};

/// Opaque id of session state held inside the module. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(NonZeroU32);

impl SessionHandle {
    /// `None` for the module's failure value (0).
    pub fn from_raw(raw: i32) -> Option<Self> {
        NonZeroU32::new(raw as u32).map(Self)
    }

    pub fn raw(self) -> i32 {
        self.0.get() as i32
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub avatar: String,
    #[serde(rename = "studentId", default)]
    pub student_id: Option<String>,
    #[serde(rename = "studentName", default)]
    pub student_name: Option<String>,
}

impl Person {
    /// `"<studentId> / <studentName>"`, missing parts left empty.
    pub fn label(&self) -> String {
        format!(
            "{} / {}",
            self.student_id.as_deref().unwrap_or_default(),
            self.student_name.as_deref().unwrap_or_default()
        )
    }
}

/// Payload handed to `fs_create`.
#[derive(Debug, Serialize)]
pub struct SessionConfig<'a> {
    pub batch_size: usize,
    pub people: &'a [Person],
}

/// Decoded `fs_tick` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TickResult {
    pub current: Vec<Person>,
    #[serde(default)]
    pub preload_images: Vec<String>,
}

/// The module operations a session needs.
///
/// Strings crossing this trait are already marshalled: implementations own
/// every foreign region they touch and release it before returning.
pub trait FeedModule {
    /// Returns `None` when the module refuses the configuration.
    fn session_create(&mut self, config_json: &str) -> Result<Option<SessionHandle>, BridgeError>;

    /// Raw JSON of the next tick.
    fn session_tick(&mut self, handle: SessionHandle) -> Result<String, BridgeError>;

    fn session_destroy(&mut self, handle: SessionHandle) -> Result<(), BridgeError>;

    /// Human-readable description of the module's active random seed.
    fn seed_description(&mut self) -> Result<String, BridgeError>;
}

impl FeedModule for MemoryBridge {
    fn session_create(&mut self, config_json: &str) -> Result<Option<SessionHandle>, BridgeError> {
        let config = self.build_local_string(config_json)?;
        let raw = self.call_session_create(&config);
        // The module copies whatever it keeps; the payload dies with this call.
        let freed = self.dealloc(config);
        let raw = raw?;
        freed?;
        Ok(SessionHandle::from_raw(raw))
    }

    fn session_tick(&mut self, handle: SessionHandle) -> Result<String, BridgeError> {
        let tick = self.call_session_tick(handle.raw())?;
        self.take_remote_string(tick)
    }

    fn session_destroy(&mut self, handle: SessionHandle) -> Result<(), BridgeError> {
        self.call_session_destroy(handle.raw())
    }

    fn seed_description(&mut self) -> Result<String, BridgeError> {
        let seed = self.call_seed_description()?;
        self.take_remote_string(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture::{fixture_bridge, FIXTURE_BATCH};

    #[test]
    fn zero_is_not_a_handle() {
        assert_eq!(SessionHandle::from_raw(0), None);
        assert_eq!(SessionHandle::from_raw(7).map(SessionHandle::raw), Some(7));
    }

    #[test]
    fn person_uses_roster_field_names() {
        let p: Person = serde_json::from_str(
            r#"{"avatar":"x.jpg","studentId":"2024001","studentName":"Li Hua"}"#,
        )
        .unwrap();
        assert_eq!(p.student_id.as_deref(), Some("2024001"));
        assert_eq!(p.label(), "2024001 / Li Hua");

        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["studentName"], "Li Hua");
    }

    #[test]
    fn label_tolerates_missing_fields() {
        let p: Person = serde_json::from_str(r#"{"avatar":"x.jpg"}"#).unwrap();
        assert_eq!(p.label(), " / ");
    }

    #[test]
    fn create_frees_config_payload() {
        let mut bridge = fixture_bridge();
        let config = SessionConfig {
            batch_size: FIXTURE_BATCH,
            people: &[],
        };
        let json = serde_json::to_string(&config).unwrap();
        let handle = bridge.session_create(&json).unwrap().expect("handle");
        assert_eq!(handle.raw(), 1);
        assert_eq!(bridge.global_i32("freed"), Some(1));
        assert_eq!(bridge.global_i32("destroyed_strings"), Some(0));
    }

    #[test]
    fn refused_config_yields_no_handle_but_still_frees() {
        let mut bridge = fixture_bridge();
        assert_eq!(bridge.session_create("not json").unwrap(), None);
        assert_eq!(bridge.global_i32("freed"), Some(1));
    }

    #[test]
    fn tick_returns_payload_and_destroys_remote_string() {
        let mut bridge = fixture_bridge();
        let handle = bridge.session_create("{}").unwrap().unwrap();

        let raw = bridge.session_tick(handle).unwrap();
        let tick: TickResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(tick.current.len(), FIXTURE_BATCH);
        assert_eq!(tick.current[1].avatar, "b.jpg");
        assert_eq!(tick.preload_images, vec!["c.jpg".to_string()]);

        bridge.session_tick(handle).unwrap();
        assert_eq!(bridge.global_i32("destroyed_strings"), Some(2));
        // Only the config payload went through g_free.
        assert_eq!(bridge.global_i32("freed"), Some(1));
    }

    #[test]
    fn destroy_reaches_module() {
        let mut bridge = fixture_bridge();
        let handle = bridge.session_create("{}").unwrap().unwrap();
        bridge.session_destroy(handle).unwrap();
        assert_eq!(bridge.global_i32("destroyed_sessions"), Some(1));
    }
}
