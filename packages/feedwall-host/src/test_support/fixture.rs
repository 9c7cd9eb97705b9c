//! A tiny feed module in WAT speaking the same ABI as the real one.
//!
//! Bump allocator starting at 1024 that grows memory on demand; `g_free` and
//! `g_destroy_cstring` only count their calls in exported globals so tests can
//! check which allocator a region went back to. `fs_tick` copies a fixed
//! two-entry payload into a fresh allocation on every call.

use crate::bridge::MemoryBridge;

/// Number of entries in every tick the fixture produces.
pub const FIXTURE_BATCH: usize = 2;

pub const FIXTURE_WAT: &str = r#"
(module
  (import "env" "rand_seed" (func $rand_seed (param i32 i32)))
  (memory (export "memory") 1)

  (global $heap (mut i32) (i32.const 1024))
  (global $next_handle (mut i32) (i32.const 1))
  (global $freed (export "freed") (mut i32) (i32.const 0))
  (global $destroyed_strings (export "destroyed_strings") (mut i32) (i32.const 0))
  (global $destroyed_sessions (export "destroyed_sessions") (mut i32) (i32.const 0))
  (global $ticks (export "ticks") (mut i32) (i32.const 0))

  (data (i32.const 16) "{\"current\":[{\"avatar\":\"a.jpg\",\"studentId\":\"1\",\"studentName\":\"Ann\"},{\"avatar\":\"b.jpg\",\"studentId\":\"2\",\"studentName\":\"Bo\"}],\"preload_images\":[\"c.jpg\"]}\00")
  (data (i32.const 512) "seed: fixture\n\00")

  (func $alloc (export "g_alloc") (param $len i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (local.get $ptr) (local.get $len)))
    (block $done
      (loop $grow
        (br_if $done
          (i32.le_u (global.get $heap) (i32.shl (memory.size) (i32.const 16))))
        (drop (memory.grow (i32.const 1)))
        (br $grow)))
    (local.get $ptr))

  (func (export "g_free") (param $ptr i32)
    (global.set $freed (i32.add (global.get $freed) (i32.const 1))))

  (func (export "g_destroy_cstring") (param $ptr i32)
    (global.set $destroyed_strings (i32.add (global.get $destroyed_strings) (i32.const 1))))

  (func $copy_out (param $src i32) (param $len i32) (result i32)
    (local $dst i32)
    (local.set $dst (call $alloc (local.get $len)))
    (memory.copy (local.get $dst) (local.get $src) (local.get $len))
    (local.get $dst))

  ;; Accepts anything that looks like a JSON object.
  (func (export "fs_create") (param $cfg i32) (result i32)
    (local $handle i32)
    (if (result i32) (i32.eq (i32.load8_u (local.get $cfg)) (i32.const 123))
      (then
        (local.set $handle (global.get $next_handle))
        (global.set $next_handle (i32.add (local.get $handle) (i32.const 1)))
        (local.get $handle))
      (else (i32.const 0))))

  (func (export "fs_tick") (param $handle i32) (result i32)
    (global.set $ticks (i32.add (global.get $ticks) (i32.const 1)))
    (call $copy_out (i32.const 16) (i32.const 150)))

  (func (export "fs_destroy") (param $handle i32)
    (global.set $destroyed_sessions (i32.add (global.get $destroyed_sessions) (i32.const 1))))

  (func (export "get_printable_rseed") (result i32)
    (call $copy_out (i32.const 512) (i32.const 15)))

  (func (export "fill_random") (param $ptr i32) (param $len i32)
    (call $rand_seed (local.get $ptr) (local.get $len)))
)
"#;

pub fn fixture_bridge() -> MemoryBridge {
    MemoryBridge::init(FIXTURE_WAT.as_bytes()).expect("fixture module instantiates")
}
