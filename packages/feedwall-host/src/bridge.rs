//! Raw memory channel to the feed module.
//!
//! Everything the host exchanges with the module travels through the module's
//! linear memory. Regions come from two allocators that must never be mixed:
//!
//! - [`HostBuf`]: obtained from the module's `g_alloc` on the host's behalf and
//!   released with [`MemoryBridge::dealloc`] (`g_free`).
//! - [`ModuleString`]: a NUL-terminated string the module allocated and handed
//!   back from one of its calls, released with
//!   [`MemoryBridge::dealloc_remote_string`] (`g_destroy_cstring`).
//!
//! Both are the same [`ForeignPtr`] tagged with their origin, so passing one to
//! the other's free function does not compile.

use std::marker::PhantomData;

use thiserror::Error;
use wasmtime::{Caller, Engine, Instance, Linker, Memory, Module, Store, TypedFunc};

pub const EXPORT_MEMORY: &str = "memory";
pub const EXPORT_ALLOC: &str = "g_alloc";
pub const EXPORT_FREE: &str = "g_free";
pub const EXPORT_DESTROY_STRING: &str = "g_destroy_cstring";
pub const EXPORT_SESSION_CREATE: &str = "fs_create";
pub const EXPORT_SESSION_TICK: &str = "fs_tick";
pub const EXPORT_SESSION_DESTROY: &str = "fs_destroy";
pub const EXPORT_SEED_DESCRIPTION: &str = "get_printable_rseed";

pub const IMPORT_MODULE: &str = "env";
pub const IMPORT_RAND_SEED: &str = "rand_seed";

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("wasm {op} failed")]
    Wasm {
        op: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("feed module does not export `{name}` with the expected signature")]
    Export {
        name: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("access of {len} bytes at 0x{addr:x} is outside linear memory ({size} bytes)")]
    OutOfBounds { addr: u32, len: usize, size: usize },

    #[error("string at 0x{addr:x} has no NUL terminator before the end of linear memory")]
    Unterminated { addr: u32 },

    #[error("g_alloc returned null for a {len}-byte request")]
    AllocFailed { len: usize },

    #[error("{op} returned a null string pointer")]
    NullString { op: &'static str },

    #[error("{len} bytes does not fit in a 32-bit linear memory")]
    TooLarge { len: usize },
}

impl BridgeError {
    fn wasm(op: &'static str, err: wasmtime::Error) -> Self {
        Self::Wasm {
            op,
            source: err.into(),
        }
    }
}

/// Origin tag for regions the host requested from the module's allocator.
#[derive(Debug)]
pub enum HostOwned {}

/// Origin tag for strings the module allocated itself.
#[derive(Debug)]
pub enum ModuleOwned {}

/// A pointer into the module's linear memory, tagged with who allocated it.
///
/// Neither `Copy` nor `Clone`: the free functions take it by
/// value, so a region is released at most once.
#[must_use = "foreign regions must be released through the MemoryBridge"]
#[derive(Debug)]
pub struct ForeignPtr<O> {
    addr: u32,
    /// Allocation size for host buffers. Module strings carry 0; their extent
    /// is found by scanning for the terminator.
    len: usize,
    _origin: PhantomData<O>,
}

pub type HostBuf = ForeignPtr<HostOwned>;
pub type ModuleString = ForeignPtr<ModuleOwned>;

impl<O> ForeignPtr<O> {
    fn new(addr: u32, len: usize) -> Self {
        Self {
            addr,
            len,
            _origin: PhantomData,
        }
    }

    pub fn addr(&self) -> u32 {
        self.addr
    }
}

impl ForeignPtr<HostOwned> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// An instantiated feed module plus typed handles to every export the host uses.
pub struct MemoryBridge {
    store: Store<()>,
    #[cfg(test)]
    instance: Instance,
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    free: TypedFunc<i32, ()>,
    destroy_string: TypedFunc<i32, ()>,
    session_create: TypedFunc<i32, i32>,
    session_tick: TypedFunc<i32, i32>,
    session_destroy: TypedFunc<i32, ()>,
    seed_description: TypedFunc<(), i32>,
}

impl MemoryBridge {
    /// Compile and instantiate the feed module.
    ///
    /// The only import supplied is `env.rand_seed(ptr, len)`, which fills
    /// `len` bytes at `ptr` from the OS CSPRNG. Every export the host calls is
    /// resolved here, so a module missing one fails at startup rather than on
    /// first use.
    pub fn init(wasm: &[u8]) -> Result<Self, BridgeError> {
        let engine = Engine::default();
        let module = Module::new(&engine, wasm).map_err(|e| BridgeError::wasm("compile", e))?;
        let mut store = Store::new(&engine, ());
        let mut linker = Linker::new(&engine);

        linker
            .func_wrap(
                IMPORT_MODULE,
                IMPORT_RAND_SEED,
                |mut caller: Caller<'_, ()>, ptr: i32, len: i32| -> wasmtime::Result<()> {
                    let memory = caller
                        .get_export(EXPORT_MEMORY)
                        .and_then(|export| export.into_memory())
                        .ok_or_else(|| wasmtime::Error::msg("rand_seed: no exported memory"))?;
                    // Resolve the bounds only now: the module may have grown
                    // its memory since the last host access.
                    let (addr, len) = (ptr as u32 as usize, len as u32 as usize);
                    let size = memory.data_size(&caller);
                    if addr.checked_add(len).map_or(true, |end| end > size) {
                        return Err(wasmtime::Error::msg(format!(
                            "rand_seed: {len} bytes at {addr:#x} exceed memory of {size} bytes"
                        )));
                    }
                    let mut seed = vec![0u8; len];
                    getrandom::getrandom(&mut seed)
                        .map_err(|e| wasmtime::Error::msg(format!("rand_seed: {e}")))?;
                    memory.write(&mut caller, addr, &seed)?;
                    tracing::debug!(ptr = ptr as u32, len = seed.len(), "supplied random seed bytes");
                    Ok(())
                },
            )
            .map_err(|e| BridgeError::wasm("define env.rand_seed", e))?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| BridgeError::wasm("instantiate", e))?;

        let memory = instance
            .get_memory(&mut store, EXPORT_MEMORY)
            .ok_or_else(|| BridgeError::Export {
                name: EXPORT_MEMORY,
                source: "no exported linear memory".into(),
            })?;

        let alloc = typed_export(&instance, &mut store, EXPORT_ALLOC)?;
        let free = typed_export(&instance, &mut store, EXPORT_FREE)?;
        let destroy_string = typed_export(&instance, &mut store, EXPORT_DESTROY_STRING)?;
        let session_create = typed_export(&instance, &mut store, EXPORT_SESSION_CREATE)?;
        let session_tick = typed_export(&instance, &mut store, EXPORT_SESSION_TICK)?;
        let session_destroy = typed_export(&instance, &mut store, EXPORT_SESSION_DESTROY)?;
        let seed_description = typed_export(&instance, &mut store, EXPORT_SEED_DESCRIPTION)?;

        tracing::info!(
            memory_bytes = memory.data_size(&store),
            "feed module instantiated"
        );

        Ok(Self {
            store,
            #[cfg(test)]
            instance,
            memory,
            alloc,
            free,
            destroy_string,
            session_create,
            session_tick,
            session_destroy,
            seed_description,
        })
    }

    /// Current size of the module's linear memory in bytes.
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }

    /// Request `len` bytes from the module's allocator. The caller owns the
    /// region until it hands it back to [`Self::dealloc`].
    pub fn alloc(&mut self, len: usize) -> Result<HostBuf, BridgeError> {
        let wasm_len = i32::try_from(len).map_err(|_| BridgeError::TooLarge { len })?;
        let addr = self
            .alloc
            .call(&mut self.store, wasm_len)
            .map_err(|e| BridgeError::wasm("call g_alloc", e))? as u32;
        if addr == 0 {
            return Err(BridgeError::AllocFailed { len });
        }
        Ok(HostBuf::new(addr, len))
    }

    pub fn dealloc(&mut self, buf: HostBuf) -> Result<(), BridgeError> {
        self.free
            .call(&mut self.store, buf.addr as i32)
            .map_err(|e| BridgeError::wasm("call g_free", e))
    }

    pub fn dealloc_remote_string(&mut self, s: ModuleString) -> Result<(), BridgeError> {
        self.destroy_string
            .call(&mut self.store, s.addr as i32)
            .map_err(|e| BridgeError::wasm("call g_destroy_cstring", e))
    }

    /// UTF-8 encode `s` plus a NUL terminator into a fresh host buffer.
    pub fn build_local_string(&mut self, s: &str) -> Result<HostBuf, BridgeError> {
        let raw = s.as_bytes();
        let buf = self.alloc(raw.len() + 1)?;
        let written = self
            .write_memory(buf.addr, raw)
            .and_then(|()| self.write_memory(buf.addr + raw.len() as u32, &[0]));
        if let Err(err) = written {
            self.dealloc(buf)?;
            return Err(err);
        }
        Ok(buf)
    }

    pub fn write_memory(&mut self, addr: u32, bytes: &[u8]) -> Result<(), BridgeError> {
        let size = self.memory_size();
        // `Memory` resolves the live buffer on every call; nothing here keeps
        // a slice across module calls that could grow it.
        self.memory
            .write(&mut self.store, addr as usize, bytes)
            .map_err(|_| BridgeError::OutOfBounds {
                addr,
                len: bytes.len(),
                size,
            })
    }

    /// Decode a string from linear memory.
    ///
    /// With `len = None` the string runs up to the first NUL byte. With an
    /// explicit length exactly that many bytes are decoded, embedded NULs
    /// included. Invalid UTF-8 decodes to replacement characters.
    pub fn read_string(&self, addr: u32, len: Option<usize>) -> Result<String, BridgeError> {
        let data = self.memory.data(&self.store);
        let start = addr as usize;
        let bytes = match len {
            Some(len) => start
                .checked_add(len)
                .and_then(|end| data.get(start..end))
                .ok_or(BridgeError::OutOfBounds {
                    addr,
                    len,
                    size: data.len(),
                })?,
            None => {
                let tail = data.get(start..).ok_or(BridgeError::OutOfBounds {
                    addr,
                    len: 0,
                    size: data.len(),
                })?;
                let end = tail
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(BridgeError::Unterminated { addr })?;
                &tail[..end]
            }
        };
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read a module-returned string and release it. The string is freed
    /// whether or not reading succeeded.
    pub fn take_remote_string(&mut self, s: ModuleString) -> Result<String, BridgeError> {
        let read = self.read_string(s.addr, None);
        self.dealloc_remote_string(s)?;
        read
    }

    pub(crate) fn call_session_create(&mut self, config: &HostBuf) -> Result<i32, BridgeError> {
        self.session_create
            .call(&mut self.store, config.addr as i32)
            .map_err(|e| BridgeError::wasm("call fs_create", e))
    }

    pub(crate) fn call_session_tick(&mut self, handle: i32) -> Result<ModuleString, BridgeError> {
        let addr = self
            .session_tick
            .call(&mut self.store, handle)
            .map_err(|e| BridgeError::wasm("call fs_tick", e))?;
        module_string(EXPORT_SESSION_TICK, addr)
    }

    pub(crate) fn call_session_destroy(&mut self, handle: i32) -> Result<(), BridgeError> {
        self.session_destroy
            .call(&mut self.store, handle)
            .map_err(|e| BridgeError::wasm("call fs_destroy", e))
    }

    pub(crate) fn call_seed_description(&mut self) -> Result<ModuleString, BridgeError> {
        let addr = self
            .seed_description
            .call(&mut self.store, ())
            .map_err(|e| BridgeError::wasm("call get_printable_rseed", e))?;
        module_string(EXPORT_SEED_DESCRIPTION, addr)
    }

    /// Value of an exported `i32` global; the test fixture counts frees this way.
    #[cfg(test)]
    pub(crate) fn global_i32(&mut self, name: &str) -> Option<i32> {
        self.instance
            .get_global(&mut self.store, name)
            .and_then(|g| g.get(&mut self.store).i32())
    }

    #[cfg(test)]
    pub(crate) fn call_export(&mut self, name: &str, args: (i32, i32)) -> wasmtime::Result<()> {
        self.instance
            .get_typed_func::<(i32, i32), ()>(&mut self.store, name)?
            .call(&mut self.store, args)
    }
}

fn typed_export<P, R>(
    instance: &Instance,
    store: &mut Store<()>,
    name: &'static str,
) -> Result<TypedFunc<P, R>, BridgeError>
where
    P: wasmtime::WasmParams,
    R: wasmtime::WasmResults,
{
    instance
        .get_typed_func::<P, R>(store, name)
        .map_err(|e| BridgeError::Export {
            name,
            source: e.into(),
        })
}

fn module_string(op: &'static str, addr: i32) -> Result<ModuleString, BridgeError> {
    if addr == 0 {
        return Err(BridgeError::NullString { op });
    }
    Ok(ModuleString::new(addr as u32, 0))
}
