use crate::{check, read_diagnostics};
use parking_lot::Mutex;
use sluice_core::{
    Diagnostic, Diagnostics, Failure, Result,
    native::{Handle, HandleKind, NativeApi},
};
use std::{
    collections::HashMap,
    fmt::{self, Debug},
    ops::Deref,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Allocation state of a native handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Unallocated,
    Allocated,
    Freed,
    Invalid,
}

struct Slot {
    state: HandleState,
    raw: Handle,
    diagnostics: Vec<Diagnostic>,
}

/// A native resource and its allocation state.
///
/// The state transitions are serialized by a per handle lock, the raw handle itself is
/// handed out by copy. Dropping an allocated handle frees it.
pub struct NativeHandle {
    api: Arc<dyn NativeApi>,
    kind: HandleKind,
    slot: Mutex<Slot>,
    borrows: AtomicUsize,
}

impl NativeHandle {
    pub fn new(api: Arc<dyn NativeApi>, kind: HandleKind) -> Self {
        Self {
            api,
            kind,
            slot: Mutex::new(Slot {
                state: HandleState::Unallocated,
                raw: Handle::NULL,
                diagnostics: Vec::new(),
            }),
            borrows: AtomicUsize::new(0),
        }
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn api(&self) -> &Arc<dyn NativeApi> {
        &self.api
    }

    /// Perform the native allocation under `parent`.
    ///
    /// On failure the handle becomes invalid and keeps the diagnostics of the parent (or of
    /// the environment allocation itself when there is no parent).
    pub fn allocate(&self, parent: Handle) -> bool {
        let mut slot = self.slot.lock();
        if slot.state != HandleState::Unallocated {
            log::warn!(
                "Cannot allocate a {} handle in state {:?}",
                self.kind,
                slot.state
            );
            return false;
        }
        let mut raw = Handle::NULL;
        let ret = self.api.alloc_handle(self.kind, parent, &mut raw);
        if ret.is_success() && !raw.is_null() {
            slot.state = HandleState::Allocated;
            slot.raw = raw;
            log::trace!("Allocated {} handle {:?}", self.kind, raw);
            return true;
        }
        let parent_kind = match self.kind {
            HandleKind::Environment => HandleKind::Environment,
            HandleKind::Connection => HandleKind::Environment,
            _ => HandleKind::Connection,
        };
        slot.state = HandleState::Invalid;
        slot.diagnostics = read_diagnostics(self.api.as_ref(), parent_kind, parent);
        log::error!(
            "Could not allocate a {} handle ({ret}): {}",
            self.kind,
            Diagnostics(&slot.diagnostics)
        );
        false
    }

    /// Release the native resource.
    ///
    /// Returns false without calling the native layer when the handle was already freed.
    pub fn free(&self) -> Result<bool> {
        let mut slot = self.slot.lock();
        match slot.state {
            HandleState::Allocated => {}
            HandleState::Freed => {
                log::warn!(
                    "Double free of {} handle {:?} ignored",
                    self.kind,
                    slot.raw
                );
                return Ok(false);
            }
            state => {
                let error = Failure::state("free", format!("{state:?}"));
                log::error!("{:#}", error);
                return Err(error.into());
            }
        }
        let raw = slot.raw;
        let ret = self.api.free_handle(self.kind, raw);
        if let Err(error) = check(self.api.as_ref(), ret, self.kind, raw, "SQLFreeHandle") {
            slot.state = HandleState::Invalid;
            log::error!("{:#}", error);
            return Err(error);
        }
        slot.state = HandleState::Freed;
        log::trace!("Freed {} handle {:?}", self.kind, raw);
        Ok(true)
    }

    pub fn state(&self) -> HandleState {
        self.slot.lock().state
    }

    /// The native handle, null unless allocated.
    pub fn raw(&self) -> Handle {
        let slot = self.slot.lock();
        match slot.state {
            HandleState::Allocated => slot.raw,
            _ => Handle::NULL,
        }
    }

    pub fn is_valid(&self) -> bool {
        let slot = self.slot.lock();
        slot.state == HandleState::Allocated && !slot.raw.is_null()
    }

    /// Diagnostics recorded by the last failed allocation.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.slot.lock().diagnostics.clone()
    }

    /// Read the diagnostics currently attached to the native handle.
    pub fn read_diagnostics(&self) -> Vec<Diagnostic> {
        let slot = self.slot.lock();
        if slot.state != HandleState::Allocated {
            return Vec::new();
        }
        read_diagnostics(self.api.as_ref(), self.kind, slot.raw)
    }

    pub fn borrow(self: &Arc<Self>) -> HandleGuard {
        self.borrows.fetch_add(1, Ordering::AcqRel);
        HandleGuard(self.clone())
    }

    pub fn borrows(&self) -> usize {
        self.borrows.load(Ordering::Acquire)
    }
}

impl Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("NativeHandle")
            .field("kind", &self.kind)
            .field("state", &slot.state)
            .field("raw", &slot.raw)
            .finish()
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        let allocated = self.slot.get_mut().state == HandleState::Allocated;
        if allocated {
            let _ = self.free();
        }
    }
}

/// Counted borrow of a native handle, released on drop.
pub struct HandleGuard(Arc<NativeHandle>);

impl Deref for HandleGuard {
    type Target = NativeHandle;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.0.borrows.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Owner of the statement handles of one connection.
pub struct HandleRegistry {
    api: Arc<dyn NativeApi>,
    parent: Arc<NativeHandle>,
    statements: Mutex<HashMap<u32, Arc<NativeHandle>>>,
}

impl HandleRegistry {
    /// Registry whose statements are allocated under the `parent` connection.
    pub fn new(parent: Arc<NativeHandle>) -> Self {
        Self {
            api: parent.api().clone(),
            parent,
            statements: Default::default(),
        }
    }

    pub fn parent(&self) -> &Arc<NativeHandle> {
        &self.parent
    }

    /// Allocate a new handle of `kind`.
    pub fn allocate(
        api: &Arc<dyn NativeApi>,
        kind: HandleKind,
        parent: Handle,
    ) -> Result<Arc<NativeHandle>> {
        let handle = Arc::new(NativeHandle::new(api.clone(), kind));
        if !handle.allocate(parent) {
            return Err(Failure::Allocation {
                kind,
                diagnostics: handle.diagnostics(),
            }
            .into());
        }
        Ok(handle)
    }

    pub fn free(handle: &NativeHandle) -> Result<bool> {
        handle.free()
    }

    /// The statement handle of `statement_id`, allocated on first use.
    pub fn checkout(&self, statement_id: u32) -> Result<Arc<NativeHandle>> {
        let mut statements = self.statements.lock();
        if let Some(handle) = statements.get(&statement_id) {
            if handle.is_valid() {
                return Ok(handle.clone());
            }
        }
        let parent = self.parent.raw();
        if parent.is_null() {
            return Err(Failure::state("allocate a statement on", "disconnected").into());
        }
        let handle = Self::allocate(&self.api, HandleKind::Statement, parent)?;
        statements.insert(statement_id, handle.clone());
        Ok(handle)
    }

    /// The statement handle of `statement_id` if it was checked out.
    pub fn get(&self, statement_id: u32) -> Option<Arc<NativeHandle>> {
        self.statements.lock().get(&statement_id).cloned()
    }

    /// Free and forget the handle of `statement_id`, false when unknown.
    pub fn checkin(&self, statement_id: u32) -> bool {
        let Some(handle) = self.statements.lock().remove(&statement_id) else {
            return false;
        };
        match handle.free() {
            Ok(freed) => freed,
            Err(error) => {
                let error = error.context(format!("While releasing statement {statement_id}"));
                log::error!("{:#}", error);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.statements.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.lock().is_empty()
    }

    /// Free every statement handle, returns how many were released.
    pub fn clear(&self) -> usize {
        let statements = self.statements.lock().drain().collect::<Vec<_>>();
        statements
            .into_iter()
            .filter(|(_, handle)| matches!(handle.free(), Ok(true)))
            .count()
    }
}

impl Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("parent", &self.parent)
            .field("statements", &self.len())
            .finish()
    }
}
