// Evaluation sessions
//
// A suspended thread's stack is mutated by every invocation, so at most one
// evaluation may be bound to a thread at a time. The table of per-thread locks
// belongs to the debugging session and is shared by everything that evaluates
// against the same target.

use crate::context::{EvaluationContext, FrameBinding, SymbolTable};
use crate::error::EvalResult;
use crate::instruction::Instruction;
use crate::interpreter;
use crate::remote::RemoteVm;
use crate::value::RemoteValue;
use jdwp_client::types::ThreadId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Per-thread evaluation locks
#[derive(Debug, Clone, Default)]
pub struct ThreadTable {
    locks: Arc<Mutex<HashMap<ThreadId, Arc<AsyncMutex<()>>>>>,
}

impl ThreadTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other evaluation holds `thread`, then hold it until the
    /// guard drops
    pub async fn acquire(&self, thread: ThreadId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks.entry(thread).or_default().clone()
        };
        if lock.try_lock().is_err() {
            debug!("Thread {:x} busy, waiting for the running evaluation", thread);
        }
        lock.lock_owned().await
    }
}

/// Binds evaluation contexts to suspended frames of one target
#[derive(Clone)]
pub struct Evaluator {
    vm: Arc<dyn RemoteVm>,
    threads: ThreadTable,
}

impl Evaluator {
    pub fn new(vm: Arc<dyn RemoteVm>) -> Self {
        Self::with_threads(vm, ThreadTable::new())
    }

    pub fn with_threads(vm: Arc<dyn RemoteVm>, threads: ThreadTable) -> Self {
        Self { vm, threads }
    }

    pub fn vm(&self) -> &Arc<dyn RemoteVm> {
        &self.vm
    }

    pub fn threads(&self) -> &ThreadTable {
        &self.threads
    }

    /// Bind a context to frame `depth` of a suspended thread. Waits for any
    /// evaluation already bound to the thread; the thread stays reserved
    /// until the returned context is dropped.
    pub async fn bind(&self, thread: ThreadId, depth: usize) -> EvalResult<EvaluationContext> {
        let guard = self.threads.acquire(thread).await;
        debug!("Binding frame {} of thread {:x}", depth, thread);

        let frame = self.vm.frame(thread, depth).await?;
        let variables = self.vm.variable_table(&frame.location).await?;
        let symbols = SymbolTable::from_variables(&variables, frame.location.index);

        let binding = FrameBinding::new(thread, depth, &frame);
        Ok(EvaluationContext::new(self.vm.clone(), binding, symbols).with_guard(guard))
    }

    /// Bind, run and release in one step
    pub async fn evaluate(
        &self,
        thread: ThreadId,
        depth: usize,
        instructions: &[Instruction],
        cancel: &CancellationToken,
    ) -> EvalResult<RemoteValue> {
        let ctx = self.bind(thread, depth).await?;
        interpreter::evaluate_with_cancel(instructions, &ctx, cancel).await
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator").field("threads", &self.threads).finish()
    }
}
