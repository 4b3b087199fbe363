// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebAssembly backend.
//!
//! Nodes that ship a wasm artifact run inside a wasmtime store with a
//! capability-gated host: the only import is `env.log`; memory is capped
//! through store limits and runaway guests are interrupted through epoch
//! deadlines (a background ticker advances the engine epoch).
//!
//! Guest ABI: exports `memory`, `alloc(len: i32) -> i32`, and
//! `run(ptr: i32, len: i32) -> i64` where the result packs
//! `ptr << 32 | len` of a JSON-encoded payload written to guest memory.
//! The input region holds `{"parameters": …, "input": {…}}`.

use crate::{Sandbox, SandboxHandle, SandboxSpec};
use async_trait::async_trait;
use nr_core::{
    ErrorCode, ExecutionMetrics, IsolationLevel, LogEntry, LogLevel, NodeError, Payload,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wasmtime::{Caller, Engine, Linker, Module, Store, StoreLimits, StoreLimitsBuilder};

/// Epoch tick period; one epoch unit equals this much wall clock.
const EPOCH_TICK: Duration = Duration::from_millis(10);

/// Default memory cap when the request does not set one (64 MiB).
const DEFAULT_MEMORY_CAP: u64 = 64 * 1024 * 1024;

struct HostState {
    limits: StoreLimits,
    logs: Arc<Mutex<Vec<LogEntry>>>,
    epoch: crate::EpochFn,
}

/// Wasmtime-backed sandbox. One engine for the runner's lifetime, one
/// store per execution.
pub struct WasmSandbox {
    engine: Engine,
    ticker_stop: Arc<AtomicBool>,
}

impl WasmSandbox {
    pub fn new() -> Result<Self, NodeError> {
        let mut config = wasmtime::Config::new();
        config.epoch_interruption(true);
        let engine = Engine::new(&config)
            .map_err(|e| NodeError::sandbox_crash(format!("wasm engine init failed: {e}")))?;

        // Background ticker drives epoch deadlines for every store.
        let ticker_stop = Arc::new(AtomicBool::new(false));
        let ticker_engine = engine.clone();
        let stop = Arc::clone(&ticker_stop);
        std::thread::Builder::new()
            .name("nr-wasm-epoch".into())
            .spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    std::thread::sleep(EPOCH_TICK);
                    ticker_engine.increment_epoch();
                }
            })
            .map_err(|e| NodeError::sandbox_crash(format!("wasm epoch ticker failed: {e}")))?;

        Ok(Self { engine, ticker_stop })
    }
}

impl Drop for WasmSandbox {
    fn drop(&mut self) {
        self.ticker_stop.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl Sandbox for WasmSandbox {
    fn isolation(&self) -> IsolationLevel {
        IsolationLevel::Wasm
    }

    async fn prepare(&self, spec: SandboxSpec) -> Result<Box<dyn SandboxHandle>, NodeError> {
        let artifact = spec.node.wasm_artifact().ok_or_else(|| {
            NodeError::new(
                ErrorCode::IsolationUnavailable,
                format!("node {} ships no wasm artifact", spec.request.node_type),
            )
        })?;

        let module = Module::new(&self.engine, &artifact[..])
            .map_err(|e| NodeError::validation(format!("invalid wasm module: {e}")))?;

        let memory_cap = match spec.request.runtime_config.max_memory_bytes {
            0 => DEFAULT_MEMORY_CAP,
            n => n,
        };

        let logs = Arc::new(Mutex::new(Vec::new()));
        let input_frame = serde_json::to_vec(&serde_json::json!({
            "parameters": spec.request.parameters,
            "input": spec.request.input_data,
        }))
        .map_err(|e| NodeError::sandbox_crash(format!("cannot encode guest input: {e}")))?;

        Ok(Box::new(WasmHandle {
            engine: self.engine.clone(),
            module: Some(module),
            memory_cap,
            input_frame,
            logs,
            epoch: spec.epoch,
            execution_time_ms: 0,
            memory_used: 0,
        }))
    }
}

struct WasmHandle {
    engine: Engine,
    module: Option<Module>,
    memory_cap: u64,
    input_frame: Vec<u8>,
    logs: Arc<Mutex<Vec<LogEntry>>>,
    epoch: crate::EpochFn,
    execution_time_ms: u64,
    memory_used: u64,
}

#[async_trait]
impl SandboxHandle for WasmHandle {
    async fn run(
        &mut self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Payload, NodeError> {
        let module = self
            .module
            .take()
            .ok_or_else(|| NodeError::sandbox_crash("wasm handle already consumed"))?;

        let start = Instant::now();
        let remaining = deadline.saturating_duration_since(start);
        let ticks = (remaining.as_millis() as u64 / EPOCH_TICK.as_millis() as u64).max(1) + 1;

        let engine = self.engine.clone();
        let logs = Arc::clone(&self.logs);
        let epoch = Arc::clone(&self.epoch);
        let memory_cap = self.memory_cap;
        let input_frame = std::mem::take(&mut self.input_frame);

        // Guest execution is synchronous; run it off the async worker. The
        // epoch deadline bounds the blocking task even if this future is
        // dropped by the caller's select.
        let join = tokio::task::spawn_blocking(move || {
            run_guest(&engine, &module, memory_cap, ticks, &input_frame, logs, epoch)
        });

        let result = tokio::select! {
            joined = join => match joined {
                Ok(r) => r,
                Err(e) => Err(NodeError::sandbox_crash(format!("wasm task panicked: {e}"))),
            },
            _ = cancel.cancelled() => Err(NodeError::cancelled("wasm execution abandoned")),
        };

        self.execution_time_ms = start.elapsed().as_millis() as u64;

        // A trap after the deadline elapsed is a timeout, not a crash.
        match result {
            Err(e)
                if e.code == ErrorCode::SandboxCrash
                    && Instant::now() >= deadline =>
            {
                Err(NodeError::timeout(remaining.as_millis() as u64))
            }
            other => other.map(|(payload, memory_used)| {
                self.memory_used = memory_used;
                payload
            }),
        }
    }

    fn collect_metrics(&mut self) -> ExecutionMetrics {
        ExecutionMetrics {
            execution_time_ms: self.execution_time_ms,
            memory_used_bytes: self.memory_used,
            ..Default::default()
        }
    }

    fn take_logs(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.logs.lock())
    }

    async fn dispose(&mut self) {
        self.module = None;
    }
}

type GuestResult = Result<(Payload, u64), NodeError>;

#[allow(clippy::too_many_arguments)]
fn run_guest(
    engine: &Engine,
    module: &Module,
    memory_cap: u64,
    deadline_ticks: u64,
    input_frame: &[u8],
    logs: Arc<Mutex<Vec<LogEntry>>>,
    epoch: crate::EpochFn,
) -> GuestResult {
    let state = HostState {
        limits: StoreLimitsBuilder::new()
            .memory_size(memory_cap as usize)
            .instances(1)
            .build(),
        logs,
        epoch,
    };
    let mut store = Store::new(engine, state);
    store.limiter(|s| &mut s.limits);
    store.set_epoch_deadline(deadline_ticks);

    let mut linker: Linker<HostState> = Linker::new(engine);
    linker
        .func_wrap(
            "env",
            "log",
            |mut caller: Caller<'_, HostState>, level: i32, ptr: i32, len: i32| {
                let message = read_guest_string(&mut caller, ptr, len).unwrap_or_default();
                let level = match level {
                    0 => LogLevel::Debug,
                    2 => LogLevel::Warn,
                    3 => LogLevel::Error,
                    _ => LogLevel::Info,
                };
                let at_ms = (caller.data().epoch)();
                caller.data().logs.lock().push(LogEntry::new(at_ms, level, message));
            },
        )
        .map_err(|e| NodeError::sandbox_crash(format!("wasm host link failed: {e}")))?;

    let instance = linker
        .instantiate(&mut store, module)
        .map_err(|e| NodeError::sandbox_crash(format!("wasm instantiation failed: {e}")))?;

    let memory = instance
        .get_memory(&mut store, "memory")
        .ok_or_else(|| NodeError::validation("wasm module exports no memory"))?;
    let alloc = instance
        .get_typed_func::<i32, i32>(&mut store, "alloc")
        .map_err(|e| NodeError::validation(format!("wasm module exports no alloc: {e}")))?;
    let run = instance
        .get_typed_func::<(i32, i32), i64>(&mut store, "run")
        .map_err(|e| NodeError::validation(format!("wasm module exports no run: {e}")))?;

    let input_ptr = alloc
        .call(&mut store, input_frame.len() as i32)
        .map_err(|e| NodeError::sandbox_crash(format!("wasm alloc trapped: {e}")))?;
    memory
        .write(&mut store, input_ptr as usize, input_frame)
        .map_err(|e| NodeError::sandbox_crash(format!("wasm input write failed: {e}")))?;

    let packed = run
        .call(&mut store, (input_ptr, input_frame.len() as i32))
        .map_err(|e| NodeError::sandbox_crash(format!("wasm guest trapped: {e}")))?;

    let out_ptr = (packed >> 32) as u32 as usize;
    let out_len = packed as u32 as usize;
    let mut out = vec![0u8; out_len];
    memory
        .read(&store, out_ptr, &mut out)
        .map_err(|e| NodeError::sandbox_crash(format!("wasm output read failed: {e}")))?;

    let payload: Payload = serde_json::from_slice(&out)
        .map_err(|e| NodeError::validation(format!("guest produced invalid payload: {e}")))?;

    let memory_used = memory.data_size(&store) as u64;
    Ok((payload, memory_used))
}

fn read_guest_string(
    caller: &mut Caller<'_, HostState>,
    ptr: i32,
    len: i32,
) -> Option<String> {
    let memory = caller.get_export("memory")?.into_memory()?;
    let mut buf = vec![0u8; len as usize];
    memory.read(caller, ptr as usize, &mut buf).ok()?;
    Some(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
#[path = "wasm_tests.rs"]
mod tests;
