//! RT module: world setup and the block scheduler.

// IMPORTANT: Do not call assert_invariant or any PPT logging in RT paths to avoid locks/allocs.

use crate::diag::{new_diag_queue, DiagReceiver, DiagSender, DIAG_QUEUE_CAPACITY};
use crate::pool::BufferPool;
use crate::resolve::{ProcessContext, NO_BUFFER};
use crate::rt_alloc::{RtPool, RtPoolOptions};
use crate::unit::{PvKernel, PvUnit, UnitDyn, UnitState};
use std::fmt;

/// Execution parameters fixed for the lifetime of a [`Runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldOptions {
    /// Slots in the shared pool.
    pub num_buffers: usize,
    /// Slots in the graph-local pool.
    pub num_local_buffers: usize,
    /// Try-lock attempts before a slot counts as contended.
    pub lock_attempts: u32,
    pub diag_capacity: usize,
    pub rt: RtPoolOptions,
}

impl Default for WorldOptions {
    fn default() -> Self {
        Self {
            num_buffers: 1024,
            num_local_buffers: 8,
            lock_attempts: 8,
            diag_capacity: DIAG_QUEUE_CAPACITY,
            rt: RtPoolOptions::default(),
        }
    }
}

/// Index of a unit in its runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeError {
    /// No unit with that id, or it was reaped.
    InvalidUnit,
    /// Input index past the unit's inputs.
    InvalidPort,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::InvalidUnit => write!(f, "no such unit"),
            RuntimeError::InvalidPort => write!(f, "no such input"),
        }
    }
}

impl std::error::Error for RuntimeError {}

struct Scheduled {
    unit: Box<dyn UnitDyn>,
    inputs: Vec<f32>,
    outputs: Vec<f32>,
}

/// One processing graph over a world: shared pool, local pool, real-time
/// memory and the units invoked each block in insertion order.
pub struct Runtime {
    shared: BufferPool,
    local: BufferPool,
    rt: RtPool,
    diag: DiagSender,
    units: Vec<Option<Scheduled>>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("shared", &self.shared.len())
            .field("local", &self.local.len())
            .field("units", &self.units.iter().flatten().count())
            .finish()
    }
}

impl Runtime {
    /// Build the world. Returns the runtime and the receiving end of its
    /// diagnostics channel.
    pub fn new(options: WorldOptions) -> (Self, DiagReceiver) {
        let (diag, rx) = new_diag_queue(options.diag_capacity.max(1));
        log::info!(
            "world: {} shared buffers, {} local buffers, {} rt floats",
            options.num_buffers,
            options.num_local_buffers,
            options.rt.total_floats()
        );
        let runtime = Self {
            shared: BufferPool::new(options.num_buffers, options.lock_attempts),
            local: BufferPool::new(options.num_local_buffers, options.lock_attempts),
            rt: RtPool::new(options.rt),
            diag,
            units: Vec::new(),
        };
        (runtime, rx)
    }

    pub fn shared(&self) -> &BufferPool {
        &self.shared
    }

    pub fn local(&self) -> &BufferPool {
        &self.local
    }

    pub fn rt_pool(&self) -> &RtPool {
        &self.rt
    }

    /// Register a kernel. `inputs` are its initial control values, handles
    /// first; missing handles start as [`NO_BUFFER`].
    pub fn add_unit<K: PvKernel>(&mut self, kernel: K, inputs: &[f32]) -> UnitId {
        self.add_unit_dyn(Box::new(PvUnit::new(kernel)), inputs)
    }

    pub fn add_unit_dyn(&mut self, unit: Box<dyn UnitDyn>, inputs: &[f32]) -> UnitId {
        let mut inputs = inputs.to_vec();
        let handles = unit.arity().handles();
        if inputs.len() < handles {
            inputs.resize(handles, NO_BUFFER);
        }
        let id = UnitId(self.units.len());
        log::debug!("unit {} ({}) registered", id.0, unit.name());
        self.units.push(Some(Scheduled {
            unit,
            inputs,
            outputs: vec![NO_BUFFER; 1],
        }));
        id
    }

    fn scheduled(&self, id: UnitId) -> Result<&Scheduled, RuntimeError> {
        self.units
            .get(id.0)
            .and_then(|u| u.as_ref())
            .ok_or(RuntimeError::InvalidUnit)
    }

    pub fn set_input(&mut self, id: UnitId, port: usize, value: f32) -> Result<(), RuntimeError> {
        let slot = self
            .units
            .get_mut(id.0)
            .and_then(|u| u.as_mut())
            .ok_or(RuntimeError::InvalidUnit)?;
        let input = slot
            .inputs
            .get_mut(port)
            .ok_or(RuntimeError::InvalidPort)?;
        *input = value;
        Ok(())
    }

    /// The unit's control output: echoed handle or [`NO_BUFFER`].
    pub fn output(&self, id: UnitId) -> Result<f32, RuntimeError> {
        Ok(self.scheduled(id)?.outputs[0])
    }

    pub fn unit_state(&self, id: UnitId) -> Result<UnitState, RuntimeError> {
        Ok(self.scheduled(id)?.unit.state())
    }

    /// Units that will run next block.
    pub fn active_units(&self) -> usize {
        self.units
            .iter()
            .flatten()
            .filter(|s| !s.unit.is_done())
            .count()
    }

    /// Run every unit that is not done, in insertion order.
    pub fn process_block(&mut self) {
        let mut ctx = ProcessContext {
            shared: &self.shared,
            local: &self.local,
            rt: &mut self.rt,
            diag: &mut self.diag,
        };
        for slot in self.units.iter_mut().flatten() {
            if slot.unit.is_done() {
                continue;
            }
            slot.unit.next(&mut ctx, &slot.inputs, &mut slot.outputs);
        }
    }

    /// Drop units that are done and hand their scratch back. Not RT-safe.
    pub fn reap(&mut self) -> usize {
        let mut reaped = 0;
        for entry in self.units.iter_mut() {
            if entry.as_ref().is_some_and(|s| s.unit.is_done()) {
                if let Some(mut slot) = entry.take() {
                    slot.unit.release(&mut self.rt);
                    log::info!("unit {} retired", slot.unit.name());
                    reaped += 1;
                }
            }
        }
        reaped
    }
}

/// Run process_block with panic containment.
pub fn process_block_safe(runtime: &mut Runtime) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        runtime.process_block();
    }));
    if result.is_err() {
        // Fail closed: no unit claims a buffer this block
        for slot in runtime.units.iter_mut().flatten() {
            slot.outputs.fill(NO_BUFFER);
        }
    }
}
