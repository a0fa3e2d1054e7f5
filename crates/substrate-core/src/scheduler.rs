//! Tick scheduler: owns the tick lifecycle and the ordered hook registry.
//!
//! Each tick runs through three phases, always in this order:
//!
//! 1. **Capture** -- every stepper resets its staging buffer and may report
//!    its pre-step state.
//!
//! 2. **Compute** -- every stepper stages its next state from current state
//!    and the tick context, without publishing anything.
//!
//! 3. **Commit** -- every stepper publishes its staged state and, behind the
//!    mutation gate, writes to externally owned records.
//!
//! Within a phase, hooks run synchronously in registration order against the
//! same [`TickContext`], so mutations are visible to later hooks in the same
//! phase and to later phases. For a fixed registration sequence, base seed,
//! and input sequence the whole run is bit-for-bit reproducible.
//!
//! The `enabled` flag tells a host loop whether to drive ticks each frame.
//! It does not gate direct phase invocation.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::{TickContext, TickInput};
use crate::seed::{SeedLabel, mix_seed};
use crate::stepper::Stepper;
use crate::storage::ChunkStore;

/// One of the three tick phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Reset staging, report pre-step state.
    Capture,
    /// Stage the next state.
    Compute,
    /// Publish the staged state.
    Commit,
}

impl Phase {
    /// All phases in dispatch order.
    pub const ALL: [Self; 3] = [Self::Capture, Self::Compute, Self::Commit];

    /// Lower-case phase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Compute => "compute",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown phase name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tick phase: {name}")]
pub struct UnknownPhase {
    /// The name that failed to parse.
    pub name: String,
}

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "capture" => Ok(Self::Capture),
            "compute" => Ok(Self::Compute),
            "commit" => Ok(Self::Commit),
            other => Err(UnknownPhase {
                name: other.to_owned(),
            }),
        }
    }
}

/// Phase handlers registered with the scheduler. Every handler defaults to
/// a no-op.
pub trait TickHooks {
    /// Capture phase handler.
    fn capture(&mut self, _ctx: &mut TickContext<'_>) {}

    /// Compute phase handler.
    fn compute(&mut self, _ctx: &mut TickContext<'_>) {}

    /// Commit phase handler.
    fn commit(&mut self, _ctx: &mut TickContext<'_>) {}

    /// Dispatch `phase` to the matching handler.
    fn dispatch(&mut self, phase: Phase, ctx: &mut TickContext<'_>) {
        match phase {
            Phase::Capture => self.capture(ctx),
            Phase::Compute => self.compute(ctx),
            Phase::Commit => self.commit(ctx),
        }
    }
}

/// A shared stepper handle is a hook: the scheduler drives it while the
/// caller keeps the other handle for inspection.
impl<S: Stepper> TickHooks for Rc<RefCell<S>> {
    fn dispatch(&mut self, phase: Phase, ctx: &mut TickContext<'_>) {
        let Ok(mut stepper) = self.try_borrow_mut() else {
            warn!(%phase, "stepper is borrowed elsewhere, skipping phase");
            return;
        };
        match phase {
            Phase::Capture => stepper.capture(ctx),
            Phase::Compute => stepper.compute(ctx),
            Phase::Commit => stepper.commit(ctx),
        }
    }
}

/// Boxed phase handler closure.
pub type PhaseFn = Box<dyn FnMut(&mut TickContext<'_>)>;

/// Closure-based hooks, for ad-hoc observers and tests.
#[derive(Default)]
pub struct FnHooks {
    capture: Option<PhaseFn>,
    compute: Option<PhaseFn>,
    commit: Option<PhaseFn>,
}

impl fmt::Debug for FnHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHooks")
            .field("capture", &self.capture.is_some())
            .field("compute", &self.compute.is_some())
            .field("commit", &self.commit.is_some())
            .finish()
    }
}

impl FnHooks {
    /// Hooks with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capture handler.
    #[must_use]
    pub fn on_capture(mut self, f: impl FnMut(&mut TickContext<'_>) + 'static) -> Self {
        self.capture = Some(Box::new(f));
        self
    }

    /// Set the compute handler.
    #[must_use]
    pub fn on_compute(mut self, f: impl FnMut(&mut TickContext<'_>) + 'static) -> Self {
        self.compute = Some(Box::new(f));
        self
    }

    /// Set the commit handler.
    #[must_use]
    pub fn on_commit(mut self, f: impl FnMut(&mut TickContext<'_>) + 'static) -> Self {
        self.commit = Some(Box::new(f));
        self
    }
}

impl TickHooks for FnHooks {
    fn capture(&mut self, ctx: &mut TickContext<'_>) {
        if let Some(f) = self.capture.as_mut() {
            f(ctx);
        }
    }

    fn compute(&mut self, ctx: &mut TickContext<'_>) {
        if let Some(f) = self.compute.as_mut() {
            f(ctx);
        }
    }

    fn commit(&mut self, ctx: &mut TickContext<'_>) {
        if let Some(f) = self.commit.as_mut() {
            f(ctx);
        }
    }
}

/// Identity of one hook registration, used to unsubscribe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook#{}", self.0)
    }
}

/// Result of registering a stepper: the shared handle plus the hook id.
#[derive(Debug)]
pub struct Registration<S> {
    /// Shared handle to the registered stepper.
    pub stepper: Rc<RefCell<S>>,
    /// Hook id for [`Scheduler::unsubscribe`].
    pub hook: HookId,
}

/// Scheduler settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Whether a host loop should drive ticks each frame.
    #[serde(default)]
    pub enabled: bool,
    /// Base seed every subsystem seed is derived from.
    #[serde(default)]
    pub base_seed: u32,
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// The tick that ended.
    pub tick: u64,
    /// Hooks registered when the tick ended.
    pub hooks: usize,
    /// Phases dispatched, in order.
    pub phases: Vec<Phase>,
}

/// The tick scheduler.
#[derive(Default)]
pub struct Scheduler {
    config: SchedulerConfig,
    hooks: Vec<(HookId, Box<dyn TickHooks>)>,
    next_id: u64,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("hooks", &self.hooks.iter().map(|(id, _)| *id).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// A disabled scheduler with base seed 0 and no hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler with the given settings.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Replace the scheduler settings.
    pub fn configure(&mut self, config: SchedulerConfig) {
        info!(
            enabled = config.enabled,
            base_seed = config.base_seed,
            "scheduler configured"
        );
        self.config = config;
    }

    /// Current settings.
    pub const fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Whether a host loop should drive ticks.
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// The configured base seed.
    pub const fn base_seed(&self) -> u32 {
        self.config.base_seed
    }

    /// Derive an independent subsystem seed from the base seed.
    pub fn derive_seed<'a>(&self, label: impl Into<SeedLabel<'a>>) -> u32 {
        mix_seed(self.config.base_seed, label)
    }

    /// Register a set of phase handlers. Hooks run in registration order.
    pub fn register_hooks(&mut self, hooks: impl TickHooks + 'static) -> HookId {
        let id = HookId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.hooks.push((id, Box::new(hooks)));
        debug!(%id, registered = self.hooks.len(), "hooks registered");
        id
    }

    /// Register a stepper and return the shared handle with its hook id.
    pub fn register_stepper<S: Stepper + 'static>(&mut self, stepper: S) -> Registration<S> {
        let stepper = Rc::new(RefCell::new(stepper));
        let hook = self.register_hooks(Rc::clone(&stepper));
        info!(%hook, id = stepper.borrow().id(), "stepper registered");
        Registration { stepper, hook }
    }

    /// Remove a registration. Idempotent: returns `false` if `id` is not
    /// (or no longer) registered.
    pub fn unsubscribe(&mut self, id: HookId) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|(hook, _)| *hook != id);
        let removed = self.hooks.len() != before;
        if removed {
            debug!(%id, "hooks unsubscribed");
        }
        removed
    }

    /// Whether `id` is currently registered.
    pub fn is_registered(&self, id: HookId) -> bool {
        self.hooks.iter().any(|(hook, _)| *hook == id)
    }

    /// Number of registered hooks.
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Clear the hook registry. Storage is left untouched.
    pub fn reset(&mut self) {
        self.hooks.clear();
        debug!("scheduler reset");
    }

    /// Start a tick: build a fresh context over `store`.
    pub fn begin_tick<'a>(&self, input: TickInput<'a>, store: &'a mut ChunkStore) -> TickContext<'a> {
        debug!(tick = input.tick, "tick begin");
        TickContext::new(input, store)
    }

    /// Invoke every registered hook's handler for `phase`, in order.
    pub fn run_phase(&mut self, phase: Phase, ctx: &mut TickContext<'_>) {
        debug!(tick = ctx.tick(), %phase, hooks = self.hooks.len(), "phase dispatch");
        for (_, hooks) in &mut self.hooks {
            hooks.dispatch(phase, ctx);
        }
        ctx.record_phase(phase);
    }

    /// Finish a tick. Consumes the context so nothing can hold on to it.
    pub fn end_tick(&self, ctx: TickContext<'_>) -> TickReport {
        let report = TickReport {
            tick: ctx.tick(),
            hooks: self.hooks.len(),
            phases: ctx.phases().to_vec(),
        };
        debug!(tick = report.tick, phases = report.phases.len(), "tick end");
        report
    }

    /// Run one full tick: begin, capture, compute, commit, end.
    pub fn run_tick(&mut self, input: TickInput<'_>, store: &mut ChunkStore) -> TickReport {
        let mut ctx = self.begin_tick(input, store);
        for phase in Phase::ALL {
            self.run_phase(phase, &mut ctx);
        }
        self.end_tick(ctx)
    }
}
