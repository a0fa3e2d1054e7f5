//! Config-driven runtime manager for host render/update loops.
//!
//! The scheduler's `enabled` flag decides whether a host loop participates:
//! while it is set and the runtime mode is `rule110`, the manager keeps one
//! Rule 110 stepper registered and [`RuntimeManager::frame`] drives one full
//! tick per call. Direct phase invocation through [`RuntimeManager::scheduler_mut`]
//! is never gated by the flag.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;
use substrate_automaton::{InitOptions, Initializer, Rule110Options, Rule110Snapshot, Rule110Stepper};
use substrate_core::config::{RuntimeMode, SubstrateConfig};
use substrate_core::context::TickInput;
use substrate_core::scheduler::{Registration, Scheduler, TickReport};
use substrate_core::snapshot::{Callbacks, Snapshot};
use substrate_core::storage::{ChunkMeta, ChunkOptions, ChunkStore};
use substrate_overlay::{OverlayStore, SharedOverlay, sink};
use tracing::{debug, info, warn};

/// Normalized Rule 110 settings. A stepper is rebuilt only when these
/// change.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule110Spec {
    /// Width after clamping.
    pub width: usize,
    /// Resolved initializer.
    pub initializer: Initializer,
    /// Initializer parameters.
    pub options: InitOptions,
    /// Chunk key of the current row.
    pub state_key: String,
    /// Chunk key of the staged row.
    pub buffer_key: String,
}

impl Rule110Spec {
    /// Normalize the `rule110` section of `config`.
    pub fn from_config(config: &SubstrateConfig) -> Self {
        let rule110 = &config.rule110;
        Self {
            width: rule110.clamped_width(),
            initializer: Initializer::resolve(&rule110.initializer),
            options: InitOptions {
                phase: rule110.phase,
                offset: rule110.offset,
                seed: rule110.random_seed,
                density: rule110.clamped_density(),
            },
            state_key: rule110.state_key.clone(),
            buffer_key: rule110.buffer_key.clone(),
        }
    }
}

type LatestCapture = Rc<RefCell<Option<Rule110Snapshot>>>;

#[derive(Debug)]
struct ActiveStepper {
    spec: Rule110Spec,
    registration: Registration<Rule110Stepper>,
    latest_capture: LatestCapture,
}

/// Keeps the runtime stepper in line with configuration and drives frames.
#[derive(Debug)]
pub struct RuntimeManager {
    scheduler: Scheduler,
    store: ChunkStore,
    config: SubstrateConfig,
    overlay: SharedOverlay,
    active: Option<ActiveStepper>,
}

impl Default for RuntimeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeManager {
    /// A manager with default configuration and nothing registered.
    pub fn new() -> Self {
        let config = SubstrateConfig::default();
        Self {
            scheduler: Scheduler::with_config(config.scheduler),
            store: ChunkStore::new(),
            overlay: OverlayStore::shared(config.overlay.clone()),
            config,
            active: None,
        }
    }

    /// Reconcile with `config`: tear down, keep, or (re)build the runtime
    /// stepper.
    pub fn apply(&mut self, config: SubstrateConfig) {
        self.scheduler.configure(config.scheduler);
        match self.overlay.try_borrow_mut() {
            Ok(mut overlay) => overlay.configure(config.overlay.clone()),
            Err(_) => warn!("overlay busy, configuration not applied"),
        }

        let wanted = config.scheduler.enabled && config.runtime.mode == RuntimeMode::Rule110;
        if wanted {
            let spec = Rule110Spec::from_config(&config);
            if self.active.as_ref().is_some_and(|active| active.spec == spec) {
                debug!("rule 110 runtime unchanged");
            } else {
                self.teardown();
                self.activate(spec);
            }
        } else {
            self.teardown();
        }
        self.config = config;
    }

    fn activate(&mut self, spec: Rule110Spec) {
        let latest_capture: LatestCapture = Rc::new(RefCell::new(None));
        let capture_slot = Rc::clone(&latest_capture);
        let mut overlay_capture = sink::<Rule110Snapshot>(&self.overlay);
        let options = Rule110Options {
            width: spec.width,
            state_key: spec.state_key.clone(),
            buffer_key: spec.buffer_key.clone(),
            initializer: spec.initializer,
            init: spec.options,
            initialize: true,
            callbacks: Callbacks::<Rule110Snapshot>::default().with_capture(move |event| {
                *capture_slot.borrow_mut() = Some(event.snapshot.clone());
                overlay_capture(event);
            }),
            ..Rule110Options::default()
        };
        let registration = Rule110Stepper::register(&mut self.scheduler, &mut self.store, options);
        info!(
            width = spec.width,
            initializer = spec.initializer.name(),
            hook = %registration.hook,
            "rule 110 runtime activated"
        );
        self.active = Some(ActiveStepper {
            spec,
            registration,
            latest_capture,
        });
    }

    fn teardown(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        if self.scheduler.unsubscribe(active.registration.hook) {
            info!(hook = %active.registration.hook, "rule 110 runtime torn down");
        } else {
            warn!(hook = %active.registration.hook, "runtime hook was already unsubscribed");
        }
    }

    /// Drive one full tick if the host loop participates. Returns `None`
    /// when the scheduler is disabled or no stepper is active.
    pub fn frame(&mut self, input: TickInput<'_>) -> Option<TickReport> {
        if !self.scheduler.is_enabled() {
            return None;
        }
        let latest_capture = Rc::clone(&self.active.as_ref()?.latest_capture);
        let report = self.scheduler.run_tick(input, &mut self.store);
        let captured = latest_capture.take();
        if self.config.snapshots.rule110_capture
            && let Some(snapshot) = captured
        {
            let mut meta = ChunkMeta::new();
            meta.insert("manifest".to_owned(), Value::from(snapshot.kind()));
            self.store.set_chunk(
                self.config.rule110.snapshot_key.clone(),
                snapshot,
                ChunkOptions::dirty().with_meta(meta),
            );
        }
        Some(report)
    }

    /// Whether a runtime stepper is registered.
    pub const fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Spec of the active stepper.
    pub fn active_spec(&self) -> Option<&Rule110Spec> {
        self.active.as_ref().map(|active| &active.spec)
    }

    /// The active stepper, if any.
    pub fn stepper(&self) -> Option<Rc<RefCell<Rule110Stepper>>> {
        self.active.as_ref().map(|active| Rc::clone(&active.registration.stepper))
    }

    /// The chunk store.
    pub const fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// The scheduler, for direct phase invocation.
    pub const fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// The overlay fed by the runtime stepper.
    pub fn overlay(&self) -> SharedOverlay {
        Rc::clone(&self.overlay)
    }

    /// Last applied configuration.
    pub const fn config(&self) -> &SubstrateConfig {
        &self.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use substrate_core::config::RuntimeConfig;
    use substrate_core::scheduler::SchedulerConfig;

    use super::*;

    fn rule110_config(width: u32) -> SubstrateConfig {
        let mut config = SubstrateConfig {
            scheduler: SchedulerConfig {
                enabled: true,
                base_seed: 0,
            },
            runtime: RuntimeConfig {
                mode: RuntimeMode::Rule110,
            },
            ..SubstrateConfig::default()
        };
        config.rule110.width = width;
        config
    }

    #[test]
    fn disabled_scheduler_runs_nothing() {
        let mut manager = RuntimeManager::new();
        manager.apply(SubstrateConfig::default());
        assert!(!manager.is_active());
        assert!(manager.frame(TickInput::new(0)).is_none());
    }

    #[test]
    fn enabling_registers_and_frames_tick() {
        let mut manager = RuntimeManager::new();
        manager.apply(rule110_config(2));
        assert_eq!(manager.active_spec().map(|spec| spec.width), Some(8));
        let report = manager.frame(TickInput::new(0)).unwrap();
        assert_eq!(report.hooks, 1);
        assert_eq!(report.phases.len(), 3);
    }

    #[test]
    fn unchanged_spec_keeps_the_stepper() {
        let mut manager = RuntimeManager::new();
        manager.apply(rule110_config(64));
        let first = manager.stepper().unwrap();
        let mut config = rule110_config(64);
        config.logging.level = "debug".to_owned();
        manager.apply(config);
        assert!(Rc::ptr_eq(&first, &manager.stepper().unwrap()));

        manager.apply(rule110_config(65));
        assert!(!Rc::ptr_eq(&first, &manager.stepper().unwrap()));
        assert_eq!(manager.scheduler_mut().hook_count(), 1);
    }

    #[test]
    fn disabling_tears_down() {
        let mut manager = RuntimeManager::new();
        manager.apply(rule110_config(64));
        let mut config = rule110_config(64);
        config.scheduler.enabled = false;
        manager.apply(config);
        assert!(!manager.is_active());
        assert_eq!(manager.scheduler_mut().hook_count(), 0);
    }

    #[test]
    fn externally_unsubscribed_hooks_do_not_abort_teardown() {
        let mut manager = RuntimeManager::new();
        manager.apply(rule110_config(64));
        manager.scheduler_mut().reset();
        manager.apply(SubstrateConfig::default());
        assert!(!manager.is_active());
    }

    #[test]
    fn captured_snapshots_land_in_the_store() {
        let mut manager = RuntimeManager::new();
        let mut config = rule110_config(32);
        config.snapshots.rule110_capture = true;
        config.overlay.enabled = true;
        manager.apply(config);
        manager.frame(TickInput::new(0));
        manager.frame(TickInput::new(1));

        let key = "tc.rule110.snapshot";
        let snapshot = manager.store().get_chunk::<Rule110Snapshot>(key).unwrap();
        assert_eq!(snapshot.tick, 1);
        assert!(manager.store().is_dirty(key));
        assert_eq!(
            manager.store().meta(key).and_then(|meta| meta.get("manifest")).and_then(Value::as_str),
            Some("tc.rule110.snapshot")
        );
        assert_eq!(manager.overlay().borrow().len(), 2);
    }
}
