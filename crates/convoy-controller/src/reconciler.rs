//! One reconciliation pass over every service.
//!
//! The snapshot is loaded once under the writer gate, mutated in memory
//! service by service, and saved once. Per service the sub-steps run in a
//! fixed order:
//!
//! ```text
//! drift → probe/backoff → converge → autoscale → ready count → alerts → deliver
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use convoy_alert::{
    AlertPolicy, DisabledNotifier, Notifier, NotifierCache, NotifierConfig, dispatch,
};
use convoy_autoscale::{ScaleDecision, autoscale};
use convoy_health::probe_service;
use convoy_rollout::{converge, correct_drift};
use convoy_runtime::PodRuntime;
use convoy_state::{Clock, StateStore};

use crate::error::ControllerResult;

/// Counters describing what a pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub services: usize,
    pub spawned: usize,
    pub killed: usize,
    pub restarted: usize,
    pub scaled: usize,
    pub notifications: usize,
    /// Snapshot version written at the end of the pass.
    pub version: u64,
}

enum NotifierSource {
    Fixed(Arc<dyn Notifier>),
    Configured {
        cache: NotifierCache,
        config: NotifierConfig,
    },
}

/// Runs reconciliation passes against a store and a pod runtime.
pub struct Reconciler {
    store: StateStore,
    runtime: Arc<dyn PodRuntime>,
    clock: Arc<dyn Clock>,
    alerts: AlertPolicy,
    notifier: NotifierSource,
}

impl Reconciler {
    /// A reconciler that alerts through the notifier `notifier_config`
    /// describes, built on first use.
    pub fn new(
        store: StateStore,
        runtime: Arc<dyn PodRuntime>,
        clock: Arc<dyn Clock>,
        alerts: AlertPolicy,
        notifier_config: NotifierConfig,
    ) -> Self {
        Self {
            store,
            runtime,
            clock,
            alerts,
            notifier: NotifierSource::Configured {
                cache: NotifierCache::new(),
                config: notifier_config,
            },
        }
    }

    /// Use `notifier` instead of building one from configuration.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = NotifierSource::Fixed(notifier);
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn notifier(&self) -> Arc<dyn Notifier> {
        match &self.notifier {
            NotifierSource::Fixed(n) => Arc::clone(n),
            NotifierSource::Configured { cache, config } => match cache.get(config) {
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "notifier unavailable, alerts will not be delivered");
                    Arc::new(DisabledNotifier)
                }
            },
        }
    }

    /// Run one full pass and persist the result.
    ///
    /// Holds the store's writer gate for the whole pass. On error nothing is
    /// saved; the next pass starts again from the last saved snapshot.
    pub async fn reconcile_once(&self) -> ControllerResult<PassSummary> {
        let _gate = self.store.writer().await;
        let mut snapshot = self.store.load()?;
        let now = self.clock.now_ms();
        let runtime = self.runtime.as_ref();
        let notifier = self.notifier();
        let mut summary = PassSummary::default();

        let names: Vec<String> = snapshot.services.keys().cloned().collect();
        for name in names {
            let Some(mut service) = snapshot.services.get(&name).cloned() else {
                continue;
            };
            summary.services += 1;

            let drifted = correct_drift(&mut snapshot, &service, runtime, now).await;
            let probed = probe_service(&mut snapshot, &service, runtime, now).await;
            let converged = converge(&mut snapshot, &mut service, runtime, now).await;
            let scaled = autoscale(&mut snapshot, &mut service, now);

            let ready = snapshot.ready_count(&name);
            snapshot.metrics.ready_by_service.insert(name.clone(), ready);
            let due = convoy_alert::evaluate(&mut snapshot.alerts, &service, ready, &self.alerts, now);

            snapshot.services.insert(name.clone(), service);

            summary.spawned += converged.spawned.len();
            summary.killed += drifted.len() + converged.killed.len();
            summary.restarted += probed.restarted.len();
            summary.notifications += due.len();
            if matches!(scaled, ScaleDecision::ScaleTo(_)) {
                summary.scaled += 1;
            }

            dispatch(&mut snapshot, notifier.as_ref(), due).await;
            debug!(service = %name, ready, probed = probed.probed, "service reconciled");
        }

        self.store.save(&mut snapshot)?;
        summary.version = snapshot.version;

        if summary.spawned + summary.killed + summary.restarted > 0 {
            info!(
                services = summary.services,
                spawned = summary.spawned,
                killed = summary.killed,
                restarted = summary.restarted,
                version = summary.version,
                "reconcile pass changed pods"
            );
        }
        Ok(summary)
    }
}
