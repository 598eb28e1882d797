// gpkg-core/src/rollout.rs
//! Stopping the instances that run from a base link, changing the link, and
//! starting them again.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gpkg_common::component::ComponentDescriptor;
use gpkg_common::error::{GpkgError, Result};
use gpkg_common::host::{HostSelector, HostTarget};
use gpkg_common::instance::{Instance, InstanceControl, SignalOutcome, StopSignal};
use gpkg_common::options::Options;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::activation::{activate, ActivationOutcome};
use crate::Context;

/// How hard and how long to try stopping an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    /// Graceful signals sent before escalating.
    pub attempts: u32,
    pub interval: Duration,
    /// Wait after the kill signal before the final check.
    pub kill_grace: Duration,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(250),
            kill_grace: Duration::from_millis(250),
        }
    }
}

impl StopPolicy {
    /// No waiting between checks.
    pub fn immediate() -> Self {
        Self {
            interval: Duration::ZERO,
            kill_grace: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopResult {
    /// This call stopped it.
    Stopped,
    /// It was not running, or could not be signalled.
    NotRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceFailure {
    pub instance: Instance,
    pub error: String,
}

impl fmt::Display for InstanceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.instance, self.error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RolloutReport {
    pub stopped: Vec<Instance>,
    pub restarted: Vec<Instance>,
    pub stop_failures: Vec<InstanceFailure>,
    pub restart_failures: Vec<InstanceFailure>,
    pub activations: Vec<ActivationOutcome>,
    /// Set when the rollout was held back without changing anything.
    pub warning: Option<String>,
}

impl RolloutReport {
    pub fn has_failures(&self) -> bool {
        !self.stop_failures.is_empty() || !self.restart_failures.is_empty()
    }
}

/// Sends graceful then forceful signals until the instance is gone.
pub fn stop_instance(
    control: &dyn InstanceControl,
    instance: &Instance,
    policy: &StopPolicy,
) -> Result<StopResult> {
    if !control.is_running(instance)? {
        return Ok(StopResult::NotRunning);
    }

    match control.signal(instance, StopSignal::Terminate)? {
        SignalOutcome::Delivered => {}
        SignalOutcome::ProcessGone | SignalOutcome::NotPermitted => {
            return Ok(StopResult::NotRunning);
        }
    }

    for attempt in 1..=policy.attempts {
        thread::sleep(policy.interval);
        if !control.is_running(instance)? {
            debug!("{} stopped after {} checks", instance, attempt);
            return Ok(StopResult::Stopped);
        }
        if control.signal(instance, StopSignal::Terminate)? == SignalOutcome::ProcessGone {
            return Ok(StopResult::Stopped);
        }
    }

    warn!("{} ignored termination, killing it", instance);
    if control.signal(instance, StopSignal::Kill)? == SignalOutcome::ProcessGone {
        return Ok(StopResult::Stopped);
    }
    thread::sleep(policy.kill_grace);
    if control.is_running(instance)? {
        return Err(GpkgError::StopFailed(instance.to_string()));
    }
    Ok(StopResult::Stopped)
}

/// Runs changes to base links with the affected instances stopped.
pub struct RolloutCoordinator<'a> {
    ctx: &'a Context,
    control: &'a dyn InstanceControl,
    policy: StopPolicy,
}

impl<'a> RolloutCoordinator<'a> {
    pub fn new(ctx: &'a Context, control: &'a dyn InstanceControl) -> Self {
        Self {
            ctx,
            control,
            policy: StopPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: StopPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Moves the base link of `component` (every component if `None`) on the
    /// selected hosts to the version in `opts`, stopping and restarting the
    /// instances that use it when `opts.restart` is set.
    pub fn update(
        &self,
        selector: &HostSelector,
        component: Option<&ComponentDescriptor>,
        opts: &Options,
    ) -> Result<RolloutReport> {
        let hosts = self.ctx.fleet.select(selector)?;
        self.around(&hosts, component, opts, || {
            activate(self.ctx, selector, component, &opts.with_force(true))
        })
    }

    /// Applies `change` between stopping and restarting the instances bound
    /// to `opts.basename` of `component` on `hosts`.
    ///
    /// Nothing happens if any of those instances is protected and `force` is
    /// not set. Instances this call did not stop itself are never started.
    pub fn around<F>(
        &self,
        hosts: &[Arc<dyn HostTarget>],
        component: Option<&ComponentDescriptor>,
        opts: &Options,
        change: F,
    ) -> Result<RolloutReport>
    where
        F: FnOnce() -> Result<Vec<ActivationOutcome>>,
    {
        let mut report = RolloutReport::default();
        let affected = self.affected_instances(hosts, component, &opts.basename)?;
        debug!("Instances using {:?}: {:?}", opts.basename, affected);

        let protected: Vec<_> = affected.iter().filter(|i| i.protected).collect();
        if !protected.is_empty() && !opts.force {
            let names: Vec<_> = protected.iter().map(|i| i.to_string()).collect();
            report.warning = Some(format!(
                "There are one or more protected instances using {:?} ({}). Use --force to override",
                opts.basename,
                names.join(", ")
            ));
            return Ok(report);
        }

        if opts.restart {
            for instance in &affected {
                match stop_instance(self.control, instance, &self.policy) {
                    Ok(StopResult::Stopped) => {
                        info!("Stopped {}", instance);
                        report.stopped.push(instance.clone());
                    }
                    Ok(StopResult::NotRunning) => debug!("{} was not running", instance),
                    Err(e) => {
                        warn!("Could not stop {}: {}", instance, e);
                        report.stop_failures.push(InstanceFailure {
                            instance: instance.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        if !report.stop_failures.is_empty() && !opts.force {
            report.warning = Some(format!(
                "{} instance(s) could not be stopped, {:?} not changed. Use --force to override",
                report.stop_failures.len(),
                opts.basename
            ));
            self.restart(&mut report);
            return Ok(report);
        }

        match change() {
            Ok(outcomes) => report.activations = outcomes,
            Err(e) if e.is_not_exist() => {
                warn!("Nothing to update: {}", e);
                report.warning = Some(e.to_string());
            }
            Err(e) => {
                self.restart(&mut report);
                return Err(e);
            }
        }

        self.restart(&mut report);
        Ok(report)
    }

    fn restart(&self, report: &mut RolloutReport) {
        for instance in &report.stopped {
            match self.control.start(instance) {
                Ok(()) => {
                    info!("Started {}", instance);
                    report.restarted.push(instance.clone());
                }
                Err(e) => {
                    warn!("Could not start {}: {}", instance, e);
                    report.restart_failures.push(InstanceFailure {
                        instance: instance.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    fn affected_instances(
        &self,
        hosts: &[Arc<dyn HostTarget>],
        component: Option<&ComponentDescriptor>,
        basename: &str,
    ) -> Result<Vec<Instance>> {
        // the package types whose link is about to move
        let packages: Option<BTreeSet<&str>> = component.map(|c| {
            std::iter::once(c.name)
                .chain(self.ctx.registry.related_to(c).map(|r| r.name))
                .collect()
        });

        let mut affected = Vec::new();
        for host in hosts {
            for instance in self.control.instances(host.name())? {
                let uses = match &packages {
                    Some(names) => names.iter().any(|name| instance.uses(name, basename)),
                    None => instance.basename == basename,
                };
                if uses {
                    affected.push(instance);
                }
            }
        }
        Ok(affected)
    }
}
