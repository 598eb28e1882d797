// gpkg-common/src/instance.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::Result;

/// A configured unit of a component running from one base link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub component: String,
    pub host: String,
    /// The base link this instance runs from, e.g. `active_prod`.
    #[serde(rename = "version")]
    pub basename: String,
    /// Overrides `component` when matching against a package type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkgtype: Option<String>,
    #[serde(default)]
    pub protected: bool,
}

impl Instance {
    /// True if this instance runs from `component`'s `basename` link.
    pub fn uses(&self, component: &str, basename: &str) -> bool {
        if self.basename != basename {
            return false;
        }
        match self.pkgtype.as_deref() {
            Some(pkg) if !pkg.is_empty() => pkg == component,
            _ => self.component == component,
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}@{}\"", self.component, self.name, self.host)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Terminate,
    Kill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Delivered,
    /// The process was not running (or exited before the signal arrived).
    ProcessGone,
    NotPermitted,
}

/// The instance-management collaborator. Instance state is owned elsewhere;
/// rollouts only query it and send signals.
pub trait InstanceControl {
    /// Every configured instance on the named host.
    fn instances(&self, host: &str) -> Result<Vec<Instance>>;

    fn is_running(&self, instance: &Instance) -> Result<bool>;

    fn signal(&self, instance: &Instance, signal: StopSignal) -> Result<SignalOutcome>;

    fn start(&self, instance: &Instance) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(component: &str, basename: &str, pkgtype: Option<&str>) -> Instance {
        Instance {
            name: "one".into(),
            component: component.into(),
            host: "localhost".into(),
            basename: basename.into(),
            pkgtype: pkgtype.map(Into::into),
            protected: false,
        }
    }

    #[test]
    fn matching_uses_basename_and_component() {
        assert!(instance("gateway", "active_prod", None).uses("gateway", "active_prod"));
        assert!(!instance("gateway", "active_dev", None).uses("gateway", "active_prod"));
        assert!(!instance("netprobe", "active_prod", None).uses("gateway", "active_prod"));
    }

    #[test]
    fn pkgtype_overrides_component() {
        let san = instance("san", "active_prod", Some("fa2"));
        assert!(san.uses("fa2", "active_prod"));
        assert!(!san.uses("san", "active_prod"));
        assert!(instance("san", "active_prod", Some("")).uses("san", "active_prod"));
    }

    #[test]
    fn deserializes_instance_config() {
        let json = r#"{"name":"probe1","component":"netprobe","host":"localhost","version":"active_dev","protected":true}"#;
        let inst: Instance = serde_json::from_str(json).unwrap();
        assert_eq!(inst.basename, "active_dev");
        assert!(inst.protected);
        assert!(inst.pkgtype.is_none());
    }
}
