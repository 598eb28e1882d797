// gpkg-common/src/component.rs
use std::fmt;

use super::error::{GpkgError, Result};

/// How the leading directory of each archive entry is removed during unpacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripRule {
    /// Entries are already relative to the version directory.
    Nothing,
    /// Entries live under `<prefix>/`.
    Prefix(&'static str),
    /// Entries live under `<component name>/`.
    ComponentName,
}

/// Names a component is known by on each download backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadNames {
    /// Path segment under the vendor resources URL.
    pub resources: &'static str,
    /// Maven artifact id on Nexus.
    pub nexus: &'static str,
}

/// Static metadata describing one product component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    /// Components whose packages this one runs from. Activation of a component
    /// with related types is delegated to each of them.
    pub related: &'static [&'static str],
    pub downloads: DownloadNames,
    /// The component name as it appears in release archive filenames.
    pub archive_name: &'static str,
    pub strip: StripRule,
}

impl ComponentDescriptor {
    /// Strips the component-specific leading path from an archive entry name.
    pub fn strip_entry<'a>(&self, name: &'a str) -> &'a str {
        match self.strip {
            StripRule::Nothing => name,
            StripRule::Prefix(prefix) => name.strip_prefix(prefix).unwrap_or(name),
            StripRule::ComponentName => name
                .strip_prefix(self.name)
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(name),
        }
    }

    /// True if a download filename belongs to this component.
    pub fn matches_archive(&self, filename: &str) -> bool {
        filename.contains(self.archive_name)
    }

    pub fn has_related(&self) -> bool {
        !self.related.is_empty()
    }

    fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// The fixed table of components, constructed once and handed to whatever
/// needs it.
#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    components: Vec<ComponentDescriptor>,
}

impl ComponentRegistry {
    pub fn new(components: Vec<ComponentDescriptor>) -> Self {
        Self { components }
    }

    pub fn standard() -> Self {
        Self::new(vec![
            ComponentDescriptor {
                name: "gateway",
                aliases: &["gateways", "gw"],
                related: &[],
                downloads: DownloadNames {
                    resources: "geneos-gateway",
                    nexus: "geneos-gateway",
                },
                archive_name: "gateway",
                strip: StripRule::ComponentName,
            },
            ComponentDescriptor {
                name: "netprobe",
                aliases: &["netprobes", "probe", "probes"],
                related: &[],
                downloads: DownloadNames {
                    resources: "geneos-netprobe",
                    nexus: "geneos-netprobe",
                },
                archive_name: "netprobe",
                strip: StripRule::ComponentName,
            },
            ComponentDescriptor {
                name: "licd",
                aliases: &["licds"],
                related: &[],
                downloads: DownloadNames {
                    resources: "geneos-licd",
                    nexus: "geneos-licd",
                },
                archive_name: "licd",
                strip: StripRule::ComponentName,
            },
            ComponentDescriptor {
                name: "webserver",
                aliases: &["webservers", "webdashboard", "dashboards"],
                related: &[],
                downloads: DownloadNames {
                    resources: "geneos-web-server",
                    nexus: "geneos-web-server",
                },
                archive_name: "web-server",
                strip: StripRule::Nothing,
            },
            ComponentDescriptor {
                name: "fa2",
                aliases: &["fixanalyser", "fixanalyzer", "fixanalyser2-netprobe"],
                related: &[],
                downloads: DownloadNames {
                    resources: "fixanalyser2-netprobe",
                    nexus: "geneos-fixanalyser2-netprobe",
                },
                archive_name: "fixanalyser2-netprobe",
                strip: StripRule::Prefix("fix-analyser2/"),
            },
            ComponentDescriptor {
                name: "fileagent",
                aliases: &["fileagents", "file-agent"],
                related: &[],
                downloads: DownloadNames {
                    resources: "geneos-file-agent",
                    nexus: "geneos-file-agent",
                },
                archive_name: "file-agent",
                strip: StripRule::Prefix("agent/"),
            },
            ComponentDescriptor {
                name: "san",
                aliases: &["sans"],
                related: &["netprobe", "fa2"],
                downloads: DownloadNames {
                    resources: "geneos-netprobe",
                    nexus: "geneos-netprobe",
                },
                archive_name: "netprobe",
                strip: StripRule::ComponentName,
            },
            ComponentDescriptor {
                name: "floating",
                aliases: &["float", "floatings"],
                related: &["netprobe", "fa2"],
                downloads: DownloadNames {
                    resources: "geneos-netprobe",
                    nexus: "geneos-netprobe",
                },
                archive_name: "netprobe",
                strip: StripRule::ComponentName,
            },
        ])
    }

    /// Looks up a component by canonical name or alias, ignoring case.
    pub fn get(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.components.iter().find(|c| c.answers_to(name))
    }

    pub fn require(&self, name: &str) -> Result<&ComponentDescriptor> {
        self.get(name)
            .ok_or_else(|| GpkgError::InvalidArgs(format!("unknown component type {name:?}")))
    }

    /// Maps the component fragment of a release archive filename (such as
    /// `web-server`) back to its component. Components whose archives are
    /// shared with another (san, floating) are never returned.
    pub fn from_archive_name(&self, fragment: &str) -> Option<&ComponentDescriptor> {
        self.components
            .iter()
            .filter(|c| !c.has_related())
            .find(|c| c.archive_name == fragment || c.answers_to(fragment))
    }

    pub fn all(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.components.iter()
    }

    /// Every component that owns its own package directory.
    pub fn packaged(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.components.iter().filter(|c| !c.has_related())
    }

    /// Resolves the related components of `component`, skipping unknown names.
    pub fn related_to<'a>(
        &'a self,
        component: &'a ComponentDescriptor,
    ) -> impl Iterator<Item = &'a ComponentDescriptor> + 'a {
        component.related.iter().filter_map(|name| self.get(name))
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
