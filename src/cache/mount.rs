//! Cache mount descriptors
//!
//! Turns configured cache options into the `--mount=type=cache,...` fragment
//! understood by BuildKit. Everything here is pure.

use crate::cache::job::{slugify, MAX_SLUG_LEN};
use crate::config::CacheOptions;
use crate::error::{DanceError, DanceResult};
use std::fmt;
use std::path::PathBuf;

/// BuildKit cache sharing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sharing {
    Shared,
    Private,
    Locked,
}

impl Sharing {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "shared" => Some(Self::Shared),
            "private" => Some(Self::Private),
            "locked" => Some(Self::Locked),
            _ => None,
        }
    }
}

impl fmt::Display for Sharing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Private => write!(f, "private"),
            Self::Locked => write!(f, "locked"),
        }
    }
}

/// Read-only and sharing flags of a mount
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MountMode {
    pub readonly: bool,
    pub sharing: Option<Sharing>,
}

/// Ownership restored after inject
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    pub uid: Option<String>,
    pub gid: Option<String>,
}

/// A cache mount to move in or out of BuildKit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMount {
    /// Durable directory on the host
    pub source: PathBuf,
    /// Path where the cache is visible inside the build
    pub target: String,
    /// BuildKit cache id
    pub id: Option<String>,
    pub mode: Option<MountMode>,
    pub ownership: Option<Ownership>,
}

impl CacheMount {
    /// Build a validated mount from its configured options
    pub fn from_options(source: &str, options: &CacheOptions) -> DanceResult<Self> {
        if source.trim().is_empty() {
            return Err(DanceError::config(source, "cache source must not be empty"));
        }

        let mount = match options {
            CacheOptions::Target(target) => Self {
                source: PathBuf::from(source),
                target: target.clone(),
                id: None,
                mode: None,
                ownership: None,
            },
            CacheOptions::Detailed(opts) => {
                let sharing = match opts.sharing.as_deref() {
                    None => None,
                    Some(s) => Some(Sharing::parse(s).ok_or_else(|| {
                        DanceError::config(
                            source,
                            format!("sharing must be shared, private or locked, got '{}'", s),
                        )
                    })?),
                };
                let mode = (opts.readonly || sharing.is_some()).then_some(MountMode {
                    readonly: opts.readonly,
                    sharing,
                });
                let ownership = (opts.uid.is_some() || opts.gid.is_some()).then(|| Ownership {
                    uid: opts.uid.clone(),
                    gid: opts.gid.clone(),
                });

                Self {
                    source: PathBuf::from(source),
                    target: opts.target.clone(),
                    id: opts.id.clone(),
                    mode,
                    ownership,
                }
            }
        };

        mount.validate()?;
        Ok(mount)
    }

    fn validate(&self) -> DanceResult<()> {
        let source = self.source.display().to_string();

        if !self.target.starts_with('/') {
            return Err(DanceError::config(
                &source,
                format!("target '{}' must be an absolute path", self.target),
            ));
        }
        if !is_fragment_safe(&self.target) {
            return Err(DanceError::config(
                &source,
                format!("target '{}' contains unsupported characters", self.target),
            ));
        }
        if let Some(id) = &self.id {
            if id.is_empty() || !is_fragment_safe(id) {
                return Err(DanceError::config(&source, format!("invalid cache id '{}'", id)));
            }
        }
        for (field, value) in [("uid", self.uid()), ("gid", self.gid())] {
            if !value.chars().all(|c| c.is_ascii_digit()) {
                return Err(DanceError::config(
                    &source,
                    format!("{} must be numeric, got '{}'", field, value),
                ));
            }
        }
        Ok(())
    }

    /// Path where this mount's data is visible inside the build
    pub fn target_path(&self) -> &str {
        &self.target
    }

    /// Render the value of a `--mount=` flag for this cache
    pub fn mount_args(&self) -> String {
        let mut args = vec!["type=cache".to_string(), format!("target={}", self.target)];

        if let Some(id) = &self.id {
            args.push(format!("id={}", id));
        }
        if let Some(mode) = &self.mode {
            if let Some(sharing) = mode.sharing {
                args.push(format!("sharing={}", sharing));
            }
            if mode.readonly {
                args.push("readonly".to_string());
            }
        }
        if !self.uid().is_empty() {
            args.push(format!("uid={}", self.uid()));
        }
        if !self.gid().is_empty() {
            args.push(format!("gid={}", self.gid()));
        }

        args.join(",")
    }

    /// Owner uid, empty when unset
    pub fn uid(&self) -> &str {
        self.ownership
            .as_ref()
            .and_then(|o| o.uid.as_deref())
            .unwrap_or("")
    }

    /// Owner gid, empty when unset
    pub fn gid(&self) -> &str {
        self.ownership
            .as_ref()
            .and_then(|o| o.gid.as_deref())
            .unwrap_or("")
    }

    /// Directory name used for this mount inside a batch staging area
    pub fn staging_key(&self) -> String {
        let key = slugify(self.id.as_deref().unwrap_or(&self.target), MAX_SLUG_LEN);
        if key.is_empty() {
            "cache".to_string()
        } else {
            key
        }
    }
}

/// Characters that would split a mount fragment or a shell word
fn is_fragment_safe(value: &str) -> bool {
    !value.is_empty()
        && !value
            .chars()
            .any(|c| c == ',' || c == '=' || c == '"' || c == '\'' || c.is_whitespace())
}
