/* 📖 # Why an AttributeService facade?

Capabilities and the umask are process-wide facts that must be captured once: the
symlink probe may be slow, and reading the umask is only safe at a well-defined
point. The service captures both when it is built and hands them to the resolver
and mutator on every call, so callers only deal with paths and attributes.
*/

use std::path::Path;

use fileattr_base::{FileattrError, FileattrResult, PalHandle, Platform, RealPal, ResultExt};
use tracing::{debug, info, instrument};

use crate::capability::{Attributes, CapabilitySet, capabilities_for, host_capabilities};
use crate::config::AttributesConfig;
use crate::file_info::FileInfo;
use crate::mutator::{self, AttributeChange, AttributeDelta};
use crate::resolver::resolve_and_stat;

/// Reads and changes file attributes through one PAL.
#[derive(Debug, Clone)]
pub struct AttributeService {
    pal: PalHandle,
    capabilities: CapabilitySet,
    umask: u32,
}

impl AttributeService {
    /// Builds a service, probing symlink support and the umask through `pal`.
    pub fn new(pal: PalHandle, config: &AttributesConfig) -> FileattrResult<Self> {
        let capabilities =
            capabilities_for(pal.platform()).with_symlinks(pal.probe_symlink_support());
        Self::with_capabilities(pal, capabilities, config)
    }

    /// Builds a service for the host filesystem using the process-wide capabilities.
    pub fn for_host(config: &AttributesConfig) -> FileattrResult<Self> {
        Self::with_capabilities(PalHandle::new(RealPal::new()), *host_capabilities(), config)
    }

    fn with_capabilities(
        pal: PalHandle,
        capabilities: CapabilitySet,
        config: &AttributesConfig,
    ) -> FileattrResult<Self> {
        let capabilities = if config.resolve_symlinks {
            capabilities
        } else {
            capabilities.with_symlinks(false)
        };
        let umask = match config.umask {
            Some(mask) => mask,
            None => pal.umask().context("capturing the process umask")?,
        };
        info!(
            platform = %capabilities.platform,
            reportable = ?capabilities.reportable,
            settable = ?capabilities.settable,
            umask = %format!("{:03o}", umask),
            "attribute service ready"
        );
        Ok(Self {
            pal,
            capabilities,
            umask,
        })
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn platform(&self) -> Platform {
        self.capabilities.platform
    }

    pub fn umask(&self) -> u32 {
        self.umask
    }

    /// Current snapshot of `path`. A missing path is `exists = false`, not an error.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn fetch_info(&self, path: &Path) -> FileattrResult<FileInfo> {
        resolve_and_stat(&*self.pal, &self.capabilities, path)
    }

    /// Brings the attributes of `path` (or its link target) to `desired`.
    ///
    /// Attributes the platform cannot set are ignored. Returns the operations that
    /// were issued, empty when nothing had to change.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn apply(&self, path: &Path, desired: Attributes) -> FileattrResult<AttributeDelta> {
        let delta = mutator::apply(&*self.pal, &self.capabilities, self.umask, path, desired)?;
        debug!(ops = delta.len(), "attributes applied");
        Ok(delta)
    }

    /// Changes only the attributes named in `change`, keeping the others.
    pub fn update(&self, path: &Path, change: &AttributeChange) -> FileattrResult<AttributeDelta> {
        let info = self
            .fetch_info(path)
            .context("reading current attributes")?;
        if !info.exists() {
            return Err(Box::new(FileattrError::stat(
                path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )));
        }
        self.apply(path, change.merge_into(info.attributes()))
    }

    /// Sets the last-modified time of `path`, in milliseconds since the Unix epoch.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn set_last_modified(&self, path: &Path, millis: i64) -> FileattrResult<()> {
        self.pal.set_modified(path, millis).map_err(|e| {
            Box::new(FileattrError::mutation(
                path,
                format!("set modified time {}", millis),
                vec![],
                e,
            ))
        })
    }
}
