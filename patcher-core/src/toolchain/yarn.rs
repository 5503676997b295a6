//! Yarn provisioner.
//!
//! Yarn 1.x ships as a plain JavaScript bundle, so "installing" it is just
//! extracting the release tarball and running `bin/yarn.js` under node.

use anyhow::Result;
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::PathBuf;

use super::extractor::extract_archive_async;
use super::process::{self, CommandSpec};
use super::provisioner::{ProgressFn, ProvisionContext, Provisioner};
use super::types::{Pin, ToolId, YarnExec};

const YARN_VERSION: &str = "v1.22.19";
const YARN_URL: &str =
    "https://github.com/yarnpkg/yarn/releases/download/v1.22.19/yarn-v1.22.19.tar.gz";
const YARN_ARCHIVE: &str = "yarn-v1.22.19.tar.gz";
const YARN_SHA256: &str = "732620bac8b1690d507274f025f3c6cfdc3627a84d9642e38a07452cc00e0f2e";

impl YarnExec {
    /// Builds a command running yarn with `args`.
    ///
    /// Scripts run through the `node` found on `PATH`.
    pub fn command<I, S>(&self, args: I) -> Result<CommandSpec>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let spec = match self {
            Self::Script(script) => {
                let node = process::which("node").ok_or_else(|| {
                    anyhow::anyhow!("node is required to run {}", script.display())
                })?;
                CommandSpec::new(node).arg(script)
            }
            Self::Binary(binary) => CommandSpec::new(binary),
        };
        Ok(spec.args(args))
    }
}

/// Provisions the pinned yarn release.
pub struct YarnProvisioner {
    ctx: ProvisionContext,
}

impl YarnProvisioner {
    pub fn new(ctx: ProvisionContext) -> Self {
        Self { ctx }
    }

    /// `yarn.js` inside the extracted release.
    fn script_path(&self) -> PathBuf {
        self.ctx
            .extract_dir(YARN_ARCHIVE)
            .join(format!("yarn-{}", YARN_VERSION))
            .join("bin")
            .join("yarn.js")
    }
}

#[async_trait]
impl Provisioner for YarnProvisioner {
    type Output = YarnExec;

    fn tool_id(&self) -> ToolId {
        ToolId::Yarn
    }

    async fn locate(&self) -> Option<YarnExec> {
        let script = self.script_path();
        if script.exists() {
            return Some(YarnExec::Script(script));
        }
        process::which("yarn").map(YarnExec::Binary)
    }

    async fn install(&self, progress: &ProgressFn) -> Result<YarnExec> {
        let archive = self
            .ctx
            .fetch_cached(YARN_URL, YARN_ARCHIVE, Pin::Exact(YARN_SHA256), progress)
            .await?;
        extract_archive_async(&archive, &self.ctx.extract_dir(YARN_ARCHIVE)).await?;

        let script = self.script_path();
        if !script.exists() {
            anyhow::bail!("yarn.js not found at {}", script.display());
        }

        self.ctx.record(ToolId::Yarn, YARN_VERSION, &script);
        Ok(YarnExec::Script(script))
    }
}
