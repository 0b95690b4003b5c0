use crate::device::PowerControl;
use anyhow::Context;

/// Powers the host off by spawning a configured command (e.g. `sudo /sbin/shutdown -h now`).
#[derive(Debug, Clone)]
pub struct SystemPower {
    program: String,
    args: Vec<String>,
}

impl SystemPower {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_settings(settings: &crate::config::Settings) -> anyhow::Result<Self> {
        let (program, args) = settings.require_poweroff_command()?;
        Ok(Self::new(program, args.to_vec()))
    }
}

#[async_trait::async_trait]
impl PowerControl for SystemPower {
    async fn power_off(&self) -> anyhow::Result<()> {
        tracing::info!(program = %self.program, args = ?self.args, "invoking power-off");
        // Not awaited: the host is going down underneath us.
        tokio::process::Command::new(&self.program)
            .args(&self.args)
            .spawn()
            .with_context(|| format!("failed to spawn power-off command {}", self.program))?;
        Ok(())
    }
}
