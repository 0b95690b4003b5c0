use crate::device::layout::PanelLayout;
use crate::device::DisplayPanel;
use crate::domain::quote::Snapshot;
use crate::domain::ratio::Ratio;
use anyhow::Context;
use std::path::PathBuf;

/// Text-frame panel: each rendered frame replaces the contents of `path`.
#[derive(Debug)]
pub struct FramePanel {
    path: PathBuf,
    layout: PanelLayout,
    awake: bool,
}

impl FramePanel {
    pub fn new(path: impl Into<PathBuf>, layout: PanelLayout) -> Self {
        Self {
            path: path.into(),
            layout,
            awake: false,
        }
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }
}

#[async_trait::async_trait]
impl DisplayPanel for FramePanel {
    async fn init(&mut self) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create panel dir {}", dir.display()))?;
        }
        self.awake = true;
        tracing::debug!(path = %self.path.display(), "panel awake");
        Ok(())
    }

    async fn render(
        &mut self,
        snapshot: &Snapshot,
        ratios: &[Ratio],
        footer: &str,
    ) -> anyhow::Result<()> {
        anyhow::ensure!(self.awake, "panel is asleep; init before rendering");

        let lines = self.layout.lines(snapshot, ratios, footer);
        for line in &lines {
            tracing::info!(%line, "panel");
        }

        let mut frame = lines.join("\n");
        frame.push('\n');
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, frame)
            .await
            .with_context(|| format!("failed to write frame to {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("failed to publish frame to {}", self.path.display()))?;
        Ok(())
    }

    async fn sleep(&mut self) -> anyhow::Result<()> {
        self.awake = false;
        tracing::debug!(path = %self.path.display(), "panel asleep");
        Ok(())
    }
}
