use crate::detection::DetectionSample;
use crate::error::{OwlwatchError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info};

/// Where per-cycle detection samples come from
#[async_trait]
pub trait SampleSource: Send {
    /// Samples for the next cycle, one per camera. `None` once exhausted.
    async fn next_cycle(&mut self) -> Result<Option<Vec<DetectionSample>>>;
}

/// Replays a file holding one JSON array of samples per line
pub struct JsonLinesSampleSource {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_number: usize,
}

impl JsonLinesSampleSource {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|e| {
            OwlwatchError::component(
                "sample_source".to_string(),
                format!("Failed to open {}: {}", path.display(), e),
            )
        })?;

        info!("Replaying detection samples from {}", path.display());
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line_number: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SampleSource for JsonLinesSampleSource {
    async fn next_cycle(&mut self) -> Result<Option<Vec<DetectionSample>>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_number += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let samples: Vec<DetectionSample> = serde_json::from_str(line).map_err(|e| {
                OwlwatchError::component(
                    "sample_source".to_string(),
                    format!("{}:{}: {}", self.path.display(), self.line_number, e),
                )
            })?;
            debug!(
                "Read {} samples from line {}",
                samples.len(),
                self.line_number
            );
            return Ok(Some(samples));
        }

        Ok(None)
    }
}

/// In-memory source, mostly for tests and tooling
#[derive(Debug, Default)]
pub struct StaticSampleSource {
    cycles: VecDeque<Vec<DetectionSample>>,
}

impl StaticSampleSource {
    pub fn new(cycles: Vec<Vec<DetectionSample>>) -> Self {
        Self {
            cycles: cycles.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.cycles.len()
    }
}

#[async_trait]
impl SampleSource for StaticSampleSource {
    async fn next_cycle(&mut self) -> Result<Option<Vec<DetectionSample>>> {
        Ok(self.cycles.pop_front())
    }
}
