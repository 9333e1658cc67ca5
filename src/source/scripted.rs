use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::history::HistoryBuffer;
use crate::types::{Reading, Zone};
use super::ReadingSource;

/// One scripted step
#[derive(Debug, Clone)]
pub enum Step {
    Value(f64),
    Fail(String),
    /// Sleep before yielding the value, to emulate a slow sensor
    Delayed(Duration, f64),
}

/// Replays a fixed sequence of readings, independent of the zone.
///
/// Running past the end of the script is reported as a source failure.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self { steps: steps.into_iter().collect() }
    }

    pub fn values(values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(values.into_iter().map(Step::Value))
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

#[async_trait]
impl ReadingSource for ScriptedSource {
    fn name(&self) -> &str { "scripted" }

    async fn next_reading(&mut self, _zone: &Zone, _history: &HistoryBuffer) -> Result<Reading> {
        match self.steps.pop_front() {
            Some(Step::Value(v)) => Ok(Reading::new(v)),
            Some(Step::Fail(reason)) => Err(anyhow!(reason)),
            Some(Step::Delayed(delay, v)) => {
                tokio::time::sleep(delay).await;
                Ok(Reading::new(v))
            }
            None => Err(anyhow!("script exhausted")),
        }
    }
}
