//! Execution trace of a kernel: which core got which block when, and
//! optionally the pipeline stages of every core on every cycle.

use serde::Serialize;

use crate::processor::sched::{ContextTag, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Dispatch {
        cycle: u64,
        core: usize,
        block_id: u8,
        thread_count: u8,
    },
    Complete {
        cycle: u64,
        core: usize,
        block_id: u8,
    },
    KernelDone {
        cycle: u64,
    },
}

impl Event {
    pub fn cycle(&self) -> u64 {
        match *self {
            Event::Dispatch { cycle, .. }
            | Event::Complete { cycle, .. }
            | Event::KernelDone { cycle } => cycle,
        }
    }
}

/// Stages of both contexts of a core at the start of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageSample {
    pub cycle: u64,
    pub core: usize,
    pub active: ContextTag,
    pub stages: [Stage; 2],
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Tracer {
    events: Vec<Event>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stage_samples: Vec<StageSample>,
}

impl Tracer {
    pub fn record(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn sample(&mut self, sample: StageSample) {
        self.stage_samples.push(sample);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn stage_samples(&self) -> &[StageSample] {
        &self.stage_samples
    }

    /// Block ids in the order they were handed out.
    pub fn dispatch_order(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Dispatch { block_id, .. } => Some(*block_id),
                _ => None,
            })
            .collect()
    }

    /// Block ids in the order their completion was observed.
    pub fn completion_order(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Complete { block_id, .. } => Some(*block_id),
                _ => None,
            })
            .collect()
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_and_json() -> anyhow::Result<()> {
        let mut t = Tracer::default();
        t.record(Event::Dispatch {
            cycle: 1,
            core: 0,
            block_id: 1,
            thread_count: 4,
        });
        t.record(Event::Dispatch {
            cycle: 1,
            core: 1,
            block_id: 0,
            thread_count: 2,
        });
        t.record(Event::Complete {
            cycle: 30,
            core: 1,
            block_id: 0,
        });
        t.record(Event::KernelDone { cycle: 40 });
        assert_eq!(t.dispatch_order(), vec![1, 0]);
        assert_eq!(t.completion_order(), vec![0]);
        assert_eq!(t.events()[3].cycle(), 40);

        let json: serde_json::Value = serde_json::from_str(&t.to_json()?)?;
        assert_eq!(json["events"][0]["event"], "dispatch");
        assert_eq!(json["events"][3]["event"], "kernel_done");
        assert!(json.get("stage_samples").is_none());
        Ok(())
    }
}
