//! Two-context pipeline scheduler of a core.
//!
//! A core keeps two shadow execution contexts, A and B. Each has its own
//! program counter, pipeline stage and completion flag. Every cycle exactly
//! one of them is *active* and drives the shared fetch/decode/execute
//! datapath. A has strict priority: B only runs while A is parked on memory
//! or has already finished.

use ansi_term::Colour;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    #[default]
    Idle,
    Fetch,
    Decode,
    Request,
    Wait,
    Execute,
    Update,
    Done,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Idle,
        Stage::Fetch,
        Stage::Decode,
        Stage::Request,
        Stage::Wait,
        Stage::Execute,
        Stage::Update,
        Stage::Done,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Idle => "IDLE",
            Stage::Fetch => "FETCH",
            Stage::Decode => "DECODE",
            Stage::Request => "REQUEST",
            Stage::Wait => "WAIT",
            Stage::Execute => "EXECUTE",
            Stage::Update => "UPDATE",
            Stage::Done => "DONE",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = format!("{:7}", self.name());
        let style = match self {
            Stage::Idle => Colour::White.dimmed(),
            Stage::Fetch => Colour::Blue.normal(),
            Stage::Decode => Colour::Cyan.normal(),
            Stage::Request => Colour::Yellow.normal(),
            Stage::Wait => Colour::Red.bold(),
            Stage::Execute => Colour::Green.normal(),
            Stage::Update => Colour::Purple.normal(),
            Stage::Done => Colour::White.bold(),
        };
        write!(f, "{}", style.paint(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ContextTag {
    #[default]
    A,
    B,
}

impl ContextTag {
    pub const ALL: [ContextTag; 2] = [ContextTag::A, ContextTag::B];

    pub fn index(self) -> usize {
        match self {
            ContextTag::A => 0,
            ContextTag::B => 1,
        }
    }
    pub fn other(self) -> Self {
        match self {
            ContextTag::A => ContextTag::B,
            ContextTag::B => ContextTag::A,
        }
    }
}

impl std::fmt::Display for ContextTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextTag::A => write!(f, "A"),
            ContextTag::B => write!(f, "B"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Context {
    pub pc: u8,
    pub stage: Stage,
    /// Set when the context retires `RET`. Only a reset clears it.
    pub finished: bool,
}

/// Pick the context that drives the datapath this cycle.
pub fn select_active(a: Stage, b: Stage) -> ContextTag {
    match (a, b) {
        (Stage::Wait, _) => ContextTag::B,
        (Stage::Done, b) if b != Stage::Done => ContextTag::B,
        _ => ContextTag::A,
    }
}

/// Datapath signals observed by the scheduler for one context, sampled at
/// the beginning of the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextSignals {
    /// The fetcher holds an instruction fetched for this context.
    pub fetch_complete: bool,
    /// The decoded instruction reads or writes data memory.
    pub mem_access: bool,
    /// The decoded instruction is `RET`.
    pub ret: bool,
    /// Some load/store unit of this context is requesting or waiting.
    pub lsu_busy: bool,
    /// Next pc computed by the last lane of this context.
    pub next_pc: u8,
}

/// What happened during one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub active: ContextTag,
    /// stage of the active context before the tick
    pub from: Stage,
    /// stage of the active context after the tick
    pub to: Stage,
    /// the inactive context left WAIT because its memory requests drained
    pub woke: Option<ContextTag>,
    /// both contexts were kicked out of IDLE at once
    pub bootstrap: bool,
}

impl Step {
    /// The active context passed REQUEST this cycle, so its load/store units
    /// may put their requests on the bus.
    pub fn issued_request(&self) -> bool {
        !self.bootstrap && self.from == Stage::Request && self.to == Stage::Wait
    }
    /// The active context consumed the fetched instruction.
    pub fn accepted_fetch(&self) -> bool {
        !self.bootstrap && self.from == Stage::Fetch && self.to == Stage::Decode
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    contexts: [Context; 2],
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_contexts(a: Context, b: Context) -> Self {
        Self { contexts: [a, b] }
    }

    pub fn context(&self, tag: ContextTag) -> &Context {
        &self.contexts[tag.index()]
    }

    pub fn active(&self) -> ContextTag {
        select_active(self.contexts[0].stage, self.contexts[1].stage)
    }

    /// Program counter presented to the shared datapath.
    pub fn current_pc(&self) -> u8 {
        self.context(self.active()).pc
    }

    /// Stage presented to the shared datapath.
    pub fn core_state(&self) -> Stage {
        self.context(self.active()).stage
    }

    pub fn done(&self) -> bool {
        self.contexts.iter().all(|c| c.finished)
    }

    /// Advance by one cycle.
    ///
    /// Only the active context moves, with two exceptions: the bootstrap
    /// kick out of IDLE, and an inactive context in WAIT whose load/store
    /// units have drained moving on to EXECUTE.
    pub fn tick(&mut self, start: bool, signals: &[ContextSignals; 2]) -> Step {
        if start && self.contexts.iter().all(|c| c.stage == Stage::Idle) {
            for ctx in &mut self.contexts {
                ctx.stage = Stage::Fetch;
            }
            tracing::trace!("bootstrap: both contexts IDLE -> FETCH");
            return Step {
                active: ContextTag::A,
                from: Stage::Idle,
                to: Stage::Fetch,
                woke: None,
                bootstrap: true,
            };
        }

        let active = self.active();
        let a_waiting = self.contexts[0].stage == Stage::Wait;
        let sig = &signals[active.index()];
        let ctx = &mut self.contexts[active.index()];
        let from = ctx.stage;
        let to = match from {
            Stage::Idle if start => Stage::Fetch,
            Stage::Idle => Stage::Idle,
            Stage::Fetch if sig.fetch_complete => Stage::Decode,
            Stage::Fetch => Stage::Fetch,
            Stage::Decode => Stage::Request,
            // the bus is held by A's outstanding request
            Stage::Request if active == ContextTag::B && a_waiting && sig.mem_access => {
                Stage::Request
            }
            Stage::Request => Stage::Wait,
            Stage::Wait if sig.lsu_busy => Stage::Wait,
            Stage::Wait => Stage::Execute,
            Stage::Execute => Stage::Update,
            Stage::Update if sig.ret => {
                ctx.finished = true;
                Stage::Done
            }
            Stage::Update => {
                ctx.pc = sig.next_pc;
                Stage::Fetch
            }
            Stage::Done => Stage::Done,
        };
        ctx.stage = to;
        if from != to {
            tracing::trace!(context = %active, pc = ctx.pc, "{} -> {}", from.name(), to.name());
        }

        let parked = active.other();
        let ctx = &mut self.contexts[parked.index()];
        let woke = if ctx.stage == Stage::Wait && !signals[parked.index()].lsu_busy {
            ctx.stage = Stage::Execute;
            tracing::trace!(context = %parked, "woke up: WAIT -> EXECUTE");
            Some(parked)
        } else {
            None
        };

        Step {
            active,
            from,
            to,
            woke,
            bootstrap: false,
        }
    }
}
