#![allow(dead_code)]

use arbor::{
    CancelState, Cancellable, Event, EventFamily, EventListener, EventResult, ReasonedResult,
    Resulted, event_family, testing::InvocationLog,
};

// ============================================================================
// Test Event Types
// ============================================================================

pub trait PlayerEvent: Event {
    fn player(&self) -> &str;
}

#[derive(Debug, Default)]
pub struct PlayerJoin {
    pub player: String,
    pub message: String,
    pub cancelled: CancelState,
}

impl Cancellable for PlayerJoin {
    fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }

    fn cancel(&mut self) {
        self.cancelled.cancel();
    }
}

impl Event for PlayerJoin {
    fn as_cancellable(&self) -> Option<&dyn Cancellable> {
        Some(self)
    }
}

impl PlayerEvent for PlayerJoin {
    fn player(&self) -> &str {
        &self.player
    }
}

#[derive(Debug, Default)]
pub struct PlayerChat {
    pub player: String,
    pub message: String,
    pub result: ReasonedResult,
}

impl Event for PlayerChat {
    fn as_resulted(&self) -> Option<&dyn EventResult> {
        Some(&self.result)
    }
}

impl Resulted for PlayerChat {
    type Result = ReasonedResult;

    fn result(&self) -> &ReasonedResult {
        &self.result
    }

    fn set_result(&mut self, result: ReasonedResult) {
        self.result = result;
    }
}

impl PlayerEvent for PlayerChat {
    fn player(&self) -> &str {
        &self.player
    }
}

event_family!(dyn PlayerEvent: PlayerJoin, PlayerChat);

#[derive(Debug, Default)]
pub struct ServerTick {
    pub tick: u64,
}

impl Event for ServerTick {}

pub fn join(player: &str) -> PlayerJoin {
    PlayerJoin {
        player: player.to_owned(),
        ..Default::default()
    }
}

pub fn chat(player: &str, message: &str) -> PlayerChat {
    PlayerChat {
        player: player.to_owned(),
        message: message.to_owned(),
        ..Default::default()
    }
}

// ============================================================================
// Test Listeners
// ============================================================================

/// A listener that appends `label` to `log` whenever it runs.
pub fn recording<L>(log: &InvocationLog, label: &'static str) -> EventListener<L>
where
    L: ?Sized + EventFamily,
{
    let log = log.clone();
    EventListener::of(move |_: &mut L| log.record(label))
}
