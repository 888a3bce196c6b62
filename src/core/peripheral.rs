// src/core/peripheral.rs

//! Interfaces to collaborators the core treats as external (spec.md §1
//! "Out of scope", §6 "Peripheral manager interface"). The core only
//! depends on these traits; concrete hardware/platform bindings live
//! outside the supervisor core.

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralKind {
    WirelessModem,
    Speaker,
    Other,
}

#[derive(Debug, Clone)]
pub enum PeripheralEvent {
    Attach { name: String, kind: PeripheralKind },
    Detach { name: String },
}

/// The peripheral-mount manager (spec.md §6): `mount_all()`, attach/detach
/// events, and handle lookups for the two peripherals the core cares
/// about directly.
#[async_trait]
pub trait PeripheralEvents: Send + Sync {
    async fn mount_all(&self);
    async fn next_event(&self) -> Option<PeripheralEvent>;
    fn get_wireless_modem(&self) -> Option<String>;
    fn get_speaker(&self) -> Option<String>;
}

/// The tone/audio renderer (spec.md §1, §4.8): consumes the 8-slot tone
/// bitmap produced once per tick by the alarm mixer.
pub trait ToneSink: Send + Sync {
    fn push(&self, tones: [bool; 8]);
}
