// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod event;
pub mod matching;
pub mod measurement;

pub use event::{EventKind, EventPayload, SyncEvent};
pub use matching::{ClearWindow, MatchWindow};
pub use measurement::{round_weight, Measurement, ScaleUser};
