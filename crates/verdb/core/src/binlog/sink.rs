// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use super::event::BinlogEvent;
use parking_lot::Mutex;

/// Receives each batch of produced events for delivery to replicas
pub trait EventSink: Send + Sync {
    fn send_events(&self, events: Vec<BinlogEvent>);
}

/// Sink that keeps every event it receives
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<BinlogEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BinlogEvent> {
        self.events.lock().clone()
    }

    /// Remove and return everything received so far
    pub fn take(&self) -> Vec<BinlogEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for CollectingSink {
    fn send_events(&self, events: Vec<BinlogEvent>) {
        self.events.lock().extend(events);
    }
}
