//! Syscall audit trail
//!
//! The dispatcher calls [`SysLog::log_request`] as soon as a trap has been
//! decoded and [`SysLog::log_response`] after the register file has been
//! updated. A Join or console Read may block between the two, so a request
//! can stay open while other processes log around it.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::{EventId, SenderId};

/// Events retained when no capacity is configured
pub const DEFAULT_SYSLOG_CAPACITY: usize = 10000;

/// One audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysEvent {
    pub id: EventId,
    /// Space id of the trapping process
    pub sender: SenderId,
    /// Machine ticks when the event was recorded
    pub timestamp: u64,
    pub event_type: SysEventType,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SysEventType {
    /// Opcode (r2) and argument registers (r4..=r7) at trap time
    Request { opcode: u32, args: [i32; 4] },
    /// What went back in r2; `None` when the syscall returns nothing
    Response {
        request_id: EventId,
        result: Option<i32>,
    },
}

impl SysEvent {
    pub fn is_request(&self) -> bool {
        matches!(self.event_type, SysEventType::Request { .. })
    }

    /// The request this event answers, if it is a response.
    pub fn answers(&self) -> Option<EventId> {
        match self.event_type {
            SysEventType::Response { request_id, .. } => Some(request_id),
            SysEventType::Request { .. } => None,
        }
    }
}

/// Bounded window over the audit trail.
///
/// Ids are handed out from zero and never reused. When the window is full
/// the oldest event is evicted and counted in [`SysLog::evicted`].
pub struct SysLog {
    window: VecDeque<SysEvent>,
    capacity: usize,
    next_id: EventId,
    evicted: u64,
}

impl SysLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SYSLOG_CAPACITY)
    }

    /// A log keeping the newest `capacity` events (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            next_id: 0,
            evicted: 0,
        }
    }

    /// Record a decoded syscall. The returned id is passed to
    /// [`SysLog::log_response`].
    pub fn log_request(
        &mut self,
        sender: SenderId,
        opcode: u32,
        args: [i32; 4],
        timestamp: u64,
    ) -> EventId {
        self.append(sender, timestamp, SysEventType::Request { opcode, args })
    }

    pub fn log_response(
        &mut self,
        sender: SenderId,
        request_id: EventId,
        result: Option<i32>,
        timestamp: u64,
    ) -> EventId {
        self.append(sender, timestamp, SysEventType::Response { request_id, result })
    }

    fn append(&mut self, sender: SenderId, timestamp: u64, event_type: SysEventType) -> EventId {
        let id = self.next_id;
        self.next_id += 1;
        if self.window.len() == self.capacity {
            self.window.pop_front();
            self.evicted += 1;
        }
        self.window.push_back(SysEvent {
            id,
            sender,
            timestamp,
            event_type,
        });
        id
    }

    /// Retained events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &SysEvent> + '_ {
        self.window.iter()
    }

    /// Owned copy of the retained events.
    pub fn snapshot(&self) -> Vec<SysEvent> {
        self.window.iter().cloned().collect()
    }

    /// Look up a retained event by id.
    pub fn get(&self, id: EventId) -> Option<&SysEvent> {
        let first = self.window.front()?.id;
        let index = usize::try_from(id.checked_sub(first)?).ok()?;
        self.window.get(index)
    }

    /// The response logged for `request_id`, if retained.
    pub fn response_to(&self, request_id: EventId) -> Option<&SysEvent> {
        self.window
            .iter()
            .find(|e| e.answers() == Some(request_id))
    }

    /// Requests with no response yet, i.e. traps still inside the kernel.
    pub fn open_requests(&self) -> Vec<&SysEvent> {
        self.window
            .iter()
            .filter(|e| e.is_request())
            .filter(|e| self.response_to(e.id).is_none())
            .collect()
    }

    /// Opcodes requested by `sender`, in order.
    pub fn opcodes_from(&self, sender: SenderId) -> Vec<u32> {
        self.window
            .iter()
            .filter(|e| e.sender == sender)
            .filter_map(|e| match e.event_type {
                SysEventType::Request { opcode, .. } => Some(opcode),
                SysEventType::Response { .. } => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events dropped off the front of the window.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn next_id(&self) -> EventId {
        self.next_id
    }
}

impl Default for SysLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_then_response() {
        let mut log = SysLog::new();
        assert!(log.is_empty());

        let req = log.log_request(1, 2, [0x40, 0, 0, 0], 10);
        let resp = log.log_response(1, req, Some(3), 20);

        assert_eq!((req, resp), (0, 1));
        assert_eq!(log.len(), 2);
        assert_eq!(log.response_to(req).map(|e| e.id), Some(resp));
        assert!(log.open_requests().is_empty());
    }

    #[test]
    fn test_blocked_request_stays_open() {
        let mut log = SysLog::new();
        let join = log.log_request(1, 3, [2, 0, 0, 0], 0);
        let write = log.log_request(2, 7, [0x100, 4, 1, 0], 5);
        log.log_response(2, write, None, 6);

        let open: Vec<EventId> = log.open_requests().iter().map(|e| e.id).collect();
        assert_eq!(open, [join]);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut log = SysLog::with_capacity(3);
        for op in 0..5 {
            log.log_request(1, op, [0; 4], 0);
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.evicted(), 2);
        assert_eq!(log.next_id(), 5);
        assert!(log.get(1).is_none());
        assert_eq!(log.get(3).map(|e| e.id), Some(3));
        assert_eq!(log.iter().next().map(|e| e.id), Some(2));
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut log = SysLog::with_capacity(0);
        log.log_request(1, 10, [0; 4], 0);
        log.log_request(1, 10, [0; 4], 1);
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.snapshot()[0].id, 1);
    }

    #[test]
    fn test_opcodes_from_sender() {
        let mut log = SysLog::new();
        let a = log.log_request(1, 10, [0; 4], 0);
        log.log_response(1, a, None, 1);
        log.log_request(2, 7, [0, 3, 1, 0], 2);
        log.log_request(1, 1, [0; 4], 3);

        assert_eq!(log.opcodes_from(1), [10, 1]);
        assert_eq!(log.opcodes_from(2), [7]);
        assert!(log.opcodes_from(9).is_empty());
    }

    #[test]
    fn test_events_serialize() {
        let mut log = SysLog::new();
        let id = log.log_request(3, 6, [64, 10, 0, 0], 42);
        log.log_response(3, id, Some(5), 43);

        let json = serde_json::to_string(&log.snapshot()).unwrap();
        let back: Vec<SysEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, log.snapshot());
    }
}
