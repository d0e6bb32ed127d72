//! Correlation of synchronous requests with their replies
//!
//! At most one waiter exists per channel. A waiter is resolved exactly once and then removed.

use std::collections::BTreeMap;

use amqp091_types::methods::{Method, MethodId};
use tokio::sync::oneshot;

use crate::channel;

/// Receives the reply of a synchronous request
pub(crate) type Responder = oneshot::Sender<Result<Method, channel::Error>>;

/// A pending synchronous request
#[derive(Debug)]
pub(crate) struct Waiter {
    expected: Vec<MethodId>,
    responder: Responder,
}

impl Waiter {
    pub(crate) fn new(expected: Vec<MethodId>, responder: Responder) -> Self {
        Self {
            expected,
            responder,
        }
    }

    pub(crate) fn accepts(&self, id: MethodId) -> bool {
        self.expected.contains(&id)
    }

    /// Whether the caller stopped waiting
    pub(crate) fn is_abandoned(&self) -> bool {
        self.responder.is_closed()
    }

    pub(crate) fn resolve(self, result: Result<Method, channel::Error>) {
        // The caller may have given up waiting
        let _ = self.responder.send(result);
    }
}

/// Outcome of delivering an inbound method
#[derive(Debug)]
pub(crate) enum Delivery {
    /// A waiter accepted the method
    Resolved,

    /// No waiter accepted the method
    Unsolicited(Method),
}

/// Pending requests keyed by channel number
#[derive(Debug, Default)]
pub(crate) struct RpcRegistry {
    waiters: BTreeMap<u16, Waiter>,
}

impl RpcRegistry {
    /// Registers a waiter. A live waiter on the same channel rejects the new one, which is handed back
    pub(crate) fn register(&mut self, channel: u16, waiter: Waiter) -> Result<(), Waiter> {
        match self.waiters.get(&channel) {
            Some(existing) if !existing.is_abandoned() => Err(waiter),
            _ => {
                self.waiters.insert(channel, waiter);
                Ok(())
            }
        }
    }

    pub(crate) fn is_waiting(&self, channel: u16) -> bool {
        self.waiters.contains_key(&channel)
    }

    /// Resolves the waiter on `channel` if it expects this method
    pub(crate) fn deliver(&mut self, channel: u16, method: Method) -> Delivery {
        match self.waiters.get(&channel) {
            Some(waiter) if waiter.accepts(method.id()) => {
                if let Some(waiter) = self.waiters.remove(&channel) {
                    waiter.resolve(Ok(method));
                }
                Delivery::Resolved
            }
            _ => Delivery::Unsolicited(method),
        }
    }

    /// Fails the waiter on `channel`, if any
    pub(crate) fn fail(&mut self, channel: u16, error: channel::Error) -> bool {
        match self.waiters.remove(&channel) {
            Some(waiter) => {
                waiter.resolve(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fails every waiter
    pub(crate) fn fail_all(&mut self, error: channel::Error) {
        for (_, waiter) in std::mem::take(&mut self.waiters) {
            waiter.resolve(Err(error.clone()));
        }
    }

    /// Removes the waiter without resolving it
    pub(crate) fn cancel(&mut self, channel: u16) -> bool {
        self.waiters.remove(&channel).is_some()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }
}
