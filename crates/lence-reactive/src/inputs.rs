//! Input store
//!
//! Current value and display label of every page input. Writers call
//! [`InputStore::set`]; every effective change is broadcast to all live
//! [`Subscription`]s. Dropping a subscription unsubscribes it.

use lence_core::{ParamValue, Params};
use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

const CHANGE_CAPACITY: usize = 256;

/// Value of one input
#[derive(Debug, Clone, PartialEq)]
pub struct InputValue {
    pub value: ParamValue,

    /// Display label, e.g. the dropdown option text
    pub label: Option<String>,
}

/// Notification that an input changed
#[derive(Debug, Clone, PartialEq)]
pub struct InputChange {
    pub name: String,

    /// New value, or `None` when the input was cleared
    pub value: Option<InputValue>,
}

/// Holds input values and broadcasts changes
pub struct InputStore {
    values: RwLock<HashMap<String, InputValue>>,
    changes: broadcast::Sender<InputChange>,
}

impl InputStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            values: RwLock::new(HashMap::new()),
            changes,
        }
    }

    pub fn get(&self, name: &str) -> Option<InputValue> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Set an input. Returns whether the stored value changed; only changes
    /// are broadcast.
    pub fn set(&self, name: &str, value: impl Into<ParamValue>, label: Option<String>) -> bool {
        let next = InputValue {
            value: value.into(),
            label,
        };

        {
            let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
            if values.get(name) == Some(&next) {
                return false;
            }
            values.insert(name.to_string(), next.clone());
        }

        self.notify(InputChange {
            name: name.to_string(),
            value: Some(next),
        });
        true
    }

    /// Unset an input. Returns whether it was set.
    pub fn clear(&self, name: &str) -> bool {
        let removed = self
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();

        if removed {
            self.notify(InputChange {
                name: name.to_string(),
                value: None,
            });
        }
        removed
    }

    /// Parameter values for exactly `names`; unset inputs are sent as null
    pub fn params_for(&self, names: &BTreeSet<String>) -> Params {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        names
            .iter()
            .map(|name| {
                let value = values
                    .get(name)
                    .map(|input| input.value.clone())
                    .unwrap_or(ParamValue::Null);
                (name.clone(), value)
            })
            .collect()
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.changes.subscribe(),
        }
    }

    fn notify(&self, change: InputChange) {
        // No subscribers is not an error
        let _ = self.changes.send(change);
    }
}

impl Default for InputStore {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to input changes
pub struct Subscription {
    receiver: broadcast::Receiver<InputChange>,
}

impl Subscription {
    /// Next change, or `None` once the store is gone
    ///
    /// A subscriber that falls behind skips the changes it missed; the
    /// store always holds the latest values, so re-reading them is enough.
    pub async fn recv(&mut self) -> Option<InputChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "input subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
