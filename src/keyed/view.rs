use tracing::trace;

use crate::{Obs, Subject};


/// The current value of one cache entry, observable as a stream.
///
/// Subscribers receive the current value immediately, then each later value.
pub(crate) struct ViewSlot<T: 'static>(Subject<T>);

impl<T: Clone + 'static> ViewSlot<T> {
    pub fn new(value: T) -> Self {
        Self(Subject::with_latest(value))
    }

    pub fn view(&self) -> Obs<T> {
        self.0.as_obs()
    }

    pub fn set(&self, value: T) {
        trace!(subscribers = self.0.subscriber_count(), "push view value");
        self.0.next(value);
    }

    #[cfg(test)]
    pub fn get(&self) -> Option<T> {
        self.0.latest()
    }

    /// Stops delivering to current and future subscribers.
    pub fn close(self, complete: bool) {
        if complete {
            self.0.complete();
        } else {
            self.0.close();
        }
    }
}
