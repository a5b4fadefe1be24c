use std::{cell::RefCell, collections::VecDeque, mem::take, rc::Rc};

use derive_ex::Ex;

use crate::Error;


/// A notification delivered by a stream.
#[derive(Clone, Debug, PartialEq)]
pub enum Event<T> {
    Next(T),
    Error(Error),
    Complete,
}

impl<T> Event<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Event::Next(_))
    }
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Event<U> {
        match self {
            Event::Next(value) => Event::Next(f(value)),
            Event::Error(e) => Event::Error(e),
            Event::Complete => Event::Complete,
        }
    }
}

/// The receiving end of one subscription.
///
/// Events sent while the sink is delivering are queued and delivered in order after the current one returns.
/// After a terminal event or [`close`](Self::close), nothing more is delivered.
#[derive(Ex)]
#[derive_ex(Clone(bound()))]
pub struct Sink<T: 'static>(Rc<RefCell<SinkData<T>>>);

struct SinkData<T> {
    f: Option<Box<dyn FnMut(Event<T>)>>,
    queue: VecDeque<Event<T>>,
    state: SinkState,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SinkState {
    Idle,
    Busy,
    Closed,
}

impl<T: 'static> Sink<T> {
    pub fn new(f: impl FnMut(Event<T>) + 'static) -> Self {
        Self(Rc::new(RefCell::new(SinkData {
            f: Some(Box::new(f)),
            queue: VecDeque::new(),
            state: SinkState::Idle,
        })))
    }

    pub fn next(&self, value: T) {
        self.send(Event::Next(value))
    }
    pub fn error(&self, e: Error) {
        self.send(Event::Error(e))
    }
    pub fn complete(&self) {
        self.send(Event::Complete)
    }

    pub fn send(&self, event: Event<T>) {
        let mut f = {
            let mut d = self.0.borrow_mut();
            match d.state {
                SinkState::Closed => return,
                SinkState::Busy => {
                    d.queue.push_back(event);
                    return;
                }
                SinkState::Idle => {}
            }
            let Some(f) = d.f.take() else {
                d.state = SinkState::Closed;
                return;
            };
            d.state = SinkState::Busy;
            f
        };
        let mut event = event;
        loop {
            let is_terminal = event.is_terminal();
            f(event);
            let mut d = self.0.borrow_mut();
            if is_terminal || d.state == SinkState::Closed {
                d.state = SinkState::Closed;
                let queue = take(&mut d.queue);
                drop(d);
                drop(queue);
                drop(f);
                return;
            }
            if let Some(next) = d.queue.pop_front() {
                event = next;
            } else {
                d.state = SinkState::Idle;
                d.f = Some(f);
                return;
            }
        }
    }

    /// Stops delivery without sending a terminal event.
    pub fn close(&self) {
        let (f, queue) = {
            let mut d = self.0.borrow_mut();
            d.state = SinkState::Closed;
            (d.f.take(), take(&mut d.queue))
        };
        drop(queue);
        drop(f);
    }

    pub fn is_closed(&self) -> bool {
        self.0.borrow().state == SinkState::Closed
    }
}
