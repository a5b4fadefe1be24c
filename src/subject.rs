use std::{cell::RefCell, collections::VecDeque, mem::take, rc::Rc};

use derive_ex::Ex;
use slabmap::SlabMap;

use crate::{Error, Event, Obs, Sink, Subscription};


/// A hot stream that multicasts the values pushed into it.
///
/// A subject created with [`replay_latest`](Self::replay_latest) or [`with_latest`](Self::with_latest)
/// delivers its latest value to each new subscriber before any later value.
/// Terminal events are delivered to subscribers that arrive after termination.
///
/// Events pushed while the subject is delivering are queued, so every subscriber sees the same order.
#[derive(Ex)]
#[derive_ex(Clone(bound()))]
pub struct Subject<T: 'static>(Rc<RefCell<SubjectData<T>>>);

struct SubjectData<T: 'static> {
    sinks: SlabMap<Sink<T>>,
    latest: Option<T>,
    replay: bool,
    state: SubjectState,
    queue: VecDeque<Event<T>>,
    is_delivering: bool,
}

#[derive(Clone)]
enum SubjectState {
    Open,
    Failed(Error),
    Completed,
    Closed,
}

impl<T: Clone + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Subject<T> {
    pub fn new() -> Self {
        Self::from_data(None, false)
    }
    pub fn replay_latest() -> Self {
        Self::from_data(None, true)
    }
    pub fn with_latest(value: T) -> Self {
        Self::from_data(Some(value), true)
    }
    fn from_data(latest: Option<T>, replay: bool) -> Self {
        Self(Rc::new(RefCell::new(SubjectData {
            sinks: SlabMap::new(),
            latest,
            replay,
            state: SubjectState::Open,
            queue: VecDeque::new(),
            is_delivering: false,
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
        {
            let mut d = self.0.borrow_mut();
            if !matches!(d.state, SubjectState::Open) {
                return;
            }
            if d.is_delivering {
                d.queue.push_back(event);
                return;
            }
            d.is_delivering = true;
        }
        let mut event = event;
        loop {
            self.deliver(event);
            let mut d = self.0.borrow_mut();
            let next = if matches!(d.state, SubjectState::Open) {
                d.queue.pop_front()
            } else {
                None
            };
            match next {
                Some(next) => event = next,
                None => {
                    d.is_delivering = false;
                    let rest = take(&mut d.queue);
                    drop(d);
                    drop(rest);
                    return;
                }
            }
        }
    }

    fn deliver(&self, event: Event<T>) {
        match event {
            Event::Next(value) => {
                let sinks: Vec<Sink<T>> = {
                    let mut d = self.0.borrow_mut();
                    if !matches!(d.state, SubjectState::Open) {
                        return;
                    }
                    if d.replay {
                        d.latest = Some(value.clone());
                    }
                    d.sinks.iter().map(|(_, sink)| sink.clone()).collect()
                };
                for sink in sinks {
                    sink.next(value.clone());
                }
            }
            Event::Error(e) => self.finish(SubjectState::Failed(e)),
            Event::Complete => self.finish(SubjectState::Completed),
        }
    }

    /// Detaches every subscriber without a terminal event. Later subscribers receive nothing.
    pub fn close(&self) {
        self.finish(SubjectState::Closed);
    }

    fn finish(&self, state: SubjectState) {
        let sinks = {
            let mut d = self.0.borrow_mut();
            if !matches!(d.state, SubjectState::Open) {
                return;
            }
            d.state = state.clone();
            if matches!(state, SubjectState::Closed) {
                d.latest = None;
            }
            take(&mut d.sinks)
        };
        for (_, sink) in sinks {
            match &state {
                SubjectState::Open => unreachable!(),
                SubjectState::Failed(e) => sink.error(e.clone()),
                SubjectState::Completed => sink.complete(),
                SubjectState::Closed => sink.close(),
            }
        }
    }

    /// Returns the value a new subscriber would receive first.
    pub fn latest(&self) -> Option<T> {
        self.0.borrow().latest.clone()
    }
    pub fn is_terminated(&self) -> bool {
        !matches!(self.0.borrow().state, SubjectState::Open)
    }
    pub fn subscriber_count(&self) -> usize {
        self.0.borrow().sinks.len()
    }

    pub fn as_obs(&self) -> Obs<T> {
        let this = self.clone();
        Obs::new(move |sink| this.connect(sink))
    }

    fn connect(&self, sink: Sink<T>) -> Subscription {
        let (key, latest, state) = {
            let mut d = self.0.borrow_mut();
            let latest = d.latest.clone();
            if matches!(d.state, SubjectState::Open) {
                (Some(d.sinks.insert(sink.clone())), latest, None)
            } else {
                (None, latest, Some(d.state.clone()))
            }
        };
        if let Some(latest) = latest {
            sink.next(latest);
        }
        match state {
            None | Some(SubjectState::Open) => {}
            Some(SubjectState::Failed(e)) => sink.error(e),
            Some(SubjectState::Completed) => sink.complete(),
            Some(SubjectState::Closed) => sink.close(),
        }
        let Some(key) = key else {
            return Subscription::empty();
        };
        Subscription::from_weak_fn(Rc::downgrade(&self.0), move |this| {
            let sink = this.borrow_mut().sinks.remove(key);
            drop(sink);
        })
    }
}
