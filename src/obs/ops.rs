use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
    mem::take,
    panic::Location,
    rc::Rc,
};

use tracing::debug;

use crate::{Event, Obs, Owned, Sink, Subject, Subscription};

impl<T: 'static> Obs<T> {
    pub fn map<U: 'static>(&self, f: impl Fn(T) -> U + 'static) -> Obs<U> {
        let source = self.clone();
        let f = Rc::new(f);
        Obs::new(move |sink: Sink<U>| {
            let f = f.clone();
            source.subscribe(move |e| sink.send(e.map(|value| f(value))))
        })
    }

    pub fn filter(&self, f: impl Fn(&T) -> bool + 'static) -> Obs<T> {
        let source = self.clone();
        let f = Rc::new(f);
        Obs::new(move |sink: Sink<T>| {
            let f = f.clone();
            source.subscribe(move |e| match e {
                Event::Next(value) if !f(&value) => {}
                e => sink.send(e),
            })
        })
    }

    /// Emits the accumulated state after each value. `initial` is not emitted.
    pub fn scan<S: Clone + 'static>(&self, initial: S, f: impl Fn(S, T) -> S + 'static) -> Obs<S> {
        let source = self.clone();
        let f = Rc::new(f);
        Obs::new(move |sink: Sink<S>| {
            let f = f.clone();
            let mut state = Some(initial.clone());
            source.subscribe(move |e| match e {
                Event::Next(value) => {
                    if let Some(s) = state.take() {
                        let s = f(s, value);
                        state = Some(s.clone());
                        sink.next(s);
                    }
                }
                Event::Error(e) => sink.error(e),
                Event::Complete => sink.complete(),
            })
        })
    }

    pub fn tap(&self, f: impl Fn(&T) + 'static) -> Obs<T> {
        let source = self.clone();
        let f = Rc::new(f);
        Obs::new(move |sink: Sink<T>| {
            let f = f.clone();
            source.subscribe(move |e| {
                if let Event::Next(value) = &e {
                    f(value);
                }
                sink.send(e)
            })
        })
    }

    /// Logs every event of this stream with the caller's location.
    #[track_caller]
    pub fn debug(&self) -> Obs<T>
    where
        T: Debug,
    {
        let location = Location::caller();
        let source = self.clone();
        Obs::new(move |sink: Sink<T>| {
            source.subscribe(move |e| {
                debug!("[{}] {:#?}", location, e);
                sink.send(e)
            })
        })
    }

    pub fn skip_repeats(&self) -> Obs<T>
    where
        T: PartialEq + Clone,
    {
        self.skip_repeats_by(|a, b| a == b)
    }

    /// Drops values that `eq` considers equal to the previous value.
    pub fn skip_repeats_by(&self, eq: impl Fn(&T, &T) -> bool + 'static) -> Obs<T>
    where
        T: Clone,
    {
        let source = self.clone();
        let eq = Rc::new(eq);
        Obs::new(move |sink: Sink<T>| {
            let eq = eq.clone();
            let mut last: Option<T> = None;
            source.subscribe(move |e| match e {
                Event::Next(value) => {
                    if last.as_ref().is_some_and(|last| eq(last, &value)) {
                        return;
                    }
                    last = Some(value.clone());
                    sink.next(value);
                }
                e => sink.send(e),
            })
        })
    }

    /// Emits the values of all `sources`; completes after every source completed.
    pub fn merge(sources: impl IntoIterator<Item = Obs<T>>) -> Obs<T> {
        let sources: Rc<[Obs<T>]> = sources.into_iter().collect();
        Obs::new(move |sink: Sink<T>| {
            let remaining = Rc::new(Cell::new(sources.len()));
            if sources.is_empty() {
                sink.complete();
                return Subscription::empty();
            }
            Subscription::merge(sources.iter().map(|source| {
                let sink = sink.clone();
                let remaining = remaining.clone();
                source.subscribe(move |e| match e {
                    Event::Complete => {
                        remaining.set(remaining.get() - 1);
                        if remaining.get() == 0 {
                            sink.complete();
                        }
                    }
                    e => sink.send(e),
                })
            }))
        })
    }

    /// Emits the latest value of every source once all of them have produced one.
    ///
    /// An empty list of sources emits one empty list and completes.
    pub fn combine(sources: impl IntoIterator<Item = Obs<T>>) -> Obs<Vec<T>>
    where
        T: Clone,
    {
        let sources: Rc<[Obs<T>]> = sources.into_iter().collect();
        Obs::new(move |sink: Sink<Vec<T>>| {
            if sources.is_empty() {
                sink.next(Vec::new());
                sink.complete();
                return Subscription::empty();
            }
            let state = Rc::new(RefCell::new(CombineState {
                values: vec![None; sources.len()],
                remaining: sources.len(),
            }));
            Subscription::merge(sources.iter().enumerate().map(|(index, source)| {
                let sink = sink.clone();
                let state = state.clone();
                source.subscribe(move |e| match e {
                    Event::Next(value) => {
                        let values = {
                            let mut s = state.borrow_mut();
                            s.values[index] = Some(value);
                            s.values.iter().cloned().collect::<Option<Vec<T>>>()
                        };
                        if let Some(values) = values {
                            sink.next(values);
                        }
                    }
                    Event::Error(e) => sink.error(e),
                    Event::Complete => {
                        let done = {
                            let mut s = state.borrow_mut();
                            s.remaining -= 1;
                            s.remaining == 0
                        };
                        if done {
                            sink.complete();
                        }
                    }
                })
            }))
        })
    }

    /// Connects to the source now and multicasts its events, replaying the latest value to late subscribers.
    ///
    /// Disposing the returned resource disconnects from the source.
    pub fn hot(&self) -> Owned<Obs<T>>
    where
        T: Clone,
    {
        let subject = Subject::replay_latest();
        let s = subject.clone();
        let upstream = self.subscribe(move |e| s.send(e));
        let output = subject.as_obs();
        Owned::new(
            output,
            Subscription::from_fn(move || {
                drop(upstream);
                subject.close();
            }),
        )
    }
}

struct CombineState<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

impl<T: 'static> Obs<Obs<T>> {
    /// Mirrors the most recent inner stream, unsubscribing from the previous one.
    ///
    /// Completes when the outer stream and the current inner stream have both completed.
    pub fn switch_latest(&self) -> Obs<T> {
        let source = self.clone();
        Obs::new(move |sink: Sink<T>| {
            let state = Rc::new(RefCell::new(SwitchState::default()));
            let outer = source.subscribe({
                let state = state.clone();
                let sink = sink.clone();
                move |e| match e {
                    Event::Next(inner) => {
                        let old = {
                            let mut s = state.borrow_mut();
                            s.inner_active = true;
                            s.generation += 1;
                            take(&mut s.inner)
                        };
                        drop(old);
                        let generation = state.borrow().generation;
                        let weak = Rc::downgrade(&state);
                        let inner_sink = sink.clone();
                        let subscription = inner.subscribe(move |e| match e {
                            Event::Complete => {
                                let Some(state) = weak.upgrade() else {
                                    return;
                                };
                                let outer_done = {
                                    let mut s = state.borrow_mut();
                                    if s.generation == generation {
                                        s.inner_active = false;
                                    }
                                    s.outer_done && !s.inner_active
                                };
                                if outer_done {
                                    inner_sink.complete();
                                }
                            }
                            e => inner_sink.send(e),
                        });
                        let mut s = state.borrow_mut();
                        if s.generation == generation {
                            s.inner = subscription;
                        } else {
                            drop(s);
                            drop(subscription);
                        }
                    }
                    Event::Error(e) => sink.error(e),
                    Event::Complete => {
                        let done = {
                            let mut s = state.borrow_mut();
                            s.outer_done = true;
                            !s.inner_active
                        };
                        if done {
                            sink.complete();
                        }
                    }
                }
            });
            Subscription::merge([
                outer,
                Subscription::from_fn(move || {
                    let inner = take(&mut state.borrow_mut().inner);
                    drop(inner);
                }),
            ])
        })
    }
}

#[derive(Default)]
struct SwitchState {
    inner: Subscription,
    inner_active: bool,
    outer_done: bool,
    generation: u64,
}
