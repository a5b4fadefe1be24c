use std::rc::Rc;

use derive_ex::Ex;

use crate::{Error, Event, Sink, Subscription};

mod ops;


/// A cold push stream.
///
/// Each subscription runs the producer again; unsubscribing releases what the producer acquired and
/// closes the subscriber's [`Sink`].
#[derive(Ex)]
#[derive_ex(Clone(bound()))]
pub struct Obs<T: 'static>(Rc<dyn ObsNode<T>>);

trait ObsNode<T: 'static>: 'static {
    fn connect(&self, sink: Sink<T>) -> Subscription;
}

struct FnNode<F>(F);

impl<T, F> ObsNode<T> for FnNode<F>
where
    T: 'static,
    F: Fn(Sink<T>) -> Subscription + 'static,
{
    fn connect(&self, sink: Sink<T>) -> Subscription {
        (self.0)(sink)
    }
}

impl<T: 'static> Obs<T> {
    /// Creates a stream from a producer.
    ///
    /// The producer is called once per subscription with the subscriber's sink and returns what must be
    /// released when the subscription ends.
    pub fn new(f: impl Fn(Sink<T>) -> Subscription + 'static) -> Self {
        Self(Rc::new(FnNode(f)))
    }

    pub fn of(value: T) -> Self
    where
        T: Clone,
    {
        Self::from_iter([value])
    }

    /// Emits every item of `items`, then completes.
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + 'static,
    {
        Self::new(move |sink| {
            for item in items.clone() {
                if sink.is_closed() {
                    break;
                }
                sink.next(item);
            }
            sink.complete();
            Subscription::empty()
        })
    }

    pub fn empty() -> Self {
        Self::new(|sink| {
            sink.complete();
            Subscription::empty()
        })
    }
    pub fn never() -> Self {
        Self::new(|_| Subscription::empty())
    }
    pub fn throw(e: Error) -> Self {
        Self::new(move |sink| {
            sink.error(e.clone());
            Subscription::empty()
        })
    }

    pub fn subscribe(&self, f: impl FnMut(Event<T>) + 'static) -> Subscription {
        self.subscribe_sink(Sink::new(f))
    }

    /// Subscribes and calls `f` for each value only, ignoring errors and completion.
    pub fn for_each(&self, mut f: impl FnMut(T) + 'static) -> Subscription {
        self.subscribe(move |e| {
            if let Event::Next(value) = e {
                f(value)
            }
        })
    }

    pub fn subscribe_sink(&self, sink: Sink<T>) -> Subscription {
        let upstream = self.0.connect(sink.clone());
        Subscription::from_fn(move || {
            sink.close();
            drop(upstream);
        })
    }
}
