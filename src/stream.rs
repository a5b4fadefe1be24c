use std::{
    cell::RefCell,
    collections::VecDeque,
    mem::take,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use futures::Stream;

use crate::{Error, Event, Obs, Subscription};


impl<T: 'static> Obs<T> {
    /// Subscribes and exposes the events as a [`Stream`].
    ///
    /// Values are buffered until polled. An error is yielded as the last item.
    /// Dropping the stream unsubscribes.
    pub fn to_stream(&self) -> ObsStream<T> {
        let data = Rc::new(RefCell::new(Data {
            queue: VecDeque::new(),
            is_done: false,
            waker: None,
        }));
        let subscription = self.subscribe({
            let data = data.clone();
            move |e| {
                let waker = {
                    let mut d = data.borrow_mut();
                    match e {
                        Event::Next(value) => d.queue.push_back(Ok(value)),
                        Event::Error(e) => {
                            d.queue.push_back(Err(e));
                            d.is_done = true;
                        }
                        Event::Complete => d.is_done = true,
                    }
                    d.waker.take()
                };
                if let Some(waker) = waker {
                    waker.wake();
                }
            }
        });
        ObsStream {
            data,
            _subscription: subscription,
        }
    }
}

pub struct ObsStream<T> {
    data: Rc<RefCell<Data<T>>>,
    _subscription: Subscription,
}

struct Data<T> {
    queue: VecDeque<Result<T, Error>>,
    is_done: bool,
    waker: Option<Waker>,
}

impl<T> Stream for ObsStream<T> {
    type Item = Result<T, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut d = self.data.borrow_mut();
        if let Some(item) = d.queue.pop_front() {
            return Poll::Ready(Some(item));
        }
        if d.is_done {
            take(&mut d.waker);
            return Poll::Ready(None);
        }
        d.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}
