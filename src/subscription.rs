use std::{
    mem::take,
    rc::{Rc, Weak},
};


/// Handle that releases something when dropped or unsubscribed.
///
/// Unsubscribing is idempotent: the release action runs at most once.
#[derive(Default)]
#[must_use]
pub struct Subscription(RawSubscription);

impl Subscription {
    pub fn empty() -> Self {
        Subscription(RawSubscription::Empty)
    }
    pub fn from_fn(f: impl FnOnce() + 'static) -> Self {
        Subscription(RawSubscription::Fn(Box::new(f)))
    }

    /// Calls `unsubscribe` with `this` if it is still alive when unsubscribed.
    pub fn from_weak_fn<T: 'static>(this: Weak<T>, unsubscribe: impl FnOnce(Rc<T>) + 'static) -> Self {
        Self::from_fn(move || {
            if let Some(this) = this.upgrade() {
                unsubscribe(this)
            }
        })
    }

    /// Combines several subscriptions; they are released in order.
    pub fn merge(subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        Subscription(RawSubscription::Many(subscriptions.into_iter().collect()))
    }

    /// Releases now instead of on drop.
    pub fn unsubscribe(&mut self) {
        match take(&mut self.0) {
            RawSubscription::Empty => {}
            RawSubscription::Fn(f) => f(),
            RawSubscription::Many(subscriptions) => {
                for mut s in subscriptions {
                    s.unsubscribe();
                }
            }
        }
    }

    /// Returns `true` if there is nothing left to release.
    pub fn is_empty(&self) -> bool {
        matches!(self.0, RawSubscription::Empty)
    }
}
impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[derive(Default)]
enum RawSubscription {
    #[default]
    Empty,
    Fn(Box<dyn FnOnce() + 'static>),
    Many(Vec<Subscription>),
}

/// Value that owns something which must be released explicitly.
///
/// `dispose` consumes the value, so a value can never be disposed twice.
pub trait Disposable: 'static {
    fn dispose(self);
}

impl Disposable for () {
    fn dispose(self) {}
}
impl Disposable for Subscription {
    fn dispose(mut self) {
        self.unsubscribe();
    }
}
impl<D: Disposable> Disposable for Option<D> {
    fn dispose(self) {
        if let Some(d) = self {
            d.dispose();
        }
    }
}
impl<D: Disposable> Disposable for Vec<D> {
    fn dispose(self) {
        for d in self {
            d.dispose();
        }
    }
}
impl<D0: Disposable, D1: Disposable> Disposable for (D0, D1) {
    fn dispose(self) {
        self.0.dispose();
        self.1.dispose();
    }
}

/// Long-lived value owned by a keyed cache.
///
/// The cache keeps the resource itself and hands out clones of its [`handle`](Self::handle)
/// in index order.
pub trait Resource: Disposable {
    type Handle: Clone + 'static;
    fn handle(&self) -> Self::Handle;
}

/// A handle paired with the subscription that keeps it running.
pub struct Owned<H> {
    handle: H,
    subscription: Subscription,
}

impl<H> Owned<H> {
    pub fn new(handle: H, subscription: Subscription) -> Self {
        Self {
            handle,
            subscription,
        }
    }
    pub fn get(&self) -> &H {
        &self.handle
    }
    pub fn into_parts(self) -> (H, Subscription) {
        (self.handle, self.subscription)
    }
}

impl<H: 'static> Disposable for Owned<H> {
    fn dispose(self) {
        self.subscription.dispose();
    }
}
impl<H: Clone + 'static> Resource for Owned<H> {
    type Handle = H;
    fn handle(&self) -> H {
        self.handle.clone()
    }
}
