//! Keyed resource cache driven by a stream of lists.
//!
//! [`attach`] keeps one [`Resource`] per item identity. A resource is created the first time its key
//! appears, is kept while the key stays in the list (whatever its position), and is disposed when the
//! key disappears or the cache is disposed. Each resource receives a view of its item's current
//! value, so item updates never re-run the factory.
use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
    hash::Hash,
    mem::take,
    rc::{Rc, Weak},
};

use tracing::{debug, warn};

use crate::{Error, Event, Obs, Resource, Result, Sink, Subject, Subscription};

mod cache;
pub mod diff;
mod options;
mod view;

pub use options::*;

use cache::{Applied, ResourceCache};
use diff::Snapshot;

/// A running keyed cache.
///
/// The output replays the latest ordered handles to new subscribers.
/// Dropping this value disposes the cache.
#[must_use]
pub struct Keyed<H: 'static> {
    output: Subject<Vec<H>>,
    subscription: Subscription,
}

impl<H: Clone + 'static> Keyed<H> {
    /// Ordered handles, emitted each time the set or order of keys changes.
    pub fn output(&self) -> Obs<Vec<H>> {
        self.output.as_obs()
    }

    /// The most recently emitted handles.
    pub fn latest(&self) -> Option<Vec<H>> {
        self.output.latest()
    }

    /// Cancels the input subscription and disposes every live resource.
    ///
    /// Output subscribers are detached without a terminal event. Calling this again does nothing.
    pub fn dispose(&mut self) {
        self.subscription.unsubscribe();
    }
    pub fn is_disposed(&self) -> bool {
        self.subscription.is_empty()
    }

    pub fn into_parts(self) -> (Obs<Vec<H>>, Subscription) {
        (self.output.as_obs(), self.subscription)
    }
}

/// Attaches a keyed cache with default options to `input`.
pub fn attach<T, K, R>(
    input: &Obs<Vec<T>>,
    identity: impl Fn(&T) -> K + 'static,
    factory: impl FnMut(&K, Obs<T>) -> Result<R> + 'static,
) -> Keyed<R::Handle>
where
    T: Clone + 'static,
    K: Eq + Hash + Clone + Debug + 'static,
    R: Resource,
{
    attach_with(input, KeyedOptions::default(), identity, factory)
}

/// Attaches a keyed cache to `input`.
///
/// `input` is subscribed immediately. For each list, resources of keys that are gone are disposed
/// first, then kept keys receive their new item and index, then `factory` is called for new keys.
///
/// When `input` completes, every resource is disposed and the output completes.
/// When `input` fails or `factory` returns an error, every resource is disposed and the output fails.
pub fn attach_with<T, K, R>(
    input: &Obs<Vec<T>>,
    options: KeyedOptions,
    identity: impl Fn(&T) -> K + 'static,
    factory: impl FnMut(&K, Obs<T>) -> Result<R> + 'static,
) -> Keyed<R::Handle>
where
    T: Clone + 'static,
    K: Eq + Hash + Clone + Debug + 'static,
    R: Resource,
{
    attach_to(input, options, identity, factory, Subject::replay_latest())
}

fn attach_to<T, K, R>(
    input: &Obs<Vec<T>>,
    options: KeyedOptions,
    identity: impl Fn(&T) -> K + 'static,
    factory: impl FnMut(&K, Obs<T>) -> Result<R> + 'static,
    output: Subject<Vec<R::Handle>>,
) -> Keyed<R::Handle>
where
    T: Clone + 'static,
    K: Eq + Hash + Clone + Debug + 'static,
    R: Resource,
{
    let node = Rc::new(AttachNode {
        identity,
        factory: RefCell::new(factory),
        cache: RefCell::new(ResourceCache::new(options)),
        output: output.clone(),
        input: RefCell::new(Subscription::empty()),
        state: Cell::new(AttachState::Running),
        is_dispose_requested: Cell::new(false),
    });
    let weak = Rc::downgrade(&node);
    let input = input.subscribe_sink(Sink::new(move |e| AttachNode::on_input(&weak, e)));
    if node.state.get() == AttachState::Running {
        *node.input.borrow_mut() = input;
    } else {
        drop(input);
    }
    Keyed {
        output,
        subscription: Subscription::from_fn(move || node.dispose()),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttachState {
    Running,
    Finished,
}

struct AttachNode<T: 'static, K, R: Resource, I, F> {
    identity: I,
    factory: RefCell<F>,
    cache: RefCell<ResourceCache<K, T, R>>,
    output: Subject<Vec<R::Handle>>,
    input: RefCell<Subscription>,
    state: Cell<AttachState>,
    is_dispose_requested: Cell<bool>,
}

impl<T, K, R, I, F> AttachNode<T, K, R, I, F>
where
    T: Clone + 'static,
    K: Eq + Hash + Clone + Debug + 'static,
    R: Resource,
    I: Fn(&T) -> K + 'static,
    F: FnMut(&K, Obs<T>) -> Result<R> + 'static,
{
    fn on_input(this: &Weak<Self>, e: Event<Vec<T>>) {
        let Some(this) = this.upgrade() else {
            return;
        };
        if this.state.get() == AttachState::Finished {
            return;
        }
        match e {
            Event::Next(items) => this.on_list(items),
            Event::Error(e) => {
                warn!(error = %e, "keyed input failed");
                this.fail(e);
            }
            Event::Complete => {
                debug!("keyed input completed");
                this.finish();
                this.output.complete();
            }
        }
        if this.is_dispose_requested.get() {
            this.dispose();
        }
    }

    fn on_list(&self, items: Vec<T>) {
        let snapshot = Snapshot::new(items, &self.identity);
        let result = {
            let mut cache = self.cache.borrow_mut();
            let mut factory = self.factory.borrow_mut();
            cache
                .apply(snapshot, &mut *factory, || self.is_dispose_requested.get())
                .map(|applied| (applied == Applied::Structural).then(|| cache.handles()))
        };
        match result {
            Ok(Some(handles)) if !self.is_dispose_requested.get() => self.output.next(handles),
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "keyed factory failed");
                self.fail(e);
            }
        }
    }

    fn fail(&self, e: Error) {
        self.finish();
        self.output.error(e);
    }

    /// Cancels the input and disposes all entries. Runs once.
    fn finish(&self) {
        if self.state.replace(AttachState::Finished) == AttachState::Finished {
            return;
        }
        let input = take(&mut *self.input.borrow_mut());
        drop(input);
        match self.cache.try_borrow_mut() {
            Ok(mut cache) => cache.dispose_all(),
            Err(_) => self.is_dispose_requested.set(true),
        }
    }

    fn dispose(&self) {
        if self.state.get() == AttachState::Finished {
            if self.is_dispose_requested.replace(false) {
                if let Ok(mut cache) = self.cache.try_borrow_mut() {
                    cache.dispose_all();
                }
            }
            return;
        }
        if self.cache.try_borrow_mut().is_err() {
            self.is_dispose_requested.set(true);
            return;
        }
        debug!("dispose keyed cache");
        self.finish();
        self.output.close();
    }
}

impl<T: 'static> Obs<Vec<T>> {
    /// Maps each item identity to a resource; see [`attach`].
    ///
    /// Each subscription attaches its own cache and disposes it when unsubscribed.
    pub fn map_list_by<K, R>(
        &self,
        identity: impl Fn(&T) -> K + Clone + 'static,
        mut factory: impl FnMut(&K, Obs<T>) -> R + Clone + 'static,
    ) -> Obs<Vec<R::Handle>>
    where
        T: Clone,
        K: Eq + Hash + Clone + Debug + 'static,
        R: Resource,
    {
        self.try_map_list_by(identity, move |key, view| Ok(factory(key, view)))
    }

    /// Like [`map_list_by`](Self::map_list_by), with a factory that can fail.
    pub fn try_map_list_by<K, R>(
        &self,
        identity: impl Fn(&T) -> K + Clone + 'static,
        factory: impl FnMut(&K, Obs<T>) -> Result<R> + Clone + 'static,
    ) -> Obs<Vec<R::Handle>>
    where
        T: Clone,
        K: Eq + Hash + Clone + Debug + 'static,
        R: Resource,
    {
        let source = self.clone();
        Obs::new(move |sink| {
            let subject = Subject::replay_latest();
            let output = subject.as_obs().subscribe_sink(sink);
            let keyed = attach_to(
                &source,
                KeyedOptions::default(),
                identity.clone(),
                factory.clone(),
                subject,
            );
            Subscription::merge([output, keyed.subscription])
        })
    }
}

impl<K> Obs<Vec<K>>
where
    K: Eq + Hash + Clone + Debug + 'static,
{
    /// Maps each distinct id of the list to a resource created once per presence of the id.
    pub fn map_ids<R: Resource>(
        &self,
        mut factory: impl FnMut(&K) -> R + Clone + 'static,
    ) -> Obs<Vec<R::Handle>> {
        self.map_list_by(|id: &K| id.clone(), move |id, _| factory(id))
    }
}
