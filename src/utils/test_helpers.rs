use std::{any::Any, fmt::Debug};

use assert_call::call;

use crate::{Obs, Subscription};

pub fn call_on_drop(s: &'static str) -> impl Any {
    struct OnDrop(&'static str);
    impl Drop for OnDrop {
        fn drop(&mut self) {
            call!("{}", self.0);
        }
    }
    OnDrop(s)
}

/// Subscribes and records each event as `call!("{e:?}")`.
pub fn record<T: Debug + 'static>(obs: &Obs<T>) -> Subscription {
    obs.subscribe(|e| call!("{e:?}"))
}
