use std::{cell::RefCell, rc::Rc};

use assert_call::{call, CallRecorder};
use keyflow::{
    attach, attach_with, DedupPolicy, Disposable, Error, Event, Keyed, KeyedOptions, Obs,
    Owned, Resource, Subject, Subscription,
};
use rstest::rstest;

struct Probe {
    key: &'static str,
    _view: Subscription,
}
impl Disposable for Probe {
    fn dispose(self) {
        call!("dispose {}", self.key);
    }
}
impl Resource for Probe {
    type Handle = &'static str;
    fn handle(&self) -> &'static str {
        self.key
    }
}

fn id_probe(key: &&'static str) -> Probe {
    call!("create {key}");
    Probe {
        key,
        _view: Subscription::empty(),
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Item {
    id: &'static str,
    v: i32,
}
fn item(id: &'static str, v: i32) -> Item {
    Item { id, v }
}

fn item_probe(key: &&'static str, view: Obs<Item>) -> keyflow::Result<Probe> {
    let key = *key;
    call!("create {key}");
    let view = view.subscribe(move |e| match e {
        Event::Next(item) => call!("view {key} {}", item.v),
        e => call!("view {key} {:?}", e.map(|_| ())),
    });
    Ok(Probe { key, _view: view })
}

fn record_output(keyed: &Keyed<&'static str>) -> Subscription {
    keyed.output().subscribe(|e| call!("output {e:?}"))
}

#[test]
fn scenario_a_creates_only_new_keys() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let keyed = attach(&input.as_obs(), |id: &&'static str| *id, |id, _| Ok(id_probe(id)));
    let _s = record_output(&keyed);

    input.next(vec!["id1", "id2", "id3"]);
    cr.verify([
        "create id1",
        "create id2",
        "create id3",
        r#"output Next(["id1", "id2", "id3"])"#,
    ]);

    input.next(vec!["id1", "id2", "id3", "id4"]);
    cr.verify([
        "create id4",
        r#"output Next(["id1", "id2", "id3", "id4"])"#,
    ]);
}

#[test]
fn scenario_b_repeated_sequence_creates_once() {
    let mut cr = CallRecorder::new();
    let input = Obs::from_iter([vec!["id1", "id2"], vec!["id1", "id2"], vec!["id1", "id2"]]);
    let _s = input
        .map_ids(id_probe)
        .subscribe(|e| call!("output {e:?}"));
    cr.verify([
        "create id1",
        "create id2",
        r#"output Next(["id1", "id2"])"#,
        "dispose id1",
        "dispose id2",
        "output Complete",
    ]);
}

#[test]
fn scenario_c_disposes_before_empty_output() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let keyed = attach(&input.as_obs(), |id: &&'static str| *id, |id, _| Ok(id_probe(id)));
    let _s = record_output(&keyed);
    input.next(vec!["id1", "id2"]);
    cr.verify(["create id1", "create id2", r#"output Next(["id1", "id2"])"#]);

    input.next(vec![]);
    cr.verify(["dispose id1", "dispose id2", "output Next([])"]);
}

#[test]
fn reorder_does_not_recreate() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let keyed = attach(&input.as_obs(), |id: &&'static str| *id, |id, _| Ok(id_probe(id)));
    let _s = record_output(&keyed);
    input.next(vec!["a", "b"]);
    cr.verify(["create a", "create b", r#"output Next(["a", "b"])"#]);
    input.next(vec!["b", "a"]);
    cr.verify(r#"output Next(["b", "a"])"#);
}

#[test]
fn removed_key_that_returns_is_created_again() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let keyed = attach(&input.as_obs(), |id: &&'static str| *id, |id, _| Ok(id_probe(id)));
    input.next(vec!["a"]);
    input.next(vec![]);
    input.next(vec!["a"]);
    cr.verify(["create a", "dispose a", "create a"]);
    assert_eq!(keyed.latest(), Some(vec!["a"]));
}

#[test]
fn views_receive_item_updates() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let keyed = attach(&input.as_obs(), |x: &Item| x.id, item_probe);
    let _s = record_output(&keyed);

    input.next(vec![item("a", 1), item("b", 1)]);
    cr.verify([
        "create a",
        "view a 1",
        "create b",
        "view b 1",
        r#"output Next(["a", "b"])"#,
    ]);

    input.next(vec![item("a", 2), item("b", 1)]);
    cr.verify(["view a 2", "view b 1"]);

    input.next(vec![item("b", 3), item("a", 4)]);
    cr.verify(["view b 3", "view a 4", r#"output Next(["b", "a"])"#]);
}

#[test]
fn fresh_view_subscriber_sees_latest_value() {
    let views = Rc::new(RefCell::new(Vec::new()));
    let input = Subject::new();
    let keyed = attach(&input.as_obs(), |x: &Item| x.id, {
        let views = views.clone();
        move |_: &&'static str, view: Obs<Item>| {
            views.borrow_mut().push(view);
            Ok(Owned::new((), Subscription::empty()))
        }
    });
    input.next(vec![item("a", 1)]);
    input.next(vec![item("a", 2)]);

    let latest = Rc::new(RefCell::new(None));
    let _s = views.borrow()[0].for_each({
        let latest = latest.clone();
        move |x| *latest.borrow_mut() = Some(x)
    });
    assert_eq!(*latest.borrow(), Some(item("a", 2)));
    assert_eq!(keyed.latest(), Some(vec![()]));
}

#[test]
fn duplicate_keys_last_wins() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let keyed = attach(&input.as_obs(), |x: &Item| x.id, item_probe);
    let _s = record_output(&keyed);
    input.next(vec![item("1", 10), item("1", 20)]);
    cr.verify(["create 1", "view 1 20", r#"output Next(["1"])"#]);
}

#[rstest]
#[case(DedupPolicy::Emit, &["view a 2", r#"output Next(["a"])"#])]
#[case(DedupPolicy::ValuesOnly, &["view a 2"])]
#[case(DedupPolicy::Skip, &[])]
fn dedup_policy(#[case] dedup: DedupPolicy, #[case] expected: &[&str]) {
    let _cr = CallRecorder::new();
    let calls = Rc::new(RefCell::new(Vec::new()));
    let input = Subject::new();
    let keyed = attach_with(
        &input.as_obs(),
        KeyedOptions::new().dedup(dedup),
        |x: &Item| x.id,
        {
            let calls = calls.clone();
            move |key: &&'static str, view: Obs<Item>| {
                let key = *key;
                let calls = calls.clone();
                let view = view.for_each(move |x| calls.borrow_mut().push(format!("view {key} {}", x.v)));
                Ok(Probe { key, _view: view })
            }
        },
    );
    let _s = keyed.output().for_each({
        let calls = calls.clone();
        move |keys| calls.borrow_mut().push(format!("output Next({keys:?})"))
    });
    input.next(vec![item("a", 1)]);
    calls.borrow_mut().clear();

    input.next(vec![item("a", 2)]);
    assert_eq!(*calls.borrow(), expected);
}

#[test]
fn views_complete_on_evict_when_configured() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let keyed = attach_with(
        &input.as_obs(),
        KeyedOptions::new().complete_views_on_evict(true),
        |x: &Item| x.id,
        item_probe,
    );
    input.next(vec![item("a", 1)]);
    cr.verify(["create a", "view a 1"]);
    input.next(vec![]);
    cr.verify(["view a Complete", "dispose a"]);
    drop(keyed);
}

#[test]
fn upstream_completion_disposes_then_completes() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let keyed = attach(&input.as_obs(), |id: &&'static str| *id, |id, _| Ok(id_probe(id)));
    let _s = record_output(&keyed);
    input.next(vec!["a", "b"]);
    cr.verify(["create a", "create b", r#"output Next(["a", "b"])"#]);
    input.complete();
    cr.verify(["dispose a", "dispose b", "output Complete"]);
}

#[test]
fn upstream_error_disposes_then_fails() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let keyed = attach(&input.as_obs(), |id: &&'static str| *id, |id, _| Ok(id_probe(id)));
    let _s = record_output(&keyed);
    input.next(vec!["a"]);
    cr.verify(["create a", r#"output Next(["a"])"#]);
    input.error(Error::msg("lost"));
    cr.verify(["dispose a", r#"output Error(Message("lost"))"#]);

    let _late = record_output(&keyed);
    cr.verify([r#"output Next(["a"])"#, r#"output Error(Message("lost"))"#]);
}

#[test]
fn factory_failure_disposes_everything_and_fails() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let keyed = attach(&input.as_obs(), |id: &&'static str| *id, |id: &&'static str, _| {
        if *id == "bad" {
            call!("fail {id}");
            Err(Error::msg("cannot"))
        } else {
            Ok(id_probe(id))
        }
    });
    let _s = record_output(&keyed);
    input.next(vec!["a"]);
    cr.verify(["create a", r#"output Next(["a"])"#]);

    input.next(vec!["a", "b", "bad"]);
    cr.verify([
        "create b",
        "fail bad",
        "dispose a",
        "dispose b",
        r#"output Error(Factory { key: "\"bad\"", source: Message("cannot") })"#,
    ]);
    assert_eq!(input.subscriber_count(), 0);

    input.next(vec!["c"]);
    cr.verify(());
}

#[test]
fn dispose_is_idempotent_and_cancels_input() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let mut keyed = attach(&input.as_obs(), |id: &&'static str| *id, |id, _| Ok(id_probe(id)));
    let _s = record_output(&keyed);
    input.next(vec!["a", "b"]);
    cr.verify(["create a", "create b", r#"output Next(["a", "b"])"#]);
    assert_eq!(input.subscriber_count(), 1);

    keyed.dispose();
    cr.verify(["dispose a", "dispose b"]);
    assert!(keyed.is_disposed());
    assert_eq!(input.subscriber_count(), 0);

    keyed.dispose();
    input.next(vec!["c"]);
    drop(keyed);
    cr.verify(());
}

#[test]
fn dropping_keyed_disposes() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let keyed = attach(&input.as_obs(), |id: &&'static str| *id, |id, _| Ok(id_probe(id)));
    input.next(vec!["a"]);
    cr.verify("create a");
    drop(keyed);
    cr.verify("dispose a");
}

#[test]
fn into_parts_dispose_handle() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let keyed = attach(&input.as_obs(), |id: &&'static str| *id, |id, _| Ok(id_probe(id)));
    let (output, dispose) = keyed.into_parts();
    let _s = output.subscribe(|e| call!("output {e:?}"));
    input.next(vec!["a"]);
    cr.verify(["create a", r#"output Next(["a"])"#]);
    dispose.dispose();
    cr.verify("dispose a");
}

#[test]
fn dispose_requested_by_factory_is_deferred() {
    let mut cr = CallRecorder::new();
    let slot: Rc<RefCell<Option<Keyed<&'static str>>>> = Rc::new(RefCell::new(None));
    let input = Subject::new();
    let keyed = attach(&input.as_obs(), |id: &&'static str| *id, {
        let slot = slot.clone();
        move |id: &&'static str, _| {
            if *id == "stop" {
                call!("stop");
                if let Some(keyed) = slot.borrow_mut().as_mut() {
                    keyed.dispose();
                }
            }
            Ok(id_probe(id))
        }
    });
    let _s = record_output(&keyed);
    *slot.borrow_mut() = Some(keyed);

    input.next(vec!["a"]);
    cr.verify(["create a", r#"output Next(["a"])"#]);
    input.next(vec!["a", "stop", "c"]);
    cr.verify(["stop", "create stop", "dispose a", "dispose stop"]);
    assert_eq!(slot.borrow().as_ref().and_then(|k| k.latest()), None);
    assert_eq!(input.subscriber_count(), 0);
    slot.borrow_mut().take();
    cr.verify(());
}

#[test]
fn input_pushed_by_factory_is_applied_after_current_list() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let keyed = attach(&input.as_obs(), |id: &&'static str| *id, {
        let input = input.clone();
        move |id: &&'static str, _| {
            if *id == "a" {
                input.next(vec!["b"]);
            }
            Ok(id_probe(id))
        }
    });
    let _s = record_output(&keyed);
    input.next(vec!["a"]);
    cr.verify([
        "create a",
        r#"output Next(["a"])"#,
        "dispose a",
        "create b",
        r#"output Next(["b"])"#,
    ]);
    assert_eq!(keyed.latest(), Some(vec!["b"]));
}

#[test]
fn input_pushed_by_view_subscriber_is_applied_after_current_list() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let keyed = attach(&input.as_obs(), |x: &Item| x.id, {
        let input = input.clone();
        move |key: &&'static str, view: Obs<Item>| {
            let key = *key;
            call!("create {key}");
            let input = input.clone();
            let view = view.for_each(move |x: Item| {
                call!("view {key} {}", x.v);
                if x.v == 1 {
                    input.next(vec![item("c", 0), item(key, 2)]);
                }
            });
            Ok(Probe { key, _view: view })
        }
    });
    let _s = record_output(&keyed);
    input.next(vec![item("a", 0)]);
    cr.verify(["create a", "view a 0", r#"output Next(["a"])"#]);

    input.next(vec![item("a", 1), item("b", 0)]);
    cr.verify([
        "view a 1",
        "create b",
        "view b 0",
        r#"output Next(["a", "b"])"#,
        "dispose b",
        "view a 2",
        "create c",
        "view c 0",
        r#"output Next(["c", "a"])"#,
    ]);
}

#[test]
fn inner_streams_are_created_once_and_combined() {
    let mut cr = CallRecorder::new();
    let created = Rc::new(RefCell::new(Vec::new()));
    let input = Obs::from_iter([vec![1], vec![1], vec![1, 2]]);
    let output = input.map_ids({
        let created = created.clone();
        move |id: &i32| {
            created.borrow_mut().push(*id);
            Obs::of(*id).hot()
        }
    });
    let _s = output
        .map(|handles| Obs::combine(handles))
        .switch_latest()
        .subscribe(|e| call!("{e:?}"));
    cr.verify(["Next([1])", "Next([1, 2])", "Complete"]);
    assert_eq!(*created.borrow(), vec![1, 2]);
}

#[test]
fn cold_operator_attaches_per_subscription() {
    let mut cr = CallRecorder::new();
    let input = Subject::new();
    let output = input
        .as_obs()
        .map_list_by(|x: &Item| x.id, |key: &&'static str, _| id_probe(key));
    let s0 = output.subscribe(|e| call!("s0 {e:?}"));
    input.next(vec![item("a", 1)]);
    cr.verify(["create a", r#"s0 Next(["a"])"#]);

    let s1 = output.subscribe(|e| call!("s1 {e:?}"));
    input.next(vec![item("a", 1), item("b", 2)]);
    cr.verify([
        "create b",
        r#"s0 Next(["a", "b"])"#,
        "create a",
        "create b",
        r#"s1 Next(["a", "b"])"#,
    ]);
    drop(s0);
    cr.verify(["dispose a", "dispose b"]);
    drop(s1);
    cr.verify(["dispose a", "dispose b"]);
}
