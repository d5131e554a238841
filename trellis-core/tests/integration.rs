//! Integration Tests for Reactive System
//!
//! These tests verify that observables, derived values and reactions work
//! together correctly through the public API.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::{
    autorun, autorun_handle_changes, derived, observable, ChangeContext, Derived, Observable,
    ObserverState, ReactiveError, Runtime,
};

fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
    let c = Rc::new(Cell::new(0));
    (c.clone(), c)
}

fn bump(c: &Cell<usize>) {
    c.set(c.get() + 1);
}

/// The motivating scenario: two writes in one transaction, a derived value
/// that ends up unchanged, and a reaction that therefore does not re-run.
#[test]
fn is_even_scenario() {
    let rt = Runtime::new();
    let count = observable(&rt, 0);
    let (computes, computes2) = counter();
    let c = count.clone();
    let is_even = derived(&rt, move |r| {
        bump(&computes2);
        Ok(c.read(r)? % 2 == 0)
    });

    let log = Rc::new(RefCell::new(Vec::new()));
    let (e, l) = (is_even.clone(), log.clone());
    let _reaction = autorun(&rt, move |r| {
        l.borrow_mut().push(e.read(r)?.to_string());
        Ok(())
    });
    assert_eq!(computes.get(), 1);

    rt.transaction(|| {
        count.set(2).unwrap();
        count.set(4).unwrap();
    })
    .unwrap();

    assert_eq!(*log.borrow(), vec!["true"]);
    assert_eq!(computes.get(), 2);
}

/// A diamond recomputes its join exactly once per change, and the
/// reaction on top never sees a half-updated diamond.
#[test]
fn diamond_is_glitch_free() {
    let rt = Runtime::new();
    let a = observable(&rt, 1);
    let a1 = a.clone();
    let b = derived(&rt, move |r| Ok(a1.read(r)? * 2));
    let a2 = a.clone();
    let c = derived(&rt, move |r| Ok(a2.read(r)? + 10));
    let (joins, joins2) = counter();
    let (b2, c2) = (b.clone(), c.clone());
    let d = derived(&rt, move |r| {
        bump(&joins2);
        Ok(b2.read(r)? + c2.read(r)?)
    });

    let seen = Rc::new(RefCell::new(Vec::new()));
    let (a3, d2, seen2) = (a.clone(), d.clone(), seen.clone());
    let _reaction = autorun(&rt, move |r| {
        let av = a3.read(r)?;
        let dv = d2.read(r)?;
        assert_eq!(dv, av * 2 + av + 10, "observed an inconsistent diamond");
        seen2.borrow_mut().push(dv);
        Ok(())
    });

    a.set(2).unwrap();
    a.set(3).unwrap();
    assert_eq!(*seen.borrow(), vec![13, 16, 19]);
    assert_eq!(joins.get(), 3);
}

/// A derived value that nobody reads is never computed.
#[test]
fn unobserved_derived_is_never_computed() {
    let rt = Runtime::new();
    let a = observable(&rt, 1);
    let (computes, computes2) = counter();
    let a1 = a.clone();
    let d = derived(&rt, move |r| {
        bump(&computes2);
        Ok(a1.read(r)? + 1)
    });

    for i in 0..10 {
        a.set(i).unwrap();
    }
    assert_eq!(computes.get(), 0);
    assert_eq!(d.state(), Some(ObserverState::Uninitialized));
}

/// Equality at a middle node stops propagation below it.
#[test]
fn equality_suppresses_downstream_work() {
    let rt = Runtime::new();
    let temperature = observable(&rt, 21.4_f64);
    let t = temperature.clone();
    let rounded = derived(&rt, move |r| Ok(t.read(r)?.round() as i64));
    let (downstream, downstream2) = counter();
    let rd = rounded.clone();
    let label = derived(&rt, move |r| {
        bump(&downstream2);
        Ok(format!("{} degrees", rd.read(r)?))
    });

    assert_eq!(label.get(), Ok("21 degrees".to_string()));
    temperature.set(21.2).unwrap();
    assert_eq!(label.get(), Ok("21 degrees".to_string()));
    assert_eq!(downstream.get(), 1);
    temperature.set(22.0).unwrap();
    assert_eq!(label.get(), Ok("22 degrees".to_string()));
    assert_eq!(downstream.get(), 2);
}

/// Edges that the last run did not read are removed.
#[test]
fn dynamic_dependencies_are_pruned() {
    let rt = Runtime::new();
    let use_first = observable(&rt, true);
    let first = observable(&rt, "Ada".to_string());
    let second = observable(&rt, "Grace".to_string());
    let (runs, runs2) = counter();
    let (u, f, s) = (use_first.clone(), first.clone(), second.clone());
    let _reaction = autorun(&rt, move |r| {
        bump(&runs2);
        if u.read(r)? {
            f.read(r)?;
        } else {
            s.read(r)?;
        }
        Ok(())
    });

    second.set("Hopper".to_string()).unwrap();
    assert_eq!(runs.get(), 1);

    use_first.set(false).unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(first.dependent_count(), 0);

    first.set("Lovelace".to_string()).unwrap();
    assert_eq!(runs.get(), 2);
    second.set("Grace".to_string()).unwrap();
    assert_eq!(runs.get(), 3);
}

/// Two writes in one transaction reach a shared dependent together.
#[test]
fn transaction_is_atomic() {
    let rt = Runtime::new();
    let first = observable(&rt, 1);
    let last = observable(&rt, 2);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (f, l, seen2) = (first.clone(), last.clone(), seen.clone());
    let _reaction = autorun(&rt, move |r| {
        seen2.borrow_mut().push((f.read(r)?, l.read(r)?));
        Ok(())
    });

    rt.transaction(|| {
        first.set(10).unwrap();
        last.set(20).unwrap();
    })
    .unwrap();
    assert_eq!(*seen.borrow(), vec![(1, 2), (10, 20)]);
}

/// Derived values that read each other fail with a cycle error instead of
/// recursing forever.
#[test]
fn derived_cycle_is_rejected() {
    let rt = Runtime::new();
    let slot: Rc<RefCell<Option<Derived<i32>>>> = Rc::new(RefCell::new(None));
    let slot2 = slot.clone();
    let x = derived(&rt, move |r| {
        let y = slot2.borrow().clone();
        match y {
            Some(y) => Ok(y.read(r)? + 1),
            None => Ok(0),
        }
    });
    let x2 = x.clone();
    let y = derived(&rt, move |r| Ok(x2.read(r)? + 1));
    *slot.borrow_mut() = Some(y.clone());

    let err = x.get().unwrap_err();
    assert!(err.is_cycle(), "expected cycle, got {err}");
    assert!(y.get().unwrap_err().is_cycle());
}

/// A reaction writing to something it depends on is a cycle. The write is
/// rejected before it is applied.
#[test]
fn write_into_own_dependency_is_rejected() {
    let rt = Runtime::new();
    let errors = Rc::new(RefCell::new(Vec::new()));
    let errors2 = errors.clone();
    rt.set_error_handler(move |err, _| errors2.borrow_mut().push(err.clone()));

    let a = observable(&rt, 1);
    let a2 = a.clone();
    let _reaction = autorun(&rt, move |r| {
        let v = a2.read(r)?;
        a2.set(v + 1)
    });

    assert_eq!(a.get(), Ok(1));
    assert_eq!(errors.borrow().len(), 1);
    assert!(errors.borrow()[0].is_cycle());
}

/// A derived value writing to its own input is rejected the same way.
#[test]
fn derived_writing_its_input_is_rejected() {
    let rt = Runtime::new();
    let a = observable(&rt, 1);
    let a2 = a.clone();
    let d = derived(&rt, move |r| {
        let v = a2.read(r)?;
        a2.set(v * 2)?;
        Ok(v)
    });
    assert!(d.get().unwrap_err().is_cycle());
    assert_eq!(a.get(), Ok(1));
}

/// Writes from a reaction to unrelated nodes are fine and propagate once
/// the reaction finished.
#[test]
fn reaction_may_write_downstream_state() {
    let rt = Runtime::new();
    let celsius = observable(&rt, 0.0_f64);
    let fahrenheit = observable(&rt, 32.0_f64);
    let (c, f) = (celsius.clone(), fahrenheit.clone());
    let _sync = autorun(&rt, move |r| f.set(c.read(r)? * 9.0 / 5.0 + 32.0));

    let seen = Rc::new(RefCell::new(Vec::new()));
    let (f2, seen2) = (fahrenheit.clone(), seen.clone());
    let _log = autorun(&rt, move |r| {
        seen2.borrow_mut().push(f2.read(r)?);
        Ok(())
    });

    celsius.set(100.0).unwrap();
    assert_eq!(*seen.borrow(), vec![32.0, 212.0]);
}

/// A reaction that is pending and then disposed in the same transaction is
/// dropped without running and without an error.
#[test]
fn dispose_while_pending_is_silent() {
    let rt = Runtime::new();
    let errors = Rc::new(Cell::new(0));
    let errors2 = errors.clone();
    rt.set_error_handler(move |_, _| bump(&errors2));

    let a = observable(&rt, 1);
    let (runs, runs2) = counter();
    let a2 = a.clone();
    let reaction = autorun(&rt, move |r| {
        a2.read(r)?;
        bump(&runs2);
        Ok(())
    });

    rt.transaction(|| {
        a.set(2).unwrap();
        assert_eq!(rt.pending_reactions(), 1);
        reaction.dispose();
    })
    .unwrap();

    assert_eq!(runs.get(), 1);
    assert_eq!(errors.get(), 0);
    assert_eq!(rt.pending_reactions(), 0);
}

/// One reaction disposing another that is queued behind it.
#[test]
fn reaction_disposed_by_earlier_reaction_does_not_run() {
    let rt = Runtime::new();
    let a = observable(&rt, 0);
    let victim_runs = Rc::new(Cell::new(0));

    let victim_runs2 = victim_runs.clone();
    let a1 = a.clone();
    let victim = Rc::new(RefCell::new(None));
    let killer_target = victim.clone();
    let _killer = autorun(&rt, move |r| {
        if a1.read(r)? > 0 {
            if let Some(v) = killer_target.borrow_mut().take() {
                drop(v);
            }
        }
        Ok(())
    });
    let a2 = a.clone();
    *victim.borrow_mut() = Some(autorun(&rt, move |r| {
        a2.read(r)?;
        bump(&victim_runs2);
        Ok(())
    }));

    a.set(1).unwrap();
    assert_eq!(victim_runs.get(), 1);
    assert!(victim.borrow().is_none());
    assert_eq!(a.dependent_count(), 1);
}

/// Disposing a source leaves its dependents with their cached values.
#[test]
fn disposed_source_keeps_dependents_usable() {
    let rt = Runtime::new();
    let a = observable(&rt, 5);
    let a1 = a.clone();
    let d = derived(&rt, move |r| Ok(a1.read(r)? * 3));
    assert_eq!(d.get(), Ok(15));

    a.dispose();
    assert_eq!(d.get(), Ok(15));
    assert_eq!(d.dependency_count(), 0);
    assert_eq!(a.get(), Err(ReactiveError::Disposed { node: a.id() }));
}

/// A failing reaction is reported and does not stop the others.
#[test]
fn reaction_errors_are_isolated() {
    let rt = Runtime::new();
    let failures = Rc::new(RefCell::new(Vec::new()));
    let failures2 = failures.clone();
    rt.set_error_handler(move |err, name| {
        failures2
            .borrow_mut()
            .push((name.map(str::to_owned), err.to_string()))
    });

    let a = observable(&rt, 0);
    let a1 = a.clone();
    let _bad = trellis_core::autorun_named(&rt, "validator", move |r| {
        if a1.read(r)? < 0 {
            return Err(ReactiveError::compute("negative"));
        }
        Ok(())
    });
    let (runs, runs2) = counter();
    let a2 = a.clone();
    let _good = autorun(&rt, move |r| {
        a2.read(r)?;
        bump(&runs2);
        Ok(())
    });

    a.set(-1).unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(
        *failures.borrow(),
        vec![(
            Some("validator".to_string()),
            "computation failed: negative".to_string()
        )]
    );
}

/// Errors of a derived value flow to its readers and clear on recovery.
#[test]
fn derived_errors_propagate_to_readers() {
    let rt = Runtime::new();
    let input = observable(&rt, "42".to_string());
    let i = input.clone();
    let parsed = derived(&rt, move |r| {
        i.read(r)?
            .parse::<i32>()
            .map_err(ReactiveError::compute)
    });
    let p = parsed.clone();
    let doubled = derived(&rt, move |r| Ok(p.read(r)? * 2));

    assert_eq!(doubled.get(), Ok(84));
    input.set("x".to_string()).unwrap();
    assert!(matches!(doubled.get(), Err(ReactiveError::Compute(_))));
    assert_eq!(doubled.state(), Some(ObserverState::Errored));
    input.set("5".to_string()).unwrap();
    assert_eq!(doubled.get(), Ok(10));
}

/// Nodes of different runtimes never interact.
#[test]
fn runtimes_are_independent() {
    let rt1 = Runtime::new();
    let rt2 = Runtime::new();
    let a = Observable::new(&rt1, 1);
    let b = Observable::new(&rt2, 2);
    assert_eq!(rt1.node_count(), 1);
    assert_eq!(rt2.node_count(), 1);
    rt1.shutdown();
    assert_eq!(a.get(), Err(ReactiveError::Shutdown));
    assert_eq!(b.get(), Ok(2));
    assert!(!rt1.ptr_eq(&rt2));
}

// ---- Change summaries ----

/// Collects every hint except `"ignore"`, which it declines.
fn keep_hints(ctx: &ChangeContext<'_>, kept: &mut Vec<&'static str>) -> bool {
    match ctx.hint::<&'static str>() {
        Some(&"ignore") => false,
        Some(hint) => {
            kept.push(*hint);
            true
        }
        None => true,
    }
}

fn summarized(rt: &Runtime, a: &Observable<i32>) -> Derived<(i32, Vec<&'static str>)> {
    let a = a.clone();
    Derived::with_changes(rt, Vec::new, keep_hints, move |r, kept| {
        Ok((a.read(r)?, kept))
    })
}

#[test]
fn accepted_change_survives_a_later_decline() {
    let rt = Runtime::new();
    let a = observable(&rt, 0);
    let d = summarized(&rt, &a);
    assert_eq!(d.get(), Ok((0, vec![])));

    rt.transaction(|| {
        a.set_with_hint(1, "keep").unwrap();
        a.set_with_hint(2, "ignore").unwrap();
    })
    .unwrap();
    assert_eq!(d.get(), Ok((2, vec!["keep"])));

    // The consumed summary does not leak into the next run.
    a.set_with_hint(3, "ignore").unwrap();
    assert_eq!(d.get(), Ok((2, vec!["keep"])));
    a.set_with_hint(4, "again").unwrap();
    assert_eq!(d.get(), Ok((4, vec!["again"])));
}

#[test]
fn declined_change_before_an_accepted_one() {
    let rt = Runtime::new();
    let a = observable(&rt, 0);
    let d = summarized(&rt, &a);
    d.get().unwrap();

    rt.transaction(|| {
        a.set_with_hint(1, "ignore").unwrap();
        a.set_with_hint(2, "keep").unwrap();
    })
    .unwrap();
    assert_eq!(d.get(), Ok((2, vec!["keep"])));
}

#[test]
fn summary_collects_every_hint_of_a_transaction() {
    let rt = Runtime::new();
    let a = observable(&rt, 0);
    let d = summarized(&rt, &a);
    d.get().unwrap();

    rt.transaction(|| {
        a.set_with_hint(1, "first").unwrap();
        a.set_with_hint(2, "ignore").unwrap();
        a.set_with_hint(3, "second").unwrap();
        a.set_with_hint(4, "third").unwrap();
    })
    .unwrap();
    assert_eq!(d.get(), Ok((4, vec!["first", "second", "third"])));
}

#[test]
fn handle_changes_reaction_receives_whole_batch() {
    let rt = Runtime::new();
    let a = observable(&rt, 0);
    let batches = Rc::new(RefCell::new(Vec::new()));
    let (a2, b) = (a.clone(), batches.clone());
    let reaction = autorun_handle_changes(&rt, Vec::new, keep_hints, move |r, kept| {
        b.borrow_mut().push((a2.read(r)?, kept));
        Ok(())
    });

    rt.transaction(|| {
        a.set_with_hint(1, "x").unwrap();
        a.set_with_hint(2, "ignore").unwrap();
        a.set_with_hint(3, "y").unwrap();
    })
    .unwrap();
    assert_eq!(
        *batches.borrow(),
        vec![(0, vec![]), (3, vec!["x", "y"])]
    );

    // A transaction whose changes are all declined does not run the effect.
    rt.transaction(|| {
        a.set_with_hint(5, "ignore").unwrap();
        a.set_with_hint(6, "ignore").unwrap();
    })
    .unwrap();
    assert_eq!(reaction.run_count(), 2);

    rt.transaction(|| {
        a.set_with_hint(7, "z").unwrap();
        a.set_with_hint(8, "ignore").unwrap();
    })
    .unwrap();
    assert_eq!(batches.borrow().last(), Some(&(8, vec!["z"])));
    assert_eq!(reaction.run_count(), 3);
}
