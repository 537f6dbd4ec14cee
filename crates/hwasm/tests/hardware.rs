// Integration tests for the reactive register/array model driven by real
// programs: subscriber capture, update gating, subscriber frames, and
// fire-and-forget execution.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use hwasm::{run_with, Hardware, Interpreter, Operand, RuntimeResult};

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

type Captured = Arc<Mutex<Vec<Option<Operand>>>>;

/// Poll until `done` holds or the timeout elapses. Spawned frames give no
/// completion signal, so tests that observe them have to wait.
fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn arr_iteration_captures_forward_then_backward() {
    init_logs();

    struct SampleHardware {
        forward: Captured,
        backward: Captured,
    }

    impl Hardware for SampleHardware {
        fn wire(&mut self, state: &mut Interpreter) -> RuntimeResult<()> {
            state.define_reg("rf", None)?;
            state.define_reg("rb", None)?;
            let sink = Arc::clone(&self.forward);
            state.subscribe("rf", move |value| sink.lock().unwrap().push(value))?;
            let sink = Arc::clone(&self.backward);
            state.subscribe("rb", move |value| sink.lock().unwrap().push(value))?;
            Ok(())
        }
    }

    let forward: Captured = Arc::default();
    let backward: Captured = Arc::default();
    let mut hardware = SampleHardware {
        forward: Arc::clone(&forward),
        backward: Arc::clone(&backward),
    };

    run_with(&mut hardware, || {
        ".define
         req rf, rb
         arr rs [0x1, 0x2, 0x3, 0x4, 0x5]
         .code
         seu
         @l1
         mov rf, rs
         jxt rs, l1
         rvr rs
         @l2
         mov rb, rs
         jxt rs, l2"
            .to_string()
    })
    .unwrap();

    // Register assignment waits for its subscriber round, so the captures
    // are complete and ordered by the time the program finishes.
    assert_eq!(
        *forward.lock().unwrap(),
        vec![Some(1), Some(2), Some(3), Some(4), Some(5)]
    );
    assert_eq!(
        *backward.lock().unwrap(),
        vec![Some(5), Some(4), Some(3), Some(2), Some(1)]
    );
}

#[test]
fn update_and_reset_renotify_subscribers() {
    let seen: Captured = Arc::default();
    let sink = Arc::clone(&seen);
    let mut hardware = |state: &mut Interpreter| -> RuntimeResult<()> {
        let sink = Arc::clone(&sink);
        state.subscribe("r", move |value| sink.lock().unwrap().push(value))
    };

    let program = run_with(&mut hardware, || {
        ".define
         reg r, 3
         .code
         seu
         upd r
         rst r"
            .to_string()
    });
    // `reg r` is only defined at bind time, after wire() ran.
    assert!(program.is_err());

    let seen: Captured = Arc::default();
    let sink = Arc::clone(&seen);
    let mut hardware = |state: &mut Interpreter| -> RuntimeResult<()> {
        let sink = Arc::clone(&sink);
        state.define_reg("r", Some(3))?;
        state.subscribe("r", move |value| sink.lock().unwrap().push(value))
    };

    let program = run_with(&mut hardware, || {
        ".code
         seu
         upd r
         rst r"
            .to_string()
    })
    .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![Some(3), None]);
    assert_eq!(program.lookup_reg("r").unwrap().get(), None);
}

#[test]
fn disabling_updates_suppresses_later_notifications() {
    let seen: Captured = Arc::default();
    let sink = Arc::clone(&seen);
    let mut hardware = |state: &mut Interpreter| -> RuntimeResult<()> {
        let sink = Arc::clone(&sink);
        state.define_reg("r", None)?;
        state.subscribe("r", move |value| sink.lock().unwrap().push(value))
    };

    let program = run_with(&mut hardware, || {
        ".code
         seu
         mov r, 1
         clu
         mov r, 2"
            .to_string()
    })
    .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![Some(1)]);
    assert_eq!(program.lookup_reg("r").unwrap().get(), Some(2));
}

#[test]
fn subscriber_label_runs_as_its_own_frame() {
    // `usr src, handler` wires a program label as a subscriber: each update
    // spawns a fresh context seeded with the register's value.
    let mut hardware = |_: &mut Interpreter| -> RuntimeResult<()> { Ok(()) };

    let program = run_with(&mut hardware, || {
        ".define
         reg src
         reg dst
         usr src, handler
         .code
         seu
         mov src, 5
         jmp done
         @handler
         mov dst
         ret
         @done"
            .to_string()
    })
    .unwrap();

    // The assignment to src fans in before continuing, so the handler frame
    // has already moved the value on.
    assert_eq!(program.lookup_reg("dst").unwrap().get(), Some(5));
}

#[test]
fn spawned_frame_receives_literal_seed() {
    init_logs();

    let seen: Captured = Arc::default();
    let sink = Arc::clone(&seen);
    let mut hardware = |state: &mut Interpreter| -> RuntimeResult<()> {
        let sink = Arc::clone(&sink);
        state.define_reg("r", None)?;
        state.subscribe("r", move |value| sink.lock().unwrap().push(value))
    };

    run_with(&mut hardware, || {
        ".code
         seu
         run 7, task
         jmp done
         @task
         mov r
         ret
         @done"
            .to_string()
    })
    .unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        !seen.lock().unwrap().is_empty()
    }));
    assert_eq!(*seen.lock().unwrap(), vec![Some(7)]);
}

#[test]
fn spawned_frame_seeds_from_spawning_contexts_top() {
    let seen: Captured = Arc::default();
    let sink = Arc::clone(&seen);
    let mut hardware = |state: &mut Interpreter| -> RuntimeResult<()> {
        let sink = Arc::clone(&sink);
        state.define_reg("r", None)?;
        state.subscribe("r", move |value| sink.lock().unwrap().push(value))
    };

    run_with(&mut hardware, || {
        ".code
         seu
         psh 9
         run task
         jmp done
         @task
         mov r
         ret
         @done"
            .to_string()
    })
    .unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        !seen.lock().unwrap().is_empty()
    }));
    assert_eq!(*seen.lock().unwrap(), vec![Some(9)]);
}

#[test]
fn spawned_frame_seeds_from_cell() {
    let seen: Captured = Arc::default();
    let sink = Arc::clone(&seen);
    let mut hardware = |state: &mut Interpreter| -> RuntimeResult<()> {
        let sink = Arc::clone(&sink);
        state.define_reg("r", None)?;
        state.subscribe("r", move |value| sink.lock().unwrap().push(value))
    };

    run_with(&mut hardware, || {
        ".define
         reg n, 4
         .code
         seu
         run n, task
         jmp done
         @task
         mov r
         ret
         @done"
            .to_string()
    })
    .unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        !seen.lock().unwrap().is_empty()
    }));
    assert_eq!(*seen.lock().unwrap(), vec![Some(4)]);
}
