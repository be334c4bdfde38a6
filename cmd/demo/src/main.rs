//! rtevent basic example
//!
//! Demonstrates `after`/`timer`-style scheduling against a toy script host.

use rtevent::{parse_time_value, EventScheduler, ScriptHost};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A script host that just records what it was asked to evaluate, standing
/// in for a real embedded interpreter.
struct LoggingHost {
    log: Vec<String>,
}

impl ScriptHost for LoggingHost {
    fn eval(&mut self, script: &str) -> Result<String, String> {
        self.log.push(script.to_string());
        if script == "boom" {
            Err("deliberate failure".to_string())
        } else {
            Ok(String::new())
        }
    }

    fn report_background_error(&mut self, script: &str, error: &str) {
        println!("background error from {script:?}: {error}");
    }
}

fn main() {
    println!("=== rtevent demo ===\n");

    let scheduler = EventScheduler::new();
    let host = Arc::new(Mutex::new(LoggingHost { log: Vec::new() }));
    let fired = Arc::new(AtomicUsize::new(0));

    // `after 10 { puts "tick 1" }`
    let h1 = host.clone();
    let f1 = fired.clone();
    let id1 = scheduler
        .after_ms(10, "tick 1", move || {
            rtevent::commands::run_as_background(&mut *h1.lock().unwrap(), "tick 1");
            f1.fetch_add(1, Ordering::SeqCst);
        })
        .expect("schedule tick 1");
    println!("scheduled {id1:?}");

    // `after 20 boom` - a script that errors, to show background-error reporting.
    let h2 = host.clone();
    scheduler
        .after_ms(20, "boom", move || {
            rtevent::commands::run_as_background(&mut *h2.lock().unwrap(), "boom");
        })
        .expect("schedule boom");

    // `timer idle { puts "idle work" }`
    let h3 = host.clone();
    let idle_id = scheduler.idle("idle work", move || {
        rtevent::commands::run_as_background(&mut *h3.lock().unwrap(), "idle work");
    });
    if let Ok(desc) = scheduler.describe(idle_id) {
        let (command, kind) = desc.after_info_words();
        println!("after info {idle_id:?} -> {{{command} {kind}}}");
    }

    // `timer in 5 ms { puts "tick 2" }`, parsed the way the command surface would.
    let delay_us = parse_time_value(5.0, "ms").expect("parse delay");
    let h4 = host.clone();
    let f4 = fired.clone();
    scheduler
        .after_monotonic_us(delay_us, "tick 2", move || {
            rtevent::commands::run_as_background(&mut *h4.lock().unwrap(), "tick 2");
            f4.fetch_add(1, Ordering::SeqCst);
        })
        .expect("schedule tick 2");

    println!("pending before sleep: {}", scheduler.pending_ids().len());

    scheduler.sleep_for(Duration::from_millis(30)).expect("sleep");
    while scheduler.drain_due() > 0 {}

    println!("pending after drain: {}", scheduler.pending_ids().len());
    println!("timers fired: {}", fired.load(Ordering::SeqCst));
    println!("scripts evaluated: {:?}", host.lock().unwrap().log);

    println!("\n=== Example Complete ===");
}
