//! Turnstile State Machine
//!
//! This example demonstrates a flat two-state machine with a transition
//! log observing every attempt.
//!
//! Key concepts:
//! - Fluent definition building
//! - Synchronous event dispatch
//! - Subscriber-based observation
//!
//! Run with: cargo run --example turnstile

use std::sync::Arc;

use canopy::{DefinitionBuilder, Event, Machine, StateSpec, TransitionLog, TransitionSpec};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("=== Turnstile State Machine ===\n");

    let def = DefinitionBuilder::new("turnstile")
        .state(
            StateSpec::new("locked")
                .initial()
                .description("arm locked, coin required"),
        )
        .state(StateSpec::new("unlocked").terminal())
        .on(TransitionSpec::new("coin", "locked", "unlocked"))
        .on(TransitionSpec::new("push", "unlocked", "locked"))
        .current("locked")
        .build()
        .expect("definition is valid");

    let log = Arc::new(TransitionLog::new());
    let machine = Machine::new(Arc::new(def), ());
    machine.subscribe(log.clone());

    machine.start().await.expect("machine starts");
    println!("Initial state: {}", machine.current());

    for event in ["coin", "push", "push"] {
        match machine.dispatch(Event::new(event)).await {
            Ok(()) => println!("  {event:>5} -> {}", machine.current()),
            Err(err) => println!("  {event:>5} -> rejected: {err}"),
        }
    }

    machine.stop().await.expect("machine stops");

    println!("\nObserved attempts:");
    for record in log.records() {
        let outcome = record.error.as_deref().unwrap_or("ok");
        println!("  {} -> {} on '{}' ({outcome})", record.from, record.to, record.event);
    }

    println!("\n=== Example Complete ===");
}
