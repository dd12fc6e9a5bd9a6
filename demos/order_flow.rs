//! Order Processing Workflow
//!
//! This example demonstrates a hierarchical machine: a composite
//! `processing` state built from a sub-definition, guarded transitions
//! over a mutable context, and snapshot/restore across machine instances.
//!
//! Key concepts:
//! - Sub-definition merge into a composite state
//! - Event bubbling from leaf to ancestors
//! - Guards and actions reading event arguments
//! - Resuming from a snapshot without replaying entry hooks
//!
//! Run with: cargo run --example order_flow

use std::sync::Arc;

use canopy::{Definition, DefinitionBuilder, Event, Machine, StateSpec, TransitionSpec};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Order {
    paid: u32,
    price: u32,
    packed: bool,
}

fn order_def() -> Definition<Order> {
    let processing = DefinitionBuilder::new("processing")
        .state(StateSpec::new("paying").initial().description("awaiting payment"))
        .state(
            StateSpec::new("packing")
                .terminal()
                .on_entry(|_, order: &mut Order| {
                    order.packed = true;
                    Ok(())
                }),
        )
        .on(
            TransitionSpec::new("pay", "paying", "packing")
                .guard(|event, order: &Order| {
                    event.arg::<u32>(0).is_some_and(|amount| order.paid + amount >= order.price)
                })
                .action(|event, order: &mut Order| {
                    order.paid += event.arg::<u32>(0).copied().unwrap_or(0);
                    Ok(())
                }),
        )
        .current("paying")
        .build()
        .expect("sub-definition is valid");

    DefinitionBuilder::new("order")
        .state(StateSpec::new("processing").initial().sub_definition(processing))
        .state(StateSpec::new("shipped").terminal())
        .state(StateSpec::new("cancelled").terminal())
        .on(TransitionSpec::new("ship", "packing", "shipped"))
        // Cancellation bubbles: it is declared on the composite, so any
        // leaf inside `processing` can be cancelled.
        .on(TransitionSpec::new("cancel", "processing", "cancelled"))
        .current("processing")
        .build()
        .expect("definition is valid")
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("=== Order Processing Workflow ===\n");

    let def = Arc::new(order_def());
    let machine = Machine::new(
        def.clone(),
        Order {
            price: 100,
            ..Order::default()
        },
    );

    machine.start().await.expect("machine starts");
    println!("Active path: {:?}", machine.current_path());

    // Underpayment is rejected by the guard.
    let underpaid = machine
        .dispatch(Event::with_args("pay", vec![Box::new(40u32)]))
        .await;
    println!("pay 40  -> {:?} (still {})", underpaid.err(), machine.current());

    machine
        .dispatch(Event::with_args("pay", vec![Box::new(100u32)]))
        .await
        .expect("full payment transitions");
    println!("pay 100 -> {} (packed: {})", machine.current(), machine.context().packed);

    // Externalize mid-flow and resume on a fresh machine.
    let snapshot = machine.snapshot().expect("snapshot captures");
    machine.stop().await.expect("machine stops");

    let resumed = Machine::new(def, Order::default());
    resumed.restore(&snapshot).await.expect("snapshot restores");
    println!(
        "resumed at {} with paid={} (entry hooks not replayed)",
        resumed.current(),
        resumed.context().paid
    );

    resumed.dispatch(Event::new("ship")).await.expect("order ships");
    println!("ship    -> {}", resumed.current());

    resumed.stop().await.expect("machine stops");
    println!("\n=== Example Complete ===");
}
