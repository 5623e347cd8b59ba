//! A counter that survives a "reload" of its window

use tincan_persist::platform::Origin;
use tincan_persist::{local_storage, persist, ComponentScope, Effect, PersistOptions};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Persisted Counter ===\n");

    let origin = Origin::new();
    let window = origin.open_window();

    println!("1. Mounting the counter component");
    let component = ComponentScope::new();
    let count = component
        .run(|| persist(local_storage(Some(&window), "count", 0), PersistOptions::scoped()))
        .expect("mounted inside a component");

    let render = Effect::new({
        let count = count.clone();
        move || println!("   [Render] count = {}", count.get())
    });

    println!("\n2. Clicking increment three times");
    for _ in 0..3 {
        count.update(|n| *n += 1);
    }
    println!(
        "   localStorage[\"count\"] = {:?}",
        window.local_storage().get_item("count")
    );

    println!("\n3. Unmounting the component");
    drop(render);
    drop(component);

    println!("\n4. Mounting it again");
    let component = ComponentScope::new();
    let count = component
        .run(|| persist(local_storage(Some(&window), "count", 0), PersistOptions::scoped()))
        .expect("mounted inside a component");
    println!("   restored count = {}", count.get());

    println!("\n5. Resetting");
    count.reset();
    println!(
        "   count = {}, localStorage[\"count\"] = {:?}",
        count.get(),
        window.local_storage().get_item("count")
    );

    println!("\n=== Done ===");
}
