//! Two windows of one origin sharing a theme setting

use tincan_persist::platform::{Origin, Window};
use tincan_persist::{local_storage_with, persist, Effect, PersistOptions, Persisted, StorageOptions};
use tracing_subscriber::EnvFilter;

fn bind_theme(window: &Window) -> Persisted<String> {
    let options = StorageOptions::new().sync_tabs(true);
    let storage = local_storage_with(Some(window), "theme", "light".to_string(), options);
    persist(storage, PersistOptions::wide()).expect("wide bindings need no component")
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Cross-Tab Sync ===\n");

    let origin = Origin::new();
    let first = origin.open_window();
    let second = origin.open_window();
    println!("Opened {} windows", origin.open_windows());

    let theme_a = bind_theme(&first);
    let theme_b = bind_theme(&second);

    let _watch_b = Effect::new({
        let theme_b = theme_b.clone();
        move || println!("   [Window {}] theme = {}", second.id(), theme_b.get())
    });

    println!("\n1. Window {} switches to dark", first.id());
    theme_a.set("dark".to_string());

    println!("\n2. Writing the same value again sends nothing");
    theme_a.set("dark".to_string());

    println!("\n3. Window {} resets", first.id());
    theme_a.reset();

    println!("\n4. Window {} stops listening", first.id());
    theme_a.cleanup();
    theme_b.set("solarized".to_string());
    println!("   window {} still sees {}", first.id(), theme_a.get());

    theme_b.cleanup();
    println!("\n=== Done ===");
}
