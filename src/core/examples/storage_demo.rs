use env_logger::Env;
use log::info;
use logserver::configuration::types::StorageConfig;
use logserver::storage::lifecycle;
use logserver::storage::loader::load;
use logserver::storage::storage_trait::Storer;
use logserver::storage::types::Data;
use std::env;
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    // Initialize logger (RUST_LOG can override; default to info)
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();

    // Choose where the stores live
    let out_dir: PathBuf = env::var("STORAGE_DEMO_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            env::current_dir()
                .expect("cwd")
                .join("target")
                .join("storage_demo")
        });
    std::fs::create_dir_all(&out_dir).expect("create output dir");

    let (trigger, shutdown) = lifecycle::channel();
    let configs = [
        StorageConfig::new("embedded", out_dir.join("kv").to_string_lossy()),
        StorageConfig::new("relational", out_dir.join("demo.sqlite3").to_string_lossy()),
        StorageConfig::new("memory", ""),
    ];

    for config in &configs {
        let store = load(config, shutdown.clone()).await.expect("open store");
        info!("Writing samples to {} store", store.kind());

        for (minute, temp) in ["21.5", "21.75", "22.0"].iter().enumerate() {
            let dt = format!("2024-01-01 12:{:02}", minute);
            store
                .write(Data::new("cave", dt.as_str(), "temp", *temp))
                .await
                .expect("write temp");
            store
                .write(Data::new("cave", dt.as_str(), "heater", "1"))
                .await
                .expect("write heater");
        }
        // same key again: replaces the previous value
        store
            .write(Data::new("cave", "2024-01-01 12:00", "heater", "0"))
            .await
            .expect("overwrite heater");

        let view = store.view("cave").await.expect("view");
        println!(
            "{}: {}",
            store.kind(),
            serde_json::to_string(&view).expect("serialize view")
        );
        store.close().await;
    }

    trigger.trigger();
}
