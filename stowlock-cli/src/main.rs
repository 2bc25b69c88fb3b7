use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};

use stowlock_core::infrastructure::ObjectStore;
use stowlock_core::infrastructure_in_memory::InMemoryObjectStore;
use stowlock_core::lock::ObjectLock;
use stowlock_core::options::LockOptions;

#[derive(Parser)]
#[command(
    name = "stowlock",
    about = "stowlock — distributed locks over shared object storage",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire the lock once and hold it while simulated work runs
    Hold {
        /// Lock key
        key: String,

        /// Storage backend: "memory" or "sqlite:<path>"
        #[arg(long, default_value = "memory", env = "STOWLOCK_STORAGE")]
        storage: String,

        /// Milliseconds of simulated work inside the critical section
        #[arg(long, default_value = "1000")]
        work_ms: u64,

        /// Lease duration in seconds
        #[arg(long, default_value = "30")]
        lease_secs: u64,
    },

    /// Run several local competitors against one key
    Compete {
        /// Lock key
        key: String,

        /// Number of competing workers
        #[arg(short, long, default_value = "4")]
        workers: u32,

        /// Storage backend: "memory" or "sqlite:<path>"
        #[arg(long, default_value = "memory", env = "STOWLOCK_STORAGE")]
        storage: String,

        /// Milliseconds of simulated work per worker
        #[arg(long, default_value = "300")]
        work_ms: u64,
    },

    /// Hold the lock through a long job, renewing the lease mid-flight
    Renew {
        /// Lock key
        key: String,

        /// Storage backend: "memory" or "sqlite:<path>"
        #[arg(long, default_value = "memory", env = "STOWLOCK_STORAGE")]
        storage: String,

        /// Lease duration in seconds
        #[arg(long, default_value = "10")]
        lease_secs: u64,

        /// Number of work chunks, each followed by a renewal
        #[arg(long, default_value = "5")]
        chunks: u32,
    },

    /// Print version information
    Version,
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Hold {
            key,
            storage,
            work_ms,
            lease_secs,
        } => hold(&key, &storage, work_ms, lease_secs),
        Commands::Compete {
            key,
            workers,
            storage,
            work_ms,
        } => compete(&key, workers, &storage, work_ms),
        Commands::Renew {
            key,
            storage,
            lease_secs,
            chunks,
        } => renew(&key, &storage, lease_secs, chunks),
        Commands::Version => {
            println!("stowlock {}", env!("CARGO_PKG_VERSION"));
        }
    }
}

fn create_store(storage: &str) -> Arc<dyn ObjectStore> {
    if storage == "memory" {
        tracing::info!("using in-memory storage (single process only)");
        return Arc::new(InMemoryObjectStore::new());
    }

    #[cfg(feature = "sqlite")]
    if let Some(path) = storage.strip_prefix("sqlite:") {
        tracing::info!(path, "using SQLite storage");
        let store = stowlock_core::infrastructure_sqlite::SqliteObjectStore::open(path)
            .unwrap_or_else(|e| {
                eprintln!("Failed to open SQLite database at '{}': {}", path, e);
                std::process::exit(1);
            });
        return Arc::new(store);
    }

    eprintln!("Unknown storage backend '{}'. Use \"memory\" or \"sqlite:<path>\".", storage);
    std::process::exit(1);
}

fn hold(key: &str, storage: &str, work_ms: u64, lease_secs: u64) {
    let store = create_store(storage);
    let lock = ObjectLock::new(
        LockOptions::new(key).lease_duration(Duration::from_secs(lease_secs)),
        store,
    );

    let result = lock.execute(|ctx| {
        println!("acquired '{}' at epoch {}", key, ctx.epoch());
        thread::sleep(Duration::from_millis(work_ms));
        println!("work done, releasing");
        Ok(ctx.epoch())
    });

    match result {
        Ok(Some(epoch)) => println!("finished at epoch {}", epoch),
        Ok(None) => println!("could not acquire '{}' before retries ran out", key),
        Err(e) => eprintln!("lock failed: {}", e),
    }
}

fn compete(key: &str, workers: u32, storage: &str, work_ms: u64) {
    let store = create_store(storage);

    thread::scope(|s| {
        for worker in 0..workers {
            let store = store.clone();
            let key = key.to_string();
            s.spawn(move || {
                let lock = ObjectLock::new(
                    LockOptions::new(&key)
                        .retry_wait(Duration::from_millis(100))
                        .retry_times(100),
                    store,
                );

                let result = lock.execute(|ctx| {
                    println!("worker {} holds '{}' at epoch {}", worker, key, ctx.epoch());
                    thread::sleep(Duration::from_millis(work_ms));
                    Ok(())
                });

                match result {
                    Ok(Some(())) => println!("worker {} done", worker),
                    Ok(None) => println!("worker {} gave up", worker),
                    Err(e) => eprintln!("worker {} failed: {}", worker, e),
                }
            });
        }
    });
}

fn renew(key: &str, storage: &str, lease_secs: u64, chunks: u32) {
    let store = create_store(storage);
    let lease_duration = Duration::from_secs(lease_secs);
    let lock = ObjectLock::new(
        LockOptions::new(key).lease_duration(lease_duration),
        store,
    );

    let result = lock.execute(|ctx| {
        for chunk in 1..=chunks {
            thread::sleep(lease_duration / 2);
            println!("chunk {}/{} done", chunk, chunks);

            if chunk < chunks {
                // Ask for half the lease duration again; a false here
                // means another node took over and we must stop.
                if !ctx.renew_lease(lease_duration / 2)? {
                    return Err("lease was taken by another node".into());
                }
                println!("lease renewed");
            }
        }
        Ok(ctx.epoch())
    });

    match result {
        Ok(Some(epoch)) => println!("job finished under epoch {}", epoch),
        Ok(None) => println!("could not acquire '{}'", key),
        Err(e) => eprintln!("job aborted: {}", e),
    }
}
