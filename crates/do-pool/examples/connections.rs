//! Pooling driver connections per data source.
//!
//! Run with `cargo run -p data-objects-pool --example connections`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use data_objects_pool::{BoxError, Disposable, PoolError, PoolRegistry, Poolable};

static OPENED: AtomicU32 = AtomicU32::new(0);

/// Stand-in for a native driver connection.
#[derive(Debug)]
struct Connection {
    uri: String,
    serial: u32,
    open: bool,
}

impl Connection {
    fn execute(&self, sql: &str) -> String {
        format!("[{} #{}] {sql}", self.uri, self.serial)
    }
}

impl Disposable for Connection {
    fn dispose(&mut self) -> Result<(), BoxError> {
        if self.open {
            self.open = false;
            println!("closed {} #{}", self.uri, self.serial);
        }
        Ok(())
    }
}

impl Poolable for Connection {
    type Key = String;
    type Args = String;
    const MAX_RESERVED: usize = 2;

    fn pooling_key(uri: &String) -> String {
        uri.clone()
    }

    fn create(uri: &String) -> Result<Self, BoxError> {
        Ok(Connection {
            uri: uri.clone(),
            serial: OPENED.fetch_add(1, Ordering::Relaxed) + 1,
            open: true,
        })
    }
}

fn main() -> Result<(), PoolError> {
    tracing_subscriber::fmt().init();

    let registry = PoolRegistry::<Connection>::builder()
        .acquire_timeout(Duration::from_secs(5))
        .build()?;

    let workers: Vec<_> = (0..6)
        .map(|i| {
            let registry = registry.clone();
            let uri = if i % 2 == 0 { "sqlite3://orders.db" } else { "sqlite3://users.db" };
            thread::spawn(move || -> Result<(), PoolError> {
                let conn = registry.create(&uri.to_string())?;
                println!("{}", conn.execute(&format!("SELECT {i}")));
                thread::sleep(Duration::from_millis(50));
                conn.release()
            })
        })
        .collect();

    for worker in workers {
        if let Ok(result) = worker.join() {
            result?;
        }
    }

    for uri in registry.keys() {
        if let Some(status) = registry.status(&uri) {
            println!(
                "{uri}: {} available, {} reserved ({:.0}% utilized)",
                status.available,
                status.reserved,
                status.utilization()
            );
        }
    }

    let report = registry.flush();
    println!(
        "opened {} connections, disposed {}",
        OPENED.load(Ordering::Relaxed),
        report.disposed
    );
    report.into_result().map(|_| ())
}
