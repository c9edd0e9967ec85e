//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use data_objects_pool::{BoxError, Disposable, Poolable};

/// Install a test-friendly tracing subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::TRACE)
        .try_init();
}

/// A named object whose disposal clears its name.
#[derive(Debug)]
pub struct Thing {
    pub name: Option<String>,
}

impl Disposable for Thing {
    fn dispose(&mut self) -> Result<(), BoxError> {
        self.name = None;
        Ok(())
    }
}

impl Poolable for Thing {
    type Key = String;
    type Args = String;

    fn pooling_key(args: &String) -> String {
        args.clone()
    }

    fn create(args: &String) -> Result<Self, BoxError> {
        Ok(Thing {
            name: Some(args.clone()),
        })
    }
}

/// Counts constructions and disposals shared between instances.
#[derive(Debug, Default)]
pub struct Counters {
    pub created: AtomicUsize,
    pub disposed: AtomicUsize,
}

impl Counters {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// A pooled handle keyed by the first construction argument.
///
/// Disposal fails for names starting with `"bad"`.
#[derive(Debug)]
pub struct Handle {
    pub name: String,
    counters: Arc<Counters>,
}

impl Disposable for Handle {
    fn dispose(&mut self) -> Result<(), BoxError> {
        self.counters.disposed.fetch_add(1, Ordering::SeqCst);
        if self.name.starts_with("bad") {
            return Err(format!("cannot dispose {}", self.name).into());
        }
        Ok(())
    }
}

impl Poolable for Handle {
    type Key = String;
    type Args = (String, Arc<Counters>);
    const MAX_RESERVED: usize = 2;

    fn pooling_key(args: &Self::Args) -> String {
        args.0.clone()
    }

    fn create(args: &Self::Args) -> Result<Self, BoxError> {
        args.1.created.fetch_add(1, Ordering::SeqCst);
        Ok(Handle {
            name: args.0.clone(),
            counters: Arc::clone(&args.1),
        })
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
