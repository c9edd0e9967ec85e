//! Property tests over random sequences of pool operations.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use data_objects_pool::{BoxError, Disposable, InstanceId, Pool, PoolConfig, PoolError, Pooled};
use proptest::prelude::*;

struct Tracked {
    disposed: Arc<AtomicUsize>,
}

impl Disposable for Tracked {
    fn dispose(&mut self) -> Result<(), BoxError> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Op {
    Acquire,
    Release(usize),
    Detach(usize),
    Flush,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Acquire),
        3 => any::<usize>().prop_map(Op::Release),
        1 => any::<usize>().prop_map(Op::Detach),
        1 => Just(Op::Flush),
    ]
}

fn check_invariants(pool: &Pool<Tracked>, max: usize, expected_reserved: &HashSet<InstanceId>) {
    let reserved: HashSet<_> = pool.reserved_ids().into_iter().collect();
    let available: HashSet<_> = pool.available_ids().into_iter().collect();

    assert!(reserved.len() <= max);
    assert!(reserved.is_disjoint(&available));
    assert_eq!(&reserved, expected_reserved);
}

proptest! {
    #[test]
    fn prop_pool_sets_stay_consistent(
        max in 1usize..5,
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let disposed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&disposed);
        let factory = move |_: &()| Ok::<_, BoxError>(Tracked { disposed: Arc::clone(&counter) });
        let pool = Pool::new(PoolConfig::new().max_reserved(max)).unwrap();

        // Guards the caller holds, with whether their reservation is still live.
        let mut held: Vec<(Pooled<Tracked>, bool)> = Vec::new();

        for op in ops {
            match op {
                Op::Acquire => {
                    let available_before = pool.available_count();
                    let reserved_before = pool.reserved_count();
                    let created_before = pool.metrics().instances_created;
                    let next_available = pool.available_ids().first().copied();

                    match pool.try_acquire(&(), &factory).unwrap() {
                        Some(guard) => {
                            if available_before > 0 {
                                // Reuse is LIFO and never constructs.
                                prop_assert_eq!(Some(guard.id()), next_available);
                                prop_assert_eq!(pool.metrics().instances_created, created_before);
                            } else {
                                prop_assert!(reserved_before < max);
                                prop_assert_eq!(
                                    pool.metrics().instances_created,
                                    created_before + 1
                                );
                            }
                            held.push((guard, true));
                        }
                        None => {
                            prop_assert_eq!(available_before, 0);
                            prop_assert_eq!(reserved_before, max);
                        }
                    }
                }
                Op::Release(index) if !held.is_empty() => {
                    let (guard, live) = held.swap_remove(index % held.len());
                    let id = guard.id();
                    let result = guard.release();
                    if live {
                        prop_assert!(result.is_ok());
                        prop_assert_eq!(pool.available_ids().first().copied(), Some(id));
                    } else {
                        let rejected =
                            matches!(result, Err(PoolError::NotReserved { id: r }) if r == id);
                        prop_assert!(rejected);
                    }
                }
                Op::Detach(index) if !held.is_empty() => {
                    let (guard, live) = held.swap_remove(index % held.len());
                    let id = guard.id();
                    let disposed_before = disposed.load(Ordering::SeqCst);
                    let result = guard.detach();
                    if live {
                        prop_assert!(result.is_ok());
                        prop_assert_eq!(disposed.load(Ordering::SeqCst), disposed_before);
                    } else {
                        let rejected =
                            matches!(result, Err(PoolError::NotReserved { id: r }) if r == id);
                        prop_assert!(rejected);
                        prop_assert_eq!(disposed.load(Ordering::SeqCst), disposed_before + 1);
                    }
                    prop_assert_eq!(pool.state_of(id), None);
                }
                Op::Flush => {
                    let available_before = pool.available_count();
                    let report = pool.flush();
                    prop_assert_eq!(report.disposed, available_before);
                    for entry in &mut held {
                        entry.1 = false;
                    }
                    prop_assert_eq!(pool.reserved_count(), 0);
                    prop_assert_eq!(pool.available_count(), 0);
                }
                Op::Release(_) | Op::Detach(_) => {}
            }

            let expected: HashSet<_> = held
                .iter()
                .filter(|(_, live)| *live)
                .map(|(guard, _)| guard.id())
                .collect();
            check_invariants(&pool, max, &expected);
        }

        drop(held);
        let metrics = pool.metrics();
        prop_assert_eq!(metrics.instances_disposed as usize, disposed.load(Ordering::SeqCst));
    }

    #[test]
    fn prop_second_flush_disposes_nothing(max in 1usize..6, acquired in 0usize..6) {
        let disposed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&disposed);
        let factory = move |_: &()| Ok::<_, BoxError>(Tracked { disposed: Arc::clone(&counter) });
        let pool = Pool::new(PoolConfig::new().max_reserved(max)).unwrap();

        let guards: Vec<_> = (0..acquired.min(max))
            .map(|_| pool.acquire(&(), &factory).unwrap())
            .collect();
        for guard in guards {
            guard.release().unwrap();
        }

        let first = pool.flush();
        prop_assert_eq!(first.disposed, acquired.min(max));
        let after_first = disposed.load(Ordering::SeqCst);

        let second = pool.flush();
        prop_assert!(second.is_empty());
        prop_assert_eq!(disposed.load(Ordering::SeqCst), after_first);
        prop_assert_eq!(pool.reserved_count(), 0);
        prop_assert_eq!(pool.available_count(), 0);
    }
}
