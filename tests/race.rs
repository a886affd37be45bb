mod race {
    use crossbeam_utils::thread;
    use rand::{thread_rng, Rng};
    use rcu_catalog::{config::Config, thread_key, Catalog, Error, Mode, RecordId};
    use std::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst},
            Arc, Barrier,
        },
        time::Duration,
    };

    /// Collects until `reclaimed` reaches `expected`. Exited threads hand over what they could not
    /// reclaim, and another thread may be running it meanwhile.
    fn settle(reclaimed: &AtomicUsize, expected: usize) {
        let thread_key = thread_key::get();
        for _ in 0..1_000 {
            thread_key.barrier().unwrap();
            if reclaimed.load(SeqCst) == expected {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(reclaimed.load(SeqCst), expected);
    }

    #[test]
    fn one_borrow_wins() {
        const THREADS: usize = 16;

        for &mode in &[Mode::Sync, Mode::Async] {
            let catalog = Catalog::new();
            catalog.add(114, "BOOK2", "zbc").unwrap();
            let start = Barrier::new(THREADS);
            let wins = AtomicUsize::new(0);
            thread::scope(|s| {
                for _ in 0..THREADS {
                    s.spawn(|_| {
                        start.wait();
                        match catalog.borrow(114, mode) {
                            Ok(()) => {
                                wins.fetch_add(1, SeqCst);
                            }
                            Err(e) => assert_eq!(e, Error::AlreadyBorrowed(114)),
                        }
                    });
                }
            })
            .unwrap();
            assert_eq!(wins.load(SeqCst), 1);
            assert_eq!(catalog.is_borrowed(114), Ok(true));
        }
    }

    #[test]
    fn borrow_return_is_exclusive() {
        const THREADS: usize = 8;
        const ITER_COUNT: usize = 2_000;

        let catalog = Catalog::new();
        catalog.add(7, "title", "author").unwrap();
        let holders = AtomicUsize::new(0);
        let transitions = AtomicUsize::new(0);
        thread::scope(|s| {
            for t in 0..THREADS {
                let (catalog, holders, transitions) = (&catalog, &holders, &transitions);
                s.spawn(move |_| {
                    let mode = if t % 2 == 0 { Mode::Sync } else { Mode::Async };
                    for _ in 0..ITER_COUNT {
                        match catalog.borrow(7, mode) {
                            Ok(()) => {
                                assert_eq!(holders.fetch_add(1, SeqCst), 0, "two borrowers");
                                holders.fetch_sub(1, SeqCst);
                                catalog.return_record(7, mode).unwrap();
                                transitions.fetch_add(2, SeqCst);
                            }
                            Err(e) => assert_eq!(e, Error::AlreadyBorrowed(7)),
                        }
                    }
                });
            }
        })
        .unwrap();
        assert!(transitions.load(SeqCst) >= 2);
        assert_eq!(catalog.is_borrowed(7), Ok(false));
    }

    fn title(id: RecordId) -> String {
        format!("title {}", id)
    }

    fn author(id: RecordId) -> String {
        format!("author {}", id)
    }

    #[test]
    fn stress_readers_never_see_torn_records() {
        const IDS: RecordId = 64;
        const READERS: usize = 6;
        const WRITERS: usize = 4;
        const ITER_COUNT: usize = 5_000;

        let reclaimed = Arc::new(AtomicUsize::new(0));
        let r = reclaimed.clone();
        let catalog = Catalog::with_config(Config::default().with_reclaim_hook(move |record| {
            assert_eq!(record.title(), title(record.id()));
            r.fetch_add(1, SeqCst);
        }));
        for id in 0..IDS {
            catalog.add(id, &title(id), &author(id)).unwrap();
        }

        let retired = AtomicUsize::new(0);
        let done = AtomicBool::new(false);
        thread::scope(|s| {
            for _ in 0..READERS {
                s.spawn(|_| {
                    let thread_key = thread_key::get();
                    while !done.load(SeqCst) {
                        thread_key.read(|pin| {
                            for record in catalog.iter(pin) {
                                assert!(record.id() < IDS);
                                assert_eq!(record.title(), title(record.id()));
                                assert_eq!(record.author(), author(record.id()));
                            }
                        });
                    }
                });
            }

            let writers: Vec<_> = (0..WRITERS)
                .map(|_| {
                    s.spawn(|_| {
                        let mut rng = thread_rng();
                        for _ in 0..ITER_COUNT {
                            let id = rng.gen_range(0..IDS);
                            let mode = if rng.gen() { Mode::Sync } else { Mode::Async };
                            let result = match rng.gen_range(0..4) {
                                0 => catalog.borrow(id, mode),
                                1 => catalog.return_record(id, mode),
                                2 => catalog.delete(id, mode),
                                _ => {
                                    let _ = catalog.add(id, &title(id), &author(id));
                                    continue;
                                }
                            };
                            if result.is_ok() {
                                retired.fetch_add(1, SeqCst);
                            }
                        }
                    })
                })
                .collect();
            for writer in writers {
                writer.join().unwrap();
            }
            done.store(true, SeqCst);
        })
        .unwrap();

        settle(&reclaimed, retired.load(SeqCst));
    }
}
