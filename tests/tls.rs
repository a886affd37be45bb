mod tls {
    use crossbeam_utils::thread;
    use rcu_catalog::{reclaim::Retired, thread_key, Catalog, Mode};
    use std::{
        sync::atomic::{AtomicUsize, Ordering::Relaxed},
        time::Duration,
    };

    /// Collects until `reclaimed` reaches `expected`. Exited threads hand over what they could not
    /// reclaim, and another thread may be running it meanwhile.
    fn settle(reclaimed: &AtomicUsize, expected: usize) {
        let thread_key = thread_key::get();
        for _ in 0..1_000 {
            thread_key.barrier().unwrap();
            if reclaimed.load(Relaxed) == expected {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(reclaimed.load(Relaxed), expected);
    }

    #[test]
    fn retire_while_exiting() {
        static RECLAIMED: AtomicUsize = AtomicUsize::new(0);

        struct Foo;

        impl Drop for Foo {
            fn drop(&mut self) {
                let catalog = Catalog::new();
                catalog.add(1, "title", "author").unwrap();
                catalog.borrow(1, Mode::Async).unwrap();
                catalog.delete(1, Mode::Sync).unwrap();
                thread_key::get()
                    .retire_async(Retired::new(Box::new(0)), |_| {
                        RECLAIMED.fetch_add(1, Relaxed);
                    })
                    .unwrap();
            }
        }

        thread_local! {
            static FOO: Foo = Foo;
        }

        thread::scope(|scope| {
            scope.spawn(|_| {
                FOO.with(|_| ());
                drop(thread_key::get());
            });
        })
        .unwrap();
        settle(&RECLAIMED, 1);
    }

    #[test]
    fn exit_hands_over_queued_records() {
        static RECLAIMED: AtomicUsize = AtomicUsize::new(0);

        let catalog = Catalog::with_config(
            rcu_catalog::config::Config::default().with_reclaim_hook(|_| {
                RECLAIMED.fetch_add(1, Relaxed);
            }),
        );
        for id in 0..8 {
            catalog.add(id, "title", "author").unwrap();
        }
        thread::scope(|scope| {
            scope.spawn(|_| {
                for id in 0..8 {
                    catalog.delete(id, Mode::Async).unwrap();
                }
                assert!(thread_key::get().pending() > 0);
            });
        })
        .unwrap();
        settle(&RECLAIMED, 8);
    }
}
