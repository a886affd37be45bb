mod scenario {
    use rcu_catalog::{thread_key, Catalog, Error, Mode};

    fn lending_session(mode: Mode) {
        let catalog = Catalog::new();
        catalog.add(102, "BOOK1", "xyz").unwrap();
        catalog.add(114, "BOOK2", "zbc").unwrap();

        assert_eq!(catalog.borrow(114, mode), Ok(()));
        assert_eq!(catalog.is_borrowed(114), Ok(true));
        assert_eq!(catalog.borrow(114, mode), Err(Error::AlreadyBorrowed(114)));
        assert_eq!(catalog.return_record(114, mode), Ok(()));
        assert_eq!(catalog.is_borrowed(114), Ok(false));
        assert_eq!(catalog.delete(114, mode), Ok(()));

        let remaining: Vec<_> = catalog.list().iter().map(|record| record.id()).collect();
        assert_eq!(remaining, [102]);

        thread_key::get().barrier().unwrap();
        assert_eq!(thread_key::get().pending(), 0);
    }

    #[test]
    fn sync() {
        lending_session(Mode::Sync)
    }

    #[test]
    fn async_() {
        lending_session(Mode::Async)
    }

    #[test]
    fn round_trip() {
        for &mode in &[Mode::Sync, Mode::Async] {
            let catalog = Catalog::new();
            catalog.add(1, "T", "A").unwrap();

            let list = catalog.list();
            assert_eq!(list.len(), 1);
            assert_eq!(list[0].id(), 1);
            assert_eq!(list[0].title(), "T");
            assert_eq!(list[0].author(), "A");
            assert!(!list[0].is_borrowed());

            catalog.borrow(1, mode).unwrap();
            assert_eq!(catalog.is_borrowed(1), Ok(true));
            catalog.return_record(1, mode).unwrap();
            assert_eq!(catalog.is_borrowed(1), Ok(false));
            catalog.delete(1, mode).unwrap();
            assert!(catalog.list().iter().all(|record| record.id() != 1));
            assert_eq!(catalog.is_borrowed(1), Err(Error::NotFound(1)));
        }
    }

    #[test]
    fn full_source_session() {
        for &mode in &[Mode::Sync, Mode::Async] {
            let catalog = Catalog::new();
            catalog.add(102, "BOOK1", "xyz").unwrap();
            catalog.add(114, "BOOK2", "zbc").unwrap();
            catalog.borrow(114, mode).unwrap();
            catalog.add(119, "BOOK3", "rubini").unwrap();

            let ids: Vec<_> = catalog.list().iter().map(|record| record.id()).collect();
            assert_eq!(ids, [119, 114, 102]);

            catalog.return_record(114, mode).unwrap();
            catalog.delete(114, mode).unwrap();
            catalog.delete(119, mode).unwrap();
            catalog.delete(102, mode).unwrap();
            assert!(catalog.list().is_empty());
            assert_eq!(catalog.delete(102, mode), Err(Error::NotFound(102)));
        }
    }

    #[test]
    fn long_text_is_truncated() {
        let catalog = Catalog::new();
        let title = "x".repeat(100);
        catalog.add(1, &title, "author").unwrap();
        assert_eq!(
            catalog.list()[0].title().len(),
            rcu_catalog::config::DEFAULT_MAX_TEXT_LEN
        );
    }
}
